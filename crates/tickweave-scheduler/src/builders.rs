//! Sequence builders — small reusable routines composed from the primitive
//! wait conditions, plus the convenience surface that starts them.
//!
//! Every builder is an explicit state machine: one yield per resumption,
//! callback invocation at the defined points, nothing touching the registry
//! except through [`Scheduler::start`].

use crate::coroutine::{Owner, Routine, Step, TickContext};
use crate::engine::Scheduler;
use crate::wait::{FrameDelay, TimeDelay, Wait};

/// Interval/delay flavor shared by the delayed-call and repeat builders.
#[derive(Debug, Clone)]
pub(crate) enum Delay {
    Frames(u64),
    Seconds(f64),
}

impl Delay {
    /// A freshly constructed condition; the registry arms it on yield.
    fn to_wait(&self) -> Wait {
        match self {
            Delay::Frames(frames) => Wait::Frames(FrameDelay::new(*frames)),
            Delay::Seconds(secs) => Wait::Seconds(TimeDelay::new(*secs)),
        }
    }
}

// ── Delayed call ────────────────────────────────────────────────────────

enum OnceState {
    Init,
    LatePassed,
    Armed,
    Finished,
}

/// Wait (optionally until the late phase, then) for one delay, invoke the
/// callback once, finish.
pub(crate) struct DelayedCall<F: FnMut()> {
    delay: Delay,
    late: bool,
    callback: F,
    state: OnceState,
}

impl<F: FnMut()> DelayedCall<F> {
    pub(crate) fn new(delay: Delay, late: bool, callback: F) -> Self {
        Self {
            delay,
            late,
            callback,
            state: OnceState::Init,
        }
    }
}

impl<F: FnMut()> Routine for DelayedCall<F> {
    fn resume(&mut self, _ctx: &TickContext) -> anyhow::Result<Step> {
        loop {
            match self.state {
                OnceState::Init => {
                    self.state = OnceState::LatePassed;
                    if self.late {
                        return Ok(Step::Yield(Wait::Late));
                    }
                }
                OnceState::LatePassed => {
                    self.state = OnceState::Armed;
                    return Ok(Step::Yield(self.delay.to_wait()));
                }
                OnceState::Armed => {
                    self.state = OnceState::Finished;
                    (self.callback)();
                    return Ok(Step::Done);
                }
                OnceState::Finished => return Ok(Step::Done),
            }
        }
    }
}

/// Yield once into the late bucket, invoke the callback, finish.
pub(crate) struct LateCall<F: FnMut()> {
    callback: F,
    state: OnceState,
}

impl<F: FnMut()> LateCall<F> {
    pub(crate) fn new(callback: F) -> Self {
        Self {
            callback,
            state: OnceState::Init,
        }
    }
}

impl<F: FnMut()> Routine for LateCall<F> {
    fn resume(&mut self, _ctx: &TickContext) -> anyhow::Result<Step> {
        match self.state {
            OnceState::Init => {
                self.state = OnceState::Armed;
                Ok(Step::Yield(Wait::Late))
            }
            OnceState::Armed => {
                self.state = OnceState::Finished;
                (self.callback)();
                Ok(Step::Done)
            }
            OnceState::LatePassed | OnceState::Finished => Ok(Step::Done),
        }
    }
}

// ── Repeat until ────────────────────────────────────────────────────────

enum RepeatState {
    Init,
    Looping,
    Finished,
}

/// Loop yielding one interval per iteration until the stop predicate turns
/// true. The predicate is checked before each interval, so once it stops
/// the loop, no further interval is ever yielded.
pub(crate) struct RepeatUntil<P: FnMut() -> bool> {
    interval: Delay,
    late: bool,
    until: P,
    state: RepeatState,
}

impl<P: FnMut() -> bool> RepeatUntil<P> {
    pub(crate) fn new(interval: Delay, late: bool, until: P) -> Self {
        Self {
            interval,
            late,
            until,
            state: RepeatState::Init,
        }
    }
}

impl<P: FnMut() -> bool> Routine for RepeatUntil<P> {
    fn resume(&mut self, _ctx: &TickContext) -> anyhow::Result<Step> {
        loop {
            match self.state {
                RepeatState::Init => {
                    self.state = RepeatState::Looping;
                    if self.late {
                        return Ok(Step::Yield(Wait::Late));
                    }
                }
                RepeatState::Looping => {
                    if (self.until)() {
                        self.state = RepeatState::Finished;
                        return Ok(Step::Done);
                    }
                    return Ok(Step::Yield(self.interval.to_wait()));
                }
                RepeatState::Finished => return Ok(Step::Done),
            }
        }
    }
}

// ── Poll until ──────────────────────────────────────────────────────────

enum PollState {
    Init,
    Polling,
    Finished,
}

/// Re-check a predicate every primary phase; once true, invoke the callback
/// and finish.
pub(crate) struct PollUntil<P: FnMut() -> bool, F: FnMut()> {
    predicate: P,
    callback: F,
    late: bool,
    state: PollState,
}

impl<P: FnMut() -> bool, F: FnMut()> PollUntil<P, F> {
    pub(crate) fn new(predicate: P, callback: F, late: bool) -> Self {
        Self {
            predicate,
            callback,
            late,
            state: PollState::Init,
        }
    }
}

impl<P: FnMut() -> bool, F: FnMut()> Routine for PollUntil<P, F> {
    fn resume(&mut self, _ctx: &TickContext) -> anyhow::Result<Step> {
        loop {
            match self.state {
                PollState::Init => {
                    self.state = PollState::Polling;
                    if self.late {
                        return Ok(Step::Yield(Wait::Late));
                    }
                }
                PollState::Polling => {
                    if (self.predicate)() {
                        self.state = PollState::Finished;
                        (self.callback)();
                        return Ok(Step::Done);
                    }
                    return Ok(Step::Yield(Wait::Immediate));
                }
                PollState::Finished => return Ok(Step::Done),
            }
        }
    }
}

// ── Convenience surface ─────────────────────────────────────────────────

impl Scheduler {
    /// Invoke `callback` once at this tick's late phase.
    pub fn late<F>(&mut self, callback: F, owner: Option<&Owner>) -> crate::CoHandle
    where
        F: FnMut() + 'static,
    {
        self.start(LateCall::new(callback), owner)
    }

    /// Invoke `callback` once, `delay_secs` of wall-clock time from now.
    pub fn once<F>(&mut self, delay_secs: f64, callback: F, owner: Option<&Owner>) -> crate::CoHandle
    where
        F: FnMut() + 'static,
    {
        self.start(
            DelayedCall::new(Delay::Seconds(delay_secs), false, callback),
            owner,
        )
    }

    /// [`once`](Scheduler::once), deferred to the late phase first.
    pub fn late_once<F>(&mut self, delay_secs: f64, callback: F, owner: Option<&Owner>) -> crate::CoHandle
    where
        F: FnMut() + 'static,
    {
        self.start(
            DelayedCall::new(Delay::Seconds(delay_secs), true, callback),
            owner,
        )
    }

    /// Invoke `callback` once, `delay_frames` ticks from now.
    pub fn frame_once<F>(&mut self, delay_frames: u64, callback: F, owner: Option<&Owner>) -> crate::CoHandle
    where
        F: FnMut() + 'static,
    {
        self.start(
            DelayedCall::new(Delay::Frames(delay_frames), false, callback),
            owner,
        )
    }

    /// [`frame_once`](Scheduler::frame_once), deferred to the late phase first.
    pub fn late_frame_once<F>(&mut self, delay_frames: u64, callback: F, owner: Option<&Owner>) -> crate::CoHandle
    where
        F: FnMut() + 'static,
    {
        self.start(
            DelayedCall::new(Delay::Frames(delay_frames), true, callback),
            owner,
        )
    }

    /// Re-check `until` every `interval_secs`; stop once it returns true.
    pub fn repeat<P>(&mut self, interval_secs: f64, until: P, owner: Option<&Owner>) -> crate::CoHandle
    where
        P: FnMut() -> bool + 'static,
    {
        self.start(
            RepeatUntil::new(Delay::Seconds(interval_secs), false, until),
            owner,
        )
    }

    /// [`repeat`](Scheduler::repeat), deferred to the late phase first.
    pub fn late_repeat<P>(&mut self, interval_secs: f64, until: P, owner: Option<&Owner>) -> crate::CoHandle
    where
        P: FnMut() -> bool + 'static,
    {
        self.start(
            RepeatUntil::new(Delay::Seconds(interval_secs), true, until),
            owner,
        )
    }

    /// Re-check `until` every `interval_frames` ticks; stop once true.
    pub fn frame_repeat<P>(&mut self, interval_frames: u64, until: P, owner: Option<&Owner>) -> crate::CoHandle
    where
        P: FnMut() -> bool + 'static,
    {
        self.start(
            RepeatUntil::new(Delay::Frames(interval_frames), false, until),
            owner,
        )
    }

    /// [`frame_repeat`](Scheduler::frame_repeat), deferred to the late phase first.
    pub fn late_frame_repeat<P>(&mut self, interval_frames: u64, until: P, owner: Option<&Owner>) -> crate::CoHandle
    where
        P: FnMut() -> bool + 'static,
    {
        self.start(
            RepeatUntil::new(Delay::Frames(interval_frames), true, until),
            owner,
        )
    }

    /// Poll `predicate` once per primary phase; when it turns true, invoke
    /// `callback` once.
    pub fn wait_until<P, F>(&mut self, predicate: P, callback: F, owner: Option<&Owner>) -> crate::CoHandle
    where
        P: FnMut() -> bool + 'static,
        F: FnMut() + 'static,
    {
        self.start(PollUntil::new(predicate, callback, false), owner)
    }

    /// [`wait_until`](Scheduler::wait_until), deferred to the late phase first.
    pub fn late_wait_until<P, F>(&mut self, predicate: P, callback: F, owner: Option<&Owner>) -> crate::CoHandle
    where
        P: FnMut() -> bool + 'static,
        F: FnMut() + 'static,
    {
        self.start(PollUntil::new(predicate, callback, true), owner)
    }
}
