//! The coroutine registry — pending handles bucketed by wait-condition kind,
//! drained once per tick phase.
//!
//! ## Tick protocol
//! ```text
//! host tick
//!   ├── update()        primary phase
//!   │     snapshot immediate/frames/seconds/nested buckets, then per handle:
//!   │       dead owner      → drop silently
//!   │       gate unsatisfied → re-file, same bucket
//!   │       else             → resume one step, re-arm, file by new condition
//!   └── late_update()   secondary phase
//!         same, restricted to the late bucket (never gated)
//! ```
//!
//! All four primary buckets are snapshotted before any handle runs, so a
//! handle resumed this tick cannot be seen again by the primary phase no
//! matter which bucket it re-files into. Insertion order within a bucket is
//! resumption order.

use std::collections::VecDeque;
use std::rc::Rc;

use serde::Serialize;
use tickweave_core::{FrameClock, LagConfig};

use crate::coroutine::{CoHandle, Coroutine, Owner, Routine, StepOutcome, TickContext};
use crate::wait::{Wait, WaitKind};

/// Primary-phase buckets, in drain order. Nested runs last so completion of
/// handles resumed earlier this tick is already visible to the absence scan.
const PRIMARY: [WaitKind; 4] = [
    WaitKind::Immediate,
    WaitKind::Frames,
    WaitKind::Seconds,
    WaitKind::Nested,
];

/// The scheduler registry. Single-threaded; the host calls `update` and
/// `late_update` once per tick, in that order.
pub struct Scheduler {
    clock: Rc<dyn FrameClock>,
    buckets: [VecDeque<Coroutine>; WaitKind::COUNT],
    lag: LagConfig,
    resumed: u64,
    completed: u64,
    faulted: u64,
}

impl Scheduler {
    /// Build a registry over the host's frame clock.
    pub fn new(clock: Rc<dyn FrameClock>) -> Self {
        Self::with_config(clock, LagConfig::default())
    }

    /// Build with explicit lag-probe tuning.
    pub fn with_config(clock: Rc<dyn FrameClock>, lag: LagConfig) -> Self {
        Self {
            clock,
            buckets: std::array::from_fn(|_| VecDeque::new()),
            lag,
            resumed: 0,
            completed: 0,
            faulted: 0,
        }
    }

    pub(crate) fn lag_config(&self) -> &LagConfig {
        &self.lag
    }

    fn tick_context(&self) -> TickContext {
        TickContext {
            frame: self.clock.frame(),
            delta_ms: self.clock.delta_ms(),
        }
    }

    // ── Tick phases ─────────────────────────────────────────────────────

    /// Primary phase. Call once per host tick, before `late_update`.
    pub fn update(&mut self) {
        let ctx = self.tick_context();
        let mut snapshots =
            PRIMARY.map(|kind| std::mem::take(&mut self.buckets[kind.index()]));
        for (slot, kind) in PRIMARY.iter().enumerate() {
            let batch = std::mem::take(&mut snapshots[slot]);
            self.drain_batch(*kind, batch, &ctx);
        }
    }

    /// Secondary (late) phase. Call once per host tick, after `update`.
    /// The late marker is a routing tag: every handle here runs, ungated.
    pub fn late_update(&mut self) {
        let ctx = self.tick_context();
        let batch = std::mem::take(&mut self.buckets[WaitKind::Late.index()]);
        self.drain_batch(WaitKind::Late, batch, &ctx);
    }

    fn drain_batch(&mut self, kind: WaitKind, batch: VecDeque<Coroutine>, ctx: &TickContext) {
        for co in batch {
            if co.owner_dead() {
                continue;
            }
            if self.gate_unsatisfied(&co, kind, ctx) {
                self.buckets[kind.index()].push_back(co);
                continue;
            }
            self.resume_and_file(co, ctx);
        }
    }

    /// Condition-gated buckets hold their handles until the gate opens.
    /// Immediate and Late are ungated by definition.
    fn gate_unsatisfied(&self, co: &Coroutine, kind: WaitKind, ctx: &TickContext) -> bool {
        match kind {
            WaitKind::Frames => {
                matches!(co.current_wait(), Some(Wait::Frames(d)) if !d.is_done(ctx.frame))
            }
            WaitKind::Seconds => {
                matches!(co.current_wait(), Some(Wait::Seconds(d)) if !d.is_done())
            }
            WaitKind::Nested => {
                matches!(co.current_wait(), Some(Wait::Routine(h)) if self.is_pending(h))
            }
            WaitKind::Immediate | WaitKind::Late => false,
        }
    }

    fn resume_and_file(&mut self, mut co: Coroutine, ctx: &TickContext) {
        self.resumed += 1;
        match co.resume_step(ctx) {
            StepOutcome::Yielded => {
                Self::rearm(&mut co, ctx);
                self.file(co);
            }
            StepOutcome::Completed => {
                self.completed += 1;
                tracing::debug!("✅ Coroutine {} completed", co.handle());
            }
            StepOutcome::Faulted => {
                self.faulted += 1;
            }
        }
    }

    /// Re-arm a freshly yielded frame or time delay against "now".
    fn rearm(co: &mut Coroutine, ctx: &TickContext) {
        match co.current_wait_mut() {
            Some(Wait::Frames(d)) => d.rearm(ctx.frame),
            Some(Wait::Seconds(d)) => d.rearm(),
            _ => {}
        }
    }

    /// File by the kind of the current condition; no condition means the
    /// default (immediate) bucket.
    fn file(&mut self, co: Coroutine) {
        let kind = co.current_wait().map(Wait::kind).unwrap_or(WaitKind::Immediate);
        self.buckets[kind.index()].push_back(co);
    }

    // ── Lifecycle API ───────────────────────────────────────────────────

    /// Start a routine: wrap it in a fresh handle, resume one step right
    /// away, and register it if it suspended. The handle is returned even if
    /// the routine completed on that first step.
    pub fn start<R: Routine + 'static>(&mut self, routine: R, owner: Option<&Owner>) -> CoHandle {
        self.start_coroutine(Coroutine::new(Box::new(routine), owner.map(Owner::token)))
    }

    /// Start path for an existing handle (e.g. one recovered by [`stop`]).
    /// Identity is preserved; the sequence continues where it suspended.
    ///
    /// [`stop`]: Scheduler::stop
    pub fn start_coroutine(&mut self, mut co: Coroutine) -> CoHandle {
        let handle = co.handle();
        tracing::debug!("🌀 Starting coroutine {handle}");
        let ctx = self.tick_context();
        self.resume_and_file(co, &ctx);
        handle
    }

    /// Remove the handle from every bucket. Returns the coroutine so it can
    /// be re-started or drained; dropping the return value cancels it.
    pub fn stop(&mut self, handle: &CoHandle) -> Option<Coroutine> {
        let mut removed = None;
        for bucket in &mut self.buckets {
            let mut index = 0;
            while index < bucket.len() {
                if bucket[index].handle() == *handle {
                    removed = bucket.remove(index);
                } else {
                    index += 1;
                }
            }
        }
        if removed.is_some() {
            tracing::debug!("🛑 Stopped coroutine {handle}");
        }
        removed
    }

    /// Remove every handle started on behalf of `owner`. Returns how many
    /// were removed.
    pub fn stop_all(&mut self, owner: &Owner) -> usize {
        let before = self.pending();
        for bucket in &mut self.buckets {
            bucket.retain(|co| !co.owned_by(owner));
        }
        let removed = before - self.pending();
        if removed > 0 {
            tracing::debug!("🛑 Stopped {removed} coroutines for one owner");
        }
        removed
    }

    /// Stop then start again, preserving handle identity. `None` if the
    /// handle was not registered.
    pub fn restart(&mut self, handle: &CoHandle) -> Option<CoHandle> {
        let co = self.stop(handle)?;
        Some(self.start_coroutine(co))
    }

    /// Force-complete synchronously: unregister the target, then resume it
    /// in a tight loop ignoring every wait condition, until exhausted or
    /// `max_steps`. Hitting the cap without exhaustion logs a warning; there
    /// is no other signal.
    pub fn drain(&mut self, handle: &CoHandle, max_steps: Option<u32>) {
        if let Some(mut co) = self.stop(handle) {
            self.drain_coroutine(&mut co, max_steps);
        }
    }

    /// [`drain`] for a coroutine the caller still owns (never started, or
    /// recovered via [`stop`]).
    ///
    /// [`drain`]: Scheduler::drain
    /// [`stop`]: Scheduler::stop
    pub fn drain_coroutine(&mut self, co: &mut Coroutine, max_steps: Option<u32>) {
        let ctx = self.tick_context();
        let mut steps: u32 = 0;
        loop {
            if let Some(max) = max_steps
                && steps >= max
            {
                tracing::warn!(
                    "⚠️ Drain of {} hit the {max}-step cap before completion",
                    co.handle()
                );
                return;
            }
            steps += 1;
            self.resumed += 1;
            match co.resume_step(&ctx) {
                StepOutcome::Yielded => {}
                StepOutcome::Completed => {
                    self.completed += 1;
                    return;
                }
                StepOutcome::Faulted => {
                    self.faulted += 1;
                    return;
                }
            }
        }
    }

    // ── Introspection ───────────────────────────────────────────────────

    /// Is this handle registered in any bucket? Also how nested waits
    /// observe completion: gone from everywhere means done (or stopped —
    /// the two are indistinguishable by design).
    pub fn is_pending(&self, handle: &CoHandle) -> bool {
        self.buckets
            .iter()
            .any(|bucket| bucket.iter().any(|co| co.handle() == *handle))
    }

    /// Total pending handles across all buckets.
    pub fn pending(&self) -> usize {
        self.buckets.iter().map(VecDeque::len).sum()
    }

    /// Per-bucket and lifetime counters.
    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            buckets: WaitKind::ALL
                .iter()
                .map(|kind| BucketStats {
                    kind: *kind,
                    pending: self.buckets[kind.index()].len(),
                })
                .collect(),
            total_resumed: self.resumed,
            total_completed: self.completed,
            total_faulted: self.faulted,
        }
    }
}

/// Statistics for one bucket.
#[derive(Debug, Clone, Serialize)]
pub struct BucketStats {
    pub kind: WaitKind,
    pub pending: usize,
}

/// Registry statistics.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStats {
    pub buckets: Vec<BucketStats>,
    pub total_resumed: u64,
    pub total_completed: u64,
    pub total_faulted: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coroutine::Step;
    use std::cell::{Cell, RefCell};
    use tickweave_core::ManualClock;

    /// Yields a scripted list of waits, counting every resumption.
    struct Script {
        waits: VecDeque<Wait>,
        resumes: Rc<Cell<u32>>,
    }

    impl Script {
        fn new(waits: Vec<Wait>, resumes: &Rc<Cell<u32>>) -> Self {
            Self {
                waits: waits.into(),
                resumes: resumes.clone(),
            }
        }
    }

    impl Routine for Script {
        fn resume(&mut self, _ctx: &TickContext) -> anyhow::Result<Step> {
            self.resumes.set(self.resumes.get() + 1);
            match self.waits.pop_front() {
                Some(wait) => Ok(Step::Yield(wait)),
                None => Ok(Step::Done),
            }
        }
    }

    /// Yields immediates, then fails.
    struct FailsAfter {
        yields_left: u32,
    }

    impl Routine for FailsAfter {
        fn resume(&mut self, _ctx: &TickContext) -> anyhow::Result<Step> {
            if self.yields_left == 0 {
                anyhow::bail!("synthetic step fault");
            }
            self.yields_left -= 1;
            Ok(Step::Yield(Wait::Immediate))
        }
    }

    /// Logs a label on every resumption, then follows a script.
    struct Tracer {
        label: &'static str,
        log: Rc<RefCell<Vec<&'static str>>>,
        waits: VecDeque<Wait>,
    }

    impl Routine for Tracer {
        fn resume(&mut self, _ctx: &TickContext) -> anyhow::Result<Step> {
            self.log.borrow_mut().push(self.label);
            match self.waits.pop_front() {
                Some(wait) => Ok(Step::Yield(wait)),
                None => Ok(Step::Done),
            }
        }
    }

    fn harness() -> (Rc<ManualClock>, Scheduler) {
        let clock = Rc::new(ManualClock::new());
        let sched = Scheduler::new(clock.clone());
        (clock, sched)
    }

    fn tick(clock: &ManualClock, sched: &mut Scheduler) {
        clock.advance(16.0);
        sched.update();
        sched.late_update();
    }

    #[test]
    fn test_frame_delay_scenario_two_resumptions_total() {
        // start at frame 0 arms FrameDelay(3); frames 1 and 2 leave it
        // pending; frame 3 resumes and completes.
        let (clock, mut sched) = harness();
        let resumes = Rc::new(Cell::new(0));
        let handle = sched.start(Script::new(vec![Wait::frames(3)], &resumes), None);
        assert_eq!(resumes.get(), 1);
        assert!(sched.is_pending(&handle));

        tick(&clock, &mut sched); // frame 1
        tick(&clock, &mut sched); // frame 2
        assert_eq!(resumes.get(), 1);
        assert!(sched.is_pending(&handle));

        tick(&clock, &mut sched); // frame 3
        assert_eq!(resumes.get(), 2);
        assert!(!sched.is_pending(&handle));
    }

    #[test]
    fn test_at_most_one_resumption_per_tick() {
        let (clock, mut sched) = harness();
        let resumes = Rc::new(Cell::new(0));
        sched.start(
            Script::new(vec![Wait::Immediate, Wait::Immediate, Wait::Immediate], &resumes),
            None,
        );
        assert_eq!(resumes.get(), 1);
        tick(&clock, &mut sched);
        assert_eq!(resumes.get(), 2);
        tick(&clock, &mut sched);
        assert_eq!(resumes.get(), 3);
    }

    #[test]
    fn test_no_double_resume_across_buckets_in_one_tick() {
        // An immediate-bucket handle that yields a zero-frame delay must not
        // be picked up again by the frames bucket in the same tick.
        let (clock, mut sched) = harness();
        let resumes = Rc::new(Cell::new(0));
        sched.start(
            Script::new(vec![Wait::Immediate, Wait::frames(0), Wait::Immediate], &resumes),
            None,
        );
        assert_eq!(resumes.get(), 1);
        tick(&clock, &mut sched);
        assert_eq!(resumes.get(), 2); // yielded frames(0), not re-run this tick
        tick(&clock, &mut sched);
        assert_eq!(resumes.get(), 3);
    }

    #[test]
    fn test_time_delay_gates_until_deadline() {
        let (clock, mut sched) = harness();
        let resumes = Rc::new(Cell::new(0));
        let far = sched.start(Script::new(vec![Wait::seconds(3600.0)], &resumes), None);
        let near_resumes = Rc::new(Cell::new(0));
        let near = sched.start(Script::new(vec![Wait::seconds(0.0)], &near_resumes), None);

        tick(&clock, &mut sched);
        assert!(sched.is_pending(&far));
        assert_eq!(resumes.get(), 1);
        assert!(!sched.is_pending(&near));
        assert_eq!(near_resumes.get(), 2);
    }

    #[test]
    fn test_late_phase_runs_after_all_primary_buckets() {
        let (clock, mut sched) = harness();
        let log = Rc::new(RefCell::new(Vec::new()));
        sched.start(
            Tracer {
                label: "late",
                log: log.clone(),
                waits: VecDeque::from([Wait::Late]),
            },
            None,
        );
        sched.start(
            Tracer {
                label: "primary",
                log: log.clone(),
                waits: VecDeque::from([Wait::Immediate]),
            },
            None,
        );
        log.borrow_mut().clear(); // discard the two start resumptions

        tick(&clock, &mut sched);
        assert_eq!(*log.borrow(), vec!["primary", "late"]);
    }

    #[test]
    fn test_insertion_order_is_resumption_order_within_bucket() {
        let (clock, mut sched) = harness();
        let log = Rc::new(RefCell::new(Vec::new()));
        for label in ["first", "second", "third"] {
            sched.start(
                Tracer {
                    label,
                    log: log.clone(),
                    waits: VecDeque::from([Wait::Immediate]),
                },
                None,
            );
        }
        log.borrow_mut().clear();

        tick(&clock, &mut sched);
        assert_eq!(*log.borrow(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_stop_removes_from_every_bucket() {
        let (_clock, mut sched) = harness();
        let resumes = Rc::new(Cell::new(0));
        let handle = sched.start(
            Script::new(vec![Wait::Immediate, Wait::Immediate], &resumes),
            None,
        );
        assert!(sched.is_pending(&handle));

        let co = sched.stop(&handle).expect("was registered");
        assert!(!sched.is_pending(&handle));
        assert_eq!(sched.pending(), 0);

        // Re-start continues the same sequence under the same identity.
        let again = sched.start_coroutine(co);
        assert_eq!(again, handle);
        assert!(sched.is_pending(&handle));
        assert_eq!(resumes.get(), 2);
    }

    #[test]
    fn test_restart_preserves_identity() {
        let (_clock, mut sched) = harness();
        let resumes = Rc::new(Cell::new(0));
        let handle = sched.start(
            Script::new(vec![Wait::Immediate, Wait::Immediate, Wait::Immediate], &resumes),
            None,
        );
        let restarted = sched.restart(&handle).expect("was registered");
        assert_eq!(restarted, handle);
        assert_eq!(resumes.get(), 2);

        let ghost = Coroutine::new(
            Box::new(Script::new(vec![], &Rc::new(Cell::new(0)))),
            None,
        );
        assert!(sched.restart(&ghost.handle()).is_none());
    }

    #[test]
    fn test_stop_all_by_owner() {
        let (_clock, mut sched) = harness();
        let owner = Owner::new();
        let resumes = Rc::new(Cell::new(0));
        sched.start(Script::new(vec![Wait::frames(5)], &resumes), Some(&owner));
        sched.start(Script::new(vec![Wait::seconds(5.0)], &resumes), Some(&owner));
        let other = sched.start(Script::new(vec![Wait::frames(5)], &resumes), None);

        assert_eq!(sched.stop_all(&owner), 2);
        assert_eq!(sched.pending(), 1);
        assert!(sched.is_pending(&other));
    }

    #[test]
    fn test_dead_owner_drops_handle_silently() {
        let (clock, mut sched) = harness();
        let owner = Owner::new();
        let resumes = Rc::new(Cell::new(0));
        let handle = sched.start(
            Script::new(vec![Wait::Immediate, Wait::Immediate], &resumes),
            Some(&owner),
        );
        drop(owner);

        // Dropped lazily, the next time it comes due; never resumed again.
        assert!(sched.is_pending(&handle));
        tick(&clock, &mut sched);
        assert!(!sched.is_pending(&handle));
        assert_eq!(resumes.get(), 1);
    }

    #[test]
    fn test_invalidated_owner_drops_handle() {
        let (clock, mut sched) = harness();
        let owner = Owner::new();
        let resumes = Rc::new(Cell::new(0));
        sched.start(Script::new(vec![Wait::Immediate], &resumes), Some(&owner));
        owner.invalidate();
        tick(&clock, &mut sched);
        assert_eq!(sched.pending(), 0);
        assert_eq!(resumes.get(), 1);
    }

    #[test]
    fn test_fault_drops_handle_but_not_siblings() {
        let (clock, mut sched) = harness();
        let faulty = sched.start(FailsAfter { yields_left: 1 }, None);
        let resumes = Rc::new(Cell::new(0));
        let sibling = sched.start(
            Script::new(vec![Wait::Immediate, Wait::Immediate], &resumes),
            None,
        );

        tick(&clock, &mut sched); // faulty errors, sibling resumes fine
        assert!(!sched.is_pending(&faulty));
        assert!(sched.is_pending(&sibling));
        assert_eq!(resumes.get(), 2);
        assert_eq!(sched.stats().total_faulted, 1);
    }

    #[test]
    fn test_nested_wait_resumes_after_child_completes() {
        let (clock, mut sched) = harness();
        let child_resumes = Rc::new(Cell::new(0));
        let child = sched.start(Script::new(vec![Wait::frames(2)], &child_resumes), None);
        let parent_resumes = Rc::new(Cell::new(0));
        let parent = sched.start(
            Script::new(vec![Wait::Routine(child)], &parent_resumes),
            None,
        );

        tick(&clock, &mut sched); // frame 1: child gated, parent waiting
        assert_eq!(parent_resumes.get(), 1);
        assert!(sched.is_pending(&parent));

        tick(&clock, &mut sched); // frame 2: child completes; parent sees it gone
        assert_eq!(child_resumes.get(), 2);
        assert!(!sched.is_pending(&child));
        assert_eq!(parent_resumes.get(), 2);
        assert!(!sched.is_pending(&parent));
    }

    #[test]
    fn test_nested_wait_treats_stopped_child_as_done() {
        let (clock, mut sched) = harness();
        let child_resumes = Rc::new(Cell::new(0));
        let child = sched.start(Script::new(vec![Wait::frames(100)], &child_resumes), None);
        let parent_resumes = Rc::new(Cell::new(0));
        sched.start(Script::new(vec![Wait::Routine(child)], &parent_resumes), None);

        sched.stop(&child);
        tick(&clock, &mut sched);
        assert_eq!(parent_resumes.get(), 2);
    }

    #[test]
    fn test_drain_completes_within_cap_without_warning() {
        // A sequence with 3 yields needs exactly 4 resumptions to finish.
        let (_clock, mut sched) = harness();
        let resumes = Rc::new(Cell::new(0));
        let mut co = Coroutine::new(
            Box::new(Script::new(
                vec![Wait::frames(10), Wait::seconds(99.0), Wait::Immediate],
                &resumes,
            )),
            None,
        );
        sched.drain_coroutine(&mut co, Some(4));
        assert_eq!(resumes.get(), 4);
        assert!(co.current_wait().is_none());
    }

    #[test]
    fn test_drain_cap_leaves_sequence_unfinished() {
        let (_clock, mut sched) = harness();
        let resumes = Rc::new(Cell::new(0));
        let mut co = Coroutine::new(
            Box::new(Script::new(
                vec![Wait::frames(10), Wait::seconds(99.0), Wait::Immediate],
                &resumes,
            )),
            None,
        );
        sched.drain_coroutine(&mut co, Some(2));
        assert_eq!(resumes.get(), 2);
        assert!(co.current_wait().is_some()); // still suspended mid-sequence
    }

    #[test]
    fn test_drain_unregisters_target() {
        let (_clock, mut sched) = harness();
        let resumes = Rc::new(Cell::new(0));
        let handle = sched.start(
            Script::new(vec![Wait::frames(10), Wait::frames(10)], &resumes),
            None,
        );
        sched.drain(&handle, None);
        assert!(!sched.is_pending(&handle));
        assert_eq!(resumes.get(), 3); // one at start, two in the drain loop
        assert_eq!(sched.stats().total_completed, 1);
    }

    #[test]
    fn test_start_returns_handle_even_on_instant_completion() {
        let (_clock, mut sched) = harness();
        let resumes = Rc::new(Cell::new(0));
        let handle = sched.start(Script::new(vec![], &resumes), None);
        assert!(!sched.is_pending(&handle));
        assert_eq!(resumes.get(), 1);
        assert_eq!(sched.stats().total_completed, 1);
    }

    #[test]
    fn test_stats_counts_pending_by_bucket() {
        let (_clock, mut sched) = harness();
        let resumes = Rc::new(Cell::new(0));
        sched.start(Script::new(vec![Wait::frames(5)], &resumes), None);
        sched.start(Script::new(vec![Wait::seconds(5.0)], &resumes), None);
        sched.start(Script::new(vec![Wait::Late], &resumes), None);

        let stats = sched.stats();
        let count = |kind: WaitKind| {
            stats
                .buckets
                .iter()
                .find(|b| b.kind == kind)
                .map(|b| b.pending)
                .unwrap()
        };
        assert_eq!(count(WaitKind::Frames), 1);
        assert_eq!(count(WaitKind::Seconds), 1);
        assert_eq!(count(WaitKind::Late), 1);
        assert_eq!(count(WaitKind::Immediate), 0);
        assert_eq!(stats.total_resumed, 3);
    }
}
