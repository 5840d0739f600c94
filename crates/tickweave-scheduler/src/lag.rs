//! Frame-lag probe — detects when a burst of frame jitter has settled.
//!
//! The probe samples delta time once per tick into a short sliding window
//! and completes as soon as the window's variance drops below a threshold,
//! or unconditionally once a maximum number of frames has elapsed. Loading
//! screens and asset-spawn storms both produce wildly uneven deltas; "the
//! variance went quiet" is a serviceable definition of "the hitch is over".

use std::collections::VecDeque;

use tickweave_core::LagConfig;

use crate::coroutine::{CoHandle, Owner, Routine, Step, TickContext};
use crate::engine::Scheduler;
use crate::wait::Wait;

/// Mean of squared deviations over the window.
fn window_variance(samples: &VecDeque<f64>) -> f64 {
    let n = samples.len() as f64;
    let mean = samples.iter().sum::<f64>() / n;
    samples.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n
}

/// Samples `ctx.delta_ms` each resumption; done when the sliding window's
/// variance falls below the threshold or the frame cap is reached.
pub struct LagProbe {
    cfg: LagConfig,
    samples: VecDeque<f64>,
    deadline_frame: Option<u64>,
}

impl LagProbe {
    pub fn new(cfg: LagConfig) -> Self {
        Self {
            cfg,
            samples: VecDeque::new(),
            deadline_frame: None,
        }
    }
}

impl Routine for LagProbe {
    fn resume(&mut self, ctx: &TickContext) -> anyhow::Result<Step> {
        let deadline = *self
            .deadline_frame
            .get_or_insert(ctx.frame + self.cfg.max_window_frames);

        self.samples.push_back(ctx.delta_ms);
        while self.samples.len() > self.cfg.sample_window {
            self.samples.pop_front();
        }

        if self.samples.len() >= self.cfg.sample_window
            && window_variance(&self.samples) < self.cfg.variance_threshold_ms2
        {
            return Ok(Step::Done);
        }
        if ctx.frame >= deadline {
            tracing::debug!("⏱️ Lag probe gave up after {} frames", self.cfg.max_window_frames);
            return Ok(Step::Done);
        }
        Ok(Step::Yield(Wait::Immediate))
    }
}

enum AfterLagState {
    Init,
    Waiting,
    Finished,
}

/// Waits on a running [`LagProbe`] as a nested sequence, then invokes the
/// callback once.
struct AfterLag<F: FnMut()> {
    probe: CoHandle,
    callback: F,
    state: AfterLagState,
}

impl<F: FnMut()> Routine for AfterLag<F> {
    fn resume(&mut self, _ctx: &TickContext) -> anyhow::Result<Step> {
        match self.state {
            AfterLagState::Init => {
                self.state = AfterLagState::Waiting;
                Ok(Step::Yield(Wait::Routine(self.probe)))
            }
            AfterLagState::Waiting => {
                self.state = AfterLagState::Finished;
                (self.callback)();
                Ok(Step::Done)
            }
            AfterLagState::Finished => Ok(Step::Done),
        }
    }
}

impl Scheduler {
    /// Start a bare lag probe. The returned handle can be yielded on as a
    /// nested wait.
    pub fn watch_lag(&mut self, owner: Option<&Owner>) -> CoHandle {
        let probe = LagProbe::new(self.lag_config().clone());
        self.start(probe, owner)
    }

    /// Invoke `callback` once the frame rate has settled (or the probe's
    /// frame cap has elapsed, whichever comes first).
    pub fn after_lag<F>(&mut self, callback: F, owner: Option<&Owner>) -> CoHandle
    where
        F: FnMut() + 'static,
    {
        let probe = self.watch_lag(owner);
        self.start(
            AfterLag {
                probe,
                callback,
                state: AfterLagState::Init,
            },
            owner,
        )
    }
}
