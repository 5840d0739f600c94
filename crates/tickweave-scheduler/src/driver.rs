//! Fixed-rate tick driver — for hosts that do not bring their own frame
//! loop. Uses tokio::interval for zero-overhead ticking (sleeps between
//! frames) and feeds measured deltas into the shared clock.
//!
//! Runs on the calling task; the scheduler is single-threaded by design, so
//! this is meant for a current-thread runtime, not for spawning.

use std::time::{Duration, Instant};

use tickweave_core::ManualClock;

use crate::engine::Scheduler;

/// Drive `update`/`late_update` at `fps` until `max_frames` ticks have run,
/// or — when unbounded — until the registry goes idle. Returns the number
/// of frames driven.
pub async fn run_frames(
    sched: &mut Scheduler,
    clock: &ManualClock,
    fps: u32,
    max_frames: Option<u64>,
) -> u64 {
    let period = Duration::from_secs_f64(1.0 / fps.max(1) as f64);
    let mut interval = tokio::time::interval(period);
    tracing::info!("⏱️ Tick driver started ({fps} fps)");

    let mut last = Instant::now();
    let mut frames: u64 = 0;
    loop {
        interval.tick().await;
        let now = Instant::now();
        clock.advance(now.duration_since(last).as_secs_f64() * 1000.0);
        last = now;

        sched.update();
        sched.late_update();
        frames += 1;

        match max_frames {
            Some(max) if frames >= max => break,
            None if sched.pending() == 0 => break,
            _ => {}
        }
    }
    tracing::info!("⏹️ Tick driver stopped after {frames} frames");
    frames
}
