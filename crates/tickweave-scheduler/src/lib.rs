//! # Tickweave Scheduler
//!
//! Single-threaded cooperative coroutine scheduler for discrete per-frame
//! update loops. Multi-step, time-spanning logic ("wait 2 seconds, then do
//! X; repeat until done") is written as one resumable sequence instead of a
//! hand-rolled state machine; the registry guarantees at most one step per
//! sequence per host tick and resumes each sequence exactly where it
//! suspended.
//!
//! ## Architecture
//! ```text
//! host tick ──► Scheduler::update()          Scheduler::late_update()
//!                 │                            │
//!                 ▼                            ▼
//!               buckets by wait kind         late bucket
//!                 ├── immediate   (ungated)
//!                 ├── frames      (frame index ≥ target)
//!                 ├── seconds     (wall clock ≥ deadline)
//!                 └── nested      (child no longer registered)
//!
//! builders: once / frame_once / repeat / wait_until / after_lag ...
//!   └── each is a small Routine started through Scheduler::start
//! ```
//!
//! Single-threaded by design: no locks, no atomics on the hot path; the
//! host calls both tick hooks from its own loop, and `Owner` tokens gate
//! everything scheduled on behalf of an object that may go away.

mod builders;

pub mod coroutine;
pub mod driver;
pub mod engine;
pub mod lag;
pub mod wait;

pub use coroutine::{CoHandle, CoId, Coroutine, Owner, OwnerRef, Routine, Step, TickContext};
pub use driver::run_frames;
pub use engine::{BucketStats, Scheduler, SchedulerStats};
pub use lag::LagProbe;
pub use wait::{FrameDelay, TimeDelay, Wait, WaitKind};
