//! Wait conditions — the values a coroutine yields to say when it wants to
//! be resumed next. Each condition kind maps to one registry bucket.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::coroutine::CoHandle;

/// What a coroutine is waiting on.
#[derive(Debug, Clone)]
pub enum Wait {
    /// No special wait — resume on the next primary phase.
    Immediate,
    /// Resume once N more frames have elapsed.
    Frames(FrameDelay),
    /// Resume once a wall-clock deadline has passed.
    Seconds(TimeDelay),
    /// Resume on this tick's late phase, after every primary bucket.
    /// Pure routing tag — never re-evaluated.
    Late,
    /// Resume once another coroutine is no longer registered anywhere.
    Routine(CoHandle),
}

impl Wait {
    /// Frame-count delay.
    pub fn frames(frames: u64) -> Self {
        Wait::Frames(FrameDelay::new(frames))
    }

    /// Wall-clock delay.
    pub fn seconds(seconds: f64) -> Self {
        Wait::Seconds(TimeDelay::new(seconds))
    }

    /// The registry bucket this condition files into.
    pub fn kind(&self) -> WaitKind {
        match self {
            Wait::Immediate => WaitKind::Immediate,
            Wait::Frames(_) => WaitKind::Frames,
            Wait::Seconds(_) => WaitKind::Seconds,
            Wait::Late => WaitKind::Late,
            Wait::Routine(_) => WaitKind::Nested,
        }
    }
}

/// Bucket key — one per wait-condition kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WaitKind {
    Immediate,
    Frames,
    Seconds,
    Nested,
    Late,
}

impl WaitKind {
    pub const COUNT: usize = 5;

    /// All kinds, in primary-phase drain order (Late last, drained by the
    /// late phase only).
    pub const ALL: [WaitKind; Self::COUNT] = [
        WaitKind::Immediate,
        WaitKind::Frames,
        WaitKind::Seconds,
        WaitKind::Nested,
        WaitKind::Late,
    ];

    /// Bucket array slot.
    pub fn index(&self) -> usize {
        match self {
            WaitKind::Immediate => 0,
            WaitKind::Frames => 1,
            WaitKind::Seconds => 2,
            WaitKind::Nested => 3,
            WaitKind::Late => 4,
        }
    }
}

impl std::fmt::Display for WaitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WaitKind::Immediate => write!(f, "immediate"),
            WaitKind::Frames => write!(f, "frames"),
            WaitKind::Seconds => write!(f, "seconds"),
            WaitKind::Nested => write!(f, "nested"),
            WaitKind::Late => write!(f, "late"),
        }
    }
}

/// Frame-count delay. Re-armed by the registry after every yield, so the
/// same value can be yielded again for repeating intervals.
#[derive(Debug, Clone)]
pub struct FrameDelay {
    frames: u64,
    done_frame: u64,
}

impl FrameDelay {
    pub fn new(frames: u64) -> Self {
        Self {
            frames,
            done_frame: 0,
        }
    }

    /// Arm against the current frame: done once `frames` more have elapsed.
    pub fn rearm(&mut self, current_frame: u64) {
        self.done_frame = current_frame + self.frames;
    }

    pub fn is_done(&self, current_frame: u64) -> bool {
        current_frame >= self.done_frame
    }
}

/// Wall-clock delay, millisecond resolution.
#[derive(Debug, Clone)]
pub struct TimeDelay {
    millis: i64,
    done_at: DateTime<Utc>,
}

impl TimeDelay {
    pub fn new(seconds: f64) -> Self {
        Self {
            millis: (seconds * 1000.0).round() as i64,
            done_at: Utc::now(),
        }
    }

    /// Arm against the current wall clock.
    pub fn rearm(&mut self) {
        self.done_at = Utc::now() + Duration::milliseconds(self.millis);
    }

    pub fn is_done(&self) -> bool {
        Utc::now() >= self.done_at
    }
}
