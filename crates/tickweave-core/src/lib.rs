//! # Tickweave Core
//!
//! Shared plumbing for the tickweave workspace: the error type, the TOML
//! configuration layer, and the frame-clock abstraction the scheduler
//! consumes from its host.

pub mod clock;
pub mod config;
pub mod error;

pub use clock::{FrameClock, ManualClock};
pub use config::{DriverConfig, LagConfig, TickweaveConfig};
pub use error::{Result, TickweaveError};
