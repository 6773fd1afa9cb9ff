//! Job update bus.
//!
//! - [`JobEventBus`]: in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`, fed by the orchestrator after every persisted
//!   status write.
//! - [`JobUpdate`]: the envelope carried on the bus.
//! - [`ActivityLog`]: background subscriber that writes job lifecycle
//!   transitions to the log.

pub mod activity;
pub mod bus;

pub use activity::ActivityLog;
pub use bus::{JobEventBus, JobUpdate};
