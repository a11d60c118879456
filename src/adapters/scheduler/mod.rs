//! Recurring job adapters.
//!
//! The expiry sweep runs on a cron schedule through `tokio-cron-scheduler`
//! and once shortly after startup, so a restart never waits a full period
//! before stale flags are reset.

mod expiry_sweep;

pub use expiry_sweep::{ExpirySweepScheduler, SchedulerError};
