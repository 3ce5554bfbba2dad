//! Server-tick timing for PackShield.
//!
//! Game servers measure time in ticks (20 per second). This crate provides:
//!
//! - [`Ticks`]: tick spans and the conversion to wall time
//! - [`Scheduler`]: delayed and repeating callbacks with cancellation
//! - [`TaskHandle`]: the cancellation handle those callbacks return
//! - [`TokioScheduler`]: production scheduler, one Tokio task per timer
//! - [`ManualScheduler`]: deterministic scheduler driven by hand
//!
//! # Cancellation model
//!
//! Cancelling a handle guarantees that the callback is not started again.
//! It does not interrupt an invocation that is already running, so
//! callbacks re-check whatever state they act on.

mod handle;
mod manual;
mod scheduler;
mod ticks;

pub use handle::{TaskHandle, TaskId};
pub use manual::ManualScheduler;
pub use scheduler::{OnceTask, RepeatingTask, Scheduler, TokioScheduler};
pub use ticks::{TICK_DURATION, TICKS_PER_SECOND, Ticks};
