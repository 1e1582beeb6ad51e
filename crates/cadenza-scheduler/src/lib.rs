//! # cadenza-scheduler
//!
//! An in-process job scheduler: jobs are opaque async units, schedules are
//! pure "next fire time" functions, and the engine mediates between them
//! with timezone-correct arithmetic, cooperative cancellation, single-flight
//! execution per job, and dynamic enable/disable at both scopes.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        Scheduler engine                       │
//! │   job set (id -> JobRecord)      master cancellation          │
//! │   single timer                   atomic tick-state counter    │
//! └───────────────┬──────────────────────────────┬───────────────┘
//!                 │ due?                         │ fire
//! ┌───────────────▼───────────────┐ ┌────────────▼───────────────┐
//! │           Schedules            │ │          JobRecord          │
//! │  one-off · gap · fn · cron     │ │  due recomputation          │
//! │  limit(inner) · aggregate(...) │ │  single-flight debounce     │
//! │  + alignment + options         │ │  failure -> disable         │
//! └───────────────────────────────┘ └────────────────────────────┘
//! ```
//!
//! The tick loop wakes on timer expiry, job-set mutation, or execution
//! completion; it fires everything due, publishes the nearest future due,
//! and arms exactly one timer. Sub-millisecond waits are served by spinning
//! because OS timers cannot hit them.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use cadenza_scheduler::{GapSchedule, Scheduler, SchedulerConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let scheduler = Scheduler::new(SchedulerConfig::default()).unwrap();
//!     scheduler.add_fn(
//!         "heartbeat",
//!         Arc::new(GapSchedule::every_secs(30)),
//!         |_ctx| async move { Ok(()) },
//!     );
//! }
//! ```

pub mod align;
pub mod aggregate_schedule;
pub mod config;
pub mod cron_schedule;
pub mod error;
pub mod execution;
pub mod job;
pub mod limit_schedule;
pub mod options;
pub mod record;
pub mod schedule;
pub mod scheduler;
pub mod zone;

// Re-exports
pub use aggregate_schedule::AggregateSchedule;
pub use align::{align_up, apply_options, AlignUnit};
pub use config::SchedulerConfig;
pub use cron_schedule::CronSchedule;
pub use error::{JobError, ScheduleError, ScheduleResult};
pub use execution::{Completion, Execution, RunOutcome};
pub use job::{FnJob, Job, JobContext};
pub use limit_schedule::LimitSchedule;
pub use options::ScheduleOptions;
pub use record::JobRecord;
pub use schedule::{FnSchedule, GapSchedule, OneOffSchedule, Schedule, SchedulerContext};
pub use scheduler::Scheduler;
pub use zone::{TimeZoneProvider, TzDatabase};

// Re-export the clock surface for convenience
pub use cadenza_clock::{Clock, ClockPrecision, FastClock, SynchronizedClock, SystemClock, VirtualClock};
// Re-export CancellationToken for convenience
pub use tokio_util::sync::CancellationToken;

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
