//! The schedule contract and the value-like schedules.
//!
//! A schedule is a pure "next fire time" function: given the previous fire
//! (or the current time on the first query) it answers with the next due
//! instant, or `None` when it is exhausted. Schedules must be safe to query
//! repeatedly with the same argument and give the same answer; the engine
//! re-queries them during tick sweeps.

use std::sync::Arc;

use cadenza_clock::Clock;
use chrono::{DateTime, Duration};
use chrono_tz::Tz;

use crate::options::ScheduleOptions;

/// The slice of the engine a schedule may consult.
///
/// Schedules receive this instead of the engine itself so they stay pure:
/// the clock and the default zone are the only ambient inputs a next-fire
/// computation may depend on.
pub trait SchedulerContext: Send + Sync {
    /// The engine's clock.
    fn clock(&self) -> &Arc<dyn Clock>;

    /// The engine's default zone for new due times.
    fn time_zone(&self) -> Tz;

    /// The current instant anchored to the default zone.
    fn zoned_now(&self) -> DateTime<Tz> {
        self.clock().now().with_timezone(&self.time_zone())
    }
}

/// A source of fire times.
///
/// `last` is the previous completion's zoned time, or the previous due time
/// when the `FROM_DUE` option is set, or the engine's current zoned time on
/// the first query and after re-enabling.
pub trait Schedule: Send + Sync {
    /// Display name, used in logging.
    fn name(&self) -> &str;

    /// The option flags governing this schedule's records.
    fn options(&self) -> ScheduleOptions;

    /// The next fire strictly governed by `last`, or `None` when exhausted.
    fn next(&self, ctx: &dyn SchedulerContext, last: DateTime<Tz>) -> Option<DateTime<Tz>>;
}

/// Fires exactly once, at a fixed instant.
///
/// Answers the instant while it is still in the future of `last` (compared
/// on the instant axis) and `None` afterwards.
pub struct OneOffSchedule {
    name: String,
    at: DateTime<Tz>,
    options: ScheduleOptions,
}

impl OneOffSchedule {
    pub fn new(at: DateTime<Tz>) -> Self {
        Self::with_options(at, ScheduleOptions::NONE)
    }

    pub fn with_options(at: DateTime<Tz>, options: ScheduleOptions) -> Self {
        Self {
            name: format!("one-off @ {}", at.to_rfc3339()),
            at,
            options,
        }
    }
}

impl Schedule for OneOffSchedule {
    fn name(&self) -> &str {
        &self.name
    }

    fn options(&self) -> ScheduleOptions {
        self.options
    }

    fn next(&self, _ctx: &dyn SchedulerContext, last: DateTime<Tz>) -> Option<DateTime<Tz>> {
        (self.at > last).then_some(self.at)
    }
}

/// Fires a fixed interval after each `last`.
///
/// Negative gaps clamp to zero. The answer inherits the zone `last` carried.
pub struct GapSchedule {
    name: String,
    gap: Duration,
    options: ScheduleOptions,
}

impl GapSchedule {
    pub fn new(gap: Duration) -> Self {
        Self::with_options(gap, ScheduleOptions::NONE)
    }

    pub fn with_options(gap: Duration, options: ScheduleOptions) -> Self {
        let gap = gap.max(Duration::zero());
        Self {
            name: format!("gap {gap}"),
            gap,
            options,
        }
    }

    /// A gap of whole seconds.
    pub fn every_secs(secs: i64) -> Self {
        Self::new(Duration::seconds(secs))
    }

    /// A gap of whole minutes.
    pub fn every_minutes(minutes: i64) -> Self {
        Self::new(Duration::minutes(minutes))
    }

    /// The clamped interval.
    pub fn gap(&self) -> Duration {
        self.gap
    }
}

impl Schedule for GapSchedule {
    fn name(&self) -> &str {
        &self.name
    }

    fn options(&self) -> ScheduleOptions {
        self.options
    }

    fn next(&self, _ctx: &dyn SchedulerContext, last: DateTime<Tz>) -> Option<DateTime<Tz>> {
        Some(last + self.gap)
    }
}

type NextFn =
    Box<dyn Fn(&dyn SchedulerContext, DateTime<Tz>) -> Option<DateTime<Tz>> + Send + Sync>;

/// A schedule computed by an arbitrary closure.
pub struct FnSchedule {
    name: String,
    options: ScheduleOptions,
    next: NextFn,
}

impl FnSchedule {
    pub fn new<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&dyn SchedulerContext, DateTime<Tz>) -> Option<DateTime<Tz>> + Send + Sync + 'static,
    {
        Self::with_options(name, ScheduleOptions::NONE, f)
    }

    pub fn with_options<F>(name: impl Into<String>, options: ScheduleOptions, f: F) -> Self
    where
        F: Fn(&dyn SchedulerContext, DateTime<Tz>) -> Option<DateTime<Tz>> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            options,
            next: Box::new(f),
        }
    }
}

impl Schedule for FnSchedule {
    fn name(&self) -> &str {
        &self.name
    }

    fn options(&self) -> ScheduleOptions {
        self.options
    }

    fn next(&self, ctx: &dyn SchedulerContext, last: DateTime<Tz>) -> Option<DateTime<Tz>> {
        (self.next)(ctx, last)
    }
}
