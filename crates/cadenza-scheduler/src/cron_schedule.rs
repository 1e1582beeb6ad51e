//! Cron-expression schedules.

use std::str::FromStr;

use chrono::{DateTime, Duration, LocalResult, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::error::{ScheduleError, ScheduleResult};
use crate::options::ScheduleOptions;
use crate::schedule::{Schedule, SchedulerContext};

/// Upper bound on wall-clock occurrences examined per query. Far larger
/// than any real expression needs within the scan window; guards against
/// pathological expressions that never produce a mappable occurrence.
const SCAN_LIMIT: usize = 10_000;

/// The largest UTC-offset change any zone's transition produces; the scan
/// window behind `last` must cover it so occurrences repeated by a backward
/// jump are seen.
fn max_transition() -> Duration {
    Duration::hours(4)
}

/// Fires on a cron expression, evaluated in the zone of `last`.
///
/// The expression is parsed at construction; a malformed expression fails
/// there and never reaches the engine. Occurrences are resolved on the
/// instant axis: wall-clock times erased by a spring-forward transition are
/// skipped, and wall-clock times repeated by a fall-back transition fire
/// once per offset.
///
/// When align options are combined with a cron expression, rounding is
/// applied to every answer. Rounding that pushes an answer past a later
/// cron occurrence coalesces the two firings into one.
pub struct CronSchedule {
    name: String,
    expression: String,
    schedule: cron::Schedule,
    options: ScheduleOptions,
}

impl CronSchedule {
    /// Parse `expression` (6/7-field, seconds first).
    pub fn new(expression: &str) -> ScheduleResult<Self> {
        Self::with_options(expression, ScheduleOptions::NONE)
    }

    pub fn with_options(expression: &str, options: ScheduleOptions) -> ScheduleResult<Self> {
        let schedule = cron::Schedule::from_str(expression).map_err(|e| {
            ScheduleError::InvalidCronExpression {
                expression: expression.to_string(),
                message: e.to_string(),
            }
        })?;
        Ok(Self {
            name: format!("cron {expression}"),
            expression: expression.to_string(),
            schedule,
            options,
        })
    }

    /// The expression this schedule was built from.
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// All instants a wall-clock time maps to in `tz`, earliest first.
    fn instants_of(tz: Tz, wall: NaiveDateTime) -> [Option<DateTime<Tz>>; 2] {
        match tz.from_local_datetime(&wall) {
            LocalResult::Single(t) => [Some(t), None],
            LocalResult::Ambiguous(earliest, latest) => [Some(earliest), Some(latest)],
            LocalResult::None => [None, None],
        }
    }
}

impl Schedule for CronSchedule {
    fn name(&self) -> &str {
        &self.name
    }

    fn options(&self) -> ScheduleOptions {
        self.options
    }

    fn next(&self, _ctx: &dyn SchedulerContext, last: DateTime<Tz>) -> Option<DateTime<Tz>> {
        let tz = last.timezone();

        // The cron engine enumerates wall-clock occurrences; iterating it in
        // UTC keeps that enumeration free of transitions. Starting one
        // transition-width behind `last` keeps wall times whose second
        // mapping is still ahead of `last` inside the window.
        let scan_from = last
            .naive_local()
            .checked_sub_signed(max_transition())
            .unwrap_or_else(|| last.naive_local());
        let probe = Utc.from_utc_datetime(&scan_from);

        let mut best: Option<DateTime<Tz>> = None;
        for occurrence in self.schedule.after(&probe).take(SCAN_LIMIT) {
            let wall = occurrence.naive_utc();
            if let Some(found) = best {
                // Any occurrence this far past the best candidate's wall
                // time maps to a strictly later instant.
                if wall > found.naive_local() + max_transition() {
                    break;
                }
            }
            for instant in Self::instants_of(tz, wall).into_iter().flatten() {
                if instant > last && best.map_or(true, |b| instant < b) {
                    best = Some(instant);
                }
            }
        }
        best
    }
}
