//! Boundary alignment for computed due times.

use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::options::ScheduleOptions;

const NANOS_PER_SEC: i128 = 1_000_000_000;

/// The time-unit boundary a due time can be rounded up to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlignUnit {
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl AlignUnit {
    fn boundary_nanos(self) -> i128 {
        match self {
            AlignUnit::Seconds => NANOS_PER_SEC,
            AlignUnit::Minutes => 60 * NANOS_PER_SEC,
            AlignUnit::Hours => 3_600 * NANOS_PER_SEC,
            AlignUnit::Days => 86_400 * NANOS_PER_SEC,
        }
    }

    /// The unit selected by `opts`, honouring the precedence
    /// Days > Hours > Minutes > Seconds. `None` when no align flag is set.
    pub fn from_options(opts: ScheduleOptions) -> Option<Self> {
        if opts.contains(ScheduleOptions::ALIGN_DAYS) {
            Some(AlignUnit::Days)
        } else if opts.contains(ScheduleOptions::ALIGN_HOURS) {
            Some(AlignUnit::Hours)
        } else if opts.contains(ScheduleOptions::ALIGN_MINUTES) {
            Some(AlignUnit::Minutes)
        } else if opts.contains(ScheduleOptions::ALIGN_SECONDS) {
            Some(AlignUnit::Seconds)
        } else {
            None
        }
    }
}

/// Round `ts` up to the next `unit` boundary on the instant axis.
///
/// The boundary grid is anchored at the Unix epoch; the result is
/// re-anchored to the zone `ts` carried. Timestamps already on the boundary
/// pass through unchanged, which also makes the operation idempotent.
pub fn align_up(ts: DateTime<Tz>, unit: AlignUnit) -> DateTime<Tz> {
    let boundary = unit.boundary_nanos();
    let nanos =
        i128::from(ts.timestamp()) * NANOS_PER_SEC + i128::from(ts.timestamp_subsec_nanos());
    let rounded = nanos.div_euclid(boundary) * boundary;
    let rounded = if rounded == nanos {
        rounded
    } else {
        rounded + boundary
    };

    let secs = rounded.div_euclid(NANOS_PER_SEC);
    let subsec = rounded.rem_euclid(NANOS_PER_SEC);
    let Ok(secs) = i64::try_from(secs) else {
        return ts;
    };
    match Utc.timestamp_opt(secs, subsec as u32) {
        chrono::LocalResult::Single(utc) => utc.with_timezone(&ts.timezone()),
        // Out of the representable range; rounding is abandoned rather than
        // moving the result backward.
        _ => ts,
    }
}

/// Apply the align flags in `opts` to a schedule's answer.
///
/// `None` inputs and flag-free options pass through untouched.
pub fn apply_options(ts: Option<DateTime<Tz>>, opts: ScheduleOptions) -> Option<DateTime<Tz>> {
    match (ts, AlignUnit::from_options(opts)) {
        (Some(ts), Some(unit)) => Some(align_up(ts, unit)),
        (ts, _) => ts,
    }
}
