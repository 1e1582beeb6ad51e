//! Per-schedule option flags.

use std::ops::BitOr;

use serde::{Deserialize, Serialize};

/// Bitset of schedule behaviour flags.
///
/// Flags are independent and combine with `|`:
///
/// ```
/// use cadenza_scheduler::ScheduleOptions;
///
/// let opts = ScheduleOptions::IGNORE_ERRORS | ScheduleOptions::ALIGN_SECONDS;
/// assert!(opts.contains(ScheduleOptions::ALIGN_SECONDS));
/// assert!(!opts.contains(ScheduleOptions::LONG_RUNNING));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ScheduleOptions(u8);

impl ScheduleOptions {
    /// No flags set.
    pub const NONE: Self = Self(0);

    /// Job failure does not auto-disable the record.
    pub const IGNORE_ERRORS: Self = Self(1 << 0);

    /// Compute the next fire relative to the previous due time instead of
    /// the previous completion.
    pub const FROM_DUE: Self = Self(1 << 1);

    /// Round the computed due time up to the next second boundary.
    pub const ALIGN_SECONDS: Self = Self(1 << 2);

    /// Round the computed due time up to the next minute boundary.
    pub const ALIGN_MINUTES: Self = Self(1 << 3);

    /// Round the computed due time up to the next hour boundary.
    pub const ALIGN_HOURS: Self = Self(1 << 4);

    /// Round the computed due time up to the next day boundary.
    pub const ALIGN_DAYS: Self = Self(1 << 5);

    /// Exempt the job from the scheduler-wide maximum execution duration.
    pub const LONG_RUNNING: Self = Self(1 << 6);

    /// Whether every flag in `other` is set in `self`.
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// A copy of `self` with the flags in `other` also set.
    pub fn with(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Whether no flag is set.
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for ScheduleOptions {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.with(rhs)
    }
}
