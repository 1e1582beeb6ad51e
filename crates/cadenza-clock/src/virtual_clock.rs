//! Virtual time for tests and simulation.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

use crate::{Clock, ClockPrecision};

type AdvanceFn = Box<dyn Fn(DateTime<Utc>) -> DateTime<Utc> + Send + Sync>;

/// A clock driven by a pure function over its own last reading.
///
/// Every [`Clock::now`] call computes `f(last)`, stores it, and returns it.
/// The convenience constructors cover the common shapes:
///
/// - [`VirtualClock::fixed`]: time stands still until moved explicitly.
/// - [`VirtualClock::stepping`]: each query advances time by a fixed step;
///   the first reading is the given start.
/// - [`VirtualClock::never`]: always the maximum representable instant.
///
/// [`VirtualClock::advance`] and [`VirtualClock::set`] move the retained
/// reading directly, which is how tests jump over idle stretches.
pub struct VirtualClock {
    advance: AdvanceFn,
    last: Mutex<DateTime<Utc>>,
}

impl VirtualClock {
    /// A clock computing each reading as `f(last)`, starting from `last`.
    pub fn new<F>(last: DateTime<Utc>, f: F) -> Self
    where
        F: Fn(DateTime<Utc>) -> DateTime<Utc> + Send + Sync + 'static,
    {
        Self {
            advance: Box::new(f),
            last: Mutex::new(last),
        }
    }

    /// A clock frozen at `at` until [`set`](Self::set) or
    /// [`advance`](Self::advance) moves it.
    pub fn fixed(at: DateTime<Utc>) -> Self {
        Self::new(at, |last| last)
    }

    /// A clock whose readings start at `start` and advance by `step` on
    /// every query.
    pub fn stepping(start: DateTime<Utc>, step: Duration) -> Self {
        // The retained reading begins one step early so the first query
        // observes exactly `start`.
        Self::new(start - step, move |last| last + step)
    }

    /// A clock pinned to the maximum representable instant.
    pub fn never() -> Self {
        Self::new(DateTime::<Utc>::MAX_UTC, |last| last)
    }

    /// The most recent reading, without advancing.
    pub fn last(&self) -> DateTime<Utc> {
        *self.last.lock()
    }

    /// Move the retained reading forward by `delta`.
    pub fn advance(&self, delta: Duration) {
        let mut last = self.last.lock();
        *last += delta;
    }

    /// Pin the retained reading to `at`.
    pub fn set(&self, at: DateTime<Utc>) {
        *self.last.lock() = at;
    }
}

impl Clock for VirtualClock {
    fn now(&self) -> DateTime<Utc> {
        let mut last = self.last.lock();
        *last = (self.advance)(*last);
        *last
    }

    fn precision(&self) -> ClockPrecision {
        ClockPrecision::Standard
    }
}
