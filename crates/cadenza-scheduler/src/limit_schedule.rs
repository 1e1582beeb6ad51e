//! Fire-count limiting decorator.

use std::sync::Arc;

use chrono::DateTime;
use chrono_tz::Tz;
use parking_lot::Mutex;

use crate::options::ScheduleOptions;
use crate::schedule::{Schedule, SchedulerContext};

struct LimitState {
    remaining: u32,
    /// Most recent (input, output) pair. The engine re-queries `next`
    /// redundantly during tick sweeps; serving equal inputs from this cache
    /// is what keeps those queries from consuming budget.
    cache: Option<(DateTime<Tz>, Option<DateTime<Tz>>)>,
}

/// Caps an inner schedule at a fixed number of distinct fire times.
///
/// Name and options pass through to the inner schedule, so flags like
/// `IGNORE_ERRORS` set on the inner schedule keep governing the record.
/// Only a query whose answer differs from the cached answer consumes
/// budget; repeated queries with an equal input are free.
pub struct LimitSchedule {
    name: String,
    inner: Arc<dyn Schedule>,
    state: Mutex<LimitState>,
}

impl LimitSchedule {
    pub fn new(count: u32, inner: Arc<dyn Schedule>) -> Self {
        Self {
            name: format!("limit {count} ({})", inner.name()),
            inner,
            state: Mutex::new(LimitState {
                remaining: count,
                cache: None,
            }),
        }
    }

    /// Fire times still available.
    pub fn remaining(&self) -> u32 {
        self.state.lock().remaining
    }
}

impl Schedule for LimitSchedule {
    fn name(&self) -> &str {
        &self.name
    }

    fn options(&self) -> ScheduleOptions {
        self.inner.options()
    }

    fn next(&self, ctx: &dyn SchedulerContext, last: DateTime<Tz>) -> Option<DateTime<Tz>> {
        let mut state = self.state.lock();

        if state.remaining == 0 {
            return None;
        }
        if let Some((input, output)) = state.cache {
            if input == last {
                return output;
            }
        }

        let output = self.inner.next(ctx, last);
        let distinct = state.cache.map_or(true, |(_, cached)| cached != output);
        if distinct {
            state.remaining -= 1;
        }
        state.cache = Some((last, output));
        output
    }
}
