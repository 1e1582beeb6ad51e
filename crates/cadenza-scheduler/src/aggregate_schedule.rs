//! Earliest-of composition over several schedules.

use std::sync::Arc;

use chrono::DateTime;
use chrono_tz::Tz;

use crate::error::{ScheduleError, ScheduleResult};
use crate::options::ScheduleOptions;
use crate::schedule::{Schedule, SchedulerContext};

/// Fires whenever the earliest of its children would fire.
///
/// All children must carry the same options bitset; mixing flags across the
/// composition is rejected at construction. A child answering at or before
/// `last` forces an immediate re-fire at `last` itself.
pub struct AggregateSchedule {
    name: String,
    children: Vec<Arc<dyn Schedule>>,
    options: ScheduleOptions,
}

impl AggregateSchedule {
    pub fn new(children: Vec<Arc<dyn Schedule>>) -> ScheduleResult<Self> {
        let Some(first) = children.first() else {
            return Err(ScheduleError::EmptyAggregate);
        };
        let options = first.options();
        if children.iter().any(|child| child.options() != options) {
            return Err(ScheduleError::MixedAggregateOptions);
        }
        let name = format!(
            "aggregate [{}]",
            children
                .iter()
                .map(|c| c.name().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );
        Ok(Self {
            name,
            children,
            options,
        })
    }

    /// Number of composed children.
    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

impl Schedule for AggregateSchedule {
    fn name(&self) -> &str {
        &self.name
    }

    fn options(&self) -> ScheduleOptions {
        self.options
    }

    fn next(&self, ctx: &dyn SchedulerContext, last: DateTime<Tz>) -> Option<DateTime<Tz>> {
        let mut earliest: Option<DateTime<Tz>> = None;
        for child in &self.children {
            match child.next(ctx, last) {
                Some(next) if next <= last => return Some(last),
                Some(next) => {
                    if earliest.map_or(true, |e| next < e) {
                        earliest = Some(next);
                    }
                }
                None => {}
            }
        }
        earliest
    }
}
