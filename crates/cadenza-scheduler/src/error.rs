//! Error types for the scheduler.

use thiserror::Error;

/// Errors raised while constructing a schedule.
///
/// Schedule errors are always synchronous: a malformed cron expression or a
/// mis-assembled aggregate fails at the construction site and never reaches
/// the engine.
#[derive(Debug, Error)]
pub enum ScheduleError {
    /// The cron expression did not parse.
    #[error("invalid cron expression {expression:?}: {message}")]
    InvalidCronExpression { expression: String, message: String },

    /// The timezone name is not in the timezone database.
    #[error("unknown timezone: {0}")]
    UnknownTimeZone(String),

    /// Aggregate children must share one options bitset.
    #[error("aggregate children carry differing schedule options")]
    MixedAggregateOptions,

    /// An aggregate needs at least one child.
    #[error("aggregate schedule has no children")]
    EmptyAggregate,
}

/// Result type for schedule construction.
pub type ScheduleResult<T> = Result<T, ScheduleError>;

/// Errors reported by a job run.
#[derive(Debug, Error)]
pub enum JobError {
    /// The job reported a failure.
    #[error("job failed: {0}")]
    Failed(String),

    /// The job observed its cancellation token and stopped early.
    ///
    /// Cancellation is not a failure: it is never logged as one and never
    /// auto-disables the record.
    #[error("job cancelled")]
    Cancelled,

    /// A wrapped error from user code; the full cause chain is logged.
    #[error("job failed: {source}")]
    Other {
        #[from]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },
}
