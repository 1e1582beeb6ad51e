//! The job contract.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::DateTime;
use chrono_tz::Tz;
use futures::future::BoxFuture;
use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::JobError;
use crate::record::JobRecord;
use crate::scheduler::Scheduler;

/// An executable unit driven by the scheduler.
///
/// The scheduler treats jobs as opaque: it starts them, observes the
/// outcome, and otherwise never inspects them. Implementations should watch
/// `ctx.cancellation()` and return [`JobError::Cancelled`] when it fires.
#[async_trait]
pub trait Job: Send + Sync {
    /// Display name, used in logging.
    fn name(&self) -> &str;

    /// Run once.
    async fn run(&self, ctx: JobContext) -> Result<(), JobError>;
}

/// What a running job can see and touch of its own registration.
pub struct JobContext {
    record: Arc<JobRecord>,
    due: Option<DateTime<Tz>>,
    manual: bool,
    cancel: CancellationToken,
}

impl JobContext {
    pub(crate) fn new(
        record: Arc<JobRecord>,
        due: Option<DateTime<Tz>>,
        manual: bool,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            record,
            due,
            manual,
            cancel,
        }
    }

    /// The registration's unique id.
    pub fn id(&self) -> Uuid {
        self.record.id()
    }

    /// The job's display name.
    pub fn name(&self) -> &str {
        self.record.name()
    }

    /// The schedule's display name; `None` for a manual fire.
    pub fn schedule_name(&self) -> Option<&str> {
        (!self.manual).then(|| self.record.schedule_name())
    }

    /// The due time this run was started for.
    pub fn due(&self) -> Option<DateTime<Tz>> {
        self.due
    }

    /// Whether this run was started by an explicit out-of-band trigger.
    pub fn is_manual(&self) -> bool {
        self.manual
    }

    /// Always true inside [`Job::run`]; retained for observers holding a
    /// context beyond the run.
    pub fn is_executing(&self) -> bool {
        self.record.is_executing()
    }

    /// The registration's enabled flag.
    pub fn is_enabled(&self) -> bool {
        self.record.is_enabled()
    }

    /// Flip the registration's enabled flag; disabling prevents further
    /// fires once this run completes.
    pub fn set_enabled(&self, enabled: bool) {
        self.record.set_enabled(enabled);
    }

    /// The owning engine, when it is still alive.
    pub fn scheduler(&self) -> Option<Scheduler> {
        self.record.scheduler()
    }

    /// The token this run should observe for cooperative cancellation.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }
}

type JobFn = Box<dyn Fn(JobContext) -> BoxFuture<'static, Result<(), JobError>> + Send + Sync>;

/// A job backed by an async closure.
///
/// ```no_run
/// use cadenza_scheduler::FnJob;
///
/// let job = FnJob::new("heartbeat", |_ctx| async move {
///     // ... do the work ...
///     Ok(())
/// });
/// ```
pub struct FnJob {
    name: String,
    run: JobFn,
}

impl FnJob {
    pub fn new<F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(JobContext) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<(), JobError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            run: Box::new(move |ctx| f(ctx).boxed()),
        }
    }
}

#[async_trait]
impl Job for FnJob {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: JobContext) -> Result<(), JobError> {
        (self.run)(ctx).await
    }
}
