//! Per-registration job records.

#[cfg(test)]
#[path = "record_tests.rs"]
mod tests;

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};

use chrono::DateTime;
use chrono_tz::Tz;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::align::apply_options;
use crate::error::JobError;
use crate::execution::{Completion, Execution, RunOutcome};
use crate::job::{Job, JobContext};
use crate::options::ScheduleOptions;
use crate::schedule::{Schedule, SchedulerContext};
use crate::scheduler::{Scheduler, SchedulerInner};

struct RecordState {
    enabled: bool,
    manual: bool,
    due: Option<DateTime<Tz>>,
    execution: Option<Execution>,
}

/// One (job, schedule) registration.
///
/// A record owns the per-job lifecycle: it computes due times from its
/// schedule, debounces concurrent fire requests into a single execution,
/// and reacts to failure by disabling itself unless the schedule carries
/// `IGNORE_ERRORS`.
///
/// The engine owns records by id; the record's back-reference is a weak
/// relation used only for "am I still attached?" checks and clock access.
pub struct JobRecord {
    id: Uuid,
    job: Arc<dyn Job>,
    schedule: Arc<dyn Schedule>,
    scheduler: Weak<SchedulerInner>,
    state: Mutex<RecordState>,
    /// Serialises due recomputation. The schedule is queried under this
    /// lock only, never under `state`, so completion callbacks can re-enter
    /// the engine without lock-ordering hazards.
    recompute: Mutex<()>,
}

impl JobRecord {
    pub(crate) fn new(
        job: Arc<dyn Job>,
        schedule: Arc<dyn Schedule>,
        scheduler: Weak<SchedulerInner>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            job,
            schedule,
            scheduler,
            state: Mutex::new(RecordState {
                enabled: true,
                manual: false,
                due: None,
                execution: None,
            }),
            recompute: Mutex::new(()),
        }
    }

    /// Unique id of this registration.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The job's display name.
    pub fn name(&self) -> &str {
        self.job.name()
    }

    /// The schedule's display name.
    pub fn schedule_name(&self) -> &str {
        self.schedule.name()
    }

    /// The schedule driving this record.
    pub fn schedule(&self) -> &Arc<dyn Schedule> {
        &self.schedule
    }

    fn engine(&self) -> Option<Arc<SchedulerInner>> {
        self.scheduler.upgrade()
    }

    /// The owning engine, when it is still alive.
    pub fn scheduler(&self) -> Option<Scheduler> {
        self.engine().map(Scheduler::from_inner)
    }

    /// Whether the engine still holds this record.
    pub fn is_attached(&self) -> bool {
        self.engine().map_or(false, |e| e.contains(self.id))
    }

    /// The enabled flag.
    pub fn is_enabled(&self) -> bool {
        self.state.lock().enabled
    }

    /// Flip the enabled flag. An effective change recomputes the due time
    /// from the current instant and tells the engine to re-evaluate.
    pub fn set_enabled(&self, enabled: bool) {
        let changed = {
            let mut state = self.state.lock();
            if state.enabled == enabled {
                false
            } else {
                state.enabled = enabled;
                true
            }
        };
        if changed {
            debug!(
                job = %self.name(),
                enabled,
                "record toggled"
            );
            self.refresh_due(true);
            self.notify_engine();
        }
    }

    /// Whether an execution is currently in flight.
    pub fn is_executing(&self) -> bool {
        self.state.lock().execution.is_some()
    }

    /// Whether the in-flight execution came from an explicit trigger.
    pub fn is_manual(&self) -> bool {
        self.state.lock().manual
    }

    /// The next fire time.
    ///
    /// Visible only while the record is enabled, the engine is enabled, and
    /// the record is still attached; `None` otherwise.
    pub fn due(&self) -> Option<DateTime<Tz>> {
        let engine_live = self
            .engine()
            .map_or(false, |e| e.is_enabled() && e.contains(self.id));
        if !engine_live {
            return None;
        }
        let state = self.state.lock();
        if !state.enabled {
            return None;
        }
        state.due
    }

    /// The stored due time, unmasked. Used by the engine's sweep, which has
    /// already checked the surrounding conditions.
    pub(crate) fn stored_due(&self) -> Option<DateTime<Tz>> {
        self.state.lock().due
    }

    /// Manually fire this record.
    ///
    /// An already-cancelled token settles as `Cancelled` without running
    /// anything. When the request coalesces onto an in-flight execution,
    /// the returned completion is this caller's own view: the token cancels
    /// the view, never the underlying run.
    pub fn trigger(self: &Arc<Self>, cancel: CancellationToken) -> Completion {
        if cancel.is_cancelled() {
            return Completion::immediate(RunOutcome::Cancelled);
        }
        if self.engine().map_or(true, |e| e.is_disposed()) {
            return Completion::immediate(RunOutcome::Cancelled);
        }
        self.execute(true, cancel)
    }

    /// Engine-side automatic fire.
    pub(crate) fn fire(self: &Arc<Self>, cancel: CancellationToken) -> Completion {
        self.execute(false, cancel)
    }

    fn execute(self: &Arc<Self>, manual: bool, cancel: CancellationToken) -> Completion {
        if !manual && !self.is_enabled() {
            return Completion::immediate(RunOutcome::Skipped);
        }

        // Publish a new execution only if the slot is empty; otherwise the
        // request coalesces onto the in-flight run.
        let (sender, execution) = {
            let mut state = self.state.lock();
            if let Some(existing) = state.execution.clone() {
                drop(state);
                debug!(
                    job = %self.name(),
                    execution = %existing.id(),
                    manual,
                    "fire coalesced onto in-flight execution"
                );
                let caller = manual.then(|| cancel.clone());
                return Completion::running(existing, caller);
            }
            let (sender, execution) = Execution::new_pair();
            state.execution = Some(execution.clone());
            if manual {
                state.manual = true;
                // Observers expect a meaningful due time during a manual run.
                if let Some(engine) = self.engine() {
                    state.due = Some(engine.zoned_now());
                }
            }
            (sender, execution)
        };

        let record = Arc::clone(self);
        let token = cancel.clone();
        let execution_id = execution.id();
        tokio::spawn(async move {
            record
                .run_to_completion(sender, execution_id, manual, token)
                .await;
        });

        Completion::running(execution, None)
    }

    async fn run_to_completion(
        self: Arc<Self>,
        sender: watch::Sender<Option<RunOutcome>>,
        execution_id: Uuid,
        manual: bool,
        cancel: CancellationToken,
    ) {
        let due = self.stored_due();
        debug!(
            job = %self.name(),
            now = %self.zoned_now_string(),
            manual,
            "job starting"
        );

        let ctx = JobContext::new(Arc::clone(&self), due, manual, cancel.clone());
        let outcome = match AssertUnwindSafe(self.job.run(ctx)).catch_unwind().await {
            Ok(Ok(())) => RunOutcome::Success,
            Ok(Err(JobError::Cancelled)) => RunOutcome::Cancelled,
            Ok(Err(err)) => {
                self.log_failure(&err);
                RunOutcome::Failed
            }
            Err(_) => {
                error!(
                    job = %self.name(),
                    now = %self.zoned_now_string(),
                    "job panicked"
                );
                RunOutcome::Failed
            }
        };

        if outcome == RunOutcome::Failed
            && !self.schedule.options().contains(ScheduleOptions::IGNORE_ERRORS)
        {
            self.state.lock().enabled = false;
            warn!(
                job = %self.name(),
                now = %self.zoned_now_string(),
                "job disabled after failure"
            );
        }

        {
            let mut state = self.state.lock();
            state.manual = false;
            // Compare-and-clear: only our own execution leaves the slot.
            if state
                .execution
                .as_ref()
                .map_or(false, |e| e.id() == execution_id)
            {
                state.execution = None;
            }
        }

        let changed = self.refresh_due(false);
        let has_due = self.stored_due().is_some();

        let _ = sender.send(Some(outcome));

        if changed || has_due {
            self.notify_engine();
        }
        debug!(
            job = %self.name(),
            now = %self.zoned_now_string(),
            outcome = ?outcome,
            "job finished"
        );
    }

    fn log_failure(&self, err: &JobError) {
        let now = self.zoned_now_string();
        let mut cause: Option<&(dyn std::error::Error + 'static)> = Some(err);
        while let Some(e) = cause {
            error!(
                job = %self.name(),
                now = %now,
                error = %e,
                "job execution failed"
            );
            cause = e.source();
        }
    }

    fn zoned_now_string(&self) -> String {
        self.engine()
            .map(|e| e.zoned_now().to_rfc3339())
            .unwrap_or_default()
    }

    /// Recompute the due time from the schedule.
    ///
    /// `force` ignores `FROM_DUE` and anchors at the current instant, which
    /// is the re-enable semantics: a record disabled across its due time
    /// does not fire for the missed instant. Returns whether the stored due
    /// changed; unchanged results suppress the engine notification.
    pub(crate) fn refresh_due(&self, force: bool) -> bool {
        let _guard = self.recompute.lock();

        let engine = self.engine();
        let attached = engine.as_ref().map_or(false, |e| e.contains(self.id));
        let enabled = self.state.lock().enabled;

        let new_due = match engine {
            Some(engine) if enabled && attached => {
                let options = self.schedule.options();
                let last = if options.contains(ScheduleOptions::FROM_DUE) && !force {
                    self.state.lock().due
                } else {
                    None
                };
                let last = last.unwrap_or_else(|| engine.zoned_now());
                let answer = self.schedule.next(&*engine, last);
                apply_options(answer, options)
            }
            _ => None,
        };

        let mut state = self.state.lock();
        if state.due != new_due {
            state.due = new_due;
            true
        } else {
            false
        }
    }

    fn notify_engine(&self) {
        if let Some(engine) = self.engine() {
            engine.wake("record update");
        }
    }
}
