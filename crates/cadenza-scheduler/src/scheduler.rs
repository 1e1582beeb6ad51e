//! The scheduler engine.

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

use cadenza_clock::{Clock, SystemClock};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};
use uuid::Uuid;

use crate::config::SchedulerConfig;
use crate::error::ScheduleResult;
use crate::execution::Completion;
use crate::job::{FnJob, Job, JobContext};
use crate::options::ScheduleOptions;
use crate::record::JobRecord;
use crate::schedule::{Schedule, SchedulerContext};
use crate::zone::{TimeZoneProvider, TzDatabase};

/// Terminal tick-state; any negative value means disposed.
const DISPOSED: i64 = i64::MIN;

/// Drives registered jobs at the times their schedules compute.
///
/// The engine owns the job set, a master cancellation source, and a single
/// timer. All re-evaluation flows through one atomic tick-state counter:
///
/// - `0`: idle, timer armed or nothing due.
/// - `1`: one iteration actively sweeping.
/// - `> 1`: a wake-up arrived during the sweep; the owning iteration will
///   re-evaluate before going idle.
/// - `< 0`: disposed.
///
/// Every mutation that could move the next fire earlier bumps the counter,
/// so the engine either re-evaluates before sleeping or an active iteration
/// observes the bump. Cloning is cheap and shares the engine.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

pub(crate) struct SchedulerInner {
    clock: Arc<dyn Clock>,
    zone_provider: Arc<dyn TimeZoneProvider>,
    zone: Tz,
    max_execution: Option<std::time::Duration>,
    min_timer_wait: chrono::Duration,
    max_timer_wait: chrono::Duration,
    enabled: AtomicBool,
    tick_state: AtomicI64,
    jobs: DashMap<Uuid, Arc<JobRecord>>,
    /// Emptied on disposal so later fires start nothing.
    master: Mutex<Option<CancellationToken>>,
    /// Disarm token of the armed timer, if any.
    timer: Mutex<Option<CancellationToken>>,
    next_due: Mutex<Option<DateTime<Tz>>>,
}

impl SchedulerContext for SchedulerInner {
    fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    fn time_zone(&self) -> Tz {
        self.zone
    }
}

impl Scheduler {
    /// Create an engine over the OS wall clock.
    pub fn new(config: SchedulerConfig) -> ScheduleResult<Self> {
        Self::with_clock(config, Arc::new(SystemClock::new()))
    }

    /// Create an engine over a supplied clock; this is how tests drive the
    /// engine with virtual time.
    pub fn with_clock(config: SchedulerConfig, clock: Arc<dyn Clock>) -> ScheduleResult<Self> {
        let zone_provider: Arc<dyn TimeZoneProvider> = Arc::new(TzDatabase::new());
        let zone = zone_provider.resolve(&config.time_zone)?;
        let inner = Arc::new(SchedulerInner {
            clock,
            zone_provider,
            zone,
            max_execution: config.max_execution(),
            min_timer_wait: chrono::Duration::milliseconds(config.min_timer_wait_ms as i64),
            max_timer_wait: chrono::Duration::milliseconds(config.max_timer_wait_ms as i64),
            enabled: AtomicBool::new(true),
            tick_state: AtomicI64::new(0),
            jobs: DashMap::new(),
            master: Mutex::new(Some(CancellationToken::new())),
            timer: Mutex::new(None),
            next_due: Mutex::new(None),
        });
        Ok(Self { inner })
    }

    pub(crate) fn from_inner(inner: Arc<SchedulerInner>) -> Self {
        Self { inner }
    }

    /// Register a job under a schedule. The first due time is computed from
    /// the current instant.
    pub fn add(&self, job: Arc<dyn Job>, schedule: Arc<dyn Schedule>) -> Arc<JobRecord> {
        let record = Arc::new(JobRecord::new(job, schedule, Arc::downgrade(&self.inner)));
        self.inner.jobs.insert(record.id(), Arc::clone(&record));
        record.refresh_due(true);
        debug!(
            job = %record.name(),
            schedule = %record.schedule_name(),
            now = %self.inner.zoned_now().to_rfc3339(),
            "job registered"
        );
        self.inner.wake("job added");
        record
    }

    /// Register an async closure as a job.
    pub fn add_fn<F, Fut>(
        &self,
        name: impl Into<String>,
        schedule: Arc<dyn Schedule>,
        f: F,
    ) -> Arc<JobRecord>
    where
        F: Fn(JobContext) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<(), crate::error::JobError>> + Send + 'static,
    {
        self.add(Arc::new(FnJob::new(name, f)), schedule)
    }

    /// Detach a record from the job set.
    ///
    /// An in-flight execution keeps running under the token it was given;
    /// only future fires stop. Returns whether the record was present.
    pub fn try_remove(&self, record: &Arc<JobRecord>) -> bool {
        let removed = self.inner.jobs.remove(&record.id()).is_some();
        if removed {
            record.refresh_due(true);
            debug!(job = %record.name(), "job removed");
            self.inner.wake("job removed");
        }
        removed
    }

    /// Manually fire a record by id. `None` when the id is not registered.
    pub fn trigger(&self, id: Uuid, cancel: CancellationToken) -> Option<Completion> {
        let record = self.inner.jobs.get(&id).map(|e| Arc::clone(e.value()))?;
        Some(record.trigger(cancel))
    }

    /// Whether the engine fires jobs at all.
    pub fn is_enabled(&self) -> bool {
        self.inner.is_enabled()
    }

    /// Enable or disable firing. Disabling leaves in-flight executions
    /// running; re-enabling triggers a full re-evaluation.
    pub fn set_enabled(&self, enabled: bool) {
        if self.inner.is_disposed() {
            return;
        }
        let was = self.inner.enabled.swap(enabled, Ordering::SeqCst);
        if was != enabled {
            info!(enabled, "scheduler toggled");
            if enabled {
                self.inner.wake("scheduler enabled");
            }
        }
    }

    /// Tear the engine down: stop the timer, cancel every running job via
    /// the master token, and refuse further fires. Idempotent.
    pub fn dispose(&self) {
        let prev = self.inner.tick_state.swap(DISPOSED, Ordering::SeqCst);
        if prev < 0 {
            return;
        }
        self.inner.disarm_timer();
        let master = self.inner.master.lock().take();
        if let Some(token) = master {
            token.cancel();
        }
        info!("scheduler disposed");
    }

    /// Whether [`dispose`](Self::dispose) has run.
    pub fn is_disposed(&self) -> bool {
        self.inner.is_disposed()
    }

    /// The engine's clock.
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.inner.clock
    }

    /// The timezone database the engine resolves zone names against.
    pub fn zone_provider(&self) -> &Arc<dyn TimeZoneProvider> {
        &self.inner.zone_provider
    }

    /// Default zone for newly computed due times.
    pub fn zone(&self) -> Tz {
        self.inner.zone
    }

    /// The scheduler-wide execution cap, `None` when unbounded.
    pub fn maximum_execution_duration(&self) -> Option<std::time::Duration> {
        self.inner.max_execution
    }

    /// The earliest future due time published by the last sweep.
    pub fn next_due(&self) -> Option<DateTime<Tz>> {
        *self.inner.next_due.lock()
    }

    /// Number of registered records.
    pub fn job_count(&self) -> usize {
        self.inner.jobs.len()
    }
}

impl SchedulerInner {
    pub(crate) fn is_disposed(&self) -> bool {
        self.tick_state.load(Ordering::SeqCst) < 0
    }

    pub(crate) fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub(crate) fn contains(&self, id: Uuid) -> bool {
        self.jobs.contains_key(&id)
    }

    /// Request a re-evaluation.
    ///
    /// The 0 -> 1 transition owns the sweep; every other caller merely
    /// bumps the counter and returns, trusting the active iteration to
    /// observe the bump before it sleeps.
    pub(crate) fn wake(self: &Arc<Self>, reason: &str) {
        let prev = self.tick_state.fetch_add(1, Ordering::SeqCst);
        if prev < 0 {
            // Disposed; undo the bump to keep the state terminal.
            self.tick_state.fetch_sub(1, Ordering::SeqCst);
            return;
        }
        trace!(reason, prev, "tick wake");
        if prev == 0 {
            let inner = Arc::clone(self);
            tokio::spawn(async move {
                inner.run_tick_loop().await;
            });
        }
    }

    /// The owning tick iteration.
    async fn run_tick_loop(self: Arc<Self>) {
        loop {
            // The timer is disarmed before every re-evaluation; it is
            // re-armed only when the sweep settles on a future due.
            self.disarm_timer();

            let state = self.tick_state.load(Ordering::SeqCst);
            if state < 0 {
                return;
            }
            if !self.enabled.load(Ordering::SeqCst) {
                self.tick_state.store(0, Ordering::SeqCst);
                return;
            }
            // Snapshot to 1; bumps from here on read as "re-evaluate again".
            self.tick_state.store(1, Ordering::SeqCst);

            let now = self.zoned_now();
            let mut next: Option<DateTime<Tz>> = None;
            let mut due_now: Vec<(DateTime<Tz>, Arc<JobRecord>)> = Vec::new();
            let records: Vec<Arc<JobRecord>> =
                self.jobs.iter().map(|e| Arc::clone(e.value())).collect();
            for record in records {
                if !record.is_enabled() || record.is_executing() {
                    continue;
                }
                let Some(due) = record.stored_due() else {
                    continue;
                };
                if due <= now {
                    due_now.push((due, record));
                } else if next.map_or(true, |n| due < n) {
                    next = Some(due);
                }
            }
            // Fires within one sweep happen in due order.
            due_now.sort_by_key(|(due, _)| due.with_timezone(&Utc));
            for (due, record) in due_now {
                self.fire(&record, due);
            }

            if self.tick_state.load(Ordering::SeqCst) > 1 {
                tokio::task::yield_now().await;
                continue;
            }

            *self.next_due.lock() = next;

            let Some(due) = next else {
                // Nothing ahead: no timer, wait for the next mutation.
                match self
                    .tick_state
                    .compare_exchange(1, 0, Ordering::SeqCst, Ordering::SeqCst)
                {
                    Ok(_) => return,
                    Err(v) if v < 0 => return,
                    Err(_) => continue,
                }
            };

            let due_utc = due.with_timezone(&Utc);
            let wait = due_utc - self.clock.now();
            if wait <= self.min_timer_wait {
                // Below the OS timer floor; close the gap by spinning. A
                // wake-up during the spin aborts it so the re-evaluation
                // sees whatever changed.
                while self.clock.now() < due_utc {
                    let state = self.tick_state.load(Ordering::SeqCst);
                    if state < 0 {
                        return;
                    }
                    if state > 1 {
                        break;
                    }
                    tokio::task::yield_now().await;
                }
                continue;
            }

            self.arm_timer(wait.min(self.max_timer_wait));
            match self
                .tick_state
                .compare_exchange(1, 0, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return,
                Err(v) if v < 0 => {
                    self.disarm_timer();
                    return;
                }
                // A wake-up raced the arm; evaluate again.
                Err(_) => continue,
            }
        }
    }

    /// Start a due record, choosing its cancellation token.
    fn fire(self: &Arc<Self>, record: &Arc<JobRecord>, due: DateTime<Tz>) {
        let Some(master) = self.master.lock().clone() else {
            // Disposed; nothing fires any more.
            return;
        };
        debug!(
            job = %record.name(),
            due = %due.to_rfc3339(),
            now = %self.zoned_now().to_rfc3339(),
            "firing job"
        );

        let exempt = record
            .schedule()
            .options()
            .contains(ScheduleOptions::LONG_RUNNING);
        match self.max_execution {
            Some(limit) if !exempt => {
                // Deadline token linked to the master; the linkage is torn
                // down when the execution completes.
                let deadline = master.child_token();
                let completion = record.fire(deadline.clone());
                tokio::spawn(async move {
                    tokio::select! {
                        _ = tokio::time::sleep(limit) => deadline.cancel(),
                        _ = completion.wait() => {}
                    }
                });
            }
            _ => {
                let _ = record.fire(master);
            }
        }
    }

    fn arm_timer(self: &Arc<Self>, wait: chrono::Duration) {
        let token = CancellationToken::new();
        *self.timer.lock() = Some(token.clone());

        let wait = wait.to_std().unwrap_or(std::time::Duration::ZERO);
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(wait) => inner.wake("timer"),
            }
        });
    }

    fn disarm_timer(&self) {
        if let Some(token) = self.timer.lock().take() {
            token.cancel();
        }
    }
}

impl Drop for SchedulerInner {
    fn drop(&mut self) {
        if let Some(token) = self.timer.get_mut().take() {
            token.cancel();
        }
        if let Some(token) = self.master.get_mut().take() {
            token.cancel();
        }
    }
}
