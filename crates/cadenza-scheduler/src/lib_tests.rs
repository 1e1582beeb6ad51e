//! End-to-end scheduling scenarios driven by virtual time.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, TimeZone, Timelike, Utc};

use super::*;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap()
}

fn t0_zoned() -> DateTime<chrono_tz::Tz> {
    t0().with_timezone(&chrono_tz::UTC)
}

fn spin_config() -> SchedulerConfig {
    // Waits below a minute take the spin path, so the virtual clock is the
    // only thing that moves time.
    SchedulerConfig {
        min_timer_wait_ms: 60_000,
        ..SchedulerConfig::default()
    }
}

fn counting_job(counter: Arc<AtomicU32>) -> Arc<dyn Job> {
    Arc::new(FnJob::new("counting", move |_ctx| {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }))
}

fn failing_job(counter: Arc<AtomicU32>) -> Arc<dyn Job> {
    Arc::new(FnJob::new("failing", move |_ctx| {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(JobError::Failed("deliberate failure".to_string()))
        }
    }))
}

async fn wait_until(what: &str, cond: impl Fn() -> bool) {
    let deadline = std::time::Instant::now() + StdDuration::from_secs(5);
    while !cond() {
        if std::time::Instant::now() > deadline {
            panic!("timed out waiting for {what}");
        }
        tokio::time::sleep(StdDuration::from_millis(5)).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_limit_count_produces_exactly_three_executions() {
    let clock = Arc::new(VirtualClock::stepping(t0(), Duration::microseconds(1)));
    let scheduler = Scheduler::with_clock(spin_config(), clock).unwrap();

    let counter = Arc::new(AtomicU32::new(0));
    let schedule = Arc::new(LimitSchedule::new(
        3,
        Arc::new(GapSchedule::new(Duration::milliseconds(5))),
    ));
    let record = scheduler.add(counting_job(counter.clone()), schedule);

    wait_until("three executions", || counter.load(Ordering::SeqCst) == 3).await;
    wait_until("schedule exhausted", || record.due().is_none()).await;
    tokio::time::sleep(StdDuration::from_millis(50)).await;
    assert_eq!(counter.load(Ordering::SeqCst), 3);
    assert!(record.is_enabled());
    scheduler.dispose();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_failing_job_is_disabled_after_one_execution() {
    let clock = Arc::new(VirtualClock::stepping(t0(), Duration::microseconds(1)));
    let scheduler = Scheduler::with_clock(spin_config(), clock).unwrap();

    let counter = Arc::new(AtomicU32::new(0));
    let schedule = Arc::new(LimitSchedule::new(
        2,
        Arc::new(GapSchedule::new(Duration::milliseconds(5))),
    ));
    let record = scheduler.add(failing_job(counter.clone()), schedule);

    wait_until("one failed execution", || {
        counter.load(Ordering::SeqCst) == 1
    })
    .await;
    wait_until("record disabled", || !record.is_enabled()).await;
    assert_eq!(record.due(), None);

    tokio::time::sleep(StdDuration::from_millis(50)).await;
    assert_eq!(counter.load(Ordering::SeqCst), 1);
    scheduler.dispose();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_failing_job_with_ignore_errors_consumes_the_full_limit() {
    let clock = Arc::new(VirtualClock::stepping(t0(), Duration::microseconds(1)));
    let scheduler = Scheduler::with_clock(spin_config(), clock).unwrap();

    let counter = Arc::new(AtomicU32::new(0));
    let schedule = Arc::new(LimitSchedule::new(
        2,
        Arc::new(GapSchedule::with_options(
            Duration::milliseconds(5),
            ScheduleOptions::IGNORE_ERRORS,
        )),
    ));
    let record = scheduler.add(failing_job(counter.clone()), schedule);

    wait_until("two failed executions", || {
        counter.load(Ordering::SeqCst) == 2
    })
    .await;
    tokio::time::sleep(StdDuration::from_millis(50)).await;
    assert_eq!(counter.load(Ordering::SeqCst), 2);
    assert!(record.is_enabled());
    scheduler.dispose();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_align_seconds_rounds_the_due_time_up() {
    let now = t0().with_nanosecond(500_000_000).unwrap();
    let clock = Arc::new(VirtualClock::fixed(now));
    let scheduler = Scheduler::with_clock(spin_config(), clock).unwrap();

    let at = (now + Duration::milliseconds(10)).with_timezone(&chrono_tz::UTC);
    let schedule = Arc::new(OneOffSchedule::with_options(
        at,
        ScheduleOptions::ALIGN_SECONDS,
    ));
    let counter = Arc::new(AtomicU32::new(0));
    let record = scheduler.add(counting_job(counter.clone()), schedule);

    assert_eq!(record.due(), Some(t0_zoned() + Duration::seconds(1)));
    scheduler.dispose();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_disable_enable_round_trip_fires_once() {
    let clock = Arc::new(VirtualClock::fixed(t0()));
    let scheduler = Scheduler::with_clock(spin_config(), clock.clone()).unwrap();

    let counter = Arc::new(AtomicU32::new(0));
    let record = scheduler.add(
        counting_job(counter.clone()),
        Arc::new(GapSchedule::new(Duration::seconds(1))),
    );
    assert_eq!(record.due(), Some(t0_zoned() + Duration::seconds(1)));

    record.set_enabled(false);
    assert_eq!(record.due(), None);
    assert_eq!(counter.load(Ordering::SeqCst), 0);

    clock.advance(Duration::seconds(3));
    record.set_enabled(true);
    // Recomputed from "now", not the stale pre-disable due.
    assert_eq!(record.due(), Some(t0_zoned() + Duration::seconds(4)));

    clock.advance(Duration::seconds(1));
    wait_until("one execution", || counter.load(Ordering::SeqCst) == 1).await;
    tokio::time::sleep(StdDuration::from_millis(50)).await;
    assert_eq!(counter.load(Ordering::SeqCst), 1);
    scheduler.dispose();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_manual_triggers_share_one_execution() {
    let clock = Arc::new(VirtualClock::fixed(t0()));
    let scheduler = Scheduler::with_clock(spin_config(), clock).unwrap();

    let counter = Arc::new(AtomicU32::new(0));
    let job = Arc::new(FnJob::new("slow", {
        let counter = counter.clone();
        move |_ctx| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(StdDuration::from_millis(50)).await;
                Ok(())
            }
        }
    }));
    let never = DateTime::<Utc>::MAX_UTC.with_timezone(&chrono_tz::UTC);
    let record = scheduler.add(job, Arc::new(OneOffSchedule::new(never)));

    let a = record.trigger(CancellationToken::new());
    let b = record.trigger(CancellationToken::new());
    assert_eq!(a.execution_id(), b.execution_id());

    let (ra, rb) = tokio::join!(a.wait(), b.wait());
    assert_eq!(ra, RunOutcome::Success);
    assert_eq!(rb, RunOutcome::Success);
    assert_eq!(counter.load(Ordering::SeqCst), 1);
    scheduler.dispose();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_manual_trigger_coalesces_with_automatic_fire() {
    let clock = Arc::new(VirtualClock::fixed(t0()));
    let scheduler = Scheduler::with_clock(spin_config(), clock).unwrap();

    let counter = Arc::new(AtomicU32::new(0));
    let started = Arc::new(AtomicBool::new(false));
    let job = Arc::new(FnJob::new("slow", {
        let counter = counter.clone();
        let started = started.clone();
        move |_ctx| {
            let counter = counter.clone();
            let started = started.clone();
            async move {
                started.store(true, Ordering::SeqCst);
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(StdDuration::from_millis(50)).await;
                Ok(())
            }
        }
    }));
    let schedule = Arc::new(LimitSchedule::new(
        1,
        Arc::new(GapSchedule::new(Duration::zero())),
    ));
    let record = scheduler.add(job, schedule);

    // The automatic fire is in flight; a manual trigger joins it.
    wait_until("automatic fire started", || started.load(Ordering::SeqCst)).await;
    let manual = record.trigger(CancellationToken::new());
    assert_eq!(manual.wait().await, RunOutcome::Success);

    tokio::time::sleep(StdDuration::from_millis(50)).await;
    assert_eq!(counter.load(Ordering::SeqCst), 1);
    scheduler.dispose();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_maximum_duration_cancels_overrunning_job() {
    let clock = Arc::new(VirtualClock::fixed(t0()));
    let config = SchedulerConfig {
        max_execution_ms: 50,
        ..spin_config()
    };
    let scheduler = Scheduler::with_clock(config, clock).unwrap();
    assert_eq!(
        scheduler.maximum_execution_duration(),
        Some(StdDuration::from_millis(50))
    );

    let cancelled = Arc::new(AtomicBool::new(false));
    let job = Arc::new(FnJob::new("overrunning", {
        let cancelled = cancelled.clone();
        move |ctx| {
            let cancelled = cancelled.clone();
            async move {
                tokio::select! {
                    _ = tokio::time::sleep(StdDuration::from_millis(100)) => Ok(()),
                    _ = ctx.cancellation().cancelled() => {
                        cancelled.store(true, Ordering::SeqCst);
                        Err(JobError::Cancelled)
                    }
                }
            }
        }
    }));
    let schedule = Arc::new(LimitSchedule::new(
        1,
        Arc::new(GapSchedule::new(Duration::zero())),
    ));
    let record = scheduler.add(job, schedule);

    wait_until("deadline cancellation", || cancelled.load(Ordering::SeqCst)).await;
    // Cancellation is not failure: the record stays enabled.
    assert!(record.is_enabled());
    scheduler.dispose();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_long_running_job_is_exempt_from_maximum_duration() {
    let clock = Arc::new(VirtualClock::fixed(t0()));
    let config = SchedulerConfig {
        max_execution_ms: 50,
        ..spin_config()
    };
    let scheduler = Scheduler::with_clock(config, clock).unwrap();

    let completed = Arc::new(AtomicBool::new(false));
    let job = Arc::new(FnJob::new("patient", {
        let completed = completed.clone();
        move |ctx| {
            let completed = completed.clone();
            async move {
                tokio::select! {
                    _ = tokio::time::sleep(StdDuration::from_millis(100)) => {
                        completed.store(true, Ordering::SeqCst);
                        Ok(())
                    }
                    _ = ctx.cancellation().cancelled() => Err(JobError::Cancelled),
                }
            }
        }
    }));
    let schedule = Arc::new(LimitSchedule::new(
        1,
        Arc::new(GapSchedule::with_options(
            Duration::zero(),
            ScheduleOptions::LONG_RUNNING,
        )),
    ));
    scheduler.add(job, schedule);

    wait_until("run to completion", || completed.load(Ordering::SeqCst)).await;
    scheduler.dispose();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_aggregate_drives_a_record_from_its_earliest_child() {
    let clock = Arc::new(VirtualClock::fixed(t0()));
    let scheduler = Scheduler::with_clock(spin_config(), clock.clone()).unwrap();

    let early: Arc<dyn Schedule> =
        Arc::new(OneOffSchedule::new(t0_zoned() + Duration::seconds(2)));
    let late: Arc<dyn Schedule> =
        Arc::new(OneOffSchedule::new(t0_zoned() + Duration::seconds(30)));
    let aggregate = Arc::new(AggregateSchedule::new(vec![early, late]).unwrap());

    let counter = Arc::new(AtomicU32::new(0));
    let record = scheduler.add(counting_job(counter.clone()), aggregate);
    assert_eq!(record.due(), Some(t0_zoned() + Duration::seconds(2)));

    clock.advance(Duration::seconds(2));
    wait_until("first execution", || counter.load(Ordering::SeqCst) == 1).await;

    // The later child takes over as the next due.
    wait_until("next child published", || {
        record.due() == Some(t0_zoned() + Duration::seconds(30))
    })
    .await;
    scheduler.dispose();
}
