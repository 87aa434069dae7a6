//! Trigger engine behaviour on a paused Tokio clock.
//!
//! Every test anchors a `TokioClock` at 2024-01-01T00:00:00Z; sleeping in the
//! test advances virtual time, letting the dispatch loop fire deterministically.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use cronhook_core::{JobSet, JobSpec};
use cronhook_scheduler::{
    Executor, Job, Outcome, Schedule, SchedulerError, TokioClock, TriggerEngine,
};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

fn secs(n: i64) -> chrono::Duration {
    chrono::Duration::seconds(n)
}

/// Records every execution. URLs containing `slow` hang for 30 s and then
/// fail like a client timeout; URLs containing `fail` get a 500.
#[derive(Default)]
struct Recorder {
    calls: Mutex<Vec<String>>,
}

impl Recorder {
    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn count(&self, id: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == id).count()
    }
}

#[async_trait]
impl Executor for Recorder {
    async fn execute(&self, job: &Job) -> Outcome {
        self.calls.lock().unwrap().push(job.id.clone());
        if job.url.contains("slow") {
            tokio::time::sleep(Duration::from_secs(30)).await;
            return Outcome::Failure("operation timed out".into());
        }
        if job.url.contains("fail") {
            return Outcome::Failure("HTTP Status: 500 Internal Server Error".into());
        }
        Outcome::Success
    }
}

fn engine() -> (TriggerEngine, Arc<Recorder>) {
    let recorder = Arc::new(Recorder::default());
    let clock = Arc::new(TokioClock::starting_at(t0()));
    let engine = TriggerEngine::new(recorder.clone(), clock);
    engine.registry().add_tenant("alice");
    engine.registry().add_tenant("bob");
    (engine, recorder)
}

fn job(id: &str, cron: &str, url: &str) -> Job {
    Job::new(id, Schedule::parse(cron).unwrap(), url, true)
}

async fn advance_to(offset_ms: u64, started: tokio::time::Instant) {
    tokio::time::sleep_until(started + Duration::from_millis(offset_ms)).await;
}

#[tokio::test(start_paused = true)]
async fn five_second_job_records_success_and_advances() {
    let started = tokio::time::Instant::now();
    let (engine, recorder) = engine();
    engine
        .registry()
        .upsert("alice", job("j1", "*/5 * * * * *", "http://example/ok"))
        .unwrap();
    engine.start().await.unwrap();

    advance_to(5_500, started).await;
    let status = engine.registry().status("alice", "j1").unwrap();
    assert!(status.last_success);
    assert!(status.last_error.is_empty());
    let last_run = status.last_run.unwrap();
    assert_eq!(last_run, t0() + secs(5));
    assert_eq!(status.next_run.unwrap() - last_run, secs(5));
    assert_eq!(recorder.count("j1"), 1);

    advance_to(20_500, started).await;
    assert_eq!(recorder.count("j1"), 4);
    engine.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn hanging_target_fails_without_blocking_others() {
    let started = tokio::time::Instant::now();
    let (engine, recorder) = engine();
    let registry = engine.registry();
    registry
        .upsert("alice", job("slow", "*/5 * * * * *", "http://slow.example/"))
        .unwrap();
    registry
        .upsert("alice", job("fast", "*/5 * * * * *", "http://example/ok"))
        .unwrap();
    engine.start().await.unwrap();

    advance_to(5_500, started).await;
    let fast = registry.status("alice", "fast").unwrap();
    assert_eq!(fast.last_run, Some(t0() + secs(5)));
    assert!(fast.last_success);
    // in flight, nothing recorded yet, but already rescheduled
    let slow = registry.status("alice", "slow").unwrap();
    assert_eq!(slow.last_run, None);
    assert_eq!(slow.next_run, Some(t0() + secs(10)));

    advance_to(36_000, started).await;
    let slow = registry.status("alice", "slow").unwrap();
    assert!(!slow.last_success);
    assert!(!slow.last_error.is_empty());
    assert_eq!(slow.last_run, Some(t0() + secs(5)));
    assert_eq!(slow.next_run, Some(t0() + secs(40)));
    assert_eq!(recorder.count("fast"), 7);
    engine.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn failed_request_is_recorded_and_rescheduled() {
    let started = tokio::time::Instant::now();
    let (engine, _) = engine();
    engine
        .registry()
        .upsert("alice", job("broken", "*/5 * * * * *", "http://fail.example/"))
        .unwrap();
    engine.start().await.unwrap();

    advance_to(5_500, started).await;
    let status = engine.registry().status("alice", "broken").unwrap();
    assert!(!status.last_success);
    assert_eq!(status.last_error, "HTTP Status: 500 Internal Server Error");
    assert_eq!(status.next_run, Some(t0() + secs(10)));
    engine.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn deactivation_cancels_a_fire_already_waited_on() {
    let started = tokio::time::Instant::now();
    let (engine, recorder) = engine();
    engine
        .registry()
        .upsert("alice", job("j1", "*/5 * * * * *", "http://example/ok"))
        .unwrap();
    engine.start().await.unwrap();

    // the loop is now parked until 00:00:05
    advance_to(2_000, started).await;
    assert!(engine.registry().set_active("alice", "j1", false).unwrap());

    advance_to(30_000, started).await;
    assert!(recorder.calls().is_empty());
    let status = engine.registry().status("alice", "j1").unwrap();
    assert_eq!(status.next_run, None);
    assert_eq!(status.last_run, None);
    engine.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn new_earlier_job_wakes_the_loop() {
    let started = tokio::time::Instant::now();
    let (engine, recorder) = engine();
    engine
        .registry()
        .upsert("alice", job("hourly", "0 0 * * * *", "http://example/ok"))
        .unwrap();
    engine.start().await.unwrap();

    advance_to(1_000, started).await;
    engine
        .registry()
        .upsert("bob", job("soon", "*/2 * * * * *", "http://example/ok"))
        .unwrap();

    advance_to(2_100, started).await;
    assert_eq!(recorder.calls(), vec!["soon".to_string()]);
    assert_eq!(
        engine.registry().status("bob", "soon").unwrap().last_run,
        Some(t0() + secs(2))
    );
    engine.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn replacing_a_job_moves_its_schedule() {
    let started = tokio::time::Instant::now();
    let (engine, recorder) = engine();
    let registry = engine.registry();
    registry
        .upsert("alice", job("j1", "0 0 * * * *", "http://example/ok"))
        .unwrap();
    engine.start().await.unwrap();

    advance_to(1_000, started).await;
    registry
        .upsert("alice", job("j1", "*/3 * * * * *", "http://example/ok"))
        .unwrap();
    advance_to(3_500, started).await;
    assert_eq!(recorder.count("j1"), 1);
    assert_eq!(registry.status("alice", "j1").unwrap().next_run, Some(t0() + secs(6)));
    engine.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn bulk_deactivation_stops_every_fire_but_keeps_status() {
    let started = tokio::time::Instant::now();
    let (engine, recorder) = engine();
    let registry = engine.registry();
    for i in 0..10 {
        registry
            .upsert("alice", job(&format!("j{i}"), "*/5 * * * * *", "http://example/ok"))
            .unwrap();
    }
    registry
        .upsert("bob", job("other", "*/5 * * * * *", "http://example/ok"))
        .unwrap();
    engine.start().await.unwrap();

    advance_to(5_500, started).await;
    assert_eq!(recorder.calls().len(), 11);

    assert_eq!(registry.set_all_active("alice", false), 10);
    advance_to(30_500, started).await;
    let alice_calls = recorder.calls().iter().filter(|c| c.starts_with('j')).count();
    assert_eq!(alice_calls, 10);
    assert_eq!(recorder.count("other"), 6);

    let all = registry.all_status("alice");
    assert_eq!(all.len(), 10);
    for status in all.values() {
        assert_eq!(status.next_run, None);
        assert_eq!(status.last_run, Some(t0() + secs(5)));
        assert!(status.last_success);
    }
    engine.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn removing_a_tenant_stops_its_jobs() {
    let started = tokio::time::Instant::now();
    let (engine, recorder) = engine();
    engine
        .registry()
        .upsert("alice", job("a", "*/5 * * * * *", "http://example/ok"))
        .unwrap();
    engine.start().await.unwrap();

    advance_to(5_500, started).await;
    assert_eq!(engine.registry().remove_tenant("alice"), 1);
    advance_to(30_000, started).await;
    assert_eq!(recorder.count("a"), 1);
    assert!(engine.registry().all_status("alice").is_empty());
    engine.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn lifecycle_errors() {
    let (engine, _) = engine();
    assert!(!engine.is_running().await);
    assert_eq!(engine.stop().await, Err(SchedulerError::NotRunning));

    engine.start().await.unwrap();
    assert!(engine.is_running().await);
    assert_eq!(engine.start().await, Err(SchedulerError::AlreadyRunning));

    engine.stop().await.unwrap();
    assert!(!engine.is_running().await);
}

#[tokio::test(start_paused = true)]
async fn stopped_engine_fires_nothing() {
    let started = tokio::time::Instant::now();
    let (engine, recorder) = engine();
    engine
        .registry()
        .upsert("alice", job("a", "* * * * * *", "http://example/ok"))
        .unwrap();
    engine.start().await.unwrap();
    advance_to(1_500, started).await;
    engine.stop().await.unwrap();
    let fired = recorder.count("a");
    assert_eq!(fired, 1);

    advance_to(10_000, started).await;
    assert_eq!(recorder.count("a"), fired);
}

fn job_set(entries: &[(&str, &str, &str, bool)]) -> JobSet {
    let mut set = JobSet::new();
    for (tenant, id, cron, active) in entries {
        set.entry(tenant.to_string())
            .or_default()
            .push(JobSpec::new(*id, *cron, "http://example/ok", *active));
    }
    set
}

#[tokio::test(start_paused = true)]
async fn load_schedules_active_jobs_from_now() {
    let (engine, _) = engine();
    let source = job_set(&[
        ("alice", "daily", "0 0 * * *", true),
        ("alice", "paused", "*/5 * * * * *", false),
        ("alice", "garbage", "not a cron", true),
        ("bob", "minutely", "0 * * * * *", true),
    ]);
    assert_eq!(engine.load(&source), 3);
    engine.start().await.unwrap();

    let registry = engine.registry();
    assert_eq!(registry.list_tenants(), vec!["alice", "bob"]);
    assert!(registry.get("alice", "garbage").is_none());
    assert_eq!(
        registry.status("alice", "daily").unwrap().next_run,
        Some(t0() + chrono::Duration::days(1))
    );
    assert!(registry.status("alice", "paused").is_none());
    assert_eq!(
        registry.status("bob", "minutely").unwrap().next_run,
        Some(t0() + secs(60))
    );
    engine.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn reload_swaps_the_whole_job_set() {
    let started = tokio::time::Instant::now();
    let (engine, recorder) = engine();
    engine.load(&job_set(&[("alice", "old", "*/5 * * * * *", true)]));
    engine.start().await.unwrap();

    advance_to(5_500, started).await;
    assert_eq!(recorder.count("old"), 1);

    let count = engine
        .reload(&job_set(&[("carol", "new", "*/2 * * * * *", true)]))
        .await
        .unwrap();
    assert_eq!(count, 1);
    assert!(engine.is_running().await);

    advance_to(20_500, started).await;
    assert_eq!(recorder.count("old"), 1);
    assert_eq!(recorder.count("new"), 8);
    assert!(engine.registry().get("alice", "old").is_none());
    engine.stop().await.unwrap();
}
