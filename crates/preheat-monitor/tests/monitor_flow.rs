//! End-to-end monitor behavior against scripted drivers and an in-memory store.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use preheat_client::ClientError;
use preheat_monitor::{Monitor, MonitorConfig};
use preheat_provider::{
    Driver, DriverFuture, HealthStatus, ProgressStatus, ProviderError, ProviderRegistry,
    ProviderResult,
};
use preheat_state::{
    HistoryRecord, HistoryStore, InstanceStore, Metadata, QueryParam, StateResult, StateStore,
    TrackStatus,
};
use reqwest::StatusCode;
use tokio::sync::watch;

/// Driver whose answers are scripted per task; the last answer repeats.
#[derive(Default)]
struct ScriptedDriver {
    /// Health answer; `None` fails the check.
    health: Option<HealthStatus>,
    progress: Mutex<HashMap<String, VecDeque<Step>>>,
    polls: Mutex<HashMap<String, usize>>,
}

#[derive(Clone, Copy)]
enum Step {
    Status(TrackStatus),
    Unavailable,
    Unknown,
}

impl ScriptedDriver {
    fn script(self, task_id: &str, steps: &[Step]) -> Self {
        self.progress
            .lock()
            .unwrap()
            .insert(task_id.to_string(), steps.iter().copied().collect());
        self
    }

    fn polls(&self, task_id: &str) -> usize {
        self.polls.lock().unwrap().get(task_id).copied().unwrap_or(0)
    }

    fn next_step(&self, task_id: &str) -> Step {
        *self.polls.lock().unwrap().entry(task_id.to_string()).or_default() += 1;
        let mut progress = self.progress.lock().unwrap();
        let steps = progress.entry(task_id.to_string()).or_default();
        if steps.len() > 1 {
            steps.pop_front().unwrap()
        } else {
            steps.front().copied().unwrap_or(Step::Unknown)
        }
    }
}

fn unavailable() -> ProviderError {
    ProviderError::Client(ClientError::Status {
        method: "GET".to_string(),
        url: "http://p2p.local/preheats/t1".to_string(),
        status: StatusCode::SERVICE_UNAVAILABLE,
        body: "busy".to_string(),
    })
}

impl Driver for ScriptedDriver {
    fn check_progress<'a>(&'a self, task_id: &'a str) -> DriverFuture<'a, ProgressStatus> {
        Box::pin(async move {
            match self.next_step(task_id) {
                Step::Status(status) => Ok(ProgressStatus {
                    status,
                    start_time: Some(1_700_000_010),
                    finish_time: status.done().then_some(1_700_000_100),
                }),
                Step::Unavailable => Err(unavailable()),
                Step::Unknown => Err(ProviderError::InvalidStatus("PAUSED".to_string())),
            }
        })
    }

    fn get_health(&self) -> DriverFuture<'_, HealthStatus> {
        Box::pin(async move { self.health.clone().ok_or_else(unavailable) })
    }
}

/// History store that records every status write before delegating.
struct RecordingHistories {
    inner: StateStore,
    updates: Mutex<Vec<(String, TrackStatus)>>,
}

impl RecordingHistories {
    fn updates_for(&self, task_id: &str) -> Vec<TrackStatus> {
        self.updates
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| id == task_id)
            .map(|(_, status)| *status)
            .collect()
    }
}

impl HistoryStore for RecordingHistories {
    fn append_history(&self, record: &HistoryRecord) -> StateResult<()> {
        self.inner.append_history(record)
    }

    fn update_status(
        &self,
        task_id: &str,
        status: TrackStatus,
        start_time: Option<i64>,
        finish_time: Option<i64>,
    ) -> StateResult<()> {
        self.updates
            .lock()
            .unwrap()
            .push((task_id.to_string(), status));
        self.inner
            .update_status(task_id, status, start_time, finish_time)
    }

    fn load_histories(&self, params: Option<&QueryParam>) -> StateResult<Vec<HistoryRecord>> {
        self.inner.load_histories(params)
    }

    fn get_history(&self, task_id: &str) -> StateResult<HistoryRecord> {
        self.inner.get_history(task_id)
    }
}

struct Harness {
    store: StateStore,
    histories: Arc<RecordingHistories>,
    monitor: Monitor,
    shutdown: watch::Sender<bool>,
}

fn fast_config() -> MonitorConfig {
    MonitorConfig {
        health_interval: Duration::from_millis(50),
        progress_interval: Duration::from_millis(20),
        max_poll_failures: 3,
        ..Default::default()
    }
}

fn harness(driver: Arc<ScriptedDriver>) -> Harness {
    let store = StateStore::open_in_memory().unwrap();
    let histories = Arc::new(RecordingHistories {
        inner: store.clone(),
        updates: Mutex::new(Vec::new()),
    });

    let mut providers = ProviderRegistry::new();
    providers.register(
        "dragonfly",
        Arc::new(move |_: &Metadata| -> ProviderResult<Arc<dyn Driver>> {
            Ok(driver.clone())
        }),
    );

    let monitor = Monitor::new(
        fast_config(),
        Arc::new(store.clone()),
        histories.clone(),
        Arc::new(providers),
    )
    .unwrap();
    let (shutdown, _) = watch::channel(false);

    Harness {
        store,
        histories,
        monitor,
        shutdown,
    }
}

fn instance(id: &str, provider: &str) -> Metadata {
    Metadata {
        id: id.to_string(),
        provider: provider.to_string(),
        endpoint: "http://p2p.local".to_string(),
        enabled: true,
        setup_timestamp: 1_699_999_000,
        ..Default::default()
    }
}

fn history(task_id: &str) -> HistoryRecord {
    HistoryRecord {
        task_id: task_id.to_string(),
        image: "library/nginx:1.25".to_string(),
        timestamp: 1_700_000_000,
        status: "PENDING".to_string(),
        provider: "dragonfly".to_string(),
        instance: "p2p-1".to_string(),
        ..Default::default()
    }
}

/// Poll `cond` until it holds or two seconds pass.
async fn eventually(mut cond: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}

#[tokio::test]
async fn pending_task_runs_to_success() {
    let driver = Arc::new(ScriptedDriver::default().script(
        "t1",
        &[
            Step::Status(TrackStatus::Pending),
            Step::Status(TrackStatus::Running),
            Step::Status(TrackStatus::Success),
        ],
    ));
    let h = harness(driver.clone());
    h.store.save(&instance("p2p-1", "dragonfly")).unwrap();
    h.store.append_history(&history("t1")).unwrap();

    let tasks = h.monitor.start(h.shutdown.subscribe()).unwrap();
    assert!(h.monitor.watch_progress("p2p-1", "t1"));

    assert!(eventually(|| !h.monitor.is_watching("p2p-1", "t1")).await);
    // Give a stray requeue a chance to show up.
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(
        h.histories.updates_for("t1"),
        [TrackStatus::Pending, TrackStatus::Running, TrackStatus::Success]
    );
    assert_eq!(driver.polls("t1"), 3);

    let stored = h.store.get_history("t1").unwrap();
    assert_eq!(stored.status, "SUCCESS");
    assert_eq!(stored.image, "library/nginx:1.25");
    assert_eq!(stored.timestamp, 1_700_000_000);
    assert_eq!(stored.instance, "p2p-1");
    assert_eq!(stored.start_time, Some(1_700_000_010));
    assert_eq!(stored.finish_time, Some(1_700_000_100));

    h.shutdown.send(true).unwrap();
    tasks.join().await;
}

#[tokio::test]
async fn running_task_is_polled_again_after_delay() {
    let driver = Arc::new(ScriptedDriver::default().script(
        "t2",
        &[
            Step::Status(TrackStatus::Running),
            Step::Status(TrackStatus::Running),
            Step::Status(TrackStatus::Fail),
        ],
    ));
    let h = harness(driver.clone());
    h.store.save(&instance("p2p-1", "dragonfly")).unwrap();
    h.store.append_history(&history("t2")).unwrap();

    let tasks = h.monitor.start(h.shutdown.subscribe()).unwrap();
    h.monitor.watch_progress("p2p-1", "t2");

    assert!(eventually(|| h.store.get_history("t2").unwrap().status == "RUNNING").await);
    assert!(h.monitor.is_watching("p2p-1", "t2"));

    assert!(eventually(|| !h.monitor.is_watching("p2p-1", "t2")).await);
    assert_eq!(h.store.get_history("t2").unwrap().status, "FAIL");
    assert_eq!(driver.polls("t2"), 3);

    h.shutdown.send(true).unwrap();
    tasks.join().await;
}

#[tokio::test]
async fn transient_failures_retry_then_drop() {
    let driver = Arc::new(ScriptedDriver::default().script("t3", &[Step::Unavailable]));
    let h = harness(driver.clone());
    h.store.save(&instance("p2p-1", "dragonfly")).unwrap();
    h.store.append_history(&history("t3")).unwrap();

    let tasks = h.monitor.start(h.shutdown.subscribe()).unwrap();
    h.monitor.watch_progress("p2p-1", "t3");

    assert!(eventually(|| !h.monitor.is_watching("p2p-1", "t3")).await);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(driver.polls("t3"), 3);
    assert!(h.histories.updates_for("t3").is_empty());
    assert_eq!(h.store.get_history("t3").unwrap().status, "PENDING");

    h.shutdown.send(true).unwrap();
    tasks.join().await;
}

#[tokio::test]
async fn transient_failure_then_recovery_completes() {
    let driver = Arc::new(ScriptedDriver::default().script(
        "t4",
        &[
            Step::Unavailable,
            Step::Unavailable,
            Step::Status(TrackStatus::Running),
            Step::Unavailable,
            Step::Status(TrackStatus::Success),
        ],
    ));
    let h = harness(driver.clone());
    h.store.save(&instance("p2p-1", "dragonfly")).unwrap();
    h.store.append_history(&history("t4")).unwrap();

    let tasks = h.monitor.start(h.shutdown.subscribe()).unwrap();
    h.monitor.watch_progress("p2p-1", "t4");

    assert!(eventually(|| !h.monitor.is_watching("p2p-1", "t4")).await);
    assert_eq!(h.store.get_history("t4").unwrap().status, "SUCCESS");
    assert_eq!(driver.polls("t4"), 5);

    h.shutdown.send(true).unwrap();
    tasks.join().await;
}

#[tokio::test]
async fn invalid_status_drops_immediately() {
    let driver = Arc::new(ScriptedDriver::default().script("t5", &[Step::Unknown]));
    let h = harness(driver.clone());
    h.store.save(&instance("p2p-1", "dragonfly")).unwrap();
    h.store.append_history(&history("t5")).unwrap();

    let tasks = h.monitor.start(h.shutdown.subscribe()).unwrap();
    h.monitor.watch_progress("p2p-1", "t5");

    assert!(eventually(|| !h.monitor.is_watching("p2p-1", "t5")).await);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(driver.polls("t5"), 1);

    h.shutdown.send(true).unwrap();
    tasks.join().await;
}

#[tokio::test]
async fn unknown_instance_drops_without_polling() {
    let driver = Arc::new(ScriptedDriver::default().script(
        "t6",
        &[Step::Status(TrackStatus::Running)],
    ));
    let h = harness(driver.clone());

    let tasks = h.monitor.start(h.shutdown.subscribe()).unwrap();
    assert!(h.monitor.watch_progress("p2p-404", "t6"));

    assert!(eventually(|| !h.monitor.is_watching("p2p-404", "t6")).await);
    assert_eq!(driver.polls("t6"), 0);

    h.shutdown.send(true).unwrap();
    tasks.join().await;
}

#[tokio::test]
async fn task_is_polled_on_one_instance_only() {
    let driver = Arc::new(ScriptedDriver::default().script(
        "t8",
        &[Step::Status(TrackStatus::Running)],
    ));
    let h = harness(driver.clone());
    h.store.save(&instance("p2p-1", "dragonfly")).unwrap();
    h.store.save(&instance("p2p-2", "dragonfly")).unwrap();
    h.store.append_history(&history("t8")).unwrap();

    let tasks = h.monitor.start(h.shutdown.subscribe()).unwrap();
    assert!(h.monitor.watch_progress("p2p-1", "t8"));
    assert!(!h.monitor.watch_progress("p2p-2", "t8"));

    assert!(eventually(|| driver.polls("t8") >= 2).await);
    assert!(h.monitor.is_watching("p2p-1", "t8"));
    assert_eq!(h.monitor.tracked_count(), 1);

    h.shutdown.send(true).unwrap();
    tasks.join().await;
}

#[tokio::test]
async fn watch_on_foreign_instance_drops_without_polling() {
    let driver = Arc::new(ScriptedDriver::default().script(
        "t9",
        &[Step::Status(TrackStatus::Success)],
    ));
    let h = harness(driver.clone());
    h.store.save(&instance("p2p-1", "dragonfly")).unwrap();
    h.store.save(&instance("p2p-2", "dragonfly")).unwrap();
    h.store.append_history(&history("t9")).unwrap();

    let tasks = h.monitor.start(h.shutdown.subscribe()).unwrap();
    assert!(h.monitor.watch_progress("p2p-2", "t9"));

    assert!(eventually(|| !h.monitor.is_watching("p2p-2", "t9")).await);
    assert_eq!(driver.polls("t9"), 0);
    assert_eq!(h.store.get_history("t9").unwrap().status, "PENDING");

    h.shutdown.send(true).unwrap();
    tasks.join().await;
}

#[tokio::test]
async fn health_sweep_marks_failures_unhealthy() {
    let driver = Arc::new(ScriptedDriver::default());
    let h = harness(driver);
    h.store.save(&instance("p2p-1", "dragonfly")).unwrap();
    h.store.save(&instance("p2p-2", "kraken")).unwrap();

    h.monitor.sweep_health().await.unwrap();

    assert_eq!(h.store.get("p2p-1").unwrap().status, "unhealthy");
    assert_eq!(h.store.get("p2p-2").unwrap().status, "unhealthy");
    // Only the status changes.
    let stored = h.store.get("p2p-1").unwrap();
    assert_eq!(stored.setup_timestamp, 1_699_999_000);
    assert_eq!(stored.endpoint, "http://p2p.local");
}

#[tokio::test]
async fn reported_unhealthy_is_stored() {
    let driver = Arc::new(ScriptedDriver {
        health: Some(HealthStatus {
            status: "unhealthy".to_string(),
        }),
        ..Default::default()
    });
    let h = harness(driver);
    let mut p2p = instance("p2p-1", "dragonfly");
    p2p.status = "healthy".to_string();
    h.store.save(&p2p).unwrap();

    let health = h.monitor.check_instance_health(&p2p).await.unwrap();
    assert!(!health.is_healthy());
    assert_eq!(h.store.get("p2p-1").unwrap().status, "unhealthy");
}

#[tokio::test]
async fn health_loop_marks_healthy_instances() {
    let driver = Arc::new(ScriptedDriver {
        health: Some(HealthStatus::healthy()),
        ..Default::default()
    });
    let h = harness(driver);
    h.store.save(&instance("p2p-1", "dragonfly")).unwrap();

    let tasks = h.monitor.start(h.shutdown.subscribe()).unwrap();
    assert!(eventually(|| h.store.get("p2p-1").unwrap().status == "healthy").await);

    h.shutdown.send(true).unwrap();
    tasks.join().await;
}

#[tokio::test]
async fn resumed_watches_are_driven_to_completion() {
    let driver = Arc::new(ScriptedDriver::default().script(
        "t7",
        &[Step::Status(TrackStatus::Success)],
    ));
    let h = harness(driver.clone());
    h.store.save(&instance("p2p-1", "dragonfly")).unwrap();
    h.store.append_history(&history("t7")).unwrap();

    assert_eq!(h.monitor.resume_pending().unwrap(), 1);
    let tasks = h.monitor.start(h.shutdown.subscribe()).unwrap();

    assert!(eventually(|| h.store.get_history("t7").unwrap().status == "SUCCESS").await);
    assert_eq!(h.histories.updates_for("t7"), [TrackStatus::Success]);

    h.shutdown.send(true).unwrap();
    tasks.join().await;
}
