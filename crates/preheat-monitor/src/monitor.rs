//! The preheat monitor.
//!
//! [`Monitor`] owns the progress FIFO and the set of tracked watches.
//! [`Monitor::start`] spawns the health loop, the progress loop and the
//! requeue timer; they run until the shutdown signal flips.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use preheat_provider::{HealthStatus, ProgressStatus, ProviderRegistry};
use preheat_state::{HistoryStore, InstanceStore, Metadata};
use tokio::sync::{Semaphore, mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::MonitorConfig;
use crate::error::{MonitorError, MonitorResult};
use crate::requeue::{Delayed, run_requeue_timer};

/// One tracked (instance, task) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressItem {
    pub instance_id: String,
    pub task_id: String,
    /// Consecutive transient failures so far.
    pub failures: u32,
}

impl ProgressItem {
    pub fn new(instance_id: impl Into<String>, task_id: impl Into<String>) -> Self {
        Self {
            instance_id: instance_id.into(),
            task_id: task_id.into(),
            failures: 0,
        }
    }
}

/// Handles to the monitor's long-lived tasks.
#[derive(Debug)]
pub struct MonitorTasks {
    health: JoinHandle<()>,
    progress: JoinHandle<()>,
    requeue: JoinHandle<()>,
}

impl MonitorTasks {
    /// Wait for every loop to exit.
    pub async fn join(self) {
        let (health, progress, requeue) = tokio::join!(self.health, self.progress, self.requeue);
        for (name, result) in [("health", health), ("progress", progress), ("requeue", requeue)] {
            if let Err(e) = result {
                error!(task = name, error = %e, "monitor task panicked");
            }
        }
    }
}

/// Tracks preheat tasks and provider instance health.
///
/// Cheap to clone; clones share queues and tracking state.
#[derive(Clone)]
pub struct Monitor {
    inner: Arc<Inner>,
}

struct Inner {
    config: MonitorConfig,
    instances: Arc<dyn InstanceStore>,
    histories: Arc<dyn HistoryStore>,
    providers: Arc<ProviderRegistry>,
    queue_tx: mpsc::Sender<ProgressItem>,
    requeue_tx: mpsc::UnboundedSender<Delayed<ProgressItem>>,
    limiter: Arc<Semaphore>,
    /// Watched task ID → the instance it is polled on. History records are
    /// keyed by task ID alone, so one task has at most one poller.
    tracked: Mutex<HashMap<String, String>>,
    receivers: Mutex<Option<Receivers>>,
}

struct Receivers {
    queue: mpsc::Receiver<ProgressItem>,
    requeue: mpsc::UnboundedReceiver<Delayed<ProgressItem>>,
}

impl fmt::Debug for Monitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Monitor")
            .field("config", &self.inner.config)
            .field("providers", &self.inner.providers)
            .field("tracked", &self.tracked_count())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Monitor {
    pub fn new(
        config: MonitorConfig,
        instances: Arc<dyn InstanceStore>,
        histories: Arc<dyn HistoryStore>,
        providers: Arc<ProviderRegistry>,
    ) -> MonitorResult<Self> {
        config.validate()?;
        let (queue_tx, queue_rx) = mpsc::channel(config.queue_capacity);
        let (requeue_tx, requeue_rx) = mpsc::unbounded_channel();
        let limiter = Arc::new(Semaphore::new(config.max_concurrent_checks));

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                instances,
                histories,
                providers,
                queue_tx,
                requeue_tx,
                limiter,
                tracked: Mutex::new(HashMap::new()),
                receivers: Mutex::new(Some(Receivers {
                    queue: queue_rx,
                    requeue: requeue_rx,
                })),
            }),
        })
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.inner.config
    }

    /// Spawn the health loop, the progress loop and the requeue timer.
    ///
    /// Fails with [`MonitorError::AlreadyStarted`] on a second call.
    pub fn start(&self, shutdown: watch::Receiver<bool>) -> MonitorResult<MonitorTasks> {
        let receivers = lock(&self.inner.receivers)
            .take()
            .ok_or(MonitorError::AlreadyStarted)?;

        let health = tokio::spawn(run_health_loop(self.inner.clone(), shutdown.clone()));
        let progress = tokio::spawn(run_progress_loop(
            self.inner.clone(),
            receivers.queue,
            shutdown.clone(),
        ));
        let requeue = tokio::spawn(run_requeue_timer(
            receivers.requeue,
            self.inner.queue_tx.clone(),
            shutdown,
        ));

        info!(
            health_interval_ms = self.inner.config.health_interval.as_millis() as u64,
            progress_interval_ms = self.inner.config.progress_interval.as_millis() as u64,
            providers = ?self.inner.providers.providers(),
            "preheat monitor started"
        );

        Ok(MonitorTasks {
            health,
            progress,
            requeue,
        })
    }

    /// Start tracking `task_id` on `instance_id`. Never blocks.
    ///
    /// Returns false if the task is already tracked, on any instance, or
    /// the monitor has shut down.
    pub fn watch_progress(&self, instance_id: &str, task_id: &str) -> bool {
        match lock(&self.inner.tracked).entry(task_id.to_string()) {
            Entry::Occupied(entry) => {
                debug!(%instance_id, %task_id, watched_on = %entry.get(), "preheat task already watched");
                return false;
            }
            Entry::Vacant(entry) => {
                entry.insert(instance_id.to_string());
            }
        }

        let item = ProgressItem::new(instance_id, task_id);
        match self.inner.queue_tx.try_send(item) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(item)) => {
                debug!(%instance_id, %task_id, "progress queue full, deferring watch");
                let inner = self.inner.clone();
                tokio::spawn(async move {
                    let task_id = item.task_id.clone();
                    if inner.queue_tx.send(item).await.is_err() {
                        inner.release(&task_id);
                    }
                });
            }
            Err(mpsc::error::TrySendError::Closed(item)) => {
                warn!(%instance_id, %task_id, "progress queue closed, watch rejected");
                self.inner.release(&item.task_id);
                return false;
            }
        }

        info!(%instance_id, %task_id, "watching preheat task");
        true
    }

    /// Whether `task_id` is tracked on `instance_id`.
    pub fn is_watching(&self, instance_id: &str, task_id: &str) -> bool {
        lock(&self.inner.tracked)
            .get(task_id)
            .is_some_and(|watched_on| watched_on == instance_id)
    }

    pub fn tracked_count(&self) -> usize {
        lock(&self.inner.tracked).len()
    }

    /// Re-watch every stored history whose status is valid but not terminal.
    ///
    /// Returns the number of watches registered.
    pub fn resume_pending(&self) -> MonitorResult<usize> {
        let histories = self.inner.histories.load_histories(None)?;
        let mut resumed = 0;
        for record in histories {
            let Some(status) = record.track_status() else {
                warn!(task_id = %record.task_id, status = %record.status, "skipping history with invalid status");
                continue;
            };
            if status.done() {
                continue;
            }
            if self.watch_progress(&record.instance, &record.task_id) {
                resumed += 1;
            }
        }
        info!(resumed, "resumed pending preheat tasks");
        Ok(resumed)
    }

    /// Run one health sweep over every instance and wait for it to finish.
    pub async fn sweep_health(&self) -> MonitorResult<()> {
        self.inner.clone().sweep_health().await
    }

    /// Check one instance's health and persist the result.
    pub async fn check_instance_health(&self, instance: &Metadata) -> MonitorResult<HealthStatus> {
        self.inner.check_instance_health(instance).await
    }
}

impl Inner {
    fn release(&self, task_id: &str) {
        lock(&self.tracked).remove(task_id);
    }

    async fn sweep_health(self: Arc<Self>) -> MonitorResult<()> {
        let instances = self.instances.list(None)?;
        debug!(count = instances.len(), "health sweep");

        let mut checks = JoinSet::new();
        for instance in instances {
            let inner = self.clone();
            checks.spawn(async move {
                let Ok(_permit) = inner.limiter.clone().acquire_owned().await else {
                    return;
                };
                if let Err(e) = inner.check_instance_health(&instance).await {
                    error!(instance_id = %instance.id, error = %e, "failed to record instance health");
                }
            });
        }
        while let Some(joined) = checks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "health check task panicked");
            }
        }
        Ok(())
    }

    async fn check_instance_health(&self, instance: &Metadata) -> MonitorResult<HealthStatus> {
        let health = match self.providers.driver_for(instance) {
            Ok(driver) => match driver.get_health().await {
                Ok(health) => health,
                Err(e) => {
                    warn!(instance_id = %instance.id, error = %e, "health check failed");
                    HealthStatus::unhealthy()
                }
            },
            Err(e) => {
                error!(instance_id = %instance.id, provider = %instance.provider, error = %e, "cannot resolve driver");
                HealthStatus::unhealthy()
            }
        };

        // Re-read so concurrent edits to other fields survive.
        let mut current = self.instances.get(&instance.id)?;
        if current.status != health.status {
            info!(instance_id = %instance.id, from = %current.status, to = %health.status, "instance health changed");
        }
        current.status = health.status.clone();
        self.instances.update(&current)?;
        Ok(health)
    }

    async fn process(self: Arc<Self>, item: ProgressItem) {
        let Ok(_permit) = self.limiter.clone().acquire_owned().await else {
            self.release(&item.task_id);
            return;
        };

        match self.poll_progress(&item).await {
            Ok(progress) if progress.status.done() => {
                info!(instance_id = %item.instance_id, task_id = %item.task_id, status = %progress.status, "preheat task finished");
                self.release(&item.task_id);
            }
            Ok(progress) => {
                debug!(instance_id = %item.instance_id, task_id = %item.task_id, status = %progress.status, "preheat task in progress");
                self.requeue(ProgressItem { failures: 0, ..item });
            }
            Err(e) if e.is_retryable() && item.failures + 1 < self.config.max_poll_failures => {
                let failures = item.failures + 1;
                warn!(instance_id = %item.instance_id, task_id = %item.task_id, failures, error = %e, "progress check failed, will retry");
                self.requeue(ProgressItem { failures, ..item });
            }
            Err(e) => {
                error!(instance_id = %item.instance_id, task_id = %item.task_id, failures = item.failures + 1, error = %e, "dropping preheat watch");
                self.release(&item.task_id);
            }
        }
    }

    async fn poll_progress(&self, item: &ProgressItem) -> MonitorResult<ProgressStatus> {
        let instance = self.instances.get(&item.instance_id)?;
        let record = self.histories.get_history(&item.task_id)?;
        if record.instance != item.instance_id {
            return Err(MonitorError::InstanceMismatch {
                task_id: item.task_id.clone(),
                instance_id: item.instance_id.clone(),
                owner: record.instance,
            });
        }
        let driver = self.providers.driver_for(&instance)?;
        let progress = driver.check_progress(&item.task_id).await?;
        self.histories.update_status(
            &item.task_id,
            progress.status,
            progress.start_time,
            progress.finish_time,
        )?;
        Ok(progress)
    }

    fn requeue(&self, item: ProgressItem) {
        let delayed = Delayed {
            due: Instant::now() + self.config.progress_interval,
            item,
        };
        if let Err(mpsc::error::SendError(delayed)) = self.requeue_tx.send(delayed) {
            debug!(task_id = %delayed.item.task_id, "requeue timer stopped, releasing watch");
            self.release(&delayed.item.task_id);
        }
    }
}

async fn run_health_loop(inner: Arc<Inner>, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(inner.config.health_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    debug!("health loop starting");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let inner = inner.clone();
                tokio::spawn(async move {
                    if let Err(e) = inner.sweep_health().await {
                        error!(error = %e, "health sweep failed");
                    }
                });
            }
            _ = shutdown.changed() => {
                debug!("health loop shutting down");
                break;
            }
        }
    }
}

async fn run_progress_loop(
    inner: Arc<Inner>,
    mut queue: mpsc::Receiver<ProgressItem>,
    mut shutdown: watch::Receiver<bool>,
) {
    debug!("progress loop starting");

    loop {
        tokio::select! {
            item = queue.recv() => match item {
                Some(item) => {
                    tokio::spawn(inner.clone().process(item));
                }
                None => break,
            },
            _ = shutdown.changed() => {
                debug!("progress loop shutting down");
                break;
            }
        }
    }
}
