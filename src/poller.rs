use crate::config::{ApiConfig, Config};
use crate::error::PollError;
use crate::graphql::{GraphqlClient, QueryKind};
use crate::metrics::Metrics;
use crate::normalize::{normalize_cpu, normalize_interfaces, normalize_memory, normalize_storage};
use crate::snapshot::{
    CpuStats, InterfaceStat, Resources, Snapshot, StorageStats, SystemStatus, VersionInfo,
};
use crate::util::truncate_to_millis;
use serde_json::Value;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

pub type PollOutcome = Result<Snapshot, PollError>;

/// Results of one cycle's category requests, before assembly.
#[derive(Debug, Clone)]
pub struct CycleResults {
    pub memory: Result<Value, PollError>,
    pub cpu: Result<Value, PollError>,
    pub storage: Result<Value, PollError>,
    pub interfaces: Result<Value, PollError>,
}

#[derive(Clone)]
pub struct Poller {
    api: ApiConfig,
    interval: Duration,
    client: GraphqlClient,
    metrics: Option<Arc<Metrics>>,
}

impl Poller {
    pub fn new(cfg: &Config) -> Result<Self, reqwest::Error> {
        let api = ApiConfig {
            request_timeout_ms: Some(cfg.request_timeout_ms()),
            ..cfg.api.clone()
        };
        Ok(Self {
            client: GraphqlClient::new(&api)?,
            api,
            interval: cfg.poll_interval(),
            metrics: None,
        })
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Polls now and then every interval, handing each outcome to `on_update`
    /// until the returned handle is cancelled or dropped.
    pub fn start<F>(&self, on_update: F) -> CancelHandle
    where
        F: Fn(PollOutcome) + Send + Sync + 'static,
    {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let poller = self.clone();
        let on_update = Arc::new(on_update);
        let gate = Arc::new(CycleGate::default());

        let task = tokio::spawn(async move {
            let mut shutdown = cancel_rx.clone();
            let mut ticker = tokio::time::interval(poller.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut cycle = 0_u64;

            loop {
                tokio::select! {
                    _ = shutdown.changed() => {
                        info!("получен сигнал остановки опроса");
                        break;
                    }
                    _ = ticker.tick() => {
                        cycle += 1;
                        let poller = poller.clone();
                        let on_update = on_update.clone();
                        let gate = gate.clone();
                        let cancel_rx = cancel_rx.clone();
                        // Cycles may overlap when the router is slower than the interval.
                        tokio::spawn(async move {
                            let outcome = poller.poll_once().await;
                            let published = gate.publish(
                                cycle,
                                || is_cancelled(&cancel_rx),
                                || on_update(outcome),
                            );
                            match published {
                                Publish::Delivered => {}
                                Publish::Cancelled => {
                                    debug!(cycle, "опрос остановлен, результат цикла отброшен")
                                }
                                Publish::Superseded => {
                                    debug!(cycle, "результат устарел, цикл отброшен")
                                }
                            }
                        });
                    }
                }
            }
        });

        CancelHandle { cancel_tx, task }
    }

    pub async fn poll_once(&self) -> PollOutcome {
        if !self.api.use_real_api {
            debug!("реальный API отключен, возвращается снимок-заглушка");
            return Ok(Snapshot::placeholder());
        }

        let start = Instant::now();
        let results = self.fetch_all().await;
        let outcome = self.assemble(results);
        match &outcome {
            Ok(_) => debug!(
                elapsed = %humantime::format_duration(truncate_to_millis(start.elapsed())),
                "цикл опроса завершен"
            ),
            Err(err) => warn!(kind = %err.kind, error = %err.message, "цикл опроса завершился ошибкой"),
        }
        outcome
    }

    /// Issues the four category requests concurrently and waits for all of them.
    pub async fn fetch_all(&self) -> CycleResults {
        let (memory, cpu, storage, interfaces) = tokio::join!(
            self.client.execute(QueryKind::Memory),
            self.client.execute(QueryKind::Cpu),
            self.client.execute(QueryKind::Storage),
            self.client.execute(QueryKind::Interfaces),
        );
        CycleResults {
            memory,
            cpu,
            storage,
            interfaces,
        }
    }

    /// Memory is required; the other categories fall back to their defaults.
    pub fn assemble(&self, results: CycleResults) -> PollOutcome {
        let memory = normalize_memory(&results.memory?);

        let cpu = self
            .best_effort(QueryKind::Cpu, results.cpu)
            .map(|v| normalize_cpu(&v))
            .unwrap_or_else(CpuStats::default);
        let storage = self
            .best_effort(QueryKind::Storage, results.storage)
            .map(|v| normalize_storage(&v))
            .unwrap_or_else(StorageStats::default);
        let interfaces = self
            .best_effort(QueryKind::Interfaces, results.interfaces)
            .map(|v| normalize_interfaces(&v))
            .unwrap_or_else(Vec::<InterfaceStat>::new);

        Ok(Snapshot {
            system_status: SystemStatus::unknown(),
            resources: Resources {
                cpu,
                memory,
                storage,
            },
            interfaces,
            version: VersionInfo::unknown(),
        })
    }

    fn best_effort(&self, kind: QueryKind, result: Result<Value, PollError>) -> Option<Value> {
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(
                    category = kind.as_str(),
                    kind = %err.kind,
                    error = %err.message,
                    "категория недоступна, используются значения по умолчанию"
                );
                if let Some(metrics) = &self.metrics {
                    metrics.inc_category_failure(kind.as_str());
                }
                None
            }
        }
    }
}

fn is_cancelled(rx: &watch::Receiver<bool>) -> bool {
    rx.has_changed().is_err() || *rx.borrow()
}

/// Stops the polling schedule. Dropping the handle has the same effect.
pub struct CancelHandle {
    cancel_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.cancel_tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel_tx.borrow()
    }

    /// Cancels and waits for the scheduler loop to exit.
    pub async fn stop(self) {
        self.cancel();
        let _ = self.task.await;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Publish {
    Delivered,
    Cancelled,
    Superseded,
}

/// Serializes delivery so a cycle publishes only if no later cycle has.
#[derive(Debug, Default)]
pub struct CycleGate {
    last_published: Mutex<u64>,
}

impl CycleGate {
    /// The cancellation check, the sequence check and `deliver` all run under
    /// one lock, so an older cycle can never land after a newer one.
    pub fn publish<C, D>(&self, cycle: u64, cancelled: C, deliver: D) -> Publish
    where
        C: FnOnce() -> bool,
        D: FnOnce(),
    {
        let mut last = self
            .last_published
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if cancelled() {
            return Publish::Cancelled;
        }
        if *last >= cycle {
            return Publish::Superseded;
        }
        deliver();
        *last = cycle;
        Publish::Delivered
    }
}
