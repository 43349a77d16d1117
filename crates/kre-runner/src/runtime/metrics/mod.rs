//! Metric sink and writer actor
//!
//! Worker modules submit metrics through the context. The sink resolves each
//! submission into a [`MetricRecord`] and enqueues it on the writer actor's
//! channel; the actor persists records into a [`MetricStore`] on its own
//! thread. Handler latency never depends on store latency.

pub mod store;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use kre_runner_sdk::{MetricError, SaveMetric};

use super::actor::{spawn_blocking_actor, ActorHandle, ActorMessage, ActorResult};
use super::context::WorkerIdentity;

pub use store::{JsonlMetricStore, MemoryMetricStore, MetricStore, MetricStoreError};

/// A metric as persisted by the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub id: Uuid,
    pub date: DateTime<Utc>,
    pub predicted_value: Option<String>,
    pub true_value: Option<String>,
    pub error: Option<MetricError>,
    pub runtime_id: String,
    pub version: String,
    pub node: String,
}

impl MetricRecord {
    /// Resolve a submission, stamping `now` when it carries no date
    pub fn resolve(metric: SaveMetric, identity: &WorkerIdentity, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            date: metric.date_or(now),
            predicted_value: metric.predicted_value,
            true_value: metric.true_value,
            error: metric.error,
            runtime_id: identity.runtime_id.clone(),
            version: identity.version.clone(),
            node: identity.node.clone(),
        }
    }
}

/// Commands sent to the metric writer actor
pub enum MetricCommand {
    /// Persist a record
    Save(MetricRecord),

    /// Reply once every earlier record has been handled
    Flush { reply: oneshot::Sender<MetricStats> },

    /// Stop after handling every earlier record
    Shutdown { reply: oneshot::Sender<MetricStats> },
}

impl ActorMessage for MetricCommand {}

/// Counters shared between the sink and the writer actor
#[derive(Debug, Default)]
struct Counters {
    submitted: AtomicU64,
    stored: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> MetricStats {
        MetricStats {
            submitted: self.submitted.load(Ordering::SeqCst),
            stored: self.stored.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            dropped: self.dropped.load(Ordering::SeqCst),
        }
    }
}

/// Delivery statistics for a sink
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricStats {
    /// Records accepted by `submit`
    pub submitted: u64,
    /// Records the store accepted
    pub stored: u64,
    /// Records the store rejected
    pub failed: u64,
    /// Records lost because the writer had stopped
    pub dropped: u64,
}

/// Metric sink handle - cheap to clone
#[derive(Clone)]
pub struct MetricSink {
    handle: ActorHandle<MetricCommand>,
    identity: Arc<WorkerIdentity>,
    counters: Arc<Counters>,
}

impl MetricSink {
    /// Start the writer actor on `runtime` and return a sink feeding it
    pub fn start(
        store: Arc<dyn MetricStore>,
        identity: WorkerIdentity,
        runtime: &tokio::runtime::Handle,
    ) -> Self {
        let counters = Arc::new(Counters::default());
        let actor_counters = Arc::clone(&counters);

        let handle = spawn_blocking_actor(runtime, move |rx| {
            metric_writer(store, actor_counters, rx)
        });

        Self {
            handle,
            identity: Arc::new(identity),
            counters,
        }
    }

    /// Enqueue a metric. Never blocks and never fails from the caller's view.
    pub fn submit(&self, metric: SaveMetric) {
        let record = MetricRecord::resolve(metric, &self.identity, Utc::now());
        let id = record.id;

        match self.handle.send(MetricCommand::Save(record)) {
            Ok(()) => {
                self.counters.submitted.fetch_add(1, Ordering::SeqCst);
                tracing::debug!(metric_id = %id, "Metric queued");
            }
            Err(_) => {
                self.counters.dropped.fetch_add(1, Ordering::SeqCst);
                tracing::warn!(metric_id = %id, "Metric writer stopped, dropping metric");
            }
        }
    }

    /// Wait until every metric submitted so far has reached the store
    pub async fn flush(&self) -> ActorResult<MetricStats> {
        self.handle.request(|reply| MetricCommand::Flush { reply }).await
    }

    /// Flush and stop the writer actor
    pub async fn shutdown(&self) -> ActorResult<MetricStats> {
        self.handle.request(|reply| MetricCommand::Shutdown { reply }).await
    }

    /// Current delivery statistics
    pub fn stats(&self) -> MetricStats {
        self.counters.snapshot()
    }

    pub fn is_alive(&self) -> bool {
        self.handle.is_alive()
    }
}

impl std::fmt::Debug for MetricSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricSink")
            .field("identity", &self.identity)
            .field("alive", &self.handle.is_alive())
            .field("stats", &self.stats())
            .finish()
    }
}

/// The metric writer loop, run on a blocking thread
fn metric_writer(
    store: Arc<dyn MetricStore>,
    counters: Arc<Counters>,
    mut rx: mpsc::UnboundedReceiver<MetricCommand>,
) {
    tracing::info!("Starting metric writer");

    while let Some(cmd) = rx.blocking_recv() {
        match cmd {
            MetricCommand::Save(record) => match store.insert(&record) {
                Ok(()) => {
                    counters.stored.fetch_add(1, Ordering::SeqCst);
                }
                Err(e) => {
                    counters.failed.fetch_add(1, Ordering::SeqCst);
                    tracing::error!(metric_id = %record.id, error = %e, "Failed to store metric");
                }
            },

            MetricCommand::Flush { reply } => {
                let _ = reply.send(counters.snapshot());
            }

            MetricCommand::Shutdown { reply } => {
                tracing::info!("Metric writer shutting down");
                rx.close();
                // Flush/Shutdown requests still queued get their reply channel dropped
                let mut late = 0u64;
                while let Ok(cmd) = rx.try_recv() {
                    if let MetricCommand::Save(_) = cmd {
                        late += 1;
                    }
                }
                if late > 0 {
                    counters.dropped.fetch_add(late, Ordering::SeqCst);
                    tracing::warn!(count = late, "Dropped metrics submitted during shutdown");
                }
                let _ = reply.send(counters.snapshot());
                break;
            }
        }
    }

    tracing::info!("Metric writer stopped");
}
