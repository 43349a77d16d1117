//! Host-side worker context
//!
//! [`WorkerContext`] is the runner's implementation of the SDK
//! [`Context`](kre_runner_sdk::Context) trait. One context is built per
//! worker instance; its key/value store lives exactly as long as the worker,
//! and its metric submissions feed the worker's [`MetricSink`].

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use kre_runner_sdk::{Context as SdkContext, SaveMetric};

use super::metrics::MetricSink;

/// Worker instance identifier for tracing
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkerId(String);

impl WorkerId {
    /// Create a new random worker ID
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from a string
    pub fn from_string(s: String) -> Self {
        Self(s)
    }

    /// Get the inner string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for WorkerId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for WorkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which runtime, version and node a worker belongs to.
///
/// Attached to every metric the worker saves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerIdentity {
    pub runtime_id: String,
    pub version: String,
    pub node: String,
}

impl Default for WorkerIdentity {
    fn default() -> Self {
        Self {
            runtime_id: "local".to_string(),
            version: "dev".to_string(),
            node: "worker".to_string(),
        }
    }
}

/// Runtime configuration snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Handler execution timeout in seconds
    pub handler_timeout_secs: u64,

    /// Log request payloads
    pub debug: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            handler_timeout_secs: 30,
            debug: false,
        }
    }
}

/// Context shared by one worker's `init` and `handle` calls
///
/// Cheap to clone: clones share the same store and metric sink.
#[derive(Clone)]
pub struct WorkerContext {
    values: Arc<DashMap<String, Value>>,

    metrics: MetricSink,

    /// Unique worker identifier
    pub worker_id: WorkerId,

    /// Configuration snapshot
    pub config: Arc<RuntimeConfig>,
}

impl WorkerContext {
    /// Create a fresh context with an empty store
    pub fn new(metrics: MetricSink, config: Arc<RuntimeConfig>) -> Self {
        ContextBuilder::new(metrics).config(config).build()
    }

    /// Whether request payloads are logged
    pub fn is_debug(&self) -> bool {
        self.config.debug
    }

    /// Get handler timeout duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.handler_timeout_secs)
    }

    /// The sink this context submits metrics to
    pub fn metrics(&self) -> &MetricSink {
        &self.metrics
    }
}

impl SdkContext for WorkerContext {
    fn set_value(&self, key: &str, value: Value) {
        tracing::trace!(worker = %self.worker_id, key, "Context value set");
        self.values.insert(key.to_string(), value);
    }

    fn get_value(&self, key: &str) -> Option<Value> {
        self.values.get(key).map(|entry| entry.value().clone())
    }

    fn save_metric(&self, metric: SaveMetric) {
        self.metrics.submit(metric);
    }
}

impl std::fmt::Debug for WorkerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerContext")
            .field("worker_id", &self.worker_id)
            .field("values", &self.values.len())
            .field("metrics", &self.metrics)
            .field("config", &self.config)
            .finish()
    }
}

/// Builder for creating WorkerContext instances
pub struct ContextBuilder {
    metrics: MetricSink,
    config: Option<Arc<RuntimeConfig>>,
    worker_id: Option<WorkerId>,
}

impl ContextBuilder {
    /// Create a new builder with the given metric sink
    pub fn new(metrics: MetricSink) -> Self {
        Self {
            metrics,
            config: None,
            worker_id: None,
        }
    }

    /// Set the configuration
    pub fn config(mut self, config: Arc<RuntimeConfig>) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the worker ID
    pub fn worker_id(mut self, worker_id: WorkerId) -> Self {
        self.worker_id = Some(worker_id);
        self
    }

    /// Build the context
    pub fn build(self) -> WorkerContext {
        WorkerContext {
            values: Arc::new(DashMap::new()),
            metrics: self.metrics,
            worker_id: self.worker_id.unwrap_or_default(),
            config: self.config.unwrap_or_else(|| Arc::new(RuntimeConfig::default())),
        }
    }
}
