//! Wiring: config → metric store → module → initialized worker

use std::sync::Arc;

use anyhow::{Context as _, Result};

use crate::config::RunnerConfig;
use crate::runtime::context::ContextBuilder;
use crate::runtime::loader::ModuleLoader;
use crate::runtime::metrics::{JsonlMetricStore, MemoryMetricStore, MetricSink, MetricStats, MetricStore};
use crate::runtime::worker::Worker;

/// Open the metric store the config asks for
pub fn open_store(config: &RunnerConfig) -> Result<Arc<dyn MetricStore>> {
    match &config.metrics_path {
        Some(path) => {
            let store = JsonlMetricStore::open(path)
                .with_context(|| format!("opening metric file {}", path.display()))?;
            Ok(Arc::new(store))
        }
        None => Ok(Arc::new(MemoryMetricStore::new())),
    }
}

/// A running, initialized worker together with its metric pipeline
pub struct Runner {
    worker: Worker,
    sink: MetricSink,
    store: Arc<dyn MetricStore>,
}

impl Runner {
    /// Load the configured module, start the metric writer and run `init`
    pub async fn start(
        config: &RunnerConfig,
        loader: &ModuleLoader,
        store: Arc<dyn MetricStore>,
    ) -> Result<Self> {
        let module = loader
            .load(&config.module_source())
            .context("loading worker module")?;

        let sink = MetricSink::start(
            Arc::clone(&store),
            config.identity(),
            &tokio::runtime::Handle::current(),
        );

        let ctx = ContextBuilder::new(sink.clone())
            .config(Arc::new(config.runtime_config()))
            .build();

        let worker = Worker::new(module, ctx);
        worker.init().await.context("initializing worker")?;

        Ok(Self { worker, sink, store })
    }

    pub fn worker(&self) -> &Worker {
        &self.worker
    }

    pub fn store(&self) -> &Arc<dyn MetricStore> {
        &self.store
    }

    /// Wait for pending metrics to reach the store
    pub async fn flush(&self) -> Result<MetricStats> {
        Ok(self.sink.flush().await?)
    }

    /// Deliver pending metrics and stop the metric writer
    pub async fn shutdown(self) -> Result<MetricStats> {
        let stats = self.sink.shutdown().await?;
        tracing::info!(
            submitted = stats.submitted,
            stored = stats.stored,
            failed = stats.failed,
            dropped = stats.dropped,
            "Runner stopped"
        );
        Ok(stats)
    }
}
