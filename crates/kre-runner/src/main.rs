//! KRE Runner - Main entry point

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use kre_runner::ipc;
use kre_runner::runtime::ModuleLoader;
use kre_runner::{open_store, Runner, RunnerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let config = RunnerConfig::from_env();

    // stdout carries IPC frames, so logs go to stderr
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| config.default_log_filter().into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::info!("Starting KRE runner");
    tracing::info!("Configuration loaded: {:?}", config);

    let store = open_store(&config)?;
    let loader = ModuleLoader::default();
    let runner = Runner::start(&config, &loader, store).await?;

    let mut stdin = tokio::io::stdin();
    let mut stdout = tokio::io::stdout();
    let served = ipc::serve(runner.worker(), &mut stdin, &mut stdout).await;

    // Deliver metrics even when the stream failed
    runner.shutdown().await?;

    let served = served?;
    tracing::info!(requests = served, "KRE runner exiting");
    Ok(())
}
