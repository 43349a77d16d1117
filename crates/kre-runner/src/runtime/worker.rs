//! Worker lifecycle
//!
//! A [`Worker`] binds one loaded module to one [`WorkerContext`]. It runs the
//! module's `init` exactly once and refuses `handle` calls until `init` has
//! succeeded, so whatever `init` stores in the context is always visible to
//! the first request.
//!
//! Module code is synchronous; every call runs on the blocking pool under the
//! configured timeout. A call that times out keeps running in the background
//! but its result is discarded.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use kre_runner_sdk::{HandlerError, HandlerOutput, RequestData};

use super::context::WorkerContext;
use super::loader::LoadedModule;

const STATE_NEW: u8 = 0;
const STATE_INITIALIZING: u8 = 1;
const STATE_READY: u8 = 2;
const STATE_FAILED: u8 = 3;

/// Lifecycle state of a worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    New,
    Initializing,
    Ready,
    /// `init` returned an error or timed out. Terminal: a timed-out `init`
    /// may still finish on its blocking thread, but the worker stays failed.
    Failed,
}

impl WorkerState {
    fn from_u8(value: u8) -> Self {
        match value {
            STATE_NEW => WorkerState::New,
            STATE_INITIALIZING => WorkerState::Initializing,
            STATE_READY => WorkerState::Ready,
            _ => WorkerState::Failed,
        }
    }
}

/// Errors a worker reports to its caller
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("Worker not initialized")]
    NotInitialized,

    #[error("Worker already initialized")]
    AlreadyInitialized,

    #[error("Initialization failed: {0}")]
    Init(#[source] HandlerError),

    #[error("Handler error: {0}")]
    Handler(#[from] HandlerError),

    #[error("Handler execution timed out after {0:?}")]
    Timeout(Duration),

    #[error("Handler task panicked: {0}")]
    Panicked(String),
}

impl WorkerError {
    /// Short machine-readable kind, used in IPC replies
    pub fn kind(&self) -> &'static str {
        match self {
            WorkerError::NotInitialized => "not_initialized",
            WorkerError::AlreadyInitialized => "already_initialized",
            WorkerError::Init(_) => "init",
            WorkerError::Handler(e) => e.kind(),
            WorkerError::Timeout(_) => "timeout",
            WorkerError::Panicked(_) => "panicked",
        }
    }
}

/// Guard that decrements the in-flight count when dropped
struct RequestGuard {
    active: Arc<AtomicU64>,
}

impl RequestGuard {
    fn acquire(active: &Arc<AtomicU64>) -> Self {
        active.fetch_add(1, Ordering::SeqCst);
        Self {
            active: Arc::clone(active),
        }
    }
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Statistics about a worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerStats {
    /// Calls currently executing
    pub active_requests: u64,
    /// Calls that returned output
    pub served: u64,
    /// Calls that ended in an error
    pub failed: u64,
}

/// One module instance bound to its context
pub struct Worker {
    module: Arc<LoadedModule>,
    ctx: WorkerContext,
    state: AtomicU8,
    active: Arc<AtomicU64>,
    served: AtomicU64,
    failed: AtomicU64,
}

impl Worker {
    pub fn new(module: LoadedModule, ctx: WorkerContext) -> Self {
        Self {
            module: Arc::new(module),
            ctx,
            state: AtomicU8::new(STATE_NEW),
            active: Arc::new(AtomicU64::new(0)),
            served: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    pub fn context(&self) -> &WorkerContext {
        &self.ctx
    }

    pub fn module(&self) -> &LoadedModule {
        &self.module
    }

    pub fn module_name(&self) -> &str {
        self.module.name()
    }

    pub fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Run the module's `init` hook. Only the first call does anything.
    pub async fn init(&self) -> Result<(), WorkerError> {
        self.state
            .compare_exchange(STATE_NEW, STATE_INITIALIZING, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| WorkerError::AlreadyInitialized)?;

        tracing::info!(worker = %self.ctx.worker_id, module = %self.module_name(), "Initializing worker");

        let module = Arc::clone(&self.module);
        let ctx = self.ctx.clone();
        let result = self
            .run_blocking(move || module.init(&ctx))
            .await
            .and_then(|r| r.map_err(WorkerError::Init));

        match result {
            Ok(()) => {
                self.state.store(STATE_READY, Ordering::SeqCst);
                tracing::info!(worker = %self.ctx.worker_id, "Worker ready");
                Ok(())
            }
            Err(e) => {
                self.state.store(STATE_FAILED, Ordering::SeqCst);
                tracing::error!(worker = %self.ctx.worker_id, error = %e, "Worker initialization failed");
                if let WorkerError::Timeout(_) = e {
                    tracing::warn!(
                        worker = %self.ctx.worker_id,
                        "Init is still running in the background and may keep writing to the context"
                    );
                }
                Err(e)
            }
        }
    }

    /// Run the module's `handle` hook for one request
    pub async fn handle(&self, data: RequestData) -> Result<HandlerOutput, WorkerError> {
        if self.state() != WorkerState::Ready {
            return Err(WorkerError::NotInitialized);
        }

        let _guard = RequestGuard::acquire(&self.active);
        let start = Instant::now();

        if self.ctx.is_debug() {
            tracing::debug!(worker = %self.ctx.worker_id, request = ?data, "Handling request");
        }

        let module = Arc::clone(&self.module);
        let ctx = self.ctx.clone();
        let result = self
            .run_blocking(move || module.handle(&ctx, data))
            .await
            .and_then(|r| r.map_err(WorkerError::Handler));

        match &result {
            Ok(_) => {
                self.served.fetch_add(1, Ordering::SeqCst);
                tracing::debug!(
                    worker = %self.ctx.worker_id,
                    elapsed_ms = start.elapsed().as_millis(),
                    "Request handled"
                );
            }
            Err(e) => {
                self.failed.fetch_add(1, Ordering::SeqCst);
                tracing::warn!(worker = %self.ctx.worker_id, error = %e, "Request failed");
            }
        }

        result
    }

    /// Get worker stats
    pub fn stats(&self) -> WorkerStats {
        WorkerStats {
            active_requests: self.active.load(Ordering::SeqCst),
            served: self.served.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
        }
    }

    async fn run_blocking<F, R>(&self, f: F) -> Result<R, WorkerError>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let timeout = self.ctx.timeout();
        let task = tokio::task::spawn_blocking(f);

        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(WorkerError::Panicked(e.to_string())),
            Err(_) => Err(WorkerError::Timeout(timeout)),
        }
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("module", &self.module)
            .field("state", &self.state())
            .field("stats", &self.stats())
            .finish()
    }
}
