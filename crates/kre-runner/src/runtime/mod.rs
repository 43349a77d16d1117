//! Runtime module - worker hosting
//!
//! This module provides:
//! - Context implementation handed to worker modules
//! - Module loading from the built-in registry or shared libraries
//! - Worker lifecycle (init once, then handle)
//! - Metric sink with an actor-backed writer and pluggable stores

pub mod actor;
pub mod context;
pub mod loader;
pub mod metrics;
pub mod worker;

pub use context::{ContextBuilder, RuntimeConfig, WorkerContext, WorkerId, WorkerIdentity};
pub use loader::{LoadError, LoadedModule, ModuleLoader, ModuleRegistry, ModuleSource};
pub use metrics::{MetricRecord, MetricSink, MetricStats, MetricStore};
pub use worker::{Worker, WorkerError, WorkerState, WorkerStats};
