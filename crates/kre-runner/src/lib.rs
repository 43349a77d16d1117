//! KRE Runner - hosts a worker module
//!
//! The runner:
//! - Loads a worker module from its registry or a shared library
//! - Initializes it once with a fresh context
//! - Serves framed JSON requests over stdin/stdout
//! - Relays saved metrics to a metric store through a writer actor

pub mod config;
pub mod ipc;
pub mod runner;
pub mod runtime;

pub use config::RunnerConfig;
pub use runner::{open_store, Runner};
