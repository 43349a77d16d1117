//! Runner configuration

use std::env;
use std::path::PathBuf;

use crate::runtime::context::{RuntimeConfig, WorkerIdentity};
use crate::runtime::loader::{resolve_library_path, ModuleSource};

/// Runner configuration loaded from environment variables
#[derive(Debug, Clone, PartialEq)]
pub struct RunnerConfig {
    /// Runtime the worker belongs to
    pub runtime_id: String,

    /// Version tag of the deployed workflow
    pub version: String,

    /// Node name within the workflow
    pub node_name: String,

    /// Registered module to run when no library path is given
    pub handler: String,

    /// Shared library (or directory holding it) to load the module from
    pub handler_path: Option<PathBuf>,

    /// JSON-lines file metrics are appended to; in memory when unset
    pub metrics_path: Option<PathBuf>,

    /// Handler execution timeout in seconds
    pub handler_timeout_secs: u64,

    /// Verbose logging, including request payloads
    pub debug: bool,
}

impl RunnerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_vars<F>(var: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            runtime_id: var("KRE_RUNTIME_ID").unwrap_or_else(|| "local".to_string()),

            version: var("KRE_VERSION").unwrap_or_else(|| "dev".to_string()),

            node_name: var("KRE_NODE_NAME").unwrap_or_else(|| "worker".to_string()),

            handler: var("KRE_HANDLER").unwrap_or_else(|| "greeting".to_string()),

            handler_path: var("KRE_HANDLER_PATH").map(PathBuf::from),

            metrics_path: var("KRE_METRICS_PATH").map(PathBuf::from),

            handler_timeout_secs: var("KRE_HANDLER_TIMEOUT_SECS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(30),

            debug: var("KRE_DEBUG")
                .map(|s| matches!(s.as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
        }
    }

    /// Identity stamped onto saved metrics
    pub fn identity(&self) -> WorkerIdentity {
        WorkerIdentity {
            runtime_id: self.runtime_id.clone(),
            version: self.version.clone(),
            node: self.node_name.clone(),
        }
    }

    /// Runtime settings handed to the worker context
    pub fn runtime_config(&self) -> RuntimeConfig {
        RuntimeConfig {
            handler_timeout_secs: self.handler_timeout_secs,
            debug: self.debug,
        }
    }

    /// Log filter used when `RUST_LOG` is unset
    pub fn default_log_filter(&self) -> &'static str {
        if self.debug {
            "debug,kre_runner=trace"
        } else {
            "info,kre_runner=debug"
        }
    }

    /// Where to load the worker module from; a library path wins over the registry
    pub fn module_source(&self) -> ModuleSource {
        match &self.handler_path {
            Some(path) => ModuleSource::Library(resolve_library_path(path, &self.handler)),
            None => ModuleSource::Registered(self.handler.clone()),
        }
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self::from_env()
    }
}
