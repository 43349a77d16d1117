//! Context capability handed to worker modules
//!
//! The host runtime owns the context and lends it to both entry points of a
//! [`WorkerModule`](crate::WorkerModule). Modules only ever see it through
//! this trait.

use serde_json::Value;

use crate::metric::SaveMetric;

/// Capabilities the host exposes to a worker module.
///
/// The key/value store is scoped to a single worker instance: values set in
/// `init` are visible to every later `handle` call on the same worker and to
/// nothing else. Implementations must be safe to share across concurrent
/// `handle` calls.
pub trait Context: Send + Sync {
    /// Store a value under `key`, replacing any previous value
    fn set_value(&self, key: &str, value: Value);

    /// Fetch the value stored under `key`, `None` if it was never set
    fn get_value(&self, key: &str) -> Option<Value>;

    /// Submit a metric for asynchronous delivery.
    ///
    /// Fire-and-forget: the call never blocks on persistence and reports
    /// nothing back. Unset fields follow the defaults documented on
    /// [`SaveMetric`].
    fn save_metric(&self, metric: SaveMetric);

    /// Convenience accessor for string values
    fn get_str(&self, key: &str) -> Option<String> {
        self.get_value(key)
            .and_then(|v| v.as_str().map(str::to_owned))
    }
}
