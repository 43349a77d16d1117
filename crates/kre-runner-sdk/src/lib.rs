//! KRE Runner SDK - Types and traits for writing worker modules
//!
//! A worker module is loaded by the KRE runner, initialized once with a
//! [`Context`] and then invoked once per request. This crate defines that
//! contract: the context capability, metric submission options, request
//! data and handler output.

pub mod context;
pub mod error;
pub mod handler;
pub mod metric;
pub mod request;
pub mod response;

pub mod prelude {
    //! Common imports for worker modules
    pub use crate::context::Context;
    pub use crate::error::HandlerError;
    pub use crate::handler::WorkerModule;
    pub use crate::metric::{MetricError, SaveMetric, ERR_MISSING_VALUES, ERR_NEW_LABELS};
    pub use crate::request::RequestData;
    pub use crate::response::HandlerOutput;
    pub use serde::{Deserialize, Serialize};
    pub use serde_json::{json, Value as JsonValue};
}

// Re-export key types at crate root
pub use context::Context;
pub use error::HandlerError;
pub use handler::{
    DispatchHook, ModuleConstructor, WorkerModule, DISPATCH_HOOK_SYMBOL, MODULE_ENTRY_SYMBOL,
};
pub use metric::{MetricError, SaveMetric, ERR_MISSING_VALUES, ERR_NEW_LABELS};
pub use request::RequestData;
pub use response::HandlerOutput;

// Used by `worker_module!` so module crates need no direct tracing dependency
#[doc(hidden)]
pub mod __private {
    pub use tracing;
}
