//! Worker module trait and export macro
//!
//! A worker module implements [`WorkerModule`]. The runner either links it
//! directly through its module registry, or compiles it as a `cdylib` and
//! loads it at runtime; in the latter case the crate exports its constructor
//! with [`worker_module!`](crate::worker_module).
//!
//! A library carries its own copy of `tracing`, with no subscriber of its
//! own. The macro therefore also exports [`DISPATCH_HOOK_SYMBOL`], through
//! which the host installs its dispatcher before constructing the module.
//!
//! # Example
//!
//! ```ignore
//! use kre_runner_sdk::prelude::*;
//!
//! pub struct Echo;
//!
//! impl WorkerModule for Echo {
//!     fn name(&self) -> &str { "echo" }
//!
//!     fn handle(&self, _ctx: &dyn Context, data: RequestData) -> Result<HandlerOutput, HandlerError> {
//!         Ok(HandlerOutput::result(data.require_str("name")?))
//!     }
//! }
//!
//! kre_runner_sdk::worker_module!(Echo);
//! ```

use crate::{Context, HandlerError, HandlerOutput, RequestData};

/// Name of the constructor symbol exported by [`worker_module!`](crate::worker_module)
pub const MODULE_ENTRY_SYMBOL: &[u8] = b"kre_worker_module";

/// Signature of the exported constructor.
///
/// The returned pointer owns a boxed module; the host takes it back with
/// `Box::from_raw` exactly once.
#[allow(improper_ctypes_definitions)]
pub type ModuleConstructor = unsafe extern "C" fn() -> *mut Box<dyn WorkerModule>;

/// Name of the dispatcher hook exported by [`worker_module!`](crate::worker_module)
pub const DISPATCH_HOOK_SYMBOL: &[u8] = b"kre_set_dispatch";

/// Signature of the exported dispatcher hook.
///
/// Host and library must be built against the same `tracing` version.
#[allow(improper_ctypes_definitions)]
pub type DispatchHook = unsafe extern "C" fn(&tracing::Dispatch);

/// Install `dispatch` as this copy of `tracing`'s global default.
///
/// Returns `false` when a global default was already set, in which case the
/// existing one is kept.
pub fn install_dispatch(dispatch: &tracing::Dispatch) -> bool {
    tracing::dispatcher::set_global_default(dispatch.clone()).is_ok()
}

/// The two entry points a host binds at load time.
///
/// The host calls `init` exactly once per worker, and only once it has
/// returned `Ok` does it start calling `handle`. `handle` may be called
/// concurrently; shared state belongs in the [`Context`] store.
pub trait WorkerModule: Send + Sync + 'static {
    /// Module name, used in logs and for registry lookup
    fn name(&self) -> &str;

    /// Seed shared state into the context. Errors abort worker startup.
    fn init(&self, _ctx: &dyn Context) -> Result<(), HandlerError> {
        Ok(())
    }

    /// Process one unit of work
    fn handle(&self, ctx: &dyn Context, data: RequestData) -> Result<HandlerOutput, HandlerError>;
}

/// Export a worker module constructor for dynamic loading
///
/// # Example
///
/// ```ignore
/// kre_runner_sdk::worker_module!(Greeting::new());
/// ```
#[macro_export]
macro_rules! worker_module {
    ($ctor:expr) => {
        #[no_mangle]
        #[allow(improper_ctypes_definitions)]
        pub extern "C" fn kre_worker_module() -> *mut Box<dyn $crate::WorkerModule> {
            let module: Box<dyn $crate::WorkerModule> = Box::new($ctor);
            Box::into_raw(Box::new(module))
        }

        #[no_mangle]
        #[allow(improper_ctypes_definitions)]
        pub extern "C" fn kre_set_dispatch(dispatch: &$crate::__private::tracing::Dispatch) {
            $crate::handler::install_dispatch(dispatch);
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SaveMetric;
    use serde_json::Value;

    struct NullContext;

    impl Context for NullContext {
        fn set_value(&self, _key: &str, _value: Value) {}
        fn get_value(&self, _key: &str) -> Option<Value> {
            None
        }
        fn save_metric(&self, _metric: SaveMetric) {}
    }

    struct Echo;

    impl WorkerModule for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        fn handle(&self, _ctx: &dyn Context, data: RequestData) -> Result<HandlerOutput, HandlerError> {
            Ok(HandlerOutput::result(data.require_str("name")?))
        }
    }

    crate::worker_module!(Echo);

    #[test]
    fn test_exported_constructor() {
        let ctor: ModuleConstructor = kre_worker_module;
        let module = unsafe { *Box::from_raw(ctor()) };
        assert_eq!(module.name(), "echo");

        let ctx = NullContext;
        module.init(&ctx).unwrap();
        let out = module
            .handle(&ctx, RequestData::new().with("name", "World"))
            .unwrap();
        assert_eq!(out, HandlerOutput::result("World"));

        let err = module.handle(&ctx, RequestData::new()).unwrap_err();
        assert!(matches!(err, HandlerError::MissingKey(_)));
    }

    #[test]
    fn test_exported_dispatch_hook() {
        let hook: DispatchHook = kre_set_dispatch;
        let dispatch = tracing::Dispatch::none();

        // Only the first install takes effect
        unsafe { hook(&dispatch) };
        assert!(!install_dispatch(&dispatch));
    }
}
