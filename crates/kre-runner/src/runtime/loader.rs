//! Worker module loading
//!
//! Modules come from two places:
//! - the [`ModuleRegistry`] of modules linked into the runner binary
//! - shared libraries (.so/.dll/.dylib) built with the SDK's
//!   `worker_module!` macro and loaded at runtime
//!
//! Either way the host ends up with a [`LoadedModule`] it can bind to a
//! worker.

use std::collections::HashMap;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use libloading::{Library, Symbol};

use kre_runner_sdk::{
    DispatchHook, ModuleConstructor, WorkerModule, DISPATCH_HOOK_SYMBOL, MODULE_ENTRY_SYMBOL,
};

/// Factory producing a fresh module instance
pub type ModuleFactory = Arc<dyn Fn() -> Box<dyn WorkerModule> + Send + Sync>;

/// Where a module is loaded from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleSource {
    /// A module registered in the runner's registry
    Registered(String),
    /// A shared library exporting the module constructor
    Library(PathBuf),
}

impl std::fmt::Display for ModuleSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModuleSource::Registered(name) => write!(f, "registered:{}", name),
            ModuleSource::Library(path) => write!(f, "library:{}", path.display()),
        }
    }
}

/// Errors raised while loading a module
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("Module not registered: {0}")]
    NotRegistered(String),

    #[error("Module library not found: {0}")]
    LibraryNotFound(PathBuf),

    #[error("Failed to load library {path}: {source}")]
    Library {
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },

    #[error("Library {0} returned a null module")]
    NullModule(PathBuf),
}

/// A module ready to be bound to a worker
pub struct LoadedModule {
    // Declared before the library: fields drop in order and the module's
    // code lives in the library.
    module: Box<dyn WorkerModule>,

    _library: Option<Library>,

    /// Where the module came from
    pub source: ModuleSource,
}

impl LoadedModule {
    /// Wrap an in-process module
    pub fn from_module(module: Box<dyn WorkerModule>, source: ModuleSource) -> Self {
        Self {
            module,
            _library: None,
            source,
        }
    }

    /// Load a module from a shared library
    ///
    /// # Safety
    /// This function loads and executes code from a dynamic library.
    /// The library must export `kre_worker_module` with the SDK's
    /// `ModuleConstructor` signature and be built against the same SDK.
    /// An exported `kre_set_dispatch` hook is called with the host's current
    /// dispatcher before the constructor runs.
    pub unsafe fn load_library(path: &Path) -> Result<Self, LoadError> {
        if !path.exists() {
            return Err(LoadError::LibraryNotFound(path.to_path_buf()));
        }

        let library = Library::new(path).map_err(|source| LoadError::Library {
            path: path.to_path_buf(),
            source,
        })?;

        // Route the library's log output to the host's subscriber
        match library.get::<DispatchHook>(DISPATCH_HOOK_SYMBOL) {
            Ok(hook) => tracing::dispatcher::get_default(|dispatch| hook(dispatch)),
            Err(_) => tracing::debug!(path = %path.display(), "Library exports no dispatch hook"),
        }

        let raw = {
            let ctor: Symbol<ModuleConstructor> =
                library.get(MODULE_ENTRY_SYMBOL).map_err(|source| LoadError::Library {
                    path: path.to_path_buf(),
                    source,
                })?;
            ctor()
        };

        if raw.is_null() {
            return Err(LoadError::NullModule(path.to_path_buf()));
        }

        // The constructor hands over ownership of the boxed module
        let module = *Box::from_raw(raw);

        Ok(Self {
            module,
            _library: Some(library),
            source: ModuleSource::Library(path.to_path_buf()),
        })
    }

    /// Module name as reported by the module
    pub fn name(&self) -> &str {
        self.module.name()
    }

    /// Whether the module's code lives in a loaded library
    pub fn is_dynamic(&self) -> bool {
        self._library.is_some()
    }
}

impl Deref for LoadedModule {
    type Target = dyn WorkerModule;

    fn deref(&self) -> &Self::Target {
        &*self.module
    }
}

impl std::fmt::Debug for LoadedModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedModule")
            .field("name", &self.module.name())
            .field("source", &self.source)
            .field("dynamic", &self.is_dynamic())
            .finish()
    }
}

/// Registry of modules linked into the runner
#[derive(Clone, Default)]
pub struct ModuleRegistry {
    factories: HashMap<String, ModuleFactory>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the modules shipped with the runner
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register("greeting", || -> Box<dyn WorkerModule> {
            Box::new(greeting_handler::Greeting::new())
        });
        registry
    }

    /// Register a module factory under `name`, replacing any previous one
    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn() -> Box<dyn WorkerModule> + Send + Sync + 'static,
    {
        self.factories.insert(name.to_string(), Arc::new(factory));
    }

    /// Registered module names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    /// Instantiate a registered module
    pub fn create(&self, name: &str) -> Result<Box<dyn WorkerModule>, LoadError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| LoadError::NotRegistered(name.to_string()))?;
        Ok(factory())
    }
}

impl std::fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("modules", &self.names())
            .finish()
    }
}

/// Resolves a [`ModuleSource`] into a [`LoadedModule`]
#[derive(Debug, Clone)]
pub struct ModuleLoader {
    registry: ModuleRegistry,
}

impl ModuleLoader {
    pub fn new(registry: ModuleRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    /// Load a module from the given source
    pub fn load(&self, source: &ModuleSource) -> Result<LoadedModule, LoadError> {
        let loaded = match source {
            ModuleSource::Registered(name) => {
                LoadedModule::from_module(self.registry.create(name)?, source.clone())
            }
            // Safety: libraries are expected to be built with the SDK's worker_module! macro
            ModuleSource::Library(path) => unsafe { LoadedModule::load_library(path)? },
        };

        tracing::info!(module = %loaded.name(), source = %source, "Loaded worker module");
        Ok(loaded)
    }
}

impl Default for ModuleLoader {
    fn default() -> Self {
        Self::new(ModuleRegistry::with_builtin())
    }
}

/// Resolve a library location: directories are searched for the
/// platform-specific file name of `module_name`
pub fn resolve_library_path(path: &Path, module_name: &str) -> PathBuf {
    if path.is_dir() {
        path.join(format_library_name(module_name))
    } else {
        path.to_path_buf()
    }
}

/// Format the library filename for the current platform
#[cfg(target_os = "windows")]
pub fn format_library_name(module_name: &str) -> String {
    format!("{}.dll", module_name.replace('-', "_"))
}

#[cfg(target_os = "linux")]
pub fn format_library_name(module_name: &str) -> String {
    format!("lib{}.so", module_name.replace('-', "_"))
}

#[cfg(target_os = "macos")]
pub fn format_library_name(module_name: &str) -> String {
    format!("lib{}.dylib", module_name.replace('-', "_"))
}

#[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
pub fn format_library_name(module_name: &str) -> String {
    format!("lib{}.so", module_name.replace('-', "_"))
}
