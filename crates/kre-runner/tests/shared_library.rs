//! Loads the greeting fixture from its compiled `cdylib`.
//!
//! Kept in its own test binary: the library's copy of `tracing` takes the
//! first dispatcher handed to it for the life of the process.

use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use kre_runner::runtime::loader::{format_library_name, ModuleSource};
use kre_runner::runtime::metrics::{MemoryMetricStore, MetricStore};
use kre_runner::runtime::ModuleLoader;
use kre_runner::{Runner, RunnerConfig};
use kre_runner_sdk::{Context, HandlerOutput, RequestData};

/// Log output shared between the subscriber and the test
#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl Captured {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for Captured {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Directory cargo places the workspace's libraries in: the parent of the
/// `deps` directory holding this test binary.
fn library_dir() -> PathBuf {
    let exe = std::env::current_exe().unwrap();
    let deps = exe.parent().unwrap();
    let profile_dir = deps.parent().unwrap().to_path_buf();

    if profile_dir.join(format_library_name("greeting-handler")).exists() {
        profile_dir
    } else {
        deps.to_path_buf()
    }
}

#[tokio::test]
async fn greeting_module_from_shared_library() {
    let dir = library_dir();
    let config = RunnerConfig::from_vars(|key| match key {
        "KRE_HANDLER" => Some("greeting-handler".to_string()),
        "KRE_HANDLER_PATH" => Some(dir.display().to_string()),
        _ => None,
    });

    let expected = dir.join(format_library_name("greeting-handler"));
    assert_eq!(config.module_source(), ModuleSource::Library(expected.clone()));
    assert!(expected.exists(), "missing {}", expected.display());

    let logs = Captured::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let store = Arc::new(MemoryMetricStore::new());
    let runner = Runner::start(&config, &ModuleLoader::default(), store.clone())
        .await
        .unwrap();

    let module = runner.worker().module();
    assert!(module.is_dynamic());
    assert_eq!(module.name(), "greeting");
    assert_eq!(module.source, ModuleSource::Library(expected));
    assert_eq!(runner.worker().context().get_str("greeting").as_deref(), Some("Hello"));

    let out = runner
        .worker()
        .handle(RequestData::new().with("name", "World"))
        .await
        .unwrap();
    assert_eq!(out, HandlerOutput::result("Hello World!"));

    let stats = runner.shutdown().await.unwrap();
    assert_eq!(stats.stored, 3);
    assert_eq!(store.len().unwrap(), 3);

    // Lines logged by the library's own copy of tracing
    let text = logs.text();
    assert!(text.contains("[worker init]"), "{text}");
    assert!(text.contains("[worker handler]"), "{text}");
    assert!(text.contains("Hello World!"), "{text}");
    assert!(text.contains("Saving some metrics..."), "{text}");
}
