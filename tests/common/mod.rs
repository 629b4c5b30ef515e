#![allow(dead_code)]

use std::time::Duration;
use segstore::core::config::Config;
use segstore::storage::layout::IndexContext;
use tempfile::TempDir;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Context over a fresh temporary directory; the maintenance tick is slow
/// enough that tests decide when data reaches the disk
pub fn context() -> (TempDir, IndexContext) {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let context = IndexContext::new(Config {
        maintenance_interval: Duration::from_secs(3600),
        ..Config::with_data_dir(dir.path())
    })
    .unwrap();
    (dir, context)
}
