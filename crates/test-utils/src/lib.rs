pub mod builders;
pub mod fake_invoker;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Once;

use tracing_subscriber::{fmt, EnvFilter};

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// Output goes through `with_test_writer()`, so it only shows for failing
/// tests (or with `-- --nocapture`). Pick levels with `RUST_LOG=debug`.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .init();
    });
}

/// Run a future with a 10-second timeout.
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(std::time::Duration::from_secs(10), f)
        .await
        .expect("test timed out after 10 seconds")
}

/// Write `<dir>/<id>_<role>.<ext>` (creating `dir`) and return its path.
pub fn write_item_file(dir: &Path, id: &str, role: &str, ext: &str, contents: &str) -> PathBuf {
    fs::create_dir_all(dir).expect("create item dir");
    let path = dir.join(format!("{id}_{role}.{ext}"));
    fs::write(&path, contents).expect("write item file");
    path
}

/// Write a fake tool binary. Its content is its fingerprint; nothing runs it.
pub fn write_tool(dir: &Path, name: &str, contents: &str) -> PathBuf {
    fs::create_dir_all(dir).expect("create tool dir");
    let path = dir.join(name);
    fs::write(&path, contents).expect("write tool");
    path
}
