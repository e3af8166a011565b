//! Prometheus metrics for s3mirror.
//!
//! Counters are recorded through the `metrics` facade on every run.  They
//! only go anywhere once [`init_metrics`] has installed the Prometheus
//! recorder, which the binary does when `observability.metrics_file` is
//! set.  After the run the exposition text is written to that file, ready
//! for a node_exporter text-file collector.

use metrics::describe_counter;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::path::Path;
use std::sync::OnceLock;

// -- Metric name constants ----------------------------------------------------

/// Listing pages requested (counter).
pub const LIST_PAGES_TOTAL: &str = "s3mirror_list_pages_total";

/// Objects written to disk (counter).
pub const OBJECTS_DOWNLOADED_TOTAL: &str = "s3mirror_objects_downloaded_total";

/// Objects that failed to download (counter). Labels: kind.
pub const OBJECTS_FAILED_TOTAL: &str = "s3mirror_objects_failed_total";

/// Bytes written to disk (counter).
pub const BYTES_DOWNLOADED_TOTAL: &str = "s3mirror_bytes_downloaded_total";

/// Directory markers materialized (counter).
pub const DIRECTORIES_CREATED_TOTAL: &str = "s3mirror_directories_created_total";

// -- Global recorder installation ---------------------------------------------

/// Singleton handle to the Prometheus recorder.
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the global Prometheus metrics recorder. Idempotent -- safe to call
/// multiple times (e.g. in tests). Returns a reference to the global handle.
pub fn init_metrics() -> anyhow::Result<&'static PrometheusHandle> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle);
    }
    let handle = PrometheusBuilder::new().install_recorder()?;
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle))
}

/// Register metric descriptions with the global recorder. Call once after
/// `init_metrics()`.
pub fn describe_metrics() {
    describe_counter!(LIST_PAGES_TOTAL, "Listing pages requested");
    describe_counter!(OBJECTS_DOWNLOADED_TOTAL, "Objects downloaded");
    describe_counter!(OBJECTS_FAILED_TOTAL, "Objects that failed to download");
    describe_counter!(BYTES_DOWNLOADED_TOTAL, "Bytes written to disk");
    describe_counter!(DIRECTORIES_CREATED_TOTAL, "Directory markers materialized");
}

/// Write the current exposition text to `path`.
pub fn write_textfile(path: &Path) -> anyhow::Result<()> {
    let handle = PROMETHEUS_HANDLE
        .get()
        .ok_or_else(|| anyhow::anyhow!("Prometheus recorder not initialized"))?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, handle.render())?;
    Ok(())
}

// -- Tests --------------------------------------------------------------------
