//! Metrics facade for the persistence core
//!
//! Emits through the `metrics` crate; the embedding process decides which
//! exporter (if any) to install.

use metrics::{describe_counter, describe_histogram};

/// Register metric descriptions. Call once at startup, after the exporter.
pub fn init_metrics() {
    describe_counter!("index.rebuild.success", "Sorted-index rebuilds that completed");
    describe_counter!("index.rebuild.failed", "Sorted-index rebuilds that failed");
    describe_histogram!(
        "index.rebuild.duration_ms",
        "Sorted-index rebuild duration in milliseconds"
    );
    describe_counter!("settings.cache.invalidations", "Cache tokens rotated");
}
