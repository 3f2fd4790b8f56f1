//! Prometheus metrics recording and background collection.

use metrics::{counter, gauge, histogram};
use publications_core::storage::PublicationStore;
use std::path::Path;
use std::time::Duration;

/// Records HTTP request metrics.
///
/// `path` should be the matched route template so ids do not explode label cardinality.
pub fn record_request(method: &str, path: &str, status: u16, duration: Duration) {
    let labels = [
        ("method", method.to_string()),
        ("path", path.to_string()),
        ("status", status.to_string()),
    ];
    counter!("http_requests_total", &labels).increment(1);
    histogram!("http_request_duration_seconds", &labels).record(duration.as_secs_f64());
}

/// Records a write operation metric.
pub fn record_write_operation(operation: &str) {
    counter!(
        "publications_operations_total",
        "operation" => operation.to_string()
    )
    .increment(1);
}

/// Records a listing search; `search_type` is `"plain"` or `"geo"`.
pub fn record_search_operation(search_type: &str) {
    counter!(
        "publications_search_total",
        "type" => search_type.to_string()
    )
    .increment(1);
}

/// Updates store-level Prometheus gauges.
pub fn update_store_metrics(store: &PublicationStore) {
    gauge!("publications_total").set(store.len() as f64);
    gauge!("publications_blocked_total").set(store.blocked_count() as f64);
}

/// Updates the `publications_wal_size_bytes` gauge.
pub fn update_wal_metrics(wal_path: &Path) {
    if let Ok(meta) = std::fs::metadata(wal_path) {
        gauge!("publications_wal_size_bytes").set(meta.len() as f64);
    }
}
