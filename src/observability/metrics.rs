//! Prometheus metrics definitions.

use once_cell::sync::Lazy;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Encoder, Histogram, IntCounter, IntCounterVec, IntGauge, TextEncoder,
};

/// Files currently in the index.
pub static FILES_INDEXED: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("docsync_files_indexed", "Number of file records in the index").unwrap()
});

/// Applied changes by kind (created, modified, moved, deleted).
pub static CHANGES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "docsync_changes_total",
        "Filesystem changes applied to the stores",
        &["kind"]
    )
    .unwrap()
});

/// Per-path apply failures by phase.
pub static APPLY_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "docsync_apply_failures_total",
        "Paths that failed to apply",
        &["phase"]
    )
    .unwrap()
});

/// Wall time of one apply cycle.
pub static APPLY_DURATION: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "docsync_apply_duration_seconds",
        "Time spent applying one diff",
        vec![0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0, 120.0]
    )
    .unwrap()
});

/// Snapshot files written.
pub static SNAPSHOTS_SAVED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("docsync_snapshots_saved_total", "Snapshot files persisted").unwrap()
});

/// Roots currently watched.
pub static WATCHED_ROOTS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("docsync_watched_roots", "Number of watched roots").unwrap()
});

/// Initialize all metrics (call once at startup).
pub fn init_metrics() {
    let _ = &*FILES_INDEXED;
    let _ = &*CHANGES_TOTAL;
    let _ = &*APPLY_FAILURES;
    let _ = &*APPLY_DURATION;
    let _ = &*SNAPSHOTS_SAVED;
    let _ = &*WATCHED_ROOTS;

    tracing::debug!("Prometheus metrics initialized");
}

/// Render every registered metric in the text exposition format.
#[must_use]
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
