//! Logging and metrics.

mod logging;
mod metrics;

pub use logging::{init_tracing, spans};
pub use metrics::{
    gather_metrics, init_metrics, APPLY_DURATION, APPLY_FAILURES, CHANGES_TOTAL, FILES_INDEXED,
    SNAPSHOTS_SAVED, WATCHED_ROOTS,
};
