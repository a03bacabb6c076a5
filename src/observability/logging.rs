//! Structured logging configuration.
//!
//! Sets up the `tracing` subscriber with:
//! - Plain or JSON output
//! - `RUST_LOG` overrides on top of the configured level
//! - Spans for sync cycles and apply phases

use tracing_subscriber::{
    filter::EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt, Registry,
};

/// Initialize tracing.
///
/// `RUST_LOG` wins over `level` when set.
///
/// # Panics
///
/// Panics if a global subscriber has already been installed in this process.
pub fn init_tracing(level: &str, json: bool) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json {
        let json_layer = fmt::layer()
            .json()
            .with_target(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true);

        Registry::default().with(env_filter).with(json_layer).init();
    } else {
        let fmt_layer = fmt::layer().with_target(true).with_thread_names(true);

        Registry::default().with(env_filter).with(fmt_layer).init();
    }

    tracing::debug!("Tracing initialized: level={}, json={}", level, json);
}

/// Span constructors shared by the sync pipeline.
pub mod spans {
    use std::path::Path;

    use tracing::{info_span, Span};

    /// Span covering one snapshot + diff + apply cycle for a root.
    #[must_use]
    pub fn cycle_span(root: &Path) -> Span {
        info_span!("sync_cycle", root = %root.display())
    }

    /// Span covering one apply phase (created, modified, moved, deleted).
    #[must_use]
    pub fn phase_span(phase: &str, count: usize) -> Span {
        info_span!("apply_phase", phase = %phase, count)
    }
}
