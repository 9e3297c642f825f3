// src/observability.rs
//! Logging and metrics setup
//!
//! Logs go through `tracing`; the filter defaults to `harcap=info` and can be
//! overridden with `RUST_LOG`. Counters are emitted through the `metrics`
//! facade and are no-ops unless the embedding process installs a recorder.

use crate::utils::config::LogFormat;
use crate::utils::errors::{CaptureError, Result};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Events appended to a capture log, labelled by `kind`
pub const EVENTS_RECORDED: &str = "harcap_events_recorded_total";

/// HAR entries produced by the exporter
pub const HAR_ENTRIES: &str = "harcap_har_entries_total";

/// Request groups the exporter could not turn into entries, labelled by `reason`
pub const HAR_ENTRIES_DROPPED: &str = "harcap_har_entries_dropped_total";

const DEFAULT_FILTER: &str = "harcap=info";

/// Install the global tracing subscriber
pub fn init_tracing(format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let registry = tracing_subscriber::registry().with(filter);

    let result = match format {
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .try_init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
    };

    result.map_err(|e| CaptureError::ConfigError(format!("Failed to install tracing: {}", e)))
}
