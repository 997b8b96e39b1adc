//! Tracing and metrics bootstrap.

use std::sync::Once;

use metrics::{Unit, describe_counter};
use tracing_error::ErrorLayer;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install the global tracing subscriber and register metric
/// descriptions. Called once at startup, before anything logs.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    let filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let base = tracing_subscriber::registry()
        .with(filter)
        .with(ErrorLayer::default());

    let installed = match logging.format {
        LogFormat::Json => base
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_target(true),
            )
            .try_init(),
        LogFormat::Compact => base
            .with(fmt::layer().compact().with_target(true))
            .try_init(),
    };
    installed
        .map_err(|err| InfraError::telemetry(format!("tracing subscriber install: {err}")))?;

    describe_metrics();
    Ok(())
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "quaderno_cache_hit_total",
            Unit::Count,
            "Anonymous requests answered from the response cache."
        );
        describe_counter!(
            "quaderno_cache_miss_total",
            Unit::Count,
            "Anonymous requests that had to compute their response."
        );
        describe_counter!(
            "quaderno_cache_bypass_total",
            Unit::Count,
            "Requests that skipped the cache because the visitor was signed in."
        );
        describe_counter!(
            "quaderno_cache_evict_total",
            Unit::Count,
            "Cache entries evicted for capacity."
        );
        describe_counter!(
            "quaderno_cache_purge_total",
            Unit::Count,
            "Cache keys deleted by invalidation, labeled by scope."
        );
        describe_counter!(
            "quaderno_http_error_total",
            Unit::Count,
            "Error responses served, labeled by status class."
        );
    });
}
