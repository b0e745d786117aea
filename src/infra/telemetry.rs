use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
///
/// Logs go to stderr; stdout carries command output.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "soffio_kv_get_total",
            Unit::Count,
            "Store lookups, labelled by namespace and hit or miss."
        );
        describe_counter!(
            "soffio_kv_write_total",
            Unit::Count,
            "Store writes, labelled by namespace and immediate or deferred mode."
        );
        describe_counter!(
            "soffio_kv_flush_total",
            Unit::Count,
            "Non-empty batch flushes performed by save."
        );
        describe_counter!(
            "soffio_kv_invalidate_total",
            Unit::Count,
            "Prefix deletions and namespace clears."
        );
        describe_histogram!(
            "soffio_kv_object_upload_bytes",
            Unit::Bytes,
            "Size of each namespace object uploaded to object storage."
        );
    });
}
