//! Logging and OpenTelemetry initialisation for the VESC node.
//!
//! Call [`init_tracing`] once at process startup.
//!
//! # Environment variables
//!
//! | Variable | Effect |
//! |---|---|
//! | `RUST_LOG` | Log filter (default `"info"`). |
//! | `VESC_LOG_FORMAT=json` | Emit newline-delimited JSON logs instead of compact text. |
//! | `OTEL_EXPORTER_OTLP_ENDPOINT` | OTLP collector base URL (e.g. `http://localhost:4318`). Enables span export. |
//!
//! # Example
//!
//! ```rust,no_run
//! use vesc_runtime::telemetry::{TelemetryConfig, init_tracing};
//!
//! // Hold the guard for the entire lifetime of the process.
//! let _guard = init_tracing(&TelemetryConfig::from_env("vesc"));
//! ```

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{Resource, trace::SdkTracerProvider};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_FILTER: &str = "info";

/// Console log line format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

impl LogFormat {
    /// `"json"` (any case) selects JSON; anything else, or nothing, is compact.
    pub fn from_env_value(value: Option<&str>) -> Self {
        match value {
            Some(v) if v.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Compact,
        }
    }
}

/// Everything [`init_tracing`] needs, resolved up front so it can be tested
/// without touching global state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    pub service_name: String,
    /// `EnvFilter` directive string, e.g. `"info,vesc_kernel=debug"`.
    pub filter: String,
    pub format: LogFormat,
    pub otlp_endpoint: Option<String>,
}

impl TelemetryConfig {
    /// Read `RUST_LOG`, `VESC_LOG_FORMAT` and `OTEL_EXPORTER_OTLP_ENDPOINT`.
    pub fn from_env(service_name: &str) -> Self {
        Self {
            service_name: service_name.to_string(),
            filter: std::env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_FILTER.to_string()),
            format: LogFormat::from_env_value(std::env::var("VESC_LOG_FORMAT").ok().as_deref()),
            otlp_endpoint: std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
                .ok()
                .filter(|v| !v.is_empty()),
        }
    }
}

/// Install the global `tracing` subscriber.
///
/// The returned [`TelemetryGuard`] must be held for the lifetime of the
/// process; dropping it flushes and shuts down the span exporter, if any.
/// Calling this twice leaves the first subscriber in place.
pub fn init_tracing(cfg: &TelemetryConfig) -> TelemetryGuard {
    let env_filter = EnvFilter::try_new(&cfg.filter).unwrap_or_else(|e| {
        eprintln!("[vesc] invalid log filter {:?} ({e}), using {DEFAULT_FILTER}", cfg.filter);
        EnvFilter::new(DEFAULT_FILTER)
    });

    let provider = cfg
        .otlp_endpoint
        .as_deref()
        .and_then(|endpoint| build_provider(&cfg.service_name, endpoint));
    let otel_layer = provider
        .as_ref()
        .map(|p| tracing_opentelemetry::layer().with_tracer(p.tracer("vesc")));

    let (json_layer, compact_layer) = match cfg.format {
        LogFormat::Json => (Some(fmt::layer().with_target(true).json()), None),
        LogFormat::Compact => (None, Some(fmt::layer().with_target(true).compact())),
    };

    if let Err(e) = tracing_subscriber::registry()
        .with(env_filter)
        .with(otel_layer)
        .with(json_layer)
        .with(compact_layer)
        .try_init()
    {
        eprintln!("[vesc] tracing subscriber already installed: {e}");
    }

    TelemetryGuard(provider)
}

/// Shuts down the OTLP [`SdkTracerProvider`] on drop.
pub struct TelemetryGuard(Option<SdkTracerProvider>);

impl TelemetryGuard {
    /// `true` when spans are being exported over OTLP.
    pub fn exporting(&self) -> bool {
        self.0.is_some()
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.0.take()
            && let Err(e) = provider.shutdown()
        {
            eprintln!("[vesc] OpenTelemetry provider shutdown error: {e}");
        }
    }
}

/// Returns `None` when the exporter cannot be built; the caller then logs to
/// the console only.
fn build_provider(service_name: &str, endpoint: &str) -> Option<SdkTracerProvider> {
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| eprintln!("[vesc] OTLP exporter init failed: {e}"))
        .ok()?;

    let resource = Resource::builder()
        .with_service_name(service_name.to_string())
        .build();

    Some(
        SdkTracerProvider::builder()
            .with_resource(resource)
            // Simple (synchronous) exporter: the CLI builds its Tokio runtime
            // after calling `init_tracing`, so a batch exporter has nowhere to
            // spawn its worker.
            .with_simple_exporter(exporter)
            .build(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_format_parsing() {
        assert_eq!(LogFormat::from_env_value(Some("json")), LogFormat::Json);
        assert_eq!(LogFormat::from_env_value(Some("JSON")), LogFormat::Json);
        assert_eq!(LogFormat::from_env_value(Some("pretty")), LogFormat::Compact);
        assert_eq!(LogFormat::from_env_value(None), LogFormat::Compact);
    }

    #[test]
    fn init_without_endpoint_does_not_export() {
        let cfg = TelemetryConfig {
            service_name: "vesc-test".to_string(),
            filter: "not a valid [filter".to_string(),
            format: LogFormat::Compact,
            otlp_endpoint: None,
        };
        let guard = init_tracing(&cfg);
        assert!(!guard.exporting());
        // A second install must not panic.
        let again = init_tracing(&cfg);
        assert!(!again.exporting());
    }

    #[test]
    fn guard_drop_with_none_is_safe() {
        drop(TelemetryGuard(None));
    }
}
