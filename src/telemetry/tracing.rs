//! Subscriber setup for the `lcrd` binary.
//!
//! Output goes to stderr; stdout carries the ranked routes. Each ranking call
//! is one `rank` span, closed with its duration. Per-route decisions (routes
//! filtered out, dropped or capped) are logged at `debug` under
//! `lcrd::routes` and can be enabled without raising the global level.

use anyhow::{Context, Result};
use opentelemetry::trace::TracerProvider;
use opentelemetry::KeyValue;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    runtime,
    trace::{RandomIdGenerator, Sampler, Tracer},
    Resource,
};
use tracing::info;
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Target of the ranking engine's per-route events.
pub const ROUTE_DECISIONS_TARGET: &str = "lcrd::routes";

/// Subscriber settings
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Reported as `service.name`
    pub service_name: String,

    /// Global level or filter directives
    pub log_level: String,

    /// Log every route decision at `debug`, whatever the global level
    pub route_decisions: bool,

    /// JSON log format
    pub json_logs: bool,

    /// OTLP collector; spans are exported when set
    pub otlp_endpoint: Option<String>,

    /// Share of `rank` traces exported (0.0 - 1.0)
    pub sample_rate: f64,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            service_name: "lcrd".to_string(),
            log_level: "info".to_string(),
            route_decisions: false,
            json_logs: false,
            otlp_endpoint: None,
            sample_rate: 1.0,
        }
    }
}

impl TracingConfig {
    /// Filter directives: the log level, plus the route decision target
    /// when enabled.
    pub fn directives(&self) -> String {
        if self.route_decisions {
            format!("{},{}=debug", self.log_level, ROUTE_DECISIONS_TARGET)
        } else {
            self.log_level.clone()
        }
    }
}

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence over the configured directives.
pub fn init_tracing(config: &TracingConfig) -> Result<()> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(config.directives())
            .with_context(|| format!("invalid log level '{}'", config.log_level))?,
    };

    let fmt_layer = if config.json_logs {
        fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_span_events(FmtSpan::CLOSE)
            .with_current_span(true)
            .boxed()
    } else {
        fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .with_span_events(FmtSpan::CLOSE)
            .boxed()
    };

    let otel_layer = match &config.otlp_endpoint {
        Some(endpoint) => Some(OpenTelemetryLayer::new(init_otlp_tracer(config, endpoint)?)),
        None => None,
    };

    tracing_subscriber::registry()
        .with(otel_layer)
        .with(fmt_layer)
        .with(env_filter)
        .try_init()?;

    info!(
        directives = %config.directives(),
        json_logs = config.json_logs,
        otlp = config.otlp_endpoint.is_some(),
        "tracing initialized"
    );

    Ok(())
}

fn sampler(rate: f64) -> Sampler {
    if rate >= 1.0 {
        Sampler::AlwaysOn
    } else if rate <= 0.0 {
        Sampler::AlwaysOff
    } else {
        Sampler::TraceIdRatioBased(rate)
    }
}

fn init_otlp_tracer(config: &TracingConfig, endpoint: &str) -> Result<Tracer> {
    let resource = Resource::new([
        KeyValue::new("service.name", config.service_name.clone()),
        KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
    ]);

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .with_context(|| format!("failed to build OTLP exporter for {}", endpoint))?;

    let provider = opentelemetry_sdk::trace::TracerProvider::builder()
        .with_batch_exporter(exporter, runtime::Tokio)
        .with_sampler(Sampler::ParentBased(Box::new(sampler(config.sample_rate))))
        .with_id_generator(RandomIdGenerator::default())
        .with_resource(resource)
        .build();

    let tracer = provider.tracer("lcrd");
    opentelemetry::global::set_tracer_provider(provider);

    Ok(tracer)
}

/// Flush pending spans and stop the exporter.
pub fn shutdown_tracing() {
    opentelemetry::global::shutdown_tracer_provider();
}
