use anyhow::{Context, Result};
use opentelemetry::metrics::MeterProvider;
use opentelemetry_prometheus::exporter;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use prometheus::{Encoder, Registry, TextEncoder};
use std::sync::Arc;
use tracing::info;

/// OTEL Metrics with Prometheus exporter
pub struct Metrics {
    registry: Registry,
    meter_provider: SdkMeterProvider,
}

impl Metrics {
    /// Create metrics with OTEL → Prometheus pipeline and bind the ranking
    /// instruments to it.
    pub fn new() -> Result<Arc<Self>> {
        let registry = Registry::new();

        let exporter = exporter()
            .with_registry(registry.clone())
            .build()?;

        let meter_provider = SdkMeterProvider::builder()
            .with_reader(exporter)
            .build();

        // Register as global meter provider
        opentelemetry::global::set_meter_provider(meter_provider.clone());

        let metrics = Arc::new(Self {
            registry,
            meter_provider,
        });
        counters::init(&metrics.meter("lcrd"));

        info!("OTEL metrics configured with Prometheus exporter");

        Ok(metrics)
    }

    /// Get meter provider
    pub fn meter_provider(&self) -> &SdkMeterProvider {
        &self.meter_provider
    }

    /// Get a meter for recording metrics
    pub fn meter(&self, name: &'static str) -> opentelemetry::metrics::Meter {
        self.meter_provider.meter(name)
    }

    /// Render metrics in Prometheus format
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();

        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .context("failed to encode metrics")?;

        String::from_utf8(buffer).context("metrics are not valid UTF-8")
    }
}

impl Drop for Metrics {
    fn drop(&mut self) {
        if let Err(e) = self.meter_provider.shutdown() {
            tracing::warn!(error = %e, "failed to shutdown meter provider");
        }
    }
}

/// Ranking metrics with lcr_* prefix
///
/// Instruments are unset until [`init`](counters::init) runs; recording
/// before that is a no-op.
pub mod counters {
    use opentelemetry::metrics::{Counter, Histogram};
    use opentelemetry::KeyValue;
    use std::sync::OnceLock;

    static RANK_CALLS_TOTAL: OnceLock<Counter<u64>> = OnceLock::new();
    static RANK_DURATION: OnceLock<Histogram<f64>> = OnceLock::new();
    static ROUTES_DROPPED_TOTAL: OnceLock<Counter<u64>> = OnceLock::new();
    static PROFILES_RANKED_TOTAL: OnceLock<Counter<u64>> = OnceLock::new();

    pub fn init(meter: &opentelemetry::metrics::Meter) {
        let _ = RANK_CALLS_TOTAL.set(
            meter.u64_counter("lcr_rank_calls_total")
                .with_description("Ranking calls by outcome")
                .build(),
        );
        let _ = RANK_DURATION.set(
            meter.f64_histogram("lcr_rank_duration_seconds")
                .with_description("Ranking call duration")
                .build(),
        );
        let _ = ROUTES_DROPPED_TOTAL.set(
            meter.u64_counter("lcr_routes_dropped_total")
                .with_description("Routes dropped while sorting, by strategy and reason")
                .build(),
        );
        let _ = PROFILES_RANKED_TOTAL.set(
            meter.u64_counter("lcr_profiles_ranked_total")
                .with_description("Profiles that contributed routes, by strategy")
                .build(),
        );
    }

    pub fn rank_completed(outcome: &str, duration_secs: f64) {
        if let Some(c) = RANK_CALLS_TOTAL.get() {
            c.add(1, &[kv("outcome", outcome)]);
        }
        if let Some(h) = RANK_DURATION.get() {
            h.record(duration_secs, &[kv("outcome", outcome)]);
        }
    }

    pub fn route_dropped(sorting: &str, reason: &str) {
        if let Some(c) = ROUTES_DROPPED_TOTAL.get() {
            c.add(1, &[kv("sorting", sorting), kv("reason", reason)]);
        }
    }

    pub fn profile_ranked(sorting: &str) {
        if let Some(c) = PROFILES_RANKED_TOTAL.get() {
            c.add(1, &[kv("sorting", sorting)]);
        }
    }

    fn kv(key: &'static str, value: &str) -> KeyValue {
        KeyValue::new(key, value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_exposes_ranking_counters() {
        let metrics = Metrics::new().unwrap();
        counters::rank_completed("ok", 0.002);
        counters::route_dropped("*lc", "provider_error");
        counters::profile_ranked("*lc");

        let text = metrics.render().unwrap();
        assert!(text.contains("lcr_rank_calls_total"));
        assert!(text.contains("lcr_routes_dropped_total"));
        assert!(text.contains("lcr_profiles_ranked_total"));
    }
}
