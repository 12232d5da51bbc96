//! Logging, tracing and metrics.

mod metrics;
mod tracing;

pub use self::metrics::{counters, Metrics};
pub use self::tracing::{init_tracing, shutdown_tracing, TracingConfig, ROUTE_DECISIONS_TARGET};
