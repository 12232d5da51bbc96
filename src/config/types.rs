use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use crate::filters::FilterDefinition;
use crate::providers::RatingPlan;
use crate::routes::{RankOptions, RankerSettings, RouteProfile};
use crate::telemetry::TracingConfig;

/// Root configuration for lcrd
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Engine-wide settings
    #[serde(default)]
    pub settings: Settings,

    /// Logging and tracing
    #[serde(default)]
    pub telemetry: TelemetryConfig,

    /// Filters referenced by profiles and routes
    #[serde(default)]
    pub filters: Vec<FilterDefinition>,

    /// Rating plans for the cost strategies
    #[serde(default)]
    pub rating_plans: Vec<RatingPlan>,

    /// Metric values per stat queue
    #[serde(default)]
    pub stats: HashMap<String, BTreeMap<String, f64>>,

    /// Usage per resource
    #[serde(default)]
    pub resources: HashMap<String, f64>,

    /// Route profiles
    #[serde(default)]
    pub profiles: Vec<RouteProfile>,
}

/// Engine-wide settings
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Tenant for events that carry none
    #[serde(default = "default_tenant")]
    pub default_tenant: String,

    /// `*load` ratio for routes without an explicit or `*default` entry
    #[serde(default = "default_ratio")]
    pub default_ratio: f64,

    /// Usage rated when the event carries none
    #[serde(default = "default_usage", with = "humantime_serde")]
    pub default_usage: Duration,

    /// Rating plans pricing the event itself for `max_cost: "*event_cost"`
    #[serde(default)]
    pub event_rating_plans: Vec<String>,

    /// Default per-call options (max cost, profile count, limit, offset)
    #[serde(default)]
    pub rank: RankOptions,

    /// Deadline for one ranking call
    #[serde(default, with = "humantime_serde::option")]
    pub rank_timeout: Option<Duration>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_tenant: default_tenant(),
            default_ratio: default_ratio(),
            default_usage: default_usage(),
            event_rating_plans: Vec::new(),
            rank: RankOptions::default(),
            rank_timeout: None,
        }
    }
}

impl Settings {
    /// Settings consulted by the sorters.
    pub fn ranker_settings(&self) -> RankerSettings {
        RankerSettings {
            default_ratio: self.default_ratio,
            default_usage: self.default_usage,
            event_rating_plan_ids: self.event_rating_plans.clone(),
        }
    }
}

fn default_tenant() -> String {
    "cgrates.org".to_string()
}

fn default_ratio() -> f64 {
    1.0
}

fn default_usage() -> Duration {
    Duration::from_secs(60)
}

/// Logging and tracing configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log every route decision at debug level
    #[serde(default)]
    pub route_decisions: bool,

    /// Enable structured JSON logging
    #[serde(default)]
    pub json_logs: bool,

    /// OTLP endpoint for distributed tracing
    pub otlp_endpoint: Option<String>,

    /// Trace sample rate (0.0 - 1.0)
    #[serde(default = "default_sample_rate")]
    pub trace_sample_rate: f64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            route_decisions: false,
            json_logs: false,
            otlp_endpoint: None,
            trace_sample_rate: default_sample_rate(),
        }
    }
}

impl TelemetryConfig {
    /// Subscriber settings for [`init_tracing`](crate::telemetry::init_tracing).
    pub fn tracing_config(&self) -> TracingConfig {
        TracingConfig {
            log_level: self.log_level.clone(),
            route_decisions: self.route_decisions,
            json_logs: self.json_logs,
            otlp_endpoint: self.otlp_endpoint.clone(),
            sample_rate: self.trace_sample_rate,
            ..TracingConfig::default()
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_sample_rate() -> f64 {
    1.0
}

/// Humantime duration deserialization
mod humantime_serde {
    use serde::{self, Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }

    pub mod option {
        use serde::{self, Deserialize, Deserializer};
        use std::time::Duration;

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
        where
            D: Deserializer<'de>,
        {
            match Option::<String>::deserialize(deserializer)? {
                Some(s) => humantime::parse_duration(&s)
                    .map(Some)
                    .map_err(serde::de::Error::custom),
                None => Ok(None),
            }
        }
    }
}
