//! Route profiles and their routes.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::RankError;

/// Ratio key applying to routes not named explicitly.
pub const DEFAULT_RATIO_KEY: &str = "*default";

/// One candidate carrier/vendor path.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Route {
    /// Route ID
    pub id: String,
    /// Filters the event must pass for this route to be considered
    #[serde(default)]
    pub filter_ids: Vec<String>,
    /// Static weight (higher is preferred)
    #[serde(default)]
    pub weight: f64,
    /// Rating plans used by the cost strategies
    #[serde(default)]
    pub rating_plan_ids: Vec<String>,
    /// Resources queried by the resource strategies
    #[serde(default)]
    pub resource_ids: Vec<String>,
    /// Stat queues queried by `*qos` and `*load`, optionally `ID:<metric>`
    #[serde(default)]
    pub stat_ids: Vec<String>,
    /// Opaque parameters passed through to the caller
    #[serde(default)]
    pub route_parameters: String,
}

impl Route {
    /// Create a route with an ID and weight.
    pub fn new(id: impl Into<String>, weight: f64) -> Self {
        Self {
            id: id.into(),
            weight,
            ..Default::default()
        }
    }

    /// Set filter IDs.
    pub fn with_filters(mut self, filter_ids: &[&str]) -> Self {
        self.filter_ids = filter_ids.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Set rating plan IDs.
    pub fn with_rating_plans(mut self, ids: &[&str]) -> Self {
        self.rating_plan_ids = ids.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Set resource IDs.
    pub fn with_resources(mut self, ids: &[&str]) -> Self {
        self.resource_ids = ids.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Set stat IDs.
    pub fn with_stats(mut self, ids: &[&str]) -> Self {
        self.stat_ids = ids.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Set route parameters.
    pub fn with_parameters(mut self, params: impl Into<String>) -> Self {
        self.route_parameters = params.into();
        self
    }
}

/// Time window in which a profile is active.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivationInterval {
    /// Start of activity (inclusive)
    #[serde(default)]
    pub activation_time: Option<DateTime<Utc>>,
    /// End of activity (exclusive)
    #[serde(default)]
    pub expiry_time: Option<DateTime<Utc>>,
}

impl ActivationInterval {
    /// Whether the interval contains `time`.
    pub fn is_active_at(&self, time: DateTime<Utc>) -> bool {
        if let Some(start) = self.activation_time {
            if time < start {
                return false;
            }
        }
        if let Some(end) = self.expiry_time {
            if time >= end {
                return false;
            }
        }
        true
    }
}

/// A named, filtered group of routes sharing one sorting strategy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteProfile {
    /// Tenant
    #[serde(default)]
    pub tenant: String,
    /// Profile ID
    pub id: String,
    /// Profile-level filters
    #[serde(default)]
    pub filter_ids: Vec<String>,
    /// Activity window (always active when absent)
    #[serde(default)]
    pub activation_interval: Option<ActivationInterval>,
    /// Sorting strategy name (`*weight`, `*lc`, `*hc`, `*qos`, `*reas`, `*reds`, `*load`)
    pub sorting: String,
    /// Strategy-specific parameters
    #[serde(default)]
    pub sorting_parameters: Vec<String>,
    /// Profile weight (higher profiles are ranked first)
    #[serde(default)]
    pub weight: f64,
    /// Candidate routes in declaration order
    #[serde(default)]
    pub routes: Vec<Route>,
}

impl RouteProfile {
    /// Create an empty profile.
    pub fn new(tenant: impl Into<String>, id: impl Into<String>, sorting: impl Into<String>) -> Self {
        Self {
            tenant: tenant.into(),
            id: id.into(),
            sorting: sorting.into(),
            ..Default::default()
        }
    }

    /// Set sorting parameters.
    pub fn with_sorting_parameters(mut self, params: &[&str]) -> Self {
        self.sorting_parameters = params.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Set profile weight.
    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    /// Append a route.
    pub fn with_route(mut self, route: Route) -> Self {
        self.routes.push(route);
        self
    }

    /// `tenant:id`
    pub fn tenant_id(&self) -> String {
        format!("{}:{}", self.tenant, self.id)
    }

    /// Whether the profile is active at `time` (no time means active).
    pub fn is_active_at(&self, time: Option<DateTime<Utc>>) -> bool {
        match (&self.activation_interval, time) {
            (Some(interval), Some(time)) => interval.is_active_at(time),
            _ => true,
        }
    }

    /// Check that the strategy is known and its parameters parse.
    pub fn validate(&self) -> Result<(), RankError> {
        let strategy = self.sorting.parse::<SortingStrategy>()?;
        if strategy == SortingStrategy::LoadDistribution {
            LoadRatios::parse(self, 1.0)?;
        }
        Ok(())
    }
}

/// Sorting strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortingStrategy {
    /// Weight descending
    Weight,
    /// Least cost first
    LeastCost,
    /// Highest cost first
    HighestCost,
    /// Best quality metrics first
    Qos,
    /// Least resource usage first
    ResourceAscending,
    /// Most resource usage first
    ResourceDescending,
    /// Furthest below target share first
    LoadDistribution,
}

impl SortingStrategy {
    /// All strategies.
    pub const ALL: [SortingStrategy; 7] = [
        Self::Weight,
        Self::LeastCost,
        Self::HighestCost,
        Self::Qos,
        Self::ResourceAscending,
        Self::ResourceDescending,
        Self::LoadDistribution,
    ];

    /// Canonical name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Weight => "*weight",
            Self::LeastCost => "*lc",
            Self::HighestCost => "*hc",
            Self::Qos => "*qos",
            Self::ResourceAscending => "*reas",
            Self::ResourceDescending => "*reds",
            Self::LoadDistribution => "*load",
        }
    }
}

impl fmt::Display for SortingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortingStrategy {
    type Err = RankError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        let bare = name.strip_prefix('*').unwrap_or(name);
        Self::ALL
            .into_iter()
            .find(|strategy| &strategy.as_str()[1..] == bare)
            .ok_or_else(|| RankError::UnsupportedSortingStrategy(s.to_string()))
    }
}

/// Target ratios of a `*load` profile.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadRatios {
    by_route: HashMap<String, f64>,
    default_ratio: f64,
}

impl LoadRatios {
    /// Parse `"<routeID>:<ratio>"` entries; `*default` overrides `fallback`.
    pub fn parse(profile: &RouteProfile, fallback: f64) -> Result<Self, RankError> {
        let mut by_route = HashMap::new();

        for param in &profile.sorting_parameters {
            let invalid = |reason: &str| RankError::InvalidSortingParameter {
                profile: profile.id.clone(),
                parameter: param.clone(),
                reason: reason.to_string(),
            };

            let (route_id, ratio) = param
                .rsplit_once(':')
                .ok_or_else(|| invalid("expected <routeID>:<ratio>"))?;
            let ratio: f64 = ratio
                .trim()
                .parse()
                .map_err(|_| invalid("ratio is not a number"))?;
            if !ratio.is_finite() || ratio <= 0.0 {
                return Err(invalid("ratio must be positive"));
            }
            by_route.insert(route_id.trim().to_string(), ratio);
        }

        let default_ratio = by_route.remove(DEFAULT_RATIO_KEY).unwrap_or(fallback);
        Ok(Self {
            by_route,
            default_ratio,
        })
    }

    /// Ratio for a route: named entry, else the default.
    pub fn ratio_for(&self, route_id: &str) -> f64 {
        self.by_route
            .get(route_id)
            .copied()
            .unwrap_or(self.default_ratio)
    }
}
