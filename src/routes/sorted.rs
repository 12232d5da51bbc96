//! Ranking output.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Keys written into [`SortedRoute::sorting_data`].
pub mod keys {
    pub const WEIGHT: &str = "Weight";
    pub const COST: &str = "Cost";
    pub const RATING_PLAN_ID: &str = "RatingPlanID";
    pub const RESOURCE_USAGE: &str = "ResourceUsage";
    pub const LOAD: &str = "Load";
    pub const RATIO: &str = "Ratio";
}

/// A value in the sorting data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SortingValue {
    Number(f64),
    Text(String),
}

impl SortingValue {
    /// Numeric value, if any.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(_) => None,
        }
    }
}

impl fmt::Display for SortingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{}", n),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for SortingValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<String> for SortingValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// A ranked route with the data that explains its position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortedRoute {
    pub route_id: String,
    pub route_parameters: String,
    pub sorting_data: BTreeMap<String, SortingValue>,
}

impl SortedRoute {
    /// Create a sorted route carrying only its weight.
    pub fn new(route_id: impl Into<String>, route_parameters: impl Into<String>, weight: f64) -> Self {
        let mut sorting_data = BTreeMap::new();
        sorting_data.insert(keys::WEIGHT.to_string(), SortingValue::Number(weight));
        Self {
            route_id: route_id.into(),
            route_parameters: route_parameters.into(),
            sorting_data,
        }
    }

    /// Set a sorting data entry.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<SortingValue>) {
        self.sorting_data.insert(key.into(), value.into());
    }

    /// Numeric sorting data entry.
    pub fn number(&self, key: &str) -> Option<f64> {
        self.sorting_data.get(key).and_then(SortingValue::as_f64)
    }

    /// The route weight.
    pub fn weight(&self) -> f64 {
        self.number(keys::WEIGHT).unwrap_or(0.0)
    }

    /// `<id>:<params>`, or the bare ID without parameters.
    pub fn id_with_params(&self) -> String {
        if self.route_parameters.is_empty() {
            self.route_id.clone()
        } else {
            format!("{}:{}", self.route_id, self.route_parameters)
        }
    }
}

/// Ranked routes of one profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortedRoutes {
    pub profile_id: String,
    pub sorting: String,
    pub routes: Vec<SortedRoute>,
}

impl SortedRoutes {
    /// `r1:p1,r2:p2` in ranked order.
    pub fn digest(&self) -> String {
        self.routes
            .iter()
            .map(SortedRoute::id_with_params)
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Ranked routes of every contributing profile, highest profile first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SortedRoutesList(pub Vec<SortedRoutes>);

impl SortedRoutesList {
    /// Number of profiles.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no profile contributed.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Total number of routes across profiles.
    pub fn route_count(&self) -> usize {
        self.0.iter().map(|p| p.routes.len()).sum()
    }

    /// Profiles in order.
    pub fn iter(&self) -> std::slice::Iter<'_, SortedRoutes> {
        self.0.iter()
    }

    /// Route IDs in ranked order.
    pub fn route_ids(&self) -> Vec<String> {
        self.0
            .iter()
            .flat_map(|p| p.routes.iter().map(|r| r.route_id.clone()))
            .collect()
    }

    /// Route IDs with parameters in ranked order.
    pub fn routes_with_params(&self) -> Vec<String> {
        self.0
            .iter()
            .flat_map(|p| p.routes.iter().map(SortedRoute::id_with_params))
            .collect()
    }
}

impl<'a> IntoIterator for &'a SortedRoutesList {
    type Item = &'a SortedRoutes;
    type IntoIter = std::slice::Iter<'a, SortedRoutes>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
