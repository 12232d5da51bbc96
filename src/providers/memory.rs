//! In-memory provider tables.
//!
//! Loaded from configuration or populated directly in tests. Lookups are
//! plain table reads; nothing here rates, aggregates or tracks anything.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::routes::CallContext;

use super::{CostProvider, CostQuote, CostRequest, ProviderError, ResourceProvider, StatsProvider};

/// Price for destinations starting with `prefix`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingRate {
    /// Destination prefix (empty matches everything)
    #[serde(default)]
    pub prefix: String,
    /// Price per minute of usage
    pub cost_per_minute: f64,
    /// Flat price charged once per event
    #[serde(default)]
    pub connect_fee: f64,
}

impl RatingRate {
    fn quote(&self, usage: Duration) -> f64 {
        self.connect_fee + self.cost_per_minute * usage.as_secs_f64() / 60.0
    }
}

/// A rating plan: a list of destination rates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingPlan {
    /// Rating plan ID
    pub id: String,
    /// Rates by destination prefix
    #[serde(default)]
    pub rates: Vec<RatingRate>,
}

impl RatingPlan {
    /// Longest-prefix rate for a destination.
    pub fn rate_for(&self, destination: &str) -> Option<&RatingRate> {
        self.rates
            .iter()
            .filter(|r| destination.starts_with(&r.prefix))
            .max_by_key(|r| r.prefix.len())
    }
}

/// Cost quotes from a static rating plan table.
#[derive(Debug, Default)]
pub struct StaticCostTable {
    plans: RwLock<HashMap<String, RatingPlan>>,
}

impl StaticCostTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a table from a list of plans.
    pub fn from_plans(plans: impl IntoIterator<Item = RatingPlan>) -> Self {
        let table = Self::new();
        for plan in plans {
            table.set_plan(plan);
        }
        info!(
            plans = table.len(),
            "loaded rating plan table"
        );
        table
    }

    /// Insert or replace a rating plan.
    pub fn set_plan(&self, plan: RatingPlan) {
        let id = plan.id.clone();
        self.plans
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(plan.id.clone(), plan);
        debug!(rating_plan = %id, "updated rating plan");
    }

    /// Number of plans.
    pub fn len(&self) -> usize {
        self.plans.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn quote(
        &self,
        rating_plan_ids: &[String],
        destination: &str,
        usage: Duration,
    ) -> Result<CostQuote, ProviderError> {
        let plans = self.plans.read().unwrap_or_else(|e| e.into_inner());

        for id in rating_plan_ids {
            let Some(plan) = plans.get(id) else {
                continue;
            };
            if let Some(rate) = plan.rate_for(destination) {
                return Ok(CostQuote {
                    cost: rate.quote(usage),
                    rating_plan_id: plan.id.clone(),
                });
            }
        }

        Err(ProviderError::NotFound(format!(
            "no rating plan in [{}] covers destination {}",
            rating_plan_ids.join(","),
            destination
        )))
    }
}

#[async_trait]
impl CostProvider for StaticCostTable {
    async fn cost(
        &self,
        _ctx: &CallContext,
        req: &CostRequest<'_>,
    ) -> Result<CostQuote, ProviderError> {
        self.quote(req.rating_plan_ids, req.destination, req.usage)
    }
}

/// Fixed metric values per stat queue.
#[derive(Debug, Default)]
pub struct StaticStats {
    queues: RwLock<HashMap<String, BTreeMap<String, f64>>>,
}

impl StaticStats {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create from a map of stat ID to metrics.
    pub fn from_map(queues: HashMap<String, BTreeMap<String, f64>>) -> Self {
        Self {
            queues: RwLock::new(queues),
        }
    }

    /// Replace the metrics of a stat queue.
    pub fn set_metrics(&self, stat_id: &str, metrics: BTreeMap<String, f64>) {
        self.queues
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(stat_id.to_string(), metrics);
    }
}

#[async_trait]
impl StatsProvider for StaticStats {
    async fn stat_metrics(
        &self,
        _ctx: &CallContext,
        stat_ids: &[String],
    ) -> Result<BTreeMap<String, f64>, ProviderError> {
        let queues = self.queues.read().unwrap_or_else(|e| e.into_inner());

        // Same metric from several queues is averaged
        let mut collected: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        for id in stat_ids {
            let metrics = queues
                .get(id)
                .ok_or_else(|| ProviderError::NotFound(format!("stat queue {}", id)))?;
            for (name, value) in metrics {
                collected.entry(name.clone()).or_default().push(*value);
            }
        }

        Ok(collected
            .into_iter()
            .map(|(name, values)| {
                let avg = values.iter().sum::<f64>() / values.len() as f64;
                (name, avg)
            })
            .collect())
    }
}

/// Fixed usage per resource.
#[derive(Debug, Default)]
pub struct StaticResources {
    usages: RwLock<HashMap<String, f64>>,
}

impl StaticResources {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create from a map of resource ID to usage.
    pub fn from_map(usages: HashMap<String, f64>) -> Self {
        Self {
            usages: RwLock::new(usages),
        }
    }

    /// Replace the usage of a resource.
    pub fn set_usage(&self, resource_id: &str, usage: f64) {
        self.usages
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(resource_id.to_string(), usage);
    }
}

#[async_trait]
impl ResourceProvider for StaticResources {
    async fn resource_usage(
        &self,
        _ctx: &CallContext,
        resource_ids: &[String],
    ) -> Result<f64, ProviderError> {
        let usages = self.usages.read().unwrap_or_else(|e| e.into_inner());

        resource_ids.iter().try_fold(0.0, |total, id| {
            usages
                .get(id)
                .map(|usage| total + usage)
                .ok_or_else(|| ProviderError::NotFound(format!("resource {}", id)))
        })
    }
}
