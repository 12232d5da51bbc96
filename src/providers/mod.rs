//! Collaborator interfaces consumed by the ranking engine.
//!
//! The engine never computes tariffs, aggregates statistics or evaluates a
//! filter language itself. It asks these providers and treats every call as a
//! blocking, read-only lookup raced against the caller's [`CallContext`].
//!
//! # Built-in Implementations
//!
//! - [`StaticCostTable`] - per rating plan, per destination prefix quotes
//! - [`StaticStats`] - fixed metric values per stat queue
//! - [`StaticResources`] - fixed usage per resource
//! - [`StaticFilters`](crate::filters::StaticFilters) - condition lists per filter ID
//!
//! [`CallContext`]: crate::routes::CallContext

mod memory;

pub use memory::{RatingPlan, RatingRate, StaticCostTable, StaticResources, StaticStats};

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::routes::{CallContext, FilterContext};

/// Provider error.
///
/// Cloneable so per-call snapshots can cache failed lookups.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProviderError {
    /// The requested item does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The backing subsystem could not answer.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// The request or the stored data is malformed.
    #[error("invalid: {0}")]
    Invalid(String),

    /// The caller context was cancelled while the lookup was in flight.
    #[error("cancelled")]
    Cancelled,
}

/// Result of a cost computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostQuote {
    /// Monetary cost of the usage
    pub cost: f64,
    /// Rating plan that produced the cost
    pub rating_plan_id: String,
}

/// Boolean matching of filter IDs against an event.
///
/// Implementations may dereference `~*stats.<ID>.<metric>` and
/// `~*resources.<ID>.TotalUsage` through the [`FilterContext`], which shares
/// its lookups with the sorters of the same call.
#[async_trait]
pub trait FilterEvaluator: Send + Sync {
    /// Returns `true` when every filter ID passes for the event.
    async fn matches(
        &self,
        ctx: &FilterContext<'_>,
        filter_ids: &[String],
    ) -> Result<bool, ProviderError>;

    /// Whether any of the filters reads route sorting data (`~*vars.`).
    ///
    /// Such routes are matched again once their sorting data is populated,
    /// with [`FilterContext::vars`] set.
    fn has_lazy_conditions(&self, _filter_ids: &[String]) -> bool {
        false
    }
}

/// What to rate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostRequest<'a> {
    /// Account charged for the event
    pub account: &'a str,
    /// Rating subject (the account unless the event names another)
    pub subject: &'a str,
    /// Dialed destination
    pub destination: &'a str,
    /// Candidate rating plans, first applicable wins
    pub rating_plan_ids: &'a [String],
    /// Usage to price
    pub usage: Duration,
}

/// Cost/rating engine.
#[async_trait]
pub trait CostProvider: Send + Sync {
    /// Compute the cost of `req.usage` towards `req.destination` using the
    /// first applicable rating plan.
    async fn cost(
        &self,
        ctx: &CallContext,
        req: &CostRequest<'_>,
    ) -> Result<CostQuote, ProviderError>;
}

/// Statistics engine.
#[async_trait]
pub trait StatsProvider: Send + Sync {
    /// Metric values (e.g. `*acd`, `*tcc`, `*sum#1`) of the given stat queues.
    async fn stat_metrics(
        &self,
        ctx: &CallContext,
        stat_ids: &[String],
    ) -> Result<BTreeMap<String, f64>, ProviderError>;
}

/// Resource-usage tracker.
#[async_trait]
pub trait ResourceProvider: Send + Sync {
    /// Total usage of the given resources.
    async fn resource_usage(
        &self,
        ctx: &CallContext,
        resource_ids: &[String],
    ) -> Result<f64, ProviderError>;
}
