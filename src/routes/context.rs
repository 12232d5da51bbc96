//! Per-call context: cancellation, deadline and the metric snapshot.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::event::RouteEvent;
use crate::providers::{ProviderError, ResourceProvider, StatsProvider};

use super::error::{CancelCause, RankError};
use super::sorted::SortingValue;

/// Caller-supplied cancellation scope for one ranking call.
///
/// Every provider call made on behalf of the call is raced against the token
/// and the deadline.
#[derive(Debug, Clone)]
pub struct CallContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl CallContext {
    /// Context with a fresh token and no deadline.
    pub fn new() -> Self {
        Self {
            cancel: CancellationToken::new(),
            deadline: None,
        }
    }

    /// Context driven by an existing token.
    pub fn with_token(token: CancellationToken) -> Self {
        Self {
            cancel: token,
            deadline: None,
        }
    }

    /// Set an absolute deadline.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Set a deadline relative to now.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// The cancellation token.
    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// The deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Cancel the call.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Fail if the call was cancelled or its deadline passed.
    pub fn check(&self) -> Result<(), RankError> {
        if self.cancel.is_cancelled() {
            return Err(RankError::Cancelled(CancelCause::Cancelled));
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(RankError::Cancelled(CancelCause::DeadlineExceeded));
            }
        }
        Ok(())
    }

    /// Run a provider future, aborting it on cancellation or deadline.
    pub async fn run<F, T>(&self, fut: F) -> Result<T, RankError>
    where
        F: Future<Output = T>,
    {
        self.check()?;

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(RankError::Cancelled(CancelCause::Cancelled)),
            _ = wait_deadline(self.deadline) => Err(RankError::Cancelled(CancelCause::DeadlineExceeded)),
            value = fut => Ok(value),
        }
    }
}

impl Default for CallContext {
    fn default() -> Self {
        Self::new()
    }
}

async fn wait_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}

/// Stat and resource lookups of one call, cached by ID.
///
/// Filters and sorters of the same call share it, so a stat queue referenced
/// by a route filter and by the route's `*qos` sorting is fetched once.
/// Failed lookups are cached too.
pub struct MetricSnapshot<'a> {
    ctx: &'a CallContext,
    stats: &'a dyn StatsProvider,
    resources: &'a dyn ResourceProvider,
    stat_cache: Mutex<HashMap<String, Result<BTreeMap<String, f64>, ProviderError>>>,
    resource_cache: Mutex<HashMap<String, Result<f64, ProviderError>>>,
}

impl<'a> MetricSnapshot<'a> {
    /// Create an empty snapshot.
    pub fn new(
        ctx: &'a CallContext,
        stats: &'a dyn StatsProvider,
        resources: &'a dyn ResourceProvider,
    ) -> Self {
        Self {
            ctx,
            stats,
            resources,
            stat_cache: Mutex::new(HashMap::new()),
            resource_cache: Mutex::new(HashMap::new()),
        }
    }

    /// The call context lookups run under.
    pub fn context(&self) -> &'a CallContext {
        self.ctx
    }

    /// Metrics of one stat queue.
    pub async fn stat_metrics(&self, stat_id: &str) -> Result<BTreeMap<String, f64>, RankError> {
        let cached = self
            .stat_cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(stat_id)
            .cloned();
        if let Some(result) = cached {
            trace!(stat_id = %stat_id, "stat metrics served from snapshot");
            return result.map_err(RankError::from);
        }

        let ids = [stat_id.to_string()];
        let result = self.ctx.run(self.stats.stat_metrics(self.ctx, &ids)).await?;
        self.stat_cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(stat_id.to_string(), result.clone());
        result.map_err(RankError::from)
    }

    /// Usage of one resource.
    pub async fn resource_usage(&self, resource_id: &str) -> Result<f64, RankError> {
        let cached = self
            .resource_cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(resource_id)
            .cloned();
        if let Some(result) = cached {
            trace!(resource_id = %resource_id, "resource usage served from snapshot");
            return result.map_err(RankError::from);
        }

        let ids = [resource_id.to_string()];
        let result = self
            .ctx
            .run(self.resources.resource_usage(self.ctx, &ids))
            .await?;
        self.resource_cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(resource_id.to_string(), result.clone());
        result.map_err(RankError::from)
    }

    /// Summed usage of several resources. No IDs means zero usage.
    pub async fn total_resource_usage(&self, resource_ids: &[String]) -> Result<f64, RankError> {
        let mut total = 0.0;
        for id in resource_ids {
            total += self.resource_usage(id).await?;
        }
        Ok(total)
    }
}

/// Read-only view handed to the [`FilterEvaluator`](crate::providers::FilterEvaluator).
pub struct FilterContext<'a> {
    event: &'a RouteEvent,
    snapshot: &'a MetricSnapshot<'a>,
    vars: Option<&'a BTreeMap<String, SortingValue>>,
}

impl<'a> FilterContext<'a> {
    /// Create a filter context over an event and the call's snapshot.
    pub fn new(event: &'a RouteEvent, snapshot: &'a MetricSnapshot<'a>) -> Self {
        Self {
            event,
            snapshot,
            vars: None,
        }
    }

    /// The same context, exposing a populated route's sorting data.
    pub fn with_vars<'b>(&self, vars: &'b BTreeMap<String, SortingValue>) -> FilterContext<'b>
    where
        'a: 'b,
    {
        FilterContext {
            event: self.event,
            snapshot: self.snapshot,
            vars: Some(vars),
        }
    }

    /// Sorting data of the route being checked, once populated.
    pub fn vars(&self) -> Option<&'a BTreeMap<String, SortingValue>> {
        self.vars
    }

    /// The event being routed.
    pub fn event(&self) -> &'a RouteEvent {
        self.event
    }

    /// The call context.
    pub fn call_context(&self) -> &'a CallContext {
        self.snapshot.context()
    }

    /// Value of `metric` in stat queue `stat_id` (`~*stats.<ID>.<metric>`).
    pub async fn stat_metric(&self, stat_id: &str, metric: &str) -> Result<Option<f64>, ProviderError> {
        let metrics = self
            .snapshot
            .stat_metrics(stat_id)
            .await
            .map_err(into_provider_error)?;
        Ok(metrics.get(metric).copied())
    }

    /// Usage of a resource (`~*resources.<ID>.TotalUsage`).
    pub async fn resource_usage(&self, resource_id: &str) -> Result<f64, ProviderError> {
        self.snapshot
            .resource_usage(resource_id)
            .await
            .map_err(into_provider_error)
    }
}

fn into_provider_error(err: RankError) -> ProviderError {
    match err {
        RankError::Provider(e) => e,
        RankError::Cancelled(_) => ProviderError::Cancelled,
        other => ProviderError::Invalid(other.to_string()),
    }
}
