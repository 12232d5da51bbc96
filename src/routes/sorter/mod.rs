//! Sorting strategies.
//!
//! Each strategy is a [`RouteSorter`]. A sorter receives the routes that
//! passed their filters, enriches each with the data its ordering is based
//! on, drops the routes it cannot rank and returns the rest in a total
//! order. Ties always fall back to weight descending and then to the order
//! routes were declared in.
//!
//! # Built-in Sorters
//!
//! - `*weight` - [`WeightSorter`]
//! - `*lc` / `*hc` - [`CostSorter`]
//! - `*qos` - [`QosSorter`]
//! - `*reas` / `*reds` - [`ResourceSorter`]
//! - `*load` - [`LoadSorter`]
//!
//! Register custom sorters with the
//! [`StrategyResolver`](crate::routes::StrategyResolver).

mod cost;
mod load;
mod qos;
mod resource;
mod weight;

pub use cost::CostSorter;
pub use load::LoadSorter;
pub use qos::QosSorter;
pub use resource::ResourceSorter;
pub use weight::WeightSorter;

use std::cmp::Ordering;

use async_trait::async_trait;
use tracing::warn;

use crate::event::RouteEvent;
use crate::providers::{CostProvider, ProviderError};
use crate::telemetry::counters;

use super::context::{CallContext, MetricSnapshot};
use super::error::{CancelCause, RankError};
use super::profile::{Route, RouteProfile, SortingStrategy};
use super::ranker::RankerSettings;
use super::sorted::SortedRoute;

/// Everything a sorter may consult while ranking one profile.
pub struct SortingContext<'a> {
    /// The event being routed
    pub event: &'a RouteEvent,
    /// The profile being ranked
    pub profile: &'a RouteProfile,
    /// Cached stat and resource lookups of the call
    pub snapshot: &'a MetricSnapshot<'a>,
    /// Cost/rating engine
    pub costs: &'a dyn CostProvider,
    /// Engine-wide defaults
    pub settings: &'a RankerSettings,
}

impl<'a> SortingContext<'a> {
    /// The call context.
    pub fn call_context(&self) -> &'a CallContext {
        self.snapshot.context()
    }
}

/// A sorting strategy.
///
/// # Example
///
/// ```ignore
/// struct ById;
///
/// #[async_trait]
/// impl RouteSorter for ById {
///     fn strategy(&self) -> SortingStrategy {
///         SortingStrategy::Weight
///     }
///
///     async fn sort_routes(
///         &self,
///         _sctx: &SortingContext<'_>,
///         routes: &[&Route],
///     ) -> Result<Vec<SortedRoute>, RankError> {
///         let mut sorted: Vec<_> = routes
///             .iter()
///             .map(|r| SortedRoute::new(&r.id, &r.route_parameters, r.weight))
///             .collect();
///         sorted.sort_by(|a, b| a.route_id.cmp(&b.route_id));
///         Ok(sorted)
///     }
/// }
/// ```
#[async_trait]
pub trait RouteSorter: Send + Sync {
    /// The strategy this sorter implements.
    fn strategy(&self) -> SortingStrategy;

    /// Enrich and order routes.
    ///
    /// `routes` are in declaration order. Route-local failures drop the
    /// route; only profile-local and fatal errors are returned.
    async fn sort_routes(
        &self,
        sctx: &SortingContext<'_>,
        routes: &[&Route],
    ) -> Result<Vec<SortedRoute>, RankError>;
}

/// Keep a populated route, or drop it when its failure is route-local.
///
/// A failure while the call is cancelled, or a provider reporting
/// cancellation, aborts the call instead.
pub(crate) fn admit(
    ctx: &CallContext,
    strategy: SortingStrategy,
    route: &Route,
    result: Result<SortedRoute, RankError>,
) -> Result<Option<SortedRoute>, RankError> {
    let err = match result {
        Ok(sorted) => return Ok(Some(sorted)),
        Err(err) => err,
    };
    ctx.check()?;

    match err {
        RankError::Provider(ProviderError::Cancelled) => {
            Err(RankError::Cancelled(CancelCause::Cancelled))
        }
        err if err.is_route_local() => {
            warn!(
                route = %route.id,
                sorting = %strategy,
                error = %err,
                "dropping route"
            );
            counters::route_dropped(strategy.as_str(), err.reason());
            Ok(None)
        }
        err => Err(err),
    }
}

/// Weight descending.
pub(crate) fn weight_desc(a: &SortedRoute, b: &SortedRoute) -> Ordering {
    b.weight().total_cmp(&a.weight())
}

/// Split `STAT_ID:<metric>` into the stat ID and the optional metric selector.
pub(crate) fn split_stat_id(raw: &str) -> (&str, Option<&str>) {
    match raw.split_once(':') {
        Some((id, metric)) if !metric.is_empty() => (id, Some(metric)),
        Some((id, _)) => (id, None),
        None => (raw, None),
    }
}
