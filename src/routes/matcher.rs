//! Route-level filter matching.

use tracing::{debug, warn};

use crate::providers::{FilterEvaluator, ProviderError};

use super::context::FilterContext;
use super::error::{CancelCause, RankError};
use super::profile::Route;
use super::sorted::SortedRoute;

/// Filters the routes of a matched profile against the event.
pub struct RouteMatcher<'a> {
    filters: &'a dyn FilterEvaluator,
}

impl<'a> RouteMatcher<'a> {
    /// Create a matcher over a filter evaluator.
    pub fn new(filters: &'a dyn FilterEvaluator) -> Self {
        Self { filters }
    }

    /// Routes passing their own filters, in declaration order.
    ///
    /// Routes whose evaluation fails are dropped. When a route ID repeats, the
    /// heavier entry is kept at the position of the first one.
    ///
    /// Only cancellation is returned as an error.
    pub async fn matching_routes<'r>(
        &self,
        fctx: &FilterContext<'_>,
        routes: &'r [Route],
    ) -> Result<Vec<&'r Route>, RankError> {
        let ctx = fctx.call_context();
        let mut passed: Vec<&'r Route> = Vec::with_capacity(routes.len());

        for route in routes {
            ctx.check()?;

            let pass = if route.filter_ids.is_empty() {
                true
            } else {
                match self.filters.matches(fctx, &route.filter_ids).await {
                    Ok(pass) => pass,
                    Err(err) => {
                        // Cancellation surfaces as an error, not as a dropped route
                        ctx.check()?;
                        if err == ProviderError::Cancelled {
                            return Err(RankError::Cancelled(CancelCause::Cancelled));
                        }
                        warn!(
                            route = %route.id,
                            error = %err,
                            "dropping route: filter evaluation failed"
                        );
                        false
                    }
                }
            };

            if !pass {
                debug!(route = %route.id, "route filtered out");
                continue;
            }

            match passed.iter_mut().find(|r| r.id == route.id) {
                Some(existing) => {
                    if route.weight > existing.weight {
                        *existing = route;
                    }
                }
                None => passed.push(route),
            }
        }

        Ok(passed)
    }

    /// Sorted routes passing the filters that read their sorting data.
    ///
    /// `routes` are the matched routes the sorter was given. Order is kept.
    pub async fn lazy_pass(
        &self,
        fctx: &FilterContext<'_>,
        routes: &[&Route],
        sorted: Vec<SortedRoute>,
    ) -> Result<Vec<SortedRoute>, RankError> {
        let ctx = fctx.call_context();
        let mut passed = Vec::with_capacity(sorted.len());

        for candidate in sorted {
            let Some(route) = routes.iter().find(|r| r.id == candidate.route_id) else {
                passed.push(candidate);
                continue;
            };
            if !self.filters.has_lazy_conditions(&route.filter_ids) {
                passed.push(candidate);
                continue;
            }
            ctx.check()?;

            let vctx = fctx.with_vars(&candidate.sorting_data);
            match self.filters.matches(&vctx, &route.filter_ids).await {
                Ok(true) => passed.push(candidate),
                Ok(false) => debug!(route = %route.id, "route filtered out on sorting data"),
                Err(err) => {
                    ctx.check()?;
                    if err == ProviderError::Cancelled {
                        return Err(RankError::Cancelled(CancelCause::Cancelled));
                    }
                    warn!(
                        route = %route.id,
                        error = %err,
                        "dropping route: filter evaluation failed"
                    );
                }
            }
        }

        Ok(passed)
    }
}
