//! `*lc` / `*hc`: computed cost of the event over each route's rating plans.

use async_trait::async_trait;
use tracing::debug;

use crate::providers::{CostRequest, ProviderError};
use crate::routes::error::RankError;
use crate::routes::profile::{Route, SortingStrategy};
use crate::routes::sorted::{keys, SortedRoute};

use super::{admit, weight_desc, RouteSorter, SortingContext};

/// Orders routes by the cost of the event, cheapest or dearest first.
#[derive(Debug)]
pub struct CostSorter {
    descending: bool,
}

impl CostSorter {
    /// `*lc`: least cost first.
    pub fn least_cost() -> Self {
        Self { descending: false }
    }

    /// `*hc`: highest cost first.
    pub fn highest_cost() -> Self {
        Self { descending: true }
    }

    async fn populate(
        &self,
        sctx: &SortingContext<'_>,
        route: &Route,
    ) -> Result<SortedRoute, RankError> {
        let unrankable = |reason: &str| RankError::Unrankable {
            route: route.id.clone(),
            reason: reason.to_string(),
        };

        if route.rating_plan_ids.is_empty() {
            return Err(unrankable("no rating plans"));
        }
        let account = sctx
            .event
            .account()
            .ok_or_else(|| unrankable("event has no Account"))?;
        let subject = sctx.event.subject().unwrap_or(account);
        let destination = sctx
            .event
            .destination()
            .ok_or_else(|| unrankable("event has no Destination"))?;
        let usage = sctx
            .event
            .usage()
            .map_err(|e| unrankable(&e))?
            .unwrap_or(sctx.settings.default_usage);

        let ctx = sctx.call_context();
        let req = CostRequest {
            account,
            subject,
            destination,
            rating_plan_ids: &route.rating_plan_ids,
            usage,
        };
        let quote = ctx.run(sctx.costs.cost(ctx, &req)).await??;
        if !quote.cost.is_finite() {
            return Err(ProviderError::Invalid(format!("cost {} is not finite", quote.cost)).into());
        }

        let mut sorted = SortedRoute::new(&route.id, &route.route_parameters, route.weight);
        sorted.set(keys::COST, quote.cost);
        sorted.set(keys::RATING_PLAN_ID, quote.rating_plan_id);

        if !route.resource_ids.is_empty() {
            let usage = sctx.snapshot.total_resource_usage(&route.resource_ids).await?;
            sorted.set(keys::RESOURCE_USAGE, usage);
        }

        debug!(
            route = %route.id,
            cost = quote.cost,
            "route cost computed"
        );
        Ok(sorted)
    }
}

#[async_trait]
impl RouteSorter for CostSorter {
    fn strategy(&self) -> SortingStrategy {
        if self.descending {
            SortingStrategy::HighestCost
        } else {
            SortingStrategy::LeastCost
        }
    }

    async fn sort_routes(
        &self,
        sctx: &SortingContext<'_>,
        routes: &[&Route],
    ) -> Result<Vec<SortedRoute>, RankError> {
        let mut sorted = Vec::with_capacity(routes.len());
        for route in routes {
            sctx.call_context().check()?;
            let result = self.populate(sctx, route).await;
            if let Some(route) = admit(sctx.call_context(), self.strategy(), route, result)? {
                sorted.push(route);
            }
        }

        let descending = self.descending;
        sorted.sort_by(|a, b| {
            let (ca, cb) = (cost_of(a), cost_of(b));
            let by_cost = if descending { cb.total_cmp(&ca) } else { ca.total_cmp(&cb) };
            by_cost.then_with(|| weight_desc(a, b))
        });
        Ok(sorted)
    }
}

fn cost_of(route: &SortedRoute) -> f64 {
    route.number(keys::COST).unwrap_or(f64::INFINITY)
}
