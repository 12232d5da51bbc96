//! `*reas` / `*reds`: resource occupancy.

use async_trait::async_trait;

use crate::routes::error::RankError;
use crate::routes::profile::{Route, SortingStrategy};
use crate::routes::sorted::{keys, SortedRoute};

use super::{admit, weight_desc, RouteSorter, SortingContext};

/// Orders routes by the summed usage of their resources.
#[derive(Debug)]
pub struct ResourceSorter {
    descending: bool,
}

impl ResourceSorter {
    /// `*reas`: least used first.
    pub fn ascending() -> Self {
        Self { descending: false }
    }

    /// `*reds`: most used first.
    pub fn descending() -> Self {
        Self { descending: true }
    }
}

#[async_trait]
impl RouteSorter for ResourceSorter {
    fn strategy(&self) -> SortingStrategy {
        if self.descending {
            SortingStrategy::ResourceDescending
        } else {
            SortingStrategy::ResourceAscending
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
            let result = sctx
                .snapshot
                .total_resource_usage(&route.resource_ids)
                .await
                .map(|usage| {
                    let mut sorted =
                        SortedRoute::new(&route.id, &route.route_parameters, route.weight);
                    sorted.set(keys::RESOURCE_USAGE, usage);
                    sorted
                });
            if let Some(route) = admit(sctx.call_context(), self.strategy(), route, result)? {
                sorted.push(route);
            }
        }

        let descending = self.descending;
        sorted.sort_by(|a, b| {
            let ua = a.number(keys::RESOURCE_USAGE).unwrap_or(0.0);
            let ub = b.number(keys::RESOURCE_USAGE).unwrap_or(0.0);
            let by_usage = if descending { ub.total_cmp(&ua) } else { ua.total_cmp(&ub) };
            by_usage.then_with(|| weight_desc(a, b))
        });
        Ok(sorted)
    }
}
