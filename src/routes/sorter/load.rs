//! `*load`: observed load against a target share.

use async_trait::async_trait;

use crate::providers::ProviderError;
use crate::routes::error::RankError;
use crate::routes::profile::{LoadRatios, Route, SortingStrategy};
use crate::routes::sorted::{keys, SortedRoute};

use super::{admit, split_stat_id, weight_desc, RouteSorter, SortingContext};

/// Orders routes by `Load / Ratio`, the route furthest below its share first.
///
/// Ratios come from `<routeID>:<ratio>` sorting parameters, with
/// `*default:<ratio>` applying to routes not named. Load is the sum of the
/// metrics of every stat ID; a `STAT_ID:<metric>` entry contributes only
/// that metric.
#[derive(Debug, Default)]
pub struct LoadSorter;

impl LoadSorter {
    /// Create a load sorter.
    pub fn new() -> Self {
        Self
    }

    async fn populate(
        &self,
        sctx: &SortingContext<'_>,
        ratios: &LoadRatios,
        route: &Route,
    ) -> Result<SortedRoute, RankError> {
        let mut load = 0.0;
        for raw in &route.stat_ids {
            let (stat_id, selector) = split_stat_id(raw);
            let metrics = sctx.snapshot.stat_metrics(stat_id).await?;
            match selector {
                Some(metric) => {
                    load += metrics.get(metric).copied().ok_or_else(|| {
                        ProviderError::NotFound(format!("metric {} in stat queue {}", metric, stat_id))
                    })?;
                }
                None => load += metrics.values().sum::<f64>(),
            }
        }

        let mut sorted = SortedRoute::new(&route.id, &route.route_parameters, route.weight);
        sorted.set(keys::LOAD, load);
        sorted.set(keys::RATIO, ratios.ratio_for(&route.id));
        Ok(sorted)
    }
}

#[async_trait]
impl RouteSorter for LoadSorter {
    fn strategy(&self) -> SortingStrategy {
        SortingStrategy::LoadDistribution
    }

    async fn sort_routes(
        &self,
        sctx: &SortingContext<'_>,
        routes: &[&Route],
    ) -> Result<Vec<SortedRoute>, RankError> {
        let ratios = LoadRatios::parse(sctx.profile, sctx.settings.default_ratio)?;

        let mut sorted = Vec::with_capacity(routes.len());
        for route in routes {
            sctx.call_context().check()?;
            let result = self.populate(sctx, &ratios, route).await;
            if let Some(route) = admit(sctx.call_context(), self.strategy(), route, result)? {
                sorted.push(route);
            }
        }

        sorted.sort_by(|a, b| share(a).total_cmp(&share(b)).then_with(|| weight_desc(a, b)));
        Ok(sorted)
    }
}

fn share(route: &SortedRoute) -> f64 {
    match (route.number(keys::LOAD), route.number(keys::RATIO)) {
        (Some(load), Some(ratio)) if ratio > 0.0 => load / ratio,
        _ => f64::INFINITY,
    }
}
