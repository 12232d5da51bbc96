use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use crate::filters::StaticFilters;
use crate::providers::{StaticCostTable, StaticResources, StaticStats};
use crate::routes::{RouteRanker, RouteService};

use super::types::Config;

impl Config {
    /// Build a route service over the configured profiles and static
    /// provider tables.
    pub fn route_service(&self) -> Result<RouteService> {
        let filters = StaticFilters::from_definitions(&self.filters)
            .context("invalid filter definition")?;
        let costs = StaticCostTable::from_plans(self.rating_plans.iter().cloned());
        let stats = StaticStats::from_map(self.stats.clone());
        let resources = StaticResources::from_map(self.resources.clone());

        let ranker = RouteRanker::new(
            Arc::new(filters),
            Arc::new(costs),
            Arc::new(stats),
            Arc::new(resources),
        )
        .with_settings(self.settings.ranker_settings());

        info!(
            profiles = self.profiles.len(),
            strategies = ranker.resolver().strategies().len(),
            "route service ready"
        );

        Ok(RouteService::new(ranker, self.profiles.clone())
            .with_default_tenant(self.settings.default_tenant.clone())
            .with_default_options(self.settings.rank.clone())
            .with_rank_timeout(self.settings.rank_timeout))
    }
}
