//! Route ranking engine.
//!
//! Given an event and a list of route profiles, produces an ordered,
//! explainable list of routes per profile:
//!
//! 1. [`RouteMatcher`] keeps the routes whose filters pass
//! 2. [`StrategyResolver`] picks the profile's [`RouteSorter`]
//! 3. the sorter enriches each route with its sorting data and orders them
//! 4. [`RouteRanker`] applies the max cost cap and pagination
//!
//! [`RouteService`] sits in front and selects the profiles applying to an
//! event.

mod context;
mod error;
mod matcher;
mod profile;
mod ranker;
mod resolver;
mod service;
mod sorted;
pub mod sorter;

pub use context::{CallContext, FilterContext, MetricSnapshot};
pub use error::{CancelCause, NotFoundReason, RankError};
pub use matcher::RouteMatcher;
pub use profile::{
    ActivationInterval, LoadRatios, Route, RouteProfile, SortingStrategy, DEFAULT_RATIO_KEY,
};
pub use ranker::{MaxCost, RankOptions, RankerSettings, RouteRanker, EVENT_COST};
pub use resolver::StrategyResolver;
pub use service::RouteService;
pub use sorted::{keys, SortedRoute, SortedRoutes, SortedRoutesList, SortingValue};
pub use sorter::{RouteSorter, SortingContext};

#[cfg(test)]
pub(crate) mod testkit {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use crate::event::{fields, RouteEvent};
    use crate::filters::StaticFilters;
    use crate::providers::{RatingPlan, RatingRate, StaticCostTable, StaticResources, StaticStats};

    use super::*;

    /// Providers and an event for exercising sorters and the ranker.
    pub(crate) struct Fixture {
        pub ctx: CallContext,
        pub event: RouteEvent,
        pub filters: Arc<StaticFilters>,
        pub costs: Arc<StaticCostTable>,
        pub stats: Arc<StaticStats>,
        pub resources: Arc<StaticResources>,
        pub settings: RankerSettings,
    }

    impl Fixture {
        pub fn new() -> Self {
            Self {
                ctx: CallContext::new(),
                event: RouteEvent::new("cgrates.org", "ev1")
                    .with_field(fields::ACCOUNT, "1001")
                    .with_field(fields::DESTINATION, "+4986517174963"),
                filters: Arc::new(StaticFilters::new()),
                costs: Arc::new(StaticCostTable::new()),
                stats: Arc::new(StaticStats::new()),
                resources: Arc::new(StaticResources::new()),
                settings: RankerSettings::default(),
            }
        }

        /// Plan charging `cost_per_minute` to any destination.
        pub fn flat_rate(&self, plan_id: &str, cost_per_minute: f64) {
            self.costs.set_plan(RatingPlan {
                id: plan_id.to_string(),
                rates: vec![RatingRate {
                    prefix: String::new(),
                    cost_per_minute,
                    connect_fee: 0.0,
                }],
            });
        }

        pub fn metrics(&self, stat_id: &str, metrics: &[(&str, f64)]) {
            self.stats.set_metrics(
                stat_id,
                metrics
                    .iter()
                    .map(|(name, value)| (name.to_string(), *value))
                    .collect::<BTreeMap<_, _>>(),
            );
        }

        pub fn ranker(&self) -> RouteRanker {
            RouteRanker::new(
                self.filters.clone(),
                self.costs.clone(),
                self.stats.clone(),
                self.resources.clone(),
            )
            .with_settings(self.settings.clone())
        }

        pub async fn rank(
            &self,
            profiles: &[RouteProfile],
            opts: &RankOptions,
        ) -> Result<SortedRoutesList, RankError> {
            self.ranker().rank(&self.ctx, &self.event, profiles, opts).await
        }

        pub async fn sort_routes_with_params(
            &self,
            sorter: &dyn RouteSorter,
            sorting: &str,
            params: &[&str],
            routes: &[Route],
        ) -> Result<Vec<SortedRoute>, RankError> {
            let mut profile =
                RouteProfile::new("cgrates.org", "TEST", sorting).with_sorting_parameters(params);
            profile.routes = routes.to_vec();

            let snapshot = MetricSnapshot::new(&self.ctx, self.stats.as_ref(), self.resources.as_ref());
            let sctx = SortingContext {
                event: &self.event,
                profile: &profile,
                snapshot: &snapshot,
                costs: self.costs.as_ref(),
                settings: &self.settings,
            };
            let refs: Vec<&Route> = profile.routes.iter().collect();
            sorter.sort_routes(&sctx, &refs).await
        }

        pub async fn sort_routes(
            &self,
            sorter: &dyn RouteSorter,
            sorting: &str,
            routes: &[Route],
        ) -> Result<Vec<SortedRoute>, RankError> {
            self.sort_routes_with_params(sorter, sorting, &[], routes).await
        }

        pub async fn sort_with_params(
            &self,
            sorter: &dyn RouteSorter,
            sorting: &str,
            params: &[&str],
            routes: &[Route],
        ) -> Result<Vec<String>, RankError> {
            let sorted = self
                .sort_routes_with_params(sorter, sorting, params, routes)
                .await?;
            Ok(sorted.into_iter().map(|r| r.route_id).collect())
        }

        pub async fn sort(
            &self,
            sorter: &dyn RouteSorter,
            sorting: &str,
            routes: &[Route],
        ) -> Result<Vec<String>, RankError> {
            self.sort_with_params(sorter, sorting, &[], routes).await
        }
    }
}
