//! `*qos`: quality metrics from the stats engine.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::routes::error::RankError;
use crate::routes::profile::{Route, SortingStrategy};
use crate::routes::sorted::{keys, SortedRoute};

use super::{admit, split_stat_id, weight_desc, RouteSorter, SortingContext};

/// Metrics where a lower value ranks higher.
const LOWER_IS_BETTER: &[&str] = &["*pdd"];

/// Orders routes by the metrics named in the profile's sorting parameters.
///
/// Parameters are compared in order, each highest first (lowest first for
/// post-dial delay). A route missing a metric ranks after every route that
/// has it.
#[derive(Debug, Default)]
pub struct QosSorter;

impl QosSorter {
    /// Create a QoS sorter.
    pub fn new() -> Self {
        Self
    }

    async fn populate(
        &self,
        sctx: &SortingContext<'_>,
        route: &Route,
    ) -> Result<SortedRoute, RankError> {
        let mut collected: BTreeMap<String, Vec<f64>> = BTreeMap::new();

        for raw in &route.stat_ids {
            let (stat_id, selector) = split_stat_id(raw);
            let metrics = sctx.snapshot.stat_metrics(stat_id).await?;
            for (name, value) in metrics {
                if selector.is_some_and(|m| m != name) {
                    continue;
                }
                collected.entry(name).or_default().push(value);
            }
        }

        let mut sorted = SortedRoute::new(&route.id, &route.route_parameters, route.weight);
        for (name, values) in collected {
            if name == keys::WEIGHT {
                continue;
            }
            let avg = values.iter().sum::<f64>() / values.len() as f64;
            sorted.set(name, avg);
        }
        Ok(sorted)
    }
}

#[async_trait]
impl RouteSorter for QosSorter {
    fn strategy(&self) -> SortingStrategy {
        SortingStrategy::Qos
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

        let params = &sctx.profile.sorting_parameters;
        sorted.sort_by(|a, b| {
            params
                .iter()
                .map(|metric| compare_metric(metric, a.number(metric), b.number(metric)))
                .find(|ord| ord.is_ne())
                .unwrap_or(Ordering::Equal)
                .then_with(|| weight_desc(a, b))
        });
        Ok(sorted)
    }
}

fn compare_metric(metric: &str, a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) if LOWER_IS_BETTER.contains(&metric) => a.total_cmp(&b),
        (Some(a), Some(b)) => b.total_cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
