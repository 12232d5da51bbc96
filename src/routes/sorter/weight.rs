//! `*weight`: static weight, highest first.

use async_trait::async_trait;

use crate::routes::error::RankError;
use crate::routes::profile::{Route, SortingStrategy};
use crate::routes::sorted::SortedRoute;

use super::{weight_desc, RouteSorter, SortingContext};

/// Orders routes by weight descending.
#[derive(Debug, Default)]
pub struct WeightSorter;

impl WeightSorter {
    /// Create a weight sorter.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl RouteSorter for WeightSorter {
    fn strategy(&self) -> SortingStrategy {
        SortingStrategy::Weight
    }

    async fn sort_routes(
        &self,
        sctx: &SortingContext<'_>,
        routes: &[&Route],
    ) -> Result<Vec<SortedRoute>, RankError> {
        sctx.call_context().check()?;

        let mut sorted: Vec<SortedRoute> = routes
            .iter()
            .map(|r| SortedRoute::new(&r.id, &r.route_parameters, r.weight))
            .collect();
        sorted.sort_by(weight_desc);
        Ok(sorted)
    }
}
