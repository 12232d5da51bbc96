//! Strategy lookup.

use std::collections::HashMap;
use std::sync::Arc;

use super::error::RankError;
use super::profile::SortingStrategy;
use super::sorter::{CostSorter, LoadSorter, QosSorter, ResourceSorter, RouteSorter, WeightSorter};

/// Maps a profile's sorting strategy to its sorter.
///
/// Built-in sorters are registered by [`StrategyResolver::new`]; a custom
/// sorter registered for a strategy replaces the built-in one.
pub struct StrategyResolver {
    sorters: HashMap<SortingStrategy, Arc<dyn RouteSorter>>,
}

impl StrategyResolver {
    /// Create a resolver with every built-in sorter.
    pub fn new() -> Self {
        let mut resolver = Self::empty();

        resolver.register(Arc::new(WeightSorter::new()));
        resolver.register(Arc::new(CostSorter::least_cost()));
        resolver.register(Arc::new(CostSorter::highest_cost()));
        resolver.register(Arc::new(QosSorter::new()));
        resolver.register(Arc::new(ResourceSorter::ascending()));
        resolver.register(Arc::new(ResourceSorter::descending()));
        resolver.register(Arc::new(LoadSorter::new()));

        resolver
    }

    /// Create a resolver with no sorters.
    pub fn empty() -> Self {
        Self {
            sorters: HashMap::new(),
        }
    }

    /// Register a sorter under its strategy.
    pub fn register(&mut self, sorter: Arc<dyn RouteSorter>) {
        self.sorters.insert(sorter.strategy(), sorter);
    }

    /// Sorter for a strategy name.
    pub fn resolve(&self, sorting: &str) -> Result<&Arc<dyn RouteSorter>, RankError> {
        let strategy = sorting.parse::<SortingStrategy>()?;
        self.sorters
            .get(&strategy)
            .ok_or_else(|| RankError::UnsupportedSortingStrategy(sorting.to_string()))
    }

    /// Registered strategies in canonical order.
    pub fn strategies(&self) -> Vec<SortingStrategy> {
        SortingStrategy::ALL
            .into_iter()
            .filter(|s| self.sorters.contains_key(s))
            .collect()
    }
}

impl Default for StrategyResolver {
    fn default() -> Self {
        Self::new()
    }
}
