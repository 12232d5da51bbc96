//! Static filter evaluator.
//!
//! Filters are condition lists registered under an ID. A filter passes when
//! every condition passes. Filter IDs may also be written inline as
//! `<type>:<field>:<value1>;<value2>`, e.g. `*string:~*req.Account:1001;1002`
//! or `*gte:~*stats.STATS_1.*acd:30`.
//!
//! Dynamic references (`~*stats.<ID>.<metric>`, `~*resources.<ID>.TotalUsage`)
//! are read through the [`FilterContext`], so they see the same values as the
//! sorters of the same ranking call. Conditions on `~*vars.<key>` read the
//! sorting data of a route and are only decided after the route is sorted,
//! e.g. `*lte:~*vars.Cost:0.5`.

mod condition;

pub use condition::{
    CompiledCondition, CompiledMatcher, ConditionConfig, FieldPath, MatcherKind, REQ_PREFIX,
    RESOURCES_PREFIX, STATS_PREFIX, VARS_PREFIX,
};

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::providers::{FilterEvaluator, ProviderError};
use crate::routes::FilterContext;

/// A filter as written in configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterDefinition {
    /// Filter ID
    pub id: String,
    /// Conditions, all of which must pass
    #[serde(default)]
    pub conditions: Vec<ConditionConfig>,
}

/// Filter compilation errors.
#[derive(Debug, thiserror::Error)]
pub enum FilterError {
    #[error("filter '{filter}': invalid condition on '{field}': {reason}")]
    InvalidCondition {
        filter: String,
        field: String,
        reason: String,
    },

    #[error("filter '{filter}': invalid regex: {source}")]
    InvalidRegex {
        filter: String,
        #[source]
        source: regex::Error,
    },

    #[error("duplicate filter '{0}'")]
    Duplicate(String),
}

/// A compiled filter.
#[derive(Debug, Clone)]
pub struct CompiledFilter {
    id: String,
    conditions: Vec<CompiledCondition>,
}

impl CompiledFilter {
    /// Compile a filter definition.
    pub fn compile(def: &FilterDefinition) -> Result<Self, FilterError> {
        let mut conditions = Vec::with_capacity(def.conditions.len());

        for cond in &def.conditions {
            let invalid = |reason: String| FilterError::InvalidCondition {
                filter: def.id.clone(),
                field: cond.field.clone(),
                reason,
            };
            let field = FieldPath::parse(&cond.field).map_err(invalid)?;
            let kind = MatcherKind::from_config(cond)
                .ok_or_else(|| invalid("no matcher set".to_string()))?;
            let matcher = CompiledMatcher::new(kind).map_err(|source| FilterError::InvalidRegex {
                filter: def.id.clone(),
                source,
            })?;
            conditions.push(CompiledCondition::new(field, vec![matcher]));
        }

        Ok(Self {
            id: def.id.clone(),
            conditions,
        })
    }

    /// Compile an inline filter (`<type>:<field>:<values>`).
    ///
    /// Returns `Ok(None)` when `id` is not written inline.
    pub fn inline(id: &str) -> Result<Option<Self>, FilterError> {
        if !id.starts_with('*') {
            return Ok(None);
        }
        let invalid = |reason: String| FilterError::InvalidCondition {
            filter: id.to_string(),
            field: String::new(),
            reason,
        };

        let mut parts = id.splitn(3, ':');
        let (Some(kind), Some(field), Some(values)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid("expected <type>:<field>:<values>".to_string()));
        };

        let field = FieldPath::parse(field).map_err(&invalid)?;
        let mut matchers = Vec::new();
        for value in values.split(';') {
            let kind = MatcherKind::from_inline(kind, value).map_err(&invalid)?;
            let matcher = CompiledMatcher::new(kind).map_err(|source| FilterError::InvalidRegex {
                filter: id.to_string(),
                source,
            })?;
            matchers.push(matcher);
        }

        Ok(Some(Self {
            id: id.to_string(),
            conditions: vec![CompiledCondition::new(field, matchers)],
        }))
    }

    /// Filter ID.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Whether any condition reads sorting data.
    pub fn is_lazy(&self) -> bool {
        self.conditions.iter().any(CompiledCondition::is_lazy)
    }

    /// Whether every condition passes.
    pub async fn matches(&self, ctx: &FilterContext<'_>) -> Result<bool, ProviderError> {
        for cond in &self.conditions {
            if !cond.matches(ctx).await? {
                trace!(filter = %self.id, field = ?cond.field(), "condition failed");
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// Filters registered by ID.
#[derive(Debug, Default)]
pub struct StaticFilters {
    filters: RwLock<HashMap<String, Arc<CompiledFilter>>>,
}

impl StaticFilters {
    /// Create an empty filter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile a list of definitions.
    pub fn from_definitions<'a>(
        defs: impl IntoIterator<Item = &'a FilterDefinition>,
    ) -> Result<Self, FilterError> {
        let filters = Self::new();
        for def in defs {
            if filters.contains(&def.id) {
                return Err(FilterError::Duplicate(def.id.clone()));
            }
            filters.insert(def)?;
        }
        debug!(filters = filters.len(), "compiled filters");
        Ok(filters)
    }

    /// Compile and register (or replace) a filter.
    pub fn insert(&self, def: &FilterDefinition) -> Result<(), FilterError> {
        let compiled = CompiledFilter::compile(def)?;
        self.filters
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(def.id.clone(), Arc::new(compiled));
        Ok(())
    }

    /// Whether a filter ID is registered.
    pub fn contains(&self, id: &str) -> bool {
        self.filters
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(id)
    }

    /// Whether a filter ID is registered or a valid inline filter.
    pub fn resolves(&self, id: &str) -> bool {
        self.contains(id) || matches!(CompiledFilter::inline(id), Ok(Some(_)))
    }

    /// Number of registered filters.
    pub fn len(&self) -> usize {
        self.filters.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Whether no filter is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lookup(&self, id: &str) -> Result<Arc<CompiledFilter>, ProviderError> {
        if let Some(filter) = self
            .filters
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
        {
            return Ok(Arc::clone(filter));
        }
        match CompiledFilter::inline(id) {
            Ok(Some(filter)) => Ok(Arc::new(filter)),
            Ok(None) => Err(ProviderError::NotFound(format!("filter {}", id))),
            Err(err) => Err(ProviderError::Invalid(err.to_string())),
        }
    }
}

#[async_trait]
impl FilterEvaluator for StaticFilters {
    async fn matches(
        &self,
        ctx: &FilterContext<'_>,
        filter_ids: &[String],
    ) -> Result<bool, ProviderError> {
        for id in filter_ids {
            let filter = self.lookup(id)?;
            if !filter.matches(ctx).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn has_lazy_conditions(&self, filter_ids: &[String]) -> bool {
        filter_ids
            .iter()
            .any(|id| self.lookup(id).is_ok_and(|filter| filter.is_lazy()))
    }
}
