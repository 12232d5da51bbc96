//! Filter conditions: a field reference plus one or more matchers.

use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::providers::ProviderError;
use crate::routes::{FilterContext, SortingValue};

/// Event field reference prefix.
pub const REQ_PREFIX: &str = "~*req.";
/// Stat metric reference prefix (`~*stats.<ID>.<metric>`).
pub const STATS_PREFIX: &str = "~*stats.";
/// Resource usage reference prefix (`~*resources.<ID>.TotalUsage`).
pub const RESOURCES_PREFIX: &str = "~*resources.";
const TOTAL_USAGE_SUFFIX: &str = ".TotalUsage";
/// Sorting data reference prefix (`~*vars.Cost`), checked once a route is populated.
pub const VARS_PREFIX: &str = "~*vars.";

/// A condition as written in configuration.
///
/// Exactly one matcher field should be set; `any` wins over the others.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConditionConfig {
    /// Value reference (`Account`, `~*req.Account`, `~*stats.ID.*acd`, ...)
    pub field: String,
    #[serde(default)]
    pub any: Option<bool>,
    #[serde(default)]
    pub exact: Option<String>,
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub regex: Option<String>,
    #[serde(default)]
    pub gt: Option<f64>,
    #[serde(default)]
    pub gte: Option<f64>,
    #[serde(default)]
    pub lt: Option<f64>,
    #[serde(default)]
    pub lte: Option<f64>,
}

/// Type of matcher
#[derive(Debug, Clone, PartialEq)]
pub enum MatcherKind {
    /// Always matches, even a missing value
    Any,
    /// Exact string match
    Exact(String),
    /// Prefix match
    Prefix(String),
    /// Regex match
    Regex(String),
    /// Greater than
    Gt(f64),
    /// Greater than or equal
    Gte(f64),
    /// Less than
    Lt(f64),
    /// Less than or equal
    Lte(f64),
}

impl MatcherKind {
    /// Create from a condition config.
    pub fn from_config(cond: &ConditionConfig) -> Option<Self> {
        if cond.any == Some(true) {
            Some(Self::Any)
        } else if let Some(ref exact) = cond.exact {
            Some(Self::Exact(exact.clone()))
        } else if let Some(ref regex) = cond.regex {
            Some(Self::Regex(regex.clone()))
        } else if let Some(ref prefix) = cond.prefix {
            if prefix.is_empty() {
                Some(Self::Any)
            } else {
                Some(Self::Prefix(prefix.clone()))
            }
        } else if let Some(v) = cond.gt {
            Some(Self::Gt(v))
        } else if let Some(v) = cond.gte {
            Some(Self::Gte(v))
        } else if let Some(v) = cond.lt {
            Some(Self::Lt(v))
        } else {
            cond.lte.map(Self::Lte)
        }
    }

    /// Create from an inline filter type (`*string`, `*prefix`, ...) and one value.
    pub fn from_inline(kind: &str, value: &str) -> Result<Self, String> {
        let number = || {
            value
                .trim()
                .parse::<f64>()
                .map_err(|_| format!("{} expects a number, got '{}'", kind, value))
        };
        match kind {
            "*string" => Ok(Self::Exact(value.to_string())),
            "*prefix" => Ok(Self::Prefix(value.to_string())),
            "*regex" => Ok(Self::Regex(value.to_string())),
            "*gt" => Ok(Self::Gt(number()?)),
            "*gte" => Ok(Self::Gte(number()?)),
            "*lt" => Ok(Self::Lt(number()?)),
            "*lte" => Ok(Self::Lte(number()?)),
            other => Err(format!("unsupported filter type '{}'", other)),
        }
    }
}

/// Where a condition reads its value from.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldPath {
    /// An event field
    Event(String),
    /// One metric of a stat queue
    Stat { stat_id: String, metric: String },
    /// Total usage of a resource
    Resource(String),
    /// A key of the route's sorting data
    Vars(String),
}

impl FieldPath {
    /// Parse a field reference. A bare name refers to an event field.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let raw = raw.trim();
        if let Some(rest) = raw.strip_prefix(STATS_PREFIX) {
            return match rest.split_once('.') {
                Some((id, metric)) if !id.is_empty() && !metric.is_empty() => Ok(Self::Stat {
                    stat_id: id.to_string(),
                    metric: metric.to_string(),
                }),
                _ => Err(format!("expected {}<ID>.<metric>, got '{}'", STATS_PREFIX, raw)),
            };
        }
        if let Some(rest) = raw.strip_prefix(RESOURCES_PREFIX) {
            return match rest.strip_suffix(TOTAL_USAGE_SUFFIX) {
                Some(id) if !id.is_empty() => Ok(Self::Resource(id.to_string())),
                _ => Err(format!(
                    "expected {}<ID>{}, got '{}'",
                    RESOURCES_PREFIX, TOTAL_USAGE_SUFFIX, raw
                )),
            };
        }
        if let Some(key) = raw.strip_prefix(VARS_PREFIX) {
            if key.is_empty() {
                return Err(format!("expected {}<key>, got '{}'", VARS_PREFIX, raw));
            }
            return Ok(Self::Vars(key.to_string()));
        }
        let name = raw.strip_prefix(REQ_PREFIX).unwrap_or(raw);
        if name.is_empty() || name.starts_with('~') {
            return Err(format!("unsupported field reference '{}'", raw));
        }
        Ok(Self::Event(name.to_string()))
    }
}

/// A resolved value.
#[derive(Debug, Clone, PartialEq)]
enum FieldValue {
    Text(String),
    Number(f64),
    Missing,
}

impl FieldValue {
    fn as_text(&self) -> Option<String> {
        match self {
            Self::Text(s) => Some(s.clone()),
            Self::Number(n) => Some(n.to_string()),
            Self::Missing => None,
        }
    }

    fn as_number(&self) -> Option<f64> {
        match self {
            Self::Text(s) => s.trim().parse().ok(),
            Self::Number(n) => Some(*n),
            Self::Missing => None,
        }
    }
}

/// A compiled matcher.
#[derive(Clone)]
pub struct CompiledMatcher {
    kind: MatcherKind,
    regex: Option<Arc<Regex>>,
}

impl std::fmt::Debug for CompiledMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledMatcher")
            .field("kind", &self.kind)
            .finish()
    }
}

impl CompiledMatcher {
    /// Compile a matcher.
    pub fn new(kind: MatcherKind) -> Result<Self, regex::Error> {
        let regex = match &kind {
            MatcherKind::Regex(pattern) => Some(Arc::new(Regex::new(pattern)?)),
            _ => None,
        };

        Ok(Self { kind, regex })
    }

    /// The matcher kind.
    pub fn kind(&self) -> &MatcherKind {
        &self.kind
    }

    fn matches(&self, value: &FieldValue) -> bool {
        match &self.kind {
            MatcherKind::Any => true,
            MatcherKind::Exact(exact) => value.as_text().is_some_and(|v| &v == exact),
            MatcherKind::Prefix(prefix) => value.as_text().is_some_and(|v| v.starts_with(prefix)),
            MatcherKind::Regex(_) => match (&self.regex, value.as_text()) {
                (Some(re), Some(v)) => re.is_match(&v),
                _ => false,
            },
            MatcherKind::Gt(limit) => value.as_number().is_some_and(|v| v > *limit),
            MatcherKind::Gte(limit) => value.as_number().is_some_and(|v| v >= *limit),
            MatcherKind::Lt(limit) => value.as_number().is_some_and(|v| v < *limit),
            MatcherKind::Lte(limit) => value.as_number().is_some_and(|v| v <= *limit),
        }
    }
}

/// A field reference and the matchers it is checked against.
///
/// Passes when any matcher passes.
#[derive(Debug, Clone)]
pub struct CompiledCondition {
    field: FieldPath,
    matchers: Vec<CompiledMatcher>,
}

impl CompiledCondition {
    /// Create a condition.
    pub fn new(field: FieldPath, matchers: Vec<CompiledMatcher>) -> Self {
        Self { field, matchers }
    }

    /// The field reference.
    pub fn field(&self) -> &FieldPath {
        &self.field
    }

    /// Whether the condition reads sorting data.
    pub fn is_lazy(&self) -> bool {
        matches!(self.field, FieldPath::Vars(_))
    }

    /// Whether the event (and the live metrics it references) pass.
    ///
    /// Lazy conditions pass while the context carries no sorting data.
    pub async fn matches(&self, ctx: &FilterContext<'_>) -> Result<bool, ProviderError> {
        if self.matchers.iter().all(|m| m.kind() == &MatcherKind::Any) {
            return Ok(true);
        }

        let value = match &self.field {
            FieldPath::Event(name) => ctx
                .event()
                .field(name)
                .map(|v| FieldValue::Text(v.to_string()))
                .unwrap_or(FieldValue::Missing),
            FieldPath::Stat { stat_id, metric } => ctx
                .stat_metric(stat_id, metric)
                .await?
                .map(FieldValue::Number)
                .unwrap_or(FieldValue::Missing),
            FieldPath::Resource(id) => FieldValue::Number(ctx.resource_usage(id).await?),
            FieldPath::Vars(key) => {
                let Some(vars) = ctx.vars() else {
                    return Ok(true);
                };
                match vars.get(key) {
                    Some(SortingValue::Number(n)) => FieldValue::Number(*n),
                    Some(SortingValue::Text(s)) => FieldValue::Text(s.clone()),
                    None => FieldValue::Missing,
                }
            }
        };

        Ok(self.matchers.iter().any(|m| m.matches(&value)))
    }
}
