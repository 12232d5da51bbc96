//! Route ranking across profiles.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info_span, warn, Instrument};

use crate::event::RouteEvent;
use crate::providers::{
    CostProvider, CostRequest, FilterEvaluator, ProviderError, ResourceProvider, StatsProvider,
};
use crate::telemetry::counters;

use super::context::{CallContext, FilterContext, MetricSnapshot};
use super::error::{NotFoundReason, RankError};
use super::matcher::RouteMatcher;
use super::profile::RouteProfile;
use super::resolver::StrategyResolver;
use super::sorted::{keys, SortedRoutes, SortedRoutesList};
use super::sorter::SortingContext;

/// Engine-wide defaults consulted by the sorters.
#[derive(Debug, Clone, PartialEq)]
pub struct RankerSettings {
    /// `*load` ratio for routes neither named nor covered by `*default`
    pub default_ratio: f64,
    /// Usage rated when the event carries none
    pub default_usage: Duration,
    /// Rating plans pricing the event itself for [`MaxCost::EventCost`]
    pub event_rating_plan_ids: Vec<String>,
}

impl Default for RankerSettings {
    fn default() -> Self {
        Self {
            default_ratio: 1.0,
            default_usage: Duration::from_secs(60),
            event_rating_plan_ids: Vec::new(),
        }
    }
}

/// `max_cost` keyword capping routes at the cost of the event itself.
pub const EVENT_COST: &str = "*event_cost";

/// Cap on the cost of returned routes.
///
/// Written as a number or as `*event_cost`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "MaxCostRepr", into = "MaxCostRepr")]
pub enum MaxCost {
    /// A fixed amount
    Fixed(f64),
    /// The cost of the event over the configured event rating plans
    EventCost,
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum MaxCostRepr {
    Number(f64),
    Text(String),
}

impl TryFrom<MaxCostRepr> for MaxCost {
    type Error = String;

    fn try_from(repr: MaxCostRepr) -> Result<Self, Self::Error> {
        match repr {
            MaxCostRepr::Number(n) => Ok(Self::Fixed(n)),
            MaxCostRepr::Text(s) => s.parse(),
        }
    }
}

impl From<MaxCost> for MaxCostRepr {
    fn from(cost: MaxCost) -> Self {
        match cost {
            MaxCost::Fixed(n) => Self::Number(n),
            MaxCost::EventCost => Self::Text(EVENT_COST.to_string()),
        }
    }
}

impl FromStr for MaxCost {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s == EVENT_COST {
            return Ok(Self::EventCost);
        }
        match s.parse::<f64>() {
            Ok(n) if !n.is_nan() => Ok(Self::Fixed(n)),
            _ => Err(format!("max cost must be a number or {}, got '{}'", EVENT_COST, s)),
        }
    }
}

impl fmt::Display for MaxCost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(n) => write!(f, "{}", n),
            Self::EventCost => f.write_str(EVENT_COST),
        }
    }
}

/// Per-call limits.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RankOptions {
    /// Drop routes whose cost is above this value
    #[serde(default)]
    pub max_cost: Option<MaxCost>,
    /// Stop after this many profiles produced routes
    #[serde(default)]
    pub profile_count: Option<usize>,
    /// Maximum number of routes across profiles
    #[serde(default)]
    pub limit: Option<usize>,
    /// Number of ranked routes to skip across profiles
    #[serde(default)]
    pub offset: Option<usize>,
}

impl RankOptions {
    /// Options set here, falling back to `defaults`.
    pub fn merged_over(&self, defaults: &RankOptions) -> RankOptions {
        RankOptions {
            max_cost: self.max_cost.or(defaults.max_cost),
            profile_count: self.profile_count.or(defaults.profile_count),
            limit: self.limit.or(defaults.limit),
            offset: self.offset.or(defaults.offset),
        }
    }
}

/// Ranks the routes of a list of profiles for one event.
///
/// Per profile: resolve the strategy, match routes, sort, cap by cost,
/// paginate. Profiles are visited in the order given.
pub struct RouteRanker {
    filters: Arc<dyn FilterEvaluator>,
    costs: Arc<dyn CostProvider>,
    stats: Arc<dyn StatsProvider>,
    resources: Arc<dyn ResourceProvider>,
    resolver: StrategyResolver,
    settings: RankerSettings,
}

impl RouteRanker {
    /// Create a ranker with the built-in strategies and default settings.
    pub fn new(
        filters: Arc<dyn FilterEvaluator>,
        costs: Arc<dyn CostProvider>,
        stats: Arc<dyn StatsProvider>,
        resources: Arc<dyn ResourceProvider>,
    ) -> Self {
        Self {
            filters,
            costs,
            stats,
            resources,
            resolver: StrategyResolver::new(),
            settings: RankerSettings::default(),
        }
    }

    /// Replace the strategy resolver.
    pub fn with_resolver(mut self, resolver: StrategyResolver) -> Self {
        self.resolver = resolver;
        self
    }

    /// Replace the settings.
    pub fn with_settings(mut self, settings: RankerSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Current settings.
    pub fn settings(&self) -> &RankerSettings {
        &self.settings
    }

    /// The strategy resolver.
    pub fn resolver(&self) -> &StrategyResolver {
        &self.resolver
    }

    pub(crate) fn filters(&self) -> &dyn FilterEvaluator {
        self.filters.as_ref()
    }

    /// A fresh metric snapshot for one call.
    pub fn snapshot<'a>(&'a self, ctx: &'a CallContext) -> MetricSnapshot<'a> {
        MetricSnapshot::new(ctx, self.stats.as_ref(), self.resources.as_ref())
    }

    /// Rank `profiles` for `event`.
    ///
    /// Returns `NotFound` when no profile produced a route, and `Cancelled`
    /// when the call context was cancelled or timed out.
    pub async fn rank(
        &self,
        ctx: &CallContext,
        event: &RouteEvent,
        profiles: &[RouteProfile],
        opts: &RankOptions,
    ) -> Result<SortedRoutesList, RankError> {
        let snapshot = self.snapshot(ctx);
        let profiles: Vec<&RouteProfile> = profiles.iter().collect();
        self.rank_with(&snapshot, event, &profiles, opts).await
    }

    /// Rank with an existing snapshot, sharing its lookups.
    pub async fn rank_with(
        &self,
        snapshot: &MetricSnapshot<'_>,
        event: &RouteEvent,
        profiles: &[&RouteProfile],
        opts: &RankOptions,
    ) -> Result<SortedRoutesList, RankError> {
        let span = info_span!(
            "rank",
            event = %event.id,
            tenant = %event.tenant,
            profiles = profiles.len()
        );
        let start = Instant::now();

        let result = self
            .rank_profiles(snapshot, event, profiles, opts)
            .instrument(span)
            .await;

        let outcome = match &result {
            Ok(_) => "ok",
            Err(err) => err.reason(),
        };
        counters::rank_completed(outcome, start.elapsed().as_secs_f64());
        result
    }

    /// Cost of the event over the event rating plans.
    async fn event_cost(&self, ctx: &CallContext, event: &RouteEvent) -> Result<f64, RankError> {
        let missing = |field: &str| RankError::EventCost(format!("event has no {}", field));

        if self.settings.event_rating_plan_ids.is_empty() {
            return Err(RankError::EventCost("no event rating plans configured".to_string()));
        }
        let account = event.account().ok_or_else(|| missing("Account"))?;
        let destination = event.destination().ok_or_else(|| missing("Destination"))?;
        let usage = event
            .usage()
            .map_err(RankError::EventCost)?
            .ok_or_else(|| missing("Usage"))?;

        let req = CostRequest {
            account,
            subject: event.subject().unwrap_or(account),
            destination,
            rating_plan_ids: &self.settings.event_rating_plan_ids,
            usage,
        };
        let quote = match ctx.run(self.costs.cost(ctx, &req)).await? {
            Ok(quote) => quote,
            Err(ProviderError::Cancelled) => {
                ctx.check()?;
                return Err(RankError::EventCost(ProviderError::Cancelled.to_string()));
            }
            Err(err) => return Err(RankError::EventCost(err.to_string())),
        };
        if !quote.cost.is_finite() {
            return Err(RankError::EventCost(format!("cost {} is not finite", quote.cost)));
        }

        debug!(cost = quote.cost, rating_plan = %quote.rating_plan_id, "event cost computed");
        Ok(quote.cost)
    }

    async fn rank_profiles(
        &self,
        snapshot: &MetricSnapshot<'_>,
        event: &RouteEvent,
        profiles: &[&RouteProfile],
        opts: &RankOptions,
    ) -> Result<SortedRoutesList, RankError> {
        let ctx = snapshot.context();
        ctx.check()?;

        let max_cost = match opts.max_cost {
            None => None,
            Some(MaxCost::Fixed(cost)) => Some(cost),
            Some(MaxCost::EventCost) => Some(self.event_cost(ctx, event).await?),
        };

        let fctx = FilterContext::new(event, snapshot);
        let matcher = RouteMatcher::new(self.filters.as_ref());

        let mut ranked: Vec<SortedRoutes> = Vec::new();
        let mut emitted = 0usize;
        let mut to_skip = opts.offset.unwrap_or(0);
        let mut capped_by_cost = false;

        for &profile in profiles {
            if opts.profile_count.is_some_and(|n| ranked.len() >= n) {
                debug!(profile_count = ranked.len(), "profile count reached");
                break;
            }
            if opts.limit.is_some_and(|n| emitted >= n) {
                debug!(routes = emitted, "route limit reached");
                break;
            }
            ctx.check()?;

            let sorter = self.resolver.resolve(&profile.sorting)?;
            let strategy = sorter.strategy();

            let matched = matcher.matching_routes(&fctx, &profile.routes).await?;
            if matched.is_empty() {
                debug!(profile = %profile.id, "no route matched");
                continue;
            }

            let sctx = SortingContext {
                event,
                profile,
                snapshot,
                costs: self.costs.as_ref(),
                settings: &self.settings,
            };
            let routes = match sorter.sort_routes(&sctx, &matched).await {
                Ok(routes) => routes,
                Err(err) if err.is_profile_local() => {
                    warn!(
                        profile = %profile.id,
                        sorting = %strategy,
                        error = %err,
                        "skipping profile"
                    );
                    continue;
                }
                Err(err) => return Err(err),
            };

            let mut routes = matcher.lazy_pass(&fctx, &matched, routes).await?;

            if let Some(max_cost) = max_cost {
                let before = routes.len();
                routes.retain(|r| r.number(keys::COST).map_or(true, |cost| cost <= max_cost));
                if routes.len() < before {
                    capped_by_cost = true;
                    debug!(
                        profile = %profile.id,
                        max_cost,
                        excluded = before - routes.len(),
                        "routes above max cost excluded"
                    );
                }
            }

            if to_skip > 0 {
                let skipped = to_skip.min(routes.len());
                routes.drain(..skipped);
                to_skip -= skipped;
            }
            if let Some(limit) = opts.limit {
                routes.truncate(limit.saturating_sub(emitted));
            }
            if routes.is_empty() {
                continue;
            }

            debug!(
                profile = %profile.id,
                sorting = %strategy,
                routes = routes.len(),
                "profile ranked"
            );
            counters::profile_ranked(strategy.as_str());
            emitted += routes.len();
            ranked.push(SortedRoutes {
                profile_id: profile.id.clone(),
                sorting: strategy.to_string(),
                routes,
            });
        }

        if ranked.is_empty() {
            let reason = if capped_by_cost {
                NotFoundReason::MaxCostExceeded
            } else {
                NotFoundReason::NoRoutes
            };
            return Err(RankError::NotFound(reason));
        }

        Ok(SortedRoutesList(ranked))
    }
}
