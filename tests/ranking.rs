//! End-to-end ranking tests over the public API
//!
//! Run with: cargo test --test ranking

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use lcrd::event::{fields, RouteEvent};
use lcrd::filters::{ConditionConfig, FilterDefinition, StaticFilters};
use lcrd::providers::{
    CostProvider, CostQuote, CostRequest, ProviderError, RatingPlan, RatingRate, ResourceProvider,
    StaticCostTable, StaticResources, StaticStats, StatsProvider,
};
use lcrd::routes::{
    keys, CallContext, CancelCause, MaxCost, NotFoundReason, RankError, RankOptions, Route,
    RouteProfile, RouteRanker, SortedRoutesList,
};

const TENANT: &str = "cgrates.org";

/// Cost provider quoting a fixed cost per rating plan.
struct FixedCosts {
    costs: BTreeMap<String, f64>,
    calls: AtomicUsize,
}

impl FixedCosts {
    fn new(costs: &[(&str, f64)]) -> Self {
        Self {
            costs: costs.iter().map(|(id, c)| (id.to_string(), *c)).collect(),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl CostProvider for FixedCosts {
    async fn cost(
        &self,
        _ctx: &CallContext,
        req: &CostRequest<'_>,
    ) -> Result<CostQuote, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        req.rating_plan_ids
            .iter()
            .find_map(|id| {
                self.costs.get(id).map(|cost| CostQuote {
                    cost: *cost,
                    rating_plan_id: id.clone(),
                })
            })
            .ok_or_else(|| ProviderError::NotFound("rating plan".to_string()))
    }
}

/// Stats provider that never answers.
struct StalledStats;

#[async_trait]
impl StatsProvider for StalledStats {
    async fn stat_metrics(
        &self,
        _ctx: &CallContext,
        _stat_ids: &[String],
    ) -> Result<BTreeMap<String, f64>, ProviderError> {
        std::future::pending::<()>().await;
        Ok(BTreeMap::new())
    }
}

/// Resource provider that counts lookups.
#[derive(Default)]
struct CountingResources {
    inner: StaticResources,
    calls: AtomicUsize,
}

#[async_trait]
impl ResourceProvider for CountingResources {
    async fn resource_usage(
        &self,
        ctx: &CallContext,
        resource_ids: &[String],
    ) -> Result<f64, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.resource_usage(ctx, resource_ids).await
    }
}

fn event() -> RouteEvent {
    RouteEvent::new(TENANT, "ev1")
        .with_field(fields::ACCOUNT, "1001")
        .with_field(fields::DESTINATION, "+4986517174963")
        .with_field(fields::USAGE, "1m")
}

fn stats(queues: &[(&str, &[(&str, f64)])]) -> Arc<StaticStats> {
    let stats = StaticStats::new();
    for (id, metrics) in queues {
        stats.set_metrics(
            id,
            metrics.iter().map(|(m, v)| (m.to_string(), *v)).collect(),
        );
    }
    Arc::new(stats)
}

fn resources(usages: &[(&str, f64)]) -> Arc<StaticResources> {
    let resources = StaticResources::new();
    for (id, usage) in usages {
        resources.set_usage(id, *usage);
    }
    Arc::new(resources)
}

fn ranker(
    costs: Arc<dyn CostProvider>,
    stats: Arc<dyn StatsProvider>,
    resources: Arc<dyn ResourceProvider>,
) -> RouteRanker {
    RouteRanker::new(Arc::new(StaticFilters::new()), costs, stats, resources)
}

fn simple_ranker() -> RouteRanker {
    ranker(
        Arc::new(FixedCosts::new(&[])),
        stats(&[]),
        resources(&[]),
    )
}

async fn rank(ranker: &RouteRanker, profiles: &[RouteProfile]) -> Result<SortedRoutesList, RankError> {
    ranker
        .rank(&CallContext::new(), &event(), profiles, &RankOptions::default())
        .await
}

#[tokio::test]
async fn test_non_matching_routes_never_appear() {
    let filters = StaticFilters::new();
    filters
        .insert(&FilterDefinition {
            id: "FLTR_ACNT_1002".to_string(),
            conditions: vec![ConditionConfig {
                field: "~*req.Account".to_string(),
                exact: Some("1002".to_string()),
                ..Default::default()
            }],
        })
        .unwrap();
    let ranker = RouteRanker::new(
        Arc::new(filters),
        Arc::new(FixedCosts::new(&[])),
        stats(&[]),
        resources(&[]),
    );

    let profile = RouteProfile::new(TENANT, "ROUTE_WEIGHT", "*weight")
        .with_route(Route::new("route1", 10.0).with_filters(&["FLTR_ACNT_1002"]))
        .with_route(Route::new("route2", 20.0).with_filters(&["*string:~*req.Account:1001"]))
        .with_route(Route::new("route3", 30.0).with_filters(&["FLTR_UNKNOWN"]));

    let list = rank(&ranker, &[profile]).await.unwrap();
    assert_eq!(list.route_ids(), vec!["route2"]);
}

#[tokio::test]
async fn test_weight_order_with_stable_ties() {
    let profile = RouteProfile::new(TENANT, "ROUTE_WEIGHT", "*weight")
        .with_route(Route::new("route1", 10.0).with_parameters("param1"))
        .with_route(Route::new("route2", 20.0).with_parameters("param2"))
        .with_route(Route::new("route3", 10.0))
        .with_route(Route::new("route4", 20.0));

    let list = rank(&simple_ranker(), &[profile]).await.unwrap();
    assert_eq!(list.route_ids(), vec!["route2", "route4", "route1", "route3"]);
    assert_eq!(list.0[0].digest(), "route2:param2,route4,route1:param1,route3");
    for route in &list.0[0].routes {
        assert_eq!(route.sorting_data.len(), 1);
        assert!(route.sorting_data.contains_key(keys::WEIGHT));
    }
}

#[tokio::test]
async fn test_least_cost_example() {
    let costs = Arc::new(FixedCosts::new(&[("RP_V1", 0.2505), ("RP_V3", 0.1245)]));
    let ranker = ranker(costs, stats(&[]), resources(&[]));
    let profile = RouteProfile::new(TENANT, "ROUTE_LC", "*lc")
        .with_route(Route::new("v1", 0.0).with_rating_plans(&["RP_V1"]))
        .with_route(Route::new("v3", 10.0).with_rating_plans(&["RP_V3"]));

    let list = rank(&ranker, &[profile]).await.unwrap();
    assert_eq!(list.route_ids(), vec!["v3", "v1"]);

    let first = &list.0[0].routes[0];
    assert_eq!(first.number(keys::COST), Some(0.1245));
    assert_eq!(
        first.sorting_data.get(keys::RATING_PLAN_ID).map(ToString::to_string),
        Some("RP_V3".to_string())
    );
    assert_eq!(first.weight(), 10.0);
}

#[tokio::test]
async fn test_highest_cost_monotonic_with_weight_tie_break() {
    let costs = Arc::new(FixedCosts::new(&[("RP_A", 0.5), ("RP_B", 0.9), ("RP_C", 0.5)]));
    let ranker = ranker(costs, stats(&[]), resources(&[]));
    let profile = RouteProfile::new(TENANT, "ROUTE_HC", "*hc")
        .with_route(Route::new("a", 5.0).with_rating_plans(&["RP_A"]))
        .with_route(Route::new("b", 1.0).with_rating_plans(&["RP_B"]))
        .with_route(Route::new("c", 15.0).with_rating_plans(&["RP_C"]));

    let list = rank(&ranker, &[profile]).await.unwrap();
    assert_eq!(list.route_ids(), vec!["b", "c", "a"]);

    let costs: Vec<f64> = list.0[0]
        .routes
        .iter()
        .filter_map(|r| r.number(keys::COST))
        .collect();
    assert!(costs.windows(2).all(|w| w[0] >= w[1]));
}

#[tokio::test]
async fn test_qos_lexicographic() {
    let stats = stats(&[
        ("STATS_V1", &[("*acd", 30.0), ("*tcc", 5.0)]),
        ("STATS_V2", &[("*acd", 30.0), ("*tcc", 9.0)]),
        ("STATS_V3", &[("*acd", 10.0), ("*tcc", 50.0)]),
    ]);
    let ranker = ranker(Arc::new(FixedCosts::new(&[])), stats, resources(&[]));
    let profile = RouteProfile::new(TENANT, "ROUTE_QOS", "*qos")
        .with_sorting_parameters(&["*acd", "*tcc"])
        .with_route(Route::new("v1", 100.0).with_stats(&["STATS_V1"]))
        .with_route(Route::new("v2", 0.0).with_stats(&["STATS_V2"]))
        .with_route(Route::new("v3", 50.0).with_stats(&["STATS_V3"]));

    let list = rank(&ranker, &[profile]).await.unwrap();
    assert_eq!(list.route_ids(), vec!["v2", "v1", "v3"]);
    assert_eq!(list.0[0].routes[0].number("*tcc"), Some(9.0));
}

#[tokio::test]
async fn test_resource_ascending_example() {
    let resources = resources(&[("RES_A", 2.0), ("RES_B", 4.0), ("RES_C", 7.0)]);
    let ranker = ranker(Arc::new(FixedCosts::new(&[])), stats(&[]), resources);
    let profile = RouteProfile::new(TENANT, "ROUTE_REAS", "*reas")
        .with_route(Route::new("busy", 20.0).with_resources(&["RES_C"]))
        .with_route(Route::new("idle", 10.0).with_resources(&["RES_A", "RES_B"]));

    let list = rank(&ranker, &[profile]).await.unwrap();
    assert_eq!(list.route_ids(), vec!["idle", "busy"]);
    assert_eq!(list.0[0].routes[0].number(keys::RESOURCE_USAGE), Some(6.0));
    assert_eq!(list.0[0].routes[1].number(keys::RESOURCE_USAGE), Some(7.0));
}

#[tokio::test]
async fn test_load_distribution_example() {
    let stats = stats(&[
        ("STATS_V1", &[("*sum#1", 7.0)]),
        ("STATS_V2", &[("*sum#1", 4.0)]),
        ("STATS_V3", &[("*sum#1", 2.0)]),
    ]);
    let ranker = ranker(Arc::new(FixedCosts::new(&[])), stats, resources(&[]));
    let profile = RouteProfile::new(TENANT, "ROUTE_LOAD", "*load")
        .with_sorting_parameters(&["v1:3", "*default:2"])
        .with_route(Route::new("v1", 0.0).with_stats(&["STATS_V1:*sum#1"]))
        .with_route(Route::new("v2", 0.0).with_stats(&["STATS_V2:*sum#1"]))
        .with_route(Route::new("v3", 0.0).with_stats(&["STATS_V3:*sum#1"]));

    let list = rank(&ranker, &[profile]).await.unwrap();
    assert_eq!(list.route_ids(), vec!["v3", "v2", "v1"]);

    let routes = &list.0[0].routes;
    assert_eq!(routes[2].number(keys::LOAD), Some(7.0));
    assert_eq!(routes[2].number(keys::RATIO), Some(3.0));
}

#[tokio::test]
async fn test_max_cost_below_every_route() {
    let costs = Arc::new(FixedCosts::new(&[("RP_V1", 0.2505), ("RP_V3", 0.1245)]));
    let ranker = ranker(costs, stats(&[]), resources(&[]));
    let profile = RouteProfile::new(TENANT, "ROUTE_LC", "*lc")
        .with_route(Route::new("v1", 0.0).with_rating_plans(&["RP_V1"]))
        .with_route(Route::new("v3", 10.0).with_rating_plans(&["RP_V3"]));
    let opts = RankOptions {
        max_cost: Some(MaxCost::Fixed(0.1)),
        ..Default::default()
    };

    let err = ranker
        .rank(&CallContext::new(), &event(), &[profile], &opts)
        .await
        .unwrap_err();
    assert_eq!(err, RankError::NotFound(NotFoundReason::MaxCostExceeded));
}

#[tokio::test]
async fn test_ranking_is_idempotent() {
    let costs = Arc::new(FixedCosts::new(&[("RP_A", 0.3), ("RP_B", 0.3), ("RP_C", 0.1)]));
    let stats = stats(&[
        ("STATS_A", &[("*acd", 30.0), ("*asr", 90.0)]),
        ("STATS_B", &[("*acd", 30.0), ("*asr", 80.0)]),
    ]);
    let ranker = ranker(costs, stats, resources(&[("RES_A", 1.0)]));
    let profiles = vec![
        RouteProfile::new(TENANT, "LC", "*lc")
            .with_weight(20.0)
            .with_route(Route::new("a", 10.0).with_rating_plans(&["RP_A"]).with_resources(&["RES_A"]))
            .with_route(Route::new("b", 10.0).with_rating_plans(&["RP_B"]))
            .with_route(Route::new("c", 5.0).with_rating_plans(&["RP_C"])),
        RouteProfile::new(TENANT, "QOS", "*qos")
            .with_sorting_parameters(&["*acd", "*asr"])
            .with_route(Route::new("a", 10.0).with_stats(&["STATS_A"]))
            .with_route(Route::new("b", 10.0).with_stats(&["STATS_B"])),
    ];

    let first = rank(&ranker, &profiles).await.unwrap();
    let first_json = serde_json::to_vec(&first).unwrap();
    for _ in 0..10 {
        let again = rank(&ranker, &profiles).await.unwrap();
        assert_eq!(serde_json::to_vec(&again).unwrap(), first_json);
    }
    assert_eq!(first.route_ids(), vec!["c", "a", "b", "a", "b"]);
}

#[tokio::test]
async fn test_cancelled_before_any_provider_call() {
    let costs = Arc::new(FixedCosts::new(&[("RP_A", 0.3)]));
    let ranker = ranker(costs.clone(), stats(&[]), resources(&[]));
    let profile = RouteProfile::new(TENANT, "LC", "*lc")
        .with_route(Route::new("a", 10.0).with_rating_plans(&["RP_A"]));

    let ctx = CallContext::new();
    ctx.cancel();
    let err = ranker
        .rank(&ctx, &event(), &[profile], &RankOptions::default())
        .await
        .unwrap_err();

    assert_eq!(err, RankError::Cancelled(CancelCause::Cancelled));
    assert_eq!(costs.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_deadline_aborts_stalled_stats() {
    let ranker = ranker(
        Arc::new(FixedCosts::new(&[])),
        Arc::new(StalledStats),
        resources(&[]),
    );
    let profile = RouteProfile::new(TENANT, "QOS", "*qos")
        .with_sorting_parameters(&["*acd"])
        .with_route(Route::new("a", 10.0).with_stats(&["STATS_A"]));

    let ctx = CallContext::new().with_timeout(Duration::from_millis(50));
    let err = ranker
        .rank(&ctx, &event(), &[profile], &RankOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err, RankError::Cancelled(CancelCause::DeadlineExceeded));
}

#[tokio::test]
async fn test_resource_lookups_shared_between_filters_and_sorters() {
    let counting = Arc::new(CountingResources::default());
    counting.inner.set_usage("RES_A", 3.0);
    counting.inner.set_usage("RES_B", 8.0);
    let ranker = ranker(Arc::new(FixedCosts::new(&[])), stats(&[]), counting.clone());

    let profile = RouteProfile::new(TENANT, "REAS", "*reas")
        .with_route(
            Route::new("a", 10.0)
                .with_filters(&["*lt:~*resources.RES_A.TotalUsage:5"])
                .with_resources(&["RES_A"]),
        )
        .with_route(
            Route::new("b", 10.0)
                .with_filters(&["*lt:~*resources.RES_B.TotalUsage:5"])
                .with_resources(&["RES_B"]),
        );

    let list = rank(&ranker, &[profile]).await.unwrap();
    assert_eq!(list.route_ids(), vec!["a"]);
    assert_eq!(counting.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_static_cost_table_end_to_end() {
    let costs = StaticCostTable::from_plans([
        RatingPlan {
            id: "RP_DE".to_string(),
            rates: vec![RatingRate {
                prefix: "+49".to_string(),
                cost_per_minute: 0.2,
                connect_fee: 0.05,
            }],
        },
        RatingPlan {
            id: "RP_ANY".to_string(),
            rates: vec![RatingRate {
                prefix: String::new(),
                cost_per_minute: 0.1,
                connect_fee: 0.0,
            }],
        },
    ]);
    let ranker = ranker(Arc::new(costs), stats(&[]), resources(&[]));
    let profile = RouteProfile::new(TENANT, "LC", "*lc")
        .with_route(Route::new("de", 10.0).with_rating_plans(&["RP_DE"]))
        .with_route(Route::new("any", 10.0).with_rating_plans(&["RP_ANY"]))
        .with_route(Route::new("none", 10.0));

    let list = rank(&ranker, &[profile]).await.unwrap();
    assert_eq!(list.route_ids(), vec!["any", "de"]);
    let de = &list.0[0].routes[1];
    assert!((de.number(keys::COST).unwrap() - 0.25).abs() < 1e-9);
}

#[tokio::test]
async fn test_overflowing_usage_is_not_rankable() {
    let costs = Arc::new(FixedCosts::new(&[("RP_A", 0.3)]));
    let ranker = ranker(costs.clone(), stats(&[]), resources(&[]));
    let profile = RouteProfile::new(TENANT, "LC", "*lc")
        .with_route(Route::new("a", 10.0).with_rating_plans(&["RP_A"]));
    let event = event().with_field(fields::USAGE, "1e30");

    let err = ranker
        .rank(&CallContext::new(), &event, &[profile], &RankOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err, RankError::NotFound(NotFoundReason::NoRoutes));
    assert_eq!(costs.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_event_cost_and_sorting_data_filters() {
    let costs = StaticCostTable::from_plans(
        [("RP_EVENT", 0.3), ("RP_A", 0.1), ("RP_B", 0.2), ("RP_C", 0.4)].map(|(id, cost)| {
            RatingPlan {
                id: id.to_string(),
                rates: vec![RatingRate {
                    prefix: "+49".to_string(),
                    cost_per_minute: cost,
                    connect_fee: 0.0,
                }],
            }
        }),
    );
    let ranker = ranker(Arc::new(costs), stats(&[]), resources(&[])).with_settings(
        lcrd::routes::RankerSettings {
            event_rating_plan_ids: vec!["RP_EVENT".to_string()],
            ..Default::default()
        },
    );
    let profile = RouteProfile::new(TENANT, "LC", "*lc")
        .with_route(Route::new("a", 10.0).with_rating_plans(&["RP_A"]))
        .with_route(
            Route::new("b", 10.0)
                .with_rating_plans(&["RP_B"])
                .with_filters(&["*gte:~*vars.Cost:0.25"]),
        )
        .with_route(Route::new("c", 10.0).with_rating_plans(&["RP_C"]));
    let opts = RankOptions {
        max_cost: Some(MaxCost::EventCost),
        ..Default::default()
    };

    let list = ranker
        .rank(&CallContext::new(), &event(), &[profile], &opts)
        .await
        .unwrap();
    assert_eq!(list.route_ids(), vec!["a"]);
}
