//! Benchmarks for route ranking.
//!
//! Run with: cargo bench --bench ranker

use std::collections::BTreeMap;
use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use lcrd::event::{fields, RouteEvent};
use lcrd::filters::StaticFilters;
use lcrd::providers::{RatingPlan, RatingRate, StaticCostTable, StaticResources, StaticStats};
use lcrd::routes::{CallContext, RankOptions, Route, RouteProfile, RouteRanker};

fn event() -> RouteEvent {
    RouteEvent::new("cgrates.org", "bench")
        .with_field(fields::ACCOUNT, "1001")
        .with_field(fields::DESTINATION, "+4986517174963")
}

fn create_ranker(count: usize) -> RouteRanker {
    let costs = StaticCostTable::from_plans((0..count).map(|i| RatingPlan {
        id: format!("RP_{}", i),
        rates: vec![RatingRate {
            prefix: "+49".to_string(),
            cost_per_minute: 0.01 * ((i % 7) + 1) as f64,
            connect_fee: 0.0,
        }],
    }));

    let stats = StaticStats::new();
    let resources = StaticResources::new();
    for i in 0..count {
        let metrics: BTreeMap<String, f64> = [
            ("*acd".to_string(), (i % 5) as f64 * 10.0),
            ("*asr".to_string(), (i % 11) as f64 * 9.0),
            ("*sum#1".to_string(), (i % 13) as f64),
        ]
        .into_iter()
        .collect();
        stats.set_metrics(&format!("STATS_{}", i), metrics);
        resources.set_usage(&format!("RES_{}", i), (i % 9) as f64);
    }

    RouteRanker::new(
        Arc::new(StaticFilters::new()),
        Arc::new(costs),
        Arc::new(stats),
        Arc::new(resources),
    )
}

fn create_profile(sorting: &str, params: &[&str], count: usize) -> RouteProfile {
    let mut profile = RouteProfile::new("cgrates.org", "BENCH", sorting).with_sorting_parameters(params);
    for i in 0..count {
        let mut route = Route::new(format!("route{}", i), ((i % 3) * 10) as f64)
            .with_filters(&["*prefix:~*req.Destination:+49"]);
        route.rating_plan_ids = vec![format!("RP_{}", i)];
        route.stat_ids = vec![format!("STATS_{}", i)];
        route.resource_ids = vec![format!("RES_{}", i)];
        profile = profile.with_route(route);
    }
    profile
}

fn bench_strategies(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let event = event();
    let opts = RankOptions::default();

    let strategies: [(&str, &[&str]); 5] = [
        ("*weight", &[]),
        ("*lc", &[]),
        ("*qos", &["*acd", "*asr"]),
        ("*reas", &[]),
        ("*load", &["*default:2"]),
    ];

    for (sorting, params) in strategies {
        let mut group = c.benchmark_group(format!("rank/{}", sorting.trim_start_matches('*')));

        for count in [5, 20, 100].iter() {
            let ranker = create_ranker(*count);
            let profiles = vec![create_profile(sorting, params, *count)];

            group.throughput(Throughput::Elements(*count as u64));
            group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, _| {
                b.to_async(&rt).iter(|| async {
                    let ctx = CallContext::new();
                    black_box(ranker.rank(&ctx, &event, &profiles, &opts).await)
                })
            });
        }

        group.finish();
    }
}

fn bench_profile_fanout(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let event = event();
    let ranker = create_ranker(20);
    let profiles: Vec<RouteProfile> = (0..10)
        .map(|i| {
            let mut profile = create_profile("*lc", &[], 20);
            profile.id = format!("BENCH_{}", i);
            profile
        })
        .collect();

    let mut group = c.benchmark_group("rank/profiles");

    for profile_count in [1usize, 3, 10].iter() {
        let opts = RankOptions {
            profile_count: Some(*profile_count),
            ..Default::default()
        };
        group.bench_with_input(
            BenchmarkId::from_parameter(profile_count),
            profile_count,
            |b, _| {
                b.to_async(&rt).iter(|| async {
                    let ctx = CallContext::new();
                    black_box(ranker.rank(&ctx, &event, &profiles, &opts).await)
                })
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_strategies, bench_profile_fanout);
criterion_main!(benches);
