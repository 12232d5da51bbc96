use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use lcrd::config::Config;
use lcrd::event::RouteEvent;
use lcrd::routes::{CallContext, MaxCost, RankOptions};
use lcrd::telemetry::{init_tracing, shutdown_tracing, Metrics};

#[derive(Parser, Debug)]
#[command(name = "lcrd")]
#[command(author, version, about = "Least-cost route ranking engine")]
struct Args {
    /// Path to config file
    #[arg(short, long, value_name = "FILE")]
    config: PathBuf,

    /// Event to rank routes for (YAML or JSON)
    #[arg(short, long, value_name = "FILE")]
    event: Option<PathBuf>,

    /// Event field, repeatable (e.g. --field Destination=+4986517174963)
    #[arg(short, long = "field", value_name = "KEY=VALUE")]
    fields: Vec<String>,

    /// Event tenant (overrides the event file)
    #[arg(long)]
    tenant: Option<String>,

    /// Exclude routes costing more than this (a number or *event_cost)
    #[arg(long, value_name = "COST")]
    max_cost: Option<MaxCost>,

    /// Stop after this many profiles produced routes
    #[arg(long)]
    profile_count: Option<usize>,

    /// Maximum number of routes returned
    #[arg(long)]
    limit: Option<usize>,

    /// Number of ranked routes to skip
    #[arg(long)]
    offset: Option<usize>,

    /// Validate config and exit
    #[arg(long)]
    validate: bool,

    /// Print Prometheus metrics to stderr after ranking
    #[arg(long)]
    metrics: bool,
}

fn load_event(args: &Args) -> Result<RouteEvent> {
    let mut event = match &args.event {
        Some(path) => {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read event file: {}", path.display()))?;
            serde_yaml::from_str::<RouteEvent>(&contents)
                .with_context(|| format!("failed to parse event file: {}", path.display()))?
        }
        None if args.fields.is_empty() => {
            anyhow::bail!("an event is required: pass --event or --field");
        }
        None => RouteEvent::default(),
    };

    for field in &args.fields {
        let (key, value) = field
            .split_once('=')
            .with_context(|| format!("invalid field '{}': expected KEY=VALUE", field))?;
        event.fields.insert(key.to_string(), value.to_string());
    }
    if let Some(tenant) = &args.tenant {
        event.tenant = tenant.clone();
    }
    if event.id.is_empty() {
        event.id = "cli".to_string();
    }

    Ok(event)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration first (to get log settings)
    let config = Config::load(&args.config)?;

    init_tracing(&config.telemetry.tracing_config())?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %args.config.display(),
        "starting lcrd"
    );

    info!(
        profiles = config.profiles.len(),
        filters = config.filters.len(),
        rating_plans = config.rating_plans.len(),
        "configuration loaded"
    );

    let exporting = config.telemetry.otlp_endpoint.is_some();
    let result = run(&args, &config).await;

    // Flush spans of failed runs too
    if exporting {
        shutdown_tracing();
    }

    result
}

async fn run(args: &Args, config: &Config) -> Result<()> {
    // Validate only mode
    if args.validate {
        info!("configuration is valid");
        return Ok(());
    }

    let metrics = if args.metrics { Some(Metrics::new()?) } else { None };

    let event = load_event(args)?;
    let service = config.route_service()?;
    let opts = RankOptions {
        max_cost: args.max_cost,
        profile_count: args.profile_count,
        limit: args.limit,
        offset: args.offset,
    };

    let ctx = CallContext::new();
    let result = service.routes_for_event(&ctx, &event, Some(&opts)).await;

    if let Some(metrics) = &metrics {
        eprintln!("{}", metrics.render()?);
    }

    let ranked = result.with_context(|| format!("ranking event '{}' failed", event.id))?;
    println!("{}", serde_json::to_string_pretty(&ranked)?);

    Ok(())
}
