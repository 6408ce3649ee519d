use anyhow::Context;
use clap::Parser;
use league_stats::config::{OutputFormat, StoreBackend};
use league_stats::core::cascade::RefreshOutcome;
use league_stats::core::render::{aggregate_response, render_json, render_text};
use league_stats::core::{AggregateOutcome, ViewModel};
use league_stats::domain::ports::QueryStore;
use league_stats::utils::error::ErrorCategory;
use league_stats::utils::{logger, validation, validation::Validate};
use league_stats::{
    AggregateCatalog, AggregateKind, AggregationExecutor, CascadeOrchestrator, CliConfig, Dataset, FilterSpec,
    HttpSqlStore, MemoryStore, StatsConfig, StatsEngine, StatsError,
};
use std::sync::Arc;

fn exit_code(category: ErrorCategory) -> i32 {
    match category {
        ErrorCategory::Validation => 2,
        ErrorCategory::Configuration => 3,
        ErrorCategory::Execution => 4,
        ErrorCategory::Io => 5,
    }
}

fn fail(error: &StatsError) -> ! {
    tracing::error!("{} (category: {:?})", error, error.category());
    eprintln!("{}", error.user_friendly_message());
    std::process::exit(exit_code(error.category()))
}

fn view_exit_code(view: &ViewModel) -> i32 {
    let statuses: Vec<u16> = view
        .aggregates
        .values()
        .filter_map(|outcome| match outcome {
            AggregateOutcome::Error { error } => Some(error.status),
            _ => None,
        })
        .collect();
    if statuses.is_empty() {
        0
    } else if statuses.iter().all(|s| *s == 400) {
        2
    } else {
        4
    }
}

fn load_config(cli: &CliConfig) -> Result<StatsConfig, StatsError> {
    let mut config = match &cli.config {
        Some(path) => StatsConfig::from_file(path)?,
        None => StatsConfig::default(),
    };
    if let Some(dir) = &cli.data_dir {
        config.store.backend = StoreBackend::Csv;
        config.store.data_dir = dir.clone();
    }
    if let Some(endpoint) = &cli.endpoint {
        config.store.backend = StoreBackend::Http;
        config.store.endpoint = Some(endpoint.clone());
    }
    config.validate()?;
    Ok(config)
}

async fn run<S: QueryStore + 'static>(
    store: S,
    config: &StatsConfig,
    filters: FilterSpec,
    cli: &CliConfig,
) -> anyhow::Result<i32> {
    let executor = AggregationExecutor::with_retry(Arc::new(store), config.execution.retry_policy());
    let engine = StatsEngine::new(AggregateCatalog::new(&config.catalog), executor, config.cache)
        .with_fanout_timeout(config.execution.fanout_timeout());
    let engine = Arc::new(engine);

    match cli.aggregate {
        Some(kind) => run_aggregate(&engine, kind, &filters).await,
        None => run_view(engine, filters, cli.format).await,
    }
}

async fn run_aggregate<S: QueryStore + 'static>(
    engine: &StatsEngine<S>,
    kind: AggregateKind,
    filters: &FilterSpec,
) -> anyhow::Result<i32> {
    let result = engine.fetch(kind, filters).await;
    let (status, body) = aggregate_response(&result);
    println!("{}", serde_json::to_string_pretty(&body)?);

    match result {
        Ok(_) => Ok(0),
        Err(e) => {
            tracing::error!("{} failed with status {}: {}", kind, status, e);
            Ok(exit_code(e.category()))
        }
    }
}

async fn run_view<S: QueryStore + 'static>(
    engine: Arc<StatsEngine<S>>,
    filters: FilterSpec,
    format: OutputFormat,
) -> anyhow::Result<i32> {
    let orchestrator = CascadeOrchestrator::new(engine);

    let transition = orchestrator.update_filters(filters);
    tracing::debug!("Fetching {:?} for {}", orchestrator.plan().kinds(), transition.filters);

    let view = match orchestrator.refresh().await {
        RefreshOutcome::Current(view) => view,
        RefreshOutcome::Superseded { epoch } => {
            anyhow::bail!("refresh for epoch {} was superseded", epoch)
        }
    };

    let output = match format {
        OutputFormat::Json => render_json(&view)?,
        OutputFormat::Text => render_text(&view),
    };
    println!("{}", output);

    if view.has_errors() {
        tracing::warn!("Some aggregates failed for {}", view.filters);
    }
    Ok(view_exit_code(&view))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = CliConfig::parse();

    if cli.json_logs {
        logger::init_json_logger(cli.verbose);
    } else {
        logger::init_cli_logger(cli.verbose);
    }
    tracing::info!("Starting league-stats");
    tracing::debug!("CLI config: {:?}", cli);

    let config = load_config(&cli).unwrap_or_else(|e| fail(&e));
    let filters = cli.filter_spec().unwrap_or_else(|e| fail(&e));

    let code = match config.store.backend {
        StoreBackend::Csv => {
            let dataset = Dataset::load_dir(&config.store.data_dir)
                .with_context(|| format!("loading dataset from {}", config.store.data_dir))?;
            let store = MemoryStore::with_pool(dataset, config.store.pool_size, config.store.request_timeout());
            run(store, &config, filters, &cli).await?
        }
        StoreBackend::Http => {
            let endpoint = validation::validate_required_field("store.endpoint", &config.store.endpoint)
                .and_then(|raw| validation::validate_url("store.endpoint", raw))
                .unwrap_or_else(|e| fail(&e));
            let mut store = HttpSqlStore::new(endpoint, config.store.pool_size, config.store.request_timeout());
            if let Some(token) = &config.store.auth_token {
                store = store.with_auth_token(token.clone());
            }
            run(store, &config, filters, &cli).await?
        }
    };

    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}
