//! Command-line front end.
//!
//! `optimize` runs a search and prints the ranked portfolios, `analyze`
//! screens each strategy on its own, `sample` dumps the built-in catalog.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use csp_portfolio::config::{load_config, AppConfig};
use csp_portfolio::constraints::screen_catalog;
use csp_portfolio::report::{render_screening, RunReport};
use csp_portfolio::strategy::{fetch_catalog, load_catalog_from_file, sample_catalog};
use csp_portfolio::{
    search, search_parallel, CancelToken, ConstraintParams, LiquidityPolicy, MarketState, StrategyCatalog,
};

#[derive(Parser)]
#[command(name = "csp-portfolio", about = "Constraint-satisfaction portfolio selection")]
struct Cli {
    /// Config file (defaults to $CSP_PORTFOLIO_CONFIG or ./csp_portfolio.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Enumerate and rank every feasible portfolio.
    Optimize(RunArgs),
    /// Check each strategy on its own against the thresholds.
    Analyze(RunArgs),
    /// Print the built-in sample catalog as JSON.
    Sample,
}

#[derive(Args)]
struct RunArgs {
    #[arg(long)]
    catalog: Option<PathBuf>,

    #[arg(long, conflicts_with = "catalog")]
    catalog_url: Option<String>,

    /// Start from this market state's preset (bearish, neutral, bullish or 0/1/2).
    #[arg(long)]
    market_state: Option<MarketState>,

    #[arg(long)]
    max_risk: Option<f64>,

    #[arg(long)]
    min_return: Option<f64>,

    #[arg(long)]
    max_count: Option<usize>,

    #[arg(long)]
    policy: Option<LiquidityPolicy>,

    #[arg(long)]
    max_solutions: Option<usize>,

    /// Portfolios to print.
    #[arg(long, conflicts_with = "all")]
    top: Option<usize>,

    /// Print every portfolio found.
    #[arg(long)]
    all: bool,

    #[arg(long)]
    timeout_ms: Option<u64>,

    #[arg(long)]
    parallel: bool,

    #[arg(long)]
    json: bool,
}

impl RunArgs {
    /// Config values, then the market-state preset, then explicit flags.
    fn constraint_params(&self, config: &AppConfig) -> Result<ConstraintParams> {
        let mut params = match self.market_state {
            Some(state) => state.preset().with_thresholds(config.thresholds),
            None => config.constraint_params()?,
        };
        if let Some(v) = self.max_risk {
            params.max_portfolio_risk = v;
        }
        if let Some(v) = self.min_return {
            params.min_portfolio_return = v;
        }
        if let Some(v) = self.max_count {
            params.max_strategy_count = v;
        }
        if let Some(v) = self.policy {
            params.liquidity_policy = v;
        }
        params.validate()?;
        Ok(params)
    }

    async fn catalog(&self, config: &AppConfig) -> Result<StrategyCatalog> {
        if let Some(path) = &self.catalog {
            return Ok(load_catalog_from_file(path)?);
        }
        if let Some(url) = &self.catalog_url {
            return Ok(fetch_catalog(url).await?);
        }
        if let Some(path) = &config.catalog.path {
            return Ok(load_catalog_from_file(path)?);
        }
        if let Some(url) = &config.catalog.url {
            return Ok(fetch_catalog(url).await?);
        }
        info!("No catalog given, using the built-in sample set");
        Ok(sample_catalog().clone())
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run_optimize(args: RunArgs, config: AppConfig) -> Result<()> {
    let params = args.constraint_params(&config)?;
    let catalog = args.catalog(&config).await?;

    let mut options = config.search_options();
    if let Some(cap) = args.max_solutions {
        options.max_solutions = Some(cap);
    }
    if args.all {
        options.top_n = None;
    } else if let Some(n) = args.top {
        options.top_n = Some(n);
    }
    let parallel = args.parallel || config.search.parallel;
    let timeout_ms = args.timeout_ms.or(config.search.timeout_ms);

    let cancel = CancelToken::new();
    if let Some(ms) = timeout_ms {
        let token = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            warn!("Search timeout of {}ms reached, cancelling", ms);
            token.cancel();
        });
    }

    let catalog_size = catalog.len();
    let started = Instant::now();
    let outcome = tokio::task::spawn_blocking(move || {
        if parallel {
            search_parallel(&catalog, &params, &options, &cancel)
        } else {
            search(&catalog, &params, &options, &cancel)
        }
    })
    .await
    .context("search task panicked")??;

    let report = RunReport::new(outcome, params, args.market_state, catalog_size, started.elapsed());
    if args.json {
        println!("{}", report.to_json()?);
    } else {
        print!("{}", report.render_text());
    }
    Ok(())
}

async fn run_analyze(args: RunArgs, config: AppConfig) -> Result<()> {
    let params = args.constraint_params(&config)?;
    let catalog = args.catalog(&config).await?;
    let screens = screen_catalog(&catalog, &params)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&screens)?);
    } else {
        print!("{}", render_screening(&screens));
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref()).context("loading configuration")?;

    match cli.command {
        Command::Optimize(args) => run_optimize(args, config).await,
        Command::Analyze(args) => run_analyze(args, config).await,
        Command::Sample => {
            println!("{}", serde_json::to_string_pretty(sample_catalog().as_slice())?);
            Ok(())
        }
    }
}
