//! Bulk acquisition: every data kind for every symbol listed on all four
//! exchanges over a trailing date range.
//!
//! The symbol universe is the canonicalized intersection of each exchange's
//! perpetual listings, so a series fetched here exists on every venue.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Days, Utc};
use clap::Parser;
use tracing::{error, info, warn};

use histfetch::exchanges::{build_adapter, ALL_EXCHANGES};
use histfetch::{
    common_symbols, init_logging, log_app_start, ExchangeAdapter, FetchError, FetchPipeline,
    Interval, LoggingConfig, ALL_KINDS,
};

const INTER_REQUEST_DELAY: Duration = Duration::from_millis(1_500);

#[derive(Parser)]
#[command(
    name = "fetch-all",
    about = "Fetch all data kinds for the cross-exchange symbol intersection"
)]
struct Args {
    /// Trailing range length in days, ending today (UTC)
    #[arg(long, default_value_t = 30)]
    days: u64,

    /// Candle interval
    #[arg(long, default_value = "1m")]
    interval: String,

    /// Cache/output directory
    #[arg(long, default_value = "./data")]
    output_dir: PathBuf,

    /// Concurrent window fetches per request
    #[arg(long, default_value_t = 3)]
    max_workers: usize,

    /// HTTP retry budget per window request
    #[arg(long, default_value_t = 3)]
    max_retries: u32,

    /// Per-request HTTP timeout in seconds
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,

    /// Cap the number of symbols processed (0 = no cap)
    #[arg(long, default_value_t = 0)]
    symbol_limit: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let logging = LoggingConfig::from_env();
    init_logging(&logging)?;
    log_app_start("fetch_all", &logging);

    run(args).await?;
    Ok(())
}

async fn run(args: Args) -> Result<(), FetchError> {
    let interval = Interval::parse(&args.interval)?;

    let end = Utc::now().date_naive();
    let start = end
        .checked_sub_days(Days::new(args.days))
        .ok_or_else(|| FetchError::Config(format!("invalid trailing range: {} days", args.days)))?;
    let start_date = start.format("%Y-%m-%d").to_string();
    let end_date = end.format("%Y-%m-%d").to_string();

    let mut adapters: Vec<Arc<dyn ExchangeAdapter>> = Vec::new();
    for exchange in ALL_EXCHANGES {
        match build_adapter(
            exchange,
            args.max_retries,
            Duration::from_secs(args.timeout_secs),
            args.max_workers,
        ) {
            Ok(adapter) => adapters.push(adapter),
            Err(err) => {
                error!(
                    component = "fetch_all",
                    event = "adapter.init_failed",
                    exchange,
                    error = %err
                );
            }
        }
    }
    if adapters.is_empty() {
        return Err(FetchError::Config("no exchange adapter available".to_string()));
    }

    let mut symbols = common_symbols(&adapters).await?;
    if symbols.is_empty() {
        return Err(FetchError::Config(
            "no common symbols across the configured exchanges".to_string(),
        ));
    }
    if args.symbol_limit > 0 && symbols.len() > args.symbol_limit {
        symbols.truncate(args.symbol_limit);
    }

    let total_tasks = symbols.len() * adapters.len() * ALL_KINDS.len();
    info!(
        component = "fetch_all",
        event = "run.config",
        start = %start_date,
        end = %end_date,
        interval = %interval,
        symbols = symbols.len(),
        total_tasks
    );

    let pipelines: Vec<FetchPipeline> = adapters
        .iter()
        .map(|adapter| FetchPipeline::new(Arc::clone(adapter), &args.output_dir))
        .collect();
    for pipeline in &pipelines {
        pipeline.ensure_layout()?;
    }

    let mut completed = 0usize;
    let mut failed = 0usize;
    for symbol in &symbols {
        for pipeline in &pipelines {
            for kind in ALL_KINDS {
                match pipeline
                    .fetch(symbol, &start_date, &end_date, interval, kind)
                    .await
                {
                    Ok(outcome) => {
                        completed += 1;
                        info!(
                            component = "fetch_all",
                            event = "task.done",
                            exchange = pipeline.exchange_name(),
                            symbol = %symbol,
                            kind = %kind,
                            rows = outcome.records.len(),
                            from_cache = outcome.from_cache,
                            windows_failed = outcome.windows_failed,
                            done = completed + failed,
                            total = total_tasks
                        );
                        if !outcome.from_cache {
                            tokio::time::sleep(INTER_REQUEST_DELAY).await;
                        }
                    }
                    Err(err) => {
                        failed += 1;
                        warn!(
                            component = "fetch_all",
                            event = "task.failed",
                            exchange = pipeline.exchange_name(),
                            symbol = %symbol,
                            kind = %kind,
                            error = %err
                        );
                    }
                }
            }
        }
    }

    info!(
        component = "fetch_all",
        event = "run.finish",
        completed,
        failed,
        total_tasks
    );
    Ok(())
}
