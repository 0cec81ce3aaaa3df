//! Fetch every requested data kind for one symbol across a set of exchanges.
//!
//! Structural problems (bad dates, unknown kinds, unsupported intervals)
//! exit non-zero; per-exchange fetch failures are logged and skipped so one
//! misbehaving venue does not sink the rest of the run.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};

use histfetch::exchanges::{build_adapter, ALL_EXCHANGES};
use histfetch::{
    date_to_ms, init_logging, log_app_start, DataKind, FetchError, FetchPipeline, Interval,
    LoggingConfig, ALL_KINDS,
};

/// Pause between live (non-cached) requests so back-to-back pipeline runs
/// stay friendly to the public endpoints.
const INTER_REQUEST_DELAY: Duration = Duration::from_millis(1_500);

#[derive(Parser)]
#[command(name = "fetch-single", about = "Fetch historical market data for one symbol")]
struct Args {
    /// Trading pair in canonical form, e.g. BTCUSDT
    symbol: String,
    /// Start date, YYYY-MM-DD (UTC)
    start_date: String,
    /// End date, YYYY-MM-DD (UTC)
    end_date: String,

    /// Exchanges to query
    #[arg(long, value_delimiter = ',', default_values_t = ALL_EXCHANGES.map(String::from))]
    exchanges: Vec<String>,

    /// Data kinds to fetch (price, price_index, premium_index, funding_rate)
    #[arg(long, value_delimiter = ',')]
    kinds: Option<Vec<String>>,

    /// Candle interval
    #[arg(long, default_value = "1m")]
    interval: String,

    /// Cache/output directory
    #[arg(long, default_value = "./data")]
    output_dir: PathBuf,

    /// Concurrent window fetches per request
    #[arg(long, default_value_t = 5)]
    max_workers: usize,

    /// HTTP retry budget per window request
    #[arg(long, default_value_t = 3)]
    max_retries: u32,

    /// Per-request HTTP timeout in seconds
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let logging = LoggingConfig::from_env();
    init_logging(&logging)?;
    log_app_start("fetch_single", &logging);

    run(args).await?;
    Ok(())
}

async fn run(args: Args) -> Result<(), FetchError> {
    let interval = Interval::parse(&args.interval)?;
    let kinds = match &args.kinds {
        Some(raw) => raw
            .iter()
            .map(|k| DataKind::parse(k))
            .collect::<Result<Vec<_>, _>>()?,
        None => ALL_KINDS.to_vec(),
    };

    let start_ms = date_to_ms(&args.start_date)?;
    let end_ms = date_to_ms(&args.end_date)?;
    if start_ms >= end_ms {
        return Err(FetchError::Config(format!(
            "start date {} must precede end date {}",
            args.start_date, args.end_date
        )));
    }

    info!(
        component = "fetch_single",
        event = "run.config",
        symbol = %args.symbol,
        start = %args.start_date,
        end = %args.end_date,
        interval = %interval,
        exchanges = ?args.exchanges,
        output_dir = %args.output_dir.display()
    );

    for exchange in &args.exchanges {
        let adapter = match build_adapter(
            exchange,
            args.max_retries,
            Duration::from_secs(args.timeout_secs),
            args.max_workers,
        ) {
            Ok(adapter) => adapter,
            Err(FetchError::Config(message)) => return Err(FetchError::Config(message)),
            Err(err) => {
                error!(
                    component = "fetch_single",
                    event = "adapter.init_failed",
                    exchange = %exchange,
                    error = %err
                );
                continue;
            }
        };

        let pipeline = FetchPipeline::new(Arc::clone(&adapter), &args.output_dir);
        pipeline.ensure_layout()?;

        for kind in &kinds {
            match pipeline
                .fetch(&args.symbol, &args.start_date, &args.end_date, interval, *kind)
                .await
            {
                Ok(outcome) => {
                    info!(
                        component = "fetch_single",
                        event = "task.done",
                        exchange = %exchange,
                        kind = %kind,
                        rows = outcome.records.len(),
                        from_cache = outcome.from_cache,
                        windows_failed = outcome.windows_failed
                    );
                    if !outcome.from_cache {
                        tokio::time::sleep(INTER_REQUEST_DELAY).await;
                    }
                }
                Err(err) => {
                    error!(
                        component = "fetch_single",
                        event = "task.failed",
                        exchange = %exchange,
                        kind = %kind,
                        error = %err
                    );
                }
            }
        }
    }

    Ok(())
}
