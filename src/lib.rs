//! Historical market-data acquisition for crypto derivatives exchanges.
//!
//! The crate is organized around one exchange-agnostic pipeline:
//! - `window`: split a date range into exchange-size-limited fetch windows
//! - `http`: retrying JSON GET transport shared by all adapters
//! - `orchestrator`: bounded-concurrency window execution
//! - `merge`: dedupe/sort window fragments into one series
//! - `cache`: CSV disk cache keyed by request identity
//! - `pipeline`: the composition, plus per-window failure reporting
//! - `exchanges`: Binance, Bybit, OKX and Bitget adapters behind the
//!   `ExchangeAdapter` capability trait

mod adapter;
mod cache;
mod error;
mod http;
mod merge;
mod observability;
mod orchestrator;
mod pipeline;
mod records;
mod window;

pub mod exchanges;

pub use adapter::{common_symbols, ExchangeAdapter, ExchangeConfig};
pub use cache::{CacheKey, DiskCache};
pub use error::FetchError;
pub use http::{HttpError, HttpGet, RetryClient};
pub use merge::{merge_fragments, MergeOutcome};
pub use observability::{init_logging, log_app_start, LogFormat, LoggingConfig, LoggingInitError};
pub use orchestrator::{fetch_windows, WindowResults};
pub use pipeline::{FetchOutcome, FetchPipeline};
pub use records::{
    date_to_ms, floor_to_minute_ms, format_ts_ms, parse_ts, DataKind, Interval, KindLimits,
    MarketRecord, RecordValues, ALL_INTERVALS, ALL_KINDS, DAY_MS, HOUR_MS, MINUTE_MS,
};
pub use window::{plan_windows, TimeWindow};
