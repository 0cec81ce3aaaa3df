//! The fetch–paginate–merge–cache pipeline.
//!
//! `fetch` is the single entry point: cache lookup, window planning,
//! bounded-concurrency fetching, merging and cache write, in that order.
//! Window-level failures degrade the result instead of failing it; they are
//! surfaced through [`FetchOutcome::windows_failed`] so a caller can tell a
//! complete series from one with silent gaps.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};

use crate::adapter::ExchangeAdapter;
use crate::cache::{CacheKey, DiskCache};
use crate::error::FetchError;
use crate::merge::merge_fragments;
use crate::orchestrator::fetch_windows;
use crate::records::{date_to_ms, DataKind, Interval, MarketRecord};
use crate::window::plan_windows;

#[derive(Debug)]
pub struct FetchOutcome {
    /// Deduplicated series in ascending timestamp order.
    pub records: Vec<MarketRecord>,
    pub from_cache: bool,
    pub windows_total: usize,
    /// Windows that exhausted their retries or returned malformed payloads.
    /// Non-zero means the series may have gaps even though it looks normal.
    pub windows_failed: usize,
    /// Set when the series was written to (or read from) the cache.
    pub cache_path: Option<PathBuf>,
}

pub struct FetchPipeline {
    adapter: Arc<dyn ExchangeAdapter>,
    cache: DiskCache,
    max_workers: usize,
}

impl FetchPipeline {
    pub fn new(adapter: Arc<dyn ExchangeAdapter>, out_dir: impl Into<PathBuf>) -> Self {
        let max_workers = adapter.max_workers();
        Self {
            adapter,
            cache: DiskCache::new(out_dir),
            max_workers,
        }
    }

    pub fn exchange_name(&self) -> &'static str {
        self.adapter.exchange_name()
    }

    /// Create the on-disk directory layout for this exchange. Explicit so
    /// directory side effects stay out of construction.
    pub fn ensure_layout(&self) -> Result<(), FetchError> {
        self.cache.ensure_layout(self.adapter.exchange_name())
    }

    pub async fn fetch(
        &self,
        symbol: &str,
        start_date: &str,
        end_date: &str,
        interval: Interval,
        kind: DataKind,
    ) -> Result<FetchOutcome, FetchError> {
        let exchange = self.adapter.exchange_name();
        let canonical = self.adapter.canonicalize_symbol(symbol).await?;
        let key = CacheKey {
            exchange: exchange.to_string(),
            symbol: canonical,
            kind,
            start_date: start_date.to_string(),
            end_date: end_date.to_string(),
            interval,
        };

        if self.cache.exists(&key) {
            let path = self.cache.path_for(&key);
            let records = self.cache.read(&key)?;
            info!(
                component = "pipeline",
                event = "fetch.cache_hit",
                exchange,
                symbol = %key.symbol,
                kind = %kind,
                rows = records.len(),
                path = %path.display()
            );
            return Ok(FetchOutcome {
                records,
                from_cache: true,
                windows_total: 0,
                windows_failed: 0,
                cache_path: Some(path),
            });
        }

        if kind.keyed_by_interval() {
            self.adapter.check_interval(interval)?;
        }
        let start_ms = date_to_ms(start_date)?;
        let end_ms = date_to_ms(end_date)?;
        let api_symbol = self.adapter.translate_symbol(symbol).await?;

        let interval_ms = kind.pagination_interval_ms(interval);
        let limit = self.adapter.limit_for(kind);
        let windows = plan_windows(start_ms, end_ms, limit, interval_ms);
        info!(
            component = "pipeline",
            event = "fetch.start",
            exchange,
            symbol = %api_symbol,
            kind = %kind,
            interval = %interval,
            windows = windows.len(),
            max_workers = self.max_workers
        );

        let results = fetch_windows(&windows, self.max_workers, |window| {
            self.adapter
                .fetch_kind(kind, &api_symbol, window.start_ms, window.end_ms, interval)
        })
        .await;

        let merged = merge_fragments(results.fragments);
        if merged.records.is_empty() {
            // Nothing cacheable: either every window failed or the range is
            // genuinely empty. Skipping the write lets a later call retry.
            warn!(
                component = "pipeline",
                event = "fetch.empty",
                exchange,
                symbol = %key.symbol,
                kind = %kind,
                windows_total = results.windows_total,
                windows_failed = results.windows_failed
            );
            return Ok(FetchOutcome {
                records: Vec::new(),
                from_cache: false,
                windows_total: results.windows_total,
                windows_failed: results.windows_failed,
                cache_path: None,
            });
        }

        let path = self.cache.write(&key, &merged.records)?;
        info!(
            component = "pipeline",
            event = "fetch.finish",
            exchange,
            symbol = %key.symbol,
            kind = %kind,
            rows = merged.records.len(),
            duplicates_removed = merged.duplicates_removed,
            windows_total = results.windows_total,
            windows_failed = results.windows_failed
        );

        Ok(FetchOutcome {
            records: merged.records,
            from_cache: false,
            windows_total: results.windows_total,
            windows_failed: results.windows_failed,
            cache_path: Some(path),
        })
    }
}
