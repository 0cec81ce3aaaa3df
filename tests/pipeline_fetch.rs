use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::tempdir;

use histfetch::{
    date_to_ms, DataKind, ExchangeAdapter, FetchError, FetchPipeline, Interval, KindLimits,
    MarketRecord, RecordValues, HOUR_MS, MINUTE_MS,
};

/// Deterministic in-memory exchange: one candle per interval step, with an
/// optional set of windows that always fail. Counts every window call so
/// tests can assert cache hits perform no fetch work.
struct MockExchange {
    limits: KindLimits,
    calls: AtomicUsize,
    failing_window_starts: HashSet<i64>,
    empty: bool,
}

impl MockExchange {
    fn new() -> Self {
        Self {
            limits: KindLimits::uniform(5),
            calls: AtomicUsize::new(0),
            failing_window_starts: HashSet::new(),
            empty: false,
        }
    }

    fn failing_at(mut self, window_start_ms: i64) -> Self {
        self.failing_window_starts.insert(window_start_ms);
        self
    }

    fn empty(mut self) -> Self {
        self.empty = true;
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn candles(&self, start_ms: i64, end_ms: i64, step_ms: i64) -> Result<Vec<MarketRecord>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_window_starts.contains(&start_ms) {
            return Err(FetchError::Payload("window poisoned".to_string()));
        }
        if self.empty {
            return Ok(Vec::new());
        }

        let mut records = Vec::new();
        let mut ts = start_ms;
        while ts <= end_ms {
            let price = (ts / step_ms) as f64;
            records.push(MarketRecord::candle(ts, price, price, price, price, Some(1.0)));
            ts += step_ms;
        }
        Ok(records)
    }
}

#[async_trait]
impl ExchangeAdapter for MockExchange {
    fn exchange_name(&self) -> &'static str {
        "mockex"
    }

    fn limit_for(&self, kind: DataKind) -> u32 {
        self.limits.limit_for(kind)
    }

    fn max_workers(&self) -> usize {
        4
    }

    async fn fetch_price(
        &self,
        _symbol: &str,
        start_ms: i64,
        end_ms: i64,
        interval: Interval,
    ) -> Result<Vec<MarketRecord>, FetchError> {
        self.candles(start_ms, end_ms, interval.millis())
    }

    async fn fetch_price_index(
        &self,
        symbol: &str,
        start_ms: i64,
        end_ms: i64,
        interval: Interval,
    ) -> Result<Vec<MarketRecord>, FetchError> {
        self.fetch_price(symbol, start_ms, end_ms, interval).await
    }

    async fn fetch_premium_index(
        &self,
        symbol: &str,
        start_ms: i64,
        end_ms: i64,
        interval: Interval,
    ) -> Result<Vec<MarketRecord>, FetchError> {
        self.fetch_price(symbol, start_ms, end_ms, interval).await
    }

    async fn fetch_funding_rate(
        &self,
        _symbol: &str,
        start_ms: i64,
        _end_ms: i64,
    ) -> Result<Vec<MarketRecord>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        // One settlement 45 seconds past the window's first minute.
        Ok(vec![MarketRecord::funding(start_ms + 45_000, 0.0001)])
    }

    async fn fetch_all_symbols(&self) -> Result<Vec<String>, FetchError> {
        Ok(vec!["BTCUSDT".to_string()])
    }
}

fn pipeline_with(adapter: Arc<MockExchange>, dir: &std::path::Path) -> FetchPipeline {
    let pipeline = FetchPipeline::new(adapter, dir);
    pipeline.ensure_layout().expect("layout should be creatable");
    pipeline
}

#[tokio::test]
async fn second_fetch_is_served_from_cache_without_network() {
    let temp = tempdir().expect("temp dir should be created");
    let adapter = Arc::new(MockExchange::new());
    let pipeline = pipeline_with(Arc::clone(&adapter), temp.path());

    let first = pipeline
        .fetch("BTCUSDT", "2025-08-01", "2025-08-02", Interval::H1, DataKind::Price)
        .await
        .expect("first fetch should succeed");
    assert!(!first.from_cache);
    assert!(!first.records.is_empty());
    let calls_after_first = adapter.calls();
    assert!(calls_after_first > 0);

    let second = pipeline
        .fetch("BTCUSDT", "2025-08-01", "2025-08-02", Interval::H1, DataKind::Price)
        .await
        .expect("second fetch should succeed");
    assert!(second.from_cache);
    assert_eq!(adapter.calls(), calls_after_first);
    assert_eq!(second.records, first.records);
}

#[tokio::test]
async fn one_failed_window_degrades_instead_of_failing() {
    let temp = tempdir().expect("temp dir should be created");
    // limit=5 at 1h interval -> windows start every 5 hours.
    let poisoned_start = date_to_ms("2025-08-01").unwrap() + 5 * HOUR_MS;
    let adapter = Arc::new(MockExchange::new().failing_at(poisoned_start));
    let pipeline = pipeline_with(Arc::clone(&adapter), temp.path());

    let outcome = pipeline
        .fetch("BTCUSDT", "2025-08-01", "2025-08-02", Interval::H1, DataKind::Price)
        .await
        .expect("partial failure should not error");

    assert!(!outcome.from_cache);
    assert!(outcome.windows_total >= 3);
    assert_eq!(outcome.windows_failed, 1);
    assert!(!outcome.records.is_empty());
    // The poisoned window's rows are absent.
    assert!(outcome
        .records
        .iter()
        .all(|record| record.ts_ms < poisoned_start || record.ts_ms > poisoned_start + 4 * HOUR_MS));
}

#[tokio::test]
async fn empty_result_is_not_written_to_cache() {
    let temp = tempdir().expect("temp dir should be created");
    let adapter = Arc::new(MockExchange::new().empty());
    let pipeline = pipeline_with(Arc::clone(&adapter), temp.path());

    let outcome = pipeline
        .fetch("BTCUSDT", "2025-08-01", "2025-08-02", Interval::H1, DataKind::Price)
        .await
        .expect("empty fetch should not error");
    assert!(outcome.records.is_empty());
    assert!(outcome.cache_path.is_none());

    // A later call goes to the network again instead of hitting a bogus
    // empty cache entry.
    let calls_before = adapter.calls();
    let retry = pipeline
        .fetch("BTCUSDT", "2025-08-01", "2025-08-02", Interval::H1, DataKind::Price)
        .await
        .expect("retry should not error");
    assert!(!retry.from_cache);
    assert!(adapter.calls() > calls_before);
}

#[tokio::test]
async fn funding_series_floors_timestamps_and_drops_interval_from_the_key() {
    let temp = tempdir().expect("temp dir should be created");
    let adapter = Arc::new(MockExchange::new());
    let pipeline = pipeline_with(Arc::clone(&adapter), temp.path());

    let outcome = pipeline
        .fetch(
            "BTCUSDT",
            "2025-08-01",
            "2025-08-02",
            Interval::M15,
            DataKind::FundingRate,
        )
        .await
        .expect("funding fetch should succeed");

    let path = outcome.cache_path.expect("funding series should be cached");
    assert!(path.ends_with("mockex/funding_rate/BTCUSDT_2025-08-01_2025-08-02.csv"));

    for record in &outcome.records {
        assert_eq!(record.ts_ms % MINUTE_MS, 0);
        assert!(matches!(record.values, RecordValues::Funding { .. }));
    }
}

#[tokio::test]
async fn cached_series_round_trips_identically() {
    let temp = tempdir().expect("temp dir should be created");
    let adapter = Arc::new(MockExchange::new());
    let pipeline = pipeline_with(Arc::clone(&adapter), temp.path());

    let written = pipeline
        .fetch("BTCUSDT", "2025-08-01", "2025-08-03", Interval::H4, DataKind::PremiumIndex)
        .await
        .expect("fetch should succeed");
    let restored = pipeline
        .fetch("BTCUSDT", "2025-08-01", "2025-08-03", Interval::H4, DataKind::PremiumIndex)
        .await
        .expect("cache read should succeed");

    assert!(restored.from_cache);
    assert_eq!(restored.records, written.records);

    let timestamps: Vec<i64> = restored.records.iter().map(|r| r.ts_ms).collect();
    let mut sorted = timestamps.clone();
    sorted.sort_unstable();
    sorted.dedup();
    assert_eq!(timestamps, sorted);
}
