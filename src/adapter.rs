//! Exchange capability interface consumed by the fetch pipeline.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::error::FetchError;
use crate::records::{DataKind, Interval, KindLimits, MarketRecord};

/// Process-level configuration for one adapter instance.
#[derive(Debug, Clone)]
pub struct ExchangeConfig {
    pub base_url: String,
    pub limits: KindLimits,
    pub max_retries: u32,
    pub timeout: Duration,
    pub max_workers: usize,
}

impl ExchangeConfig {
    pub fn new(base_url: impl Into<String>, limits: KindLimits) -> Self {
        Self {
            base_url: base_url.into(),
            limits,
            max_retries: 3,
            timeout: Duration::from_secs(30),
            max_workers: 5,
        }
    }
}

/// One implementation per exchange. The pipeline is generic over this trait
/// and never over a concrete exchange type.
#[async_trait]
pub trait ExchangeAdapter: Send + Sync {
    fn exchange_name(&self) -> &'static str;

    fn limit_for(&self, kind: DataKind) -> u32;

    fn max_workers(&self) -> usize;

    /// Reject display intervals the exchange vocabulary cannot express.
    /// Structural: checked before any window is submitted.
    fn check_interval(&self, _interval: Interval) -> Result<(), FetchError> {
        Ok(())
    }

    async fn fetch_price(
        &self,
        symbol: &str,
        start_ms: i64,
        end_ms: i64,
        interval: Interval,
    ) -> Result<Vec<MarketRecord>, FetchError>;

    async fn fetch_price_index(
        &self,
        symbol: &str,
        start_ms: i64,
        end_ms: i64,
        interval: Interval,
    ) -> Result<Vec<MarketRecord>, FetchError>;

    async fn fetch_premium_index(
        &self,
        symbol: &str,
        start_ms: i64,
        end_ms: i64,
        interval: Interval,
    ) -> Result<Vec<MarketRecord>, FetchError>;

    async fn fetch_funding_rate(
        &self,
        symbol: &str,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<MarketRecord>, FetchError>;

    /// Exchange-native listing of tradable USDT-quoted perpetual symbols.
    async fn fetch_all_symbols(&self) -> Result<Vec<String>, FetchError>;

    /// Exchange-native form -> cross-exchange canonical form. Identity by
    /// default; must be idempotent.
    async fn canonicalize_symbol(&self, symbol: &str) -> Result<String, FetchError> {
        Ok(symbol.to_string())
    }

    /// Canonical form -> exchange-native form. Identity by default; must be
    /// idempotent on already-native input.
    async fn translate_symbol(&self, symbol: &str) -> Result<String, FetchError> {
        Ok(symbol.to_string())
    }

    /// Dispatch a window fetch for the given kind.
    async fn fetch_kind(
        &self,
        kind: DataKind,
        symbol: &str,
        start_ms: i64,
        end_ms: i64,
        interval: Interval,
    ) -> Result<Vec<MarketRecord>, FetchError> {
        match kind {
            DataKind::Price => self.fetch_price(symbol, start_ms, end_ms, interval).await,
            DataKind::PriceIndex => self.fetch_price_index(symbol, start_ms, end_ms, interval).await,
            DataKind::PremiumIndex => self.fetch_premium_index(symbol, start_ms, end_ms, interval).await,
            DataKind::FundingRate => self.fetch_funding_rate(symbol, start_ms, end_ms).await,
        }
    }
}

/// Canonical symbols listed by every one of the given exchanges, sorted.
///
/// An exchange whose listing call fails is logged and skipped rather than
/// failing the whole intersection.
pub async fn common_symbols(adapters: &[Arc<dyn ExchangeAdapter>]) -> Result<Vec<String>, FetchError> {
    let mut sets: Vec<BTreeSet<String>> = Vec::new();

    for adapter in adapters {
        let name = adapter.exchange_name();
        let native = match adapter.fetch_all_symbols().await {
            Ok(symbols) => symbols,
            Err(err) => {
                warn!(
                    component = "symbols",
                    event = "symbols.listing_failed",
                    exchange = name,
                    error = %err
                );
                continue;
            }
        };

        let mut canonical = BTreeSet::new();
        for symbol in native {
            canonical.insert(adapter.canonicalize_symbol(&symbol).await?);
        }
        info!(
            component = "symbols",
            event = "symbols.listed",
            exchange = name,
            count = canonical.len()
        );
        if !canonical.is_empty() {
            sets.push(canonical);
        }
    }

    let Some((first, rest)) = sets.split_first() else {
        return Ok(Vec::new());
    };

    let common: Vec<String> = first
        .iter()
        .filter(|symbol| rest.iter().all(|set| set.contains(*symbol)))
        .cloned()
        .collect();

    info!(
        component = "symbols",
        event = "symbols.intersection",
        exchanges = sets.len(),
        count = common.len()
    );
    Ok(common)
}
