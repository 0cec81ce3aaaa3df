//! OKX perpetual-swap adapter (`www.okx.com`).
//!
//! OKX instruments use dash-separated ids (`BTC-USDT-SWAP`), so symbol
//! canonicalization and translation go through a lookup table built from the
//! instruments endpoint. The table is populated at most once per adapter
//! instance and immutable afterwards; concurrent first callers are
//! serialized by the cell, never racing a half-built map.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::adapter::{ExchangeAdapter, ExchangeConfig};
use crate::error::FetchError;
use crate::exchanges::{json_f64, json_i64};
use crate::http::{HttpGet, RetryClient};
use crate::records::{DataKind, Interval, KindLimits, MarketRecord};

pub struct OkxAdapter {
    config: ExchangeConfig,
    http: Arc<dyn HttpGet>,
    /// canonical symbol -> instId, built lazily from the instruments listing.
    symbol_map: OnceCell<HashMap<String, String>>,
}

impl OkxAdapter {
    pub const DEFAULT_BASE_URL: &'static str = "https://www.okx.com";

    pub fn default_config() -> ExchangeConfig {
        ExchangeConfig::new(Self::DEFAULT_BASE_URL, KindLimits::uniform(100))
    }

    pub fn new(config: ExchangeConfig) -> Result<Self, FetchError> {
        let http = Arc::new(RetryClient::new(config.timeout, config.max_retries)?);
        Ok(Self::with_http(config, http))
    }

    pub fn with_http(config: ExchangeConfig, http: Arc<dyn HttpGet>) -> Self {
        Self {
            config,
            http,
            symbol_map: OnceCell::new(),
        }
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.config.base_url, endpoint)
    }

    async fn symbol_map(&self) -> Result<&HashMap<String, String>, FetchError> {
        self.symbol_map
            .get_or_try_init(|| async {
                let params = vec![("instType".to_string(), "SWAP".to_string())];
                let payload = self
                    .http
                    .get_json(&self.url("/api/v5/public/instruments"), &params)
                    .await?;

                let mut map = HashMap::new();
                for entry in ok_data(&payload)? {
                    let Some(inst_id) = entry.get("instId").and_then(Value::as_str) else {
                        continue;
                    };
                    map.insert(to_canonical(inst_id), inst_id.to_string());
                }
                debug!(
                    component = "okx",
                    event = "okx.symbol_map.built",
                    instruments = map.len()
                );
                Ok::<_, FetchError>(map)
            })
            .await
    }

    async fn fetch_candles(
        &self,
        endpoint: &str,
        symbol: &str,
        start_ms: i64,
        end_ms: i64,
        interval: Interval,
        kind: DataKind,
    ) -> Result<Vec<MarketRecord>, FetchError> {
        let params = vec![
            ("instId".to_string(), symbol.to_string()),
            ("bar".to_string(), bar_code(interval).to_string()),
            ("after".to_string(), start_ms.to_string()),
            ("before".to_string(), end_ms.to_string()),
            ("limit".to_string(), self.limit_for(kind).to_string()),
        ];
        let payload = self.http.get_json(&self.url(endpoint), &params).await?;

        let mut records = Vec::new();
        for row in ok_data(&payload)? {
            let fields = row
                .as_array()
                .ok_or_else(|| FetchError::Payload("expected candle row array".to_string()))?;
            if fields.len() < 5 {
                return Err(FetchError::Payload(format!(
                    "candle row has {} fields, expected at least 5",
                    fields.len()
                )));
            }

            let ts_ms = json_i64(&fields[0], "ts")?;
            if ts_ms < start_ms || ts_ms > end_ms {
                continue;
            }
            // Price candles carry volume at index 5; index/mark candles end
            // with the confirm flag instead.
            let volume = if fields.len() >= 9 {
                Some(json_f64(&fields[5], "volume")?)
            } else {
                None
            };
            records.push(MarketRecord::candle(
                ts_ms,
                json_f64(&fields[1], "open")?,
                json_f64(&fields[2], "high")?,
                json_f64(&fields[3], "low")?,
                json_f64(&fields[4], "close")?,
                volume,
            ));
        }
        // OKX returns newest-first.
        records.sort_by_key(|record| record.ts_ms);
        Ok(records)
    }
}

/// OKX bar codes keep minute bars lowercase and uppercase everything else.
fn bar_code(interval: Interval) -> &'static str {
    match interval {
        Interval::M1 => "1m",
        Interval::M3 => "3m",
        Interval::M5 => "5m",
        Interval::M15 => "15m",
        Interval::M30 => "30m",
        Interval::H1 => "1H",
        Interval::H2 => "2H",
        Interval::H4 => "4H",
        Interval::H6 => "6H",
        Interval::H8 => "8H",
        Interval::H12 => "12H",
        Interval::D1 => "1D",
        Interval::D3 => "3D",
        Interval::W1 => "1W",
        Interval::Mo1 => "1M",
    }
}

/// Unwrap the `{code, msg, data}` envelope; anything but code "0" is an
/// error payload.
fn ok_data(payload: &Value) -> Result<Vec<Value>, FetchError> {
    let code = payload.get("code").and_then(Value::as_str).unwrap_or_default();
    if code != "0" {
        let msg = payload.get("msg").and_then(Value::as_str).unwrap_or_default();
        return Err(FetchError::Payload(format!(
            "okx returned code '{code}': {msg}"
        )));
    }
    Ok(payload
        .get("data")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default())
}

/// `BTC-USDT-SWAP` -> `BTCUSDT`.
fn to_canonical(inst_id: &str) -> String {
    let parts: Vec<&str> = inst_id.split('-').collect();
    if parts.len() >= 2 {
        format!("{}{}", parts[0], parts[1])
    } else {
        inst_id.replace('-', "")
    }
}

#[async_trait]
impl ExchangeAdapter for OkxAdapter {
    fn exchange_name(&self) -> &'static str {
        "okx"
    }

    fn limit_for(&self, kind: DataKind) -> u32 {
        self.config.limits.limit_for(kind)
    }

    fn max_workers(&self) -> usize {
        self.config.max_workers
    }

    async fn fetch_price(
        &self,
        symbol: &str,
        start_ms: i64,
        end_ms: i64,
        interval: Interval,
    ) -> Result<Vec<MarketRecord>, FetchError> {
        self.fetch_candles(
            "/api/v5/market/history-candles",
            symbol,
            start_ms,
            end_ms,
            interval,
            DataKind::Price,
        )
        .await
    }

    async fn fetch_price_index(
        &self,
        symbol: &str,
        start_ms: i64,
        end_ms: i64,
        interval: Interval,
    ) -> Result<Vec<MarketRecord>, FetchError> {
        self.fetch_candles(
            "/api/v5/market/history-index-candles",
            symbol,
            start_ms,
            end_ms,
            interval,
            DataKind::PriceIndex,
        )
        .await
    }

    async fn fetch_premium_index(
        &self,
        symbol: &str,
        start_ms: i64,
        end_ms: i64,
        interval: Interval,
    ) -> Result<Vec<MarketRecord>, FetchError> {
        self.fetch_candles(
            "/api/v5/market/history-mark-price-candles",
            symbol,
            start_ms,
            end_ms,
            interval,
            DataKind::PremiumIndex,
        )
        .await
    }

    async fn fetch_funding_rate(
        &self,
        symbol: &str,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<MarketRecord>, FetchError> {
        let params = vec![
            ("instId".to_string(), symbol.to_string()),
            ("after".to_string(), start_ms.to_string()),
            ("before".to_string(), end_ms.to_string()),
            (
                "limit".to_string(),
                self.limit_for(DataKind::FundingRate).to_string(),
            ),
        ];
        let payload = self
            .http
            .get_json(&self.url("/api/v5/public/funding-rate-history"), &params)
            .await?;

        let mut records = Vec::new();
        for row in ok_data(&payload)? {
            // Older payloads name the field fundingRateTimestamp.
            let ts_value = row
                .get("fundingTime")
                .or_else(|| row.get("fundingRateTimestamp"))
                .ok_or(FetchError::ParseField {
                    field: "fundingTime",
                    value: row.to_string(),
                })?;
            let rate = row.get("fundingRate").ok_or(FetchError::ParseField {
                field: "fundingRate",
                value: row.to_string(),
            })?;

            let record = MarketRecord::funding(
                json_i64(ts_value, "fundingTime")?,
                json_f64(rate, "fundingRate")?,
            );
            if record.ts_ms < start_ms || record.ts_ms > end_ms {
                continue;
            }
            records.push(record);
        }
        records.sort_by_key(|record| record.ts_ms);
        Ok(records)
    }

    async fn fetch_all_symbols(&self) -> Result<Vec<String>, FetchError> {
        let map = self.symbol_map().await?;
        let mut symbols: Vec<String> = map.keys().cloned().collect();
        symbols.sort();
        Ok(symbols)
    }

    async fn canonicalize_symbol(&self, symbol: &str) -> Result<String, FetchError> {
        let map = self.symbol_map().await?;
        if map.contains_key(symbol) {
            return Ok(symbol.to_string());
        }
        if map.values().any(|inst_id| inst_id == symbol) {
            return Ok(to_canonical(symbol));
        }
        let candidate = symbol.replace('-', "");
        if map.contains_key(&candidate) {
            return Ok(candidate);
        }
        Ok(symbol.to_string())
    }

    async fn translate_symbol(&self, symbol: &str) -> Result<String, FetchError> {
        let map = self.symbol_map().await?;
        if map.values().any(|inst_id| inst_id == symbol) {
            return Ok(symbol.to_string());
        }
        if let Some(inst_id) = map.get(symbol) {
            return Ok(inst_id.clone());
        }
        let candidate = symbol.replace('-', "");
        if let Some(inst_id) = map.get(&candidate) {
            return Ok(inst_id.clone());
        }
        Ok(symbol.to_string())
    }
}
