//! Bitget USDT-margined futures adapter (`api.bitget.com`, mix v1).
//!
//! Contract symbols carry a product-type suffix (`BTCUSDT_UMCBL`); the
//! canonical form strips it so cross-exchange intersection works. Candle
//! granularity is expressed in seconds. The exchange has no dedicated
//! index-kline endpoint, so price-index requests are served by the
//! mark-price candles. The funding-history endpoint takes no time bounds;
//! rows are filtered to the requested window client-side.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::adapter::{ExchangeAdapter, ExchangeConfig};
use crate::error::FetchError;
use crate::exchanges::{json_f64, json_i64};
use crate::http::{HttpGet, RetryClient};
use crate::records::{DataKind, Interval, KindLimits, MarketRecord};

pub struct BitgetAdapter {
    config: ExchangeConfig,
    http: Arc<dyn HttpGet>,
    product_type: String,
}

impl BitgetAdapter {
    pub const DEFAULT_BASE_URL: &'static str = "https://api.bitget.com";
    pub const DEFAULT_PRODUCT_TYPE: &'static str = "umcbl";

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
            product_type: Self::DEFAULT_PRODUCT_TYPE.to_string(),
        }
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.config.base_url, endpoint)
    }

    fn symbol_suffix(&self) -> String {
        format!("_{}", self.product_type.to_uppercase())
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
            ("symbol".to_string(), symbol.to_string()),
            (
                "granularity".to_string(),
                (interval.millis() / 1_000).to_string(),
            ),
            ("startTime".to_string(), start_ms.to_string()),
            ("endTime".to_string(), end_ms.to_string()),
            ("productType".to_string(), self.product_type.clone()),
            ("limit".to_string(), self.limit_for(kind).to_string()),
        ];
        let payload = self.http.get_json(&self.url(endpoint), &params).await?;

        let mut records = Vec::new();
        for row in success_data(&payload)? {
            let fields = row
                .as_array()
                .ok_or_else(|| FetchError::Payload("expected candle row array".to_string()))?;
            if fields.len() < 6 {
                return Err(FetchError::Payload(format!(
                    "candle row has {} fields, expected at least 6",
                    fields.len()
                )));
            }

            records.push(MarketRecord::candle(
                json_i64(&fields[0], "ts")?,
                json_f64(&fields[1], "open")?,
                json_f64(&fields[2], "high")?,
                json_f64(&fields[3], "low")?,
                json_f64(&fields[4], "close")?,
                Some(json_f64(&fields[5], "volume")?),
            ));
        }
        records.sort_by_key(|record| record.ts_ms);
        Ok(records)
    }
}

/// Unwrap the `{code, msg, data}` envelope; only `msg == "success"` carries
/// data.
fn success_data(payload: &Value) -> Result<Vec<Value>, FetchError> {
    let msg = payload.get("msg").and_then(Value::as_str).unwrap_or_default();
    if msg != "success" {
        return Err(FetchError::Payload(format!("bitget returned msg '{msg}'")));
    }
    Ok(payload
        .get("data")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default())
}

#[async_trait]
impl ExchangeAdapter for BitgetAdapter {
    fn exchange_name(&self) -> &'static str {
        "bitget"
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
            "/api/mix/v1/market/candles",
            symbol,
            start_ms,
            end_ms,
            interval,
            DataKind::Price,
        )
        .await
    }

    /// Bitget publishes no standalone index klines; mark-price candles stand
    /// in for the index series.
    async fn fetch_price_index(
        &self,
        symbol: &str,
        start_ms: i64,
        end_ms: i64,
        interval: Interval,
    ) -> Result<Vec<MarketRecord>, FetchError> {
        self.fetch_candles(
            "/api/mix/v1/market/mark-candles",
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
            "/api/mix/v1/market/mark-candles",
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
            ("symbol".to_string(), symbol.to_string()),
            ("productType".to_string(), self.product_type.clone()),
            (
                "pageSize".to_string(),
                self.limit_for(DataKind::FundingRate).to_string(),
            ),
        ];
        let payload = self
            .http
            .get_json(&self.url("/api/mix/v1/market/historyFundRate"), &params)
            .await?;

        let mut records = Vec::new();
        for row in success_data(&payload)? {
            // The field has been published as both fundingTime and
            // fundingRateTime.
            let ts_value = row
                .get("fundingTime")
                .or_else(|| row.get("fundingRateTime"))
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
        let params = vec![("productType".to_string(), self.product_type.clone())];
        let payload = self
            .http
            .get_json(&self.url("/api/mix/v1/market/contracts"), &params)
            .await?;

        let mut symbols = Vec::new();
        for row in success_data(&payload)? {
            if let Some(symbol) = row.get("symbol").and_then(Value::as_str) {
                symbols.push(symbol.to_string());
            }
        }
        symbols.sort();
        Ok(symbols)
    }

    async fn canonicalize_symbol(&self, symbol: &str) -> Result<String, FetchError> {
        let suffix = self.symbol_suffix();
        Ok(symbol
            .strip_suffix(&suffix)
            .unwrap_or(symbol)
            .to_string())
    }

    async fn translate_symbol(&self, symbol: &str) -> Result<String, FetchError> {
        let suffix = self.symbol_suffix();
        if symbol.ends_with(&suffix) {
            Ok(symbol.to_string())
        } else {
            Ok(format!("{symbol}{suffix}"))
        }
    }
}
