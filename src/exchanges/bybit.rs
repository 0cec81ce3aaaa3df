//! Bybit v5 linear-perpetual adapter (`api.bybit.com`).
//!
//! Every endpoint wraps its payload in `{retCode, retMsg, result}` and
//! returns kline lists newest-first. Price klines carry seven columns,
//! index/premium klines only five (no volume).

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::adapter::{ExchangeAdapter, ExchangeConfig};
use crate::error::FetchError;
use crate::exchanges::{json_f64, json_i64};
use crate::http::{HttpGet, RetryClient};
use crate::records::{DataKind, Interval, KindLimits, MarketRecord};

pub struct BybitAdapter {
    config: ExchangeConfig,
    http: Arc<dyn HttpGet>,
}

impl BybitAdapter {
    pub const DEFAULT_BASE_URL: &'static str = "https://api.bybit.com";

    pub fn default_config() -> ExchangeConfig {
        ExchangeConfig::new(
            Self::DEFAULT_BASE_URL,
            KindLimits {
                price_index: 1000,
                price: 1000,
                funding_rate: 200,
                premium_index: 1000,
            },
        )
    }

    pub fn new(config: ExchangeConfig) -> Result<Self, FetchError> {
        let http = Arc::new(RetryClient::new(config.timeout, config.max_retries)?);
        Ok(Self::with_http(config, http))
    }

    pub fn with_http(config: ExchangeConfig, http: Arc<dyn HttpGet>) -> Self {
        Self { config, http }
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.config.base_url, endpoint)
    }

    async fn fetch_kline_list(
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
            ("interval".to_string(), interval_code(interval)?.to_string()),
            ("start".to_string(), start_ms.to_string()),
            ("end".to_string(), end_ms.to_string()),
            ("limit".to_string(), self.limit_for(kind).to_string()),
        ];
        let payload = self.http.get_json(&self.url(endpoint), &params).await?;
        parse_kline_list(&result_list(&payload)?)
    }
}

/// Bybit v5 bar codes: minutes as bare numbers, hours in minutes, then
/// `D`/`W`/`M`. The vocabulary has no 8-hour or 3-day bar.
fn interval_code(interval: Interval) -> Result<&'static str, FetchError> {
    match interval {
        Interval::M1 => Ok("1"),
        Interval::M3 => Ok("3"),
        Interval::M5 => Ok("5"),
        Interval::M15 => Ok("15"),
        Interval::M30 => Ok("30"),
        Interval::H1 => Ok("60"),
        Interval::H2 => Ok("120"),
        Interval::H4 => Ok("240"),
        Interval::H6 => Ok("360"),
        Interval::H12 => Ok("720"),
        Interval::D1 => Ok("D"),
        Interval::W1 => Ok("W"),
        Interval::Mo1 => Ok("M"),
        Interval::H8 | Interval::D3 => Err(FetchError::ExchangeInterval {
            exchange: "bybit",
            interval: interval.as_str().to_string(),
        }),
    }
}

/// Unwrap the `{retCode, retMsg, result: {list}}` envelope.
fn result_list(payload: &Value) -> Result<Vec<Value>, FetchError> {
    let ret_msg = payload.get("retMsg").and_then(Value::as_str).unwrap_or_default();
    if ret_msg != "OK" {
        return Err(FetchError::Payload(format!(
            "bybit returned retMsg '{ret_msg}'"
        )));
    }
    let list = payload
        .get("result")
        .and_then(|result| result.get("list"))
        .and_then(Value::as_array)
        .ok_or_else(|| FetchError::Payload("bybit response is missing result.list".to_string()))?;
    Ok(list.clone())
}

fn parse_kline_list(rows: &[Value]) -> Result<Vec<MarketRecord>, FetchError> {
    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        let fields = row
            .as_array()
            .ok_or_else(|| FetchError::Payload("expected kline row array".to_string()))?;
        if fields.len() < 5 {
            return Err(FetchError::Payload(format!(
                "kline row has {} fields, expected at least 5",
                fields.len()
            )));
        }

        let volume = if fields.len() >= 6 {
            Some(json_f64(&fields[5], "volume")?)
        } else {
            None
        };
        records.push(MarketRecord::candle(
            json_i64(&fields[0], "open_time")?,
            json_f64(&fields[1], "open")?,
            json_f64(&fields[2], "high")?,
            json_f64(&fields[3], "low")?,
            json_f64(&fields[4], "close")?,
            volume,
        ));
    }
    // Bybit lists are newest-first.
    records.sort_by_key(|record| record.ts_ms);
    Ok(records)
}

#[async_trait]
impl ExchangeAdapter for BybitAdapter {
    fn exchange_name(&self) -> &'static str {
        "bybit"
    }

    fn limit_for(&self, kind: DataKind) -> u32 {
        self.config.limits.limit_for(kind)
    }

    fn max_workers(&self) -> usize {
        self.config.max_workers
    }

    fn check_interval(&self, interval: Interval) -> Result<(), FetchError> {
        interval_code(interval).map(|_| ())
    }

    async fn fetch_price(
        &self,
        symbol: &str,
        start_ms: i64,
        end_ms: i64,
        interval: Interval,
    ) -> Result<Vec<MarketRecord>, FetchError> {
        self.fetch_kline_list(
            "/v5/market/kline",
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
        self.fetch_kline_list(
            "/v5/market/index-price-kline",
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
        self.fetch_kline_list(
            "/v5/market/premium-index-price-kline",
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
            ("category".to_string(), "linear".to_string()),
            ("symbol".to_string(), symbol.to_string()),
            ("start".to_string(), start_ms.to_string()),
            ("end".to_string(), end_ms.to_string()),
            (
                "limit".to_string(),
                self.limit_for(DataKind::FundingRate).to_string(),
            ),
        ];
        let payload = self
            .http
            .get_json(&self.url("/v5/market/funding/history"), &params)
            .await?;

        let rows = result_list(&payload)?;
        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            let ts = row
                .get("fundingRateTimestamp")
                .ok_or(FetchError::ParseField {
                    field: "fundingRateTimestamp",
                    value: row.to_string(),
                })?;
            let rate = row.get("fundingRate").ok_or(FetchError::ParseField {
                field: "fundingRate",
                value: row.to_string(),
            })?;
            records.push(MarketRecord::funding(
                json_i64(ts, "fundingRateTimestamp")?,
                json_f64(rate, "fundingRate")?,
            ));
        }
        records.sort_by_key(|record| record.ts_ms);
        Ok(records)
    }

    async fn fetch_all_symbols(&self) -> Result<Vec<String>, FetchError> {
        let params = vec![("category".to_string(), "linear".to_string())];
        let payload = self
            .http
            .get_json(&self.url("/v5/market/instruments-info"), &params)
            .await?;

        let rows = result_list(&payload)?;
        let mut symbols = Vec::new();
        for row in &rows {
            if let Some(symbol) = row.get("symbol").and_then(Value::as_str) {
                if symbol.ends_with("USDT") {
                    symbols.push(symbol.to_string());
                }
            }
        }
        symbols.sort();
        Ok(symbols)
    }
}
