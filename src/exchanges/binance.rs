//! Binance USDⓈ-M futures adapter (`fapi.binance.com`).
//!
//! Kline payloads are top-level arrays of 12-element arrays with numbers
//! encoded as strings; the index-price endpoint keys the instrument by
//! `pair` instead of `symbol`. Symbols are already in canonical form.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::adapter::{ExchangeAdapter, ExchangeConfig};
use crate::error::FetchError;
use crate::exchanges::{json_f64, json_i64};
use crate::http::{HttpGet, RetryClient};
use crate::records::{DataKind, Interval, KindLimits, MarketRecord};

pub struct BinanceAdapter {
    config: ExchangeConfig,
    http: Arc<dyn HttpGet>,
}

impl BinanceAdapter {
    pub const DEFAULT_BASE_URL: &'static str = "https://fapi.binance.com";

    pub fn default_config() -> ExchangeConfig {
        ExchangeConfig::new(
            Self::DEFAULT_BASE_URL,
            KindLimits {
                price_index: 1500,
                price: 1500,
                funding_rate: 1000,
                premium_index: 1500,
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

    async fn fetch_klines(
        &self,
        endpoint: &str,
        symbol_param: &str,
        symbol: &str,
        start_ms: i64,
        end_ms: i64,
        interval: Interval,
        kind: DataKind,
    ) -> Result<Vec<MarketRecord>, FetchError> {
        let params = vec![
            (symbol_param.to_string(), symbol.to_string()),
            ("interval".to_string(), interval.as_str().to_string()),
            ("startTime".to_string(), start_ms.to_string()),
            ("endTime".to_string(), end_ms.to_string()),
            ("limit".to_string(), self.limit_for(kind).to_string()),
        ];
        let payload = self.http.get_json(&self.url(endpoint), &params).await?;
        parse_kline_rows(&payload)
    }
}

fn parse_kline_rows(payload: &Value) -> Result<Vec<MarketRecord>, FetchError> {
    let rows = payload
        .as_array()
        .ok_or_else(|| FetchError::Payload("expected top-level kline array".to_string()))?;

    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        let fields = row
            .as_array()
            .ok_or_else(|| FetchError::Payload("expected kline row array".to_string()))?;
        if fields.len() < 6 {
            return Err(FetchError::Payload(format!(
                "kline row has {} fields, expected at least 6",
                fields.len()
            )));
        }

        records.push(MarketRecord::candle(
            json_i64(&fields[0], "open_time")?,
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

#[async_trait]
impl ExchangeAdapter for BinanceAdapter {
    fn exchange_name(&self) -> &'static str {
        "binance"
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
        self.fetch_klines(
            "/fapi/v1/klines",
            "symbol",
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
        self.fetch_klines(
            "/fapi/v1/indexPriceKlines",
            "pair",
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
        self.fetch_klines(
            "/fapi/v1/premiumIndexKlines",
            "symbol",
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
            ("startTime".to_string(), start_ms.to_string()),
            ("endTime".to_string(), end_ms.to_string()),
            (
                "limit".to_string(),
                self.limit_for(DataKind::FundingRate).to_string(),
            ),
        ];
        let payload = self
            .http
            .get_json(&self.url("/fapi/v1/fundingRate"), &params)
            .await?;

        let rows = payload
            .as_array()
            .ok_or_else(|| FetchError::Payload("expected funding-rate array".to_string()))?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let funding_time = row.get("fundingTime").ok_or(FetchError::ParseField {
                field: "fundingTime",
                value: row.to_string(),
            })?;
            let rate = row.get("fundingRate").ok_or(FetchError::ParseField {
                field: "fundingRate",
                value: row.to_string(),
            })?;
            records.push(MarketRecord::funding(
                json_i64(funding_time, "fundingTime")?,
                json_f64(rate, "fundingRate")?,
            ));
        }
        records.sort_by_key(|record| record.ts_ms);
        Ok(records)
    }

    async fn fetch_all_symbols(&self) -> Result<Vec<String>, FetchError> {
        let payload = self
            .http
            .get_json(&self.url("/fapi/v1/exchangeInfo"), &[])
            .await?;

        let entries = payload
            .get("symbols")
            .and_then(Value::as_array)
            .ok_or_else(|| FetchError::Payload("exchangeInfo is missing 'symbols'".to_string()))?;

        let mut symbols = Vec::new();
        for entry in entries {
            let symbol = entry
                .get("symbol")
                .and_then(Value::as_str)
                .ok_or_else(|| FetchError::ParseField {
                    field: "symbol",
                    value: entry.to_string(),
                })?;
            let status = entry.get("status").and_then(Value::as_str).unwrap_or_default();
            if status == "TRADING" && symbol.ends_with("USDT") {
                symbols.push(symbol.to_string());
            }
        }
        symbols.sort();
        Ok(symbols)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::exchanges::testutil::MockHttp;
    use crate::records::RecordValues;

    fn adapter(mock: MockHttp) -> BinanceAdapter {
        BinanceAdapter::with_http(BinanceAdapter::default_config(), Arc::new(mock))
    }

    #[tokio::test]
    async fn parses_kline_arrays_with_string_numbers() {
        let mock = MockHttp::default().with(
            "https://fapi.binance.com/fapi/v1/klines",
            json!([
                [
                    1_700_000_060_000i64, "2.0", "3.0", "1.0", "2.5", "11.0",
                    1_700_000_119_999i64, "27.5", 10, "5.0", "12.5", "0"
                ],
                [
                    1_700_000_000_000i64, "1.0", "2.0", "0.5", "1.5", "10.0",
                    1_700_000_059_999i64, "15.0", 12, "4.0", "6.0", "0"
                ]
            ]),
        );

        let records = adapter(mock)
            .fetch_price("BTCUSDT", 1_700_000_000_000, 1_700_000_120_000, Interval::M1)
            .await
            .unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].ts_ms, 1_700_000_000_000);
        assert!(matches!(
            records[0].values,
            RecordValues::Candle {
                open,
                volume: Some(volume),
                ..
            } if open == 1.0 && volume == 10.0
        ));
    }

    #[tokio::test]
    async fn funding_rows_are_floored_to_the_minute() {
        let mock = MockHttp::default().with(
            "https://fapi.binance.com/fapi/v1/fundingRate",
            json!([
                {"symbol": "BTCUSDT", "fundingTime": 1_700_000_045_123i64, "fundingRate": "0.0001"}
            ]),
        );

        let records = adapter(mock)
            .fetch_funding_rate("BTCUSDT", 1_699_999_000_000, 1_700_001_000_000)
            .await
            .unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].ts_ms % 60_000, 0);
        assert!(matches!(records[0].values, RecordValues::Funding { rate } if rate == 0.0001));
    }

    #[tokio::test]
    async fn symbol_listing_keeps_trading_usdt_pairs() {
        let mock = MockHttp::default().with(
            "https://fapi.binance.com/fapi/v1/exchangeInfo",
            json!({"symbols": [
                {"symbol": "BTCUSDT", "status": "TRADING"},
                {"symbol": "ETHBTC", "status": "TRADING"},
                {"symbol": "XYZUSDT", "status": "SETTLING"}
            ]}),
        );

        let symbols = adapter(mock).fetch_all_symbols().await.unwrap();
        assert_eq!(symbols, vec!["BTCUSDT".to_string()]);
    }

    #[tokio::test]
    async fn malformed_kline_row_is_a_payload_error() {
        let mock = MockHttp::default().with(
            "https://fapi.binance.com/fapi/v1/klines",
            json!([["1700000000000", "1.0"]]),
        );

        let err = adapter(mock)
            .fetch_price("BTCUSDT", 0, 1, Interval::M1)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Payload(_)));
    }
}
