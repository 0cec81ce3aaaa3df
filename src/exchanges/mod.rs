//! Per-exchange `ExchangeAdapter` implementations.

mod binance;
mod bitget;
mod bybit;
mod okx;

pub use binance::BinanceAdapter;
pub use bitget::BitgetAdapter;
pub use bybit::BybitAdapter;
pub use okx::OkxAdapter;

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::adapter::{ExchangeAdapter, ExchangeConfig};
use crate::error::FetchError;

pub const ALL_EXCHANGES: [&str; 4] = ["binance", "bybit", "okx", "bitget"];

/// Build an adapter by name with its stock base URL and request limits,
/// overriding the shared retry/timeout/worker knobs.
pub fn build_adapter(
    name: &str,
    max_retries: u32,
    timeout: Duration,
    max_workers: usize,
) -> Result<Arc<dyn ExchangeAdapter>, FetchError> {
    let override_knobs = |mut config: ExchangeConfig| {
        config.max_retries = max_retries;
        config.timeout = timeout;
        config.max_workers = max_workers;
        config
    };

    match name {
        "binance" => Ok(Arc::new(BinanceAdapter::new(override_knobs(
            BinanceAdapter::default_config(),
        ))?)),
        "bybit" => Ok(Arc::new(BybitAdapter::new(override_knobs(
            BybitAdapter::default_config(),
        ))?)),
        "okx" => Ok(Arc::new(OkxAdapter::new(override_knobs(
            OkxAdapter::default_config(),
        ))?)),
        "bitget" => Ok(Arc::new(BitgetAdapter::new(override_knobs(
            BitgetAdapter::default_config(),
        ))?)),
        other => Err(FetchError::Config(format!("unknown exchange: {other}"))),
    }
}

// Exchange payloads carry numbers both as JSON numbers and as quoted strings;
// these helpers accept either.

pub(crate) fn json_f64(value: &Value, field: &'static str) -> Result<f64, FetchError> {
    if let Some(v) = value.as_f64() {
        return Ok(v);
    }
    let text = value.as_str().ok_or(FetchError::ParseField {
        field,
        value: value.to_string(),
    })?;
    text.parse().map_err(|_| FetchError::ParseField {
        field,
        value: text.to_string(),
    })
}

pub(crate) fn json_i64(value: &Value, field: &'static str) -> Result<i64, FetchError> {
    if let Some(v) = value.as_i64() {
        return Ok(v);
    }
    let text = value.as_str().ok_or(FetchError::ParseField {
        field,
        value: value.to_string(),
    })?;
    text.parse().map_err(|_| FetchError::ParseField {
        field,
        value: text.to_string(),
    })
}

#[cfg(test)]
pub(crate) mod testutil {
    use std::collections::HashMap;

    use async_trait::async_trait;
    use serde_json::Value;

    use crate::http::{HttpError, HttpGet};

    /// Canned JSON responses keyed by full request URL; query parameters are
    /// ignored.
    #[derive(Default)]
    pub struct MockHttp {
        responses: HashMap<String, Value>,
    }

    impl MockHttp {
        pub fn with(mut self, url: &str, body: Value) -> Self {
            self.responses.insert(url.to_string(), body);
            self
        }
    }

    #[async_trait]
    impl HttpGet for MockHttp {
        async fn get_json(&self, url: &str, _params: &[(String, String)]) -> Result<Value, HttpError> {
            self.responses
                .get(url)
                .cloned()
                .ok_or_else(|| HttpError::Transport {
                    url: url.to_string(),
                    message: "missing mock response".to_string(),
                })
        }
    }
}
