//! Crate-wide error type.
//!
//! Window-level transport and payload errors are swallowed and counted at the
//! orchestrator boundary; everything else propagates to the caller.

use thiserror::Error;

use crate::http::HttpError;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] HttpError),
    #[error("unsupported interval: {0}")]
    UnsupportedInterval(String),
    #[error("interval {interval} is not offered by {exchange}")]
    ExchangeInterval {
        exchange: &'static str,
        interval: String,
    },
    #[error("unknown data kind: {0}")]
    UnknownDataKind(String),
    #[error("invalid date '{value}': expected YYYY-MM-DD")]
    InvalidDate { value: String },
    #[error("unexpected payload shape: {0}")]
    Payload(String),
    #[error("failed to parse field {field} value '{value}'")]
    ParseField { field: &'static str, value: String },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("invalid configuration: {0}")]
    Config(String),
}
