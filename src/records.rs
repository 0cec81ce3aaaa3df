//! Common time-indexed record model shared by every exchange adapter.
//!
//! All internal timestamps are UTC millisecond epochs (`i64`). Funding-rate
//! events are floored to the minute on construction so records from different
//! exchanges line up despite sub-minute settlement jitter.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::FetchError;

pub const MINUTE_MS: i64 = 60 * 1_000;
pub const HOUR_MS: i64 = 60 * MINUTE_MS;
pub const DAY_MS: i64 = 24 * HOUR_MS;

/// Candle interval vocabulary accepted at the request boundary.
///
/// Adapters translate these into their exchange-native bar codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interval {
    M1,
    M3,
    M5,
    M15,
    M30,
    H1,
    H2,
    H4,
    H6,
    H8,
    H12,
    D1,
    D3,
    W1,
    Mo1,
}

pub const ALL_INTERVALS: [Interval; 15] = [
    Interval::M1,
    Interval::M3,
    Interval::M5,
    Interval::M15,
    Interval::M30,
    Interval::H1,
    Interval::H2,
    Interval::H4,
    Interval::H6,
    Interval::H8,
    Interval::H12,
    Interval::D1,
    Interval::D3,
    Interval::W1,
    Interval::Mo1,
];

impl Interval {
    pub fn parse(input: &str) -> Result<Self, FetchError> {
        match input {
            "1m" => Ok(Self::M1),
            "3m" => Ok(Self::M3),
            "5m" => Ok(Self::M5),
            "15m" => Ok(Self::M15),
            "30m" => Ok(Self::M30),
            "1h" => Ok(Self::H1),
            "2h" => Ok(Self::H2),
            "4h" => Ok(Self::H4),
            "6h" => Ok(Self::H6),
            "8h" => Ok(Self::H8),
            "12h" => Ok(Self::H12),
            "1d" => Ok(Self::D1),
            "3d" => Ok(Self::D3),
            "1w" => Ok(Self::W1),
            "1M" => Ok(Self::Mo1),
            other => Err(FetchError::UnsupportedInterval(other.to_string())),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::M1 => "1m",
            Self::M3 => "3m",
            Self::M5 => "5m",
            Self::M15 => "15m",
            Self::M30 => "30m",
            Self::H1 => "1h",
            Self::H2 => "2h",
            Self::H4 => "4h",
            Self::H6 => "6h",
            Self::H8 => "8h",
            Self::H12 => "12h",
            Self::D1 => "1d",
            Self::D3 => "3d",
            Self::W1 => "1w",
            Self::Mo1 => "1M",
        }
    }

    /// Interval width in milliseconds. `1M` is the conventional 30-day
    /// approximation used for request windowing.
    pub fn millis(self) -> i64 {
        match self {
            Self::M1 => MINUTE_MS,
            Self::M3 => 3 * MINUTE_MS,
            Self::M5 => 5 * MINUTE_MS,
            Self::M15 => 15 * MINUTE_MS,
            Self::M30 => 30 * MINUTE_MS,
            Self::H1 => HOUR_MS,
            Self::H2 => 2 * HOUR_MS,
            Self::H4 => 4 * HOUR_MS,
            Self::H6 => 6 * HOUR_MS,
            Self::H8 => 8 * HOUR_MS,
            Self::H12 => 12 * HOUR_MS,
            Self::D1 => DAY_MS,
            Self::D3 => 3 * DAY_MS,
            Self::W1 => 7 * DAY_MS,
            Self::Mo1 => 30 * DAY_MS,
        }
    }
}

impl std::fmt::Display for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The four dataset families served by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataKind {
    PriceIndex,
    Price,
    FundingRate,
    PremiumIndex,
}

pub const ALL_KINDS: [DataKind; 4] = [
    DataKind::Price,
    DataKind::PriceIndex,
    DataKind::PremiumIndex,
    DataKind::FundingRate,
];

impl DataKind {
    pub fn parse(input: &str) -> Result<Self, FetchError> {
        match input {
            "price_index" => Ok(Self::PriceIndex),
            "price" => Ok(Self::Price),
            "funding_rate" => Ok(Self::FundingRate),
            "premium_index" => Ok(Self::PremiumIndex),
            other => Err(FetchError::UnknownDataKind(other.to_string())),
        }
    }

    /// Cache subdirectory name, also the stable string form of the kind.
    pub fn dir_name(self) -> &'static str {
        match self {
            Self::PriceIndex => "price_index",
            Self::Price => "price",
            Self::FundingRate => "funding_rate",
            Self::PremiumIndex => "premium_index",
        }
    }

    /// Funding events settle on a fixed real-world cadence, so their cache
    /// key carries no candle interval.
    pub fn keyed_by_interval(self) -> bool {
        !matches!(self, Self::FundingRate)
    }

    /// Pagination step for the window planner. Funding history is paged on a
    /// synthetic one-hour grid regardless of the requested display interval.
    pub fn pagination_interval_ms(self, interval: Interval) -> i64 {
        match self {
            Self::FundingRate => Interval::H1.millis(),
            _ => interval.millis(),
        }
    }
}

impl std::fmt::Display for DataKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// Per-kind request-size ceilings for one exchange. One field per kind keeps
/// the mapping exhaustive at construction; there is no lookup that can miss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindLimits {
    pub price_index: u32,
    pub price: u32,
    pub funding_rate: u32,
    pub premium_index: u32,
}

impl KindLimits {
    pub fn uniform(limit: u32) -> Self {
        Self {
            price_index: limit,
            price: limit,
            funding_rate: limit,
            premium_index: limit,
        }
    }

    pub fn limit_for(self, kind: DataKind) -> u32 {
        match kind {
            DataKind::PriceIndex => self.price_index,
            DataKind::Price => self.price,
            DataKind::FundingRate => self.funding_rate,
            DataKind::PremiumIndex => self.premium_index,
        }
    }
}

/// One normalized time-series row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarketRecord {
    pub ts_ms: i64,
    pub values: RecordValues,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum RecordValues {
    /// OHLCV row. `volume` is absent for index/premium candles on exchanges
    /// that do not report one.
    Candle {
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: Option<f64>,
    },
    /// Funding-rate settlement event.
    Funding { rate: f64 },
}

impl MarketRecord {
    pub fn candle(ts_ms: i64, open: f64, high: f64, low: f64, close: f64, volume: Option<f64>) -> Self {
        Self {
            ts_ms,
            values: RecordValues::Candle {
                open,
                high,
                low,
                close,
                volume,
            },
        }
    }

    /// Funding timestamps are floored to the minute on construction.
    pub fn funding(ts_ms: i64, rate: f64) -> Self {
        Self {
            ts_ms: floor_to_minute_ms(ts_ms),
            values: RecordValues::Funding { rate },
        }
    }
}

pub fn floor_to_minute_ms(ts_ms: i64) -> i64 {
    ts_ms.div_euclid(MINUTE_MS) * MINUTE_MS
}

/// Parse a `YYYY-MM-DD` request date into the UTC millisecond epoch of its
/// midnight.
pub fn date_to_ms(date: &str) -> Result<i64, FetchError> {
    let parsed = NaiveDate::parse_from_str(date, "%Y-%m-%d").map_err(|_| FetchError::InvalidDate {
        value: date.to_string(),
    })?;
    let midnight = parsed
        .and_hms_opt(0, 0, 0)
        .expect("midnight is valid for every date");
    Ok(Utc.from_utc_datetime(&midnight).timestamp_millis())
}

const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Render a millisecond epoch as the datetime form stored in cache files.
pub fn format_ts_ms(ts_ms: i64) -> Option<String> {
    let dt: DateTime<Utc> = Utc.timestamp_millis_opt(ts_ms).single()?;
    Some(dt.format(TS_FORMAT).to_string())
}

/// Inverse of [`format_ts_ms`].
pub fn parse_ts(raw: &str) -> Option<i64> {
    let naive = NaiveDateTime::parse_from_str(raw, TS_FORMAT).ok()?;
    Some(Utc.from_utc_datetime(&naive).timestamp_millis())
}
