//! CSV disk cache keyed by (exchange, symbol, kind, range, interval).
//!
//! File presence is the entire freshness signal: there is no TTL, no partial
//! range merging and no invalidation. Writes are atomic (temp file + rename)
//! so a concurrently-read key is never observed half-written.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use csv::StringRecord;
use tracing::{debug, info};

use crate::error::FetchError;
use crate::records::{format_ts_ms, parse_ts, DataKind, Interval, MarketRecord, RecordValues, ALL_KINDS};

/// Identity of one cached dataset. Two requests with an equal key resolve to
/// the same file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKey {
    pub exchange: String,
    /// Canonical (cross-exchange) symbol form.
    pub symbol: String,
    pub kind: DataKind,
    pub start_date: String,
    pub end_date: String,
    pub interval: Interval,
}

impl CacheKey {
    pub fn file_name(&self) -> String {
        if self.kind.keyed_by_interval() {
            format!(
                "{}_{}_{}_{}.csv",
                self.symbol,
                self.start_date,
                self.end_date,
                self.interval.as_str()
            )
        } else {
            format!("{}_{}_{}.csv", self.symbol, self.start_date, self.end_date)
        }
    }
}

pub struct DiskCache {
    root: PathBuf,
}

const CANDLE_HEADER: [&str; 6] = ["timestamp", "open", "high", "low", "close", "volume"];
const FUNDING_HEADER: [&str; 2] = ["timestamp", "funding_rate"];

impl DiskCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create the per-kind directory layout for one exchange. Kept separate
    /// from construction so bootstrap is an explicit, testable step.
    pub fn ensure_layout(&self, exchange: &str) -> Result<(), FetchError> {
        for kind in ALL_KINDS {
            let dir = self.root.join(exchange).join(kind.dir_name());
            fs::create_dir_all(&dir)?;
            debug!(component = "cache", event = "cache.dir", path = %dir.display());
        }
        Ok(())
    }

    pub fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.root
            .join(&key.exchange)
            .join(key.kind.dir_name())
            .join(key.file_name())
    }

    pub fn exists(&self, key: &CacheKey) -> bool {
        self.path_for(key).exists()
    }

    /// Read a cached series back, restoring ascending timestamp order.
    pub fn read(&self, key: &CacheKey) -> Result<Vec<MarketRecord>, FetchError> {
        let path = self.path_for(key);
        let mut reader = csv::ReaderBuilder::new().has_headers(true).from_path(&path)?;

        let mut records = Vec::new();
        for row in reader.records() {
            let row = row?;
            records.push(parse_row(&row, key.kind)?);
        }
        records.sort_by_key(|record| record.ts_ms);

        debug!(
            component = "cache",
            event = "cache.read",
            path = %path.display(),
            rows = records.len()
        );
        Ok(records)
    }

    /// Write a fully merged, ascending series for the whole requested range.
    pub fn write(&self, key: &CacheKey, records: &[MarketRecord]) -> Result<PathBuf, FetchError> {
        let path = self.path_for(key);
        let mut writer = csv::WriterBuilder::new().from_writer(Vec::new());

        match key.kind {
            DataKind::FundingRate => writer.write_record(FUNDING_HEADER)?,
            _ => writer.write_record(CANDLE_HEADER)?,
        }
        for record in records {
            writer.write_record(&render_row(record)?)?;
        }

        let bytes = writer
            .into_inner()
            .map_err(|err| FetchError::Payload(format!("CSV buffer flush failed: {err}")))?;
        write_atomic(&path, &bytes)?;

        info!(
            component = "cache",
            event = "cache.write",
            path = %path.display(),
            rows = records.len()
        );
        Ok(path)
    }
}

fn render_row(record: &MarketRecord) -> Result<Vec<String>, FetchError> {
    let timestamp = format_ts_ms(record.ts_ms).ok_or(FetchError::ParseField {
        field: "timestamp",
        value: record.ts_ms.to_string(),
    })?;

    Ok(match record.values {
        RecordValues::Candle {
            open,
            high,
            low,
            close,
            volume,
        } => vec![
            timestamp,
            open.to_string(),
            high.to_string(),
            low.to_string(),
            close.to_string(),
            volume.map(|v| v.to_string()).unwrap_or_default(),
        ],
        RecordValues::Funding { rate } => vec![timestamp, rate.to_string()],
    })
}

fn parse_row(row: &StringRecord, kind: DataKind) -> Result<MarketRecord, FetchError> {
    let ts_raw = row.get(0).unwrap_or_default();
    let ts_ms = parse_ts(ts_raw).ok_or_else(|| FetchError::ParseField {
        field: "timestamp",
        value: ts_raw.to_string(),
    })?;

    match kind {
        DataKind::FundingRate => {
            let rate = field_f64(row, 1, "funding_rate")?;
            Ok(MarketRecord::funding(ts_ms, rate))
        }
        _ => {
            let open = field_f64(row, 1, "open")?;
            let high = field_f64(row, 2, "high")?;
            let low = field_f64(row, 3, "low")?;
            let close = field_f64(row, 4, "close")?;
            let volume = match row.get(5) {
                None | Some("") => None,
                Some(raw) => Some(raw.parse::<f64>().map_err(|_| FetchError::ParseField {
                    field: "volume",
                    value: raw.to_string(),
                })?),
            };
            Ok(MarketRecord::candle(ts_ms, open, high, low, close, volume))
        }
    }
}

fn field_f64(row: &StringRecord, idx: usize, field: &'static str) -> Result<f64, FetchError> {
    let raw = row.get(idx).unwrap_or_default();
    raw.parse::<f64>().map_err(|_| FetchError::ParseField {
        field,
        value: raw.to_string(),
    })
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), FetchError> {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .ok_or_else(|| FetchError::Config(format!("invalid cache path: {}", path.display())))?;
    let tmp_path = path.with_file_name(format!("{file_name}.tmp"));

    {
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }

    fs::rename(tmp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    use crate::records::{date_to_ms, HOUR_MS, MINUTE_MS};

    fn candle_key(kind: DataKind) -> CacheKey {
        CacheKey {
            exchange: "binance".to_string(),
            symbol: "BTCUSDT".to_string(),
            kind,
            start_date: "2025-08-01".to_string(),
            end_date: "2025-08-17".to_string(),
            interval: Interval::M1,
        }
    }

    #[test]
    fn funding_file_name_omits_the_interval() {
        assert_eq!(
            candle_key(DataKind::Price).file_name(),
            "BTCUSDT_2025-08-01_2025-08-17_1m.csv"
        );
        assert_eq!(
            candle_key(DataKind::FundingRate).file_name(),
            "BTCUSDT_2025-08-01_2025-08-17.csv"
        );
    }

    #[test]
    fn layout_creates_all_kind_directories() {
        let temp = tempdir().unwrap();
        let cache = DiskCache::new(temp.path());
        cache.ensure_layout("bybit").unwrap();

        for kind in ALL_KINDS {
            assert!(temp.path().join("bybit").join(kind.dir_name()).is_dir());
        }
    }

    #[test]
    fn candle_round_trip_preserves_rows_and_order() {
        let temp = tempdir().unwrap();
        let cache = DiskCache::new(temp.path());
        let key = candle_key(DataKind::Price);
        cache.ensure_layout(&key.exchange).unwrap();

        let base = date_to_ms("2025-08-01").unwrap();
        let rows = vec![
            MarketRecord::candle(base, 1.0, 2.0, 0.5, 1.5, Some(10.0)),
            MarketRecord::candle(base + MINUTE_MS, 1.5, 2.5, 1.0, 2.0, None),
        ];

        let path = cache.write(&key, &rows).unwrap();
        assert!(path.ends_with("binance/price/BTCUSDT_2025-08-01_2025-08-17_1m.csv"));
        assert!(cache.exists(&key));

        let restored = cache.read(&key).unwrap();
        assert_eq!(restored, rows);
    }

    #[test]
    fn funding_round_trip_uses_the_two_column_schema() {
        let temp = tempdir().unwrap();
        let cache = DiskCache::new(temp.path());
        let key = candle_key(DataKind::FundingRate);
        cache.ensure_layout(&key.exchange).unwrap();

        let base = date_to_ms("2025-08-01").unwrap() + 8 * HOUR_MS;
        let rows = vec![
            MarketRecord::funding(base, 0.0001),
            MarketRecord::funding(base + 8 * HOUR_MS, -0.0002),
        ];
        cache.write(&key, &rows).unwrap();

        let raw = std::fs::read_to_string(cache.path_for(&key)).unwrap();
        assert!(raw.starts_with("timestamp,funding_rate\n"));
        assert_eq!(cache.read(&key).unwrap(), rows);
    }

    #[test]
    fn read_restores_ascending_order() {
        let temp = tempdir().unwrap();
        let cache = DiskCache::new(temp.path());
        let key = candle_key(DataKind::Price);
        cache.ensure_layout(&key.exchange).unwrap();

        let base = date_to_ms("2025-08-01").unwrap();
        // Hand-written file with rows out of order.
        let body = format!(
            "timestamp,open,high,low,close,volume\n{},2,2,2,2,1\n{},1,1,1,1,1\n",
            format_ts_ms(base + MINUTE_MS).unwrap(),
            format_ts_ms(base).unwrap(),
        );
        std::fs::write(cache.path_for(&key), body).unwrap();

        let restored = cache.read(&key).unwrap();
        assert_eq!(restored[0].ts_ms, base);
        assert_eq!(restored[1].ts_ms, base + MINUTE_MS);
    }
}
