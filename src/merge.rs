//! Merging per-window fragments into one deduplicated, ordered series.

use std::collections::HashMap;

use crate::records::MarketRecord;

#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    pub records: Vec<MarketRecord>,
    pub duplicates_removed: usize,
}

/// Concatenate fragments in input order, keep the last occurrence of every
/// timestamp, and sort ascending.
///
/// Window seams can repeat a boundary row (inclusive end == next start on
/// some exchanges); last-write-wins resolves those and any exchange-side
/// duplicates deterministically.
pub fn merge_fragments(fragments: Vec<Vec<MarketRecord>>) -> MergeOutcome {
    let total: usize = fragments.iter().map(Vec::len).sum();
    let mut by_ts: HashMap<i64, MarketRecord> = HashMap::with_capacity(total);

    for fragment in fragments {
        for record in fragment {
            by_ts.insert(record.ts_ms, record);
        }
    }

    let mut records: Vec<MarketRecord> = by_ts.into_values().collect();
    records.sort_by_key(|record| record.ts_ms);

    MergeOutcome {
        duplicates_removed: total - records.len(),
        records,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::RecordValues;

    fn candle(ts_ms: i64, close: f64) -> MarketRecord {
        MarketRecord::candle(ts_ms, close, close, close, close, Some(1.0))
    }

    fn close_of(record: &MarketRecord) -> f64 {
        match record.values {
            RecordValues::Candle { close, .. } => close,
            RecordValues::Funding { rate } => rate,
        }
    }

    #[test]
    fn boundary_duplicate_keeps_the_later_fragment() {
        let merged = merge_fragments(vec![
            vec![candle(100, 1.0), candle(200, 2.0)],
            vec![candle(200, 99.0), candle(300, 3.0)],
        ]);

        let times: Vec<i64> = merged.records.iter().map(|r| r.ts_ms).collect();
        assert_eq!(times, vec![100, 200, 300]);
        assert_eq!(close_of(&merged.records[1]), 99.0);
        assert_eq!(merged.duplicates_removed, 1);
    }

    #[test]
    fn out_of_order_input_is_sorted_ascending() {
        let merged = merge_fragments(vec![vec![candle(300, 3.0), candle(100, 1.0)], vec![candle(200, 2.0)]]);
        let times: Vec<i64> = merged.records.iter().map(|r| r.ts_ms).collect();
        assert_eq!(times, vec![100, 200, 300]);
        assert_eq!(merged.duplicates_removed, 0);
    }

    #[test]
    fn empty_input_merges_to_empty() {
        let merged = merge_fragments(Vec::new());
        assert!(merged.records.is_empty());
        assert_eq!(merged.duplicates_removed, 0);

        let merged = merge_fragments(vec![Vec::new(), Vec::new()]);
        assert!(merged.records.is_empty());
    }

    #[test]
    fn timestamps_are_unique_after_merge() {
        let merged = merge_fragments(vec![
            vec![candle(100, 1.0), candle(100, 2.0), candle(200, 3.0)],
            vec![candle(100, 4.0)],
        ]);
        assert_eq!(merged.records.len(), 2);
        assert_eq!(close_of(&merged.records[0]), 4.0);
        assert_eq!(merged.duplicates_removed, 2);
    }
}
