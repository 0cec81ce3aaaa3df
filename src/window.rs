//! Time-window planning for exchange-size-limited requests.

use serde::{Deserialize, Serialize};

/// One bounded sub-range of a request span, inclusive on both ends in the
/// sense the exchanges use (`startTime`/`endTime` query parameters).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start_ms: i64,
    pub end_ms: i64,
}

/// Split `[start_ms, end_ms]` into contiguous windows, each requesting at
/// most `max_records` rows at the given interval.
///
/// Consecutive windows satisfy `next.start_ms == prev.end_ms + interval_ms`,
/// so the sequence covers the span exactly once per interval step with no
/// overlap. A degenerate span (`start_ms >= end_ms`) yields no windows.
pub fn plan_windows(start_ms: i64, end_ms: i64, max_records: u32, interval_ms: i64) -> Vec<TimeWindow> {
    if start_ms >= end_ms || max_records == 0 || interval_ms <= 0 {
        return Vec::new();
    }

    let span = (i64::from(max_records) - 1) * interval_ms;
    let mut windows = Vec::new();
    let mut cursor = start_ms;

    while cursor < end_ms {
        let window_end = (cursor + span).min(end_ms);
        windows.push(TimeWindow {
            start_ms: cursor,
            end_ms: window_end,
        });
        cursor = window_end + interval_ms;
    }

    windows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::MINUTE_MS;

    #[test]
    fn two_windows_with_exact_interval_seam() {
        let windows = plan_windows(0, 9 * MINUTE_MS, 5, MINUTE_MS);
        assert_eq!(
            windows,
            vec![
                TimeWindow {
                    start_ms: 0,
                    end_ms: 4 * MINUTE_MS
                },
                TimeWindow {
                    start_ms: 5 * MINUTE_MS,
                    end_ms: 9 * MINUTE_MS
                },
            ]
        );
    }

    #[test]
    fn single_window_when_span_fits_the_limit() {
        let windows = plan_windows(0, 3 * MINUTE_MS, 100, MINUTE_MS);
        assert_eq!(
            windows,
            vec![TimeWindow {
                start_ms: 0,
                end_ms: 3 * MINUTE_MS
            }]
        );
    }

    #[test]
    fn degenerate_range_yields_no_windows() {
        assert!(plan_windows(10, 10, 5, MINUTE_MS).is_empty());
        assert!(plan_windows(20, 10, 5, MINUTE_MS).is_empty());
    }

    #[test]
    fn windows_are_contiguous_and_cover_the_span() {
        let start = 1_700_000_000_000;
        let end = start + 987 * MINUTE_MS;
        let interval = MINUTE_MS;
        let windows = plan_windows(start, end, 90, interval);

        assert_eq!(windows.first().map(|w| w.start_ms), Some(start));
        assert_eq!(windows.last().map(|w| w.end_ms), Some(end));
        for pair in windows.windows(2) {
            assert_eq!(pair[1].start_ms, pair[0].end_ms + interval);
        }
        for window in &windows {
            assert!(window.start_ms < window.end_ms);
            let rows = (window.end_ms - window.start_ms) / interval + 1;
            assert!(rows <= 90);
        }
    }
}
