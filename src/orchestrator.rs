//! Bounded-concurrency execution of per-window fetches.

use std::future::Future;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::warn;

use crate::error::FetchError;
use crate::records::MarketRecord;
use crate::window::TimeWindow;

#[derive(Debug)]
pub struct WindowResults {
    /// Successful fragments in window (submission) order.
    pub fragments: Vec<Vec<MarketRecord>>,
    pub windows_total: usize,
    pub windows_failed: usize,
}

/// Run one `call` per window with at most `max_workers` in flight, then join.
///
/// A failed window is logged and excluded from the result set; it never
/// aborts sibling windows or the request. There is no cancellation and no
/// watchdog above the HTTP client's own timeout; the join barrier returns
/// once every window has resolved one way or the other.
pub async fn fetch_windows<F, Fut>(windows: &[TimeWindow], max_workers: usize, call: F) -> WindowResults
where
    F: Fn(TimeWindow) -> Fut,
    Fut: Future<Output = Result<Vec<MarketRecord>, FetchError>>,
{
    let semaphore = Arc::new(Semaphore::new(max_workers.max(1)));

    let tasks = windows.iter().map(|window| {
        let window = *window;
        let semaphore = Arc::clone(&semaphore);
        let fut = call(window);
        async move {
            let _permit = semaphore
                .acquire()
                .await
                .expect("window semaphore is never closed");
            (window, fut.await)
        }
    });

    let joined = join_all(tasks).await;

    let mut fragments = Vec::with_capacity(windows.len());
    let mut windows_failed = 0usize;
    for (window, result) in joined {
        match result {
            Ok(records) => fragments.push(records),
            Err(err) => {
                windows_failed += 1;
                warn!(
                    component = "pipeline",
                    event = "window.failed",
                    start_ms = window.start_ms,
                    end_ms = window.end_ms,
                    error = %err
                );
            }
        }
    }

    WindowResults {
        fragments,
        windows_total: windows.len(),
        windows_failed,
    }
}
