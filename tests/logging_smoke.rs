use std::io;
use std::io::Write;
use std::sync::{Arc, Mutex};

use histfetch::{log_app_start, merge_fragments, plan_windows, LoggingConfig, MarketRecord};
use tracing::dispatcher::with_default;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriter;

#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    fn contents(&self) -> String {
        let bytes = self.0.lock().expect("log buffer lock should not be poisoned");
        String::from_utf8_lossy(&bytes).to_string()
    }
}

impl Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .expect("log buffer lock should not be poisoned")
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogBuffer {
    type Writer = LogBuffer;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

fn capture_logs(max_level: Level, f: impl FnOnce()) -> String {
    let buffer = LogBuffer::default();
    let subscriber = tracing_subscriber::fmt()
        .json()
        .with_ansi(false)
        .with_max_level(max_level)
        .with_writer(buffer.clone())
        .finish();
    let dispatch = tracing::Dispatch::new(subscriber);

    with_default(&dispatch, f);
    buffer.contents()
}

#[test]
fn app_start_helper_emits_baseline_event() {
    let logs = capture_logs(Level::INFO, || {
        let cfg = LoggingConfig::default();
        log_app_start("fetch_single", &cfg);
    });

    assert!(logs.contains("\"event\":\"app.start\""));
    assert!(logs.contains("\"component\":\"fetch_single\""));
}

#[test]
fn failed_windows_emit_warn_events() {
    let windows = plan_windows(0, 9 * 60_000, 5, 60_000);
    assert_eq!(windows.len(), 2);

    let logs = capture_logs(Level::INFO, || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("single-thread runtime should build");

        rt.block_on(async {
            let results = histfetch::fetch_windows(&windows, 2, |window| async move {
                if window.start_ms == 0 {
                    Err(histfetch::FetchError::Payload("simulated outage".to_string()))
                } else {
                    Ok(vec![MarketRecord::candle(window.start_ms, 1.0, 1.0, 1.0, 1.0, None)])
                }
            })
            .await;

            assert_eq!(results.windows_failed, 1);
            let merged = merge_fragments(results.fragments);
            assert_eq!(merged.records.len(), 1);
        });
    });

    assert!(logs.contains("\"event\":\"window.failed\""));
    assert!(logs.contains("simulated outage"));
}
