//! Out-of-band response sink
//!
//! Every scan event emitted to a client is also pushed onto a bounded
//! channel; a single consumer drains it into a log file, a periodic
//! aggregate report, or nothing, per config. A full channel blocks the
//! producing session, which shares fate with its client anyway.

use crate::config::SinkMode;
use crate::proto::strelka::ScanResponse;
use std::path::Path;
use std::time::Duration;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Sink channel capacity.
pub const SINK_CAPACITY: usize = 100;

/// Create the sink channel and spawn its consumer.
pub fn spawn(mode: SinkMode) -> (mpsc::Sender<ScanResponse>, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(SINK_CAPACITY);
    let handle = tokio::spawn(async move {
        match mode {
            SinkMode::Log(path) => {
                if let Err(err) = log_responses(rx, &path).await {
                    tracing::error!(error = %err, path = %path.display(), "response log writer failed");
                }
            }
            SinkMode::Report(interval) => report_responses(rx, interval).await,
            SinkMode::Discard => discard_responses(rx).await,
        }
    });
    (tx, handle)
}

/// Append each event envelope as one JSON line.
async fn log_responses(mut rx: mpsc::Receiver<ScanResponse>, path: &Path) -> std::io::Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;

    while let Some(resp) = rx.recv().await {
        file.write_all(resp.event.as_bytes()).await?;
        file.write_all(b"\n").await?;
    }
    file.flush().await?;
    Ok(())
}

/// Log aggregate event counts at a fixed interval.
async fn report_responses(mut rx: mpsc::Receiver<ScanResponse>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // the first tick completes immediately
    ticker.tick().await;

    let mut since_last = 0u64;
    let mut total = 0u64;

    loop {
        tokio::select! {
            received = rx.recv() => match received {
                Some(_) => {
                    since_last += 1;
                    total += 1;
                }
                None => break,
            },
            _ = ticker.tick() => {
                tracing::info!(since_last, total, "scan responses");
                since_last = 0;
            }
        }
    }
}

/// Drain and drop.
async fn discard_responses(mut rx: mpsc::Receiver<ScanResponse>) {
    while rx.recv().await.is_some() {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn event(id: &str, body: &str) -> ScanResponse {
        ScanResponse {
            id: id.to_string(),
            event: body.to_string(),
        }
    }

    #[tokio::test]
    async fn test_log_sink_appends_one_line_per_event() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("responses.log");

        let (tx, handle) = spawn(SinkMode::Log(path.clone()));
        tx.send(event("a", r#"{"request":{"id":"a"},"n":1}"#))
            .await
            .unwrap();
        tx.send(event("b", r#"{"request":{"id":"b"},"n":2}"#))
            .await
            .unwrap();
        drop(tx);
        handle.await.unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = written.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], r#"{"request":{"id":"a"},"n":1}"#);
        assert_eq!(lines[1], r#"{"request":{"id":"b"},"n":2}"#);
    }

    #[tokio::test]
    async fn test_discard_sink_drains_until_producers_drop() {
        let (tx, handle) = spawn(SinkMode::Discard);
        for i in 0..10 {
            tx.send(event(&i.to_string(), "{}")).await.unwrap();
        }
        drop(tx);
        handle.await.unwrap();
    }
}
