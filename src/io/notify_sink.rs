//! Notification sink - writes notifications as JSONL
//!
//! One JSON object per line, appended to the configured file or written to
//! stdout when no file is configured.

use crate::io::notify_channel::Notification;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info};

#[derive(Debug, Clone, PartialEq)]
enum SinkTarget {
    File(String),
    Stdout,
}

pub struct NotificationSink {
    target: SinkTarget,
}

impl NotificationSink {
    pub fn new(file_path: Option<&str>) -> Self {
        let target = match file_path {
            Some(path) => SinkTarget::File(path.to_string()),
            None => SinkTarget::Stdout,
        };
        match &target {
            SinkTarget::File(path) => info!(file_path = %path, "notification_sink_initialized"),
            SinkTarget::Stdout => info!("notification_sink_stdout"),
        }
        Self { target }
    }

    /// Write one notification. Returns true if successful.
    pub fn write(&self, notification: &Notification) -> bool {
        let json = notification.to_json();
        let result = match &self.target {
            SinkTarget::File(path) => append_line(path, &json),
            SinkTarget::Stdout => {
                let mut out = std::io::stdout().lock();
                writeln!(out, "{}", json).and_then(|_| out.flush())
            }
        };

        match result {
            Ok(()) => {
                debug!(kind = %notification.kind(), bytes = %json.len(), "notification_written");
                true
            }
            Err(e) => {
                error!(kind = %notification.kind(), error = %e, "notification_write_failed");
                false
            }
        }
    }

    /// Drain the channel until it closes or shutdown is signalled
    pub async fn run(
        self,
        mut rx: mpsc::Receiver<Notification>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                result = shutdown.changed() => {
                    if result.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                notification = rx.recv() => {
                    match notification {
                        Some(n) => {
                            self.write(&n);
                        }
                        None => break,
                    }
                }
            }
        }

        // Flush whatever is already queued
        while let Ok(n) = rx.try_recv() {
            self.write(&n);
        }
        info!("notification_sink_stopped");
    }
}

/// Append a line to the sink file
fn append_line(file_path: &str, line: &str) -> std::io::Result<()> {
    let path = Path::new(file_path);

    // Create parent directories if they don't exist
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{}", line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::AdvisoryKind;
    use std::fs;
    use tempfile::tempdir;

    fn advisory(message: &str) -> Notification {
        Notification::Advisory {
            ts: 1_700_000_000_000,
            kind: AdvisoryKind::LocationUnavailable,
            message: message.to_string(),
        }
    }

    #[test]
    fn test_write_notification() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("notifications.jsonl");
        let sink = NotificationSink::new(file_path.to_str());

        assert!(sink.write(&advisory("no fix")));

        let content = fs::read_to_string(&file_path).unwrap();
        assert!(content.ends_with('\n'));
        let parsed: serde_json::Value = serde_json::from_str(content.trim()).unwrap();
        assert_eq!(parsed["type"], "advisory");
        assert_eq!(parsed["message"], "no fix");
    }

    #[test]
    fn test_creates_parent_directories() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("nested").join("dir").join("out.jsonl");
        let sink = NotificationSink::new(nested.to_str());

        assert!(sink.write(&advisory("x")));
        assert!(nested.exists());
    }

    #[test]
    fn test_append_mode() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("out.jsonl");
        fs::write(&file_path, "{\"existing\":\"data\"}\n").unwrap();

        let sink = NotificationSink::new(file_path.to_str());
        sink.write(&advisory("one"));
        sink.write(&advisory("two"));

        let content = fs::read_to_string(&file_path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("existing"));
        assert!(lines[2].contains("two"));
    }

    #[tokio::test]
    async fn test_run_drains_until_closed() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("out.jsonl");
        let sink = NotificationSink::new(file_path.to_str());

        let (tx, rx) = mpsc::channel(8);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        tx.send(advisory("a")).await.unwrap();
        tx.send(advisory("b")).await.unwrap();
        drop(tx);

        sink.run(rx, shutdown_rx).await;

        let content = fs::read_to_string(&file_path).unwrap();
        assert_eq!(content.lines().count(), 2);
    }
}
