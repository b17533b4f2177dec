//! Recorded position track played back as a position source
//!
//! Format: one JSON object per line
//! `{"latitude": 54.85, "longitude": -1.57, "accuracy": "high"}` or
//! `{"error": "timeout"}`. Lines are emitted at a fixed pace and stamped with
//! the time of emission. Malformed lines are skipped.

use crate::domain::error::LocationError;
use crate::domain::types::{Accuracy, Coordinate, PositionSample};
use crate::services::geolocator::{PositionOptions, PositionSource, PositionStream};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

#[derive(Debug, Deserialize)]
struct TrackLine {
    latitude: Option<f64>,
    longitude: Option<f64>,
    #[serde(default)]
    accuracy: Accuracy,
    error: Option<String>,
}

/// Parse one track line into a fix or a platform error
fn parse_line(line: &str) -> Option<Result<PositionSample, LocationError>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let parsed: TrackLine = match serde_json::from_str(line) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!(line = %line, error = %e, "replay_line_invalid");
            return None;
        }
    };

    if let Some(error) = parsed.error {
        let err = match error.as_str() {
            "permission_denied" => LocationError::PermissionDenied,
            "timeout" => LocationError::Timeout,
            _ => LocationError::PositionUnavailable,
        };
        return Some(Err(err));
    }

    let (Some(latitude), Some(longitude)) = (parsed.latitude, parsed.longitude) else {
        warn!(line = %line, "replay_line_missing_coordinates");
        return None;
    };
    match Coordinate::new(latitude, longitude) {
        Ok(coord) => Some(Ok(PositionSample::now(coord, parsed.accuracy))),
        Err(e) => {
            warn!(line = %line, error = %e, "replay_line_invalid");
            None
        }
    }
}

pub struct ReplayPositionSource {
    path: String,
    interval: Duration,
}

impl ReplayPositionSource {
    pub fn new(path: &str, interval: Duration) -> Self {
        // tokio intervals reject a zero period
        let interval = interval.max(Duration::from_millis(1));
        info!(path = %path, interval_ms = %interval.as_millis(), "replay_source_initialized");
        Self { path: path.to_string(), interval }
    }
}

#[async_trait]
impl PositionSource for ReplayPositionSource {
    /// First usable line of the track
    async fn current_position(
        &self,
        _options: PositionOptions,
    ) -> Result<PositionSample, LocationError> {
        let file = tokio::fs::File::open(&self.path).await.map_err(|e| {
            warn!(path = %self.path, error = %e, "replay_open_failed");
            LocationError::PositionUnavailable
        })?;
        let mut lines = BufReader::new(file).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if let Some(result) = parse_line(&line) {
                return result;
            }
        }
        Err(LocationError::PositionUnavailable)
    }

    fn watch(&self, _options: PositionOptions) -> PositionStream {
        let (tx, rx) = mpsc::channel(16);
        let path = self.path.clone();
        let interval = self.interval;

        tokio::spawn(async move {
            let file = match tokio::fs::File::open(&path).await {
                Ok(file) => file,
                Err(e) => {
                    warn!(path = %path, error = %e, "replay_open_failed");
                    let _ = tx.send(Err(LocationError::PositionUnavailable)).await;
                    return;
                }
            };

            let mut lines = BufReader::new(file).lines();
            let mut ticker = tokio::time::interval(interval);
            let mut emitted = 0u64;
            while let Ok(Some(line)) = lines.next_line().await {
                let Some(item) = parse_line(&line) else {
                    continue;
                };
                ticker.tick().await;
                // Re-stamp at emission time
                let item = item.map(|s| PositionSample::now(s.coord, s.accuracy));
                if tx.send(item).await.is_err() {
                    // Watch cancelled
                    return;
                }
                emitted += 1;
            }
            info!(path = %path, samples = %emitted, "replay_finished");
        });

        debug!(path = %self.path, "replay_watch_started");
        rx
    }
}
