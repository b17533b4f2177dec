//! Shared types for the story guide

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Get current epoch milliseconds
#[inline]
pub fn epoch_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

/// Newtype wrapper for story ids to provide type safety
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetId(pub String);

impl TargetId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TargetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Newtype wrapper for walk ids
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WalkId(pub String);

impl WalkId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for WalkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum CoordinateError {
    #[error("latitude {0} outside [-90, 90]")]
    LatitudeOutOfRange(f64),
    #[error("longitude {0} outside [-180, 180]")]
    LongitudeOutOfRange(f64),
}

/// WGS84 position in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    /// Validated constructor. NaN fails both range checks.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, CoordinateError> {
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(CoordinateError::LatitudeOutOfRange(latitude));
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(CoordinateError::LongitudeOutOfRange(longitude));
        }
        Ok(Self { latitude, longitude })
    }
}

impl std::fmt::Display for Coordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.5},{:.5}", self.latitude, self.longitude)
    }
}

/// Accuracy class reported with a position fix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Accuracy {
    High,
    Low,
    #[default]
    Default,
}

impl Accuracy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Accuracy::High => "high",
            Accuracy::Low => "low",
            Accuracy::Default => "default",
        }
    }
}

/// A single position fix. Consumed transiently, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PositionSample {
    pub coord: Coordinate,
    /// Capture time (epoch ms)
    pub captured_at: u64,
    pub accuracy: Accuracy,
}

impl PositionSample {
    pub fn new(coord: Coordinate, captured_at: u64, accuracy: Accuracy) -> Self {
        Self { coord, captured_at, accuracy }
    }

    /// Sample captured now
    pub fn now(coord: Coordinate, accuracy: Accuracy) -> Self {
        Self::new(coord, epoch_ms(), accuracy)
    }

    /// Age relative to `now_ms`; samples stamped in the future count as fresh
    #[inline]
    pub fn age_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.captured_at)
    }
}

/// A story: point of interest whose content unlocks within `radius_km`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Target {
    pub id: TargetId,
    pub title: String,
    pub coord: Coordinate,
    pub category: String,
    pub teaser: String,
    pub content: String,
    pub image_ref: String,
    pub audio_ref: String,
    pub radius_km: f64,
}

/// Lock radius applied when a feed record carries none (100 m)
pub const DEFAULT_RADIUS_KM: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    Entered,
    Exited,
}

impl Transition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Transition::Entered => "entered",
            Transition::Exited => "exited",
        }
    }
}

/// Edge-triggered change of a target's lock state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProximityEvent {
    pub target_id: TargetId,
    pub transition: Transition,
    pub distance_km: f64,
}

/// Derived lock state of one target
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LockState {
    pub unlocked: bool,
    pub distance_km: f64,
}
