//! Error taxonomy
//!
//! None of these are fatal: each maps to a reduced-functionality state
//! plus a user-visible notification.

use crate::domain::types::{TargetId, WalkId};
use serde::Serialize;
use thiserror::Error;

/// Position acquisition failures (platform codes 1/2/3 plus unsupported)
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LocationError {
    #[error("location access denied")]
    PermissionDenied,
    #[error("position unavailable")]
    PositionUnavailable,
    #[error("location request timed out")]
    Timeout,
    #[error("geolocation is not supported")]
    Unsupported,
    #[error("position fix is stale ({age_ms} ms old)")]
    Stale { age_ms: u64 },
}

/// Feed loading failures
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FeedError {
    #[error("failed to load stories: {0}")]
    CatalogLoadFailed(String),
    #[error("failed to load guided walks: {0}")]
    WalkFeedLoadFailed(String),
}

/// Rejected walk commands
#[derive(Debug, Clone, PartialEq, Error)]
pub enum WalkError {
    #[error("walk not found: {0}")]
    WalkNotFound(WalkId),
    #[error("walk {0} has no reachable waypoints")]
    EmptyWalk(WalkId),
    #[error("you must reach waypoint {index} first ({distance_m} m away)")]
    WaypointNotReached { index: usize, distance_m: u64 },
    #[error("cannot {action} while {state}")]
    InvalidTransition { state: &'static str, action: &'static str },
}

impl WalkError {
    pub fn kind(&self) -> &'static str {
        match self {
            WalkError::WalkNotFound(_) => "walk_not_found",
            WalkError::EmptyWalk(_) => "empty_walk",
            WalkError::WaypointNotReached { .. } => "waypoint_not_reached",
            WalkError::InvalidTransition { .. } => "invalid_transition",
        }
    }
}

/// Routing lookups; every variant means "routing unavailable"
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RouteError {
    #[error("route request timed out")]
    Timeout,
    #[error("route transport error: {0}")]
    Transport(String),
    #[error("route provider error: {0}")]
    Provider(String),
    #[error("route provider returned no routes")]
    EmptyResult,
    #[error("routing disabled")]
    Disabled,
}

/// Story access failures
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CatalogError {
    #[error("story not found: {0}")]
    UnknownStory(TargetId),
    #[error("you must be within {radius_m} m to unlock this story; you are {distance_m} m away")]
    StoryLocked { distance_m: u64, radius_m: u64 },
}

impl CatalogError {
    pub fn kind(&self) -> &'static str {
        match self {
            CatalogError::UnknownStory(_) => "unknown_story",
            CatalogError::StoryLocked { .. } => "story_locked",
        }
    }
}

/// A user command that could not be carried out
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CommandError {
    #[error(transparent)]
    Walk(#[from] WalkError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

impl CommandError {
    pub fn kind(&self) -> &'static str {
        match self {
            CommandError::Walk(e) => e.kind(),
            CommandError::Catalog(e) => e.kind(),
        }
    }
}

/// Recovered conditions surfaced to the user as non-fatal notices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AdvisoryKind {
    LocationUnavailable,
    CatalogLoadFailed,
    WalkFeedLoadFailed,
    RoutingUnavailable,
}

impl AdvisoryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdvisoryKind::LocationUnavailable => "location_unavailable",
            AdvisoryKind::CatalogLoadFailed => "catalog_load_failed",
            AdvisoryKind::WalkFeedLoadFailed => "walk_feed_load_failed",
            AdvisoryKind::RoutingUnavailable => "routing_unavailable",
        }
    }
}

impl From<&FeedError> for AdvisoryKind {
    fn from(err: &FeedError) -> Self {
        match err {
            FeedError::CatalogLoadFailed(_) => AdvisoryKind::CatalogLoadFailed,
            FeedError::WalkFeedLoadFailed(_) => AdvisoryKind::WalkFeedLoadFailed,
        }
    }
}
