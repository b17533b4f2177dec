//! Guided walk data model

use crate::domain::error::FeedError;
use crate::domain::types::{Coordinate, TargetId, WalkId};
use serde::Serialize;
use std::sync::Arc;

/// Where a walk begins (shown with the intro)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StartLocation {
    pub name: String,
    pub coord: Coordinate,
}

/// One stop of a walk
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Waypoint {
    pub order: u32,
    pub target_id: TargetId,
    pub instruction: String,
    /// Suggested dwell at the stop; informational only
    pub wait_time_secs: Option<u32>,
}

/// An ordered sequence of waypoints. Immutable after load.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Walk {
    pub id: WalkId,
    pub title: String,
    pub description: String,
    pub distance_km: f64,
    pub estimated_time: String,
    pub difficulty: String,
    pub start_location: Option<StartLocation>,
    waypoints: Vec<Waypoint>,
}

impl Walk {
    /// Build a walk; waypoints are put in `order` sequence (stable for ties)
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: WalkId,
        title: String,
        description: String,
        distance_km: f64,
        estimated_time: String,
        difficulty: String,
        start_location: Option<StartLocation>,
        mut waypoints: Vec<Waypoint>,
    ) -> Self {
        waypoints.sort_by_key(|w| w.order);
        Self {
            id,
            title,
            description,
            distance_km,
            estimated_time,
            difficulty,
            start_location,
            waypoints,
        }
    }

    pub fn waypoints(&self) -> &[Waypoint] {
        &self.waypoints
    }

    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }
}

/// All walks from the walk feed, in feed order
#[derive(Debug, Clone, Default)]
pub struct WalkLibrary {
    walks: Vec<Arc<Walk>>,
}

impl WalkLibrary {
    /// Empty library, used when the walk feed could not be loaded
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build from loaded walks; ids must be unique
    pub fn from_walks(walks: Vec<Walk>) -> Result<Self, FeedError> {
        let mut walks_out: Vec<Arc<Walk>> = Vec::with_capacity(walks.len());
        for walk in walks {
            if walks_out.iter().any(|w| w.id == walk.id) {
                return Err(FeedError::WalkFeedLoadFailed(format!("duplicate walk id {}", walk.id)));
            }
            walks_out.push(Arc::new(walk));
        }
        Ok(Self { walks: walks_out })
    }

    pub fn get(&self, id: &WalkId) -> Option<Arc<Walk>> {
        self.walks.iter().find(|w| &w.id == id).cloned()
    }

    pub fn walks(&self) -> &[Arc<Walk>] {
        &self.walks
    }

    pub fn len(&self) -> usize {
        self.walks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.walks.is_empty()
    }
}
