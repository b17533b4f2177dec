//! Services - business logic and state management
//!
//! This module contains the core business logic services:
//! - `distance` - great-circle distance between coordinates
//! - `geolocator` - position acquisition policy over a platform source
//! - `proximity_gate` - per-target lock latches
//! - `catalog` - story list, filtering and gated access
//! - `route` - walking route provider interface
//! - `walk_engine` - guided walk state machine
//! - `guide` - session context and control loop

pub mod catalog;
pub mod distance;
pub mod geolocator;
pub mod guide;
pub mod proximity_gate;
pub mod route;
pub mod walk_engine;

// Re-export commonly used types
pub use catalog::{StoryCatalog, StoryView};
pub use geolocator::{Geolocator, PositionSource, UnsupportedSource};
pub use guide::{Command, GuideSession};
pub use route::{DisabledRouteProvider, RouteProvider};
pub use walk_engine::{WalkEngine, WalkState};
