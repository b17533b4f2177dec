//! Domain models - core types for stories, positions and walks
//!
//! - `types` - coordinates, position samples, targets, proximity events
//! - `walk` - guided walk and waypoint definitions
//! - `error` - error taxonomy and advisory kinds

pub mod error;
pub mod types;
pub mod walk;

pub use error::{
    AdvisoryKind, CatalogError, CommandError, FeedError, LocationError, RouteError, WalkError,
};
pub use types::{
    Accuracy, Coordinate, LockState, PositionSample, ProximityEvent, Target, TargetId, Transition,
    WalkId,
};
pub use walk::{StartLocation, Walk, WalkLibrary, Waypoint};
