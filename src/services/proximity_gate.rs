//! Proximity gating with per-target latches
//!
//! A target is unlocked while the user is within its radius (inclusive).
//! Each evaluation compares against the previous table and emits one event
//! per state change, so repeated positions produce no further events and a
//! target that is left and re-entered fires Exited then Entered again.

use crate::domain::types::{
    Coordinate, LockState, PositionSample, ProximityEvent, Target, TargetId, Transition,
};
use crate::services::distance::distance_km;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use tracing::debug;

/// Events from one evaluation; usually zero or one
pub type ProximityEvents = SmallVec<[ProximityEvent; 4]>;

/// Lock state per target, derived from the latest position
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LockTable {
    entries: FxHashMap<TargetId, LockState>,
}

impl LockTable {
    pub fn get(&self, id: &TargetId) -> Option<LockState> {
        self.entries.get(id).copied()
    }

    /// Unknown targets count as locked
    pub fn is_unlocked(&self, id: &TargetId) -> bool {
        self.entries.get(id).is_some_and(|s| s.unlocked)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn unlocked_count(&self) -> usize {
        self.entries.values().filter(|s| s.unlocked).count()
    }
}

/// Evaluate all targets against `position`.
///
/// Targets absent from `previous` are treated as previously locked. Targets
/// absent from `targets` are dropped from the new table.
pub fn evaluate(
    previous: &LockTable,
    targets: &[Target],
    position: Coordinate,
) -> (LockTable, ProximityEvents) {
    let mut entries = FxHashMap::with_capacity_and_hasher(targets.len(), Default::default());
    let mut events = ProximityEvents::new();

    for target in targets {
        let distance = distance_km(position, target.coord);
        let unlocked = distance <= target.radius_km;
        let was_unlocked = previous.is_unlocked(&target.id);

        if unlocked != was_unlocked {
            let transition = if unlocked { Transition::Entered } else { Transition::Exited };
            events.push(ProximityEvent {
                target_id: target.id.clone(),
                transition,
                distance_km: distance,
            });
        }

        entries.insert(target.id.clone(), LockState { unlocked, distance_km: distance });
    }

    (LockTable { entries }, events)
}

/// Stateful gate holding the latest lock table
#[derive(Debug, Default)]
pub struct ProximityGate {
    table: LockTable,
    last_position: Option<Coordinate>,
}

impl ProximityGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-evaluate for a new sample and return the edges crossed
    pub fn update(&mut self, targets: &[Target], sample: &PositionSample) -> ProximityEvents {
        let (table, events) = evaluate(&self.table, targets, sample.coord);
        self.table = table;
        self.last_position = Some(sample.coord);

        for event in &events {
            debug!(
                target_id = %event.target_id,
                transition = %event.transition.as_str(),
                distance_m = %(event.distance_km * 1000.0).round(),
                "proximity_transition"
            );
        }
        events
    }

    pub fn table(&self) -> &LockTable {
        &self.table
    }

    pub fn last_position(&self) -> Option<Coordinate> {
        self.last_position
    }

    pub fn is_unlocked(&self, id: &TargetId) -> bool {
        self.table.is_unlocked(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::Accuracy;

    fn target(id: &str, lat: f64, lon: f64) -> Target {
        Target {
            id: TargetId::new(id),
            title: id.to_string(),
            coord: Coordinate::new(lat, lon).unwrap(),
            category: "legend".to_string(),
            teaser: String::new(),
            content: String::new(),
            image_ref: String::new(),
            audio_ref: String::new(),
            radius_km: 0.1,
        }
    }

    fn at(lat: f64, lon: f64) -> PositionSample {
        PositionSample::new(Coordinate::new(lat, lon).unwrap(), 0, Accuracy::High)
    }

    #[test]
    fn test_same_coordinate_unlocks() {
        let targets = vec![target("worm", 54.8520, -1.5711)];
        let mut gate = ProximityGate::new();

        let events = gate.update(&targets, &at(54.8520, -1.5711));

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].transition, Transition::Entered);
        assert_eq!(events[0].distance_km, 0.0);
        assert!(gate.is_unlocked(&TargetId::new("worm")));
    }

    #[test]
    fn test_one_km_away_stays_locked() {
        let targets = vec![target("worm", 54.8520, -1.5711)];
        let mut gate = ProximityGate::new();

        // ~1 km north
        let events = gate.update(&targets, &at(54.8610, -1.5711));

        assert!(events.is_empty());
        let state = gate.table().get(&TargetId::new("worm")).unwrap();
        assert!(!state.unlocked);
        assert!((state.distance_km - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let mut t = target("edge", 0.0, 0.0);
        let position = Coordinate::new(0.0009, 0.0).unwrap();
        t.radius_km = distance_km(position, t.coord);

        let (table, events) = evaluate(&LockTable::default(), &[t], position);
        assert!(table.is_unlocked(&TargetId::new("edge")));
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_identical_sample_is_idempotent() {
        let targets = vec![target("worm", 54.8520, -1.5711), target("castle", 55.6090, -1.7109)];
        let mut gate = ProximityGate::new();
        let sample = at(54.8520, -1.5711);

        assert_eq!(gate.update(&targets, &sample).len(), 1);
        assert!(gate.update(&targets, &sample).is_empty());
    }

    #[test]
    fn test_leave_and_return_rearms() {
        let targets = vec![target("worm", 54.8520, -1.5711)];
        let mut gate = ProximityGate::new();

        let entered = gate.update(&targets, &at(54.8520, -1.5711));
        let exited = gate.update(&targets, &at(54.8700, -1.5711));
        let still_out = gate.update(&targets, &at(54.8800, -1.5711));
        let again = gate.update(&targets, &at(54.8521, -1.5711));

        assert_eq!(entered[0].transition, Transition::Entered);
        assert_eq!(exited[0].transition, Transition::Exited);
        assert!(still_out.is_empty());
        assert_eq!(again[0].transition, Transition::Entered);
    }

    #[test]
    fn test_removed_targets_dropped() {
        let worm = target("worm", 54.8520, -1.5711);
        let (table, _) = evaluate(&LockTable::default(), &[worm], Coordinate::new(54.852, -1.5711).unwrap());
        assert_eq!(table.len(), 1);

        let (table, events) = evaluate(&table, &[], Coordinate::new(54.852, -1.5711).unwrap());
        assert!(table.is_empty());
        assert!(events.is_empty());
    }

    #[test]
    fn test_unlocked_count() {
        let targets = vec![
            target("a", 10.0, 10.0),
            target("b", 10.0005, 10.0),
            target("c", 11.0, 10.0),
        ];
        let (table, events) = evaluate(&LockTable::default(), &targets, Coordinate::new(10.0, 10.0).unwrap());
        assert_eq!(table.unlocked_count(), 2);
        assert_eq!(events.len(), 2);
    }
}
