//! Story catalog: the master target list plus its live lock table

use crate::domain::error::{CatalogError, FeedError};
use crate::domain::types::{Coordinate, LockState, PositionSample, Target, TargetId};
use crate::services::distance::{distance_km, km_to_m};
use crate::services::proximity_gate::{LockTable, ProximityEvents, ProximityGate};
use rustc_hash::FxHashMap;
use serde::Serialize;
use tracing::info;

/// A target as listed to the user, with its current lock state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoryView {
    pub id: TargetId,
    pub title: String,
    pub category: String,
    pub teaser: String,
    pub unlocked: bool,
    /// Whole metres; absent before the first position update
    pub distance_m: Option<u64>,
}

#[derive(Debug, Default)]
pub struct StoryCatalog {
    targets: Vec<Target>,
    index: FxHashMap<TargetId, usize>,
    gate: ProximityGate,
}

impl StoryCatalog {
    /// Empty catalog, used when the feed could not be loaded
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build from loaded targets; ids must be unique
    pub fn from_targets(targets: Vec<Target>) -> Result<Self, FeedError> {
        let mut index = FxHashMap::with_capacity_and_hasher(targets.len(), Default::default());
        for (i, target) in targets.iter().enumerate() {
            if index.insert(target.id.clone(), i).is_some() {
                return Err(FeedError::CatalogLoadFailed(format!(
                    "duplicate story id {}",
                    target.id
                )));
            }
        }

        info!(stories = %targets.len(), "catalog_loaded");
        Ok(Self { targets, index, gate: ProximityGate::new() })
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    pub fn get(&self, id: &TargetId) -> Option<&Target> {
        self.index.get(id).map(|&i| &self.targets[i])
    }

    /// Recompute lock states for a new position
    pub fn apply_position(&mut self, sample: &PositionSample) -> ProximityEvents {
        self.gate.update(&self.targets, sample)
    }

    pub fn lock_table(&self) -> &LockTable {
        self.gate.table()
    }

    pub fn lock_state(&self, id: &TargetId) -> Option<LockState> {
        self.gate.table().get(id)
    }

    pub fn is_unlocked(&self, id: &TargetId) -> bool {
        self.gate.is_unlocked(id)
    }

    /// Case-insensitive title substring plus exact category; empty criteria
    /// match everything. Catalog order is kept.
    pub fn filter(&self, search: &str, category: &str) -> Vec<&Target> {
        let needle = search.trim().to_lowercase();
        let category = category.trim();

        self.targets
            .iter()
            .filter(|t| needle.is_empty() || t.title.to_lowercase().contains(&needle))
            .filter(|t| category.is_empty() || t.category == category)
            .collect()
    }

    /// Targets by ascending distance; ties keep catalog order
    pub fn proximity_order(&self, position: Coordinate) -> Vec<&Target> {
        let mut ranked: Vec<(f64, &Target)> =
            self.targets.iter().map(|t| (distance_km(position, t.coord), t)).collect();
        // sort_by is stable
        ranked.sort_by(|a, b| a.0.total_cmp(&b.0));
        ranked.into_iter().map(|(_, t)| t).collect()
    }

    /// Listing view of the given targets using the latest lock table
    pub fn views<'a>(&self, targets: impl IntoIterator<Item = &'a Target>) -> Vec<StoryView> {
        targets
            .into_iter()
            .map(|t| {
                let state = self.lock_state(&t.id);
                StoryView {
                    id: t.id.clone(),
                    title: t.title.clone(),
                    category: t.category.clone(),
                    teaser: t.teaser.clone(),
                    unlocked: state.is_some_and(|s| s.unlocked),
                    distance_m: state.map(|s| km_to_m(s.distance_km)),
                }
            })
            .collect()
    }

    /// Every target's lock state, catalog order
    pub fn locks(&self) -> Vec<StoryView> {
        self.views(&self.targets)
    }

    /// Story content, only while the user is within its radius
    pub fn open_story(&self, id: &TargetId) -> Result<&Target, CatalogError> {
        let target = self.get(id).ok_or_else(|| CatalogError::UnknownStory(id.clone()))?;
        match self.lock_state(id) {
            Some(state) if state.unlocked => Ok(target),
            state => Err(CatalogError::StoryLocked {
                distance_m: state.map(|s| km_to_m(s.distance_km)).unwrap_or(u64::MAX),
                radius_m: km_to_m(target.radius_km),
            }),
        }
    }

    /// Distinct categories in first-seen order
    pub fn categories(&self) -> Vec<&str> {
        let mut seen: Vec<&str> = Vec::new();
        for target in &self.targets {
            if !seen.contains(&target.category.as_str()) {
                seen.push(&target.category);
            }
        }
        seen
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::Accuracy;

    fn target(id: &str, title: &str, category: &str, lat: f64, lon: f64) -> Target {
        Target {
            id: TargetId::new(id),
            title: title.to_string(),
            coord: Coordinate::new(lat, lon).unwrap(),
            category: category.to_string(),
            teaser: format!("{title} teaser"),
            content: format!("{title} content"),
            image_ref: String::new(),
            audio_ref: String::new(),
            radius_km: 0.1,
        }
    }

    fn catalog() -> StoryCatalog {
        StoryCatalog::from_targets(vec![
            target("worm", "The Lambton Worm", "legend", 54.8520, -1.5711),
            target("grey", "The Grey Lady of Bamburgh Castle", "ghost", 55.6090, -1.7109),
            target("sockburn", "The Sockburn Worm", "legend", 54.4530, -1.4870),
            target("hob", "Hob Hurst", "folk", 54.8520, -1.5711),
        ])
        .unwrap()
    }

    fn at(lat: f64, lon: f64) -> PositionSample {
        PositionSample::new(Coordinate::new(lat, lon).unwrap(), 0, Accuracy::High)
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let result = StoryCatalog::from_targets(vec![
            target("a", "A", "x", 1.0, 1.0),
            target("a", "B", "x", 2.0, 2.0),
        ]);
        assert!(matches!(result, Err(FeedError::CatalogLoadFailed(_))));
    }

    #[test]
    fn test_filter_title_case_insensitive() {
        let catalog = catalog();
        let ids: Vec<&str> = catalog.filter("worm", "").iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["worm", "sockburn"]);

        let ids: Vec<&str> = catalog.filter("WORM", "").iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["worm", "sockburn"]);
    }

    #[test]
    fn test_filter_ignores_teaser() {
        let catalog = catalog();
        // "teaser" appears in every teaser but no title
        assert!(catalog.filter("teaser", "").is_empty());
    }

    #[test]
    fn test_filter_category_exact() {
        let catalog = catalog();
        let ids: Vec<&str> = catalog.filter("", "legend").iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["worm", "sockburn"]);
        assert!(catalog.filter("", "Legend").is_empty());
        assert_eq!(catalog.filter("grey", "ghost").len(), 1);
        assert!(catalog.filter("grey", "legend").is_empty());
    }

    #[test]
    fn test_filter_empty_matches_all() {
        assert_eq!(catalog().filter("", "").len(), 4);
    }

    #[test]
    fn test_proximity_order_stable_ties() {
        let catalog = catalog();
        let order: Vec<&str> = catalog
            .proximity_order(Coordinate::new(54.8520, -1.5711).unwrap())
            .iter()
            .map(|t| t.id.as_str())
            .collect();
        // worm and hob share a coordinate: catalog order decides
        assert_eq!(order, vec!["worm", "hob", "sockburn", "grey"]);
    }

    #[test]
    fn test_filter_reflects_latest_locks() {
        let mut catalog = catalog();
        catalog.apply_position(&at(54.8520, -1.5711));

        let views = catalog.views(catalog.filter("worm", ""));
        assert!(views[0].unlocked);
        assert_eq!(views[0].distance_m, Some(0));
        assert!(!views[1].unlocked);

        catalog.apply_position(&at(54.4530, -1.4870));
        let views = catalog.views(catalog.filter("worm", ""));
        assert!(!views[0].unlocked);
        assert!(views[1].unlocked);
    }

    #[test]
    fn test_open_story_requires_proximity() {
        let mut catalog = catalog();
        let worm = TargetId::new("worm");

        // No position yet
        assert!(matches!(catalog.open_story(&worm), Err(CatalogError::StoryLocked { .. })));

        catalog.apply_position(&at(54.8610, -1.5711));
        match catalog.open_story(&worm) {
            Err(CatalogError::StoryLocked { distance_m, radius_m }) => {
                assert_eq!(radius_m, 100);
                assert!((995..=1010).contains(&distance_m), "got {distance_m}");
            }
            other => panic!("expected locked, got {other:?}"),
        }

        catalog.apply_position(&at(54.8520, -1.5711));
        assert_eq!(catalog.open_story(&worm).unwrap().title, "The Lambton Worm");

        assert!(matches!(
            catalog.open_story(&TargetId::new("nope")),
            Err(CatalogError::UnknownStory(_))
        ));
    }

    #[test]
    fn test_locks_cover_all_targets() {
        let mut catalog = catalog();
        assert!(catalog.locks().iter().all(|v| v.distance_m.is_none()));

        catalog.apply_position(&at(54.8520, -1.5711));
        let locks = catalog.locks();
        assert_eq!(locks.len(), 4);
        let unlocked: Vec<&str> =
            locks.iter().filter(|v| v.unlocked).map(|v| v.id.as_str()).collect();
        assert_eq!(unlocked, vec!["worm", "hob"]);
    }

    #[test]
    fn test_categories() {
        assert_eq!(catalog().categories(), vec!["legend", "ghost", "folk"]);
    }
}
