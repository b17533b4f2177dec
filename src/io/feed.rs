//! Story and walk feed loading
//!
//! Feeds are JSON documents read from a local path or fetched over
//! http(s). Any read, parse or validation failure is reported as the
//! matching `FeedError`; callers degrade to an empty catalog or library.

use crate::domain::error::FeedError;
use crate::domain::types::{Coordinate, Target, TargetId, WalkId};
use crate::domain::walk::{StartLocation, Walk, WalkLibrary, Waypoint};
use crate::services::catalog::StoryCatalog;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Ids appear as strings or bare numbers in feeds
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(i64),
}

impl RawId {
    fn into_string(self) -> String {
        match self {
            RawId::Text(s) => s,
            RawId::Number(n) => n.to_string(),
        }
    }
}

/// One entry of the story feed
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryRecord {
    id: RawId,
    pub title: String,
    #[serde(default)]
    pub category: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub teaser: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub audio: String,
    pub radius_km: Option<f64>,
}

impl StoryRecord {
    pub fn id(&self) -> String {
        self.id.clone().into_string()
    }

    fn into_target(self, default_radius_km: f64) -> Result<Target, FeedError> {
        let id = self.id();
        let coord = Coordinate::new(self.latitude, self.longitude)
            .map_err(|e| FeedError::CatalogLoadFailed(format!("story {id}: {e}")))?;
        let radius_km = self.radius_km.unwrap_or(default_radius_km);
        if !(radius_km > 0.0) {
            return Err(FeedError::CatalogLoadFailed(format!(
                "story {id}: radius must be positive, got {radius_km}"
            )));
        }

        Ok(Target {
            id: TargetId::new(id),
            title: self.title,
            coord,
            category: self.category,
            teaser: self.teaser,
            content: self.content,
            image_ref: self.image,
            audio_ref: self.audio,
            radius_km,
        })
    }
}

/// Validate records and build the catalog
pub fn catalog_from_records(
    records: Vec<StoryRecord>,
    default_radius_km: f64,
) -> Result<StoryCatalog, FeedError> {
    let targets = records
        .into_iter()
        .map(|r| r.into_target(default_radius_km))
        .collect::<Result<Vec<_>, _>>()?;
    StoryCatalog::from_targets(targets)
}

pub fn parse_catalog(json: &str, default_radius_km: f64) -> Result<StoryCatalog, FeedError> {
    let records: Vec<StoryRecord> =
        serde_json::from_str(json).map_err(|e| FeedError::CatalogLoadFailed(e.to_string()))?;
    catalog_from_records(records, default_radius_km)
}

pub async fn load_catalog(
    location: &str,
    default_radius_km: f64,
    timeout: Duration,
) -> Result<StoryCatalog, FeedError> {
    let body = read_source(location, timeout).await.map_err(FeedError::CatalogLoadFailed)?;
    let catalog = parse_catalog(&body, default_radius_km)?;
    info!(source = %location, stories = %catalog.len(), "story_feed_loaded");
    Ok(catalog)
}

/// Distance is a number in newer feeds and text like "2.5 km" in older ones
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RawDistance {
    Km(f64),
    Text(String),
}

impl RawDistance {
    fn km(&self) -> f64 {
        match self {
            RawDistance::Km(km) => *km,
            RawDistance::Text(text) => {
                let numeric: String = text
                    .trim()
                    .chars()
                    .take_while(|c| c.is_ascii_digit() || *c == '.')
                    .collect();
                numeric.parse().unwrap_or(0.0)
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartLocationRecord {
    #[serde(default)]
    name: String,
    latitude: f64,
    longitude: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WaypointRecord {
    order: u32,
    story_id: RawId,
    #[serde(default)]
    instruction: String,
    wait_time_seconds: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WalkRecord {
    id: RawId,
    title: String,
    #[serde(default)]
    description: String,
    #[serde(alias = "distance")]
    distance_km: Option<RawDistance>,
    #[serde(default)]
    estimated_time: String,
    #[serde(default)]
    difficulty: String,
    start_location: Option<StartLocationRecord>,
    #[serde(default)]
    waypoints: Vec<WaypointRecord>,
}

#[derive(Debug, Clone, Deserialize)]
struct WalkFeed {
    walks: Vec<WalkRecord>,
}

impl WalkRecord {
    fn into_walk(self) -> Result<Walk, FeedError> {
        let id = self.id.into_string();
        let start_location = self
            .start_location
            .map(|s| {
                Coordinate::new(s.latitude, s.longitude)
                    .map(|coord| StartLocation { name: s.name, coord })
                    .map_err(|e| FeedError::WalkFeedLoadFailed(format!("walk {id}: {e}")))
            })
            .transpose()?;
        let waypoints = self
            .waypoints
            .into_iter()
            .map(|w| Waypoint {
                order: w.order,
                target_id: TargetId::new(w.story_id.into_string()),
                instruction: w.instruction,
                wait_time_secs: w.wait_time_seconds,
            })
            .collect();

        Ok(Walk::new(
            WalkId::new(id),
            self.title,
            self.description,
            self.distance_km.map(|d| d.km()).unwrap_or(0.0),
            self.estimated_time,
            self.difficulty,
            start_location,
            waypoints,
        ))
    }
}

pub fn parse_walks(json: &str) -> Result<WalkLibrary, FeedError> {
    let feed: WalkFeed =
        serde_json::from_str(json).map_err(|e| FeedError::WalkFeedLoadFailed(e.to_string()))?;
    let walks = feed.walks.into_iter().map(WalkRecord::into_walk).collect::<Result<Vec<_>, _>>()?;
    WalkLibrary::from_walks(walks)
}

pub async fn load_walks(location: &str, timeout: Duration) -> Result<WalkLibrary, FeedError> {
    let body = read_source(location, timeout).await.map_err(FeedError::WalkFeedLoadFailed)?;
    let library = parse_walks(&body)?;
    info!(source = %location, walks = %library.len(), "walk_feed_loaded");
    Ok(library)
}

/// Warn about waypoints that point at stories missing from the catalog
pub fn check_walk_references(library: &WalkLibrary, catalog: &StoryCatalog) -> usize {
    let mut missing = 0;
    for walk in library.walks() {
        for waypoint in walk.waypoints() {
            if catalog.get(&waypoint.target_id).is_none() {
                missing += 1;
                warn!(walk_id = %walk.id, story_id = %waypoint.target_id, "walk_references_unknown_story");
            }
        }
    }
    missing
}

fn is_remote(location: &str) -> bool {
    location.starts_with("http://") || location.starts_with("https://")
}

async fn read_source(location: &str, timeout: Duration) -> Result<String, String> {
    if is_remote(location) {
        debug!(url = %location, "feed_fetch_started");
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| format!("http client: {e}"))?;
        let response = client
            .get(location)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| format!("{location}: {e}"))?;
        response.text().await.map_err(|e| format!("{location}: {e}"))
    } else {
        tokio::fs::read_to_string(location).await.map_err(|e| format!("{location}: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    const STORIES: &str = r#"[
        {"id": 1, "title": "The Lambton Worm", "category": "legend",
         "latitude": 54.852, "longitude": -1.5711,
         "teaser": "A monstrous worm", "content": "Long ago...",
         "image": "images/worm.jpg", "audio": "audio/worm.mp3"},
        {"id": "grey-lady", "title": "The Grey Lady", "category": "ghost",
         "latitude": 55.609, "longitude": -1.7109, "radiusKm": 0.25}
    ]"#;

    const WALKS: &str = r#"{"walks": [
        {"id": "durham", "title": "Durham Legends", "description": "City loop",
         "distance": "2.5 km", "estimatedTime": "1 hour", "difficulty": "easy",
         "startLocation": {"name": "Market Place", "latitude": 54.7767, "longitude": -1.5757},
         "waypoints": [
            {"order": 2, "storyId": "grey-lady", "instruction": "Then north", "waitTimeSeconds": 60},
            {"order": 1, "storyId": 1, "instruction": "Begin at the bridge"}
         ]},
        {"id": 7, "title": "Short", "distanceKm": 0.8, "waypoints": []}
    ]}"#;

    #[test]
    fn test_parse_catalog() {
        let catalog = parse_catalog(STORIES, 0.1).unwrap();
        assert_eq!(catalog.len(), 2);

        let worm = catalog.get(&TargetId::new("1")).unwrap();
        assert_eq!(worm.radius_km, 0.1);
        assert_eq!(worm.image_ref, "images/worm.jpg");

        let grey = catalog.get(&TargetId::new("grey-lady")).unwrap();
        assert_eq!(grey.radius_km, 0.25);
        assert!(grey.content.is_empty());
    }

    #[test]
    fn test_catalog_rejects_bad_coordinates() {
        let json = r#"[{"id": "x", "title": "X", "latitude": 95.0, "longitude": 0.0}]"#;
        assert!(matches!(parse_catalog(json, 0.1), Err(FeedError::CatalogLoadFailed(_))));
    }

    #[test]
    fn test_catalog_rejects_malformed_json() {
        assert!(matches!(parse_catalog("{not json", 0.1), Err(FeedError::CatalogLoadFailed(_))));
        assert!(matches!(
            parse_catalog(r#"[{"id": "x"}]"#, 0.1),
            Err(FeedError::CatalogLoadFailed(_))
        ));
    }

    #[test]
    fn test_catalog_rejects_zero_radius() {
        let json = r#"[{"id": "x", "title": "X", "latitude": 1.0, "longitude": 1.0, "radiusKm": 0}]"#;
        assert!(parse_catalog(json, 0.1).is_err());
    }

    #[test]
    fn test_parse_walks() {
        let library = parse_walks(WALKS).unwrap();
        assert_eq!(library.len(), 2);

        let durham = library.get(&WalkId::new("durham")).unwrap();
        assert_eq!(durham.distance_km, 2.5);
        assert_eq!(durham.start_location.as_ref().unwrap().name, "Market Place");
        let ids: Vec<&str> = durham.waypoints().iter().map(|w| w.target_id.as_str()).collect();
        assert_eq!(ids, vec!["1", "grey-lady"]);
        assert_eq!(durham.waypoints()[1].wait_time_secs, Some(60));

        let short = library.get(&WalkId::new("7")).unwrap();
        assert_eq!(short.distance_km, 0.8);
        assert!(short.is_empty());
    }

    #[test]
    fn test_walks_missing_root_key() {
        assert!(matches!(parse_walks("[]"), Err(FeedError::WalkFeedLoadFailed(_))));
    }

    #[test]
    fn test_check_walk_references() {
        let catalog = parse_catalog(STORIES, 0.1).unwrap();
        let library = parse_walks(
            r#"{"walks": [{"id": "w", "title": "W", "waypoints": [
                {"order": 1, "storyId": 1}, {"order": 2, "storyId": 99}]}]}"#,
        )
        .unwrap();
        assert_eq!(check_walk_references(&library, &catalog), 1);
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let dir = tempdir().unwrap();
        let stories = dir.path().join("stories.json");
        let walks = dir.path().join("walks.json");
        fs::write(&stories, STORIES).unwrap();
        fs::write(&walks, WALKS).unwrap();

        let timeout = Duration::from_secs(1);
        let catalog = load_catalog(stories.to_str().unwrap(), 0.1, timeout).await.unwrap();
        assert_eq!(catalog.len(), 2);
        let library = load_walks(walks.to_str().unwrap(), timeout).await.unwrap();
        assert_eq!(library.len(), 2);
    }

    #[tokio::test]
    async fn test_missing_file() {
        let timeout = Duration::from_secs(1);
        assert!(matches!(
            load_catalog("/nonexistent/stories.json", 0.1, timeout).await,
            Err(FeedError::CatalogLoadFailed(_))
        ));
        assert!(matches!(
            load_walks("/nonexistent/walks.json", timeout).await,
            Err(FeedError::WalkFeedLoadFailed(_))
        ));
    }

    #[test]
    fn test_remote_detection() {
        assert!(is_remote("https://example.org/stories.json"));
        assert!(!is_remote("data/stories.json"));
    }
}
