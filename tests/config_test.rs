//! Integration tests for configuration loading

use std::io::Write;
use storywalk::domain::Coordinate;
use storywalk::infra::Config;
use tempfile::NamedTempFile;

#[test]
fn test_load_config_from_file() {
    let mut temp_file = NamedTempFile::new().unwrap();

    let config_content = r#"
[feeds]
stories = "https://example.org/stories.json"
walks = "feeds/walks.json"
timeout_ms = 5000

[location]
default_latitude = 55.0
default_longitude = -1.6
fallback_timeout_ms = 10000
replay_file = "tracks/coast.jsonl"
replay_interval_ms = 500

[proximity]
unlock_radius_km = 0.2

[walk]
refresh_interval_ms = 1000

[routing]
enabled = false
service_url = "http://localhost:5000/route/v1"
profile = "walking"
timeout_ms = 3000

[notifications]
file = "out/notes.jsonl"
buffer = 16

[metrics]
interval_secs = 15
"#;

    temp_file.write_all(config_content.as_bytes()).unwrap();
    temp_file.flush().unwrap();

    let config = Config::from_file(temp_file.path()).unwrap();

    assert_eq!(config.stories_feed(), "https://example.org/stories.json");
    assert_eq!(config.walks_feed(), "feeds/walks.json");
    assert_eq!(config.feed_timeout_ms(), 5000);
    assert_eq!(config.default_position(), Coordinate::new(55.0, -1.6).unwrap());
    assert_eq!(config.fallback_timeout_ms(), 10_000);
    // Unset keys keep their defaults
    assert_eq!(config.high_accuracy_timeout_ms(), 20_000);
    assert_eq!(config.replay_file(), Some("tracks/coast.jsonl"));
    assert_eq!(config.replay_interval_ms(), 500);
    assert_eq!(config.unlock_radius_km(), 0.2);
    assert_eq!(config.refresh_interval_ms(), 1000);
    assert!(!config.routing_enabled());
    assert_eq!(config.routing_profile(), "walking");
    assert_eq!(config.routing_timeout_ms(), 3000);
    assert_eq!(config.notifications_file(), Some("out/notes.jsonl"));
    assert_eq!(config.notification_buffer(), 16);
    assert_eq!(config.metrics_interval_secs(), 15);
}

#[test]
fn test_load_from_path_fallback() {
    let config = Config::load_from_path("/nonexistent/config.toml");
    assert_eq!(config.unlock_radius_km(), 0.1);
    assert_eq!(config.default_position(), Coordinate::new(54.5, -1.5).unwrap());
    assert_eq!(config.routing_service_url(), "https://router.project-osrm.org/route/v1");
}

#[test]
fn test_invalid_file_falls_back() {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(b"[proximity]\nunlock_radius_km = -1.0\n").unwrap();
    temp_file.flush().unwrap();

    assert!(Config::from_file(temp_file.path()).is_err());
    let config = Config::load_from_path(temp_file.path().to_str().unwrap());
    assert_eq!(config.unlock_radius_km(), 0.1);
}

#[test]
fn test_zero_intervals_clamped() {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file
        .write_all(b"[location]\nreplay_interval_ms = 0\n\n[walk]\nrefresh_interval_ms = 0\n")
        .unwrap();
    temp_file.flush().unwrap();

    let config = Config::from_file(temp_file.path()).unwrap();
    assert_eq!(config.replay_interval_ms(), 1);
    assert_eq!(config.refresh_interval_ms(), 1);

    let config = Config::default().with_replay_file("track.jsonl", 0);
    assert_eq!(config.replay_interval_ms(), 1);
}

#[test]
fn test_bundled_dev_config_parses() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config/dev.toml");
    let config = Config::from_file(path).unwrap();
    assert_eq!(config.replay_file(), Some("data/track.jsonl"));
    assert_eq!(config.refresh_interval_ms(), 3000);
}
