//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml

use crate::domain::types::{Coordinate, DEFAULT_RADIUS_KM};
use anyhow::Context;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use tracing::warn;

#[derive(Debug, Clone, Deserialize)]
pub struct FeedsConfig {
    /// Story feed: file path or http(s) URL
    #[serde(default = "default_stories_feed")]
    pub stories: String,
    /// Walk feed: file path or http(s) URL
    #[serde(default = "default_walks_feed")]
    pub walks: String,
    #[serde(default = "default_feed_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for FeedsConfig {
    fn default() -> Self {
        Self {
            stories: default_stories_feed(),
            walks: default_walks_feed(),
            timeout_ms: default_feed_timeout_ms(),
        }
    }
}

fn default_stories_feed() -> String {
    "data/stories.json".to_string()
}

fn default_walks_feed() -> String {
    "data/walks.json".to_string()
}

fn default_feed_timeout_ms() -> u64 {
    10_000
}

#[derive(Debug, Clone, Deserialize)]
pub struct LocationConfig {
    /// Used when no fix can be obtained
    #[serde(default = "default_latitude")]
    pub default_latitude: f64,
    #[serde(default = "default_longitude")]
    pub default_longitude: f64,
    #[serde(default = "default_high_accuracy_timeout_ms")]
    pub high_accuracy_timeout_ms: u64,
    #[serde(default = "default_high_accuracy_max_age_ms")]
    pub high_accuracy_max_age_ms: u64,
    #[serde(default = "default_fallback_timeout_ms")]
    pub fallback_timeout_ms: u64,
    #[serde(default = "default_fallback_max_age_ms")]
    pub fallback_max_age_ms: u64,
    /// JSONL track replayed as the position source (none = unsupported)
    #[serde(default)]
    pub replay_file: Option<String>,
    /// Pacing between replayed fixes
    #[serde(default = "default_replay_interval_ms")]
    pub replay_interval_ms: u64,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            default_latitude: default_latitude(),
            default_longitude: default_longitude(),
            high_accuracy_timeout_ms: default_high_accuracy_timeout_ms(),
            high_accuracy_max_age_ms: default_high_accuracy_max_age_ms(),
            fallback_timeout_ms: default_fallback_timeout_ms(),
            fallback_max_age_ms: default_fallback_max_age_ms(),
            replay_file: None,
            replay_interval_ms: default_replay_interval_ms(),
        }
    }
}

fn default_latitude() -> f64 {
    54.5
}

fn default_longitude() -> f64 {
    -1.5
}

fn default_high_accuracy_timeout_ms() -> u64 {
    20_000
}

fn default_high_accuracy_max_age_ms() -> u64 {
    60_000
}

fn default_fallback_timeout_ms() -> u64 {
    15_000
}

fn default_fallback_max_age_ms() -> u64 {
    300_000
}

fn default_replay_interval_ms() -> u64 {
    1_000
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProximityConfig {
    /// Lock radius for stories whose feed record has none
    #[serde(default = "default_unlock_radius_km")]
    pub unlock_radius_km: f64,
}

impl Default for ProximityConfig {
    fn default() -> Self {
        Self { unlock_radius_km: default_unlock_radius_km() }
    }
}

fn default_unlock_radius_km() -> f64 {
    DEFAULT_RADIUS_KM
}

#[derive(Debug, Clone, Deserialize)]
pub struct WalkConfig {
    /// Distance refresh while a waypoint is active
    #[serde(default = "default_refresh_interval_ms")]
    pub refresh_interval_ms: u64,
}

impl Default for WalkConfig {
    fn default() -> Self {
        Self { refresh_interval_ms: default_refresh_interval_ms() }
    }
}

fn default_refresh_interval_ms() -> u64 {
    3_000
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoutingConfig {
    #[serde(default = "default_routing_enabled")]
    pub enabled: bool,
    #[serde(default = "default_routing_service_url")]
    pub service_url: String,
    #[serde(default = "default_routing_profile")]
    pub profile: String,
    #[serde(default = "default_routing_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            enabled: default_routing_enabled(),
            service_url: default_routing_service_url(),
            profile: default_routing_profile(),
            timeout_ms: default_routing_timeout_ms(),
        }
    }
}

fn default_routing_enabled() -> bool {
    true
}

fn default_routing_service_url() -> String {
    "https://router.project-osrm.org/route/v1".to_string()
}

fn default_routing_profile() -> String {
    "foot".to_string()
}

fn default_routing_timeout_ms() -> u64 {
    15_000
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationsConfig {
    /// JSONL output file; stdout when unset
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default = "default_notification_buffer")]
    pub buffer: usize,
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self { file: None, buffer: default_notification_buffer() }
    }
}

fn default_notification_buffer() -> usize {
    256
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval_secs")]
    pub interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval_secs() }
    }
}

fn default_metrics_interval_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub feeds: FeedsConfig,
    #[serde(default)]
    pub location: LocationConfig,
    #[serde(default)]
    pub proximity: ProximityConfig,
    #[serde(default)]
    pub walk: WalkConfig,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub notifications: NotificationsConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    stories_feed: String,
    walks_feed: String,
    feed_timeout_ms: u64,
    default_position: Coordinate,
    high_accuracy_timeout_ms: u64,
    high_accuracy_max_age_ms: u64,
    fallback_timeout_ms: u64,
    fallback_max_age_ms: u64,
    replay_file: Option<String>,
    replay_interval_ms: u64,
    unlock_radius_km: f64,
    refresh_interval_ms: u64,
    routing_enabled: bool,
    routing_service_url: String,
    routing_profile: String,
    routing_timeout_ms: u64,
    notifications_file: Option<String>,
    notification_buffer: usize,
    metrics_interval_secs: u64,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            stories_feed: default_stories_feed(),
            walks_feed: default_walks_feed(),
            feed_timeout_ms: default_feed_timeout_ms(),
            default_position: Coordinate {
                latitude: default_latitude(),
                longitude: default_longitude(),
            },
            high_accuracy_timeout_ms: default_high_accuracy_timeout_ms(),
            high_accuracy_max_age_ms: default_high_accuracy_max_age_ms(),
            fallback_timeout_ms: default_fallback_timeout_ms(),
            fallback_max_age_ms: default_fallback_max_age_ms(),
            replay_file: None,
            replay_interval_ms: default_replay_interval_ms(),
            unlock_radius_km: default_unlock_radius_km(),
            refresh_interval_ms: default_refresh_interval_ms(),
            routing_enabled: default_routing_enabled(),
            routing_service_url: default_routing_service_url(),
            routing_profile: default_routing_profile(),
            routing_timeout_ms: default_routing_timeout_ms(),
            notifications_file: None,
            notification_buffer: default_notification_buffer(),
            metrics_interval_secs: default_metrics_interval_secs(),
            config_file: "default".to_string(),
        }
    }
}

impl Config {
    /// Determine config file path from args or environment
    pub fn resolve_config_path(args: &[String]) -> String {
        for (i, arg) in args.iter().enumerate() {
            if arg == "--config" {
                if let Some(path) = args.get(i + 1) {
                    return path.clone();
                }
            }
            if let Some(path) = arg.strip_prefix("--config=") {
                return path.to_string();
            }
        }

        if let Ok(path) = env::var("CONFIG_FILE") {
            return path;
        }

        "config/dev.toml".to_string()
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Self::from_toml(toml_config, path.display().to_string())
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    fn from_toml(toml_config: TomlConfig, config_file: String) -> anyhow::Result<Self> {
        let location = toml_config.location;
        let default_position =
            Coordinate::new(location.default_latitude, location.default_longitude)
                .context("location.default_latitude/default_longitude")?;

        let unlock_radius_km = toml_config.proximity.unlock_radius_km;
        if !(unlock_radius_km.is_finite() && unlock_radius_km > 0.0) {
            anyhow::bail!("proximity.unlock_radius_km must be positive, got {unlock_radius_km}");
        }

        Ok(Self {
            stories_feed: toml_config.feeds.stories,
            walks_feed: toml_config.feeds.walks,
            feed_timeout_ms: toml_config.feeds.timeout_ms,
            default_position,
            high_accuracy_timeout_ms: location.high_accuracy_timeout_ms,
            high_accuracy_max_age_ms: location.high_accuracy_max_age_ms,
            fallback_timeout_ms: location.fallback_timeout_ms,
            fallback_max_age_ms: location.fallback_max_age_ms,
            replay_file: location.replay_file,
            replay_interval_ms: location.replay_interval_ms.max(1),
            unlock_radius_km,
            refresh_interval_ms: toml_config.walk.refresh_interval_ms.max(1),
            routing_enabled: toml_config.routing.enabled,
            routing_service_url: toml_config.routing.service_url,
            routing_profile: toml_config.routing.profile,
            routing_timeout_ms: toml_config.routing.timeout_ms,
            notifications_file: toml_config.notifications.file,
            notification_buffer: toml_config.notifications.buffer.max(1),
            metrics_interval_secs: toml_config.metrics.interval_secs.max(1),
            config_file,
        })
    }

    /// Load configuration - tries TOML file first, falls back to defaults
    pub fn load(args: &[String]) -> Self {
        Self::load_from_path(&Self::resolve_config_path(args))
    }

    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %format!("{e:#}"), "config_load_failed_using_defaults");
                Self::default()
            }
        }
    }

    pub fn stories_feed(&self) -> &str {
        &self.stories_feed
    }

    pub fn walks_feed(&self) -> &str {
        &self.walks_feed
    }

    pub fn feed_timeout_ms(&self) -> u64 {
        self.feed_timeout_ms
    }

    pub fn default_position(&self) -> Coordinate {
        self.default_position
    }

    pub fn high_accuracy_timeout_ms(&self) -> u64 {
        self.high_accuracy_timeout_ms
    }

    pub fn high_accuracy_max_age_ms(&self) -> u64 {
        self.high_accuracy_max_age_ms
    }

    pub fn fallback_timeout_ms(&self) -> u64 {
        self.fallback_timeout_ms
    }

    pub fn fallback_max_age_ms(&self) -> u64 {
        self.fallback_max_age_ms
    }

    pub fn replay_file(&self) -> Option<&str> {
        self.replay_file.as_deref()
    }

    pub fn replay_interval_ms(&self) -> u64 {
        self.replay_interval_ms
    }

    pub fn unlock_radius_km(&self) -> f64 {
        self.unlock_radius_km
    }

    pub fn refresh_interval_ms(&self) -> u64 {
        self.refresh_interval_ms
    }

    pub fn routing_enabled(&self) -> bool {
        self.routing_enabled
    }

    pub fn routing_service_url(&self) -> &str {
        &self.routing_service_url
    }

    pub fn routing_profile(&self) -> &str {
        &self.routing_profile
    }

    pub fn routing_timeout_ms(&self) -> u64 {
        self.routing_timeout_ms
    }

    pub fn notifications_file(&self) -> Option<&str> {
        self.notifications_file.as_deref()
    }

    pub fn notification_buffer(&self) -> usize {
        self.notification_buffer
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method for tests to shorten the refresh ticker
    pub fn with_refresh_interval_ms(mut self, ms: u64) -> Self {
        self.refresh_interval_ms = ms.max(1);
        self
    }

    /// Builder method for tests to point at a replay track
    pub fn with_replay_file(mut self, path: &str, interval_ms: u64) -> Self {
        self.replay_file = Some(path.to_string());
        self.replay_interval_ms = interval_ms.max(1);
        self
    }
}
