//! Walking routes from an OSRM HTTP service
//!
//! Request: `{service_url}/{profile}/{lon},{lat};{lon},{lat}?overview=false&steps=true`
//! Only the first route is used; its leg steps become the turn-by-turn list.

use crate::domain::error::RouteError;
use crate::domain::types::Coordinate;
use crate::infra::config::Config;
use crate::services::route::{RouteProvider, RouteStep, RouteSummary};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
struct OsrmResponse {
    code: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    routes: Vec<OsrmRoute>,
}

#[derive(Debug, Deserialize)]
struct OsrmRoute {
    distance: f64,
    duration: f64,
    #[serde(default)]
    legs: Vec<OsrmLeg>,
}

#[derive(Debug, Deserialize)]
struct OsrmLeg {
    #[serde(default)]
    steps: Vec<OsrmStep>,
}

#[derive(Debug, Deserialize)]
struct OsrmStep {
    distance: f64,
    #[serde(default)]
    name: String,
    maneuver: OsrmManeuver,
}

#[derive(Debug, Deserialize)]
struct OsrmManeuver {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    modifier: Option<String>,
}

/// Human-readable text for one step
fn step_text(step: &OsrmStep) -> String {
    let modifier = step.maneuver.modifier.as_deref().unwrap_or("");
    let action = match step.maneuver.kind.as_str() {
        "depart" => "Head out".to_string(),
        "arrive" => return "Arrive at your destination".to_string(),
        "turn" | "end of road" if !modifier.is_empty() => format!("Turn {modifier}"),
        "continue" | "new name" => {
            if modifier.is_empty() || modifier == "straight" {
                "Continue".to_string()
            } else {
                format!("Continue {modifier}")
            }
        }
        "fork" if !modifier.is_empty() => format!("Keep {modifier} at the fork"),
        "roundabout" | "rotary" => "Take the roundabout".to_string(),
        other => {
            let mut chars = other.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => "Continue".to_string(),
            }
        }
    };

    if step.name.is_empty() {
        action
    } else {
        format!("{action} onto {}", step.name)
    }
}

/// Turn a raw OSRM body into a summary
fn parse_response(body: &str) -> Result<RouteSummary, RouteError> {
    let response: OsrmResponse =
        serde_json::from_str(body).map_err(|e| RouteError::Provider(format!("bad response: {e}")))?;

    if response.code != "Ok" {
        let detail = match response.message {
            Some(message) => format!("{}: {message}", response.code),
            None => response.code,
        };
        return Err(RouteError::Provider(detail));
    }

    let route = response.routes.into_iter().next().ok_or(RouteError::EmptyResult)?;
    let steps = route
        .legs
        .iter()
        .flat_map(|leg| leg.steps.iter())
        .map(|step| RouteStep { text: step_text(step), distance_m: step.distance })
        .collect();

    Ok(RouteSummary { total_distance_m: route.distance, total_time_s: route.duration, steps })
}

pub struct OsrmRouteProvider {
    service_url: String,
    profile: String,
    client: reqwest::Client,
}

impl OsrmRouteProvider {
    pub fn new(config: &Config) -> Result<Self, RouteError> {
        Self::with_endpoint(
            config.routing_service_url(),
            config.routing_profile(),
            Duration::from_millis(config.routing_timeout_ms()),
        )
    }

    pub fn with_endpoint(
        service_url: &str,
        profile: &str,
        timeout: Duration,
    ) -> Result<Self, RouteError> {
        // Create HTTP client once for reuse (connection pooling)
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RouteError::Transport(e.to_string()))?;
        Ok(Self {
            service_url: service_url.trim_end_matches('/').to_string(),
            profile: profile.to_string(),
            client,
        })
    }

    pub fn route_url(&self, origin: Coordinate, destination: Coordinate) -> String {
        format!(
            "{}/{}/{},{};{},{}?overview=false&steps=true",
            self.service_url,
            self.profile,
            origin.longitude,
            origin.latitude,
            destination.longitude,
            destination.latitude
        )
    }
}

#[async_trait]
impl RouteProvider for OsrmRouteProvider {
    async fn route(
        &self,
        origin: Coordinate,
        destination: Coordinate,
    ) -> Result<RouteSummary, RouteError> {
        let start = Instant::now();
        let url = self.route_url(origin, destination);

        let response = self.client.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                RouteError::Timeout
            } else {
                RouteError::Transport(e.to_string())
            }
        })?;
        let status = response.status();
        let body = response.text().await.map_err(|e| RouteError::Transport(e.to_string()))?;

        // OSRM reports NoRoute and friends with 4xx plus a JSON body
        let result = parse_response(&body);
        if result.is_err() && !status.is_success() {
            warn!(status = %status, "osrm_http_error");
        }

        let latency_ms = start.elapsed().as_millis() as u64;
        match &result {
            Ok(summary) => debug!(
                latency_ms = %latency_ms,
                distance_m = %summary.total_distance_m,
                steps = %summary.steps.len(),
                "osrm_route_received"
            ),
            Err(e) => debug!(latency_ms = %latency_ms, error = %e, "osrm_route_failed"),
        }
        result
    }
}
