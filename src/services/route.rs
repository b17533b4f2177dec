//! Walking route lookup interface

use crate::domain::error::RouteError;
use crate::domain::types::Coordinate;
use async_trait::async_trait;
use serde::Serialize;

/// One turn-by-turn instruction
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteStep {
    pub text: String,
    pub distance_m: f64,
}

/// Path summary returned by a provider
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteSummary {
    pub total_distance_m: f64,
    pub total_time_s: f64,
    pub steps: Vec<RouteStep>,
}

impl RouteSummary {
    /// First `n` steps, for compact display
    pub fn key_steps(&self, n: usize) -> &[RouteStep] {
        &self.steps[..self.steps.len().min(n)]
    }
}

#[async_trait]
pub trait RouteProvider: Send + Sync {
    async fn route(
        &self,
        origin: Coordinate,
        destination: Coordinate,
    ) -> Result<RouteSummary, RouteError>;
}

/// Provider used when routing is switched off; always unavailable
pub struct DisabledRouteProvider;

#[async_trait]
impl RouteProvider for DisabledRouteProvider {
    async fn route(
        &self,
        _origin: Coordinate,
        _destination: Coordinate,
    ) -> Result<RouteSummary, RouteError> {
        Err(RouteError::Disabled)
    }
}
