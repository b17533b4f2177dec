//! Guided walk state machine
//!
//! States:
//! - Idle → start(walk) → Intro
//! - Intro → acknowledge → AtWaypoint(0)
//! - AtWaypoint(i) → target entered → WaypointUnlocked(i)
//! - WaypointUnlocked(i) → advance → AtWaypoint(i+1) | Completed
//! - any → end → Idle
//!
//! Entering a waypoint spawns a route lookup and a distance refresh ticker.
//! Both report back through `WalkSignal`s tagged with the session epoch and
//! waypoint index; signals with an obsolete tag are discarded.


use crate::domain::error::{RouteError, WalkError};
use crate::domain::types::{epoch_ms, Coordinate, ProximityEvent, Target, TargetId, Transition, WalkId};
use crate::domain::walk::{StartLocation, Walk, WalkLibrary};
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::infra::task::ScopedTask;
use crate::services::catalog::StoryCatalog;
use crate::services::distance::{distance_km, km_to_m};
use crate::services::route::{RouteProvider, RouteSummary};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkState {
    Idle,
    Intro,
    AtWaypoint(usize),
    WaypointUnlocked(usize),
    Completed,
}

impl WalkState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WalkState::Idle => "idle",
            WalkState::Intro => "intro",
            WalkState::AtWaypoint(_) => "at_waypoint",
            WalkState::WaypointUnlocked(_) => "waypoint_unlocked",
            WalkState::Completed => "completed",
        }
    }

    pub fn waypoint_index(&self) -> Option<usize> {
        match self {
            WalkState::AtWaypoint(i) | WalkState::WaypointUnlocked(i) => Some(*i),
            _ => None,
        }
    }
}

/// Identifies the waypoint a background request was issued for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteTag {
    pub epoch: u64,
    pub waypoint: usize,
}

/// Results from the engine's background tasks
#[derive(Debug)]
pub enum WalkSignal {
    Route { tag: RouteTag, result: Result<RouteSummary, RouteError> },
    Refresh { tag: RouteTag },
}

/// Transition notifications for the presentation layer
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WalkNotice {
    Started {
        walk_id: WalkId,
        title: String,
        description: String,
        distance_km: f64,
        estimated_time: String,
        difficulty: String,
        start_location: Option<StartLocation>,
        waypoints: usize,
    },
    WaypointActive {
        index: usize,
        order: u32,
        target_id: TargetId,
        title: String,
        instruction: String,
        wait_time_secs: Option<u32>,
    },
    WaypointUnlocked {
        index: usize,
        target_id: TargetId,
        title: String,
    },
    WaypointDistance {
        index: usize,
        distance_m: u64,
        arrived: bool,
    },
    RouteReady {
        index: usize,
        route: RouteSummary,
    },
    RoutingDegraded {
        index: usize,
        direct_distance_m: u64,
        reason: String,
    },
    Progress {
        completed: usize,
        total: usize,
        fraction: f64,
    },
    Completed {
        walk_id: WalkId,
        title: String,
    },
    Ended {
        walk_id: WalkId,
    },
}

/// Waypoint with its story resolved from the catalog
#[derive(Debug, Clone)]
struct ResolvedWaypoint {
    order: u32,
    target: Target,
    instruction: String,
    wait_time_secs: Option<u32>,
}

/// Live state of the walk in progress
struct WalkSession {
    id: String,
    walk: Arc<Walk>,
    waypoints: Vec<ResolvedWaypoint>,
    index: usize,
    /// Completed waypoint indices in completion order, no duplicates.
    /// A story visited twice on one walk counts once per waypoint.
    completed: Vec<usize>,
    started_at: u64,
    route: Option<RouteSummary>,
    routing_degraded: bool,
    /// Position the active route was requested from
    route_origin: Option<Coordinate>,
    direct_distance_km: Option<f64>,
    route_task: Option<ScopedTask>,
    refresh_task: Option<ScopedTask>,
}

impl WalkSession {
    fn active(&self) -> &ResolvedWaypoint {
        &self.waypoints[self.index]
    }

    fn completed_targets(&self) -> Vec<TargetId> {
        self.completed.iter().map(|&i| self.waypoints[i].target.id.clone()).collect()
    }

    fn progress(&self) -> (usize, usize, f64) {
        let total = self.waypoints.len();
        let completed = self.completed.len();
        let fraction = if total == 0 { 0.0 } else { completed as f64 / total as f64 };
        (completed, total, fraction)
    }

    /// Drop the route lookup and ticker for the current waypoint
    fn release_waypoint_resources(&mut self) {
        if let Some(mut task) = self.route_task.take() {
            task.cancel();
        }
        if let Some(mut task) = self.refresh_task.take() {
            task.cancel();
        }
    }
}

/// Active waypoint as shown to the user
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WaypointView {
    pub index: usize,
    pub order: u32,
    pub target_id: TargetId,
    pub title: String,
    pub instruction: String,
    pub wait_time_secs: Option<u32>,
    pub unlocked: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WalkSnapshot {
    pub state: &'static str,
    pub walk_id: Option<WalkId>,
    pub title: Option<String>,
    pub session_id: Option<String>,
    pub started_at: Option<u64>,
    pub active_waypoint: Option<WaypointView>,
    pub total_waypoints: usize,
    pub completed: Vec<TargetId>,
    pub progress: f64,
    pub routing_degraded: bool,
    pub route: Option<RouteSummary>,
    pub direct_distance_m: Option<u64>,
}

/// Final tally of the last completed walk
struct FinishedWalk {
    walk_id: WalkId,
    title: String,
    completed: Vec<TargetId>,
    total: usize,
}

pub struct WalkEngine {
    library: WalkLibrary,
    state: WalkState,
    session: Option<WalkSession>,
    /// Last completed walk, reported while in `Completed`
    finished: Option<FinishedWalk>,
    /// Bumped per session so tags from older sessions never match
    epoch: u64,
    provider: Arc<dyn RouteProvider>,
    signal_tx: mpsc::Sender<WalkSignal>,
    refresh_interval: Duration,
    route_timeout: Duration,
    metrics: Arc<Metrics>,
}

impl WalkEngine {
    pub fn new(
        library: WalkLibrary,
        provider: Arc<dyn RouteProvider>,
        signal_tx: mpsc::Sender<WalkSignal>,
        config: &Config,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            library,
            state: WalkState::Idle,
            session: None,
            finished: None,
            epoch: 0,
            provider,
            signal_tx,
            refresh_interval: Duration::from_millis(config.refresh_interval_ms()),
            route_timeout: Duration::from_millis(config.routing_timeout_ms()),
            metrics,
        }
    }

    pub fn state(&self) -> WalkState {
        self.state
    }

    pub fn library(&self) -> &WalkLibrary {
        &self.library
    }

    /// Index of the waypoint currently being walked to
    pub fn current_waypoint_index(&self) -> Option<usize> {
        self.session.as_ref().map(|s| s.index)
    }

    /// Target of the active waypoint
    pub fn active_target(&self) -> Option<&TargetId> {
        self.state.waypoint_index()?;
        self.session.as_ref().map(|s| &s.active().target.id)
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    /// Select a walk and show its intro.
    ///
    /// Any walk in progress is ended first. Unknown ids leave the engine
    /// untouched.
    pub fn start(
        &mut self,
        walk_id: &WalkId,
        catalog: &StoryCatalog,
    ) -> Result<Vec<WalkNotice>, WalkError> {
        let walk = self.library.get(walk_id).ok_or_else(|| WalkError::WalkNotFound(walk_id.clone()))?;

        let mut waypoints = Vec::with_capacity(walk.len());
        for waypoint in walk.waypoints() {
            match catalog.get(&waypoint.target_id) {
                Some(target) => waypoints.push(ResolvedWaypoint {
                    order: waypoint.order,
                    target: target.clone(),
                    instruction: waypoint.instruction.clone(),
                    wait_time_secs: waypoint.wait_time_secs,
                }),
                None => warn!(
                    walk_id = %walk.id,
                    story_id = %waypoint.target_id,
                    "walk_waypoint_story_missing"
                ),
            }
        }
        if waypoints.is_empty() {
            return Err(WalkError::EmptyWalk(walk_id.clone()));
        }

        let mut notices = self.end();

        self.epoch += 1;
        let session_id = Uuid::now_v7().to_string();
        info!(
            walk_id = %walk.id,
            session_id = %session_id,
            waypoints = %waypoints.len(),
            "walk_started"
        );
        self.metrics.record_walk_started();

        notices.push(WalkNotice::Started {
            walk_id: walk.id.clone(),
            title: walk.title.clone(),
            description: walk.description.clone(),
            distance_km: walk.distance_km,
            estimated_time: walk.estimated_time.clone(),
            difficulty: walk.difficulty.clone(),
            start_location: walk.start_location.clone(),
            waypoints: waypoints.len(),
        });

        self.session = Some(WalkSession {
            id: session_id,
            walk,
            waypoints,
            index: 0,
            completed: Vec::new(),
            started_at: epoch_ms(),
            route: None,
            routing_degraded: false,
            route_origin: None,
            direct_distance_km: None,
            route_task: None,
            refresh_task: None,
        });
        self.state = WalkState::Intro;
        self.finished = None;

        Ok(notices)
    }

    /// Dismiss the intro and head for the first waypoint
    pub fn acknowledge(
        &mut self,
        catalog: &StoryCatalog,
        origin: Coordinate,
    ) -> Result<Vec<WalkNotice>, WalkError> {
        match self.state {
            WalkState::Intro => Ok(self.enter_waypoint(0, catalog, origin)),
            other => Err(WalkError::InvalidTransition { state: other.as_str(), action: "acknowledge" }),
        }
    }

    /// Move past an unlocked waypoint
    pub fn advance(
        &mut self,
        catalog: &StoryCatalog,
        origin: Coordinate,
    ) -> Result<Vec<WalkNotice>, WalkError> {
        match self.state {
            WalkState::WaypointUnlocked(i) => {
                let total = self.session.as_ref().map_or(0, |s| s.waypoints.len());
                if i + 1 < total {
                    Ok(self.enter_waypoint(i + 1, catalog, origin))
                } else {
                    Ok(self.complete())
                }
            }
            WalkState::AtWaypoint(i) => {
                let distance_m = self
                    .session
                    .as_ref()
                    .map(|s| {
                        let target = &s.active().target;
                        let km = catalog
                            .lock_state(&target.id)
                            .map(|l| l.distance_km)
                            .unwrap_or_else(|| distance_km(origin, target.coord));
                        km_to_m(km)
                    })
                    .unwrap_or(0);
                debug!(index = %i, distance_m = %distance_m, "walk_advance_rejected");
                Err(WalkError::WaypointNotReached { index: i, distance_m })
            }
            other => Err(WalkError::InvalidTransition { state: other.as_str(), action: "advance" }),
        }
    }

    /// Cancel the walk from any state. No-op while idle.
    pub fn end(&mut self) -> Vec<WalkNotice> {
        let mut notices = Vec::new();
        if let Some(mut session) = self.session.take() {
            session.release_waypoint_resources();
            info!(
                walk_id = %session.walk.id,
                session_id = %session.id,
                completed = %session.completed.len(),
                "walk_ended"
            );
            notices.push(WalkNotice::Ended { walk_id: session.walk.id.clone() });
        }
        self.state = WalkState::Idle;
        self.finished = None;
        notices
    }

    /// Feed a gate edge; only Entered for the active target matters
    pub fn on_proximity(&mut self, event: &ProximityEvent) -> Vec<WalkNotice> {
        let WalkState::AtWaypoint(i) = self.state else {
            return Vec::new();
        };
        if event.transition != Transition::Entered {
            return Vec::new();
        }
        match &self.session {
            Some(session) if session.active().target.id == event.target_id => self.unlock(i),
            _ => Vec::new(),
        }
    }

    /// Apply a background task result
    pub fn on_signal(&mut self, signal: WalkSignal, catalog: &StoryCatalog) -> Vec<WalkNotice> {
        match signal {
            WalkSignal::Route { tag, result } => self.on_route(tag, result),
            WalkSignal::Refresh { tag } => self.on_refresh(tag, catalog),
        }
    }

    fn is_current(&self, tag: RouteTag) -> bool {
        tag.epoch == self.epoch && self.state.waypoint_index() == Some(tag.waypoint)
    }

    fn on_route(&mut self, tag: RouteTag, result: Result<RouteSummary, RouteError>) -> Vec<WalkNotice> {
        if !self.is_current(tag) {
            self.metrics.record_route_stale();
            debug!(epoch = %tag.epoch, waypoint = %tag.waypoint, "route_result_stale");
            return Vec::new();
        }
        let Some(session) = self.session.as_mut() else {
            return Vec::new();
        };
        session.route_task = None;

        match result {
            Ok(route) => {
                debug!(
                    index = %tag.waypoint,
                    distance_m = %route.total_distance_m,
                    steps = %route.steps.len(),
                    "route_ready"
                );
                session.route = Some(route.clone());
                session.routing_degraded = false;
                vec![WalkNotice::RouteReady { index: tag.waypoint, route }]
            }
            Err(e) => {
                self.metrics.record_route_failure();
                let target = session.active().target.coord;
                let direct = session.route_origin.map_or(0.0, |o| distance_km(o, target));
                session.routing_degraded = true;
                session.route = None;
                session.direct_distance_km = Some(direct);
                warn!(index = %tag.waypoint, error = %e, "routing_unavailable");
                vec![WalkNotice::RoutingDegraded {
                    index: tag.waypoint,
                    direct_distance_m: km_to_m(direct),
                    reason: e.to_string(),
                }]
            }
        }
    }

    fn on_refresh(&mut self, tag: RouteTag, catalog: &StoryCatalog) -> Vec<WalkNotice> {
        if !self.is_current(tag) {
            debug!(epoch = %tag.epoch, waypoint = %tag.waypoint, "refresh_tick_stale");
            return Vec::new();
        }
        let WalkState::AtWaypoint(i) = self.state else {
            return Vec::new();
        };
        let Some(session) = self.session.as_ref() else {
            return Vec::new();
        };
        let Some(lock) = catalog.lock_state(&session.active().target.id) else {
            // No position evaluated yet
            return Vec::new();
        };

        let mut notices = vec![WalkNotice::WaypointDistance {
            index: i,
            distance_m: km_to_m(lock.distance_km),
            arrived: lock.unlocked,
        }];
        if lock.unlocked {
            notices.extend(self.unlock(i));
        }
        notices
    }

    fn enter_waypoint(
        &mut self,
        index: usize,
        catalog: &StoryCatalog,
        origin: Coordinate,
    ) -> Vec<WalkNotice> {
        let tag = RouteTag { epoch: self.epoch, waypoint: index };
        let provider = self.provider.clone();
        let signal_tx = self.signal_tx.clone();
        let refresh_interval = self.refresh_interval;
        let route_timeout = self.route_timeout;

        let Some(session) = self.session.as_mut() else {
            return Vec::new();
        };
        session.release_waypoint_resources();
        session.index = index;
        session.route = None;
        session.routing_degraded = false;
        session.direct_distance_km = None;
        session.route_origin = Some(origin);

        let waypoint = session.active().clone();
        let target_id = waypoint.target.id.clone();

        session.route_task = Some(spawn_route_request(
            provider,
            signal_tx.clone(),
            tag,
            origin,
            waypoint.target.coord,
            route_timeout,
        ));
        session.refresh_task = Some(spawn_refresh_ticker(signal_tx, tag, refresh_interval));
        self.metrics.record_route_request();

        let (completed, total, fraction) = session.progress();
        self.state = WalkState::AtWaypoint(index);

        info!(
            index = %index,
            order = %waypoint.order,
            target_id = %target_id,
            "walk_waypoint_active"
        );

        let mut notices = vec![
            WalkNotice::WaypointActive {
                index,
                order: waypoint.order,
                target_id: target_id.clone(),
                title: waypoint.target.title,
                instruction: waypoint.instruction,
                wait_time_secs: waypoint.wait_time_secs,
            },
            WalkNotice::Progress { completed, total, fraction },
        ];

        // The Entered edge may have fired before this waypoint became active
        if catalog.is_unlocked(&target_id) {
            notices.extend(self.unlock(index));
        }
        notices
    }

    fn unlock(&mut self, index: usize) -> Vec<WalkNotice> {
        let Some(session) = self.session.as_mut() else {
            return Vec::new();
        };
        let target = &session.active().target;
        let target_id = target.id.clone();
        let title = target.title.clone();

        if !session.completed.contains(&index) {
            session.completed.push(index);
            self.metrics.record_waypoint_unlocked();
        }
        if let Some(mut task) = session.refresh_task.take() {
            task.cancel();
        }
        let (completed, total, fraction) = session.progress();
        self.state = WalkState::WaypointUnlocked(index);

        info!(index = %index, target_id = %target_id, "walk_waypoint_unlocked");

        vec![
            WalkNotice::WaypointUnlocked { index, target_id, title },
            WalkNotice::Progress { completed, total, fraction },
        ]
    }

    fn complete(&mut self) -> Vec<WalkNotice> {
        let Some(mut session) = self.session.take() else {
            return Vec::new();
        };
        session.release_waypoint_resources();

        let walk_id = session.walk.id.clone();
        let title = session.walk.title.clone();
        info!(
            walk_id = %walk_id,
            session_id = %session.id,
            duration_ms = %epoch_ms().saturating_sub(session.started_at),
            "walk_completed"
        );
        self.metrics.record_walk_completed();

        self.state = WalkState::Completed;
        self.finished = Some(FinishedWalk {
            walk_id: walk_id.clone(),
            title: title.clone(),
            completed: session.completed_targets(),
            total: session.waypoints.len(),
        });
        vec![WalkNotice::Completed { walk_id, title }]
    }

    pub fn snapshot(&self) -> WalkSnapshot {
        let Some(session) = self.session.as_ref() else {
            let finished = self.finished.as_ref();
            let total = finished.map_or(0, |f| f.total);
            let completed = finished.map(|f| f.completed.clone()).unwrap_or_default();
            let progress = if total == 0 { 0.0 } else { completed.len() as f64 / total as f64 };
            return WalkSnapshot {
                state: self.state.as_str(),
                walk_id: finished.map(|f| f.walk_id.clone()),
                title: finished.map(|f| f.title.clone()),
                session_id: None,
                started_at: None,
                active_waypoint: None,
                total_waypoints: total,
                completed,
                progress,
                routing_degraded: false,
                route: None,
                direct_distance_m: None,
            };
        };

        let active_waypoint = self.state.waypoint_index().map(|index| {
            let waypoint = &session.waypoints[index];
            WaypointView {
                index,
                order: waypoint.order,
                target_id: waypoint.target.id.clone(),
                title: waypoint.target.title.clone(),
                instruction: waypoint.instruction.clone(),
                wait_time_secs: waypoint.wait_time_secs,
                unlocked: matches!(self.state, WalkState::WaypointUnlocked(_)),
            }
        });
        let (_, total, fraction) = session.progress();

        WalkSnapshot {
            state: self.state.as_str(),
            walk_id: Some(session.walk.id.clone()),
            title: Some(session.walk.title.clone()),
            session_id: Some(session.id.clone()),
            started_at: Some(session.started_at),
            active_waypoint,
            total_waypoints: total,
            completed: session.completed_targets(),
            progress: fraction,
            routing_degraded: session.routing_degraded,
            route: session.route.clone(),
            direct_distance_m: session.direct_distance_km.map(km_to_m),
        }
    }

    /// True while a route lookup or refresh ticker is alive
    pub fn has_live_resources(&self) -> bool {
        self.session.as_ref().is_some_and(|s| {
            s.route_task.as_ref().is_some_and(|t| t.is_active())
                || s.refresh_task.as_ref().is_some_and(|t| t.is_active())
        })
    }
}

fn spawn_route_request(
    provider: Arc<dyn RouteProvider>,
    signal_tx: mpsc::Sender<WalkSignal>,
    tag: RouteTag,
    origin: Coordinate,
    destination: Coordinate,
    timeout: Duration,
) -> ScopedTask {
    ScopedTask::spawn(async move {
        let result = match tokio::time::timeout(timeout, provider.route(origin, destination)).await {
            Ok(result) => result,
            Err(_) => Err(RouteError::Timeout),
        };
        // Receiver gone means the session loop has stopped
        let _ = signal_tx.send(WalkSignal::Route { tag, result }).await;
    })
}

fn spawn_refresh_ticker(
    signal_tx: mpsc::Sender<WalkSignal>,
    tag: RouteTag,
    period: Duration,
) -> ScopedTask {
    ScopedTask::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        // First tick completes immediately; entry already did a level check
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if signal_tx.send(WalkSignal::Refresh { tag }).await.is_err() {
                break;
            }
        }
    })
}
