//! Guide session and event orchestration
//!
//! The GuideSession owns everything a running guide needs:
//! - Position acquisition (one-shot locate plus continuous watch)
//! - Story catalog and its lock table
//! - Walk engine and its background route/refresh signals
//! - Notification publishing
//!
//! All state changes happen on the single task running `run`.

mod handlers;

use crate::domain::error::{AdvisoryKind, LocationError};
use crate::domain::types::{Coordinate, PositionSample, TargetId, Transition, WalkId};
use crate::domain::walk::WalkLibrary;
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::infra::task::ScopedTask;
use crate::io::notify_channel::NotificationSender;
use crate::services::catalog::{StoryCatalog, StoryView};
use crate::services::geolocator::Geolocator;
use crate::services::route::RouteProvider;
use crate::services::walk_engine::{WalkEngine, WalkNotice, WalkSignal, WalkSnapshot};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

/// Buffer between the position watch callback and the session loop
const SAMPLE_BUFFER: usize = 64;
/// Buffer for route results and refresh ticks
const SIGNAL_BUFFER: usize = 64;

/// User commands accepted by the session
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    StartWalk(WalkId),
    /// Dismiss the walk intro
    Acknowledge,
    /// Continue to the next waypoint
    Advance,
    EndWalk,
    Filter { search: String, category: String },
    /// Stories by distance from the current position
    Nearby,
    OpenStory(TargetId),
    Status,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::StartWalk(_) => "start_walk",
            Command::Acknowledge => "acknowledge",
            Command::Advance => "advance",
            Command::EndWalk => "end_walk",
            Command::Filter { .. } => "filter",
            Command::Nearby => "nearby",
            Command::OpenStory(_) => "open_story",
            Command::Status => "status",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GuideSnapshot {
    pub position: Option<Coordinate>,
    pub captured_at: Option<u64>,
    /// True while the configured default coordinate stands in for a fix
    pub using_default_position: bool,
    pub stories: Vec<StoryView>,
    pub unlocked: usize,
    pub walk: WalkSnapshot,
}

pub struct GuideSession {
    pub(crate) config: Config,
    pub(crate) catalog: StoryCatalog,
    pub(crate) walks: WalkEngine,
    pub(crate) geolocator: Geolocator,
    pub(crate) notifier: NotificationSender,
    pub(crate) metrics: Arc<Metrics>,
    /// Latest good fix
    pub(crate) position: Option<PositionSample>,
    pub(crate) using_default_position: bool,
    signal_rx: mpsc::Receiver<WalkSignal>,
}

impl GuideSession {
    pub fn new(
        config: Config,
        catalog: StoryCatalog,
        library: WalkLibrary,
        geolocator: Geolocator,
        provider: Arc<dyn RouteProvider>,
        notifier: NotificationSender,
        metrics: Arc<Metrics>,
    ) -> Self {
        let (signal_tx, signal_rx) = mpsc::channel(SIGNAL_BUFFER);
        let walks = WalkEngine::new(library, provider, signal_tx, &config, metrics.clone());
        Self {
            config,
            catalog,
            walks,
            geolocator,
            notifier,
            metrics,
            position: None,
            using_default_position: false,
            signal_rx,
        }
    }

    pub fn catalog(&self) -> &StoryCatalog {
        &self.catalog
    }

    pub fn walks(&self) -> &WalkEngine {
        &self.walks
    }

    /// Current position, or the configured default when no fix is known
    pub fn origin(&self) -> Coordinate {
        self.position.map(|s| s.coord).unwrap_or_else(|| self.config.default_position())
    }

    /// One-shot fix. On failure the default coordinate is used for ordering
    /// and routing, and an advisory is published; it never unlocks stories.
    pub async fn locate(&mut self) -> Coordinate {
        let result = self.geolocator.request_once().await;
        self.on_located(result)
    }

    /// Apply the outcome of a one-shot request
    pub fn on_located(&mut self, result: Result<PositionSample, LocationError>) -> Coordinate {
        match result {
            Ok(sample) => {
                // A newer watch fix may have landed first
                if self.position.map_or(true, |p| p.captured_at <= sample.captured_at) {
                    self.apply_position(sample);
                }
                self.origin()
            }
            Err(e) => {
                let fallback = self.config.default_position();
                warn!(error = %e, fallback = %fallback, "using_default_position");
                if self.position.is_none() {
                    self.using_default_position = true;
                }
                self.notifier.advisory(
                    AdvisoryKind::LocationUnavailable,
                    format!("{e}; showing stories around the default location"),
                );
                self.origin()
            }
        }
    }

    /// Feed a fix through the gate and the walk engine
    pub fn apply_position(&mut self, sample: PositionSample) {
        let started = Instant::now();
        self.position = Some(sample);
        self.using_default_position = false;

        let events = self.catalog.apply_position(&sample);
        for event in &events {
            self.metrics.record_proximity_event(event.transition == Transition::Entered);
            let title = self.catalog.get(&event.target_id).map(|t| t.title.as_str()).unwrap_or("");
            self.notifier.proximity(event, title);

            let notices = self.walks.on_proximity(event);
            self.publish_walk(notices);
        }

        self.metrics.record_update_latency(started.elapsed().as_micros() as u64);
        debug!(
            position = %sample.coord,
            events = %events.len(),
            unlocked = %self.catalog.lock_table().unlocked_count(),
            "position_applied"
        );
    }

    /// Route result or refresh tick from the walk engine's tasks
    pub fn on_signal(&mut self, signal: WalkSignal) {
        let notices = self.walks.on_signal(signal, &self.catalog);
        self.publish_walk(notices);
    }

    pub(crate) fn publish_walk(&self, notices: Vec<WalkNotice>) {
        for notice in notices {
            if let WalkNotice::RoutingDegraded { reason, .. } = &notice {
                self.notifier.advisory(
                    AdvisoryKind::RoutingUnavailable,
                    format!("routing unavailable ({reason}); showing straight-line distance"),
                );
            }
            self.notifier.walk(notice);
        }
    }

    pub fn snapshot(&self) -> GuideSnapshot {
        GuideSnapshot {
            position: self.position.map(|s| s.coord),
            captured_at: self.position.map(|s| s.captured_at),
            using_default_position: self.using_default_position,
            stories: self.catalog.locks(),
            unlocked: self.catalog.lock_table().unlocked_count(),
            walk: self.walks.snapshot(),
        }
    }

    /// Main loop - runs until shutdown is signalled
    ///
    /// Positions come from the geolocator's watch callback through a bounded
    /// channel; when it is full the sample is skipped and the next one is
    /// used instead. The initial one-shot fix runs on its own task and is
    /// applied when it lands, followed by the nearby listing.
    pub async fn run(
        &mut self,
        mut commands: mpsc::Receiver<Command>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let (locate_tx, mut locate_rx) = oneshot::channel();
        let request = self.geolocator.one_shot();
        let _locate_task = ScopedTask::spawn(async move {
            let _ = locate_tx.send(request.run().await);
        });
        let mut locating = true;

        let (sample_tx, mut sample_rx) = mpsc::channel::<PositionSample>(SAMPLE_BUFFER);
        self.geolocator.start_watching(move |sample| {
            if sample_tx.try_send(sample).is_err() {
                debug!(position = %sample.coord, "position_sample_skipped");
            }
        });
        info!(
            stories = %self.catalog.len(),
            walks = %self.walks.library().len(),
            "guide_session_started"
        );

        let mut commands_open = true;
        loop {
            tokio::select! {
                result = shutdown.changed() => {
                    if result.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                result = &mut locate_rx, if locating => {
                    locating = false;
                    self.on_located(result.unwrap_or(Err(LocationError::PositionUnavailable)));
                    self.handle_command(Command::Nearby);
                }
                Some(sample) = sample_rx.recv() => {
                    self.apply_position(sample);
                }
                Some(signal) = self.signal_rx.recv() => {
                    self.on_signal(signal);
                }
                command = commands.recv(), if commands_open => {
                    match command {
                        Some(c) => self.handle_command(c),
                        None => {
                            // Input closed; keep following the position
                            commands_open = false;
                            debug!("command_channel_closed");
                        }
                    }
                }
            }
        }

        self.shutdown();
    }

    /// Release the watch and any walk in progress
    pub fn shutdown(&mut self) {
        self.geolocator.stop_watching();
        let notices = self.walks.end();
        self.publish_walk(notices);
        info!("guide_session_stopped");
    }
}
