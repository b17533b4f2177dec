//! Position acquisition
//!
//! Wraps a platform `PositionSource` with the acquisition policy:
//! - one-shot: high accuracy first, then one relaxed retry
//! - continuous: samples forwarded to a callback, failures logged,
//!   last good position retained
//! - stale fixes (older than the allowed maximum age) are rejected

use crate::domain::error::LocationError;
use crate::domain::types::{epoch_ms, PositionSample};
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::infra::task::ScopedTask;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Options passed to the platform for a fix
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionOptions {
    pub high_accuracy: bool,
    pub timeout: Duration,
    pub maximum_age: Duration,
}

impl PositionOptions {
    /// First attempt: precise, generous timeout
    pub fn high_accuracy(config: &Config) -> Self {
        Self {
            high_accuracy: true,
            timeout: Duration::from_millis(config.high_accuracy_timeout_ms()),
            maximum_age: Duration::from_millis(config.high_accuracy_max_age_ms()),
        }
    }

    /// Retry: coarse, accepts older fixes
    pub fn relaxed(config: &Config) -> Self {
        Self {
            high_accuracy: false,
            timeout: Duration::from_millis(config.fallback_timeout_ms()),
            maximum_age: Duration::from_millis(config.fallback_max_age_ms()),
        }
    }
}

/// Stream of fixes produced by a continuous watch
pub type PositionStream = mpsc::Receiver<Result<PositionSample, LocationError>>;

/// Platform position API
#[async_trait]
pub trait PositionSource: Send + Sync {
    /// One-shot fix; may suspend for as long as the platform takes
    async fn current_position(
        &self,
        options: PositionOptions,
    ) -> Result<PositionSample, LocationError>;

    /// Continuous fixes until the receiver is dropped
    fn watch(&self, options: PositionOptions) -> PositionStream;
}

/// Source for platforms without geolocation
pub struct UnsupportedSource;

#[async_trait]
impl PositionSource for UnsupportedSource {
    async fn current_position(
        &self,
        _options: PositionOptions,
    ) -> Result<PositionSample, LocationError> {
        Err(LocationError::Unsupported)
    }

    fn watch(&self, _options: PositionOptions) -> PositionStream {
        // Sender dropped immediately: the stream ends without samples
        let (_tx, rx) = mpsc::channel(1);
        rx
    }
}

/// Handle to a running position watch. Cancelling is idempotent.
#[derive(Debug, Clone)]
pub struct WatchHandle {
    id: u64,
    task: Arc<Mutex<Option<ScopedTask>>>,
}

impl WatchHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn cancel(&self) {
        if let Some(mut task) = self.task.lock().take() {
            task.cancel();
            debug!(watch_id = %self.id, "position_watch_cancelled");
        }
    }

    pub fn is_active(&self) -> bool {
        self.task.lock().as_ref().is_some_and(|t| t.is_active())
    }
}

/// One-shot acquisition detached from the Geolocator, so it can run on
/// its own task while the caller keeps serving other events
#[derive(Clone)]
pub struct PositionRequest {
    source: Arc<dyn PositionSource>,
    primary: PositionOptions,
    fallback: PositionOptions,
    last_known: Arc<RwLock<Option<PositionSample>>>,
    metrics: Arc<Metrics>,
}

impl PositionRequest {
    /// High accuracy first, then a single relaxed retry.
    ///
    /// Returns the retry's error when both attempts fail; the caller decides
    /// on a fallback position.
    pub async fn run(&self) -> Result<PositionSample, LocationError> {
        match self.attempt(self.primary).await {
            Ok(sample) => Ok(sample),
            Err(e) => {
                warn!(error = %e, "position_high_accuracy_failed");
                match self.attempt(self.fallback).await {
                    Ok(sample) => Ok(sample),
                    Err(e) => {
                        warn!(error = %e, "position_unavailable");
                        Err(e)
                    }
                }
            }
        }
    }

    async fn attempt(&self, options: PositionOptions) -> Result<PositionSample, LocationError> {
        let result = tokio::time::timeout(options.timeout, self.source.current_position(options))
            .await
            .map_err(|_| LocationError::Timeout)
            .and_then(|r| r);

        let sample = match result {
            Ok(sample) => sample,
            Err(e) => {
                self.metrics.record_position_error();
                return Err(e);
            }
        };

        let age_ms = sample.age_ms(epoch_ms());
        if age_ms > options.maximum_age.as_millis() as u64 {
            self.metrics.record_stale_sample();
            return Err(LocationError::Stale { age_ms });
        }

        self.metrics.record_position_sample();
        *self.last_known.write() = Some(sample);
        info!(
            position = %sample.coord,
            accuracy = %sample.accuracy.as_str(),
            high_accuracy = %options.high_accuracy,
            "position_acquired"
        );
        Ok(sample)
    }
}

static NEXT_WATCH_ID: AtomicU64 = AtomicU64::new(1);

pub struct Geolocator {
    source: Arc<dyn PositionSource>,
    primary: PositionOptions,
    fallback: PositionOptions,
    last_known: Arc<RwLock<Option<PositionSample>>>,
    active_watch: Option<WatchHandle>,
    metrics: Arc<Metrics>,
}

impl Geolocator {
    pub fn new(source: Arc<dyn PositionSource>, config: &Config, metrics: Arc<Metrics>) -> Self {
        Self::with_options(
            source,
            PositionOptions::high_accuracy(config),
            PositionOptions::relaxed(config),
            metrics,
        )
    }

    pub fn with_options(
        source: Arc<dyn PositionSource>,
        primary: PositionOptions,
        fallback: PositionOptions,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            source,
            primary,
            fallback,
            last_known: Arc::new(RwLock::new(None)),
            active_watch: None,
            metrics,
        }
    }

    /// Last good fix from either a one-shot request or the watch
    pub fn last_known(&self) -> Option<PositionSample> {
        *self.last_known.read()
    }

    /// Handle for a one-shot fix that can be moved onto another task
    pub fn one_shot(&self) -> PositionRequest {
        PositionRequest {
            source: self.source.clone(),
            primary: self.primary,
            fallback: self.fallback,
            last_known: self.last_known.clone(),
            metrics: self.metrics.clone(),
        }
    }

    /// One-shot fix with a single relaxed retry
    pub async fn request_once(&self) -> Result<PositionSample, LocationError> {
        self.one_shot().run().await
    }

    /// Start continuous watching, replacing any active watch.
    ///
    /// `on_sample` is called for each fresh fix in arrival order.
    pub fn start_watching<F>(&mut self, on_sample: F) -> WatchHandle
    where
        F: FnMut(PositionSample) + Send + 'static,
    {
        self.stop_watching();

        let options = self.primary;
        let stream = self.source.watch(options);
        let id = NEXT_WATCH_ID.fetch_add(1, Ordering::Relaxed);
        let task = ScopedTask::spawn(run_watch(
            id,
            stream,
            self.last_known.clone(),
            self.metrics.clone(),
            options.maximum_age,
            on_sample,
        ));

        let handle = WatchHandle { id, task: Arc::new(Mutex::new(Some(task))) };
        info!(watch_id = %id, "position_watch_started");
        self.active_watch = Some(handle.clone());
        handle
    }

    /// Cancel the active watch, if any. Idempotent.
    pub fn stop_watching(&mut self) {
        if let Some(handle) = self.active_watch.take() {
            handle.cancel();
        }
    }

    pub fn is_watching(&self) -> bool {
        self.active_watch.as_ref().is_some_and(|h| h.is_active())
    }
}

impl Drop for Geolocator {
    fn drop(&mut self) {
        self.stop_watching();
    }
}

async fn run_watch<F>(
    id: u64,
    mut stream: PositionStream,
    last_known: Arc<RwLock<Option<PositionSample>>>,
    metrics: Arc<Metrics>,
    maximum_age: Duration,
    mut on_sample: F,
) where
    F: FnMut(PositionSample) + Send + 'static,
{
    let max_age_ms = maximum_age.as_millis() as u64;

    while let Some(item) = stream.recv().await {
        match item {
            Ok(sample) => {
                let age_ms = sample.age_ms(epoch_ms());
                if age_ms > max_age_ms {
                    metrics.record_stale_sample();
                    debug!(watch_id = %id, age_ms = %age_ms, "position_sample_stale");
                    continue;
                }
                metrics.record_position_sample();
                *last_known.write() = Some(sample);
                on_sample(sample);
            }
            Err(e) => {
                // Keep the previous position
                metrics.record_position_error();
                warn!(watch_id = %id, error = %e, "position_watch_error");
            }
        }
    }

    info!(watch_id = %id, "position_watch_ended");
}
