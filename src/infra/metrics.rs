//! Lock-free metrics collection and periodic reporting
//!
//! Uses atomics so the watch task, route tasks and the control loop can
//! record without contention. Reporting swaps the per-interval values.
//!
//! NOTE: All atomics use Relaxed ordering intentionally; these are
//! statistical counters only and must not drive logic.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Exponential bucket boundaries (microseconds)
/// Buckets: ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, ≤25600, ≤51200, >51200
const BUCKET_BOUNDS: [u64; 10] = [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200];
const NUM_BUCKETS: usize = 11;

#[inline]
fn bucket_index(latency_us: u64) -> usize {
    BUCKET_BOUNDS.partition_point(|&bound| bound < latency_us)
}

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

#[inline]
fn swap_buckets(buckets: &[AtomicU64; NUM_BUCKETS]) -> [u64; NUM_BUCKETS] {
    let mut result = [0u64; NUM_BUCKETS];
    for (i, bucket) in buckets.iter().enumerate() {
        result[i] = bucket.swap(0, Ordering::Relaxed);
    }
    result
}

/// Upper bound of the bucket containing the percentile
fn percentile_from_buckets(buckets: &[u64; NUM_BUCKETS], percentile: f64) -> u64 {
    let total: u64 = buckets.iter().sum();
    if total == 0 {
        return 0;
    }
    let target = (total as f64 * percentile).ceil() as u64;
    let mut cumulative = 0u64;
    for (i, &count) in buckets.iter().enumerate() {
        cumulative += count;
        if cumulative >= target {
            return if i < BUCKET_BOUNDS.len() { BUCKET_BOUNDS[i] } else { BUCKET_BOUNDS[9] * 2 };
        }
    }
    BUCKET_BOUNDS[9] * 2
}

pub struct Metrics {
    /// Fresh position fixes accepted (monotonic)
    position_samples_total: AtomicU64,
    /// Fixes since last report
    position_samples_since_report: AtomicU64,
    /// Platform errors during one-shot or watch (monotonic)
    position_errors_total: AtomicU64,
    /// Fixes rejected for exceeding the maximum age (monotonic)
    stale_samples_total: AtomicU64,
    /// Position update processing latency histogram (reset on report)
    update_latency_buckets: [AtomicU64; NUM_BUCKETS],
    update_latency_sum_us: AtomicU64,
    update_latency_max_us: AtomicU64,
    /// Entered / Exited events emitted (monotonic)
    proximity_entered_total: AtomicU64,
    proximity_exited_total: AtomicU64,
    /// Route lookups issued / failed / discarded as stale (monotonic)
    route_requests_total: AtomicU64,
    route_failures_total: AtomicU64,
    route_stale_total: AtomicU64,
    /// Walk transitions (monotonic)
    walks_started_total: AtomicU64,
    walks_completed_total: AtomicU64,
    waypoints_unlocked_total: AtomicU64,
    /// Commands handled / rejected (monotonic)
    commands_total: AtomicU64,
    commands_rejected_total: AtomicU64,
    /// Notifications delivered / dropped on full channel (monotonic)
    notifications_total: AtomicU64,
    notifications_dropped: AtomicU64,
    last_report_time: Mutex<Instant>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            position_samples_total: AtomicU64::new(0),
            position_samples_since_report: AtomicU64::new(0),
            position_errors_total: AtomicU64::new(0),
            stale_samples_total: AtomicU64::new(0),
            update_latency_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            update_latency_sum_us: AtomicU64::new(0),
            update_latency_max_us: AtomicU64::new(0),
            proximity_entered_total: AtomicU64::new(0),
            proximity_exited_total: AtomicU64::new(0),
            route_requests_total: AtomicU64::new(0),
            route_failures_total: AtomicU64::new(0),
            route_stale_total: AtomicU64::new(0),
            walks_started_total: AtomicU64::new(0),
            walks_completed_total: AtomicU64::new(0),
            waypoints_unlocked_total: AtomicU64::new(0),
            commands_total: AtomicU64::new(0),
            commands_rejected_total: AtomicU64::new(0),
            notifications_total: AtomicU64::new(0),
            notifications_dropped: AtomicU64::new(0),
            last_report_time: Mutex::new(Instant::now()),
        }
    }

    #[inline]
    pub fn record_position_sample(&self) {
        self.position_samples_total.fetch_add(1, Ordering::Relaxed);
        self.position_samples_since_report.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_position_error(&self) {
        self.position_errors_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_stale_sample(&self) {
        self.stale_samples_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record time spent applying one position update (gate + walk engine)
    #[inline]
    pub fn record_update_latency(&self, latency_us: u64) {
        self.update_latency_sum_us.fetch_add(latency_us, Ordering::Relaxed);
        self.update_latency_buckets[bucket_index(latency_us)].fetch_add(1, Ordering::Relaxed);
        update_atomic_max(&self.update_latency_max_us, latency_us);
    }

    #[inline]
    pub fn record_proximity_event(&self, entered: bool) {
        if entered {
            self.proximity_entered_total.fetch_add(1, Ordering::Relaxed);
        } else {
            self.proximity_exited_total.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn record_route_request(&self) {
        self.route_requests_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_route_failure(&self) {
        self.route_failures_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_route_stale(&self) {
        self.route_stale_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_walk_started(&self) {
        self.walks_started_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_walk_completed(&self) {
        self.walks_completed_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_waypoint_unlocked(&self) {
        self.waypoints_unlocked_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_command(&self, rejected: bool) {
        self.commands_total.fetch_add(1, Ordering::Relaxed);
        if rejected {
            self.commands_rejected_total.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn record_notification(&self) {
        self.notifications_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_notification_dropped(&self) {
        self.notifications_dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn position_samples_total(&self) -> u64 {
        self.position_samples_total.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn position_errors_total(&self) -> u64 {
        self.position_errors_total.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn route_failures_total(&self) -> u64 {
        self.route_failures_total.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn notifications_dropped(&self) -> u64 {
        self.notifications_dropped.load(Ordering::Relaxed)
    }

    /// Build a summary; per-interval values are reset
    pub fn report(&self) -> MetricsSummary {
        let now = Instant::now();
        let elapsed_secs = {
            let mut last = self.last_report_time.lock();
            let elapsed = now.duration_since(*last).as_secs_f64();
            *last = now;
            elapsed
        };

        let samples_interval = self.position_samples_since_report.swap(0, Ordering::Relaxed);
        let samples_per_sec =
            if elapsed_secs > 0.0 { samples_interval as f64 / elapsed_secs } else { 0.0 };

        let lat_buckets = swap_buckets(&self.update_latency_buckets);
        let lat_sum = self.update_latency_sum_us.swap(0, Ordering::Relaxed);
        let lat_max = self.update_latency_max_us.swap(0, Ordering::Relaxed);
        let lat_count: u64 = lat_buckets.iter().sum();
        let lat_avg = if lat_count > 0 { lat_sum / lat_count } else { 0 };

        MetricsSummary {
            position_samples_total: self.position_samples_total.load(Ordering::Relaxed),
            samples_per_sec,
            position_errors_total: self.position_errors_total.load(Ordering::Relaxed),
            stale_samples_total: self.stale_samples_total.load(Ordering::Relaxed),
            update_lat_avg_us: lat_avg,
            update_lat_max_us: lat_max,
            update_lat_p99_us: percentile_from_buckets(&lat_buckets, 0.99),
            proximity_entered_total: self.proximity_entered_total.load(Ordering::Relaxed),
            proximity_exited_total: self.proximity_exited_total.load(Ordering::Relaxed),
            route_requests_total: self.route_requests_total.load(Ordering::Relaxed),
            route_failures_total: self.route_failures_total.load(Ordering::Relaxed),
            route_stale_total: self.route_stale_total.load(Ordering::Relaxed),
            walks_started_total: self.walks_started_total.load(Ordering::Relaxed),
            walks_completed_total: self.walks_completed_total.load(Ordering::Relaxed),
            waypoints_unlocked_total: self.waypoints_unlocked_total.load(Ordering::Relaxed),
            commands_total: self.commands_total.load(Ordering::Relaxed),
            commands_rejected_total: self.commands_rejected_total.load(Ordering::Relaxed),
            notifications_total: self.notifications_total.load(Ordering::Relaxed),
            notifications_dropped: self.notifications_dropped.load(Ordering::Relaxed),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct MetricsSummary {
    pub position_samples_total: u64,
    pub samples_per_sec: f64,
    pub position_errors_total: u64,
    pub stale_samples_total: u64,
    /// Position update processing latency (µs, this interval)
    pub update_lat_avg_us: u64,
    pub update_lat_max_us: u64,
    pub update_lat_p99_us: u64,
    pub proximity_entered_total: u64,
    pub proximity_exited_total: u64,
    pub route_requests_total: u64,
    pub route_failures_total: u64,
    pub route_stale_total: u64,
    pub walks_started_total: u64,
    pub walks_completed_total: u64,
    pub waypoints_unlocked_total: u64,
    pub commands_total: u64,
    pub commands_rejected_total: u64,
    pub notifications_total: u64,
    pub notifications_dropped: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            samples = %self.position_samples_total,
            samples_per_sec = %format!("{:.2}", self.samples_per_sec),
            position_errors = %self.position_errors_total,
            stale_samples = %self.stale_samples_total,
            update_lat_avg_us = %self.update_lat_avg_us,
            update_lat_max_us = %self.update_lat_max_us,
            update_lat_p99_us = %self.update_lat_p99_us,
            entered = %self.proximity_entered_total,
            exited = %self.proximity_exited_total,
            route_requests = %self.route_requests_total,
            route_failures = %self.route_failures_total,
            route_stale = %self.route_stale_total,
            walks_started = %self.walks_started_total,
            walks_completed = %self.walks_completed_total,
            waypoints_unlocked = %self.waypoints_unlocked_total,
            commands = %self.commands_total,
            commands_rejected = %self.commands_rejected_total,
            notifications = %self.notifications_total,
            notifications_dropped = %self.notifications_dropped,
            "metrics"
        );
    }
}
