//! Typed channel for user-facing notifications
//!
//! Producers never block: when the bounded channel is full the
//! notification is dropped and counted in metrics.

use crate::domain::error::AdvisoryKind;
use crate::domain::types::{epoch_ms, ProximityEvent, Target, TargetId, Transition};
use crate::infra::metrics::Metrics;
use crate::services::catalog::StoryView;
use crate::services::distance::km_to_m;
use crate::services::guide::GuideSnapshot;
use crate::services::walk_engine::WalkNotice;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

/// Everything the presentation layer is told about
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// A story was unlocked or locked again
    Proximity {
        ts: u64,
        target_id: TargetId,
        title: String,
        transition: Transition,
        distance_m: u64,
    },
    Walk {
        ts: u64,
        notice: WalkNotice,
    },
    /// Recovered failure; the app carries on with reduced functionality
    Advisory {
        ts: u64,
        kind: AdvisoryKind,
        message: String,
    },
    /// A command was refused
    Rejected {
        ts: u64,
        command: &'static str,
        kind: &'static str,
        message: String,
    },
    Snapshot {
        ts: u64,
        snapshot: Box<GuideSnapshot>,
    },
    /// Story listing (filter or nearby)
    Stories {
        ts: u64,
        query: String,
        stories: Vec<StoryView>,
    },
    /// Full content of an opened story
    Story {
        ts: u64,
        id: TargetId,
        title: String,
        category: String,
        content: String,
        #[serde(skip_serializing_if = "String::is_empty")]
        image: String,
        #[serde(skip_serializing_if = "String::is_empty")]
        audio: String,
    },
}

impl Notification {
    pub fn kind(&self) -> &'static str {
        match self {
            Notification::Proximity { .. } => "proximity",
            Notification::Walk { .. } => "walk",
            Notification::Advisory { .. } => "advisory",
            Notification::Rejected { .. } => "rejected",
            Notification::Snapshot { .. } => "snapshot",
            Notification::Stories { .. } => "stories",
            Notification::Story { .. } => "story",
        }
    }

    pub fn to_json(&self) -> String {
        // Serialization of these payloads cannot fail (string keys only)
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Sender handle for notifications
///
/// Clone this to share across producers.
#[derive(Clone)]
pub struct NotificationSender {
    tx: mpsc::Sender<Notification>,
    metrics: Arc<Metrics>,
    /// Epoch ms of the last drop warning, for rate limiting
    last_drop_warn: Arc<AtomicU64>,
}

impl NotificationSender {
    pub fn new(tx: mpsc::Sender<Notification>, metrics: Arc<Metrics>) -> Self {
        Self { tx, metrics, last_drop_warn: Arc::new(AtomicU64::new(0)) }
    }

    /// Queue a notification; dropped if the channel is full
    pub fn publish(&self, notification: Notification) {
        let kind = notification.kind();
        match self.tx.try_send(notification) {
            Ok(()) => self.metrics.record_notification(),
            Err(TrySendError::Full(_)) => {
                self.metrics.record_notification_dropped();
                // Rate-limit warning to 1 per second
                let now = epoch_ms();
                let last = self.last_drop_warn.load(Ordering::Relaxed);
                if now.saturating_sub(last) > 1000 {
                    self.last_drop_warn.store(now, Ordering::Relaxed);
                    warn!(kind = %kind, "notification_dropped: channel full");
                }
            }
            Err(TrySendError::Closed(_)) => {
                debug!(kind = %kind, "notification_channel_closed");
            }
        }
    }

    pub fn proximity(&self, event: &ProximityEvent, title: &str) {
        self.publish(Notification::Proximity {
            ts: epoch_ms(),
            target_id: event.target_id.clone(),
            title: title.to_string(),
            transition: event.transition,
            distance_m: km_to_m(event.distance_km),
        });
    }

    pub fn walk(&self, notice: WalkNotice) {
        self.publish(Notification::Walk { ts: epoch_ms(), notice });
    }

    pub fn advisory(&self, kind: AdvisoryKind, message: impl Into<String>) {
        self.publish(Notification::Advisory { ts: epoch_ms(), kind, message: message.into() });
    }

    pub fn rejected(&self, command: &'static str, kind: &'static str, message: String) {
        self.publish(Notification::Rejected { ts: epoch_ms(), command, kind, message });
    }

    pub fn snapshot(&self, snapshot: GuideSnapshot) {
        self.publish(Notification::Snapshot { ts: epoch_ms(), snapshot: Box::new(snapshot) });
    }

    pub fn stories(&self, query: impl Into<String>, stories: Vec<StoryView>) {
        self.publish(Notification::Stories { ts: epoch_ms(), query: query.into(), stories });
    }

    pub fn story(&self, target: &Target) {
        self.publish(Notification::Story {
            ts: epoch_ms(),
            id: target.id.clone(),
            title: target.title.clone(),
            category: target.category.clone(),
            content: target.content.clone(),
            image: target.image_ref.clone(),
            audio: target.audio_ref.clone(),
        });
    }
}

/// Create a new notification channel pair
///
/// Returns (sender, receiver) where sender can be cloned and shared.
pub fn create_notification_channel(
    buffer_size: usize,
    metrics: Arc<Metrics>,
) -> (NotificationSender, mpsc::Receiver<Notification>) {
    let (tx, rx) = mpsc::channel(buffer_size);
    (NotificationSender::new(tx, metrics), rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drop_when_full() {
        let metrics = Arc::new(Metrics::new());
        let (sender, mut rx) = create_notification_channel(1, metrics.clone());

        sender.advisory(AdvisoryKind::RoutingUnavailable, "first");
        sender.advisory(AdvisoryKind::RoutingUnavailable, "second");

        assert_eq!(metrics.notifications_dropped(), 1);
        match rx.try_recv().unwrap() {
            Notification::Advisory { message, .. } => assert_eq!(message, "first"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_closed_channel_does_not_count_drop() {
        let metrics = Arc::new(Metrics::new());
        let (sender, rx) = create_notification_channel(4, metrics.clone());
        drop(rx);

        sender.advisory(AdvisoryKind::LocationUnavailable, "gone");
        assert_eq!(metrics.notifications_dropped(), 0);
    }

    #[test]
    fn test_json_is_tagged() {
        let n = Notification::Advisory {
            ts: 1,
            kind: AdvisoryKind::CatalogLoadFailed,
            message: "boom".to_string(),
        };
        let v: serde_json::Value = serde_json::from_str(&n.to_json()).unwrap();
        assert_eq!(v["type"], "advisory");
        assert_eq!(v["kind"], "catalog_load_failed");
    }

    #[test]
    fn test_walk_notice_nested() {
        let n = Notification::Walk {
            ts: 1,
            notice: WalkNotice::Ended { walk_id: crate::domain::types::WalkId::new("w1") },
        };
        let v: serde_json::Value = serde_json::from_str(&n.to_json()).unwrap();
        assert_eq!(v["type"], "walk");
        assert_eq!(v["notice"]["event"], "ended");
        assert_eq!(v["notice"]["walk_id"], "w1");
    }

    #[test]
    fn test_proximity_rounds_distance() {
        let (sender, mut rx) = create_notification_channel(4, Arc::new(Metrics::new()));
        let event = ProximityEvent {
            target_id: TargetId::new("worm"),
            transition: Transition::Entered,
            distance_km: 0.0423,
        };
        sender.proximity(&event, "The Lambton Worm");

        match rx.try_recv().unwrap() {
            Notification::Proximity { distance_m, transition, .. } => {
                assert_eq!(distance_m, 42);
                assert_eq!(transition, Transition::Entered);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
