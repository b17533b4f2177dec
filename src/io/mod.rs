//! IO modules - external system interfaces
//!
//! This module contains all external IO operations:
//! - `feed` - story and walk feeds from file or http(s)
//! - `osrm` - OSRM HTTP client for walking routes
//! - `replay` - recorded position track as a position source
//! - `console` - line-based command input
//! - `notify_channel` - typed channel for user-facing notifications
//! - `notify_sink` - notification output (JSONL file or stdout)

pub mod console;
pub mod feed;
pub mod notify_channel;
pub mod notify_sink;
pub mod osrm;
pub mod replay;

// Re-export commonly used types
pub use console::{parse_line, run_console, ConsoleInput};
pub use feed::{load_catalog, load_walks};
pub use notify_channel::{create_notification_channel, Notification, NotificationSender};
pub use notify_sink::NotificationSink;
pub use osrm::OsrmRouteProvider;
pub use replay::ReplayPositionSource;
