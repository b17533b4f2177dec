//! Infrastructure - configuration, metrics, task handles
//!
//! - `config` - Application configuration (TOML loading, defaults)
//! - `metrics` - Lock-free metrics collection
//! - `task` - Abort-on-drop handle for spawned helper tasks

pub mod config;
pub mod metrics;
pub mod task;

pub use config::Config;
pub use metrics::Metrics;
pub use task::ScopedTask;
