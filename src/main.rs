//! Storywalk - location-gated storytelling guide
//!
//! Stories unlock when the user is physically near them; guided walks lead
//! from one story to the next.
//!
//! Module structure:
//! - `domain/` - Core types (Coordinate, Target, Walk, errors)
//! - `io/` - External interfaces (feeds, OSRM, replay track, console, sink)
//! - `services/` - Business logic (Geolocator, StoryCatalog, WalkEngine, GuideSession)
//! - `infra/` - Infrastructure (Config, Metrics, task handles)

use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use storywalk::domain::{AdvisoryKind, WalkLibrary};
use storywalk::infra::{Config, Metrics};
use storywalk::io::feed::check_walk_references;
use storywalk::io::{
    create_notification_channel, load_catalog, load_walks, run_console, NotificationSink,
    OsrmRouteProvider, ReplayPositionSource,
};
use storywalk::services::{
    DisabledRouteProvider, Geolocator, GuideSession, PositionSource, RouteProvider, StoryCatalog,
    UnsupportedSource,
};
use tokio::io::BufReader;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Storywalk - location-gated stories and guided walks
#[derive(Parser, Debug)]
#[command(name = "storywalk", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "config/dev.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging with configurable level via RUST_LOG env var
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // Logs go to stderr; stdout may carry the notification stream
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    info!(git_hash = %env!("GIT_HASH"), "storywalk starting");

    let args = Args::parse();
    let config = Config::load_from_path(&args.config);

    info!(
        config_file = %config.config_file(),
        stories_feed = %config.stories_feed(),
        walks_feed = %config.walks_feed(),
        unlock_radius_km = %config.unlock_radius_km(),
        default_position = %config.default_position(),
        replay_file = ?config.replay_file(),
        routing_enabled = %config.routing_enabled(),
        routing_service_url = %config.routing_service_url(),
        refresh_interval_ms = %config.refresh_interval_ms(),
        "config_loaded"
    );

    // Create shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let shutdown_tx = Arc::new(shutdown_tx);

    let metrics = Arc::new(Metrics::new());

    // Notifications: bounded channel drained by the JSONL sink
    let (notifier, notification_rx) =
        create_notification_channel(config.notification_buffer(), metrics.clone());
    let sink = NotificationSink::new(config.notifications_file());
    let sink_shutdown = shutdown_rx.clone();
    let sink_task = tokio::spawn(async move {
        sink.run(notification_rx, sink_shutdown).await;
    });

    // Feeds: failures degrade to empty content plus an advisory
    let feed_timeout = Duration::from_millis(config.feed_timeout_ms());
    let catalog =
        match load_catalog(config.stories_feed(), config.unlock_radius_km(), feed_timeout).await {
            Ok(catalog) => catalog,
            Err(e) => {
                warn!(error = %e, "story_feed_unavailable");
                notifier.advisory(AdvisoryKind::from(&e), e.to_string());
                StoryCatalog::empty()
            }
        };
    let library = match load_walks(config.walks_feed(), feed_timeout).await {
        Ok(library) => library,
        Err(e) => {
            warn!(error = %e, "walk_feed_unavailable");
            notifier.advisory(AdvisoryKind::from(&e), e.to_string());
            WalkLibrary::empty()
        }
    };
    check_walk_references(&library, &catalog);

    // Position source: recorded track if configured
    let source: Arc<dyn PositionSource> = match config.replay_file() {
        Some(path) => Arc::new(ReplayPositionSource::new(
            path,
            Duration::from_millis(config.replay_interval_ms()),
        )),
        None => {
            info!("position_source_unsupported");
            Arc::new(UnsupportedSource)
        }
    };
    let geolocator = Geolocator::new(source, &config, metrics.clone());

    let provider: Arc<dyn RouteProvider> = if config.routing_enabled() {
        match OsrmRouteProvider::new(&config) {
            Ok(provider) => Arc::new(provider),
            Err(e) => {
                warn!(error = %e, "routing_client_init_failed");
                Arc::new(DisabledRouteProvider)
            }
        }
    } else {
        info!("routing_disabled");
        Arc::new(DisabledRouteProvider)
    };

    // Start metrics reporter (lock-free reads with full summary)
    let metrics_clone = metrics.clone();
    let metrics_interval = config.metrics_interval_secs();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(metrics_interval));
        // First tick is immediate
        interval.tick().await;
        loop {
            interval.tick().await;
            metrics_clone.report().log();
        }
    });

    // Console commands from stdin
    let (command_tx, command_rx) = mpsc::channel(64);
    let console_shutdown = shutdown_tx.clone();
    let console_metrics = metrics.clone();
    tokio::spawn(async move {
        let stdin = BufReader::new(tokio::io::stdin());
        run_console(stdin, command_tx, console_shutdown, console_metrics).await;
    });

    // Handle shutdown on Ctrl+C
    let signal_shutdown = shutdown_tx.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = signal_shutdown.send(true);
    });

    let mut session =
        GuideSession::new(config, catalog, library, geolocator, provider, notifier, metrics.clone());

    // Run session - consumes samples and commands until shutdown
    session.run(command_rx, shutdown_rx).await;

    // Dropping the session closes the last notification sender
    drop(session);
    let _ = sink_task.await;

    metrics.report().log();
    info!("storywalk shutdown complete");
    Ok(())
}
