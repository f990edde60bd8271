//! MIU playback engine - main entry point
//!
//! Runs the engine against the local reference collaborators: a music
//! library directory as the media resolver, a timer-driven transport in
//! place of a voice channel, and SQLite for persistence. Engine events are
//! written to the log.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use miu_common::config::{resolve_config_path, resolve_data_dir};
use miu_common::events::{EngineEvent, EventBus};
use miu_engine::collaborators::{ClockTransport, LocalLibraryResolver, SymphoniaProbe};
use miu_engine::db::SqliteStore;
use miu_engine::model::Requester;
use miu_engine::{Engine, EngineConfig, EngineDeps};
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for miu-engine
#[derive(Parser, Debug)]
#[command(name = "miu-engine")]
#[command(about = "Continuous playback engine for a shared listening channel")]
#[command(version)]
struct Args {
    /// Configuration file (defaults to MIU_CONFIG, then the user and system config dirs)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Data directory for the database and audio cache
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Directory of audio files served as the media library
    #[arg(short, long, env = "MIU_LIBRARY_DIR")]
    library_dir: Option<PathBuf>,

    /// Track ids to request at startup, in order
    #[arg(long = "play")]
    play: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = resolve_config_path(args.config.as_deref());
    let mut config =
        EngineConfig::load(config_path.as_deref()).context("Failed to load configuration")?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter(&config.logging.level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting MIU playback engine");
    match &config_path {
        Some(path) => info!("Configuration: {}", path.display()),
        None => info!("No configuration file, using defaults"),
    }

    let data_dir = resolve_data_dir(args.data_dir.as_deref(), config.storage.data_dir.as_deref());
    config.storage.data_dir = Some(data_dir.clone());
    if let Some(library_dir) = args.library_dir {
        config.storage.library_dir = Some(library_dir);
    }
    info!("Data directory: {}", data_dir.display());
    info!("Library directory: {}", config.storage.library_dir().display());

    let store = Arc::new(
        SqliteStore::open(&config.storage.database_path())
            .await
            .context("Failed to open database")?,
    );
    let probe = Arc::new(SymphoniaProbe::new());
    let resolver = Arc::new(LocalLibraryResolver::new(
        config.storage.library_dir(),
        probe.clone(),
    ));
    let events = EventBus::new(config.publisher.event_capacity);

    let deps = EngineDeps {
        store: store.clone(),
        resolver,
        transport: Arc::new(ClockTransport::new()),
        tracking: store,
        probe,
        events: events.clone(),
    };

    let engine = Engine::start(deps, config)
        .await
        .context("Failed to start playback engine")?;

    let logger = tokio::spawn(log_events(events));

    let requester = Requester::user("cli", "cli");
    for id in args.play {
        match engine.play(id.as_str(), requester.clone()).await {
            Ok(view) => info!(
                "Requested {} ({}) at position {}",
                id, view.track.title, view.position
            ),
            Err(e) => warn!("Request for {} refused: {}", id, e),
        }
    }

    shutdown_signal().await;

    engine.shutdown().await.context("Engine shutdown failed")?;
    logger.abort();

    info!("Shutdown complete");
    Ok(())
}

fn default_filter(level: &str) -> String {
    if level.contains('=') {
        level.to_string()
    } else {
        format!("miu_engine={level},miu_common={level}")
    }
}

/// Log every engine event until the bus closes
async fn log_events(events: EventBus) {
    let mut rx = events.subscribe();
    loop {
        match rx.recv().await {
            Ok(EngineEvent::StateSnapshot { snapshot, .. }) => debug!(
                status = ?snapshot.status,
                current = snapshot.current_track_id().unwrap_or("-"),
                queued = snapshot.queue.len(),
                position = snapshot.position,
                "State"
            ),
            Ok(event) => info!(event = event.event_type(), "{:?}", event),
            Err(RecvError::Lagged(missed)) => warn!(missed, "Event logger lagged"),
            Err(RecvError::Closed) => break,
        }
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
