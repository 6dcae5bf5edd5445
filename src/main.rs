use color_eyre::{eyre::eyre, Result};
use flightsync::clock::TokioClock;
use flightsync::config::FlightConfig;
use flightsync::controller::{CollectorHandle, CollectorSettings};
use flightsync::device::RecordingSink;
use flightsync::status::FileStatusFeed;
use flightsync::sync::{SyncEngine, SyncService, SyncServiceHandle};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let config = FlightConfig::load_or_create()
        .await
        .map_err(|e| eyre!("Failed to load configuration: {}", e))?;
    info!(
        "Watching {} every {}ms",
        config.general.status_file.display(),
        config.general.poll_interval_ms
    );

    // No virtual joystick driver on this build; writes are logged
    let sink = Arc::new(RecordingSink::new());
    let feed = Box::new(FileStatusFeed::new(&config.general.status_file));
    let engine = SyncEngine::from_config(&config, feed, Arc::new(TokioClock::new()), sink)?;

    let (event_tx, event_rx) = mpsc::channel(1000);
    let settings = CollectorSettings {
        axis_epsilon: config.general.axis_epsilon,
        ..Default::default()
    };
    let _collector = match CollectorHandle::spawn(settings, event_tx).await {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!("Running without physical inputs: {}", e);
            None
        }
    };

    let service = SyncService::create(
        engine,
        config.general.poll_interval(),
        event_rx,
        CancellationToken::new(),
    );
    let mut handle = SyncServiceHandle::spawn(service);

    tokio::signal::ctrl_c().await?;
    info!("Ctrl-C received, shutting down");
    let stopped = handle.shutdown().await?;
    info!("Stopped after {} ticks", stopped.ticks());

    Ok(())
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}
