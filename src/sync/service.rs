//! Runs a [`SyncEngine`] on a tokio task
//!
//! # State Machine
//!
//! ```text
//! Configured ──► Running ──► Stopped
//!                   │
//!            interval tick / HostEvent / cancel
//! ```
//!
//! All engine mutation happens on the one task, so ticks and input events
//! never interleave. The status file is read on the blocking pool; input
//! events keep flowing while a read is slow.

use super::SyncEngine;
use crate::controller::HostEvent;
use crate::status::FeedError;
use statum::{machine, state};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("sync task failed: {0}")]
    TaskFailed(String),

    #[error("sync service already shut down")]
    AlreadyStopped,
}

#[state]
#[derive(Debug, Clone)]
pub enum ServiceState {
    Configured,
    Running,
    Stopped,
}

#[machine]
pub struct SyncService<S: ServiceState> {
    engine: SyncEngine,
    poll_interval: Duration,
    events: mpsc::Receiver<HostEvent>,
    cancel: CancellationToken,
    ticks: u64,
}

impl<S: ServiceState> SyncService<S> {
    pub fn engine(&self) -> &SyncEngine {
        &self.engine
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }
}

impl SyncService<Configured> {
    pub fn create(
        engine: SyncEngine,
        poll_interval: Duration,
        events: mpsc::Receiver<HostEvent>,
        cancel: CancellationToken,
    ) -> Self {
        info!(
            "Configuring sync service: {} features, polling every {}ms",
            engine.features().len(),
            poll_interval.as_millis()
        );
        Self::new(engine, poll_interval, events, cancel, 0)
    }

    pub fn start(self) -> SyncService<Running> {
        info!("Starting sync service");
        self.transition()
    }
}

impl SyncService<Running> {
    /// Ticks on the poll interval and applies input events until cancelled
    pub async fn run_until_cancelled(mut self) -> SyncService<Stopped> {
        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut inputs_open = true;
        let mut reading: Option<JoinHandle<Result<Vec<u8>, FeedError>>> = None;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("Shutdown requested after {} ticks", self.ticks);
                    break;
                }

                // At most one read in flight; a slow file delays the next tick
                _ = interval.tick(), if reading.is_none() => {
                    let feed = self.engine.feed();
                    reading = Some(tokio::task::spawn_blocking(move || feed.lock().read()));
                }

                joined = async {
                    match reading.as_mut() {
                        Some(task) => task.await,
                        None => std::future::pending().await,
                    }
                }, if reading.is_some() => {
                    reading = None;
                    let read = joined.unwrap_or_else(|e| {
                        Err(FeedError::Unavailable(format!("status read task failed: {}", e)))
                    });
                    self.engine.tick_with_read(read);
                    self.ticks += 1;
                }

                event = self.events.recv(), if inputs_open => {
                    match event {
                        Some(event) => {
                            debug!("Host event: {:?}", event);
                            self.engine.handle_event(event);
                        }
                        None => {
                            warn!("Input channel closed, continuing on status ticks only");
                            inputs_open = false;
                        }
                    }
                }
            }
        }

        self.transition()
    }
}

impl SyncService<Stopped> {
    pub fn into_engine(self) -> SyncEngine {
        self.engine
    }
}

/// Owns the spawned service task
pub struct SyncServiceHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<SyncService<Stopped>>>,
}

impl SyncServiceHandle {
    pub fn spawn(service: SyncService<Configured>) -> Self {
        let cancel = service.cancel.clone();
        let running = service.start();
        let task = tokio::spawn(running.run_until_cancelled());
        Self {
            cancel,
            task: Some(task),
        }
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancels the loop and waits for it to wind down
    pub async fn shutdown(&mut self) -> Result<SyncService<Stopped>, ServiceError> {
        self.cancel.cancel();
        let task = self.task.take().ok_or(ServiceError::AlreadyStopped)?;
        match task.await {
            Ok(stopped) => {
                info!("Sync service stopped");
                Ok(stopped)
            }
            Err(e) => {
                error!("Sync task ended abnormally: {}", e);
                Err(ServiceError::TaskFailed(e.to_string()))
            }
        }
    }
}
