//! Startup orchestration.
//!
//! Order: telemetry → queue transport → HTTP listener → queue worker.
//! Shutdown: stop accepting HTTP, close the queue and drain what it already
//! accepted, then drop the telemetry guard so buffered output is flushed last.

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::broadcast;

use crate::config::RelayConfig;
use crate::http::{handlers, AppState, HttpServer};
use crate::lifecycle::{signals, Shutdown};
use crate::observability::telemetry::{self, TelemetryError};
use crate::queue::{self, QueueError, QueueReceiver, QueueWorker};

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("telemetry initialization failed: {0}")]
    Telemetry(#[from] TelemetryError),

    #[error("queue transport unavailable: {0}")]
    Queue(#[from] QueueError),

    #[error("listener error: {0}")]
    Io(#[from] std::io::Error),
}

/// Run the relay until a termination signal arrives.
pub async fn run(config: RelayConfig) -> Result<(), StartupError> {
    let telemetry = telemetry::init(&config.telemetry)?;

    let config = Arc::new(config);
    let (queue, receiver) = queue::connect(&config.queue)?;
    let state = AppState::new(config.clone(), Arc::new(queue));

    let listener = TcpListener::bind(&config.server.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    tokio::spawn(signals::shutdown_on_signal(shutdown.clone()));

    let served = serve(state, receiver, listener, shutdown.subscribe()).await;

    tracing::info!("Shutdown complete");
    telemetry.shutdown();
    served.map_err(StartupError::from)
}

/// Serve HTTP and run the queue worker until `shutdown_rx` fires.
///
/// The listener stops first, so every request already accepted has finished
/// enqueueing before the worker is told to drain.
pub async fn serve(
    state: AppState,
    receiver: QueueReceiver,
    listener: TcpListener,
    shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), std::io::Error> {
    let drain = Shutdown::new();

    let worker_state = state.clone();
    let worker = tokio::spawn(QueueWorker::new(receiver).run(
        move |message| handlers::dequeue(worker_state.clone(), message),
        drain.subscribe(),
    ));

    let served = HttpServer::new(state).run(listener, shutdown_rx).await;

    drain.trigger();
    if let Err(e) = worker.await {
        tracing::error!(error = %e, "Queue worker panicked");
    }
    served
}
