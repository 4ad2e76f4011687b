use std::sync::Arc;

use anyhow::Result;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::broadcast;

use vcode_broker::config::Settings;
use vcode_broker::server::{create_app, AppState};
use vcode_broker::shutdown::GracefulShutdown;
use vcode_broker::tasks::{HeartbeatTask, PendingSweeper};
use vcode_broker::telemetry;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::new()?;
    telemetry::init_tracing(&settings.logging)?;
    tracing::info!("Configuration loaded");

    let state = AppState::new(settings.clone());
    tracing::info!(
        pending_ttl_secs = settings.broker.pending_ttl_seconds,
        max_connections = settings.websocket.max_connections,
        "Application state initialized"
    );

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let heartbeat_task = HeartbeatTask::new(
        settings.websocket.clone(),
        state.connection_manager.clone(),
        shutdown_tx.subscribe(),
    );
    let heartbeat_handle = tokio::spawn(async move {
        heartbeat_task.run().await;
    });

    let sweeper = PendingSweeper::new(
        settings.broker.sweep_interval_seconds,
        state.broker.clone(),
        state.connection_manager.clone(),
        shutdown_tx.subscribe(),
    );
    let sweeper_handle = tokio::spawn(async move {
        sweeper.run().await;
    });

    let graceful = Arc::new(GracefulShutdown::new(
        state.connection_manager.clone(),
        shutdown_tx,
    ));

    let app = create_app(state);

    let addr = settings.server_addr();
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal_handler(graceful))
        .await?;

    tracing::info!("Waiting for background tasks to finish...");
    let _ = tokio::join!(heartbeat_handle, sweeper_handle);

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal_handler(graceful: Arc<GracefulShutdown>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let reason = tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
            "server interrupted"
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
            "server terminating"
        }
    };

    graceful.execute(reason).await;
}
