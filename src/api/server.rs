//! Server lifecycle: bind, spawn the axum server in the background and
//! return a handle with a shutdown channel.

use std::net::SocketAddr;

use tokio::sync::oneshot;

use crate::api::router::detection_router;
use crate::api::types::ApiContext;

/// Where a running server listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSession {
    pub server_addr: String,
    pub port: u16,
}

/// Handle to a running detection server.
pub struct DetectionServer {
    pub session: ServerSession,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: tokio::task::JoinHandle<()>,
}

impl DetectionServer {
    /// Signal graceful shutdown. In-flight requests are allowed to finish.
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
            tracing::info!("Detection server shutdown signal sent");
        }
    }

    /// Wait for the server task to exit.
    pub async fn stopped(self) {
        if let Err(e) = self.task.await {
            tracing::error!("Detection server task failed: {e}");
        }
    }
}

/// Bind `addr` (port 0 picks an ephemeral port) and serve the detection
/// router on a background task.
pub async fn start_server_on(
    ctx: ApiContext,
    addr: SocketAddr,
    max_upload_bytes: usize,
) -> Result<DetectionServer, String> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| format!("Failed to bind detection server on {addr}: {e}"))?;

    let addr = listener
        .local_addr()
        .map_err(|e| format!("Failed to get server address: {e}"))?;

    let app = detection_router(ctx, max_upload_bytes);

    let session = ServerSession {
        server_addr: addr.to_string(),
        port: addr.port(),
    };

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let task = tokio::spawn(async move {
        let shutdown_signal = async move {
            let _ = shutdown_rx.await;
            tracing::info!("Detection server received shutdown signal");
        };

        tracing::info!(%addr, "Detection server started");

        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await
        {
            tracing::error!("Detection server error: {e}");
        }

        tracing::info!("Detection server stopped");
    });

    Ok(DetectionServer {
        session,
        shutdown_tx: Some(shutdown_tx),
        task,
    })
}
