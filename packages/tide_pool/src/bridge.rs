//! The two data-path directions between the session and its viewers.
//!
//! One pump task is the sole consumer of session output on the bridge side;
//! each WebSocket connection gets its own handler that feeds input and resize
//! messages back into the session.

use axum::extract::ws::{Message, WebSocket};
use futures::{sink::SinkExt, stream::StreamExt};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use pty_session::SessionHandle;

use crate::metrics::ServerMetrics;
use crate::protocol::{ControlMessage, Inbound, classify};
use crate::registry::ClientRegistry;

/// Pump session output chunks into the registry fan-out.
///
/// The chunk has already been drained from the PTY by the reader thread, so
/// with zero clients registered it is simply discarded. Runs until the
/// session's output channel closes (child exit).
pub fn spawn_output_pump(
    mut output_rx: broadcast::Receiver<Vec<u8>>,
    registry: Arc<ClientRegistry>,
    metrics: Arc<ServerMetrics>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match output_rx.recv().await {
                Ok(chunk) => {
                    metrics.chunk_broadcast(chunk.len());
                    let outcome = registry.broadcast(&chunk).await;
                    for _ in 0..outcome.evicted {
                        metrics.client_evicted();
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "output pump lagged behind the session reader");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    info!("session output closed, stopping broadcast pump");
                    break;
                }
            }
        }
    })
}

/// Drive one client connection: register, bridge both directions, unregister.
///
/// Unregistration happens exactly once, when either direction ends, and is
/// the single resource-release path for the client.
pub async fn handle_client(
    socket: WebSocket,
    peer: String,
    session: SessionHandle,
    registry: Arc<ClientRegistry>,
    metrics: Arc<ServerMetrics>,
    queue_depth: usize,
) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let (tx, mut rx) = mpsc::channel::<Vec<u8>>(queue_depth);
    let id = registry.register(&peer, tx).await;
    metrics.client_connected();
    let total = registry.len().await;
    info!(client = %id, peer = %peer, total, "client connected");

    // Session output → client. Ends when the registry drops our sender
    // (eviction) or the socket goes away.
    let outbound = async move {
        while let Some(chunk) = rx.recv().await {
            if ws_sender.send(Message::Binary(chunk.into())).await.is_err() {
                break;
            }
        }
    };

    // Client input → session. Text frames are classified; binary frames
    // bypass classification and stay 8-bit clean.
    let session_in = session.clone();
    let metrics_in = metrics.clone();
    let inbound = async move {
        while let Some(msg) = ws_receiver.next().await {
            match msg {
                Ok(Message::Text(text)) => match classify(&text) {
                    Inbound::Control(ControlMessage::Resize { cols, rows }) => {
                        metrics_in.resize_message();
                        debug!(cols, rows, "applying client viewport size");
                        if let Err(e) = session_in.resize(cols, rows).await {
                            metrics_in.pty_error();
                            warn!(error = %e, "viewport resize failed");
                        }
                    }
                    Inbound::Data(data) => {
                        metrics_in.input_message();
                        if let Err(e) = session_in.write(data.as_bytes()).await {
                            metrics_in.pty_error();
                            warn!(error = %e, "dropped keystrokes, session write failed");
                        }
                    }
                },
                Ok(Message::Binary(data)) => {
                    metrics_in.input_message();
                    if let Err(e) = session_in.write(&data).await {
                        metrics_in.pty_error();
                        warn!(error = %e, "dropped binary input, session write failed");
                    }
                }
                Ok(Message::Close(_)) => {
                    debug!("client closed connection");
                    break;
                }
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => continue,
                Err(e) => {
                    debug!(error = %e, "websocket receive error");
                    break;
                }
            }
        }
    };

    tokio::select! {
        _ = outbound => debug!("outbound task ended"),
        _ = inbound => debug!("inbound task ended"),
    }

    registry.unregister(id).await;
    metrics.client_disconnected();
    let total = registry.len().await;
    info!(client = %id, peer = %peer, total, "client disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn pump_fans_out_to_registered_clients() {
        let registry = Arc::new(ClientRegistry::new());
        let metrics = Arc::new(ServerMetrics::new());
        let (session_tx, session_rx) = broadcast::channel(16);

        let pump = spawn_output_pump(session_rx, registry.clone(), metrics.clone());

        let (tx1, mut rx1) = mpsc::channel(16);
        let (tx2, mut rx2) = mpsc::channel(16);
        registry.register("a", tx1).await;
        registry.register("b", tx2).await;

        session_tx.send(b"chunk".to_vec()).unwrap();

        let got1 = timeout(Duration::from_secs(1), rx1.recv()).await.unwrap();
        let got2 = timeout(Duration::from_secs(1), rx2.recv()).await.unwrap();
        assert_eq!(got1.unwrap(), b"chunk");
        assert_eq!(got2.unwrap(), b"chunk");

        drop(session_tx);
        timeout(Duration::from_secs(1), pump).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn pump_preserves_chunk_order() {
        let registry = Arc::new(ClientRegistry::new());
        let metrics = Arc::new(ServerMetrics::new());
        let (session_tx, session_rx) = broadcast::channel(16);

        spawn_output_pump(session_rx, registry.clone(), metrics.clone());

        let (tx, mut rx) = mpsc::channel(16);
        registry.register("a", tx).await;

        for chunk in [b"one".to_vec(), b"two".to_vec(), b"three".to_vec()] {
            session_tx.send(chunk).unwrap();
        }

        for expected in [&b"one"[..], &b"two"[..], &b"three"[..]] {
            let got = timeout(Duration::from_secs(1), rx.recv())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(got, expected);
        }
    }

    #[tokio::test]
    async fn pump_discards_output_with_no_clients() {
        let registry = Arc::new(ClientRegistry::new());
        let metrics = Arc::new(ServerMetrics::new());
        let (session_tx, session_rx) = broadcast::channel(16);

        let pump = spawn_output_pump(session_rx, registry.clone(), metrics.clone());

        session_tx.send(b"nobody listening".to_vec()).unwrap();
        drop(session_tx);
        timeout(Duration::from_secs(1), pump).await.unwrap().unwrap();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.traffic.chunks_broadcast, 1);
        assert_eq!(snapshot.traffic.bytes_broadcast, 16);
    }
}
