use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
    routing::get,
};
use futures::{Sink, SinkExt, StreamExt};
use liveslides_core::replication::SyncMessage;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

use super::engine::EngineShared;
use super::link::SyncLink;
use crate::error::SyncError;

/// Shared state for the sync WebSocket handler
#[derive(Clone)]
struct SyncServerState {
    shared: Arc<EngineShared>,
    shutdown: watch::Receiver<bool>,
}

/// Bind the inbound listener and serve it until `shutdown` flips.
pub(crate) async fn spawn(
    shared: Arc<EngineShared>,
    addr: &str,
    shutdown: watch::Receiver<bool>,
) -> Result<(SocketAddr, JoinHandle<()>), SyncError> {
    let bind_error = |source| SyncError::Bind {
        addr: addr.to_string(),
        source,
    };
    let listener = TcpListener::bind(addr).await.map_err(bind_error)?;
    let local = listener.local_addr().map_err(bind_error)?;

    let app = Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/sync", get(sync_ws_handler))
        .with_state(SyncServerState {
            shared,
            shutdown: shutdown.clone(),
        })
        .layer(TraceLayer::new_for_http());

    let mut signal = shutdown;
    let handle = tokio::spawn(async move {
        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = signal.wait_for(|stop| *stop).await;
            })
            .await;
        if let Err(e) = result {
            error!("Sync server error: {}", e);
        }
        debug!("Sync server on {} shut down", local);
    });

    info!("Sync server listening on ws://{}/sync", local);
    Ok((local, handle))
}

/// WebSocket upgrade handler for other instances
async fn sync_ws_handler(
    State(state): State<SyncServerState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| serve_link(socket, state))
}

async fn send_frame<S>(ws_tx: &mut S, message: &SyncMessage) -> bool
where
    S: Sink<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    let json = match message.to_json() {
        Ok(json) => json,
        Err(e) => {
            error!("Failed to serialize sync message: {}", e);
            return true;
        }
    };
    match ws_tx.send(Message::Text(json.into())).await {
        Ok(()) => true,
        Err(e) => {
            debug!("Failed to send sync message: {}", e);
            false
        }
    }
}

/// Drive one inbound link until either side closes it
async fn serve_link(socket: WebSocket, state: SyncServerState) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut shutdown = state.shutdown.clone();
    let mut link = SyncLink::inbound(state.shared.clone());
    let mut lost = None;

    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let replies = link.handle_text(text.as_str()).await;
                        let mut open = true;
                        for reply in &replies {
                            if !send_frame(&mut ws_tx, reply).await {
                                open = false;
                                break;
                            }
                        }
                        if !open {
                            lost = Some("send failed".to_string());
                            break;
                        }
                        if link.is_closing() {
                            let _ = ws_tx.send(Message::Close(None)).await;
                            break;
                        }
                    }
                    Some(Ok(Message::Binary(_))) => {
                        let reply = SyncMessage::error("Binary frames are not supported");
                        if !send_frame(&mut ws_tx, &reply).await {
                            break;
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = ws_tx.send(Message::Pong(data)).await {
                            lost = Some(e.to_string());
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {}
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        lost = Some(e.to_string());
                        break;
                    }
                }
            }

            Some(message) = link.next_outbound() => {
                if !send_frame(&mut ws_tx, &message).await {
                    lost = Some("send failed".to_string());
                    break;
                }
            }

            _ = shutdown.changed() => {
                let _ = ws_tx.send(Message::Close(None)).await;
                break;
            }
        }
    }

    let remote = link.remote_id().map(str::to_string);
    let id = link.id();
    drop(link);

    match (remote, lost) {
        (Some(remote), Some(reason)) => {
            let message = format!("Connection from {} lost: {}", remote, reason);
            info!("{} ({})", message, id);
            state.shared.set_error(Some(message)).await;
        }
        (Some(remote), None) => info!("Sync peer left: {} ({})", remote, id),
        (None, _) => debug!("Sync link {} closed before joining", id),
    }
}
