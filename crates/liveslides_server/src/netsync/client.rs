use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use liveslides_core::replication::{SyncMessage, SyncMode};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tracing::{debug, error, info};

use super::engine::EngineShared;
use super::link::SyncLink;
use crate::error::SyncError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connect to `addr`, complete the join/welcome handshake and spawn the link.
///
/// The whole handshake is bounded by the engine's handshake timeout.
pub(crate) async fn connect(
    shared: Arc<EngineShared>,
    addr: &str,
    generation: u64,
    shutdown: watch::Receiver<bool>,
) -> Result<JoinHandle<()>, SyncError> {
    let url = format!("ws://{}/sync", addr);
    let timeout = shared.handshake_timeout;

    let (ws, remote_id, remote_mode) =
        match tokio::time::timeout(timeout, handshake(&shared, &url, addr)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(SyncError::HandshakeTimeout {
                    addr: addr.to_string(),
                    timeout,
                });
            }
        };

    let link = SyncLink::outbound(shared.clone(), remote_id, remote_mode);
    let addr = addr.to_string();
    Ok(tokio::spawn(run_link(
        ws, link, shared, addr, generation, shutdown,
    )))
}

async fn handshake(
    shared: &EngineShared,
    url: &str,
    addr: &str,
) -> Result<(WsStream, String, SyncMode), SyncError> {
    debug!("Connecting to sync server at {}", url);
    let (mut ws, _) = connect_async(url).await.map_err(|e| SyncError::Connect {
        addr: addr.to_string(),
        message: e.to_string(),
    })?;

    let join = SyncMessage::SyncJoin {
        client_id: shared.node_id.clone(),
        mode: shared.active_mode().await,
    };
    ws.send(Message::Text(join.to_json()?.into())).await?;

    while let Some(frame) = ws.next().await {
        match frame? {
            Message::Text(text) => {
                return match SyncMessage::parse(text.as_str())? {
                    SyncMessage::SyncWelcome {
                        server_id,
                        mode,
                        connected_clients,
                    } => {
                        info!(
                            "Joined sync server {} at {} ({} mode, {} connected)",
                            server_id, addr, mode, connected_clients
                        );
                        Ok((ws, server_id, mode))
                    }
                    SyncMessage::SyncError { message } => Err(SyncError::HandshakeRejected(message)),
                    other => Err(SyncError::HandshakeRejected(format!(
                        "expected sync_welcome, got {}",
                        other.type_name()
                    ))),
                };
            }
            Message::Ping(data) => ws.send(Message::Pong(data)).await?,
            Message::Close(_) => break,
            _ => {}
        }
    }

    Err(SyncError::HandshakeRejected(
        "connection closed before sync_welcome".to_string(),
    ))
}

async fn send_frame<S>(ws_tx: &mut S, message: &SyncMessage) -> Result<(), String>
where
    S: futures::Sink<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    let json = match message.to_json() {
        Ok(json) => json,
        Err(e) => {
            error!("Failed to serialize sync message: {}", e);
            return Ok(());
        }
    };
    ws_tx
        .send(Message::Text(json.into()))
        .await
        .map_err(|e| e.to_string())
}

/// Drive the outbound link until it drops or the engine stops
async fn run_link(
    ws: WsStream,
    mut link: SyncLink,
    shared: Arc<EngineShared>,
    addr: String,
    generation: u64,
    mut shutdown: watch::Receiver<bool>,
) {
    let (mut ws_tx, mut ws_rx) = ws.split();

    let lost: Option<String> = loop {
        tokio::select! {
            frame = ws_rx.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        let replies = link.handle_text(text.as_str()).await;
                        let mut failed = None;
                        for reply in &replies {
                            if let Err(e) = send_frame(&mut ws_tx, reply).await {
                                failed = Some(e);
                                break;
                            }
                        }
                        if failed.is_some() {
                            break failed;
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = ws_tx.send(Message::Pong(data)).await {
                            break Some(e.to_string());
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        break Some("remote closed the connection".to_string());
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => break Some(e.to_string()),
                }
            }

            Some(message) = link.next_outbound() => {
                if let Err(e) = send_frame(&mut ws_tx, &message).await {
                    break Some(e);
                }
            }

            _ = shutdown.changed() => {
                let _ = ws_tx.send(Message::Close(None)).await;
                break None;
            }
        }
    };

    drop(link);

    if let Some(reason) = lost {
        shared
            .on_outbound_lost(generation, format!("Connection to {} lost: {}", addr, reason))
            .await;
    }
}
