use crate::hub::{ClientConnection, Hub};
use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures::{Sink, SinkExt, StreamExt};
use liveslides_core::protocol::ServerMessage;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info};

/// Shared state for the WebSocket handler
#[derive(Clone)]
pub struct WsState {
    pub hub: Arc<Hub>,
    /// Flips to `true` when the server stops
    pub shutdown: watch::Receiver<bool>,
}

/// WebSocket upgrade handler
pub async fn ws_handler(State(state): State<WsState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Send one server message as a text frame
async fn send_message<S>(ws_tx: &mut S, message: &ServerMessage) -> bool
where
    S: Sink<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    let json = match message.to_json() {
        Ok(json) => json,
        Err(e) => {
            error!("Failed to serialize message: {}", e);
            return true;
        }
    };
    match ws_tx.send(Message::Text(json.into())).await {
        Ok(()) => true,
        Err(e) => {
            debug!("Failed to send message: {}", e);
            false
        }
    }
}

/// Handle an established WebSocket connection
async fn handle_socket(socket: WebSocket, state: WsState) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut shutdown = state.shutdown.clone();
    let mut connection = ClientConnection::new(state.hub.clone());

    info!("WebSocket connected: {}", connection.id());

    loop {
        tokio::select! {
            // Handle incoming messages from the client
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let replies = connection.handle_text(text.as_str()).await;
                        let mut open = true;
                        for reply in &replies {
                            if !send_message(&mut ws_tx, reply).await {
                                open = false;
                                break;
                            }
                        }
                        if !open {
                            break;
                        }
                    }
                    Some(Ok(Message::Binary(_))) => {
                        let reply = ServerMessage::error("Binary frames are not supported");
                        if !send_message(&mut ws_tx, &reply).await {
                            break;
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = ws_tx.send(Message::Pong(data)).await {
                            error!("Failed to send pong: {}", e);
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        debug!("Client requested close");
                        break;
                    }
                    Some(Ok(Message::Pong(_))) => {}
                    Some(Err(e)) => {
                        debug!("WebSocket error: {}", e);
                        break;
                    }
                    None => break,
                }
            }

            // Handle messages pushed by the hub
            Some(outbound) = connection.next_outbound() => {
                if !send_message(&mut ws_tx, &outbound).await {
                    break;
                }
            }

            _ = shutdown.changed() => {
                let _ = ws_tx.send(Message::Close(None)).await;
                break;
            }
        }
    }

    info!(
        "WebSocket disconnected: {} (session {:?})",
        connection.id(),
        connection.session_id()
    );

    // Connection will be dropped here, which releases its subscription
}
