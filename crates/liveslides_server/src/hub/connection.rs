use std::sync::Arc;

use liveslides_core::protocol::{ClientMessage, ClientRole, ServerMessage};
use liveslides_core::session::parse_session_id;
use liveslides_core::{LiveSlidesError, Result};
use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{ConnectionId, Hub, Subscription};

/// Represents a connected notepad or viewer
pub struct ClientConnection {
    id: ConnectionId,
    hub: Arc<Hub>,
    subscription: Option<Subscription>,
    lobby_rx: broadcast::Receiver<ServerMessage>,
    /// Session whose deletion notice already arrived on the session channel
    ended: Option<Uuid>,
}

/// Where the next outbound message came from
enum Outbound {
    Session(Option<ServerMessage>),
    Lobby(std::result::Result<ServerMessage, broadcast::error::RecvError>),
}

impl ClientConnection {
    /// Create a new client connection
    pub fn new(hub: Arc<Hub>) -> Self {
        let id = hub.connect();
        let lobby_rx = hub.lobby();
        debug!("Hub connection opened: {}", id);

        Self {
            id,
            hub,
            subscription: None,
            lobby_rx,
            ended: None,
        }
    }

    /// Connection id.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Session this connection is joined to, if any.
    pub fn session_id(&self) -> Option<Uuid> {
        self.subscription.as_ref().map(Subscription::session_id)
    }

    /// Role inside the joined session.
    pub fn role(&self) -> Option<ClientRole> {
        self.subscription.as_ref().map(Subscription::role)
    }

    /// Handle a raw text frame, returning the replies for this connection.
    pub async fn handle_text(&mut self, raw: &str) -> Vec<ServerMessage> {
        match ClientMessage::parse(raw) {
            Ok(message) => self.handle_message(message).await,
            Err(e) => {
                warn!("{} sent an invalid message: {}", self.id, e);
                vec![ServerMessage::error(e)]
            }
        }
    }

    /// Handle a parsed message, returning the replies for this connection.
    ///
    /// Failures become an `error` reply; the connection stays usable.
    pub async fn handle_message(&mut self, message: ClientMessage) -> Vec<ServerMessage> {
        match self.dispatch(message).await {
            Ok(replies) => replies,
            Err(e) => {
                debug!("{} request failed: {}", self.id, e);
                vec![ServerMessage::error(e)]
            }
        }
    }

    async fn dispatch(&mut self, message: ClientMessage) -> Result<Vec<ServerMessage>> {
        match message {
            ClientMessage::JoinSession {
                session_id,
                client_type,
            } => {
                let session_id = parse_session_id(&session_id)?;
                // Joining moves the connection; the old membership ends first
                self.unsubscribe();
                let mut subscription = self.hub.subscribe(self.id, session_id, client_type).await?;
                let initial = subscription.take_initial();
                self.subscription = Some(subscription);
                Ok(initial)
            }
            ClientMessage::LeaveSession => {
                self.unsubscribe();
                Ok(Vec::new())
            }
            ClientMessage::TextUpdate { session_id, text } => {
                let session_id = parse_session_id(&session_id)?;
                if self.session_id() == Some(session_id) && self.role() == Some(ClientRole::Viewer)
                {
                    return Err(LiveSlidesError::UnsupportedMessage(
                        "text_update from a viewer".to_string(),
                    ));
                }
                self.hub
                    .apply_text_update(session_id, text, Some(self.id))
                    .await?;
                Ok(Vec::new())
            }
            ClientMessage::CreateSession { name } => {
                // Announced to everyone, this connection included, through the lobby
                self.hub.create_session(&name).await;
                Ok(Vec::new())
            }
            ClientMessage::DeleteSession { session_id } => {
                let session_id = parse_session_id(&session_id)?;
                self.hub.delete_session(session_id).await?;
                Ok(Vec::new())
            }
            ClientMessage::ListSessions => Ok(vec![ServerMessage::SessionsList {
                sessions: self.hub.sessions().await,
            }]),
            ClientMessage::TranscriptionStream(chunk) => {
                self.hub.relay_transcription(chunk, Some(self.id)).await?;
                Ok(Vec::new())
            }
        }
    }

    /// Leave the joined session. Safe to call when not joined.
    pub fn unsubscribe(&mut self) -> bool {
        self.subscription.take().is_some()
    }

    /// Receive the next message pushed to this connection.
    ///
    /// Returns `None` only when the hub has gone away.
    pub async fn next_outbound(&mut self) -> Option<ServerMessage> {
        loop {
            let outbound = match self.subscription.as_mut() {
                Some(subscription) => tokio::select! {
                    message = subscription.recv() => Outbound::Session(message),
                    message = self.lobby_rx.recv() => Outbound::Lobby(message),
                },
                None => Outbound::Lobby(self.lobby_rx.recv().await),
            };

            match outbound {
                Outbound::Session(Some(message)) => {
                    if matches!(message, ServerMessage::SessionDeleted { .. }) {
                        self.ended = self.subscription.take().map(|s| s.session_id());
                    }
                    return Some(message);
                }
                Outbound::Session(None) => {
                    self.subscription = None;
                }
                Outbound::Lobby(Ok(ServerMessage::SessionDeleted { session_id }))
                    if self.already_notified(&session_id) =>
                {
                    // The session channel delivers this notice itself
                    continue;
                }
                Outbound::Lobby(Ok(message)) => return Some(message),
                Outbound::Lobby(Err(broadcast::error::RecvError::Lagged(n))) => {
                    warn!("{} lagged {} lobby notices", self.id, n);
                }
                Outbound::Lobby(Err(broadcast::error::RecvError::Closed)) => return None,
            }
        }
    }

    fn already_notified(&mut self, session_id: &str) -> bool {
        let matches = |id: Option<Uuid>| id.is_some_and(|id| id.to_string() == session_id);
        if matches(self.ended) {
            self.ended = None;
            return true;
        }
        matches(self.session_id())
    }
}

impl Drop for ClientConnection {
    fn drop(&mut self) {
        self.subscription = None;
        self.hub.disconnect(self.id);
    }
}
