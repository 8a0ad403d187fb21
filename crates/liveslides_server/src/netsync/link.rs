use std::fmt;
use std::sync::Arc;

use liveslides_core::LiveSlidesError;
use liveslides_core::replication::{
    ApplyOutcome, MAX_CLOCK_SKEW_MS, SyncMessage, SyncMode, may_send,
};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::engine::{EngineShared, Outbound, ReplicaEvent};

/// Identity of one sync link, unique for the lifetime of an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct LinkId(pub(crate) u64);

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "link-{}", self.0)
    }
}

/// Which side opened the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkDirection {
    /// Another instance connected to our listener
    Inbound,
    /// We connected to the configured remote
    Outbound,
}

/// A handshaken link as seen by the engine.
#[derive(Debug, Clone, Serialize)]
pub struct LinkInfo {
    pub id: LinkId,
    pub direction: LinkDirection,
    pub remote_id: String,
    pub remote_mode: SyncMode,
}

/// One sync connection, independent of the websocket flavour carrying it.
pub(crate) struct SyncLink {
    id: LinkId,
    direction: LinkDirection,
    shared: Arc<EngineShared>,
    outbound_rx: broadcast::Receiver<Outbound>,
    remote: Option<LinkInfo>,
    /// Re-baseline the remote after this link's queue lagged
    resync: bool,
    closing: bool,
}

impl SyncLink {
    /// Link accepted by our listener; it becomes live after `sync_join`.
    pub(crate) fn inbound(shared: Arc<EngineShared>) -> Self {
        let id = shared.next_link_id();
        let outbound_rx = shared.outbound_tx.subscribe();
        debug!("Sync link opened: {} (inbound)", id);
        Self {
            id,
            direction: LinkDirection::Inbound,
            shared,
            outbound_rx,
            remote: None,
            resync: false,
            closing: false,
        }
    }

    /// Link to the remote we connected to, after its `sync_welcome`.
    pub(crate) fn outbound(shared: Arc<EngineShared>, remote_id: String, remote_mode: SyncMode) -> Self {
        let id = shared.next_link_id();
        let outbound_rx = shared.outbound_tx.subscribe();
        let info = LinkInfo {
            id,
            direction: LinkDirection::Outbound,
            remote_id,
            remote_mode,
        };
        shared.register_link(info.clone());
        Self {
            id,
            direction: LinkDirection::Outbound,
            shared,
            outbound_rx,
            remote: Some(info),
            resync: false,
            closing: false,
        }
    }

    pub(crate) fn id(&self) -> LinkId {
        self.id
    }

    /// Remote instance id, once known.
    pub(crate) fn remote_id(&self) -> Option<&str> {
        self.remote.as_ref().map(|r| r.remote_id.as_str())
    }

    /// Whether the link should be closed after flushing its replies.
    pub(crate) fn is_closing(&self) -> bool {
        self.closing
    }

    /// Handle a raw text frame, returning the replies for the remote.
    pub(crate) async fn handle_text(&mut self, raw: &str) -> Vec<SyncMessage> {
        match SyncMessage::parse(raw) {
            Ok(message) => self.handle_message(message).await,
            Err(e) => {
                warn!("{} sent an invalid sync frame: {}", self.id, e);
                vec![SyncMessage::error(e)]
            }
        }
    }

    /// Handle a parsed message, returning the replies for the remote.
    pub(crate) async fn handle_message(&mut self, message: SyncMessage) -> Vec<SyncMessage> {
        let mode = self.shared.active_mode().await;

        if self.remote.is_none() {
            return match message {
                SyncMessage::SyncJoin { client_id, mode: remote_mode } => {
                    self.accept_join(client_id, remote_mode, mode).await
                }
                other => {
                    self.closing = true;
                    vec![SyncMessage::error(format!(
                        "Expected sync_join, got {}",
                        other.type_name()
                    ))]
                }
            };
        }

        match message {
            SyncMessage::SyncJoin { .. } => vec![SyncMessage::error("Already joined")],
            SyncMessage::SyncWelcome { server_id, .. } => {
                debug!("{} ignoring repeated welcome from {}", self.id, server_id);
                Vec::new()
            }
            SyncMessage::SyncRequestState => {
                if !mode.sends_mutations() {
                    let err = LiveSlidesError::ModeForbids {
                        mode,
                        action: "publish state",
                    };
                    return vec![SyncMessage::error(err)];
                }
                let scope = self.shared.scope().await;
                let snapshot = self.shared.store.write().await.full_state(scope);
                self.shared.touch().await;
                vec![snapshot]
            }
            SyncMessage::SyncAck {
                message_type,
                entity_id,
            } => {
                debug!(
                    "{} acknowledged {} {}",
                    self.id,
                    message_type,
                    entity_id.as_deref().unwrap_or("")
                );
                Vec::new()
            }
            SyncMessage::SyncError { message } => {
                warn!("{} reported an error: {}", self.id, message);
                self.shared.set_error(Some(message)).await;
                Vec::new()
            }
            mutation => self.apply_remote(mode, mutation).await,
        }
    }

    async fn accept_join(
        &mut self,
        client_id: String,
        remote_mode: SyncMode,
        mode: SyncMode,
    ) -> Vec<SyncMessage> {
        if !remote_mode.connects_out() {
            self.closing = true;
            return vec![SyncMessage::error(LiveSlidesError::ModeForbids {
                mode: remote_mode,
                action: "join another instance",
            })];
        }

        let info = LinkInfo {
            id: self.id,
            direction: LinkDirection::Inbound,
            remote_id: client_id,
            remote_mode,
        };
        self.shared.register_link(info.clone());
        let connected_clients = self.shared.inbound_count();
        info!(
            "Sync peer joined: {} ({}) on {}, {} connected",
            info.remote_id, remote_mode, self.id, connected_clients
        );
        self.remote = Some(info);

        let mut replies = vec![SyncMessage::SyncWelcome {
            server_id: self.shared.node_id.clone(),
            mode,
            connected_clients,
        }];
        if mode.sends_mutations() {
            let scope = self.shared.scope().await;
            replies.push(self.shared.store.write().await.full_state(scope));
            self.shared.touch().await;
        }
        replies
    }

    async fn apply_remote(&mut self, mode: SyncMode, message: SyncMessage) -> Vec<SyncMessage> {
        if !mode.applies_mutations() {
            debug!(
                "{} mode ignores {} from {}",
                mode,
                message.type_name(),
                self.id
            );
            return Vec::new();
        }

        let scope = self.shared.scope().await;
        let (outcome, relay) = {
            let mut store = self.shared.store.write().await;
            let outcome = store.apply(&message, scope);
            let relay = match (&outcome, &message) {
                (ApplyOutcome::Applied, _) if !mode.sends_mutations() => None,
                (ApplyOutcome::Applied, SyncMessage::SyncFullState { .. }) => {
                    Some(store.full_state(scope))
                }
                (ApplyOutcome::Applied, _) => Some(message.clone()),
                _ => None,
            };
            (outcome, relay)
        };

        match outcome {
            ApplyOutcome::Applied => {
                self.shared.touch().await;
                if let Some(event) = ReplicaEvent::from_message(&message) {
                    let _ = self.shared.events_tx.send(event);
                }
                if let Some(relay) = relay {
                    self.shared.relay(Some(self.id), relay);
                }
                vec![message.ack()]
            }
            ApplyOutcome::Rejected => {
                warn!(
                    "{} sent {} with a timestamp too far in the future",
                    self.id,
                    message.type_name()
                );
                vec![SyncMessage::error(format!(
                    "Rejected {}: timestamp is more than {} ms ahead",
                    message.type_name(),
                    MAX_CLOCK_SKEW_MS
                ))]
            }
            // Stale writes are expected and dropped without a reply
            ApplyOutcome::Stale | ApplyOutcome::OutOfScope | ApplyOutcome::Ignored => Vec::new(),
        }
    }

    /// Next message this link should put on the wire.
    pub(crate) async fn next_outbound(&mut self) -> Option<SyncMessage> {
        loop {
            if self.resync {
                self.resync = false;
                let mode = self.shared.active_mode().await;
                if self.remote.is_some() && mode.sends_mutations() {
                    let scope = self.shared.scope().await;
                    return Some(self.shared.store.write().await.full_state(scope));
                }
            }

            match self.outbound_rx.recv().await {
                Ok(outbound) => {
                    if outbound.origin == Some(self.id)
                        || outbound.only.is_some_and(|d| d != self.direction)
                        || self.remote.is_none()
                    {
                        continue;
                    }
                    let mode = self.shared.active_mode().await;
                    if !may_send(mode, &outbound.message) {
                        debug!(
                            "{} mode does not send {} on {}",
                            mode,
                            outbound.message.type_name(),
                            self.id
                        );
                        continue;
                    }
                    return Some(outbound.message);
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("{} lagged {} messages, resending full state", self.id, n);
                    self.resync = true;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

impl Drop for SyncLink {
    fn drop(&mut self) {
        self.shared.unregister_link(self.id);
        debug!(
            "Sync link closed: {} ({:?}, remote {:?})",
            self.id,
            self.direction,
            self.remote_id()
        );
    }
}
