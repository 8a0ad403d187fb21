use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use liveslides_core::history::{ChunkHistory, DEFAULT_HISTORY_LIMIT};
use liveslides_core::protocol::{ClientRole, ServerMessage, TranscriptionChunk};
use liveslides_core::session::parse_session_id;
use liveslides_core::{LiveSlidesError, Result, Session};
use tokio::sync::{Mutex, RwLock, broadcast};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Identity of one hub connection, unique for the lifetime of a [`Hub`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// A message on a session channel together with the connection that caused it.
#[derive(Debug, Clone)]
pub struct Envelope {
    /// Connection that must not receive this message
    pub origin: Option<ConnectionId>,
    pub message: ServerMessage,
}

/// Statistics about the hub
#[derive(Debug, Clone, Default)]
pub struct HubStats {
    pub active_connections: usize,
    pub active_sessions: usize,
    pub subscribers: usize,
}

/// Registry of live sessions and the channels fanning them out.
pub struct Hub {
    /// Map of session id to its room
    sessions: RwLock<HashMap<Uuid, Arc<SessionRoom>>>,
    /// Session lifecycle notices for every connection
    lobby: broadcast::Sender<ServerMessage>,
    next_connection: AtomicU64,
    active_connections: AtomicUsize,
    channel_capacity: usize,
    history_limit: usize,
}

impl Default for Hub {
    fn default() -> Self {
        Self::new(256, DEFAULT_HISTORY_LIMIT)
    }
}

impl Hub {
    /// Create an empty hub.
    ///
    /// `channel_capacity` bounds each session's broadcast queue and
    /// `history_limit` the transcription chunks replayed to late joiners.
    pub fn new(channel_capacity: usize, history_limit: usize) -> Self {
        let capacity = channel_capacity.max(1);
        let (lobby, _) = broadcast::channel(capacity);
        Self {
            sessions: RwLock::new(HashMap::new()),
            lobby,
            next_connection: AtomicU64::new(1),
            active_connections: AtomicUsize::new(0),
            channel_capacity: capacity,
            history_limit,
        }
    }

    /// Register a new connection.
    pub(crate) fn connect(&self) -> ConnectionId {
        self.active_connections.fetch_add(1, Ordering::SeqCst);
        ConnectionId(self.next_connection.fetch_add(1, Ordering::SeqCst))
    }

    /// Forget a connection registered with [`Hub::connect`].
    pub(crate) fn disconnect(&self, id: ConnectionId) {
        self.active_connections.fetch_sub(1, Ordering::SeqCst);
        debug!("Hub connection closed: {}", id);
    }

    /// Subscribe to session lifecycle notices.
    pub fn lobby(&self) -> broadcast::Receiver<ServerMessage> {
        self.lobby.subscribe()
    }

    /// Create a session with empty text and announce it in the lobby.
    pub async fn create_session(&self, name: &str) -> Session {
        let session = Session::new(name.trim());
        let room = Arc::new(SessionRoom::new(
            session.clone(),
            self.channel_capacity,
            self.history_limit,
        ));

        self.sessions.write().await.insert(session.id(), room);
        info!("Created session {} ({})", session.id(), session.name());

        let _ = self.lobby.send(ServerMessage::SessionCreated {
            session: session.clone(),
        });
        session
    }

    /// Delete a session, notifying its subscribers and the lobby.
    ///
    /// The id is invalid for every operation once this returns.
    pub async fn delete_session(&self, id: Uuid) -> Result<()> {
        let room = self
            .sessions
            .write()
            .await
            .remove(&id)
            .ok_or_else(|| LiveSlidesError::SessionNotFound(id.to_string()))?;

        room.close().await;
        let _ = self.lobby.send(ServerMessage::SessionDeleted {
            session_id: id.to_string(),
        });
        info!(
            "Deleted session {} ({} subscribers notified)",
            id,
            room.subscriber_count()
        );
        Ok(())
    }

    /// Get an existing room (does not create if not found)
    pub async fn room(&self, id: Uuid) -> Option<Arc<SessionRoom>> {
        self.sessions.read().await.get(&id).cloned()
    }

    async fn require_room(&self, id: Uuid) -> Result<Arc<SessionRoom>> {
        self.room(id)
            .await
            .ok_or_else(|| LiveSlidesError::SessionNotFound(id.to_string()))
    }

    /// Snapshot of one session.
    pub async fn session(&self, id: Uuid) -> Option<Session> {
        match self.room(id).await {
            Some(room) => Some(room.snapshot().await),
            None => None,
        }
    }

    /// Snapshots of all sessions, oldest first.
    pub async fn sessions(&self) -> Vec<Session> {
        let rooms: Vec<Arc<SessionRoom>> = self.sessions.read().await.values().cloned().collect();
        let mut sessions = Vec::with_capacity(rooms.len());
        for room in rooms {
            sessions.push(room.snapshot().await);
        }
        sessions.sort_by_key(|session| session.created_at());
        sessions
    }

    /// Replace a session's text and broadcast the recompiled slides to every
    /// subscriber except `origin`.
    pub async fn apply_text_update(
        &self,
        id: Uuid,
        text: String,
        origin: Option<ConnectionId>,
    ) -> Result<Session> {
        let room = self.require_room(id).await?;
        room.apply_text(text, origin).await
    }

    /// Subscribe a connection to a session.
    ///
    /// The returned subscription starts with the session's current slides
    /// followed by the buffered transcription chunks.
    pub async fn subscribe(
        &self,
        connection: ConnectionId,
        id: Uuid,
        role: ClientRole,
    ) -> Result<Subscription> {
        let room = self.require_room(id).await?;
        let subscription = room.subscribe(connection, role).await?;
        debug!(
            "{} joined session {} as {:?} ({} subscribers)",
            connection,
            id,
            role,
            room.subscriber_count()
        );
        Ok(subscription)
    }

    /// Send a message to every subscriber of a session except `exclude`.
    pub async fn broadcast(
        &self,
        id: Uuid,
        message: ServerMessage,
        exclude: Option<ConnectionId>,
    ) -> Result<usize> {
        let room = self.require_room(id).await?;
        Ok(room.broadcast(message, exclude))
    }

    /// Forward a transcription chunk to its session, or to every session
    /// when it names none. Returns how many sessions it reached.
    pub async fn relay_transcription(
        &self,
        chunk: TranscriptionChunk,
        origin: Option<ConnectionId>,
    ) -> Result<usize> {
        let rooms = match chunk.session_id.as_deref() {
            Some(raw) => vec![self.require_room(parse_session_id(raw)?).await?],
            None => self.sessions.read().await.values().cloned().collect(),
        };

        for room in &rooms {
            room.relay_transcription(chunk.clone(), origin).await;
        }
        Ok(rooms.len())
    }

    /// Get statistics about the hub
    pub async fn stats(&self) -> HubStats {
        let sessions = self.sessions.read().await;
        HubStats {
            active_connections: self.active_connections.load(Ordering::SeqCst),
            active_sessions: sessions.len(),
            subscribers: sessions.values().map(|r| r.subscriber_count()).sum(),
        }
    }
}

/// One live session and its subscribers.
pub struct SessionRoom {
    id: Uuid,
    /// Held for the whole apply-recompile-broadcast cycle
    session: Mutex<Session>,
    history: Mutex<ChunkHistory>,
    broadcast_tx: broadcast::Sender<Envelope>,
    subscriber_count: AtomicUsize,
    deleted: AtomicBool,
}

impl SessionRoom {
    fn new(session: Session, channel_capacity: usize, history_limit: usize) -> Self {
        let (broadcast_tx, _) = broadcast::channel(channel_capacity);
        Self {
            id: session.id(),
            session: Mutex::new(session),
            history: Mutex::new(ChunkHistory::new(history_limit)),
            broadcast_tx,
            subscriber_count: AtomicUsize::new(0),
            deleted: AtomicBool::new(false),
        }
    }

    /// Session id.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.subscriber_count.load(Ordering::SeqCst)
    }

    /// Whether the session has been deleted
    pub fn is_deleted(&self) -> bool {
        self.deleted.load(Ordering::SeqCst)
    }

    /// Copy of the current session state.
    pub async fn snapshot(&self) -> Session {
        self.session.lock().await.clone()
    }

    async fn apply_text(&self, text: String, origin: Option<ConnectionId>) -> Result<Session> {
        let mut session = self.session.lock().await;
        if self.is_deleted() {
            return Err(LiveSlidesError::SessionNotFound(self.id.to_string()));
        }

        session.apply_text(text);
        let receivers = self.broadcast(ServerMessage::slides_update(&session), origin);
        debug!(
            "Session {} updated: {} slides, {} receivers",
            self.id,
            session.slides().len(),
            receivers
        );
        Ok(session.clone())
    }

    async fn subscribe(
        self: &Arc<Self>,
        connection: ConnectionId,
        role: ClientRole,
    ) -> Result<Subscription> {
        // Both locks keep the snapshot and the live stream from overlapping
        let session = self.session.lock().await;
        if self.is_deleted() {
            return Err(LiveSlidesError::SessionNotFound(self.id.to_string()));
        }
        let history = self.history.lock().await;

        let broadcast_rx = self.broadcast_tx.subscribe();
        let mut initial = VecDeque::with_capacity(history.len() + 1);
        initial.push_back(ServerMessage::slides_update(&session));
        initial.extend(history.iter().cloned().map(ServerMessage::TranscriptionStream));

        self.subscriber_count.fetch_add(1, Ordering::SeqCst);
        Ok(Subscription {
            connection,
            role,
            room: Arc::clone(self),
            broadcast_rx,
            initial,
            resync: false,
        })
    }

    fn broadcast(&self, message: ServerMessage, origin: Option<ConnectionId>) -> usize {
        self.broadcast_tx
            .send(Envelope { origin, message })
            .unwrap_or(0)
    }

    async fn relay_transcription(&self, chunk: TranscriptionChunk, origin: Option<ConnectionId>) {
        let mut history = self.history.lock().await;
        history.push(chunk.clone());
        self.broadcast(ServerMessage::TranscriptionStream(chunk), origin);
    }

    async fn close(&self) {
        let _session = self.session.lock().await;
        self.deleted.store(true, Ordering::SeqCst);
        self.broadcast(
            ServerMessage::SessionDeleted {
                session_id: self.id.to_string(),
            },
            None,
        );
    }
}

/// A connection's membership in one session.
///
/// Dropping the subscription leaves the session.
pub struct Subscription {
    connection: ConnectionId,
    role: ClientRole,
    room: Arc<SessionRoom>,
    broadcast_rx: broadcast::Receiver<Envelope>,
    /// Snapshot and catch-up chunks not yet delivered
    initial: VecDeque<ServerMessage>,
    /// Set when the receiver lagged and needs a fresh snapshot
    resync: bool,
}

impl Subscription {
    /// Session this subscription belongs to.
    pub fn session_id(&self) -> Uuid {
        self.room.id()
    }

    /// Role the connection joined with.
    pub fn role(&self) -> ClientRole {
        self.role
    }

    /// Take the join snapshot: the current slides, then buffered chunks.
    pub fn take_initial(&mut self) -> Vec<ServerMessage> {
        self.initial.drain(..).collect()
    }

    /// Receive the next message for this connection.
    ///
    /// Messages the connection itself caused are skipped. Returns `None`
    /// once the session channel is closed.
    pub async fn recv(&mut self) -> Option<ServerMessage> {
        if let Some(message) = self.initial.pop_front() {
            return Some(message);
        }

        loop {
            if self.resync {
                let session = self.room.session.lock().await;
                self.broadcast_rx = self.room.broadcast_tx.subscribe();
                self.resync = false;
                if self.room.is_deleted() {
                    return Some(ServerMessage::SessionDeleted {
                        session_id: self.room.id().to_string(),
                    });
                }
                return Some(ServerMessage::slides_update(&session));
            }

            match self.broadcast_rx.recv().await {
                Ok(envelope) if envelope.origin == Some(self.connection) => continue,
                Ok(envelope) => return Some(envelope.message),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(
                        "{} lagged {} messages in session {}, resending current slides",
                        self.connection,
                        n,
                        self.room.id()
                    );
                    self.resync = true;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.room.subscriber_count.fetch_sub(1, Ordering::SeqCst);
        debug!("{} left session {}", self.connection, self.room.id());
    }
}
