use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use liveslides_core::replication::{
    Playlist, PlaylistItem, ReplicaStore, Schedule, SyncConnectionState, SyncMessage, SyncMode,
    SyncScope, SyncSettings, may_send,
};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock, broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::link::{LinkDirection, LinkId, LinkInfo};
use super::{client, server};
use crate::config::Config;
use crate::error::SyncError;

/// How long stop waits for link tasks before aborting them
const STOP_GRACE: Duration = Duration::from_secs(1);

/// Lifecycle phase of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EnginePhase {
    #[default]
    Off,
    Starting,
    Running,
    Stopping,
}

/// Replicated state that changed because of a remote instance.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReplicaEvent {
    PlaylistItemChanged { playlist_id: String, item_id: String },
    PlaylistItemDeleted { playlist_id: String, item_id: String },
    ScheduleReplaced { active_index: Option<usize> },
    FullStateApplied,
}

impl ReplicaEvent {
    pub(crate) fn from_message(message: &SyncMessage) -> Option<Self> {
        match message {
            SyncMessage::SyncPlaylistItem {
                playlist_id, item, ..
            } => Some(ReplicaEvent::PlaylistItemChanged {
                playlist_id: playlist_id.clone(),
                item_id: item.id.clone(),
            }),
            SyncMessage::SyncPlaylistDelete {
                playlist_id,
                item_id,
                ..
            } => Some(ReplicaEvent::PlaylistItemDeleted {
                playlist_id: playlist_id.clone(),
                item_id: item_id.clone(),
            }),
            SyncMessage::SyncSchedule { schedule, .. } => Some(ReplicaEvent::ScheduleReplaced {
                active_index: schedule.active_index,
            }),
            SyncMessage::SyncFullState { .. } => Some(ReplicaEvent::FullStateApplied),
            _ => None,
        }
    }
}

/// A message queued for the links.
#[derive(Debug, Clone)]
pub(crate) struct Outbound {
    /// Link the message came from; it is not sent back there
    pub(crate) origin: Option<LinkId>,
    /// Restrict delivery to links of one direction
    pub(crate) only: Option<LinkDirection>,
    pub(crate) message: SyncMessage,
}

#[derive(Debug, Default)]
pub(crate) struct EngineStatus {
    phase: EnginePhase,
    /// Mode the running links were started with
    mode: SyncMode,
    server_addr: Option<SocketAddr>,
    last_sync: Option<DateTime<Utc>>,
    error: Option<String>,
}

/// Tasks of one start/stop cycle.
struct RunningLinks {
    shutdown: watch::Sender<bool>,
    server: Option<JoinHandle<()>>,
    client: Option<JoinHandle<()>>,
}

impl RunningLinks {
    /// Signal every task and wait for it, aborting stragglers.
    async fn shutdown(mut self) {
        let _ = self.shutdown.send(true);
        for mut handle in [self.server.take(), self.client.take()].into_iter().flatten() {
            if tokio::time::timeout(STOP_GRACE, &mut handle).await.is_err() {
                handle.abort();
                let _ = handle.await;
            }
        }
    }

    /// Tear down immediately, leaving no listener behind.
    async fn abort(mut self) {
        let _ = self.shutdown.send(true);
        for handle in [self.server.take(), self.client.take()].into_iter().flatten() {
            handle.abort();
            let _ = handle.await;
        }
    }
}

#[derive(Default)]
struct Lifecycle {
    /// Bumped on every start and stop so late link callbacks are ignored
    generation: u64,
    running: Option<RunningLinks>,
}

/// State shared between the engine handle and its link tasks.
pub(crate) struct EngineShared {
    pub(crate) node_id: String,
    pub(crate) handshake_timeout: Duration,
    host: String,
    settings: RwLock<SyncSettings>,
    pub(crate) store: RwLock<ReplicaStore>,
    status: RwLock<EngineStatus>,
    lifecycle: Mutex<Lifecycle>,
    pub(crate) outbound_tx: broadcast::Sender<Outbound>,
    pub(crate) events_tx: broadcast::Sender<ReplicaEvent>,
    links: std::sync::Mutex<HashMap<LinkId, LinkInfo>>,
    next_link: AtomicU64,
    client_connected: AtomicBool,
}

impl EngineShared {
    pub(crate) fn next_link_id(&self) -> LinkId {
        LinkId(self.next_link.fetch_add(1, Ordering::SeqCst))
    }

    fn links(&self) -> MutexGuard<'_, HashMap<LinkId, LinkInfo>> {
        self.links.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn register_link(&self, info: LinkInfo) {
        if info.direction == LinkDirection::Outbound {
            self.client_connected.store(true, Ordering::SeqCst);
        }
        self.links().insert(info.id, info);
    }

    pub(crate) fn unregister_link(&self, id: LinkId) {
        let removed = self.links().remove(&id);
        if removed.is_some_and(|info| info.direction == LinkDirection::Outbound) {
            self.client_connected.store(false, Ordering::SeqCst);
        }
    }

    /// Handshaken links accepted by our listener.
    pub(crate) fn inbound_count(&self) -> usize {
        self.links()
            .values()
            .filter(|info| info.direction == LinkDirection::Inbound)
            .count()
    }

    pub(crate) async fn active_mode(&self) -> SyncMode {
        self.status.read().await.mode
    }

    pub(crate) async fn scope(&self) -> SyncScope {
        SyncScope::from(&*self.settings.read().await)
    }

    /// Record that state was exchanged just now.
    pub(crate) async fn touch(&self) {
        self.status.write().await.last_sync = Some(Utc::now());
    }

    pub(crate) async fn set_error(&self, error: Option<String>) {
        self.status.write().await.error = error;
    }

    /// Queue a message for every link except `origin`.
    pub(crate) fn relay(&self, origin: Option<LinkId>, message: SyncMessage) {
        let _ = self.outbound_tx.send(Outbound {
            origin,
            only: None,
            message,
        });
    }

    /// Called by the outbound link task when its connection drops.
    pub(crate) async fn on_outbound_lost(&self, generation: u64, reason: String) {
        let mut lifecycle = self.lifecycle.lock().await;
        if lifecycle.generation != generation {
            return;
        }
        self.client_connected.store(false, Ordering::SeqCst);
        warn!("{}", reason);

        let mut status = self.status.write().await;
        status.error = Some(reason);
        if status.mode.accepts_inbound() {
            // Peer keeps serving its inbound links
            if let Some(running) = lifecycle.running.as_mut() {
                running.client = None;
            }
            return;
        }

        status.phase = EnginePhase::Stopping;
        if let Some(mut running) = lifecycle.running.take() {
            // This task is the client; only the rest is waited for
            running.client = None;
            running.shutdown().await;
        }
        lifecycle.generation += 1;
        status.phase = EnginePhase::Off;
        status.mode = SyncMode::Off;
        status.server_addr = None;
        info!("Network sync stopped after losing its remote");
    }
}

/// Replicates playlists and the schedule with other application instances.
pub struct SyncEngine {
    shared: Arc<EngineShared>,
}

impl SyncEngine {
    /// Create a stopped engine.
    pub fn new(settings: SyncSettings, host: impl Into<String>, handshake_timeout: Duration) -> Self {
        let (outbound_tx, _) = broadcast::channel(256);
        let (events_tx, _) = broadcast::channel(256);
        Self {
            shared: Arc::new(EngineShared {
                node_id: Uuid::new_v4().to_string(),
                handshake_timeout,
                host: host.into(),
                settings: RwLock::new(settings),
                store: RwLock::new(ReplicaStore::new()),
                status: RwLock::new(EngineStatus::default()),
                lifecycle: Mutex::new(Lifecycle::default()),
                outbound_tx,
                events_tx,
                links: std::sync::Mutex::new(HashMap::new()),
                next_link: AtomicU64::new(1),
                client_connected: AtomicBool::new(false),
            }),
        }
    }

    /// Create a stopped engine from the server configuration.
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.sync.clone(), config.host.clone(), config.handshake_timeout)
    }

    /// Id this instance announces in handshakes.
    pub fn node_id(&self) -> &str {
        &self.shared.node_id
    }

    /// Current settings.
    pub async fn settings(&self) -> SyncSettings {
        self.shared.settings.read().await.clone()
    }

    /// Replace the settings.
    ///
    /// Scope flags apply immediately. Mode, ports and remote may only change
    /// while the engine is stopped.
    pub async fn update_settings(&self, settings: SyncSettings) -> Result<(), SyncError> {
        let mut current = self.shared.settings.write().await;
        let transport_changed = current.mode != settings.mode
            || current.server_port != settings.server_port
            || current.remote_addr() != settings.remote_addr();
        if transport_changed && self.phase().await != EnginePhase::Off {
            return Err(SyncError::AlreadyRunning);
        }
        *current = settings;
        Ok(())
    }

    /// Current lifecycle phase.
    pub async fn phase(&self) -> EnginePhase {
        self.shared.status.read().await.phase
    }

    /// Whether the engine is running.
    pub async fn is_running(&self) -> bool {
        self.phase().await == EnginePhase::Running
    }

    /// Address of the inbound listener, if one is running.
    pub async fn server_addr(&self) -> Option<SocketAddr> {
        self.shared.status.read().await.server_addr
    }

    /// Health snapshot for status displays.
    pub async fn connection_state(&self) -> SyncConnectionState {
        let status = self.shared.status.read().await;
        SyncConnectionState {
            server_running: status.phase == EnginePhase::Running && status.server_addr.is_some(),
            client_connected: self.shared.client_connected.load(Ordering::SeqCst),
            connected_clients: self.shared.links().len(),
            last_sync_time: status.last_sync,
            error: status.error.clone(),
        }
    }

    /// Handshaken links.
    pub fn links(&self) -> Vec<LinkInfo> {
        self.shared.links().values().cloned().collect()
    }

    /// Start the listener and/or the outbound link the mode calls for.
    ///
    /// On failure nothing is left running and the error is also recorded in
    /// [`SyncEngine::connection_state`]. There is no automatic retry.
    pub async fn start(&self) -> Result<(), SyncError> {
        let settings = self.settings().await;
        if settings.mode == SyncMode::Off {
            return Err(SyncError::ModeOff);
        }

        let mut lifecycle = self.shared.lifecycle.lock().await;
        if lifecycle.running.is_some() {
            return Err(SyncError::AlreadyRunning);
        }
        lifecycle.generation += 1;
        let generation = lifecycle.generation;

        {
            let mut status = self.shared.status.write().await;
            status.phase = EnginePhase::Starting;
            status.mode = settings.mode;
            status.error = None;
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut running = RunningLinks {
            shutdown: shutdown_tx,
            server: None,
            client: None,
        };

        match self
            .launch(&settings, generation, &mut running, shutdown_rx)
            .await
        {
            Ok(()) => {
                lifecycle.running = Some(running);
                self.shared.status.write().await.phase = EnginePhase::Running;
                info!(
                    "Network sync running as {} (node {})",
                    settings.mode, self.shared.node_id
                );
                Ok(())
            }
            Err(e) => {
                running.abort().await;
                lifecycle.generation += 1;
                let mut status = self.shared.status.write().await;
                status.phase = EnginePhase::Off;
                status.mode = SyncMode::Off;
                status.server_addr = None;
                status.error = Some(e.to_string());
                warn!("Network sync failed to start: {}", e);
                Err(e)
            }
        }
    }

    async fn launch(
        &self,
        settings: &SyncSettings,
        generation: u64,
        running: &mut RunningLinks,
        shutdown: watch::Receiver<bool>,
    ) -> Result<(), SyncError> {
        let remote = if settings.mode.connects_out() {
            Some(
                settings
                    .remote_addr()
                    .ok_or(SyncError::MissingRemote(settings.mode))?,
            )
        } else {
            None
        };

        if settings.mode.accepts_inbound() {
            let addr = format!("{}:{}", self.shared.host, settings.server_port);
            let (local, handle) =
                server::spawn(self.shared.clone(), &addr, shutdown.clone()).await?;
            running.server = Some(handle);
            self.shared.status.write().await.server_addr = Some(local);
        }

        if let Some(remote) = remote {
            let handle = client::connect(self.shared.clone(), &remote, generation, shutdown).await?;
            running.client = Some(handle);
        }
        Ok(())
    }

    /// Stop every link. Returns whether the engine was running.
    pub async fn stop(&self) -> bool {
        let mut lifecycle = self.shared.lifecycle.lock().await;
        let Some(running) = lifecycle.running.take() else {
            return false;
        };
        lifecycle.generation += 1;
        self.shared.status.write().await.phase = EnginePhase::Stopping;

        running.shutdown().await;

        let mut status = self.shared.status.write().await;
        status.phase = EnginePhase::Off;
        status.mode = SyncMode::Off;
        status.server_addr = None;
        self.shared.client_connected.store(false, Ordering::SeqCst);
        info!("Network sync stopped");
        true
    }

    /// Subscribe to changes applied from remote instances.
    pub fn subscribe_events(&self) -> broadcast::Receiver<ReplicaEvent> {
        self.shared.events_tx.subscribe()
    }

    /// Playlists currently held by this instance.
    pub async fn playlists(&self) -> Vec<Playlist> {
        self.shared.store.read().await.playlists().cloned().collect()
    }

    /// Schedule currently held by this instance, local automations included.
    pub async fn schedule(&self) -> Schedule {
        self.shared.store.read().await.schedule().clone()
    }

    /// Create or update a playlist item locally.
    ///
    /// Always applied here; returns whether it was published to other
    /// instances.
    pub async fn upsert_playlist_item(
        &self,
        playlist_id: &str,
        playlist_name: Option<String>,
        item: PlaylistItem,
        position: Option<usize>,
    ) -> bool {
        let message = self.shared.store.write().await.upsert_local(
            playlist_id,
            playlist_name,
            item,
            position,
        );
        self.publish(message).await
    }

    /// Delete a playlist item locally; returns whether it was published.
    pub async fn delete_playlist_item(&self, playlist_id: &str, item_id: &str) -> bool {
        let message = self
            .shared
            .store
            .write()
            .await
            .delete_local(playlist_id, item_id);
        match message {
            Some(message) => self.publish(message).await,
            None => false,
        }
    }

    /// Replace the schedule locally; returns whether it was published.
    pub async fn replace_schedule(&self, schedule: Schedule) -> bool {
        let message = self
            .shared
            .store
            .write()
            .await
            .replace_schedule_local(schedule);
        self.publish(message).await
    }

    /// Ask the remote we connected to for its full state.
    pub async fn request_state(&self) -> Result<(), SyncError> {
        if !self.shared.client_connected.load(Ordering::SeqCst) {
            return Err(SyncError::NotRunning);
        }
        let _ = self.shared.outbound_tx.send(Outbound {
            origin: None,
            only: Some(LinkDirection::Outbound),
            message: SyncMessage::SyncRequestState,
        });
        Ok(())
    }

    async fn publish(&self, message: SyncMessage) -> bool {
        let mode = self.shared.active_mode().await;
        let scope = self.shared.scope().await;
        let in_scope = match message {
            SyncMessage::SyncSchedule { .. } => scope.schedule,
            _ => scope.playlists,
        };
        if !in_scope || !may_send(mode, &message) {
            debug!("Not publishing {} in {} mode", message.type_name(), mode);
            return false;
        }
        self.shared.relay(None, message);
        true
    }
}
