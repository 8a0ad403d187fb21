//! Integration tests for network sync between engines on loopback

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use liveslides_core::replication::{
    Automation, ItemAction, PlaylistItem, Schedule, ScheduleItem, SyncMessage, SyncMode,
    SyncSettings,
};
use liveslides_server::SyncError;
use liveslides_server::netsync::{EnginePhase, LinkDirection, SyncEngine};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{sleep, timeout};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};

type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

fn engine(mode: SyncMode, remote: Option<SocketAddr>) -> SyncEngine {
    let settings = SyncSettings {
        mode,
        server_port: 0,
        remote_host: remote.map(|addr| addr.ip().to_string()),
        remote_port: remote.map(|addr| addr.port()).unwrap_or_default(),
        ..SyncSettings::default()
    };
    SyncEngine::new(settings, "127.0.0.1", Duration::from_millis(500))
}

fn item(id: &str, title: &str) -> PlaylistItem {
    PlaylistItem {
        id: id.to_string(),
        title: title.to_string(),
        slides: Vec::new(),
        updated_at: 0,
    }
}

/// Poll `check` until it holds or two seconds pass.
async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..40 {
        if check().await {
            return true;
        }
        sleep(Duration::from_millis(50)).await;
    }
    false
}

/// Wait until the snapshot sent with the welcome has been adopted.
async fn baseline(engine: &SyncEngine) {
    let adopted =
        eventually(|| async { engine.connection_state().await.last_sync_time.is_some() }).await;
    assert!(adopted, "no full state received");
}

fn block(name: &str, automations: Vec<Automation>) -> ScheduleItem {
    ScheduleItem {
        id: name.to_lowercase(),
        name: name.to_string(),
        start_time: None,
        duration_minutes: 10,
        session_name: None,
        automations,
    }
}

async fn titles(engine: &SyncEngine) -> Vec<String> {
    engine
        .playlists()
        .await
        .iter()
        .flat_map(|playlist| playlist.items.iter().map(|item| item.title.clone()))
        .collect()
}

async fn start_master() -> (SyncEngine, SocketAddr) {
    let master = engine(SyncMode::Master, None);
    master.start().await.unwrap();
    let addr = master.server_addr().await.unwrap();
    (master, addr)
}

async fn raw_link(addr: SocketAddr) -> WsClient {
    let (ws, _) = connect_async(format!("ws://{}/sync", addr)).await.unwrap();
    ws
}

async fn send_sync(ws: &mut WsClient, message: &SyncMessage) {
    let json = message.to_json().unwrap();
    ws.send(Message::Text(json.into())).await.unwrap();
}

async fn next_sync(ws: &mut WsClient) -> Option<SyncMessage> {
    loop {
        match timeout(Duration::from_millis(500), ws.next()).await {
            Ok(Some(Ok(Message::Text(text)))) => return SyncMessage::parse(text.as_str()).ok(),
            Ok(Some(Ok(Message::Close(_)))) | Ok(None) | Err(_) => return None,
            Ok(Some(Ok(_))) => continue,
            Ok(Some(Err(_))) => return None,
        }
    }
}

#[tokio::test]
async fn test_slave_receives_master_state_and_changes() {
    let (master, addr) = start_master().await;
    master
        .upsert_playlist_item("sunday", Some("Sunday".to_string()), item("a", "Amazing Grace"), None)
        .await;

    let slave = engine(SyncMode::Slave, Some(addr));
    let mut events = slave.subscribe_events();
    slave.start().await.unwrap();
    assert!(slave.connection_state().await.client_connected);

    // Baseline arrives with the welcome
    assert!(eventually(|| async { titles(&slave).await == ["Amazing Grace"] }).await);
    assert!(eventually(|| async { master.connection_state().await.connected_clients == 1 }).await);

    master
        .upsert_playlist_item("sunday", None, item("b", "How Great Thou Art"), None)
        .await;
    assert!(eventually(|| async { titles(&slave).await.len() == 2 }).await);

    master.delete_playlist_item("sunday", "a").await;
    assert!(eventually(|| async { titles(&slave).await == ["How Great Thou Art"] }).await);

    let mut saw_change = false;
    while let Ok(event) = events.try_recv() {
        if matches!(event, liveslides_server::netsync::ReplicaEvent::PlaylistItemChanged { .. }) {
            saw_change = true;
        }
    }
    assert!(saw_change);

    let links = slave.links();
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].direction, LinkDirection::Outbound);
    assert_eq!(links[0].remote_mode, SyncMode::Master);

    slave.stop().await;
    master.stop().await;
}

#[tokio::test]
async fn test_slave_writes_stay_local() {
    let (master, addr) = start_master().await;
    let slave = engine(SyncMode::Slave, Some(addr));
    slave.start().await.unwrap();
    baseline(&slave).await;

    assert!(!slave.upsert_playlist_item("p", None, item("x", "Local Only"), None).await);
    sleep(Duration::from_millis(200)).await;

    assert!(titles(&master).await.is_empty());
    assert_eq!(titles(&slave).await, ["Local Only"]);

    slave.stop().await;
    master.stop().await;
}

#[tokio::test]
async fn test_schedule_keeps_local_automations() {
    let (master, addr) = start_master().await;
    let slave = engine(SyncMode::Slave, Some(addr));
    slave.start().await.unwrap();
    baseline(&slave).await;

    let lights = Automation {
        id: "lights".to_string(),
        trigger: "on_start".to_string(),
        action: "scene:welcome".to_string(),
    };
    slave
        .replace_schedule(Schedule {
            items: vec![block("Welcome", vec![lights.clone()])],
            active_index: Some(0),
        })
        .await;
    // Keep the master's write strictly newer
    sleep(Duration::from_millis(10)).await;

    master
        .replace_schedule(Schedule {
            items: vec![block("Welcome", Vec::new()), block("Sermon", Vec::new())],
            active_index: Some(1),
        })
        .await;

    assert!(eventually(|| async { slave.schedule().await.items.len() == 2 }).await);
    let schedule = slave.schedule().await;
    assert_eq!(schedule.active_index, Some(1));
    assert_eq!(schedule.items[0].automations, vec![lights]);
    assert!(schedule.items[1].automations.is_empty());

    slave.stop().await;
    master.stop().await;
}

#[tokio::test]
async fn test_master_ignores_incoming_mutations() {
    let (master, addr) = start_master().await;
    let mut link = raw_link(addr).await;

    send_sync(
        &mut link,
        &SyncMessage::SyncJoin {
            client_id: "intruder".to_string(),
            mode: SyncMode::Peer,
        },
    )
    .await;
    assert!(matches!(
        next_sync(&mut link).await,
        Some(SyncMessage::SyncWelcome {
            mode: SyncMode::Master,
            connected_clients: 1,
            ..
        })
    ));
    assert!(matches!(
        next_sync(&mut link).await,
        Some(SyncMessage::SyncFullState { .. })
    ));

    send_sync(
        &mut link,
        &SyncMessage::SyncPlaylistItem {
            action: ItemAction::Create,
            playlist_id: "p".to_string(),
            playlist_name: None,
            item: item("z", "Pushed"),
            position: None,
            timestamp: i64::MAX / 2,
        },
    )
    .await;

    // No ack and no state change
    assert!(next_sync(&mut link).await.is_none());
    assert!(titles(&master).await.is_empty());

    master.stop().await;
}

#[tokio::test]
async fn test_handshake_rules_on_listener() {
    let (master, addr) = start_master().await;

    let mut early = raw_link(addr).await;
    send_sync(&mut early, &SyncMessage::SyncRequestState).await;
    assert!(matches!(
        next_sync(&mut early).await,
        Some(SyncMessage::SyncError { .. })
    ));

    let mut rival = raw_link(addr).await;
    send_sync(
        &mut rival,
        &SyncMessage::SyncJoin {
            client_id: "other-master".to_string(),
            mode: SyncMode::Master,
        },
    )
    .await;
    assert!(matches!(
        next_sync(&mut rival).await,
        Some(SyncMessage::SyncError { .. })
    ));
    assert!(next_sync(&mut rival).await.is_none());
    assert_eq!(master.connection_state().await.connected_clients, 0);

    let mut garbled = raw_link(addr).await;
    garbled
        .send(Message::Text("not json".into()))
        .await
        .unwrap();
    assert!(matches!(
        next_sync(&mut garbled).await,
        Some(SyncMessage::SyncError { .. })
    ));

    master.stop().await;
}

#[tokio::test]
async fn test_peer_exchanges_with_master() {
    let (master, addr) = start_master().await;
    let peer = engine(SyncMode::Peer, Some(addr));
    peer.start().await.unwrap();
    assert!(peer.server_addr().await.is_some());
    baseline(&peer).await;

    master
        .upsert_playlist_item("p", None, item("m", "From Master"), None)
        .await;
    assert!(eventually(|| async { titles(&peer).await == ["From Master"] }).await);

    // Published by the peer, ignored by the master
    assert!(peer.upsert_playlist_item("p", None, item("q", "From Peer"), None).await);
    sleep(Duration::from_millis(200)).await;
    assert_eq!(titles(&master).await, ["From Master"]);

    peer.request_state().await.unwrap();
    assert!(eventually(|| async { titles(&peer).await == ["From Master"] }).await);

    peer.stop().await;
    master.stop().await;
}

#[tokio::test]
async fn test_slave_turns_off_when_master_goes_away() {
    let (master, addr) = start_master().await;
    let slave = engine(SyncMode::Slave, Some(addr));
    slave.start().await.unwrap();

    master.stop().await;

    assert!(eventually(|| async { slave.phase().await == EnginePhase::Off }).await);
    let state = slave.connection_state().await;
    assert!(!state.client_connected);
    assert!(state.error.is_some());
}

#[tokio::test]
async fn test_port_conflict_leaves_engine_off() {
    let blocker = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = blocker.local_addr().unwrap().port();

    let settings = SyncSettings {
        mode: SyncMode::Master,
        server_port: port,
        ..SyncSettings::default()
    };
    let master = SyncEngine::new(settings, "127.0.0.1", Duration::from_millis(500));

    assert!(matches!(master.start().await, Err(SyncError::Bind { .. })));
    assert_eq!(master.phase().await, EnginePhase::Off);
    let state = master.connection_state().await;
    assert!(!state.server_running);
    assert!(state.error.is_some());
}

#[tokio::test]
async fn test_connect_failures_leave_engine_off() {
    // Nothing listens on a port we just released
    let closed = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let slave = engine(SyncMode::Slave, Some(closed));
    assert!(matches!(slave.start().await, Err(SyncError::Connect { .. })));
    assert_eq!(slave.phase().await, EnginePhase::Off);

    // Accepts TCP but never answers the upgrade
    let silent = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let peer = engine(SyncMode::Peer, Some(silent.local_addr().unwrap()));
    assert!(matches!(
        peer.start().await,
        Err(SyncError::HandshakeTimeout { .. })
    ));
    assert_eq!(peer.phase().await, EnginePhase::Off);
    // The peer's own listener was torn down with the failed start
    assert!(peer.server_addr().await.is_none());
    assert!(!peer.connection_state().await.server_running);
}

#[tokio::test]
async fn test_peer_rejects_far_future_writes_and_keeps_serving() {
    let (master, addr) = start_master().await;
    let peer = engine(SyncMode::Peer, Some(addr));
    peer.start().await.unwrap();
    baseline(&peer).await;
    let peer_addr = peer.server_addr().await.unwrap();

    let mut link = raw_link(peer_addr).await;
    send_sync(
        &mut link,
        &SyncMessage::SyncJoin {
            client_id: "skewed".to_string(),
            mode: SyncMode::Slave,
        },
    )
    .await;
    assert!(matches!(next_sync(&mut link).await, Some(SyncMessage::SyncWelcome { .. })));
    assert!(matches!(next_sync(&mut link).await, Some(SyncMessage::SyncFullState { .. })));

    send_sync(
        &mut link,
        &SyncMessage::SyncPlaylistItem {
            action: ItemAction::Create,
            playlist_id: "p".to_string(),
            playlist_name: None,
            item: item("far", "From the future"),
            position: None,
            timestamp: i64::MAX,
        },
    )
    .await;
    assert!(matches!(next_sync(&mut link).await, Some(SyncMessage::SyncError { .. })));
    assert!(titles(&peer).await.is_empty());

    // Local writes and new joiners are unaffected
    assert!(peer.upsert_playlist_item("p", None, item("ok", "Still Fine"), None).await);
    let mut late = raw_link(peer_addr).await;
    send_sync(
        &mut late,
        &SyncMessage::SyncJoin {
            client_id: "late".to_string(),
            mode: SyncMode::Slave,
        },
    )
    .await;
    assert!(matches!(next_sync(&mut late).await, Some(SyncMessage::SyncWelcome { .. })));
    assert!(matches!(next_sync(&mut late).await, Some(SyncMessage::SyncFullState { .. })));

    peer.stop().await;
    master.stop().await;
}
