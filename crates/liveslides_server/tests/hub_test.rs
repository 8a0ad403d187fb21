//! Integration tests for the Live Slides hub over real WebSockets

use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use liveslides_server::{Config, HubError, LiveSlidesServer};
use serde_json::{Value, json};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};

type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

fn test_config() -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        ..Config::default()
    }
}

async fn start_server() -> (LiveSlidesServer, SocketAddr) {
    let server = LiveSlidesServer::new(test_config());
    let addr = server.start().await.unwrap();
    (server, addr)
}

async fn connect(addr: SocketAddr) -> WsClient {
    let (ws, _) = connect_async(format!("ws://{}/ws", addr)).await.unwrap();
    ws
}

async fn send(ws: &mut WsClient, value: Value) {
    ws.send(Message::Text(value.to_string().into())).await.unwrap();
}

/// Next JSON frame, or `None` if nothing arrives shortly
async fn next_json(ws: &mut WsClient) -> Option<Value> {
    loop {
        match timeout(Duration::from_millis(500), ws.next()).await {
            Ok(Some(Ok(Message::Text(text)))) => {
                return Some(serde_json::from_str(text.as_str()).unwrap());
            }
            Ok(Some(Ok(_))) => continue,
            _ => return None,
        }
    }
}

async fn http_get(addr: SocketAddr, path: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!(
        "GET {} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n",
        path, addr
    );
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    response
}

#[tokio::test]
async fn test_editor_updates_reach_viewer_without_echo() {
    let (server, addr) = start_server().await;
    let mut editor = connect(addr).await;
    let mut viewer = connect(addr).await;
    for client in [&mut editor, &mut viewer] {
        send(client, json!({"type": "list_sessions"})).await;
        assert_eq!(next_json(client).await.unwrap()["type"], "sessions_list");
    }

    send(&mut editor, json!({"type": "create_session", "name": "Sunday"})).await;
    let created = next_json(&mut editor).await.unwrap();
    assert_eq!(created["type"], "session_created");
    assert_eq!(next_json(&mut viewer).await.unwrap()["type"], "session_created");
    let session_id = created["session"]["id"].as_str().unwrap().to_string();

    send(
        &mut editor,
        json!({"type": "join_session", "session_id": session_id, "client_type": "notepad"}),
    )
    .await;
    send(
        &mut viewer,
        json!({"type": "join_session", "session_id": session_id, "client_type": "viewer"}),
    )
    .await;
    assert_eq!(next_json(&mut editor).await.unwrap()["type"], "slides_update");
    assert_eq!(next_json(&mut viewer).await.unwrap()["type"], "slides_update");

    send(
        &mut editor,
        json!({
            "type": "text_update",
            "session_id": session_id,
            "text": "Parent\n\tChild1\n\tChild2"
        }),
    )
    .await;

    let update = next_json(&mut viewer).await.unwrap();
    assert_eq!(update["type"], "slides_update");
    assert_eq!(update["raw_text"], "Parent\n\tChild1\n\tChild2");
    assert_eq!(update["slides"].as_array().unwrap().len(), 3);
    assert_eq!(update["boundaries"].as_array().unwrap().len(), 3);

    assert!(next_json(&mut editor).await.is_none());

    server.shutdown().await;
}

#[tokio::test]
async fn test_errors_keep_the_connection_open() {
    let (server, addr) = start_server().await;
    let mut client = connect(addr).await;

    client.send(Message::Text("{not json".into())).await.unwrap();
    assert_eq!(next_json(&mut client).await.unwrap()["type"], "error");

    send(
        &mut client,
        json!({"type": "text_update", "session_id": "7d1c1f8e-2b0a-4b8e-9a55-0f7f2f0f6a11", "text": "x"}),
    )
    .await;
    let error = next_json(&mut client).await.unwrap();
    assert_eq!(error["type"], "error");
    assert!(error["message"].as_str().unwrap().contains("not found"));

    send(&mut client, json!({"type": "list_sessions"})).await;
    let list = next_json(&mut client).await.unwrap();
    assert_eq!(list["type"], "sessions_list");
    assert!(list["sessions"].as_array().unwrap().is_empty());

    server.shutdown().await;
}

#[tokio::test]
async fn test_late_joiner_sees_current_slides_and_transcript() {
    let (server, addr) = start_server().await;
    let hub = server.hub();
    let session = hub.create_session("Evening").await;
    hub.apply_text_update(session.id(), "Welcome\n\nAnnouncements".to_string(), None)
        .await
        .unwrap();

    let mut feeder = connect(addr).await;
    send(
        &mut feeder,
        json!({
            "type": "transcription_stream",
            "kind": "final",
            "timestamp": 1_700_000_000_000i64,
            "engine": "whisper",
            "text": "Good evening everyone",
            "session_id": session.id().to_string(),
            "scripture": {"reference": "Psalm 23:1"}
        }),
    )
    .await;
    // Let the relay land before joining
    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut viewer = connect(addr).await;
    send(
        &mut viewer,
        json!({"type": "join_session", "session_id": session.id().to_string(), "client_type": "viewer"}),
    )
    .await;

    let slides = next_json(&mut viewer).await.unwrap();
    assert_eq!(slides["type"], "slides_update");
    assert_eq!(slides["slides"].as_array().unwrap().len(), 2);

    let chunk = next_json(&mut viewer).await.unwrap();
    assert_eq!(chunk["type"], "transcription_stream");
    assert_eq!(chunk["text"], "Good evening everyone");
    assert_eq!(chunk["scripture"]["reference"], "Psalm 23:1");

    server.shutdown().await;
}

#[tokio::test]
async fn test_delete_session_notifies_subscribers() {
    let (server, addr) = start_server().await;
    let session = server.hub().create_session("Temp").await;
    let mut viewer = connect(addr).await;
    send(
        &mut viewer,
        json!({"type": "join_session", "session_id": session.id().to_string(), "client_type": "viewer"}),
    )
    .await;
    next_json(&mut viewer).await.unwrap();

    let mut admin = connect(addr).await;
    send(
        &mut admin,
        json!({"type": "delete_session", "session_id": session.id().to_string()}),
    )
    .await;

    let notice = next_json(&mut viewer).await.unwrap();
    assert_eq!(notice["type"], "session_deleted");
    assert_eq!(notice["session_id"], session.id().to_string());
    assert!(next_json(&mut viewer).await.is_none());

    server.shutdown().await;
}

#[tokio::test]
async fn test_http_session_snapshots() {
    let (server, addr) = start_server().await;
    let session = server.hub().create_session("Polling").await;
    server
        .hub()
        .apply_text_update(session.id(), "One\nTwo".to_string(), None)
        .await
        .unwrap();

    let list = http_get(addr, "/api/sessions").await;
    assert!(list.starts_with("HTTP/1.1 200"));
    assert!(list.contains("Polling"));
    assert!(list.contains("One\\nTwo"));

    let missing = http_get(addr, "/api/sessions/8c1f6a32-8d7e-4c3f-a5e4-7a4c1b2d3e4f").await;
    assert!(missing.starts_with("HTTP/1.1 404"));

    let status = http_get(addr, "/api/status").await;
    assert!(status.contains(r#""active_sessions":1"#));
    assert!(status.contains(r#""sync_mode":"off""#));

    server.shutdown().await;
}

#[tokio::test]
async fn test_start_twice_and_port_conflict() {
    let (server, addr) = start_server().await;
    assert!(matches!(
        server.start().await,
        Err(HubError::AlreadyRunning(running)) if running == addr
    ));

    let conflicting = LiveSlidesServer::new(Config {
        host: "127.0.0.1".to_string(),
        port: addr.port(),
        ..Config::default()
    });
    assert!(matches!(
        conflicting.start().await,
        Err(HubError::Bind { .. })
    ));
    assert!(conflicting.local_addr().await.is_none());

    assert!(server.stop().await);
    assert!(!server.stop().await);
}
