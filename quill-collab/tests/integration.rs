//! Integration tests for end-to-end WebSocket collaboration.
//!
//! These tests start a real server and connect real clients,
//! verifying the full sync pipeline.

use futures_util::{SinkExt, StreamExt};
use quill_collab::buffer::{EditCommand, LocalBuffer};
use quill_collab::client::{ClientConfig, ConnectionState, SyncClient, SyncEvent};
use quill_collab::protocol::WireFormat;
use quill_collab::server::{ServerConfig, SyncServer};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};
use tokio_tungstenite::tungstenite::Message;

const TEST_DEBOUNCE: Duration = Duration::from_millis(50);

/// Start a server on a free port, return it with its endpoint URL.
async fn start_test_server(config: ServerConfig, text: &str) -> (Arc<SyncServer>, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let server = Arc::new(SyncServer::with_text(config, text));
    let serving = server.clone();
    tokio::spawn(async move {
        serving.serve(listener).await.unwrap();
    });
    (server, format!("ws://127.0.0.1:{port}/ws"))
}

fn client_config(url: &str) -> ClientConfig {
    ClientConfig::new(url).with_debounce(TEST_DEBOUNCE)
}

/// Wait until the client reports `text` written into its buffer.
async fn wait_for_remote_text(events: &mut mpsc::Receiver<SyncEvent>, text: &str) {
    let result = timeout(Duration::from_secs(3), async {
        while let Some(event) = events.recv().await {
            if let SyncEvent::RemoteApplied { text: applied } = &event {
                if applied == text {
                    return;
                }
            }
        }
        panic!("Event stream ended before {text:?} arrived");
    })
    .await;
    assert!(result.is_ok(), "Timed out waiting for remote text {text:?}");
}

/// Read the next text frame from a raw WebSocket.
async fn next_text<S>(ws: &mut S) -> String
where
    S: futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let msg = timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("Timed out waiting for frame")
            .expect("Stream ended")
            .expect("WebSocket error");
        if let Message::Text(text) = msg {
            return text.as_str().to_owned();
        }
    }
}

#[tokio::test]
async fn test_server_greets_with_canonical_text() {
    let (_server, url) = start_test_server(ServerConfig::default(), "hello").await;

    let (mut ws, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
    assert_eq!(next_text(&mut ws).await, r#"{"text":"hello"}"#);
}

#[tokio::test]
async fn test_wrong_path_refused() {
    let (_server, url) = start_test_server(ServerConfig::default(), "").await;
    let wrong = url.replace("/ws", "/socket");

    let result = tokio_tungstenite::connect_async(&wrong).await;
    assert!(result.is_err(), "Upgrade on a foreign path should be refused");
}

#[tokio::test]
async fn test_client_applies_greeting_without_echo() {
    let (server, url) = start_test_server(ServerConfig::default(), "shared draft").await;

    let mut client = SyncClient::new(client_config(&url));
    let mut events = client.take_event_rx().unwrap();
    let session = client.connect(LocalBuffer::with_text("shared draf")).await.unwrap();

    match timeout(Duration::from_secs(2), events.recv()).await {
        Ok(Some(SyncEvent::Connected)) => {}
        other => panic!("Expected Connected event, got {other:?}"),
    }
    assert_eq!(client.connection_state().await, ConnectionState::Connected);

    wait_for_remote_text(&mut events, "shared draft").await;
    assert_eq!(session.snapshot().await.unwrap().text, "shared draft");

    // Several debounce windows pass; nothing goes back to the server.
    tokio::time::sleep(TEST_DEBOUNCE * 6).await;
    assert_eq!(server.stats().await.total_messages, 0);
}

#[tokio::test]
async fn test_snapshot_edits_reach_other_client() {
    let (server, url) = start_test_server(ServerConfig::default(), "").await;

    let mut alice = SyncClient::new(client_config(&url));
    let mut alice_events = alice.take_event_rx().unwrap();
    let alice_session = alice.connect(LocalBuffer::new()).await.unwrap();
    wait_for_remote_text(&mut alice_events, "").await;

    let mut bob = SyncClient::new(client_config(&url));
    let mut bob_events = bob.take_event_rx().unwrap();
    let bob_session = bob.connect(LocalBuffer::new()).await.unwrap();
    wait_for_remote_text(&mut bob_events, "").await;

    for ch in "hi there".chars() {
        alice_session.edit(EditCommand::Insert(ch)).await.unwrap();
    }

    wait_for_remote_text(&mut bob_events, "hi there").await;
    assert_eq!(bob_session.snapshot().await.unwrap().text, "hi there");
    assert_eq!(server.text().await, "hi there");
    // The burst went out as a single frame.
    assert_eq!(server.stats().await.total_messages, 1);
}

#[tokio::test]
async fn test_operation_edits_reach_other_client() {
    let (server, url) = start_test_server(ServerConfig::default(), "helo").await;

    let config = client_config(&url).with_wire_format(WireFormat::Operation);
    let mut alice = SyncClient::new(config.clone());
    let mut alice_events = alice.take_event_rx().unwrap();
    let alice_session = alice.connect(LocalBuffer::new()).await.unwrap();
    wait_for_remote_text(&mut alice_events, "helo").await;

    let mut bob = SyncClient::new(config);
    let mut bob_events = bob.take_event_rx().unwrap();
    let _bob_session = bob.connect(LocalBuffer::new()).await.unwrap();
    wait_for_remote_text(&mut bob_events, "helo").await;

    alice_session.edit(EditCommand::MoveCaret(3)).await.unwrap();
    alice_session.edit(EditCommand::Insert('l')).await.unwrap();
    wait_for_remote_text(&mut bob_events, "hello").await;

    alice_session.edit(EditCommand::MoveCaret(5)).await.unwrap();
    alice_session.edit(EditCommand::Backspace).await.unwrap();
    wait_for_remote_text(&mut bob_events, "hell").await;

    assert_eq!(server.text().await, "hell");
    assert_eq!(server.stats().await.rejected_messages, 0);
}

#[tokio::test]
async fn test_server_ignores_malformed_frames() {
    let (server, url) = start_test_server(ServerConfig::default(), "").await;

    let (mut writer, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
    let (mut reader, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
    next_text(&mut writer).await;
    next_text(&mut reader).await;

    writer.send(Message::text("not json")).await.unwrap();
    writer
        .send(Message::text(r#"{"type":"delete","pos":3}"#))
        .await
        .unwrap();
    writer.send(Message::text(r#"{"text":"ok"}"#)).await.unwrap();

    assert_eq!(next_text(&mut reader).await, r#"{"text":"ok"}"#);
    let stats = server.stats().await;
    assert_eq!(stats.rejected_messages, 2);
    assert_eq!(stats.total_messages, 3);
}

#[tokio::test]
async fn test_sender_excluded_unless_echo_enabled() {
    let (_server, url) = start_test_server(ServerConfig::default(), "").await;
    let (mut ws, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
    next_text(&mut ws).await;

    ws.send(Message::text(r#"{"text":"mine"}"#)).await.unwrap();
    let echoed = timeout(Duration::from_millis(200), ws.next()).await;
    assert!(echoed.is_err(), "Sender should not get its own update back");

    let config = ServerConfig {
        echo_to_sender: true,
        ..ServerConfig::default()
    };
    let (_server, url) = start_test_server(config, "").await;
    let (mut ws, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
    next_text(&mut ws).await;

    ws.send(Message::text(r#"{"type":"insert","pos":0,"char":"x"}"#))
        .await
        .unwrap();
    assert_eq!(next_text(&mut ws).await, r#"{"text":"x"}"#);
}

#[tokio::test]
async fn test_peer_limit() {
    let config = ServerConfig {
        max_peers: 1,
        ..ServerConfig::default()
    };
    let (server, url) = start_test_server(config, "").await;

    let (mut first, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
    next_text(&mut first).await;

    let (mut second, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
    let msg = timeout(Duration::from_secs(2), second.next()).await.unwrap();
    assert!(matches!(msg, Some(Ok(Message::Close(_))) | None));
    assert_eq!(server.stats().await.refused_connections, 1);
}

#[tokio::test]
async fn test_client_reports_disconnect() {
    // A one-shot server: greet, then close.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        ws.send(Message::text(r#"{"text":"bye"}"#)).await.unwrap();
        ws.close(None).await.unwrap();
    });

    let mut client = SyncClient::new(client_config(&format!("ws://127.0.0.1:{port}/ws")));
    let mut events = client.take_event_rx().unwrap();
    let session = client.connect(LocalBuffer::new()).await.unwrap();

    // The reader may report the close before the session applies the greeting.
    let (mut greeted, mut disconnected) = (false, false);
    let result = timeout(Duration::from_secs(3), async {
        while let Some(event) = events.recv().await {
            match event {
                SyncEvent::RemoteApplied { text } if text == "bye" => greeted = true,
                SyncEvent::Disconnected => disconnected = true,
                _ => {}
            }
            if greeted && disconnected {
                break;
            }
        }
    })
    .await;
    assert!(result.is_ok(), "Expected greeting and disconnect events");
    assert!(greeted && disconnected);
    assert_eq!(client.connection_state().await, ConnectionState::Disconnected);

    // Editing continues offline.
    session.edit(EditCommand::MoveCaret(3)).await.unwrap();
    session.edit(EditCommand::Insert('!')).await.unwrap();
    assert_eq!(session.snapshot().await.unwrap().text, "bye!");
}
