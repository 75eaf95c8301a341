//! Connection lifecycle tests against a local WebSocket server

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use wallet_core::metrics::StreamMetrics;
use wallet_core::stream::{ConnectionConfig, ConnectionEvent, ConnectionState, StreamConnection};

async fn bind() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    (listener, url)
}

async fn next_event(rx: &mut mpsc::UnboundedReceiver<ConnectionEvent>) -> ConnectionEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for connection event")
        .expect("event channel closed")
}

fn connection(
    config: ConnectionConfig,
) -> (StreamConnection, mpsc::UnboundedReceiver<ConnectionEvent>) {
    StreamConnection::new(config, Arc::new(StreamMetrics::new()))
}

#[tokio::test]
async fn test_connect_delivers_frames_and_sends_outbound() {
    let (listener, url) = bind().await;
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        ws.send(Message::Text(r#"{"data":{"txHash":"0x1"}}"#.into()))
            .await
            .unwrap();
        while let Some(Ok(msg)) = ws.next().await {
            if let Message::Text(text) = msg {
                return text;
            }
        }
        panic!("server never received a text frame");
    });

    let (conn, mut events) = connection(ConnectionConfig::new(url));
    conn.connect();

    assert_eq!(next_event(&mut events).await, ConnectionEvent::Connected);
    assert_eq!(conn.state(), ConnectionState::Connected);
    match next_event(&mut events).await {
        ConnectionEvent::Frame(frame) => {
            assert!(format!("{:?}", frame).contains("0x1"));
        }
        other => panic!("expected a frame, got {:?}", other),
    }

    conn.send_json(&json!({"type": "positions", "payload": {}}));
    let received = server.await.unwrap();
    assert!(received.contains("positions"));

    conn.disconnect().await;
    assert_eq!(conn.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_keepalive_ping_sent_on_interval() {
    let (listener, url) = bind().await;
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        while let Some(Ok(msg)) = ws.next().await {
            if let Message::Text(text) = msg {
                return text;
            }
        }
        panic!("server never received a frame");
    });

    let mut config = ConnectionConfig::new(url);
    config.ping_interval = Duration::from_millis(150);
    let (conn, mut events) = connection(config);
    conn.connect();
    assert_eq!(next_event(&mut events).await, ConnectionEvent::Connected);

    // The client sends nothing; the first frame must be the keepalive
    let received = tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("no keepalive within interval")
        .unwrap();
    assert_eq!(received, r#"{"event":"ping"}"#);

    conn.disconnect().await;
}

#[tokio::test]
async fn test_disconnect_cancels_pending_reconnect_timer() {
    let (listener, url) = bind().await;
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        // Abnormal close: drop the socket without a close handshake
        let ws = accept_async(stream).await.unwrap();
        drop(ws);
    });

    let mut config = ConnectionConfig::new(url);
    config.reconnect_base_delay = Duration::from_secs(30);
    config.reconnect_cap_delay = Duration::from_secs(30);
    let (conn, mut events) = connection(config);
    conn.connect();

    assert_eq!(next_event(&mut events).await, ConnectionEvent::Connected);
    assert_eq!(
        next_event(&mut events).await,
        ConnectionEvent::Disconnected { will_retry: true }
    );

    // The connection is now inside a 30s backoff sleep; disconnect must
    // cancel it rather than wait it out
    let start = std::time::Instant::now();
    conn.disconnect().await;
    assert!(
        start.elapsed() < Duration::from_secs(5),
        "disconnect waited out the backoff timer"
    );
    assert_eq!(conn.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_reconnects_after_abnormal_close() {
    let (listener, url) = bind().await;
    tokio::spawn(async move {
        // First accept drops abnormally, second stays open
        let (stream, _) = listener.accept().await.unwrap();
        let ws = accept_async(stream).await.unwrap();
        drop(ws);

        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        while ws.next().await.is_some() {}
    });

    let mut config = ConnectionConfig::new(url);
    config.reconnect_base_delay = Duration::from_millis(50);
    let (conn, mut events) = connection(config);
    conn.connect();

    assert_eq!(next_event(&mut events).await, ConnectionEvent::Connected);
    assert_eq!(
        next_event(&mut events).await,
        ConnectionEvent::Disconnected { will_retry: true }
    );
    assert_eq!(next_event(&mut events).await, ConnectionEvent::Connected);

    conn.disconnect().await;
}

#[tokio::test]
async fn test_reconnect_ceiling_reaches_error_state() {
    // Bind then drop so the port refuses connections
    let (listener, url) = bind().await;
    drop(listener);

    let mut config = ConnectionConfig::new(url);
    config.reconnect_base_delay = Duration::from_millis(20);
    config.max_reconnect_attempts = 2;
    let (conn, mut events) = connection(config);
    conn.connect();

    assert_eq!(
        next_event(&mut events).await,
        ConnectionEvent::ReconnectsExhausted { attempts: 2 }
    );
    assert_eq!(conn.state(), ConnectionState::Error);
}
