//! Viewer feed tests over a real WebSocket connection

mod common;

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::StreamExt;
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{protocol::frame::coding::CloseCode, Message},
    MaybeTlsStream, WebSocketStream,
};

use inflo_api::services::IdIssuer;

use common::*;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Serve the app on an ephemeral port
async fn serve(app: &TestApp) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = app.router.clone();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

async fn connect(addr: SocketAddr, session_id: &str) -> Socket {
    let (socket, _) = connect_async(format!("ws://{}/feed/{}", addr, session_id))
        .await
        .expect("websocket handshake failed");
    socket
}

/// Next frame that is not a ping or pong
async fn next_frame(socket: &mut Socket) -> Message {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(1), socket.next())
            .await
            .expect("timed out waiting for frame")
            .expect("socket ended")
            .expect("socket error");
        match frame {
            Message::Ping(_) | Message::Pong(_) => continue,
            other => return other,
        }
    }
}

async fn next_json(socket: &mut Socket) -> Value {
    match next_frame(socket).await {
        Message::Text(text) => serde_json::from_str(&text).unwrap(),
        other => panic!("expected text frame, got {:?}", other),
    }
}

async fn assert_policy_close(socket: &mut Socket) {
    match next_frame(socket).await {
        Message::Close(Some(frame)) => assert_eq!(frame.code, CloseCode::Policy),
        other => panic!("expected close frame, got {:?}", other),
    }
}

#[tokio::test]
async fn test_greeting_is_first_frame_then_diffs() {
    let app = TestApp::new();
    let addr = serve(&app).await;
    let creds = app.start_session().await;
    app.put_update(&creds.secret, report(false, MEDIA_ID, 12.0))
        .await;

    let mut socket = connect(addr, &creds.id).await;

    let greeting = next_json(&mut socket).await;
    assert_eq!(greeting["type"], 0);
    assert_eq!(greeting["playing"], false);
    assert_eq!(greeting["id"], MEDIA_ID);
    assert_eq!(greeting["progress"], 12.0);

    app.put_update(&creds.secret, report(true, MEDIA_ID, 12.0))
        .await;
    let event = next_json(&mut socket).await;
    assert_eq!(event, serde_json::json!({ "type": 1, "playing": true }));

    app.put_update(&creds.secret, report(false, MEDIA_ID, 30.0))
        .await;
    let event = next_json(&mut socket).await;
    assert_eq!(event, serde_json::json!({ "type": 1, "playing": false }));

    app.put_update(&creds.secret, report(false, MEDIA_ID, 45.0))
        .await;
    let event = next_json(&mut socket).await;
    assert_eq!(event, serde_json::json!({ "type": 2, "seek": 45.0 }));
}

#[tokio::test]
async fn test_malformed_id_gets_failure_frame_and_close() {
    let app = TestApp::new();
    let addr = serve(&app).await;

    let mut socket = connect(addr, "nope").await;

    let failure = next_json(&mut socket).await;
    assert_eq!(failure["status"], "fail");
    assert_eq!(failure["code"], "INVALID_SESSION_ID");
    assert_policy_close(&mut socket).await;
}

#[tokio::test]
async fn test_unknown_id_gets_failure_frame_and_close() {
    let app = TestApp::new();
    let addr = serve(&app).await;

    let mut socket = connect(addr, &IdIssuer::new_token()).await;

    let failure = next_json(&mut socket).await;
    assert_eq!(failure["status"], "fail");
    assert_eq!(failure["code"], "SESSION_NOT_FOUND");
    assert_policy_close(&mut socket).await;
    assert_eq!(app.state.pubsub.channel_count(), 0);
}

#[tokio::test]
async fn test_client_close_releases_channel() {
    let app = TestApp::new();
    let addr = serve(&app).await;
    let creds = app.start_session().await;

    let mut socket = connect(addr, &creds.id).await;
    next_json(&mut socket).await;
    assert_eq!(app.state.pubsub.channel_count(), 1);

    socket.close(None).await.unwrap();
    wait_for_released_channels(&app).await;
}
