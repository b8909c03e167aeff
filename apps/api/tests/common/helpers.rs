//! Test helper functions for API integration tests

#![allow(dead_code)]

use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::Value;
use tokio::sync::mpsc;
use tower::ServiceExt;

use inflo_api::config::Config;
use inflo_api::services::SessionCredentials;
use inflo_api::sync::{ViewerEvent, ViewerFeed, VIEWER_QUEUE_CAPACITY};
use inflo_api::{app_router, AppState};

/// How long to wait before concluding that no event is coming
pub const QUIET_PERIOD: Duration = Duration::from_millis(50);

/// Router plus the state behind it, on in-memory backends
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(&Config::default())
    }

    pub fn with_config(config: &Config) -> Self {
        let state = AppState::in_memory(config);
        Self {
            router: app_router(state.clone()),
            state,
        }
    }

    /// Send a request and return status plus body parsed as JSON (Null if empty or not JSON)
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
        (status, json)
    }

    pub async fn start_session(&self) -> SessionCredentials {
        let (status, body) = self
            .send(
                Request::builder()
                    .method("POST")
                    .uri("/start")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "start failed: {}", body);

        SessionCredentials {
            secret: body["secret"].as_str().unwrap().to_string(),
            id: body["id"].as_str().unwrap().to_string(),
        }
    }

    pub async fn put_update(&self, secret: &str, body: impl Into<Body>) -> (StatusCode, Value) {
        self.send(
            Request::builder()
                .method("PUT")
                .uri(format!("/update/{}", secret))
                .header("content-type", "application/json")
                .body(body.into())
                .unwrap(),
        )
        .await
    }

    /// Bootstrap a viewer and run its relay in the background
    pub async fn follow(&self, session_id: &str) -> Viewer {
        let ViewerFeed {
            relay,
            greeting,
            updates,
        } = self.state.feeds.open(session_id).await.unwrap();

        let (tx, events) = mpsc::channel(VIEWER_QUEUE_CAPACITY);
        tokio::spawn(relay.forward(updates, tx));

        Viewer { greeting, events }
    }
}

/// Viewer side of a running relay
pub struct Viewer {
    pub greeting: ViewerEvent,
    pub events: mpsc::Receiver<ViewerEvent>,
}

impl Viewer {
    /// Next event, failing the test if none arrives promptly
    pub async fn next_event(&mut self) -> ViewerEvent {
        tokio::time::timeout(Duration::from_secs(1), self.events.recv())
            .await
            .expect("timed out waiting for viewer event")
            .expect("relay stopped")
    }

    /// Assert that no event arrives within the quiet period
    pub async fn assert_quiet(&mut self) {
        if let Ok(event) = tokio::time::timeout(QUIET_PERIOD, self.events.recv()).await {
            panic!("expected no event, got {:?}", event);
        }
    }
}

/// Wait until no session has a live local channel
pub async fn wait_for_released_channels(app: &TestApp) {
    let released = async {
        while app.state.pubsub.channel_count() > 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(1), released)
        .await
        .unwrap_or_else(|_| {
            panic!(
                "{} channel(s) still held",
                app.state.pubsub.channel_count()
            )
        });
}

/// Assert two progress values agree within a scheduling margin
pub fn assert_progress_near(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 0.5,
        "progress {} not within 0.5 of {}",
        actual,
        expected
    );
}
