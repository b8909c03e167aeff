//! Redis pub/sub for cross-instance fan-out of playback updates
//!
//! Every accepted host update is published on the session's channel; each
//! viewer relay holds its own receiver. Redis is used for multi-instance
//! deployments, with an in-memory fallback for single instance mode.
//!
//! Delivery is FIFO per channel and best-effort: a receiver that falls more
//! than [`BROADCAST_CAPACITY`] messages behind loses the oldest ones.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::broadcast::{
    self,
    error::{RecvError, TryRecvError},
};

use crate::sync::PlaybackState;

/// Channel capacity for broadcast channels
pub const BROADCAST_CAPACITY: usize = 256;

/// Prefix of every session update channel
const CHANNEL_PREFIX: &str = "sync:session:";

/// Channel name carrying updates for one session
pub fn channel_name(session_id: &str) -> String {
    format!("{}{}", CHANNEL_PREFIX, session_id)
}

/// Session pub/sub with Redis + in-memory fallback
#[derive(Clone)]
pub struct SessionPubSub {
    inner: Arc<SessionPubSubInner>,
    /// Local fan-out, one broadcast channel per session with live receivers
    channels: LocalChannels,
}

enum SessionPubSubInner {
    /// Redis-backed pub/sub for multi-instance deployments
    Redis(RedisPubSub),
    /// In-memory pub/sub for single-instance mode
    InMemory,
}

impl SessionPubSub {
    /// Create a new pub/sub system with Redis
    pub fn new_with_redis(client: redis::Client) -> Self {
        let channels = LocalChannels::default();
        Self {
            inner: Arc::new(SessionPubSubInner::Redis(RedisPubSub::new(
                client,
                channels.clone(),
            ))),
            channels,
        }
    }

    /// Create a new in-memory pub/sub system (single instance mode)
    pub fn new_in_memory() -> Self {
        Self {
            inner: Arc::new(SessionPubSubInner::InMemory),
            channels: LocalChannels::default(),
        }
    }

    /// Publish a playback snapshot on a session's channel
    pub async fn publish(&self, session_id: &str, state: PlaybackState) {
        match &*self.inner {
            SessionPubSubInner::Redis(redis) => redis.publish(session_id, state).await,
            SessionPubSubInner::InMemory => self.channels.deliver(session_id, state),
        }
    }

    /// Subscribe to a session's channel
    ///
    /// The local channel is released once its last subscription is dropped.
    pub fn subscribe(&self, session_id: &str) -> Subscription {
        self.channels.subscribe(session_id)
    }

    /// Number of sessions with at least one live local subscription
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Check if we're using Redis (multi-instance capable)
    pub fn is_redis_backed(&self) -> bool {
        matches!(&*self.inner, SessionPubSubInner::Redis(_))
    }

    /// Drop every local channel, ending all subscriptions
    #[cfg(test)]
    pub(crate) fn close_all(&self) {
        self.channels.clear();
    }
}

/// Receiver for one session's updates
///
/// Dropping it frees the session's local channel if no other subscription
/// holds it.
pub struct Subscription {
    session_id: String,
    receiver: Option<broadcast::Receiver<PlaybackState>>,
    channels: LocalChannels,
}

impl Subscription {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Wait for the next update on this session's channel
    pub async fn recv(&mut self) -> Result<PlaybackState, RecvError> {
        match self.receiver.as_mut() {
            Some(receiver) => receiver.recv().await,
            None => Err(RecvError::Closed),
        }
    }

    /// Take an already delivered update without waiting
    pub fn try_recv(&mut self) -> Result<PlaybackState, TryRecvError> {
        match self.receiver.as_mut() {
            Some(receiver) => receiver.try_recv(),
            None => Err(TryRecvError::Closed),
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        // Our receiver must be gone before the count is checked
        drop(self.receiver.take());
        self.channels.release(&self.session_id);
    }
}

/// Per-session broadcast senders shared by both backends
#[derive(Clone, Default)]
struct LocalChannels {
    senders: Arc<DashMap<String, broadcast::Sender<PlaybackState>>>,
}

impl LocalChannels {
    fn subscribe(&self, session_id: &str) -> Subscription {
        // Subscribing under the entry lock keeps release from racing us
        let receiver = self
            .senders
            .entry(session_id.to_string())
            .or_insert_with(|| broadcast::channel(BROADCAST_CAPACITY).0)
            .subscribe();

        Subscription {
            session_id: session_id.to_string(),
            receiver: Some(receiver),
            channels: self.clone(),
        }
    }

    fn deliver(&self, session_id: &str, state: PlaybackState) {
        if let Some(sender) = self.senders.get(session_id) {
            // Ignore send errors (no receivers)
            let _ = sender.send(state);
        }
    }

    fn release(&self, session_id: &str) {
        self.senders
            .remove_if(session_id, |_, sender| sender.receiver_count() == 0);
    }

    fn len(&self) -> usize {
        self.senders.len()
    }

    fn clear(&self) {
        self.senders.clear();
    }
}

/// Redis-backed pub/sub implementation
struct RedisPubSub {
    client: redis::Client,
    /// Local subscribers fed by the pattern listener
    channels: LocalChannels,
}

impl RedisPubSub {
    fn new(client: redis::Client, channels: LocalChannels) -> Self {
        let pubsub = Self { client, channels };

        pubsub.start_listener();

        pubsub
    }

    fn start_listener(&self) {
        let client = self.client.clone();
        let channels = self.channels.clone();

        tokio::spawn(async move {
            const MAX_RECONNECT_DELAY_SECS: u64 = 60;
            const MAX_RECONNECT_ATTEMPTS: u32 = 100;

            let mut attempts = 0u32;
            let mut delay_secs = 1u64;

            loop {
                match Self::run_listener(&client, &channels).await {
                    Ok(()) => {
                        tracing::warn!("Redis pub/sub listener disconnected, reconnecting...");
                        attempts = 0;
                        delay_secs = 1;
                    }
                    Err(e) => {
                        attempts += 1;
                        if attempts >= MAX_RECONNECT_ATTEMPTS {
                            tracing::error!(
                                "Redis pub/sub max reconnect attempts ({}) exceeded, giving up",
                                MAX_RECONNECT_ATTEMPTS
                            );
                            // Closing the channels ends every relay instead of leaving them waiting
                            channels.clear();
                            break;
                        }
                        tracing::error!(
                            error = %e,
                            attempt = attempts,
                            delay_secs = delay_secs,
                            "Redis pub/sub listener error, reconnecting..."
                        );
                    }
                }

                tokio::time::sleep(tokio::time::Duration::from_secs(delay_secs)).await;
                delay_secs = (delay_secs * 2).min(MAX_RECONNECT_DELAY_SECS);
            }
        });
    }

    async fn run_listener(
        client: &redis::Client,
        channels: &LocalChannels,
    ) -> Result<(), redis::RedisError> {
        use futures_util::StreamExt;

        let conn = client.get_async_connection().await?;
        let mut pubsub = conn.into_pubsub();

        pubsub.psubscribe(format!("{}*", CHANNEL_PREFIX)).await?;

        let mut stream = pubsub.on_message();

        while let Some(msg) = stream.next().await {
            let channel = msg.get_channel_name().to_string();
            let Some(session_id) = channel.strip_prefix(CHANNEL_PREFIX) else {
                continue;
            };

            match serde_json::from_slice::<PlaybackState>(msg.get_payload_bytes()) {
                Ok(state) => channels.deliver(session_id, state),
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        session_id = %session_id,
                        "Dropping undecodable playback update"
                    );
                }
            }
        }

        Ok(())
    }

    async fn publish(&self, session_id: &str, state: PlaybackState) {
        let channel = channel_name(session_id);

        match serde_json::to_string(&state) {
            Ok(payload) => match self.client.get_multiplexed_async_connection().await {
                Ok(mut conn) => {
                    let result: Result<(), _> = redis::cmd("PUBLISH")
                        .arg(&channel)
                        .arg(&payload)
                        .query_async(&mut conn)
                        .await;

                    if let Err(e) = result {
                        tracing::error!(error = %e, session_id = %session_id, "Failed to publish to Redis");
                        // Local viewers still get the update
                        self.channels.deliver(session_id, state);
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to get Redis connection for publish");
                    self.channels.deliver(session_id, state);
                }
            },
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize playback update");
            }
        }
    }
}
