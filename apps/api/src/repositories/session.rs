//! Session repository for the session store
//!
//! Owns the key layout and the hash encoding of playback snapshots:
//!
//! - `secret:{secret}` -> session id, expires after the secret TTL, never refreshed
//! - `session:{id}` -> hash of `playing`, `media_id`, `progress`, `observed_at`,
//!   expires after the session TTL, refreshed whenever a viewer connects

use std::collections::HashMap;

use crate::store::{SessionStore, StoreError, StoreResult};
use crate::sync::PlaybackState;

const SECRET_KEY_PREFIX: &str = "secret:";
const SESSION_KEY_PREFIX: &str = "session:";

const FIELD_PLAYING: &str = "playing";
const FIELD_MEDIA_ID: &str = "media_id";
const FIELD_PROGRESS: &str = "progress";
const FIELD_OBSERVED_AT: &str = "observed_at";

pub fn secret_key(secret: &str) -> String {
    format!("{}{}", SECRET_KEY_PREFIX, secret)
}

pub fn session_key(session_id: &str) -> String {
    format!("{}{}", SESSION_KEY_PREFIX, session_id)
}

/// Expiry windows for session records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTtl {
    /// Lifetime of the session snapshot, restarted on every viewer connect
    pub session_secs: u64,
    /// Lifetime of the host secret, counted from creation
    pub secret_secs: u64,
}

impl Default for SessionTtl {
    fn default() -> Self {
        Self {
            session_secs: 24 * 60 * 60,
            secret_secs: 12 * 60 * 60,
        }
    }
}

/// Repository for session store operations
#[derive(Clone)]
pub struct SessionRepository {
    store: SessionStore,
    ttl: SessionTtl,
}

impl SessionRepository {
    pub fn new(store: SessionStore, ttl: SessionTtl) -> Self {
        Self { store, ttl }
    }

    /// Get a reference to the underlying store
    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn ttl(&self) -> SessionTtl {
        self.ttl
    }

    pub async fn secret_exists(&self, secret: &str) -> StoreResult<bool> {
        self.store.exists(&secret_key(secret)).await
    }

    pub async fn session_exists(&self, session_id: &str) -> StoreResult<bool> {
        self.store.exists(&session_key(session_id)).await
    }

    /// Write a new session: the secret mapping and the initial snapshot
    pub async fn create(
        &self,
        secret: &str,
        session_id: &str,
        initial: &PlaybackState,
    ) -> StoreResult<()> {
        let key = session_key(session_id);

        self.store
            .set_ex(&secret_key(secret), session_id, self.ttl.secret_secs)
            .await?;
        self.store
            .hset_multiple(&key, &encode_state(initial))
            .await?;
        self.store.expire(&key, self.ttl.session_secs).await?;

        Ok(())
    }

    /// Session id a host secret grants access to, if the secret is still live
    pub async fn resolve_secret(&self, secret: &str) -> StoreResult<Option<String>> {
        self.store.get(&secret_key(secret)).await
    }

    /// Overwrite the session's snapshot. Leaves its expiry untouched.
    pub async fn write_state(&self, session_id: &str, state: &PlaybackState) -> StoreResult<()> {
        self.store
            .hset_multiple(&session_key(session_id), &encode_state(state))
            .await
    }

    /// Latest snapshot, or `None` when the session expired or never existed
    pub async fn load_state(&self, session_id: &str) -> StoreResult<Option<PlaybackState>> {
        let key = session_key(session_id);
        let fields = self.store.hget_all(&key).await?;

        if fields.is_empty() {
            return Ok(None);
        }

        decode_state(&key, &fields).map(Some)
    }

    /// Restart the session expiry window. Returns false if the session is gone.
    pub async fn touch(&self, session_id: &str) -> StoreResult<bool> {
        self.store
            .expire(&session_key(session_id), self.ttl.session_secs)
            .await
    }
}

fn encode_state(state: &PlaybackState) -> [(&'static str, String); 4] {
    [
        (FIELD_PLAYING, if state.playing { "1" } else { "0" }.to_string()),
        (FIELD_MEDIA_ID, state.media_id.clone()),
        (FIELD_PROGRESS, state.progress.to_string()),
        (FIELD_OBSERVED_AT, state.observed_at.to_string()),
    ]
}

fn decode_state(key: &str, fields: &HashMap<String, String>) -> StoreResult<PlaybackState> {
    let field = |name: &str| {
        fields.get(name).ok_or_else(|| StoreError::Corrupt {
            key: key.to_string(),
            reason: format!("missing field {}", name),
        })
    };
    let number = |name: &str| -> StoreResult<f64> {
        field(name)?.parse().map_err(|_| StoreError::Corrupt {
            key: key.to_string(),
            reason: format!("field {} is not a number", name),
        })
    };

    Ok(PlaybackState {
        playing: field(FIELD_PLAYING)? == "1",
        media_id: field(FIELD_MEDIA_ID)?.clone(),
        progress: number(FIELD_PROGRESS)?,
        observed_at: number(FIELD_OBSERVED_AT)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> SessionRepository {
        SessionRepository::new(SessionStore::new_in_memory(), SessionTtl::default())
    }

    fn sample() -> PlaybackState {
        PlaybackState {
            media_id: "abcdefghijk".to_string(),
            playing: true,
            progress: 12.25,
            observed_at: 1_700_000_000.5,
        }
    }

    #[tokio::test]
    async fn test_create_writes_both_records_with_ttls() {
        let repo = repo();
        repo.create("s3cret", "sess", &sample()).await.unwrap();

        assert_eq!(
            repo.resolve_secret("s3cret").await.unwrap(),
            Some("sess".to_string())
        );
        assert_eq!(repo.load_state("sess").await.unwrap(), Some(sample()));

        let secret_ttl = repo.store().ttl(&secret_key("s3cret")).await.unwrap().unwrap();
        let session_ttl = repo.store().ttl(&session_key("sess")).await.unwrap().unwrap();
        assert!(secret_ttl > 12 * 60 * 60 - 10 && secret_ttl <= 12 * 60 * 60);
        assert!(session_ttl > 24 * 60 * 60 - 10 && session_ttl <= 24 * 60 * 60);
    }

    #[tokio::test]
    async fn test_write_state_overwrites_without_refreshing_ttl() {
        let repo = repo();
        repo.create("s3cret", "sess", &sample()).await.unwrap();
        repo.store().expire(&session_key("sess"), 100).await.unwrap();

        let paused = PlaybackState {
            playing: false,
            ..sample()
        };
        repo.write_state("sess", &paused).await.unwrap();

        assert_eq!(repo.load_state("sess").await.unwrap(), Some(paused));
        let ttl = repo.store().ttl(&session_key("sess")).await.unwrap().unwrap();
        assert!(ttl <= 100);
    }

    #[tokio::test]
    async fn test_touch_refreshes_session_ttl() {
        let repo = repo();
        repo.create("s3cret", "sess", &sample()).await.unwrap();
        repo.store().expire(&session_key("sess"), 100).await.unwrap();

        assert!(repo.touch("sess").await.unwrap());
        let ttl = repo.store().ttl(&session_key("sess")).await.unwrap().unwrap();
        assert!(ttl > 100);

        assert!(!repo.touch("missing").await.unwrap());
    }

    #[tokio::test]
    async fn test_load_missing_session() {
        assert_eq!(repo().load_state("nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_load_corrupt_record() {
        let repo = repo();
        repo.store()
            .hset_multiple(&session_key("bad"), &[(FIELD_PLAYING, "1".to_string())])
            .await
            .unwrap();

        let err = repo.load_state("bad").await.unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }

    #[test]
    fn test_encoding_round_trips_fractional_values() {
        let state = sample();
        let fields: HashMap<String, String> = encode_state(&state)
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        assert_eq!(fields[FIELD_PLAYING], "1");
        assert_eq!(decode_state("k", &fields).unwrap(), state);
    }
}
