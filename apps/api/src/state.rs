//! Shared application state handed to every route

use crate::config::Config;
use crate::repositories::SessionRepository;
use crate::services::{IdIssuer, SessionService};
use crate::store::{SessionPubSub, SessionStore};
use crate::sync::{DiffClassifier, FeedOpener, UpdateIngest};

/// Handles to the session store and the services built on it
///
/// Everything is cheap to clone; clones share the same backends.
#[derive(Clone)]
pub struct AppState {
    pub store: SessionStore,
    pub pubsub: SessionPubSub,
    pub sessions: SessionService,
    pub ingest: UpdateIngest,
    pub feeds: FeedOpener,
}

impl AppState {
    /// Wire services onto the given backends
    pub fn new(store: SessionStore, pubsub: SessionPubSub, config: &Config) -> Self {
        let repo = SessionRepository::new(store.clone(), config.session_ttl());
        let classifier = DiffClassifier::with_seek_tolerance(config.seek_tolerance_secs);

        Self {
            sessions: SessionService::new(repo.clone(), IdIssuer::new(config.token_max_attempts)),
            ingest: UpdateIngest::new(repo.clone(), pubsub.clone()),
            feeds: FeedOpener::new(repo, pubsub.clone(), classifier),
            store,
            pubsub,
        }
    }

    /// State backed by in-memory store and pub/sub (single instance mode)
    pub fn in_memory(config: &Config) -> Self {
        Self::new(
            SessionStore::new_in_memory(),
            SessionPubSub::new_in_memory(),
            config,
        )
    }
}
