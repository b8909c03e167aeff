//! Session creation

use serde::Serialize;

use crate::error::ApiResult;
use crate::repositories::SessionRepository;
use crate::sync::{unix_now, PlaybackState};

use super::id_issuer::IdIssuer;

/// Credentials handed to the host when a session starts
///
/// `secret` authorizes updates and must stay with the host; `id` is what
/// viewers use to follow along.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionCredentials {
    pub secret: String,
    pub id: String,
}

/// Creates sessions with unique secrets and ids
#[derive(Clone)]
pub struct SessionService {
    repo: SessionRepository,
    issuer: IdIssuer,
}

impl SessionService {
    pub fn new(repo: SessionRepository, issuer: IdIssuer) -> Self {
        Self { repo, issuer }
    }

    pub fn repository(&self) -> &SessionRepository {
        &self.repo
    }

    /// Start a session, seeded with a paused, empty playback state
    pub async fn start(&self) -> ApiResult<SessionCredentials> {
        let repo = &self.repo;

        let secret = self
            .issuer
            .issue_unique(|candidate| async move { repo.secret_exists(&candidate).await })
            .await?;
        let id = self
            .issuer
            .issue_unique(|candidate| async move { repo.session_exists(&candidate).await })
            .await?;

        repo.create(&secret, &id, &PlaybackState::initial(unix_now()))
            .await?;

        tracing::info!(session_id = %id, "Session started");

        Ok(SessionCredentials { secret, id })
    }
}
