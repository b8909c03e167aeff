//! Host update ingestion
//!
//! A report is applied completely or not at all: the secret must resolve to
//! a live session and the body must have exactly the expected shape before
//! anything is written or published.

use serde::Deserialize;

use crate::error::{ApiError, ApiResult};
use crate::repositories::SessionRepository;
use crate::services::id_issuer::TOKEN_LEN;
use crate::store::SessionPubSub;

use super::state::{unix_now, PlaybackState};

/// Length of a media identifier, in characters
pub const MEDIA_ID_LEN: usize = 11;

/// Why a report was rejected
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("malformed secret")]
    MalformedSecret,

    #[error("malformed report: {0}")]
    Body(String),

    #[error("wrong media id length: {0}")]
    MediaIdLength(usize),

    #[error("progress must be a non-negative number, got {0}")]
    Progress(f64),
}

/// Playback report as sent by the host
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UpdateReport {
    pub playing: bool,
    #[serde(rename = "id")]
    pub media_id: String,
    pub progress: f64,
}

impl UpdateReport {
    /// Parse and validate a raw request body
    pub fn parse(body: &[u8]) -> Result<Self, ValidationError> {
        let value: serde_json::Value =
            serde_json::from_slice(body).map_err(|e| ValidationError::Body(e.to_string()))?;
        if !value.is_object() {
            return Err(ValidationError::Body("report must be a JSON object".to_string()));
        }
        let report: Self =
            serde_json::from_value(value).map_err(|e| ValidationError::Body(e.to_string()))?;
        report.validate()?;
        Ok(report)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let media_id_len = self.media_id.chars().count();
        if media_id_len != MEDIA_ID_LEN {
            return Err(ValidationError::MediaIdLength(media_id_len));
        }
        if !self.progress.is_finite() || self.progress < 0.0 {
            return Err(ValidationError::Progress(self.progress));
        }
        Ok(())
    }

    /// Snapshot of this report as observed at `observed_at`
    pub fn stamp(self, observed_at: f64) -> PlaybackState {
        PlaybackState {
            media_id: self.media_id,
            playing: self.playing,
            progress: self.progress,
            observed_at,
        }
    }
}

/// Applies host reports to the session store and fans them out
#[derive(Clone)]
pub struct UpdateIngest {
    repo: SessionRepository,
    pubsub: SessionPubSub,
}

impl UpdateIngest {
    pub fn new(repo: SessionRepository, pubsub: SessionPubSub) -> Self {
        Self { repo, pubsub }
    }

    /// Validate, stamp, store and publish one report
    ///
    /// The snapshot is written before it is published. A publish that fails
    /// is logged, not retried: viewers catch up on the next update.
    pub async fn apply(&self, secret: &str, body: &[u8]) -> ApiResult<PlaybackState> {
        if secret.len() != TOKEN_LEN {
            return Err(ValidationError::MalformedSecret.into());
        }
        let report = UpdateReport::parse(body)?;

        let session_id = self
            .repo
            .resolve_secret(secret)
            .await?
            .ok_or(ApiError::UnknownSecret)?;

        let state = report.stamp(unix_now());
        self.repo.write_state(&session_id, &state).await?;
        self.pubsub.publish(&session_id, state.clone()).await;

        tracing::debug!(
            session_id = %session_id,
            media_id = %state.media_id,
            playing = state.playing,
            progress = state.progress,
            "Playback update applied"
        );

        Ok(state)
    }
}
