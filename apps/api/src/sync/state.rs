//! Playback snapshots and progress extrapolation

use serde::{Deserialize, Serialize};

/// Current wall-clock time as fractional Unix seconds
pub fn unix_now() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// What the host last reported, stamped with server time
///
/// `progress` is only meaningful relative to `observed_at`: while playing,
/// the position keeps advancing at wall-clock speed from that instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackState {
    /// Identifier of the item being played
    #[serde(rename = "id")]
    pub media_id: String,

    pub playing: bool,

    /// Position in seconds as of `observed_at`
    pub progress: f64,

    /// Unix seconds at which the server recorded this snapshot
    #[serde(rename = "time")]
    pub observed_at: f64,
}

impl PlaybackState {
    /// State a freshly created session starts from, before the host reports anything
    pub fn initial(now: f64) -> Self {
        Self {
            media_id: String::new(),
            playing: false,
            progress: 0.0,
            observed_at: now,
        }
    }

    /// Position at `now`, advancing only while playing.
    ///
    /// A `now` earlier than `observed_at` (clock skew between instances) is
    /// treated as no elapsed time.
    pub fn progress_at(&self, now: f64) -> f64 {
        if self.playing {
            self.progress + (now - self.observed_at).max(0.0)
        } else {
            self.progress
        }
    }

    /// Snapshot re-based to `now`
    pub fn extrapolated(&self, now: f64) -> Self {
        Self {
            media_id: self.media_id.clone(),
            playing: self.playing,
            progress: self.progress_at(now),
            observed_at: now,
        }
    }
}
