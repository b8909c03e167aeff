//! Classifying a published update into the single event a viewer needs
//!
//! The decision list is ordered and the first match wins:
//!
//! 1. media changed -> [`DiffKind::Full`]
//! 2. play/pause changed -> [`DiffKind::PlayStateChanged`]
//! 3. raw reported progress changed -> [`DiffKind::Seek`]
//! 4. otherwise nothing
//!
//! A media change therefore hides simultaneous play or seek changes; the
//! viewer picks those up from the full payload.

use serde::ser::{Serialize, SerializeStruct, Serializer};

use super::state::PlaybackState;

/// Which event an update produces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffKind {
    Full,
    PlayStateChanged,
    Seek,
}

impl DiffKind {
    /// Numeric `type` tag used on the wire
    pub fn wire_tag(self) -> u8 {
        match self {
            Self::Full => 0,
            Self::PlayStateChanged => 1,
            Self::Seek => 2,
        }
    }
}

/// Compares consecutive snapshots for one viewer
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DiffClassifier {
    /// Progress deltas at or below this many seconds are not treated as a seek.
    /// Zero means exact comparison.
    seek_tolerance: f64,
}

impl DiffClassifier {
    /// Classifier comparing progress with exact equality
    pub fn exact() -> Self {
        Self::default()
    }

    pub fn with_seek_tolerance(seek_tolerance: f64) -> Self {
        Self {
            seek_tolerance: seek_tolerance.max(0.0),
        }
    }

    pub fn seek_tolerance(&self) -> f64 {
        self.seek_tolerance
    }

    /// Decide what `incoming` means to a viewer that last saw `previous`
    pub fn classify(&self, previous: &PlaybackState, incoming: &PlaybackState) -> Option<DiffKind> {
        if incoming.media_id != previous.media_id {
            Some(DiffKind::Full)
        } else if incoming.playing != previous.playing {
            Some(DiffKind::PlayStateChanged)
        } else if self.progress_moved(previous.progress, incoming.progress) {
            Some(DiffKind::Seek)
        } else {
            None
        }
    }

    fn progress_moved(&self, previous: f64, incoming: f64) -> bool {
        if self.seek_tolerance == 0.0 {
            previous != incoming
        } else {
            (incoming - previous).abs() > self.seek_tolerance
        }
    }
}

/// Event delivered to a viewer
#[derive(Debug, Clone, PartialEq)]
pub enum ViewerEvent {
    /// Complete state; sent on connect and whenever the media changes
    Full {
        playing: bool,
        media_id: String,
        progress: f64,
    },
    PlayStateChanged {
        playing: bool,
    },
    Seek {
        seek: f64,
    },
}

impl ViewerEvent {
    /// Full event for `state` as seen at `now`
    pub fn full(state: &PlaybackState, now: f64) -> Self {
        Self::Full {
            playing: state.playing,
            media_id: state.media_id.clone(),
            progress: state.progress_at(now),
        }
    }

    /// Render the event of `kind` for `incoming`, extrapolating progress to
    /// the viewer's `now`
    pub fn render(kind: DiffKind, incoming: &PlaybackState, now: f64) -> Self {
        match kind {
            DiffKind::Full => Self::full(incoming, now),
            DiffKind::PlayStateChanged => Self::PlayStateChanged {
                playing: incoming.playing,
            },
            DiffKind::Seek => Self::Seek {
                seek: incoming.progress_at(now),
            },
        }
    }

    pub fn kind(&self) -> DiffKind {
        match self {
            Self::Full { .. } => DiffKind::Full,
            Self::PlayStateChanged { .. } => DiffKind::PlayStateChanged,
            Self::Seek { .. } => DiffKind::Seek,
        }
    }
}

impl Serialize for ViewerEvent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let tag = self.kind().wire_tag();
        match self {
            Self::Full {
                playing,
                media_id,
                progress,
            } => {
                let mut s = serializer.serialize_struct("ViewerEvent", 4)?;
                s.serialize_field("type", &tag)?;
                s.serialize_field("playing", playing)?;
                s.serialize_field("id", media_id)?;
                s.serialize_field("progress", progress)?;
                s.end()
            }
            Self::PlayStateChanged { playing } => {
                let mut s = serializer.serialize_struct("ViewerEvent", 2)?;
                s.serialize_field("type", &tag)?;
                s.serialize_field("playing", playing)?;
                s.end()
            }
            Self::Seek { seek } => {
                let mut s = serializer.serialize_struct("ViewerEvent", 2)?;
                s.serialize_field("type", &tag)?;
                s.serialize_field("seek", seek)?;
                s.end()
            }
        }
    }
}
