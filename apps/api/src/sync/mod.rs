//! Playback state synchronization
//!
//! This module holds the core of the service:
//! - Playback snapshots and time-based progress extrapolation
//! - Host update ingestion
//! - Classification of updates into minimal viewer events
//! - Per-viewer relays that bootstrap and then stream those events

pub mod diff;
pub mod ingest;
pub mod relay;
pub mod state;

pub use diff::{DiffClassifier, DiffKind, ViewerEvent};
pub use ingest::{UpdateIngest, UpdateReport, ValidationError, MEDIA_ID_LEN};
pub use relay::{FeedOpener, RelayExit, SubscriptionRelay, ViewerFeed, VIEWER_QUEUE_CAPACITY};
pub use state::{unix_now, PlaybackState};
