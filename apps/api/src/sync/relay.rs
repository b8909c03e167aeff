//! Per-viewer subscription relay
//!
//! A relay starts by bootstrapping: it reads the session's snapshot, sends a
//! full event extrapolated to the viewer's clock and keeps that snapshot as
//! its baseline. From then on it streams, classifying every published update
//! against its own baseline. Each viewer owns an independent baseline, so two
//! viewers may see different event sequences for the same updates.
//!
//! Events go to the viewer through a bounded queue. When a slow viewer lets
//! it fill up, the event is dropped and the next one is sent as a full event
//! so the viewer catches up.

use tokio::sync::{broadcast, mpsc};

use crate::error::{ApiError, ApiResult};
use crate::repositories::SessionRepository;
use crate::services::id_issuer::IdIssuer;
use crate::store::{SessionPubSub, Subscription};

use super::diff::{DiffClassifier, DiffKind, ViewerEvent};
use super::state::{unix_now, PlaybackState};

/// Events a viewer may have queued before new ones are dropped
pub const VIEWER_QUEUE_CAPACITY: usize = 32;

/// Why a relay stopped streaming
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayExit {
    /// The viewer side dropped its event receiver
    ViewerGone,
    /// The session channel closed
    ChannelClosed,
}

/// Relay in the streaming state
#[derive(Debug, Clone)]
pub struct SubscriptionRelay {
    session_id: String,
    previous: PlaybackState,
    classifier: DiffClassifier,
    /// An event was dropped; the next update goes out as a full event
    resync: bool,
}

impl SubscriptionRelay {
    /// Enter streaming from `snapshot`: returns the relay and the full event to send first
    pub fn bootstrap(
        session_id: impl Into<String>,
        snapshot: &PlaybackState,
        classifier: DiffClassifier,
        now: f64,
    ) -> (Self, ViewerEvent) {
        let baseline = snapshot.extrapolated(now);
        let greeting = ViewerEvent::full(&baseline, now);

        let relay = Self {
            session_id: session_id.into(),
            previous: baseline,
            classifier,
            resync: false,
        };
        (relay, greeting)
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Last state this relay compared against
    pub fn previous(&self) -> &PlaybackState {
        &self.previous
    }

    /// Fold one published update into the baseline, returning the event to send, if any
    pub fn observe(&mut self, incoming: PlaybackState, now: f64) -> Option<ViewerEvent> {
        let kind = if self.resync {
            Some(DiffKind::Full)
        } else {
            self.classifier.classify(&self.previous, &incoming)
        };
        let event = kind.map(|kind| ViewerEvent::render(kind, &incoming, now));
        self.resync = false;
        self.previous = incoming;
        event
    }

    /// Record that the last event never reached the viewer
    pub fn mark_dropped(&mut self) {
        self.resync = true;
    }

    /// Stream updates to `events` until the viewer or the channel goes away
    ///
    /// Waiting for the next update has no timeout; a closed `events` receiver
    /// ends the wait. Dropping this future also releases the subscription.
    pub async fn forward(
        mut self,
        mut updates: Subscription,
        events: mpsc::Sender<ViewerEvent>,
    ) -> RelayExit {
        loop {
            let received = tokio::select! {
                _ = events.closed() => return RelayExit::ViewerGone,
                received = updates.recv() => received,
            };

            match received {
                Ok(incoming) => {
                    let Some(event) = self.observe(incoming, unix_now()) else {
                        continue;
                    };
                    match events.try_send(event) {
                        Ok(()) => {}
                        Err(mpsc::error::TrySendError::Full(_)) => {
                            tracing::warn!(session_id = %self.session_id, "Viewer queue full, event dropped");
                            self.mark_dropped();
                        }
                        Err(mpsc::error::TrySendError::Closed(_)) => return RelayExit::ViewerGone,
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(session_id = %self.session_id, lagged = n, "Viewer relay lagged, updates dropped");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::debug!(session_id = %self.session_id, "Session channel closed");
                    return RelayExit::ChannelClosed;
                }
            }
        }
    }
}

/// A bootstrapped viewer feed, ready to stream
pub struct ViewerFeed {
    pub relay: SubscriptionRelay,
    /// Full event to send before anything else
    pub greeting: ViewerEvent,
    pub updates: Subscription,
}

/// Opens viewer feeds against the session store
#[derive(Clone)]
pub struct FeedOpener {
    repo: SessionRepository,
    pubsub: SessionPubSub,
    classifier: DiffClassifier,
}

impl FeedOpener {
    pub fn new(repo: SessionRepository, pubsub: SessionPubSub, classifier: DiffClassifier) -> Self {
        Self {
            repo,
            pubsub,
            classifier,
        }
    }

    /// Bootstrap a viewer of `session_id`
    ///
    /// Only a live session gets a subscription. The subscription is taken
    /// before reading the snapshot so no update published in between is
    /// lost. Refreshes the session TTL.
    pub async fn open(&self, session_id: &str) -> ApiResult<ViewerFeed> {
        if !IdIssuer::is_well_formed(session_id) {
            return Err(ApiError::InvalidSessionId);
        }
        if !self.repo.session_exists(session_id).await? {
            return Err(ApiError::SessionNotFound(session_id.to_string()));
        }

        // Dropped on any failure below, which releases the channel
        let updates = self.pubsub.subscribe(session_id);

        let snapshot = self
            .repo
            .load_state(session_id)
            .await?
            .ok_or_else(|| ApiError::SessionNotFound(session_id.to_string()))?;
        self.repo.touch(session_id).await?;

        let (relay, greeting) =
            SubscriptionRelay::bootstrap(session_id, &snapshot, self.classifier, unix_now());

        Ok(ViewerFeed {
            relay,
            greeting,
            updates,
        })
    }
}
