//! Outfit events and broadcasting.
//!
//! The composer announces every observable change on a broadcast channel so
//! a UI can drive loading indicators, error banners, and redraws without
//! polling.
//!
//! # Event Types
//!
//! - `base_image_set` - A new photo started a fresh session
//! - `selection_changed` - The pending catalog selection changed
//! - `composition_started` - A composition call was issued
//! - `composed` - A composition was committed
//! - `composition_failed` - A composition failed; the outfit is unchanged
//! - `recommendations_updated` - Fresh recommendations were stored
//! - `recommendations_discarded` - A stale recommendation response was dropped
//! - `recommendations_failed` - A recommendation call failed
//! - `reset` - The outfit was cleared
//!
//! # Example
//!
//! ```
//! use tryon_core::events::{EventBroadcaster, OutfitEvent};
//!
//! # async fn example() {
//! let broadcaster = EventBroadcaster::new(16);
//! let mut receiver = broadcaster.subscribe();
//!
//! broadcaster.send(OutfitEvent::reset(4));
//!
//! if let Ok(event) = receiver.recv().await {
//!     assert_eq!(event.event_name(), "reset");
//! }
//! # }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::session::{CompositionKind, OutfitStatus, WornItem};

// ============================================================================
// Event Payloads
// ============================================================================

/// Payload for the `base_image_set` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseImageSetPayload {
    /// Generation of the fresh session.
    pub generation: u64,
    /// Size of the photo in bytes.
    pub bytes: usize,
}

/// Payload for the `selection_changed` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionChangedPayload {
    /// Catalog id of the selected item, `None` when cleared.
    pub item_id: Option<String>,
}

/// Payload for the `composition_started` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositionStartedPayload {
    /// Endpoint being called.
    pub kind: CompositionKind,
    /// Category of the garment being applied.
    pub category: String,
    /// Generation the composition was planned against.
    pub generation: u64,
}

/// Payload for the `composed` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComposedPayload {
    /// Status after the commit.
    pub status: OutfitStatus,
    /// Everything worn, in order.
    pub worn_items: Vec<WornItem>,
    /// Generation after the commit.
    pub generation: u64,
}

/// Payload for the `composition_failed` and `recommendations_failed` events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailurePayload {
    /// Human-readable failure description.
    pub message: String,
}

/// Payload for the `recommendations_updated` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecommendationsUpdatedPayload {
    /// Number of stored recommendations.
    pub count: usize,
    /// Generation the recommendations belong to.
    pub generation: u64,
}

/// Payload for the `recommendations_discarded` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecommendationsDiscardedPayload {
    /// Generation the request was issued at.
    pub requested_at: u64,
    /// Generation when the response arrived.
    pub current: u64,
}

/// Payload for the `reset` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetPayload {
    /// Generation after the reset.
    pub generation: u64,
    /// When the reset happened.
    pub timestamp: DateTime<Utc>,
}

// ============================================================================
// Event Enum
// ============================================================================

/// Outfit event types.
///
/// All events are serialized as JSON objects with "event" and "payload" fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum OutfitEvent {
    /// A new photo started a fresh session.
    BaseImageSet(BaseImageSetPayload),
    /// The pending selection changed.
    SelectionChanged(SelectionChangedPayload),
    /// A composition call was issued.
    CompositionStarted(CompositionStartedPayload),
    /// A composition was committed.
    Composed(ComposedPayload),
    /// A composition failed.
    CompositionFailed(FailurePayload),
    /// Fresh recommendations were stored.
    RecommendationsUpdated(RecommendationsUpdatedPayload),
    /// A stale recommendation response was dropped.
    RecommendationsDiscarded(RecommendationsDiscardedPayload),
    /// A recommendation call failed.
    RecommendationsFailed(FailurePayload),
    /// The outfit was cleared.
    Reset(ResetPayload),
}

impl OutfitEvent {
    /// Creates a `BaseImageSet` event.
    #[must_use]
    pub const fn base_image_set(generation: u64, bytes: usize) -> Self {
        Self::BaseImageSet(BaseImageSetPayload { generation, bytes })
    }

    /// Creates a `SelectionChanged` event.
    #[must_use]
    pub const fn selection_changed(item_id: Option<String>) -> Self {
        Self::SelectionChanged(SelectionChangedPayload { item_id })
    }

    /// Creates a `CompositionStarted` event.
    #[must_use]
    pub fn composition_started(
        kind: CompositionKind,
        category: impl Into<String>,
        generation: u64,
    ) -> Self {
        Self::CompositionStarted(CompositionStartedPayload {
            kind,
            category: category.into(),
            generation,
        })
    }

    /// Creates a `Composed` event.
    #[must_use]
    pub const fn composed(status: OutfitStatus, worn_items: Vec<WornItem>, generation: u64) -> Self {
        Self::Composed(ComposedPayload {
            status,
            worn_items,
            generation,
        })
    }

    /// Creates a `CompositionFailed` event.
    #[must_use]
    pub fn composition_failed(message: impl Into<String>) -> Self {
        Self::CompositionFailed(FailurePayload {
            message: message.into(),
        })
    }

    /// Creates a `RecommendationsUpdated` event.
    #[must_use]
    pub const fn recommendations_updated(count: usize, generation: u64) -> Self {
        Self::RecommendationsUpdated(RecommendationsUpdatedPayload { count, generation })
    }

    /// Creates a `RecommendationsDiscarded` event.
    #[must_use]
    pub const fn recommendations_discarded(requested_at: u64, current: u64) -> Self {
        Self::RecommendationsDiscarded(RecommendationsDiscardedPayload {
            requested_at,
            current,
        })
    }

    /// Creates a `RecommendationsFailed` event.
    #[must_use]
    pub fn recommendations_failed(message: impl Into<String>) -> Self {
        Self::RecommendationsFailed(FailurePayload {
            message: message.into(),
        })
    }

    /// Creates a `Reset` event.
    #[must_use]
    pub fn reset(generation: u64) -> Self {
        Self::Reset(ResetPayload {
            generation,
            timestamp: Utc::now(),
        })
    }

    /// Returns the event name as a string.
    #[must_use]
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::BaseImageSet(_) => "base_image_set",
            Self::SelectionChanged(_) => "selection_changed",
            Self::CompositionStarted(_) => "composition_started",
            Self::Composed(_) => "composed",
            Self::CompositionFailed(_) => "composition_failed",
            Self::RecommendationsUpdated(_) => "recommendations_updated",
            Self::RecommendationsDiscarded(_) => "recommendations_discarded",
            Self::RecommendationsFailed(_) => "recommendations_failed",
            Self::Reset(_) => "reset",
        }
    }

    /// Returns `true` for events that report a failure.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(
            self,
            Self::CompositionFailed(_) | Self::RecommendationsFailed(_)
        )
    }
}

// ============================================================================
// Event Broadcaster
// ============================================================================

/// Broadcasts outfit events to every subscriber.
///
/// Events are not persisted for late subscribers.
#[derive(Debug, Clone)]
pub struct EventBroadcaster {
    sender: broadcast::Sender<OutfitEvent>,
}

impl EventBroadcaster {
    /// Creates a new `EventBroadcaster` with the specified buffer capacity.
    ///
    /// A subscriber that falls more than `capacity` events behind receives a
    /// `Lagged` error and skips ahead.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Creates a new subscriber for receiving events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<OutfitEvent> {
        self.sender.subscribe()
    }

    /// Broadcasts an event to all subscribers.
    ///
    /// Returns the number of receivers; 0 means nobody is listening.
    pub fn send(&self, event: OutfitEvent) -> usize {
        // send() only fails when there are no receivers
        self.sender.send(event).unwrap_or(0)
    }

    /// Returns the number of active subscribers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new(100)
    }
}

// ============================================================================
// Tests
// ============================================================================
