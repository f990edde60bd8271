//! Event types for the MIU event system
//!
//! Provides the shared event definitions and the `EventBus` used to fan
//! engine events out to observers (web push, desktop clients, loggers).

mod queue_types;
mod snapshot_types;

pub use queue_types::{AutoplaySource, QueueChangeTrigger, QueueOrigin};
pub use snapshot_types::{
    EngineSnapshot, PlaybackStatus, QueuedTrackView, RequesterView, TrackView,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// MIU engine events
///
/// Events are broadcast via `EventBus` and serialize with a `type` tag so a
/// push transport can forward them verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EngineEvent {
    /// Debounced full-state snapshot
    ///
    /// Emitted only by the state publisher, never directly by the controller.
    StateSnapshot {
        snapshot: EngineSnapshot,
        timestamp: DateTime<Utc>,
    },

    /// Playback status changed (Idle / Playing / Paused)
    PlaybackStateChanged {
        old_state: PlaybackStatus,
        new_state: PlaybackStatus,
        timestamp: DateTime<Utc>,
    },

    /// A track started playing on the voice transport
    TrackStarted {
        track_id: String,
        origin: QueueOrigin,
        timestamp: DateTime<Utc>,
    },

    /// A track finished or was skipped
    TrackFinished {
        track_id: String,
        /// Seconds actually heard by listeners
        listened_secs: f64,
        /// False when the track played to completion
        skipped: bool,
        timestamp: DateTime<Utc>,
    },

    /// Queue contents changed
    QueueChanged {
        /// Combined queue track ids (user queue first)
        queue: Vec<String>,
        trigger: QueueChangeTrigger,
        timestamp: DateTime<Utc>,
    },

    /// Autoplay could not find a candidate and is waiting before retrying
    AutoplayBackoff {
        retry_in_ms: u64,
        timestamp: DateTime<Utc>,
    },
}

impl EngineEvent {
    /// Event name for push transports (`event:` line in SSE)
    pub fn event_type(&self) -> &'static str {
        match self {
            EngineEvent::StateSnapshot { .. } => "state",
            EngineEvent::PlaybackStateChanged { .. } => "playback_state",
            EngineEvent::TrackStarted { .. } => "track_started",
            EngineEvent::TrackFinished { .. } => "track_finished",
            EngineEvent::QueueChanged { .. } => "queue_changed",
            EngineEvent::AutoplayBackoff { .. } => "autoplay_backoff",
        }
    }
}

/// Central event distribution bus
///
/// The EventBus uses tokio::broadcast internally, providing:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Automatic cleanup when subscribers drop
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use miu_common::events::{EventBus, EngineEvent, PlaybackStatus};
///
/// let bus = EventBus::new(100);
/// let mut rx = bus.subscribe();
///
/// bus.emit_lossy(EngineEvent::PlaybackStateChanged {
///     old_state: PlaybackStatus::Idle,
///     new_state: PlaybackStatus::Playing,
///     timestamp: chrono::Utc::now(),
/// });
///
/// assert!(rx.try_recv().is_ok());
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EngineEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with the given channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: EngineEvent,
    ) -> Result<usize, broadcast::error::SendError<EngineEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: EngineEvent) {
        let _ = self.tx.send(event);
    }

    /// Current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
