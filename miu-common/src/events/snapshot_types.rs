//! Snapshot view types
//!
//! The shapes observers receive: a full picture of the engine at one instant.
//! Field names serialize in camelCase so existing web and desktop clients can
//! consume them directly (`currentTrack`, `youtubeId`, `isAutoplay`, ...).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::queue_types::AutoplaySource;

/// Engine playback status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackStatus {
    #[default]
    Idle,
    Playing,
    Paused,
}

impl std::fmt::Display for PlaybackStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackStatus::Idle => write!(f, "idle"),
            PlaybackStatus::Playing => write!(f, "playing"),
            PlaybackStatus::Paused => write!(f, "paused"),
        }
    }
}

/// Who asked for a queue item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequesterView {
    pub id: String,
    pub username: String,
}

/// Display snapshot of one scheduled or playing track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackView {
    #[serde(rename = "youtubeId")]
    pub track_id: String,
    pub title: String,
    pub duration: f64,
    #[serde(default)]
    pub thumbnail: Option<String>,
    /// `None` for system (autoplay) items
    #[serde(default)]
    pub requested_by: Option<RequesterView>,
    pub requested_at: DateTime<Utc>,
    pub is_autoplay: bool,
    #[serde(default)]
    pub autoplay_source: Option<AutoplaySource>,
}

/// Result of an accepted play request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedTrackView {
    /// 0-based position in the combined queue at acceptance time
    pub position: usize,
    /// True when the request started playing immediately
    pub playing_now: bool,
    pub track: TrackView,
}

/// Full engine state published to observers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineSnapshot {
    pub status: PlaybackStatus,
    pub current_track: Option<TrackView>,
    /// Combined queue: user requests first, then autoplay
    pub queue: Vec<TrackView>,
    /// Position within the current track in seconds
    pub position: f64,
    pub volume: f32,
    pub autoplay: bool,
}

impl EngineSnapshot {
    /// Track id currently playing, if any
    pub fn current_track_id(&self) -> Option<&str> {
        self.current_track.as_ref().map(|t| t.track_id.as_str())
    }

    /// Ordered ids of the combined queue
    pub fn queue_ids(&self) -> Vec<&str> {
        self.queue.iter().map(|t| t.track_id.as_str()).collect()
    }
}
