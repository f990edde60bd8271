//! Voice transport seam

use crate::model::TrackId;
use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;
use tokio::sync::mpsc;

/// Monotonic id the controller assigns to each play call
///
/// Transport events carry it back so stale completions from an earlier
/// resource can be told apart from the current one.
pub type PlaybackId = u64;

/// Local file handed to the transport
#[derive(Debug, Clone, PartialEq)]
pub struct PlayResource {
    pub track_id: TrackId,
    pub path: PathBuf,
    pub duration_secs: f64,
}

/// Asynchronous notifications from an open connection
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Resource played to its end
    Finished { playback_id: PlaybackId },
    /// Resource failed mid-play
    Error {
        playback_id: PlaybackId,
        message: String,
    },
    /// Connection to the voice channel was lost
    Disconnected,
}

#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("failed to connect to voice channel: {0}")]
    Connect(String),

    #[error("playback failed: {0}")]
    Playback(String),

    #[error("voice connection lost")]
    Disconnected,
}

/// Opens voice connections
#[async_trait]
pub trait VoiceTransport: Send + Sync {
    /// Join `channel`; the connection reports through `events`
    async fn connect(
        &self,
        channel: &str,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Box<dyn VoiceConnection>, TransportError>;
}

/// An open voice connection
#[async_trait]
pub trait VoiceConnection: Send + Sync {
    /// Start playing `resource`, replacing anything currently playing
    async fn play(
        &mut self,
        resource: PlayResource,
        playback_id: PlaybackId,
    ) -> Result<(), TransportError>;

    async fn pause(&mut self) -> Result<(), TransportError>;

    async fn unpause(&mut self) -> Result<(), TransportError>;

    /// Stop the current resource without emitting `Finished`
    async fn stop(&mut self) -> Result<(), TransportError>;

    /// Linear volume 0.0 - 1.0
    fn set_volume(&mut self, volume: f32);

    async fn disconnect(&mut self);
}
