//! Playback controller state
//!
//! Pure state for the Idle / Playing / Paused machine. The engine actor
//! drives it and performs the side effects (transport calls, persistence,
//! events); this type only decides what the state is.
//!
//! ```text
//!  Idle ──begin──▶ Playing ──pause──▶ Paused
//!   ▲                │  ▲               │
//!   │                │  └────resume─────┘
//!   └──finish/abort──┴───────────────────┘
//! ```

use crate::collaborators::PlaybackId;
use crate::model::QueueItem;
use miu_common::events::PlaybackStatus;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::Instant;

/// Who paused playback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseReason {
    /// Explicit pause command
    User,
    /// No listeners left in the channel
    Presence,
}

/// What to do after a transport error on the current item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorDisposition {
    /// Re-queue the item and try again (1-based attempt number)
    Retry { attempt: u32 },
    /// Retry budget exhausted; treat the item as finished
    GiveUp,
}

/// The item on the transport
#[derive(Debug, Clone)]
pub struct NowPlaying {
    pub item: QueueItem,
    pub playback_id: PlaybackId,
    pub path: PathBuf,
    started_at: Instant,
    paused_at: Option<Instant>,
    paused_total: Duration,
}

impl NowPlaying {
    /// Elapsed play time, excluding pauses, capped at the track duration
    pub fn position(&self) -> Duration {
        let until = self.paused_at.unwrap_or_else(Instant::now);
        let elapsed = until
            .saturating_duration_since(self.started_at)
            .saturating_sub(self.paused_total);
        let secs = self.item.duration_secs;
        if secs.is_finite() && secs > 0.0 {
            elapsed.min(Duration::from_secs_f64(secs))
        } else {
            elapsed
        }
    }

    pub fn position_secs(&self) -> f64 {
        self.position().as_secs_f64()
    }
}

#[derive(Debug)]
pub struct PlaybackController {
    status: PlaybackStatus,
    now_playing: Option<NowPlaying>,
    pause_reason: Option<PauseReason>,
    error_retries: u32,
    max_error_retries: u32,
    next_playback_id: PlaybackId,
}

impl PlaybackController {
    pub fn new(max_error_retries: u32) -> Self {
        Self {
            status: PlaybackStatus::Idle,
            now_playing: None,
            pause_reason: None,
            error_retries: 0,
            max_error_retries,
            next_playback_id: 1,
        }
    }

    pub fn status(&self) -> PlaybackStatus {
        self.status
    }

    pub fn now_playing(&self) -> Option<&NowPlaying> {
        self.now_playing.as_ref()
    }

    pub fn pause_reason(&self) -> Option<PauseReason> {
        self.pause_reason
    }

    pub fn is_idle(&self) -> bool {
        self.status == PlaybackStatus::Idle
    }

    /// True when `playback_id` belongs to the item on the transport
    pub fn is_current(&self, playback_id: PlaybackId) -> bool {
        self.now_playing
            .as_ref()
            .map(|np| np.playback_id == playback_id)
            .unwrap_or(false)
    }

    /// Enter Playing with a fresh playback id
    pub fn begin(&mut self, item: QueueItem, path: PathBuf) -> PlaybackId {
        let playback_id = self.next_playback_id;
        self.next_playback_id += 1;
        self.now_playing = Some(NowPlaying {
            item,
            playback_id,
            path,
            started_at: Instant::now(),
            paused_at: None,
            paused_total: Duration::ZERO,
        });
        self.status = PlaybackStatus::Playing;
        self.pause_reason = None;
        playback_id
    }

    /// Leave Playing/Paused for Idle, returning what was playing
    pub fn finish(&mut self) -> Option<NowPlaying> {
        self.status = PlaybackStatus::Idle;
        self.pause_reason = None;
        self.now_playing.take()
    }

    /// Playing -> Paused; false if not playing
    ///
    /// Pausing an already presence-paused track with `User` takes ownership
    /// of the pause so listeners returning will not resume it.
    pub fn pause(&mut self, reason: PauseReason) -> bool {
        match self.status {
            PlaybackStatus::Playing => {
                if let Some(np) = self.now_playing.as_mut() {
                    np.paused_at = Some(Instant::now());
                }
                self.status = PlaybackStatus::Paused;
                self.pause_reason = Some(reason);
                true
            }
            PlaybackStatus::Paused => {
                if reason == PauseReason::User {
                    self.pause_reason = Some(PauseReason::User);
                }
                false
            }
            PlaybackStatus::Idle => false,
        }
    }

    /// Paused -> Playing; false if not paused
    pub fn resume(&mut self) -> bool {
        if self.status != PlaybackStatus::Paused {
            return false;
        }
        if let Some(np) = self.now_playing.as_mut() {
            if let Some(paused_at) = np.paused_at.take() {
                np.paused_total += paused_at.elapsed();
            }
        }
        self.status = PlaybackStatus::Playing;
        self.pause_reason = None;
        true
    }

    /// Count a transport error against the retry budget
    ///
    /// The error that brings the counter to the limit gives up, so a limit
    /// of 3 allows three attempts in total.
    pub fn record_error(&mut self) -> ErrorDisposition {
        self.error_retries += 1;
        if self.error_retries >= self.max_error_retries {
            self.error_retries = 0;
            ErrorDisposition::GiveUp
        } else {
            ErrorDisposition::Retry {
                attempt: self.error_retries,
            }
        }
    }

    pub fn reset_errors(&mut self) {
        self.error_retries = 0;
    }
}
