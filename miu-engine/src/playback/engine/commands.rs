//! Engine command messages
//!
//! Every mutation of engine state arrives here as a message. Requests that
//! expect an answer carry a oneshot reply sender.

use crate::model::{QueueItem, TrackId};
use crate::refill::{RefillTarget, SelectionContext};
use crate::Result;
use async_trait::async_trait;
use miu_common::events::{EngineSnapshot, QueuedTrackView};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

pub type Reply<T> = oneshot::Sender<T>;

#[derive(Debug)]
pub enum EngineCommand {
    // Public operations
    Enqueue {
        item: QueueItem,
        reply: Reply<Result<QueuedTrackView>>,
    },
    Skip(Reply<Result<()>>),
    Pause(Reply<Result<()>>),
    Resume(Reply<Result<()>>),
    SetAutoplay {
        enabled: bool,
        reply: Reply<()>,
    },
    SetVolume {
        volume: f32,
        reply: Reply<Result<()>>,
    },
    SetLinearMode {
        enabled: bool,
        reply: Reply<()>,
    },
    GetState(Reply<EngineSnapshot>),
    RemoveFromQueue {
        position: usize,
        reply: Reply<bool>,
    },
    /// Current listener ids in the voice channel
    ListenersChanged(Vec<String>),
    /// Resolves once every write queued so far has reached the store
    Flush(Reply<()>),
    Shutdown(Reply<()>),

    // Refill worker
    SelectionContext(Reply<SelectionContext>),
    OfferAutoplay {
        item: QueueItem,
        reply: Reply<bool>,
    },

    // Internal
    PlayNext,
    /// Delayed retry after a connect or transport failure
    RetryPlayNext,
    /// Background acquisition of the dequeued item finished
    MediaReady {
        request_id: Uuid,
        result: Result<Option<PathBuf>>,
    },
    PresenceGraceExpired,
    ProgressTick,
    RefreshTiers,
    TiersLoaded(HashMap<TrackId, Duration>),
    ValidateCache,
}

impl EngineCommand {
    /// Short name for logging
    pub fn name(&self) -> &'static str {
        match self {
            EngineCommand::Enqueue { .. } => "enqueue",
            EngineCommand::Skip(_) => "skip",
            EngineCommand::Pause(_) => "pause",
            EngineCommand::Resume(_) => "resume",
            EngineCommand::SetAutoplay { .. } => "set_autoplay",
            EngineCommand::SetVolume { .. } => "set_volume",
            EngineCommand::SetLinearMode { .. } => "set_linear_mode",
            EngineCommand::GetState(_) => "get_state",
            EngineCommand::RemoveFromQueue { .. } => "remove_from_queue",
            EngineCommand::ListenersChanged(_) => "listeners_changed",
            EngineCommand::Flush(_) => "flush",
            EngineCommand::Shutdown(_) => "shutdown",
            EngineCommand::SelectionContext(_) => "selection_context",
            EngineCommand::OfferAutoplay { .. } => "offer_autoplay",
            EngineCommand::PlayNext => "play_next",
            EngineCommand::RetryPlayNext => "retry_play_next",
            EngineCommand::MediaReady { .. } => "media_ready",
            EngineCommand::PresenceGraceExpired => "presence_grace_expired",
            EngineCommand::ProgressTick => "progress_tick",
            EngineCommand::RefreshTiers => "refresh_tiers",
            EngineCommand::TiersLoaded(_) => "tiers_loaded",
            EngineCommand::ValidateCache => "validate_cache",
        }
    }
}

/// The refill worker's route back into the engine
#[derive(Clone)]
pub struct EngineLink {
    tx: mpsc::UnboundedSender<EngineCommand>,
}

impl EngineLink {
    pub fn new(tx: mpsc::UnboundedSender<EngineCommand>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl RefillTarget for EngineLink {
    async fn selection_context(&self) -> Option<SelectionContext> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(EngineCommand::SelectionContext(reply)).ok()?;
        rx.await.ok()
    }

    async fn offer(&self, item: QueueItem) -> bool {
        let (reply, rx) = oneshot::channel();
        if self
            .tx
            .send(EngineCommand::OfferAutoplay { item, reply })
            .is_err()
        {
            return false;
        }
        rx.await.unwrap_or(false)
    }
}
