//! Public engine handle

use super::commands::EngineCommand;
use crate::collaborators::{MediaResolver, ResolverError};
use crate::db::Store;
use crate::error::{Error, Result};
use crate::model::{QueueItem, Requester, Track, TrackId};
use crate::playback::queue::EnqueueRejection;
use miu_common::events::{EngineEvent, EngineSnapshot, EventBus, QueuedTrackView};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, warn};

/// Cloneable handle to a running engine
///
/// Every call is a message to the engine task; once the engine has shut
/// down they fail with [`Error::EngineStopped`].
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::UnboundedSender<EngineCommand>,
    store: Arc<dyn Store>,
    resolver: Arc<dyn MediaResolver>,
    events: EventBus,
}

impl EngineHandle {
    pub(super) fn new(
        tx: mpsc::UnboundedSender<EngineCommand>,
        store: Arc<dyn Store>,
        resolver: Arc<dyn MediaResolver>,
        events: EventBus,
    ) -> Self {
        Self {
            tx,
            store,
            resolver,
            events,
        }
    }

    /// Request a track for playback
    ///
    /// Metadata is loaded from the store, or resolved and stored on first
    /// sight. Fails with [`Error::Rejected`] when the duplicate guard,
    /// cooldown or track availability refuses the request.
    pub async fn play(&self, id: impl Into<TrackId>, requester: Requester) -> Result<QueuedTrackView> {
        let id = id.into();
        let track = self.resolve_track(&id).await?;
        if !track.is_selectable() {
            return Err(Error::Rejected(EnqueueRejection::Unavailable));
        }
        let item = QueueItem::for_user(&track, requester);
        self.request(|reply| EngineCommand::Enqueue { item, reply })
            .await?
    }

    /// Queue several tracks in order, skipping the ones refused
    pub async fn enqueue_playlist<I>(&self, ids: I, requester: Requester) -> Result<Vec<QueuedTrackView>>
    where
        I: IntoIterator<Item = TrackId>,
    {
        let mut queued = Vec::new();
        for id in ids {
            match self.play(id.clone(), requester.clone()).await {
                Ok(view) => queued.push(view),
                Err(Error::EngineStopped) => return Err(Error::EngineStopped),
                Err(e) => debug!(track_id = %id, error = %e, "Playlist entry skipped"),
            }
        }
        Ok(queued)
    }

    pub async fn skip(&self) -> Result<()> {
        self.request(EngineCommand::Skip).await?
    }

    pub async fn pause(&self) -> Result<()> {
        self.request(EngineCommand::Pause).await?
    }

    pub async fn resume(&self) -> Result<()> {
        self.request(EngineCommand::Resume).await?
    }

    pub async fn set_autoplay(&self, enabled: bool) -> Result<()> {
        self.request(|reply| EngineCommand::SetAutoplay { enabled, reply })
            .await
    }

    /// Linear volume 0.0 - 1.0
    pub async fn set_volume(&self, volume: f32) -> Result<()> {
        self.request(|reply| EngineCommand::SetVolume { volume, reply })
            .await?
    }

    /// Playlist mode: requests ignore cooldowns
    pub async fn set_linear_mode(&self, enabled: bool) -> Result<()> {
        self.request(|reply| EngineCommand::SetLinearMode { enabled, reply })
            .await
    }

    pub async fn get_state(&self) -> Result<EngineSnapshot> {
        self.request(EngineCommand::GetState).await
    }

    /// Remove the item at a 0-based position of the combined queue
    pub async fn remove_from_queue(&self, position: usize) -> Result<bool> {
        self.request(|reply| EngineCommand::RemoveFromQueue { position, reply })
            .await
    }

    /// Report who is currently in the voice channel
    pub fn listeners_changed(&self, listeners: Vec<String>) -> Result<()> {
        self.tx
            .send(EngineCommand::ListenersChanged(listeners))
            .map_err(|_| Error::EngineStopped)
    }

    /// Wait until every write queued so far has reached the store
    pub async fn flush(&self) -> Result<()> {
        self.request(EngineCommand::Flush).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// Stop the engine; returns once teardown and final writes are done
    ///
    /// Calling it on an engine that already stopped is a no-op.
    pub async fn shutdown(&self) -> Result<()> {
        match self.request(EngineCommand::Shutdown).await {
            Ok(()) | Err(Error::EngineStopped) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> EngineCommand) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(make(reply)).map_err(|_| Error::EngineStopped)?;
        rx.await.map_err(|_| Error::EngineStopped)
    }

    async fn resolve_track(&self, id: &TrackId) -> Result<Track> {
        if let Some(track) = self.store.get_track(id).await? {
            return Ok(track);
        }
        let info = match self.resolver.get_info(id).await {
            Ok(info) => info,
            Err(ResolverError::Unavailable(reason)) => {
                debug!(track_id = %id, reason = %reason, "Requested track unavailable");
                return Err(Error::Rejected(EnqueueRejection::Unavailable));
            }
            Err(e) => return Err(e.into()),
        };
        let track = Track::from_info(id.clone(), &info);
        if let Err(e) = self.store.upsert_track(&track).await {
            warn!(track_id = %id, error = %e, "Failed to store resolved track");
        }
        Ok(track)
    }
}
