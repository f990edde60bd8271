//! Queue operations
//!
//! **Responsibilities:**
//! - User requests and autoplay offers (duplicate/cooldown guard, persistence,
//!   prefetch, immediate start when idle)
//! - Removal by combined position
//! - Autoplay toggle, linear mode, volume
//! - Selection context for the refill worker

use super::core::EngineCore;
use crate::db::PersistOp;
use crate::error::{Error, Result};
use crate::model::QueueItem;
use crate::refill::SelectionContext;
use chrono::Utc;
use miu_common::events::{QueueChangeTrigger, QueuedTrackView};
use tracing::{debug, info};

impl EngineCore {
    /// Enqueue a user request
    ///
    /// Starts it right away when nothing is playing; the returned view then
    /// has `playing_now` set.
    pub(super) async fn enqueue_user(&mut self, item: QueueItem) -> Result<QueuedTrackView> {
        if self.stopped {
            return Err(Error::EngineStopped);
        }
        let view = item.view();
        let record = item.request_record();
        let request_id = item.request_id;
        let track_id = item.track_id.clone();

        let position = self
            .queue
            .enqueue_user_request(item, &mut self.cooldown, Utc::now())
            .map_err(|rejection| {
                info!(track_id = %track_id, reason = %rejection, "User request rejected");
                Error::from(rejection)
            })?;

        self.persister.submit(PersistOp::InsertRequest(record));
        info!(track_id = %track_id, position, "User request queued");
        self.emit_queue_changed(QueueChangeTrigger::UserEnqueue);

        self.play_next().await;
        let playing_now = self.is_active_request(request_id);
        if !playing_now {
            self.cache.prefetch(track_id);
        }
        self.publish();

        Ok(QueuedTrackView {
            position: if playing_now { 0 } else { position },
            playing_now,
            track: view,
        })
    }

    /// Append a refill pick; false if the guard or the autoplay flag refuses it
    pub(super) async fn offer_autoplay(&mut self, item: QueueItem) -> bool {
        if self.stopped || !self.autoplay_enabled {
            return false;
        }
        if self.queue.autoplay_len() >= self.config.queue.autoplay_target {
            debug!(track_id = %item.track_id, "Autoplay buffer already full");
            return false;
        }

        let record = item.request_record();
        let track_id = item.track_id.clone();
        let source = item.source;
        match self
            .queue
            .enqueue_autoplay(item, &mut self.cooldown, Utc::now())
        {
            Ok(position) => {
                self.persister.submit(PersistOp::InsertRequest(record));
                debug!(track_id = %track_id, ?source, position, "Autoplay pick queued");
                self.emit_queue_changed(QueueChangeTrigger::AutoplayRefill);
                self.cache.prefetch(track_id);
                self.play_next().await;
                self.publish();
                true
            }
            Err(rejection) => {
                debug!(track_id = %track_id, reason = %rejection, "Autoplay pick refused");
                false
            }
        }
    }

    /// Drop the item at a 0-based combined position
    pub(super) fn remove_from_queue(&mut self, position: usize) -> bool {
        let Some(item) = self.queue.remove_at(position) else {
            debug!(position, "Remove ignored, position out of range");
            return false;
        };
        info!(track_id = %item.track_id, position, "Removed from queue");
        self.expire(&item);
        self.emit_queue_changed(QueueChangeTrigger::UserRemove);
        self.request_refill();
        self.publish();
        true
    }

    pub(super) fn set_autoplay(&mut self, enabled: bool) {
        if self.autoplay_enabled == enabled {
            return;
        }
        self.autoplay_enabled = enabled;
        info!(enabled, "Autoplay toggled");

        if enabled {
            self.request_refill();
        } else {
            let dropped = self.queue.clear_autoplay();
            for item in &dropped {
                self.expire(item);
            }
            if !dropped.is_empty() {
                self.emit_queue_changed(QueueChangeTrigger::AutoplayDisabled);
            }
        }
        self.publish();
    }

    /// Playlist mode: cooldown no longer gates admission
    pub(super) fn set_linear_mode(&mut self, enabled: bool) {
        self.queue.set_linear_mode(enabled);
        info!(enabled, "Linear mode toggled");
    }

    pub(super) fn set_volume(&mut self, volume: f32) -> Result<()> {
        if !(0.0..=1.0).contains(&volume) {
            return Err(Error::BadRequest(format!(
                "volume {volume} outside 0.0-1.0"
            )));
        }
        self.volume = volume;
        if let Some(conn) = self.connection.as_mut() {
            conn.set_volume(volume);
        }
        debug!(volume, "Volume set");
        self.publish();
        Ok(())
    }

    pub(super) fn selection_context(&mut self) -> SelectionContext {
        let now = Utc::now();
        let deficit = if self.autoplay_enabled && !self.stopped {
            self.config
                .queue
                .autoplay_target
                .saturating_sub(self.queue.autoplay_len())
        } else {
            0
        };
        let mut excluded = self.queue.occupied_ids();
        excluded.extend(self.cooldown.active_ids_at(true, now));

        SelectionContext {
            deficit,
            excluded,
            listeners: self.presence.listeners().to_vec(),
            autoplay_enabled: self.autoplay_enabled && !self.stopped,
        }
    }

    /// True while `request_id` is being acquired or is on the transport
    fn is_active_request(&self, request_id: uuid::Uuid) -> bool {
        let loading = self
            .loading
            .as_ref()
            .map(|item| item.request_id == request_id)
            .unwrap_or(false);
        let playing = self
            .controller
            .now_playing()
            .map(|np| np.item.request_id == request_id)
            .unwrap_or(false);
        loading || playing
    }
}
