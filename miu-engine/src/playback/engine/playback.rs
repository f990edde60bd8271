//! Playback flow
//!
//! **Responsibilities:**
//! - `play_next`: connect, dequeue, acquire the local file off-task
//! - Starting a resource on the transport
//! - Completion bookkeeping (persistence, cooldown, listen reports, events)
//! - Skip, pause and resume commands
//! - Transport events (finished, error, disconnect) and the error budget
//! - Listener presence (grace timer, automatic pause and resume)

use super::commands::EngineCommand;
use super::core::EngineCore;
use crate::collaborators::{PlayResource, TransportError, TransportEvent};
use crate::db::PersistOp;
use crate::error::{Error, Result};
use crate::model::{QueueItem, RequestStatus, TrackStatus};
use crate::playback::controller::{ErrorDisposition, NowPlaying, PauseReason};
use crate::playback::presence::PresenceAction;
use chrono::Utc;
use miu_common::events::{EngineEvent, PlaybackStatus, QueueChangeTrigger};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

impl EngineCore {
    /// Start the next queued item if the controller is free
    ///
    /// Returns without a state change when the queues are empty (the refill
    /// worker is nudged instead) or when a delayed retry is already pending.
    pub(super) async fn play_next(&mut self) {
        if self.stopped
            || !self.controller.is_idle()
            || self.loading.is_some()
            || self.retry_pending()
        {
            return;
        }

        if self.queue.is_empty() {
            debug!("Queues empty, waiting for autoplay");
            self.request_refill();
            self.publish();
            return;
        }

        if self.connection.is_none() {
            if let Err(e) = self.connect().await {
                let delay = self.config.playback.reconnect_delay();
                warn!(error = %e, retry_in_ms = delay.as_millis() as u64, "Voice connection failed");
                self.schedule_retry(delay);
                return;
            }
        }

        let Some(item) = self.queue.dequeue_next() else {
            return;
        };
        debug!(track_id = %item.track_id, origin = ?item.origin, "Dequeued next item");
        self.queue.set_current(Some(item.track_id.clone()));
        self.emit_queue_changed(QueueChangeTrigger::TrackAdvance);
        self.request_refill();

        // Acquisition can mean a download; keep the dispatcher responsive
        let request_id = item.request_id;
        let track_id = item.track_id.clone();
        let cache = Arc::clone(&self.cache);
        let tx = self.cmd_tx.clone();
        tokio::spawn(async move {
            let result = cache.ensure_local(&track_id).await;
            let _ = tx.send(EngineCommand::MediaReady { request_id, result });
        });
        self.loading = Some(item);
        self.publish();
    }

    async fn connect(&mut self) -> std::result::Result<(), TransportError> {
        let channel = &self.config.playback.voice_channel;
        let mut conn = self
            .transport
            .connect(channel, self.transport_tx.clone())
            .await?;
        conn.set_volume(self.volume);
        info!(channel = %channel, "Voice connection established");
        self.connection = Some(conn);
        Ok(())
    }

    pub(super) async fn on_media_ready(
        &mut self,
        request_id: Uuid,
        result: Result<Option<PathBuf>>,
    ) {
        let current = self.loading.as_ref().map(|item| item.request_id);
        if current != Some(request_id) {
            debug!(%request_id, "Ignoring media result for an abandoned item");
            return;
        }
        let Some(item) = self.loading.take() else {
            return;
        };

        match result {
            Ok(Some(path)) => self.start_playback(item, path).await,
            Ok(None) => {
                warn!(track_id = %item.track_id, "Media unavailable, discarding item");
                self.discard(&item);
                self.play_next().await;
            }
            Err(e) => {
                warn!(track_id = %item.track_id, error = %e, "Failed to acquire media, discarding item");
                self.discard(&item);
                self.play_next().await;
            }
        }
    }

    /// Drop an item that could not be made playable
    fn discard(&mut self, item: &QueueItem) {
        self.expire(item);
        self.persister.track_status(&item.track_id, TrackStatus::Standby);
        self.queue.set_current(None);
        self.publish();
    }

    async fn start_playback(&mut self, item: QueueItem, path: PathBuf) {
        let resource = PlayResource {
            track_id: item.track_id.clone(),
            path: path.clone(),
            duration_secs: item.duration_secs,
        };
        let request_id = item.request_id;
        let track_id = item.track_id.clone();
        let origin = item.origin;
        let title = item.title.clone();

        let old = self.controller.status();
        let playback_id = self.controller.begin(item, path);
        let played = match self.connection.as_mut() {
            Some(conn) => conn.play(resource, playback_id).await,
            None => Err(TransportError::Disconnected),
        };
        if let Err(e) = played {
            warn!(track_id = %track_id, error = %e, "Transport refused resource");
            if let Some(np) = self.controller.finish() {
                self.on_playback_failure(np).await;
            }
            return;
        }

        let now = Utc::now();
        self.persister.track_status(&track_id, TrackStatus::Playing);
        self.persister
            .request_status(request_id, RequestStatus::Playing, Some(now));
        info!(track_id = %track_id, title = %title, ?origin, playback_id, "Now playing");
        self.events.emit_lossy(EngineEvent::TrackStarted {
            track_id: track_id.to_string(),
            origin,
            timestamp: now,
        });
        self.emit_status_change(old, PlaybackStatus::Playing);

        if let Some(next) = self.queue.peek_next() {
            self.cache.prefetch(next.track_id.clone());
        }
        if self.presence.channel_empty() {
            self.arm_presence_grace();
        }
        self.publish();
    }

    /// Leave Playing/Paused, emitting the state change
    fn leave_playing(&mut self) -> Option<NowPlaying> {
        let old = self.controller.status();
        let np = self.controller.finish();
        self.emit_status_change(old, PlaybackStatus::Idle);
        self.queue.set_current(None);
        np
    }

    /// Bookkeeping for an item that left the transport
    fn complete(&mut self, item: &QueueItem, listened_secs: f64, skipped: bool) {
        let now = Utc::now();
        let track_id = &item.track_id;
        let status = if skipped {
            RequestStatus::Skipped
        } else {
            RequestStatus::Completed
        };

        self.persister.request_status(item.request_id, status, None);
        self.persister.submit(PersistOp::TrackPlayed {
            id: track_id.clone(),
            at: now,
        });
        if skipped {
            self.persister.submit(PersistOp::TrackSkipped {
                id: track_id.clone(),
            });
        }
        self.persister.track_status(track_id, TrackStatus::Standby);
        self.cooldown.mark_played_at(track_id, now);
        self.report_listens(item, listened_secs, skipped);

        info!(track_id = %track_id, listened_secs, skipped, "Track finished");
        self.events.emit_lossy(EngineEvent::TrackFinished {
            track_id: track_id.to_string(),
            listened_secs,
            skipped,
            timestamp: now,
        });
    }

    /// One report per listener, or for the requester when nobody is known
    fn report_listens(&self, item: &QueueItem, listened_secs: f64, skipped: bool) {
        let mut users: Vec<String> = self.presence.listeners().to_vec();
        if users.is_empty() {
            users.extend(item.requester.user_id().map(str::to_string));
        }
        if users.is_empty() {
            return;
        }

        let tracking = Arc::clone(&self.tracking);
        let track_id = item.track_id.clone();
        let total_secs = item.duration_secs;
        tokio::spawn(async move {
            for user in users {
                if let Err(e) = tracking
                    .record_listen(&user, &track_id, listened_secs, total_secs, skipped)
                    .await
                {
                    warn!(user = %user, track_id = %track_id, error = %e, "Failed to record listen");
                }
            }
        });
    }

    pub(super) async fn skip(&mut self) -> Result<()> {
        if let Some(item) = self.loading.take() {
            info!(track_id = %item.track_id, "Skipping item before playback started");
            self.queue.set_current(None);
            self.controller.reset_errors();
            self.complete(&item, 0.0, true);
            self.play_next().await;
            self.publish();
            return Ok(());
        }

        if self.controller.is_idle() {
            return Err(Error::InvalidState(
                "Nothing to skip - playback is idle".to_string(),
            ));
        }

        if let Some(conn) = self.connection.as_mut() {
            if let Err(e) = conn.stop().await {
                warn!(error = %e, "Transport stop failed during skip");
            }
        }
        if let Some(np) = self.leave_playing() {
            info!(track_id = %np.item.track_id, "Skip requested");
            self.controller.reset_errors();
            self.complete(&np.item, 0.0, true);
        }
        self.play_next().await;
        self.publish();
        Ok(())
    }

    pub(super) async fn pause(&mut self) -> Result<()> {
        match self.controller.status() {
            PlaybackStatus::Idle => Err(Error::InvalidState(
                "Nothing to pause - playback is idle".to_string(),
            )),
            PlaybackStatus::Paused => {
                // Claim a presence pause so returning listeners leave it alone
                self.controller.pause(PauseReason::User);
                Ok(())
            }
            PlaybackStatus::Playing => self.pause_with(PauseReason::User).await,
        }
    }

    pub(super) async fn resume(&mut self) -> Result<()> {
        match self.controller.status() {
            PlaybackStatus::Idle => {
                self.play_next().await;
                Ok(())
            }
            PlaybackStatus::Playing => Ok(()),
            PlaybackStatus::Paused => self.resume_transport().await,
        }
    }

    async fn pause_with(&mut self, reason: PauseReason) -> Result<()> {
        if let Some(conn) = self.connection.as_mut() {
            conn.pause().await?;
        }
        if self.controller.pause(reason) {
            info!(?reason, "Playback paused");
            self.emit_status_change(PlaybackStatus::Playing, PlaybackStatus::Paused);
            self.publish();
        }
        Ok(())
    }

    async fn resume_transport(&mut self) -> Result<()> {
        if let Some(conn) = self.connection.as_mut() {
            conn.unpause().await?;
        }
        if self.controller.resume() {
            info!("Playback resumed");
            self.emit_status_change(PlaybackStatus::Paused, PlaybackStatus::Playing);
            if self.presence.channel_empty() {
                self.arm_presence_grace();
            }
            self.publish();
        }
        Ok(())
    }

    pub(super) async fn on_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Finished { playback_id } => {
                if !self.controller.is_current(playback_id) {
                    debug!(playback_id, "Ignoring stale completion");
                    return;
                }
                if let Some(np) = self.leave_playing() {
                    let listened = np.item.duration_secs.max(np.position_secs());
                    self.controller.reset_errors();
                    self.complete(&np.item, listened, false);
                }
                self.play_next().await;
                self.publish();
            }
            TransportEvent::Error {
                playback_id,
                message,
            } => {
                if !self.controller.is_current(playback_id) {
                    debug!(playback_id, message = %message, "Ignoring error for stale resource");
                    return;
                }
                warn!(playback_id, message = %message, "Transport error during playback");
                if let Some(np) = self.leave_playing() {
                    self.on_playback_failure(np).await;
                }
            }
            TransportEvent::Disconnected => {
                warn!("Voice connection lost");
                self.connection = None;
                if let Some(np) = self.leave_playing() {
                    self.on_playback_failure(np).await;
                } else if !self.queue.is_empty() {
                    self.schedule_retry(self.config.playback.reconnect_delay());
                }
            }
        }
    }

    /// Apply the error budget to an item that failed on the transport
    async fn on_playback_failure(&mut self, np: NowPlaying) {
        self.queue.set_current(None);
        match self.controller.record_error() {
            ErrorDisposition::Retry { attempt } => {
                let delay = self.config.playback.error_retry_delay();
                warn!(
                    track_id = %np.item.track_id,
                    attempt,
                    max = self.config.playback.max_error_retries,
                    "Playback failed, retrying"
                );
                let initial = np.item.request_record().status;
                self.persister.request_status(np.item.request_id, initial, None);
                self.queue.requeue_front(np.item);
                self.schedule_retry(delay);
            }
            ErrorDisposition::GiveUp => {
                error!(track_id = %np.item.track_id, "Playback failed repeatedly, advancing");
                let listened = np.position_secs();
                self.complete(&np.item, listened, false);
                self.play_next().await;
            }
        }
        self.publish();
    }

    pub(super) async fn on_listeners_changed(&mut self, listeners: Vec<String>) {
        let count = listeners.len();
        match self.presence.update(listeners) {
            PresenceAction::Nothing => {}
            PresenceAction::StartGrace => {
                if self.controller.status() == PlaybackStatus::Playing {
                    debug!(
                        grace_secs = self.presence.grace().as_secs(),
                        "Channel empty, starting pause grace period"
                    );
                    self.arm_presence_grace();
                }
            }
            PresenceAction::Resume => {
                debug!(listeners = count, "Listeners present");
                if self.controller.pause_reason() == Some(PauseReason::Presence) {
                    if let Err(e) = self.resume_transport().await {
                        warn!(error = %e, "Failed to resume after listeners returned");
                    }
                } else if self.controller.is_idle() {
                    self.play_next().await;
                }
            }
        }
    }

    fn arm_presence_grace(&mut self) {
        let tx = self.cmd_tx.clone();
        let timer = self.scheduler.after(self.presence.grace(), move || {
            let _ = tx.send(EngineCommand::PresenceGraceExpired);
        });
        self.presence.arm(timer);
    }

    pub(super) async fn on_presence_grace_expired(&mut self) {
        if !self.presence.grace_elapsed() {
            return;
        }
        if self.controller.status() != PlaybackStatus::Playing {
            return;
        }
        info!("No listeners left, pausing");
        if let Err(e) = self.pause_with(PauseReason::Presence).await {
            warn!(error = %e, "Failed to pause for empty channel");
        }
    }
}
