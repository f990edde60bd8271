//! Core engine - startup wiring, dispatch loop and teardown
//!
//! **Responsibilities:**
//! - EngineCore struct definition and initialization (`Engine::start`)
//! - Background worker wiring (persister, publisher, refill worker, timers)
//! - Command dispatch loop
//! - Snapshot building and event helpers shared by the other engine files
//! - Orderly shutdown

use super::commands::{EngineCommand, EngineLink};
use super::handle::EngineHandle;
use crate::cache::AudioCacheManager;
use crate::collaborators::{
    DurationProbe, MediaResolver, Tracking, TransportEvent, VoiceConnection, VoiceTransport,
};
use crate::config::EngineConfig;
use crate::db::{Persister, Store};
use crate::model::{QueueItem, RequestStatus, TrackStatus};
use crate::playback::controller::PlaybackController;
use crate::playback::cooldown::CooldownTracker;
use crate::playback::presence::PresenceMonitor;
use crate::playback::queue::QueueStore;
use crate::playback::scheduler::{Scheduler, TimerHandle};
use crate::publisher::StatePublisher;
use crate::refill::{RefillSignal, RefillWorker};
use crate::Result;
use chrono::Utc;
use miu_common::events::{
    EngineEvent, EngineSnapshot, EventBus, PlaybackStatus, QueueChangeTrigger,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Collaborators the engine runs against
#[derive(Clone)]
pub struct EngineDeps {
    pub store: Arc<dyn Store>,
    pub resolver: Arc<dyn MediaResolver>,
    pub transport: Arc<dyn VoiceTransport>,
    pub tracking: Arc<dyn Tracking>,
    pub probe: Arc<dyn DurationProbe>,
    pub events: EventBus,
}

/// Engine entry point
pub struct Engine;

impl Engine {
    /// Validate the cache, spawn the engine task and its workers
    ///
    /// The returned handle is the only way to reach the engine. Call
    /// [`EngineHandle::shutdown`] to stop it; dropping every handle does not.
    pub async fn start(deps: EngineDeps, config: EngineConfig) -> Result<EngineHandle> {
        config.validate()?;
        let config = Arc::new(config);
        info!(
            channel = %config.playback.voice_channel,
            autoplay = config.playback.autoplay,
            target = config.queue.autoplay_target,
            "Starting playback engine"
        );

        let cache = Arc::new(AudioCacheManager::new(
            config.storage.cache_dir(),
            config.cache.clone(),
            Arc::clone(&deps.store),
            Arc::clone(&deps.resolver),
            Arc::clone(&deps.probe),
        ));
        match cache.validate_and_prune().await {
            Ok(report) => info!(?report, "Audio cache validated"),
            Err(e) => warn!(error = %e, "Audio cache validation failed, continuing"),
        }

        let mut cooldown = CooldownTracker::new(config.cooldown.clone());
        match deps.store.track_stats().await {
            Ok(stats) => cooldown.refresh_tiers(&stats),
            Err(e) => warn!(error = %e, "Failed to load track stats, using default cooldown tier"),
        }

        let shutdown = CancellationToken::new();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (transport_tx, transport_rx) = mpsc::unbounded_channel();

        let (persister, _persister_task) = Persister::spawn(Arc::clone(&deps.store));
        let (publisher, publisher_task) =
            StatePublisher::spawn(deps.events.clone(), &config.publisher, shutdown.child_token());
        let (refill_tx, refill_task) = RefillWorker::new(
            EngineLink::new(cmd_tx.clone()),
            Arc::clone(&deps.store),
            Arc::clone(&deps.resolver),
            Arc::clone(&deps.tracking),
            Arc::clone(&config),
            deps.events.clone(),
        )
        .spawn(shutdown.child_token());

        let mut scheduler = Scheduler::new(shutdown.child_token());
        {
            let refill_tx = refill_tx.clone();
            scheduler.every(config.recommendations.growth_interval(), move || {
                let _ = refill_tx.send(RefillSignal::GrowRecommendations);
            });
        }
        every_command(&mut scheduler, &cmd_tx, config.cooldown.tier_refresh_interval(), || {
            EngineCommand::RefreshTiers
        });
        every_command(&mut scheduler, &cmd_tx, config.cache.validate_interval(), || {
            EngineCommand::ValidateCache
        });
        every_command(&mut scheduler, &cmd_tx, config.playback.progress_interval(), || {
            EngineCommand::ProgressTick
        });

        let core = EngineCore {
            store: Arc::clone(&deps.store),
            transport: Arc::clone(&deps.transport),
            tracking: Arc::clone(&deps.tracking),
            events: deps.events.clone(),
            cache,
            persister,
            publisher,
            scheduler,
            queue: QueueStore::new(),
            cooldown,
            controller: PlaybackController::new(config.playback.max_error_retries),
            presence: PresenceMonitor::new(config.presence.enabled, config.presence.grace()),
            connection: None,
            loading: None,
            retry_timer: None,
            volume: config.playback.initial_volume,
            autoplay_enabled: config.playback.autoplay,
            stopped: false,
            cmd_tx: cmd_tx.clone(),
            transport_tx,
            refill_tx,
            shutdown,
            refill_task: Some(refill_task),
            publisher_task: Some(publisher_task),
            config,
        };
        tokio::spawn(core.run(cmd_rx, transport_rx));

        Ok(EngineHandle::new(cmd_tx, deps.store, deps.resolver, deps.events))
    }
}

fn every_command(
    scheduler: &mut Scheduler,
    tx: &mpsc::UnboundedSender<EngineCommand>,
    period: Duration,
    make: fn() -> EngineCommand,
) -> TimerHandle {
    let tx = tx.clone();
    scheduler.every(period, move || {
        let _ = tx.send(make());
    })
}

/// State owned by the engine task
pub(super) struct EngineCore {
    pub(super) config: Arc<EngineConfig>,
    pub(super) store: Arc<dyn Store>,
    pub(super) transport: Arc<dyn VoiceTransport>,
    pub(super) tracking: Arc<dyn Tracking>,
    pub(super) events: EventBus,
    pub(super) cache: Arc<AudioCacheManager>,
    pub(super) persister: Persister,
    pub(super) publisher: StatePublisher,
    pub(super) scheduler: Scheduler,

    pub(super) queue: QueueStore,
    pub(super) cooldown: CooldownTracker,
    pub(super) controller: PlaybackController,
    pub(super) presence: PresenceMonitor,
    pub(super) connection: Option<Box<dyn VoiceConnection>>,

    /// Dequeued item whose local file is being acquired
    pub(super) loading: Option<QueueItem>,
    /// Pending delayed `RetryPlayNext`
    pub(super) retry_timer: Option<TimerHandle>,
    pub(super) volume: f32,
    pub(super) autoplay_enabled: bool,
    pub(super) stopped: bool,

    pub(super) cmd_tx: mpsc::UnboundedSender<EngineCommand>,
    pub(super) transport_tx: mpsc::UnboundedSender<TransportEvent>,
    pub(super) refill_tx: mpsc::UnboundedSender<RefillSignal>,
    shutdown: CancellationToken,
    refill_task: Option<JoinHandle<()>>,
    publisher_task: Option<JoinHandle<()>>,
}

impl EngineCore {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<EngineCommand>,
        mut transport_events: mpsc::UnboundedReceiver<TransportEvent>,
    ) {
        info!("Playback engine started");
        self.request_refill();
        self.publish();

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(EngineCommand::Shutdown(reply)) => {
                        self.teardown().await;
                        let _ = reply.send(());
                        break;
                    }
                    Some(command) => self.dispatch(command).await,
                    None => {
                        self.teardown().await;
                        break;
                    }
                },
                Some(event) = transport_events.recv() => self.on_transport_event(event).await,
            }
        }

        info!("Playback engine stopped");
    }

    async fn dispatch(&mut self, command: EngineCommand) {
        trace!(command = command.name(), "Dispatching engine command");
        match command {
            EngineCommand::Enqueue { item, reply } => {
                let result = self.enqueue_user(item).await;
                let _ = reply.send(result);
            }
            EngineCommand::Skip(reply) => {
                let result = self.skip().await;
                let _ = reply.send(result);
            }
            EngineCommand::Pause(reply) => {
                let result = self.pause().await;
                let _ = reply.send(result);
            }
            EngineCommand::Resume(reply) => {
                let result = self.resume().await;
                let _ = reply.send(result);
            }
            EngineCommand::SetAutoplay { enabled, reply } => {
                self.set_autoplay(enabled);
                let _ = reply.send(());
            }
            EngineCommand::SetVolume { volume, reply } => {
                let _ = reply.send(self.set_volume(volume));
            }
            EngineCommand::SetLinearMode { enabled, reply } => {
                self.set_linear_mode(enabled);
                let _ = reply.send(());
            }
            EngineCommand::GetState(reply) => {
                let _ = reply.send(self.snapshot());
            }
            EngineCommand::RemoveFromQueue { position, reply } => {
                let _ = reply.send(self.remove_from_queue(position));
            }
            EngineCommand::ListenersChanged(listeners) => {
                self.on_listeners_changed(listeners).await;
            }
            EngineCommand::Flush(reply) => {
                let barrier = self.persister.barrier();
                tokio::spawn(async move {
                    let _ = barrier.await;
                    let _ = reply.send(());
                });
            }
            EngineCommand::Shutdown(reply) => {
                // Intercepted by the run loop
                let _ = reply.send(());
            }
            EngineCommand::SelectionContext(reply) => {
                let _ = reply.send(self.selection_context());
            }
            EngineCommand::OfferAutoplay { item, reply } => {
                let accepted = self.offer_autoplay(item).await;
                let _ = reply.send(accepted);
            }
            EngineCommand::PlayNext => self.play_next().await,
            EngineCommand::RetryPlayNext => {
                self.retry_timer = None;
                self.play_next().await;
            }
            EngineCommand::MediaReady { request_id, result } => {
                self.on_media_ready(request_id, result).await;
            }
            EngineCommand::PresenceGraceExpired => self.on_presence_grace_expired().await,
            EngineCommand::ProgressTick => {
                if self.controller.status() == PlaybackStatus::Playing {
                    self.publish();
                }
            }
            EngineCommand::RefreshTiers => self.spawn_tier_refresh(),
            EngineCommand::TiersLoaded(tiers) => {
                let pruned = self.cooldown.prune_at(Utc::now());
                let count = tiers.len();
                self.cooldown.apply_tiers(tiers);
                debug!(tracks = count, pruned, "Cooldown tiers refreshed");
            }
            EngineCommand::ValidateCache => {
                let cache = Arc::clone(&self.cache);
                tokio::spawn(async move {
                    match cache.validate_and_prune().await {
                        Ok(report) => debug!(?report, "Periodic cache validation complete"),
                        Err(e) => warn!(error = %e, "Periodic cache validation failed"),
                    }
                });
            }
        }
    }

    /// Load stats off the engine task and send the computed tiers back
    fn spawn_tier_refresh(&self) {
        let store = Arc::clone(&self.store);
        let config = self.config.cooldown.clone();
        let tx = self.cmd_tx.clone();
        tokio::spawn(async move {
            match store.track_stats().await {
                Ok(stats) => {
                    let tiers: HashMap<_, _> = stats
                        .iter()
                        .map(|s| (s.track_id.clone(), CooldownTracker::compute_tier(&config, s)))
                        .collect();
                    let _ = tx.send(EngineCommand::TiersLoaded(tiers));
                }
                Err(e) => warn!(error = %e, "Failed to load track stats for cooldown tiers"),
            }
        });
    }

    pub(super) fn snapshot(&self) -> EngineSnapshot {
        let now_playing = self.controller.now_playing();
        let current_track = now_playing
            .map(|np| np.item.view())
            .or_else(|| self.loading.as_ref().map(QueueItem::view));
        EngineSnapshot {
            status: self.controller.status(),
            current_track,
            queue: self.queue.peek_combined().map(QueueItem::view).collect(),
            position: now_playing.map(|np| np.position_secs()).unwrap_or(0.0),
            volume: self.volume,
            autoplay: self.autoplay_enabled,
        }
    }

    pub(super) fn publish(&self) {
        self.publisher.publish(self.snapshot());
    }

    pub(super) fn emit_queue_changed(&self, trigger: QueueChangeTrigger) {
        self.events.emit_lossy(EngineEvent::QueueChanged {
            queue: self.queue.combined_ids(),
            trigger,
            timestamp: Utc::now(),
        });
    }

    pub(super) fn emit_status_change(&self, old_state: PlaybackStatus, new_state: PlaybackStatus) {
        if old_state == new_state {
            return;
        }
        debug!(?old_state, ?new_state, "Playback state changed");
        self.events.emit_lossy(EngineEvent::PlaybackStateChanged {
            old_state,
            new_state,
            timestamp: Utc::now(),
        });
    }

    /// Wake the refill worker if the autoplay buffer is short
    /// Nudge the refill worker when the autoplay queue is below its target
    pub(super) fn request_refill(&self) {
        if self.stopped || !self.autoplay_enabled {
            return;
        }
        if self.queue.autoplay_len() < self.config.queue.autoplay_target {
            let _ = self.refill_tx.send(RefillSignal::Fill);
        }
    }

    /// Mark a queued item as dropped without playing
    pub(super) fn expire(&self, item: &QueueItem) {
        self.persister
            .request_status(item.request_id, RequestStatus::Expired, None);
    }

    /// Schedule a `RetryPlayNext`, replacing any pending one
    pub(super) fn schedule_retry(&mut self, delay: Duration) {
        if let Some(timer) = self.retry_timer.take() {
            timer.cancel();
        }
        let tx = self.cmd_tx.clone();
        let timer = self.scheduler.after(delay, move || {
            let _ = tx.send(EngineCommand::RetryPlayNext);
        });
        self.retry_timer = Some(timer);
    }

    pub(super) fn retry_pending(&self) -> bool {
        self.retry_timer
            .as_ref()
            .map(|t| !t.is_cancelled())
            .unwrap_or(false)
    }

    /// Cancel timers, drain queues, release the connection
    ///
    /// Downloads already running are left to finish; their results land in
    /// the cache but are not acted upon.
    async fn teardown(&mut self) {
        info!("Stopping playback engine");
        self.stopped = true;
        self.presence.disarm();
        self.retry_timer = None;
        self.scheduler.shutdown();

        let old = self.controller.status();
        if let Some(np) = self.controller.finish() {
            self.expire(&np.item);
            self.persister.track_status(&np.item.track_id, TrackStatus::Standby);
        }
        if let Some(item) = self.loading.take() {
            self.expire(&item);
        }
        let drained = self.queue.clear();
        for item in &drained {
            self.expire(item);
        }
        self.queue.set_current(None);

        if let Some(mut conn) = self.connection.take() {
            if let Err(e) = conn.stop().await {
                debug!(error = %e, "Transport stop failed during shutdown");
            }
            conn.disconnect().await;
        }

        self.emit_queue_changed(QueueChangeTrigger::Shutdown);
        self.emit_status_change(old, PlaybackStatus::Idle);
        self.publish();

        // Refill may be waiting on a reply from this task; abort rather than join
        self.shutdown.cancel();
        if let Some(task) = self.refill_task.take() {
            task.abort();
        }
        if let Some(task) = self.publisher_task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "State publisher task failed");
            }
        }

        if self.persister.barrier().await.is_err() {
            warn!("Persister stopped before shutdown flush");
        }
        info!(expired = drained.len(), "Playback engine shut down");
    }
}
