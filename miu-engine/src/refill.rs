//! Autoplay refill worker
//!
//! Keeps the autoplay queue at its target depth. Runs as its own task so
//! slow source queries and metadata lookups never block the engine's
//! dispatcher; it talks to the engine only through [`RefillTarget`].
//!
//! **One pass (`ensure_buffer_filled`):**
//! 1. Ask the engine for the current deficit and exclusion set
//! 2. Draw one candidate from the weighted pool
//! 3. Resolve display metadata and offer it to the engine, which runs the
//!    duplicate/cooldown guard once more before appending
//! 4. On an empty pool, grow the recommendation pool once and retry
//! 5. After `refill_attempts` failed attempts, give up with `BackedOff`
//!
//! The run loop waits `refill_backoff` after a `BackedOff` pass before
//! trying again; the wait is cancelled by shutdown.

use crate::collaborators::{MediaResolver, ResolverError, Tracking};
use crate::config::EngineConfig;
use crate::db::Store;
use crate::model::{QueueItem, Track, TrackId};
use crate::selection::{
    build_candidate_pool, gather_sources, pick_candidates, refresh_recommendations,
    RecommendationPool, SelectionCandidate,
};
use async_trait::async_trait;
use chrono::Utc;
use miu_common::events::{EngineEvent, EventBus};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Engine state a refill pass needs
#[derive(Debug, Clone, Default)]
pub struct SelectionContext {
    /// Autoplay items still missing from the target depth
    pub deficit: usize,
    /// Ids that must not be picked (queued, playing, cooling down)
    pub excluded: HashSet<TrackId>,
    /// Current listeners, for the favorites source
    pub listeners: Vec<String>,
    pub autoplay_enabled: bool,
}

/// The engine as seen from the refill worker
#[async_trait]
pub trait RefillTarget: Send + Sync {
    /// `None` once the engine has stopped
    async fn selection_context(&self) -> Option<SelectionContext>;

    /// Offer a pick; true if it was appended to the autoplay queue
    async fn offer(&self, item: QueueItem) -> bool;
}

/// Messages driving the worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefillSignal {
    /// Top up the autoplay queue
    Fill,
    /// Periodic recommendation pool growth
    GrowRecommendations,
}

/// Result of one pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefillOutcome {
    /// Target depth reached (or autoplay disabled)
    Satisfied { added: usize },
    /// Attempts exhausted before reaching the target
    BackedOff { added: usize },
    /// Engine gone
    Stopped,
}

pub struct RefillWorker<T: RefillTarget> {
    target: T,
    store: Arc<dyn Store>,
    resolver: Arc<dyn MediaResolver>,
    tracking: Arc<dyn Tracking>,
    config: Arc<EngineConfig>,
    events: EventBus,
    recommendations: RecommendationPool,
    rng: StdRng,
}

impl<T: RefillTarget + 'static> RefillWorker<T> {
    pub fn new(
        target: T,
        store: Arc<dyn Store>,
        resolver: Arc<dyn MediaResolver>,
        tracking: Arc<dyn Tracking>,
        config: Arc<EngineConfig>,
        events: EventBus,
    ) -> Self {
        let recommendations = RecommendationPool::new(config.recommendations.max_pool_size);
        let rng = match config.selector.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            target,
            store,
            resolver,
            tracking,
            config,
            events,
            recommendations,
            rng,
        }
    }

    pub fn recommendations(&self) -> &RecommendationPool {
        &self.recommendations
    }

    /// Spawn the worker loop; returns its signal sender
    pub fn spawn(
        self,
        cancel: CancellationToken,
    ) -> (mpsc::UnboundedSender<RefillSignal>, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(self.run(rx, cancel));
        (tx, handle)
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<RefillSignal>, cancel: CancellationToken) {
        info!("Autoplay refill worker started");
        loop {
            let signal = tokio::select! {
                _ = cancel.cancelled() => break,
                signal = rx.recv() => match signal {
                    Some(signal) => signal,
                    None => break,
                },
            };

            // Coalesce a burst of signals into one pass each
            let mut fill = signal == RefillSignal::Fill;
            let mut grow = signal == RefillSignal::GrowRecommendations;
            while let Ok(pending) = rx.try_recv() {
                match pending {
                    RefillSignal::Fill => fill = true,
                    RefillSignal::GrowRecommendations => grow = true,
                }
            }

            if grow {
                self.grow_recommendations().await;
            }
            if fill && !self.fill_until_satisfied(&cancel).await {
                break;
            }
        }
        info!("Autoplay refill worker stopped");
    }

    /// Repeat passes with backoff until satisfied; false when stopping
    async fn fill_until_satisfied(&mut self, cancel: &CancellationToken) -> bool {
        loop {
            match self.ensure_buffer_filled().await {
                RefillOutcome::Satisfied { added } => {
                    if added > 0 {
                        debug!(added, "Autoplay buffer filled");
                    }
                    return true;
                }
                RefillOutcome::Stopped => return false,
                RefillOutcome::BackedOff { added } => {
                    let delay = self.config.queue.refill_backoff();
                    info!(
                        added,
                        retry_in_secs = delay.as_secs(),
                        "No autoplay candidates, backing off"
                    );
                    self.events.emit_lossy(EngineEvent::AutoplayBackoff {
                        retry_in_ms: u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        timestamp: Utc::now(),
                    });
                    tokio::select! {
                        _ = cancel.cancelled() => return false,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    /// One bounded refill pass
    pub async fn ensure_buffer_filled(&mut self) -> RefillOutcome {
        let max_failures = self.config.queue.refill_attempts.max(1);
        let mut added = 0;
        let mut failures = 0;
        let mut refreshed = false;
        let mut rejected: HashSet<TrackId> = HashSet::new();

        loop {
            let Some(ctx) = self.target.selection_context().await else {
                return RefillOutcome::Stopped;
            };
            if !ctx.autoplay_enabled || ctx.deficit == 0 {
                return RefillOutcome::Satisfied { added };
            }

            match self.select_one(&ctx, &rejected).await {
                Some(candidate) => {
                    let id = candidate.track_id.clone();
                    let accepted = match self.prepare_item(&candidate).await {
                        Some(item) => self.target.offer(item).await,
                        None => false,
                    };
                    if accepted {
                        debug!(track_id = %id, source = %candidate.source, "Autoplay pick accepted");
                        added += 1;
                        failures = 0;
                        continue;
                    }
                    debug!(track_id = %id, "Autoplay pick rejected");
                    rejected.insert(id);
                    failures += 1;
                }
                None => {
                    failures += 1;
                    if !refreshed {
                        refreshed = true;
                        let grown = self.grow_recommendations().await;
                        debug!(grown, "Candidate pool empty, refreshed recommendations");
                    }
                }
            }

            if failures >= max_failures {
                warn!(failures, added, "Autoplay refill attempts exhausted");
                return RefillOutcome::BackedOff { added };
            }
        }
    }

    /// Grow the recommendation pool from one seed; returns ids added
    pub async fn grow_recommendations(&mut self) -> usize {
        match refresh_recommendations(
            self.store.as_ref(),
            self.resolver.as_ref(),
            &mut self.recommendations,
            &self.config.recommendations,
            Utc::now(),
        )
        .await
        {
            Ok(added) => added,
            Err(e) => {
                warn!(error = %e, "Recommendation refresh failed");
                0
            }
        }
    }

    async fn select_one(
        &mut self,
        ctx: &SelectionContext,
        rejected: &HashSet<TrackId>,
    ) -> Option<SelectionCandidate> {
        let lists = gather_sources(
            self.store.as_ref(),
            self.tracking.as_ref(),
            self.recommendations.snapshot(),
            &ctx.listeners,
            self.config.selector.fetch_limit,
        )
        .await;

        let pool = build_candidate_pool(&lists, &self.config.selector, |id| {
            ctx.excluded.contains(id) || rejected.contains(id)
        });
        if pool.is_empty() {
            return None;
        }
        pick_candidates(&pool, &mut self.rng, 1).into_iter().next()
    }

    /// Load or resolve the track and build its queue item
    async fn prepare_item(&self, candidate: &SelectionCandidate) -> Option<QueueItem> {
        let id = &candidate.track_id;
        let track = match self.store.get_track(id).await {
            Ok(Some(track)) => track,
            Ok(None) => match self.resolver.get_info(id).await {
                Ok(info) => {
                    let track = Track::from_info(id.clone(), &info);
                    if let Err(e) = self.store.upsert_track(&track).await {
                        warn!(track_id = %id, error = %e, "Failed to store resolved track");
                    }
                    track
                }
                Err(ResolverError::Unavailable(reason)) => {
                    debug!(track_id = %id, reason = %reason, "Candidate unavailable");
                    return None;
                }
                Err(e) => {
                    warn!(track_id = %id, error = %e, "Candidate metadata lookup failed");
                    return None;
                }
            },
            Err(e) => {
                warn!(track_id = %id, error = %e, "Candidate lookup failed");
                return None;
            }
        };

        if !track.is_selectable() {
            return None;
        }
        Some(QueueItem::for_autoplay(&track, candidate.source))
    }
}
