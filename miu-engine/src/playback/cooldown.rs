//! Cooldown tracker
//!
//! Remembers when each track last played and answers whether it may be
//! queued again. Two scales apply:
//! - explicit requests: one fixed window for every track
//! - autoplay: a per-track tier (short / medium / long) from the track's
//!   score and skip ratio
//!
//! The tier is captured when the track is marked played. A later tier
//! recomputation may lengthen an active window but never shortens it.
//! Expired entries are pruned lazily on lookup.

use crate::config::CooldownConfig;
use crate::model::{TrackId, TrackStats};
use chrono::{DateTime, Utc};
use miu_common::time::to_chrono;
use std::collections::{HashMap, HashSet};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq)]
struct CooldownEntry {
    last_played: DateTime<Utc>,
    window: Duration,
}

impl CooldownEntry {
    fn active_at(&self, now: DateTime<Utc>) -> bool {
        now - self.last_played <= to_chrono(self.window)
    }

    fn remaining_at(&self, now: DateTime<Utc>) -> Duration {
        let ends = self.last_played + to_chrono(self.window);
        (ends - now).to_std().unwrap_or(Duration::ZERO)
    }
}

#[derive(Debug)]
pub struct CooldownTracker {
    config: CooldownConfig,
    explicit: HashMap<TrackId, CooldownEntry>,
    autoplay: HashMap<TrackId, CooldownEntry>,
    /// Latest computed autoplay tier per track
    tiers: HashMap<TrackId, Duration>,
}

impl CooldownTracker {
    pub fn new(config: CooldownConfig) -> Self {
        Self {
            config,
            explicit: HashMap::new(),
            autoplay: HashMap::new(),
            tiers: HashMap::new(),
        }
    }

    /// Tier for a track from its counters
    ///
    /// Frequently skipped tracks (once enough plays exist to trust the
    /// ratio) rest longest; high scorers come back soonest.
    pub fn compute_tier(config: &CooldownConfig, stats: &TrackStats) -> Duration {
        let skip_ratio = if stats.play_count == 0 {
            0.0
        } else {
            f64::from(stats.skip_count) / f64::from(stats.play_count)
        };

        if stats.play_count >= config.min_plays_for_skip_ratio
            && skip_ratio >= config.skip_ratio_threshold
        {
            config.long_tier()
        } else if stats.score >= config.high_score_threshold {
            config.short_tier()
        } else {
            config.medium_tier()
        }
    }

    /// Autoplay tier that would be applied if `id` played now
    pub fn tier_for(&self, id: &TrackId) -> Duration {
        self.tiers
            .get(id)
            .copied()
            .unwrap_or_else(|| self.config.medium_tier())
    }

    /// Replace the tier table and lengthen any active window whose tier grew
    pub fn apply_tiers(&mut self, tiers: HashMap<TrackId, Duration>) {
        self.tiers = tiers;
        for (id, entry) in self.autoplay.iter_mut() {
            if let Some(tier) = self.tiers.get(id) {
                if *tier > entry.window {
                    entry.window = *tier;
                }
            }
        }
    }

    /// Recompute tiers from counters and apply them
    pub fn refresh_tiers(&mut self, stats: &[TrackStats]) {
        let tiers = stats
            .iter()
            .map(|s| (s.track_id.clone(), Self::compute_tier(&self.config, s)))
            .collect();
        self.apply_tiers(tiers);
    }

    pub fn mark_played_at(&mut self, id: &TrackId, now: DateTime<Utc>) {
        self.explicit.insert(
            id.clone(),
            CooldownEntry {
                last_played: now,
                window: self.config.explicit_window(),
            },
        );
        self.autoplay.insert(
            id.clone(),
            CooldownEntry {
                last_played: now,
                window: self.tier_for(id),
            },
        );
    }

    pub fn is_on_cooldown(&mut self, id: &TrackId, for_autoplay: bool) -> bool {
        self.is_on_cooldown_at(id, for_autoplay, Utc::now())
    }

    pub fn is_on_cooldown_at(
        &mut self,
        id: &TrackId,
        for_autoplay: bool,
        now: DateTime<Utc>,
    ) -> bool {
        let entries = self.scale_mut(for_autoplay);
        match entries.get(id) {
            Some(entry) if entry.active_at(now) => true,
            Some(_) => {
                entries.remove(id);
                false
            }
            None => false,
        }
    }

    /// Time left on the window, `None` when not cooling down
    pub fn remaining_at(
        &self,
        id: &TrackId,
        for_autoplay: bool,
        now: DateTime<Utc>,
    ) -> Option<Duration> {
        let entries = if for_autoplay {
            &self.autoplay
        } else {
            &self.explicit
        };
        entries
            .get(id)
            .filter(|e| e.active_at(now))
            .map(|e| e.remaining_at(now))
    }

    /// Ids currently cooling down on the given scale (prunes expired entries)
    pub fn active_ids_at(&mut self, for_autoplay: bool, now: DateTime<Utc>) -> HashSet<TrackId> {
        let entries = self.scale_mut(for_autoplay);
        entries.retain(|_, e| e.active_at(now));
        entries.keys().cloned().collect()
    }

    /// Drop every expired entry on both scales
    pub fn prune_at(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.explicit.len() + self.autoplay.len();
        self.explicit.retain(|_, e| e.active_at(now));
        self.autoplay.retain(|_, e| e.active_at(now));
        before - (self.explicit.len() + self.autoplay.len())
    }

    pub fn len(&self) -> usize {
        self.autoplay.len().max(self.explicit.len())
    }

    pub fn is_empty(&self) -> bool {
        self.autoplay.is_empty() && self.explicit.is_empty()
    }

    fn scale_mut(&mut self, for_autoplay: bool) -> &mut HashMap<TrackId, CooldownEntry> {
        if for_autoplay {
            &mut self.autoplay
        } else {
            &mut self.explicit
        }
    }
}
