//! Weighted selector
//!
//! Fuses the five autoplay sources into one candidate pool and draws from
//! it by roulette wheel.
//!
//! **Weighting:**
//! - Each source's candidates together carry exactly that source's share
//! - Within a source, per-candidate factors shift weight between candidates:
//!   favorites decay per rank, popularity gets `1 + ln(1 + plays)`,
//!   playlist / recommendations / random stay flat
//! - Excluded ids (queued, playing, cooling down) never enter the pool
//! - An id listed by several sources counts once, for the earliest source
//!   in [`AutoplaySource::ALL`] order

use crate::config::SelectorConfig;
use crate::model::TrackId;
use miu_common::events::AutoplaySource;
use rand::Rng;
use std::collections::HashSet;

/// One weighted entry of a selection pass
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionCandidate {
    pub track_id: TrackId,
    pub weight: f64,
    pub source: AutoplaySource,
}

/// Raw candidate lists gathered for one selection pass
#[derive(Debug, Clone, Default)]
pub struct SourceLists {
    pub playlist: Vec<TrackId>,
    /// Ranked, strongest first
    pub favorites: Vec<TrackId>,
    /// With play counts
    pub popularity: Vec<(TrackId, u32)>,
    pub recommendations: Vec<TrackId>,
    pub random: Vec<TrackId>,
}

impl SourceLists {
    /// (id, factor) pairs for one source before normalization
    fn factors(&self, source: AutoplaySource, favorites_decay: f64) -> Vec<(TrackId, f64)> {
        match source {
            AutoplaySource::Playlist => flat(&self.playlist),
            AutoplaySource::Recommendations => flat(&self.recommendations),
            AutoplaySource::Random => flat(&self.random),
            AutoplaySource::Favorites => {
                let keep = 1.0 - favorites_decay.clamp(0.0, 1.0);
                self.favorites
                    .iter()
                    .enumerate()
                    .map(|(rank, id)| (id.clone(), keep.powi(rank_exponent(rank))))
                    .collect()
            }
            AutoplaySource::Popularity => self
                .popularity
                .iter()
                .map(|(id, plays)| (id.clone(), 1.0 + (1.0 + f64::from(*plays)).ln()))
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.playlist.is_empty()
            && self.favorites.is_empty()
            && self.popularity.is_empty()
            && self.recommendations.is_empty()
            && self.random.is_empty()
    }
}

fn flat(ids: &[TrackId]) -> Vec<(TrackId, f64)> {
    ids.iter().map(|id| (id.clone(), 1.0)).collect()
}

fn rank_exponent(rank: usize) -> i32 {
    i32::try_from(rank).unwrap_or(i32::MAX)
}

/// Build the weighted pool for one pass
pub fn build_candidate_pool<F>(
    lists: &SourceLists,
    config: &SelectorConfig,
    is_excluded: F,
) -> Vec<SelectionCandidate>
where
    F: Fn(&TrackId) -> bool,
{
    let mut seen: HashSet<TrackId> = HashSet::new();
    let mut pool = Vec::new();

    for source in AutoplaySource::ALL {
        let share = config.shares.share(source).max(0.0);
        if share == 0.0 {
            continue;
        }

        let mut entries: Vec<(TrackId, f64)> = Vec::new();
        for (id, factor) in lists.factors(source, config.favorites_decay) {
            if is_excluded(&id) || seen.contains(&id) {
                continue;
            }
            if factor.is_finite() && factor > 0.0 {
                seen.insert(id.clone());
                entries.push((id, factor));
            }
        }

        let total: f64 = entries.iter().map(|(_, f)| f).sum();
        if total <= 0.0 {
            continue;
        }

        pool.extend(entries.into_iter().map(|(track_id, factor)| SelectionCandidate {
            track_id,
            weight: share * factor / total,
            source,
        }));
    }

    pool
}

/// Draw up to `count` distinct candidates, probability proportional to weight
///
/// Never fails: an empty pool yields an empty result, and a draw that finds
/// no winner (all-zero weights, float rounding) takes the first remaining
/// candidate.
pub fn pick_candidates<R>(
    pool: &[SelectionCandidate],
    rng: &mut R,
    count: usize,
) -> Vec<SelectionCandidate>
where
    R: Rng + ?Sized,
{
    let mut remaining: Vec<&SelectionCandidate> = pool.iter().collect();
    let mut picked = Vec::with_capacity(count.min(pool.len()));

    while picked.len() < count && !remaining.is_empty() {
        let total: f64 = remaining
            .iter()
            .map(|c| sanitized_weight(c.weight))
            .sum();

        let mut winner = 0;
        if total > 0.0 {
            let mut target = rng.gen::<f64>() * total;
            for (index, candidate) in remaining.iter().enumerate() {
                let weight = sanitized_weight(candidate.weight);
                if target < weight {
                    winner = index;
                    break;
                }
                target -= weight;
            }
        }

        picked.push(remaining.remove(winner).clone());
    }

    picked
}

/// Ids of `pick_candidates`
pub fn pick_without_replacement<R>(
    pool: &[SelectionCandidate],
    rng: &mut R,
    count: usize,
) -> Vec<TrackId>
where
    R: Rng + ?Sized,
{
    pick_candidates(pool, rng, count)
        .into_iter()
        .map(|c| c.track_id)
        .collect()
}

fn sanitized_weight(weight: f64) -> f64 {
    if weight.is_finite() && weight > 0.0 {
        weight
    } else {
        0.0
    }
}
