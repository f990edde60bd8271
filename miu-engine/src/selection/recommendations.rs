//! Recommendation pool
//!
//! A bounded, growable list of ids related to well-liked tracks. Growth
//! picks a "seed" (a high-score track not used as a seed within the seed
//! cooldown), asks the resolver for related ids, and appends the new ones.
//! The oldest ids are evicted once the pool is full.

use crate::collaborators::MediaResolver;
use crate::config::RecommendationConfig;
use crate::db::Store;
use crate::model::TrackId;
use crate::Result;
use chrono::{DateTime, Utc};
use miu_common::time::to_chrono;
use std::collections::{HashSet, VecDeque};
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct RecommendationPool {
    ids: VecDeque<TrackId>,
    max_size: usize,
}

impl RecommendationPool {
    pub fn new(max_size: usize) -> Self {
        Self {
            ids: VecDeque::new(),
            max_size,
        }
    }

    /// Append ids not already present; returns how many were new
    pub fn extend<I>(&mut self, ids: I) -> usize
    where
        I: IntoIterator<Item = TrackId>,
    {
        let mut present: HashSet<TrackId> = self.ids.iter().cloned().collect();
        let mut added = 0;
        for id in ids {
            if present.insert(id.clone()) {
                self.ids.push_back(id);
                added += 1;
            }
        }
        while self.ids.len() > self.max_size {
            self.ids.pop_front();
        }
        added
    }

    pub fn snapshot(&self) -> Vec<TrackId> {
        self.ids.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Pick a seed eligible at `now`
pub async fn choose_seed(
    store: &dyn Store,
    config: &RecommendationConfig,
    now: DateTime<Utc>,
) -> Result<Option<TrackId>> {
    let recent = store
        .seeds_used_since(now - to_chrono(config.seed_cooldown()))
        .await?;
    let candidates = store
        .seed_candidates(config.min_seed_score, config.seed_candidates)
        .await?;
    Ok(candidates.into_iter().find(|id| !recent.contains(id)))
}

/// Grow `pool` from one fresh seed; returns the number of new ids
pub async fn refresh_recommendations(
    store: &dyn Store,
    resolver: &dyn MediaResolver,
    pool: &mut RecommendationPool,
    config: &RecommendationConfig,
    now: DateTime<Utc>,
) -> Result<usize> {
    let Some(seed) = choose_seed(store, config, now).await? else {
        debug!("No eligible recommendation seed");
        return Ok(0);
    };

    let related = resolver.get_recommendations(&seed).await?;
    store.mark_seed_used(&seed, now).await?;

    let fetched = related.len();
    let added = pool.extend(related.into_iter().filter(|id| id != &seed));
    info!(
        seed = %seed,
        fetched,
        added,
        pool_size = pool.len(),
        "Recommendation pool refreshed"
    );
    Ok(added)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extend_dedups_and_caps() {
        let mut pool = RecommendationPool::new(3);
        assert_eq!(pool.extend(["a", "b", "a"].map(TrackId::from)), 2);
        assert_eq!(pool.extend(["b", "c", "d"].map(TrackId::from)), 2);

        let ids: Vec<String> = pool.snapshot().iter().map(|i| i.to_string()).collect();
        assert_eq!(ids, vec!["b", "c", "d"], "oldest evicted first");
    }

    #[test]
    fn test_zero_capacity_pool_stays_empty() {
        let mut pool = RecommendationPool::new(0);
        pool.extend(["a"].map(TrackId::from));
        assert!(pool.is_empty());
    }
}
