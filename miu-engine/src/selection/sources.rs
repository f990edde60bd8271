//! Candidate source gathering
//!
//! Collects the raw per-source lists for one selection pass. A failing
//! source is logged and contributes nothing; the pass continues with the
//! others.

use super::selector::SourceLists;
use crate::collaborators::Tracking;
use crate::db::Store;
use crate::model::TrackId;
use std::collections::HashSet;
use tracing::warn;

pub async fn gather_sources(
    store: &dyn Store,
    tracking: &dyn Tracking,
    recommendations: Vec<TrackId>,
    listeners: &[String],
    limit: usize,
) -> SourceLists {
    let playlist = store.playlist_tracks(limit).await.unwrap_or_else(|e| {
        warn!(error = %e, "Playlist source unavailable");
        Vec::new()
    });

    let popularity = store.popular_tracks(limit).await.unwrap_or_else(|e| {
        warn!(error = %e, "Popularity source unavailable");
        Vec::new()
    });

    let random = store.random_tracks(limit).await.unwrap_or_else(|e| {
        warn!(error = %e, "Random source unavailable");
        Vec::new()
    });

    let mut per_listener = Vec::with_capacity(listeners.len());
    for user_id in listeners {
        match tracking.get_favorites(user_id).await {
            Ok(favorites) => per_listener.push(favorites),
            Err(e) => warn!(user_id = %user_id, error = %e, "Favorites unavailable"),
        }
    }

    SourceLists {
        playlist,
        favorites: interleave_favorites(per_listener, limit),
        popularity,
        recommendations,
        random,
    }
}

/// Merge ranked lists round-robin so every listener's top picks rank high
pub fn interleave_favorites(lists: Vec<Vec<TrackId>>, limit: usize) -> Vec<TrackId> {
    let mut seen = HashSet::new();
    let mut merged = Vec::new();
    let depth = lists.iter().map(Vec::len).max().unwrap_or(0);

    for rank in 0..depth {
        for list in &lists {
            if merged.len() >= limit {
                return merged;
            }
            if let Some(id) = list.get(rank) {
                if seen.insert(id.clone()) {
                    merged.push(id.clone());
                }
            }
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(ids: &[&str]) -> Vec<TrackId> {
        ids.iter().map(|id| TrackId::new(*id)).collect()
    }

    #[test]
    fn test_interleave_round_robin_without_duplicates() {
        let merged = interleave_favorites(
            vec![list(&["a", "b", "c"]), list(&["x", "a", "y"])],
            10,
        );
        let ids: Vec<&str> = merged.iter().map(|i| i.as_str()).collect();
        assert_eq!(ids, vec!["a", "x", "b", "c", "y"]);
    }

    #[test]
    fn test_interleave_respects_limit() {
        let merged = interleave_favorites(vec![list(&["a", "b", "c"]), list(&["x", "y"])], 3);
        assert_eq!(merged.len(), 3);
    }

    #[test]
    fn test_interleave_no_listeners() {
        assert!(interleave_favorites(Vec::new(), 10).is_empty());
    }
}
