//! Persistence layer
//!
//! **Responsibilities:**
//! - `Store`: repository trait the engine reads and writes through
//! - `SqliteStore`: sqlx/SQLite implementation (also a `Tracking` backend)
//! - `Persister`: ordered background writer for best-effort updates

mod persister;
mod sqlite;

pub use persister::{PersistOp, Persister};
pub use sqlite::SqliteStore;

use crate::model::{
    AudioCacheEntry, RequestRecord, RequestStatus, Track, TrackId, TrackStats, TrackStatus,
};
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use uuid::Uuid;

/// Repository for tracks, requests, cache entries and selection sources
///
/// Source queries (`playlist_tracks`, `popular_tracks`, `random_tracks`,
/// `seed_candidates`) only return selectable tracks: active and not blocked.
#[async_trait]
pub trait Store: Send + Sync {
    // Tracks
    async fn get_track(&self, id: &TrackId) -> Result<Option<Track>>;

    /// Insert a track or refresh its metadata, keeping counters and status
    async fn upsert_track(&self, track: &Track) -> Result<()>;

    async fn set_track_status(&self, id: &TrackId, status: TrackStatus) -> Result<()>;

    async fn set_track_active(&self, id: &TrackId, active: bool) -> Result<()>;

    async fn set_track_score(&self, id: &TrackId, score: f64) -> Result<()>;

    async fn update_track_duration(&self, id: &TrackId, duration_secs: f64) -> Result<()>;

    /// Increment play count and stamp `last_played`
    async fn record_track_play(&self, id: &TrackId, at: DateTime<Utc>) -> Result<()>;

    async fn record_track_skip(&self, id: &TrackId) -> Result<()>;

    /// Counters for every selectable track
    async fn track_stats(&self) -> Result<Vec<TrackStats>>;

    // Selection sources
    async fn playlist_tracks(&self, limit: usize) -> Result<Vec<TrackId>>;

    async fn set_playlist(&self, ids: &[TrackId]) -> Result<()>;

    /// Tracks ordered by play count, with the count
    async fn popular_tracks(&self, limit: usize) -> Result<Vec<(TrackId, u32)>>;

    async fn random_tracks(&self, limit: usize) -> Result<Vec<TrackId>>;

    /// Highest-scored tracks at or above `min_score`
    async fn seed_candidates(&self, min_score: f64, limit: usize) -> Result<Vec<TrackId>>;

    async fn seeds_used_since(&self, since: DateTime<Utc>) -> Result<HashSet<TrackId>>;

    async fn mark_seed_used(&self, id: &TrackId, at: DateTime<Utc>) -> Result<()>;

    // Requests
    async fn insert_request(&self, record: &RequestRecord) -> Result<()>;

    async fn update_request_status(
        &self,
        id: Uuid,
        status: RequestStatus,
        played_at: Option<DateTime<Utc>>,
    ) -> Result<()>;

    async fn get_request(&self, id: Uuid) -> Result<Option<RequestRecord>>;

    // Audio cache
    async fn cache_entry(&self, id: &TrackId) -> Result<Option<AudioCacheEntry>>;

    async fn put_cache_entry(&self, entry: &AudioCacheEntry) -> Result<()>;

    async fn delete_cache_entry(&self, id: &TrackId) -> Result<()>;

    async fn cache_entries(&self) -> Result<Vec<AudioCacheEntry>>;
}
