//! In-memory store for engine tests
//!
//! Implements `Store` and `Tracking` over plain maps so tests can inspect
//! exactly what the engine wrote. No background threads, which keeps it
//! usable under a paused tokio clock.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use miu_engine::collaborators::{MediaInfo, Tracking};
use miu_engine::db::Store;
use miu_engine::model::{
    AudioCacheEntry, RequestRecord, RequestStatus, Track, TrackId, TrackStats, TrackStatus,
};
use miu_engine::Result;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use uuid::Uuid;

/// One `record_listen` call
#[derive(Debug, Clone, PartialEq)]
pub struct Listen {
    pub user_id: String,
    pub track_id: TrackId,
    pub listened_secs: f64,
    pub total_secs: f64,
    pub skipped: bool,
}

#[derive(Default)]
struct Inner {
    tracks: HashMap<TrackId, Track>,
    requests: HashMap<Uuid, RequestRecord>,
    cache: HashMap<TrackId, AudioCacheEntry>,
    seeds: HashMap<TrackId, DateTime<Utc>>,
    playlist: Vec<TrackId>,
    listens: Vec<Listen>,
    favorites: HashMap<String, Vec<TrackId>>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a selectable track with the given duration
    pub fn add_track(&self, id: &str, duration_secs: f64) -> Track {
        let track = Track::from_info(
            TrackId::new(id),
            &MediaInfo {
                title: format!("Title {id}"),
                duration_secs,
                thumbnail: None,
                channel_id: None,
            },
        );
        self.put_track(track.clone());
        track
    }

    pub fn put_track(&self, track: Track) {
        self.inner
            .lock()
            .unwrap()
            .tracks
            .insert(track.id.clone(), track);
    }

    pub fn track(&self, id: &str) -> Option<Track> {
        self.inner.lock().unwrap().tracks.get(&TrackId::new(id)).cloned()
    }

    pub fn playlist(&self, ids: &[&str]) {
        self.inner.lock().unwrap().playlist = ids.iter().map(|id| TrackId::new(*id)).collect();
    }

    pub fn set_favorites(&self, user: &str, ids: &[&str]) {
        self.inner
            .lock()
            .unwrap()
            .favorites
            .insert(user.to_string(), ids.iter().map(|id| TrackId::new(*id)).collect());
    }

    pub fn requests(&self) -> Vec<RequestRecord> {
        let mut records: Vec<_> = self.inner.lock().unwrap().requests.values().cloned().collect();
        records.sort_by_key(|r| r.requested_at);
        records
    }

    /// Statuses of every request for `track`, oldest first
    pub fn request_statuses(&self, track: &str) -> Vec<RequestStatus> {
        self.requests()
            .into_iter()
            .filter(|r| r.track_id.as_str() == track)
            .map(|r| r.status)
            .collect()
    }

    pub fn listens(&self) -> Vec<Listen> {
        self.inner.lock().unwrap().listens.clone()
    }

    pub fn cache_entry_for(&self, id: &str) -> Option<AudioCacheEntry> {
        self.inner.lock().unwrap().cache.get(&TrackId::new(id)).cloned()
    }

    pub fn insert_cache_entry(&self, entry: AudioCacheEntry) {
        self.inner
            .lock()
            .unwrap()
            .cache
            .insert(entry.track_id.clone(), entry);
    }

    fn selectable(&self) -> Vec<Track> {
        let inner = self.inner.lock().unwrap();
        let mut tracks: Vec<Track> = inner
            .tracks
            .values()
            .filter(|t| t.is_selectable())
            .cloned()
            .collect();
        tracks.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));
        tracks
    }

    fn update<F: FnOnce(&mut Track)>(&self, id: &TrackId, f: F) {
        if let Some(track) = self.inner.lock().unwrap().tracks.get_mut(id) {
            f(track);
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_track(&self, id: &TrackId) -> Result<Option<Track>> {
        Ok(self.inner.lock().unwrap().tracks.get(id).cloned())
    }

    async fn upsert_track(&self, track: &Track) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        match inner.tracks.get_mut(&track.id) {
            Some(existing) => {
                existing.title = track.title.clone();
                existing.duration_secs = track.duration_secs;
                existing.thumbnail = track.thumbnail.clone();
                existing.channel_id = track.channel_id.clone();
            }
            None => {
                inner.tracks.insert(track.id.clone(), track.clone());
            }
        }
        Ok(())
    }

    async fn set_track_status(&self, id: &TrackId, status: TrackStatus) -> Result<()> {
        self.update(id, |t| t.status = status);
        Ok(())
    }

    async fn set_track_active(&self, id: &TrackId, active: bool) -> Result<()> {
        self.update(id, |t| t.active = active);
        Ok(())
    }

    async fn set_track_score(&self, id: &TrackId, score: f64) -> Result<()> {
        self.update(id, |t| t.score = score);
        Ok(())
    }

    async fn update_track_duration(&self, id: &TrackId, duration_secs: f64) -> Result<()> {
        self.update(id, |t| t.duration_secs = duration_secs);
        Ok(())
    }

    async fn record_track_play(&self, id: &TrackId, at: DateTime<Utc>) -> Result<()> {
        self.update(id, |t| {
            t.play_count += 1;
            t.last_played = Some(at);
        });
        Ok(())
    }

    async fn record_track_skip(&self, id: &TrackId) -> Result<()> {
        self.update(id, |t| t.skip_count += 1);
        Ok(())
    }

    async fn track_stats(&self) -> Result<Vec<TrackStats>> {
        Ok(self.selectable().iter().map(TrackStats::from).collect())
    }

    async fn playlist_tracks(&self, limit: usize) -> Result<Vec<TrackId>> {
        let selectable: HashSet<TrackId> = self.selectable().into_iter().map(|t| t.id).collect();
        let playlist = self.inner.lock().unwrap().playlist.clone();
        Ok(playlist
            .into_iter()
            .filter(|id| selectable.contains(id))
            .take(limit)
            .collect())
    }

    async fn set_playlist(&self, ids: &[TrackId]) -> Result<()> {
        self.inner.lock().unwrap().playlist = ids.to_vec();
        Ok(())
    }

    async fn popular_tracks(&self, limit: usize) -> Result<Vec<(TrackId, u32)>> {
        let mut tracks: Vec<Track> = self
            .selectable()
            .into_iter()
            .filter(|t| t.play_count > 0)
            .collect();
        tracks.sort_by(|a, b| b.play_count.cmp(&a.play_count));
        Ok(tracks
            .into_iter()
            .take(limit)
            .map(|t| (t.id, t.play_count))
            .collect())
    }

    async fn random_tracks(&self, limit: usize) -> Result<Vec<TrackId>> {
        Ok(self
            .selectable()
            .into_iter()
            .take(limit)
            .map(|t| t.id)
            .collect())
    }

    async fn seed_candidates(&self, min_score: f64, limit: usize) -> Result<Vec<TrackId>> {
        let mut tracks: Vec<Track> = self
            .selectable()
            .into_iter()
            .filter(|t| t.score >= min_score)
            .collect();
        tracks.sort_by(|a, b| b.score.total_cmp(&a.score));
        Ok(tracks.into_iter().take(limit).map(|t| t.id).collect())
    }

    async fn seeds_used_since(&self, since: DateTime<Utc>) -> Result<HashSet<TrackId>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .seeds
            .iter()
            .filter(|(_, at)| **at >= since)
            .map(|(id, _)| id.clone())
            .collect())
    }

    async fn mark_seed_used(&self, id: &TrackId, at: DateTime<Utc>) -> Result<()> {
        self.inner.lock().unwrap().seeds.insert(id.clone(), at);
        Ok(())
    }

    async fn insert_request(&self, record: &RequestRecord) -> Result<()> {
        self.inner
            .lock()
            .unwrap()
            .requests
            .insert(record.id, record.clone());
        Ok(())
    }

    async fn update_request_status(
        &self,
        id: Uuid,
        status: RequestStatus,
        played_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        if let Some(record) = self.inner.lock().unwrap().requests.get_mut(&id) {
            record.status = status;
            if played_at.is_some() {
                record.played_at = played_at;
            }
        }
        Ok(())
    }

    async fn get_request(&self, id: Uuid) -> Result<Option<RequestRecord>> {
        Ok(self.inner.lock().unwrap().requests.get(&id).cloned())
    }

    async fn cache_entry(&self, id: &TrackId) -> Result<Option<AudioCacheEntry>> {
        Ok(self.inner.lock().unwrap().cache.get(id).cloned())
    }

    async fn put_cache_entry(&self, entry: &AudioCacheEntry) -> Result<()> {
        self.insert_cache_entry(entry.clone());
        Ok(())
    }

    async fn delete_cache_entry(&self, id: &TrackId) -> Result<()> {
        self.inner.lock().unwrap().cache.remove(id);
        Ok(())
    }

    async fn cache_entries(&self) -> Result<Vec<AudioCacheEntry>> {
        Ok(self.inner.lock().unwrap().cache.values().cloned().collect())
    }
}

#[async_trait]
impl Tracking for MemoryStore {
    async fn record_listen(
        &self,
        user_id: &str,
        track_id: &TrackId,
        listened_secs: f64,
        total_secs: f64,
        was_skipped: bool,
    ) -> Result<()> {
        self.inner.lock().unwrap().listens.push(Listen {
            user_id: user_id.to_string(),
            track_id: track_id.clone(),
            listened_secs,
            total_secs,
            skipped: was_skipped,
        });
        Ok(())
    }

    async fn get_favorites(&self, user_id: &str) -> Result<Vec<TrackId>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .favorites
            .get(user_id)
            .cloned()
            .unwrap_or_default())
    }
}
