//! SQLite store
//!
//! Schema is created on open (`CREATE TABLE IF NOT EXISTS`), so a fresh
//! data directory needs no migration step.

use super::Store;
use crate::collaborators::Tracking;
use crate::model::{
    AudioCacheEntry, RequestRecord, RequestStatus, Requester, Track, TrackId, TrackStats,
    TrackStatus,
};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use miu_common::events::{AutoplaySource, QueueOrigin};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
    SqliteSynchronous,
};
use sqlx::Row;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

/// Favorites returned per user
const FAVORITES_LIMIT: i64 = 50;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS tracks (
        track_id TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        duration_secs REAL NOT NULL DEFAULT 0,
        thumbnail TEXT,
        channel_id TEXT,
        active INTEGER NOT NULL DEFAULT 1,
        status TEXT NOT NULL DEFAULT 'standby',
        score REAL NOT NULL DEFAULT 0,
        play_count INTEGER NOT NULL DEFAULT 0,
        skip_count INTEGER NOT NULL DEFAULT 0,
        last_played TIMESTAMP,
        created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS requests (
        request_id TEXT PRIMARY KEY,
        track_id TEXT NOT NULL,
        requester_id TEXT,
        requester_name TEXT,
        origin TEXT NOT NULL,
        autoplay_source TEXT,
        requested_at TIMESTAMP NOT NULL,
        played_at TIMESTAMP,
        status TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_requests_track ON requests(track_id)",
    r#"
    CREATE TABLE IF NOT EXISTS audio_cache (
        track_id TEXT PRIMARY KEY,
        file_path TEXT NOT NULL,
        duration_secs REAL NOT NULL,
        cached_at TIMESTAMP NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS seed_history (
        track_id TEXT PRIMARY KEY,
        used_at TIMESTAMP NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS playlist (
        position INTEGER PRIMARY KEY,
        track_id TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS listens (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id TEXT NOT NULL,
        track_id TEXT NOT NULL,
        listened_secs REAL NOT NULL,
        total_secs REAL NOT NULL,
        skipped INTEGER NOT NULL,
        listened_at TIMESTAMP NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_listens_user ON listens(user_id)",
];

/// `Store` and `Tracking` over a SQLite pool
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) the database file at `path`
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(
                SqliteConnectOptions::new()
                    .filename(path)
                    .busy_timeout(Duration::from_millis(5000))
                    .journal_mode(SqliteJournalMode::Wal)
                    .synchronous(SqliteSynchronous::Normal)
                    .create_if_missing(true),
            )
            .await?;

        info!("Database ready: {}", path.display());
        Self::from_pool(pool).await
    }

    /// Private in-memory database (single connection so all queries share it)
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn init_schema(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        debug!("Schema initialized");
        Ok(())
    }
}

fn limit_param(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

fn count_from(value: i64) -> u32 {
    u32::try_from(value.max(0)).unwrap_or(u32::MAX)
}

fn parse_source(value: &str) -> Option<AutoplaySource> {
    AutoplaySource::ALL
        .iter()
        .copied()
        .find(|s| s.as_str() == value)
}

fn parse_origin(value: &str) -> QueueOrigin {
    match value {
        "autoplay" => QueueOrigin::Autoplay,
        _ => QueueOrigin::User,
    }
}

fn track_from_row(row: &SqliteRow) -> Result<Track> {
    let status: String = row.try_get("status")?;
    Ok(Track {
        id: TrackId::new(row.try_get::<String, _>("track_id")?),
        title: row.try_get("title")?,
        duration_secs: row.try_get("duration_secs")?,
        thumbnail: row.try_get("thumbnail")?,
        channel_id: row.try_get("channel_id")?,
        active: row.try_get("active")?,
        status: TrackStatus::parse(&status)
            .ok_or_else(|| Error::Internal(format!("unknown track status '{}'", status)))?,
        score: row.try_get("score")?,
        play_count: count_from(row.try_get("play_count")?),
        skip_count: count_from(row.try_get("skip_count")?),
        last_played: row.try_get("last_played")?,
    })
}

fn request_from_row(row: &SqliteRow) -> Result<RequestRecord> {
    let id: String = row.try_get("request_id")?;
    let status: String = row.try_get("status")?;
    let requester_id: Option<String> = row.try_get("requester_id")?;
    let requester_name: Option<String> = row.try_get("requester_name")?;
    let origin: String = row.try_get("origin")?;
    let source: Option<String> = row.try_get("autoplay_source")?;

    let requester = match requester_id {
        Some(user_id) => Requester::User {
            id: user_id,
            username: requester_name.unwrap_or_default(),
        },
        None => Requester::System,
    };

    Ok(RequestRecord {
        id: Uuid::parse_str(&id)
            .map_err(|e| Error::Internal(format!("bad request id '{}': {}", id, e)))?,
        track_id: TrackId::new(row.try_get::<String, _>("track_id")?),
        requester,
        origin: parse_origin(&origin),
        source: source.as_deref().and_then(parse_source),
        requested_at: row.try_get("requested_at")?,
        played_at: row.try_get("played_at")?,
        status: RequestStatus::parse(&status)
            .ok_or_else(|| Error::Internal(format!("unknown request status '{}'", status)))?,
    })
}

fn cache_entry_from_row(row: &SqliteRow) -> Result<AudioCacheEntry> {
    Ok(AudioCacheEntry {
        track_id: TrackId::new(row.try_get::<String, _>("track_id")?),
        file_path: PathBuf::from(row.try_get::<String, _>("file_path")?),
        duration_secs: row.try_get("duration_secs")?,
        cached_at: row.try_get("cached_at")?,
    })
}

fn ids_from_rows(rows: &[SqliteRow]) -> Result<Vec<TrackId>> {
    rows.iter()
        .map(|row| Ok(TrackId::new(row.try_get::<String, _>("track_id")?)))
        .collect()
}

#[async_trait]
impl Store for SqliteStore {
    async fn get_track(&self, id: &TrackId) -> Result<Option<Track>> {
        let row = sqlx::query("SELECT * FROM tracks WHERE track_id = ?")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(track_from_row).transpose()
    }

    async fn upsert_track(&self, track: &Track) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO tracks (track_id, title, duration_secs, thumbnail, channel_id, active, status, score)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(track_id) DO UPDATE SET
                title = excluded.title,
                duration_secs = excluded.duration_secs,
                thumbnail = excluded.thumbnail,
                channel_id = excluded.channel_id
            "#,
        )
        .bind(track.id.as_str())
        .bind(&track.title)
        .bind(track.duration_secs)
        .bind(&track.thumbnail)
        .bind(&track.channel_id)
        .bind(track.active)
        .bind(track.status.as_str())
        .bind(track.score)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_track_status(&self, id: &TrackId, status: TrackStatus) -> Result<()> {
        sqlx::query("UPDATE tracks SET status = ? WHERE track_id = ?")
            .bind(status.as_str())
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_track_active(&self, id: &TrackId, active: bool) -> Result<()> {
        sqlx::query("UPDATE tracks SET active = ? WHERE track_id = ?")
            .bind(active)
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_track_score(&self, id: &TrackId, score: f64) -> Result<()> {
        sqlx::query("UPDATE tracks SET score = ? WHERE track_id = ?")
            .bind(score)
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update_track_duration(&self, id: &TrackId, duration_secs: f64) -> Result<()> {
        sqlx::query("UPDATE tracks SET duration_secs = ? WHERE track_id = ?")
            .bind(duration_secs)
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn record_track_play(&self, id: &TrackId, at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            "UPDATE tracks SET play_count = play_count + 1, last_played = ? WHERE track_id = ?",
        )
        .bind(at)
        .bind(id.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_track_skip(&self, id: &TrackId) -> Result<()> {
        sqlx::query("UPDATE tracks SET skip_count = skip_count + 1 WHERE track_id = ?")
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn track_stats(&self) -> Result<Vec<TrackStats>> {
        let rows = sqlx::query(
            r#"
            SELECT track_id, score, play_count, skip_count FROM tracks
            WHERE active = 1 AND status != 'blocked'
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(TrackStats {
                    track_id: TrackId::new(row.try_get::<String, _>("track_id")?),
                    score: row.try_get("score")?,
                    play_count: count_from(row.try_get("play_count")?),
                    skip_count: count_from(row.try_get("skip_count")?),
                })
            })
            .collect()
    }

    async fn playlist_tracks(&self, limit: usize) -> Result<Vec<TrackId>> {
        let rows = sqlx::query(
            r#"
            SELECT p.track_id FROM playlist p
            JOIN tracks t ON t.track_id = p.track_id
            WHERE t.active = 1 AND t.status != 'blocked'
            ORDER BY p.position
            LIMIT ?
            "#,
        )
        .bind(limit_param(limit))
        .fetch_all(&self.pool)
        .await?;
        ids_from_rows(&rows)
    }

    async fn set_playlist(&self, ids: &[TrackId]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM playlist").execute(&mut *tx).await?;
        for (position, id) in ids.iter().enumerate() {
            sqlx::query("INSERT INTO playlist (position, track_id) VALUES (?, ?)")
                .bind(limit_param(position))
                .bind(id.as_str())
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn popular_tracks(&self, limit: usize) -> Result<Vec<(TrackId, u32)>> {
        let rows = sqlx::query(
            r#"
            SELECT track_id, play_count FROM tracks
            WHERE active = 1 AND status != 'blocked' AND play_count > 0
            ORDER BY play_count DESC, track_id
            LIMIT ?
            "#,
        )
        .bind(limit_param(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok((
                    TrackId::new(row.try_get::<String, _>("track_id")?),
                    count_from(row.try_get("play_count")?),
                ))
            })
            .collect()
    }

    async fn random_tracks(&self, limit: usize) -> Result<Vec<TrackId>> {
        let rows = sqlx::query(
            r#"
            SELECT track_id FROM tracks
            WHERE active = 1 AND status != 'blocked'
            ORDER BY RANDOM()
            LIMIT ?
            "#,
        )
        .bind(limit_param(limit))
        .fetch_all(&self.pool)
        .await?;
        ids_from_rows(&rows)
    }

    async fn seed_candidates(&self, min_score: f64, limit: usize) -> Result<Vec<TrackId>> {
        let rows = sqlx::query(
            r#"
            SELECT track_id FROM tracks
            WHERE active = 1 AND status != 'blocked' AND score >= ?
            ORDER BY score DESC, play_count DESC, track_id
            LIMIT ?
            "#,
        )
        .bind(min_score)
        .bind(limit_param(limit))
        .fetch_all(&self.pool)
        .await?;
        ids_from_rows(&rows)
    }

    async fn seeds_used_since(&self, since: DateTime<Utc>) -> Result<HashSet<TrackId>> {
        // Timestamps are compared in Rust; their text encoding does not sort reliably
        let rows = sqlx::query("SELECT track_id, used_at FROM seed_history")
            .fetch_all(&self.pool)
            .await?;

        let mut recent = HashSet::new();
        for row in &rows {
            let used_at: DateTime<Utc> = row.try_get("used_at")?;
            if used_at >= since {
                recent.insert(TrackId::new(row.try_get::<String, _>("track_id")?));
            }
        }
        Ok(recent)
    }

    async fn mark_seed_used(&self, id: &TrackId, at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO seed_history (track_id, used_at) VALUES (?, ?)
            ON CONFLICT(track_id) DO UPDATE SET used_at = excluded.used_at
            "#,
        )
        .bind(id.as_str())
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_request(&self, record: &RequestRecord) -> Result<()> {
        let (requester_id, requester_name) = match &record.requester {
            Requester::System => (None, None),
            Requester::User { id, username } => (Some(id.as_str()), Some(username.as_str())),
        };

        sqlx::query(
            r#"
            INSERT INTO requests
                (request_id, track_id, requester_id, requester_name, origin, autoplay_source,
                 requested_at, played_at, status)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.id.to_string())
        .bind(record.track_id.as_str())
        .bind(requester_id)
        .bind(requester_name)
        .bind(record.origin.to_string())
        .bind(record.source.map(|s| s.as_str()))
        .bind(record.requested_at)
        .bind(record.played_at)
        .bind(record.status.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_request_status(
        &self,
        id: Uuid,
        status: RequestStatus,
        played_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE requests SET status = ?, played_at = COALESCE(?, played_at) WHERE request_id = ?",
        )
        .bind(status.as_str())
        .bind(played_at)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_request(&self, id: Uuid) -> Result<Option<RequestRecord>> {
        let row = sqlx::query("SELECT * FROM requests WHERE request_id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(request_from_row).transpose()
    }

    async fn cache_entry(&self, id: &TrackId) -> Result<Option<AudioCacheEntry>> {
        let row = sqlx::query("SELECT * FROM audio_cache WHERE track_id = ?")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(cache_entry_from_row).transpose()
    }

    async fn put_cache_entry(&self, entry: &AudioCacheEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO audio_cache (track_id, file_path, duration_secs, cached_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(track_id) DO UPDATE SET
                file_path = excluded.file_path,
                duration_secs = excluded.duration_secs,
                cached_at = excluded.cached_at
            "#,
        )
        .bind(entry.track_id.as_str())
        .bind(entry.file_path.to_string_lossy().to_string())
        .bind(entry.duration_secs)
        .bind(entry.cached_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_cache_entry(&self, id: &TrackId) -> Result<()> {
        sqlx::query("DELETE FROM audio_cache WHERE track_id = ?")
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn cache_entries(&self) -> Result<Vec<AudioCacheEntry>> {
        let rows = sqlx::query("SELECT * FROM audio_cache ORDER BY track_id")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(cache_entry_from_row).collect()
    }
}

#[async_trait]
impl Tracking for SqliteStore {
    async fn record_listen(
        &self,
        user_id: &str,
        track_id: &TrackId,
        listened_secs: f64,
        total_secs: f64,
        was_skipped: bool,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO listens (user_id, track_id, listened_secs, total_secs, skipped, listened_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(user_id)
        .bind(track_id.as_str())
        .bind(listened_secs)
        .bind(total_secs)
        .bind(was_skipped)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_favorites(&self, user_id: &str) -> Result<Vec<TrackId>> {
        let rows = sqlx::query(
            r#"
            SELECT l.track_id, SUM(l.listened_secs) AS heard FROM listens l
            JOIN tracks t ON t.track_id = l.track_id
            WHERE l.user_id = ? AND l.skipped = 0
              AND t.active = 1 AND t.status != 'blocked'
            GROUP BY l.track_id
            ORDER BY heard DESC, l.track_id
            LIMIT ?
            "#,
        )
        .bind(user_id)
        .bind(FAVORITES_LIMIT)
        .fetch_all(&self.pool)
        .await?;
        ids_from_rows(&rows)
    }
}
