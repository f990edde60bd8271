//! Core domain types
//!
//! Tracks, queue items, request records and cache entries as the engine
//! sees them. Persistence mapping lives in `db::sqlite`.

use crate::collaborators::MediaInfo;
use chrono::{DateTime, Utc};
use miu_common::events::{AutoplaySource, QueueOrigin, RequesterView, TrackView};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

/// Opaque external media identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(String);

impl TrackId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Filesystem-safe stem for cache file names
    ///
    /// ASCII alphanumerics and `-` pass through; every other byte, `_`
    /// included, becomes `_XX` (uppercase hex), so distinct ids never
    /// share a stem.
    pub fn file_stem(&self) -> String {
        let mut stem = String::with_capacity(self.0.len());
        for byte in self.0.bytes() {
            if byte.is_ascii_alphanumeric() || byte == b'-' {
                stem.push(byte as char);
            } else {
                stem.push_str(&format!("_{:02X}", byte));
            }
        }
        stem
    }

    /// Inverse of [`TrackId::file_stem`]; `None` for names the cache never writes
    pub fn from_file_stem(stem: &str) -> Option<Self> {
        let bytes = stem.as_bytes();
        let mut raw = Vec::with_capacity(bytes.len());
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i] == b'_' {
                let hex = stem.get(i + 1..i + 3)?;
                raw.push(u8::from_str_radix(hex, 16).ok()?);
                i += 3;
            } else {
                raw.push(bytes[i]);
                i += 1;
            }
        }
        let id = Self(String::from_utf8(raw).ok()?);
        (id.file_stem() == stem).then_some(id)
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TrackId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for TrackId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Persisted track status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackStatus {
    Standby,
    Playing,
    /// Excluded from every selection path
    Blocked,
}

impl TrackStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackStatus::Standby => "standby",
            TrackStatus::Playing => "playing",
            TrackStatus::Blocked => "blocked",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "standby" => Some(TrackStatus::Standby),
            "playing" => Some(TrackStatus::Playing),
            "blocked" => Some(TrackStatus::Blocked),
            _ => None,
        }
    }
}

/// Track row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: TrackId,
    pub title: String,
    pub duration_secs: f64,
    pub thumbnail: Option<String>,
    pub channel_id: Option<String>,
    /// False once the resolver reports the media unavailable
    pub active: bool,
    pub status: TrackStatus,
    /// Popularity score maintained by the tracking service
    pub score: f64,
    pub play_count: u32,
    pub skip_count: u32,
    pub last_played: Option<DateTime<Utc>>,
}

impl Track {
    pub fn from_info(id: TrackId, info: &MediaInfo) -> Self {
        Self {
            id,
            title: info.title.clone(),
            duration_secs: info.duration_secs,
            thumbnail: info.thumbnail.clone(),
            channel_id: info.channel_id.clone(),
            active: true,
            status: TrackStatus::Standby,
            score: 0.0,
            play_count: 0,
            skip_count: 0,
            last_played: None,
        }
    }

    /// Fraction of plays that ended in a skip
    pub fn skip_ratio(&self) -> f64 {
        if self.play_count == 0 {
            0.0
        } else {
            f64::from(self.skip_count) / f64::from(self.play_count)
        }
    }

    /// Eligible for requests and autoplay
    pub fn is_selectable(&self) -> bool {
        self.active && self.status != TrackStatus::Blocked
    }
}

/// Counters feeding the autoplay cooldown tier
#[derive(Debug, Clone, PartialEq)]
pub struct TrackStats {
    pub track_id: TrackId,
    pub score: f64,
    pub play_count: u32,
    pub skip_count: u32,
}

impl From<&Track> for TrackStats {
    fn from(track: &Track) -> Self {
        Self {
            track_id: track.id.clone(),
            score: track.score,
            play_count: track.play_count,
            skip_count: track.skip_count,
        }
    }
}

/// Who asked for a queue item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Requester {
    /// Autoplay (no human requester)
    System,
    User { id: String, username: String },
}

impl Requester {
    pub fn user(id: impl Into<String>, username: impl Into<String>) -> Self {
        Requester::User {
            id: id.into(),
            username: username.into(),
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        match self {
            Requester::System => None,
            Requester::User { id, .. } => Some(id),
        }
    }

    pub fn view(&self) -> Option<RequesterView> {
        match self {
            Requester::System => None,
            Requester::User { id, username } => Some(RequesterView {
                id: id.clone(),
                username: username.clone(),
            }),
        }
    }
}

/// One entry in the user or autoplay queue
#[derive(Debug, Clone, PartialEq)]
pub struct QueueItem {
    /// Request record id (also identifies the queue entry)
    pub request_id: Uuid,
    pub track_id: TrackId,
    pub title: String,
    pub thumbnail: Option<String>,
    pub duration_secs: f64,
    pub requester: Requester,
    pub enqueued_at: DateTime<Utc>,
    pub origin: QueueOrigin,
    /// Autoplay source that produced this item
    pub source: Option<AutoplaySource>,
}

impl QueueItem {
    pub fn for_user(track: &Track, requester: Requester) -> Self {
        Self::build(track, requester, QueueOrigin::User, None)
    }

    pub fn for_autoplay(track: &Track, source: AutoplaySource) -> Self {
        Self::build(track, Requester::System, QueueOrigin::Autoplay, Some(source))
    }

    fn build(
        track: &Track,
        requester: Requester,
        origin: QueueOrigin,
        source: Option<AutoplaySource>,
    ) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            track_id: track.id.clone(),
            title: track.title.clone(),
            thumbnail: track.thumbnail.clone(),
            duration_secs: track.duration_secs,
            requester,
            enqueued_at: Utc::now(),
            origin,
            source,
        }
    }

    pub fn is_autoplay(&self) -> bool {
        self.origin == QueueOrigin::Autoplay
    }

    /// Client-facing representation
    pub fn view(&self) -> TrackView {
        TrackView {
            track_id: self.track_id.to_string(),
            title: self.title.clone(),
            duration: self.duration_secs,
            thumbnail: self.thumbnail.clone(),
            requested_by: self.requester.view(),
            requested_at: self.enqueued_at,
            is_autoplay: self.is_autoplay(),
            autoplay_source: self.source,
        }
    }

    /// Initial persisted record for this item
    pub fn request_record(&self) -> RequestRecord {
        RequestRecord {
            id: self.request_id,
            track_id: self.track_id.clone(),
            requester: self.requester.clone(),
            origin: self.origin,
            source: self.source,
            requested_at: self.enqueued_at,
            played_at: None,
            status: if self.is_autoplay() {
                RequestStatus::Pending
            } else {
                RequestStatus::Queued
            },
        }
    }
}

/// Request lifecycle
///
/// User requests enter as `Queued`, autoplay picks as `Pending`. Both become
/// `Playing` when dequeued and end as `Completed`, `Skipped` or `Expired`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Queued,
    Playing,
    Completed,
    Skipped,
    Expired,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Queued => "queued",
            RequestStatus::Playing => "playing",
            RequestStatus::Completed => "completed",
            RequestStatus::Skipped => "skipped",
            RequestStatus::Expired => "expired",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(RequestStatus::Pending),
            "queued" => Some(RequestStatus::Queued),
            "playing" => Some(RequestStatus::Playing),
            "completed" => Some(RequestStatus::Completed),
            "skipped" => Some(RequestStatus::Skipped),
            "expired" => Some(RequestStatus::Expired),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RequestStatus::Completed | RequestStatus::Skipped | RequestStatus::Expired
        )
    }
}

/// Persisted request
#[derive(Debug, Clone, PartialEq)]
pub struct RequestRecord {
    pub id: Uuid,
    pub track_id: TrackId,
    pub requester: Requester,
    pub origin: QueueOrigin,
    pub source: Option<AutoplaySource>,
    pub requested_at: DateTime<Utc>,
    pub played_at: Option<DateTime<Utc>>,
    pub status: RequestStatus,
}

/// Audio cache row
#[derive(Debug, Clone, PartialEq)]
pub struct AudioCacheEntry {
    pub track_id: TrackId,
    pub file_path: PathBuf,
    pub duration_secs: f64,
    pub cached_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(id: &str) -> Track {
        Track::from_info(
            TrackId::new(id),
            &MediaInfo {
                title: format!("Song {}", id),
                duration_secs: 180.0,
                thumbnail: Some("https://img/x.jpg".to_string()),
                channel_id: None,
            },
        )
    }

    #[test]
    fn test_file_stem_escapes_unsafe_characters() {
        assert_eq!(TrackId::new("dQw4w9WgXcQ").file_stem(), "dQw4w9WgXcQ");
        assert_eq!(TrackId::new("a-b").file_stem(), "a-b");
        assert_eq!(
            TrackId::new("../etc/passwd").file_stem(),
            "_2E_2E_2Fetc_2Fpasswd"
        );
    }

    #[test]
    fn test_file_stem_keeps_ids_distinct() {
        let ids = ["x.y", "x_y", "x_2Ey", "x y", "x/y", "é"];
        let stems: std::collections::HashSet<String> =
            ids.iter().map(|id| TrackId::new(*id).file_stem()).collect();
        assert_eq!(stems.len(), ids.len());
        assert_eq!(TrackId::new("é").file_stem(), "_C3_A9");
    }

    #[test]
    fn test_from_file_stem_inverts_file_stem() {
        for raw in ["dQw4w9WgXcQ", "x.y", "x_y", "a b/c", "é"] {
            let id = TrackId::new(raw);
            assert_eq!(TrackId::from_file_stem(&id.file_stem()), Some(id));
        }
        assert_eq!(TrackId::from_file_stem("x_y"), None);
        assert_eq!(TrackId::from_file_stem("_41"), None);
        assert_eq!(TrackId::from_file_stem("bad_2"), None);
    }

    #[test]
    fn test_skip_ratio_handles_zero_plays() {
        let mut t = track("a");
        assert_eq!(t.skip_ratio(), 0.0);
        t.play_count = 4;
        t.skip_count = 3;
        assert_eq!(t.skip_ratio(), 0.75);
    }

    #[test]
    fn test_blocked_or_inactive_not_selectable() {
        let mut t = track("a");
        assert!(t.is_selectable());
        t.status = TrackStatus::Blocked;
        assert!(!t.is_selectable());
        t.status = TrackStatus::Standby;
        t.active = false;
        assert!(!t.is_selectable());
    }

    #[test]
    fn test_initial_request_status_depends_on_origin() {
        let t = track("a");
        let user = QueueItem::for_user(&t, Requester::user("u1", "alice"));
        let auto = QueueItem::for_autoplay(&t, AutoplaySource::Random);

        assert_eq!(user.request_record().status, RequestStatus::Queued);
        assert_eq!(auto.request_record().status, RequestStatus::Pending);
        assert_ne!(user.request_id, auto.request_id);
    }

    #[test]
    fn test_view_marks_autoplay_items() {
        let t = track("a");
        let view = QueueItem::for_autoplay(&t, AutoplaySource::Favorites).view();
        assert!(view.is_autoplay);
        assert!(view.requested_by.is_none());
        assert_eq!(view.autoplay_source, Some(AutoplaySource::Favorites));
        assert_eq!(view.track_id, "a");
    }
}
