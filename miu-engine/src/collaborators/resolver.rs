//! Media resolver seam

use crate::model::TrackId;
use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

/// Metadata for a single media id
#[derive(Debug, Clone, PartialEq)]
pub struct MediaInfo {
    pub title: String,
    pub duration_secs: f64,
    pub thumbnail: Option<String>,
    pub channel_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolverError {
    /// Worth retrying (network hiccup, rate limit)
    #[error("transient resolver failure: {0}")]
    Transient(String),

    /// Media removed, private or region-locked; never retried
    #[error("media unavailable: {0}")]
    Unavailable(String),
}

impl ResolverError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ResolverError::Transient(_))
    }
}

/// Resolves ids to metadata, audio files and related ids
#[async_trait]
pub trait MediaResolver: Send + Sync {
    async fn get_info(&self, id: &TrackId) -> Result<MediaInfo, ResolverError>;

    /// Write the audio for `id` to exactly `dest`
    async fn download(&self, id: &TrackId, dest: &Path) -> Result<(), ResolverError>;

    /// Related ids for growing the recommendation pool
    async fn get_recommendations(&self, seed: &TrackId) -> Result<Vec<TrackId>, ResolverError>;
}
