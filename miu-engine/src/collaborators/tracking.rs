//! Listen tracking seam

use crate::model::TrackId;
use crate::Result;
use async_trait::async_trait;

/// Listen history consumer and favorites source
///
/// Reports are fire-and-forget from the engine's point of view: a failing
/// tracker is logged and never blocks playback.
#[async_trait]
pub trait Tracking: Send + Sync {
    /// One listener's exposure to one play of a track
    async fn record_listen(
        &self,
        user_id: &str,
        track_id: &TrackId,
        listened_secs: f64,
        total_secs: f64,
        was_skipped: bool,
    ) -> Result<()>;

    /// Ranked favorites for a user, strongest first
    async fn get_favorites(&self, user_id: &str) -> Result<Vec<TrackId>>;
}
