//! Engine configuration
//!
//! Every tunable lives in one TOML document. All sections and fields are
//! optional; omitted values fall back to the defaults below.
//!
//! ```toml
//! [queue]
//! autoplay_target = 3
//!
//! [selector.shares]
//! playlist = 0.30
//! favorites = 0.15
//! popularity = 0.15
//! recommendations = 0.20
//! random = 0.20
//!
//! [presence]
//! grace_secs = 10
//! ```

use crate::{Error, Result};
use miu_common::config::{default_data_dir, load_toml, LoggingConfig};
use miu_common::events::AutoplaySource;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// Tolerance when checking that source shares sum to 1.0
const SHARE_SUM_TOLERANCE: f64 = 1e-6;

/// Complete engine configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub storage: StorageConfig,
    pub queue: QueueConfig,
    pub cooldown: CooldownConfig,
    pub selector: SelectorConfig,
    pub recommendations: RecommendationConfig,
    pub cache: CacheConfig,
    pub playback: PlaybackConfig,
    pub presence: PresenceConfig,
    pub publisher: PublisherConfig,
    pub logging: LoggingConfig,
}

impl EngineConfig {
    /// Load from a TOML file (missing file yields defaults) and validate
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config: EngineConfig = load_toml(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot run with; warn on suspicious ones
    pub fn validate(&self) -> Result<()> {
        if self.queue.autoplay_target == 0 {
            warn!("queue.autoplay_target is 0, autoplay will never buffer tracks");
        }
        if self.queue.refill_attempts == 0 {
            return Err(Error::Config(
                "queue.refill_attempts must be at least 1".to_string(),
            ));
        }
        if self.cache.retry_attempts == 0 {
            return Err(Error::Config(
                "cache.retry_attempts must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.playback.initial_volume) {
            return Err(Error::Config(format!(
                "playback.initial_volume {} outside 0.0-1.0",
                self.playback.initial_volume
            )));
        }
        if self.cooldown.tier_short_secs > self.cooldown.tier_medium_secs
            || self.cooldown.tier_medium_secs > self.cooldown.tier_long_secs
        {
            warn!(
                short = self.cooldown.tier_short_secs,
                medium = self.cooldown.tier_medium_secs,
                long = self.cooldown.tier_long_secs,
                "Cooldown tiers are not ordered short <= medium <= long"
            );
        }
        self.selector.validate();
        Ok(())
    }
}

/// Filesystem locations
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Data directory holding the database and audio cache
    pub data_dir: Option<PathBuf>,
    /// Explicit audio cache directory (defaults to `{data_dir}/audio-cache`)
    pub cache_dir: Option<PathBuf>,
    /// Directory the local library resolver reads from
    pub library_dir: Option<PathBuf>,
}

impl StorageConfig {
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(default_data_dir)
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir().join("miu.db")
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.cache_dir
            .clone()
            .unwrap_or_else(|| self.data_dir().join("audio-cache"))
    }

    pub fn library_dir(&self) -> PathBuf {
        self.library_dir
            .clone()
            .unwrap_or_else(|| self.data_dir().join("library"))
    }
}

/// Queue and autoplay buffer sizing
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Number of autoplay items the refill loop keeps buffered
    pub autoplay_target: usize,
    /// Failed selection attempts per refill pass before backing off
    pub refill_attempts: u32,
    /// Wait after an exhausted refill pass
    pub refill_backoff_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            autoplay_target: 3,
            refill_attempts: 3,
            refill_backoff_secs: 30,
        }
    }
}

impl QueueConfig {
    pub fn refill_backoff(&self) -> Duration {
        Duration::from_secs(self.refill_backoff_secs)
    }
}

/// Cooldown windows
///
/// Explicit requests use one fixed window. Autoplay uses a per-track tier
/// derived from the track's score and skip ratio.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CooldownConfig {
    pub explicit_secs: u64,
    pub tier_short_secs: u64,
    pub tier_medium_secs: u64,
    pub tier_long_secs: u64,
    /// Score at or above which a track gets the short tier
    pub high_score_threshold: f64,
    /// Skip ratio at or above which a track gets the long tier
    pub skip_ratio_threshold: f64,
    /// Plays required before the skip ratio is trusted
    pub min_plays_for_skip_ratio: u32,
    /// Period of the tier recomputation timer
    pub tier_refresh_secs: u64,
}

impl Default for CooldownConfig {
    fn default() -> Self {
        Self {
            explicit_secs: 60 * 60,
            tier_short_secs: 6 * 60 * 60,
            tier_medium_secs: 8 * 60 * 60,
            tier_long_secs: 10 * 60 * 60,
            high_score_threshold: 50.0,
            skip_ratio_threshold: 0.5,
            min_plays_for_skip_ratio: 3,
            tier_refresh_secs: 15 * 60,
        }
    }
}

impl CooldownConfig {
    pub fn explicit_window(&self) -> Duration {
        Duration::from_secs(self.explicit_secs)
    }

    pub fn short_tier(&self) -> Duration {
        Duration::from_secs(self.tier_short_secs)
    }

    pub fn medium_tier(&self) -> Duration {
        Duration::from_secs(self.tier_medium_secs)
    }

    pub fn long_tier(&self) -> Duration {
        Duration::from_secs(self.tier_long_secs)
    }

    pub fn tier_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.tier_refresh_secs.max(1))
    }
}

/// Probability share per autoplay source
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourceShares {
    pub playlist: f64,
    pub favorites: f64,
    pub popularity: f64,
    pub recommendations: f64,
    pub random: f64,
}

impl Default for SourceShares {
    fn default() -> Self {
        Self {
            playlist: 0.30,
            favorites: 0.15,
            popularity: 0.15,
            recommendations: 0.20,
            random: 0.20,
        }
    }
}

impl SourceShares {
    pub fn share(&self, source: AutoplaySource) -> f64 {
        match source {
            AutoplaySource::Playlist => self.playlist,
            AutoplaySource::Favorites => self.favorites,
            AutoplaySource::Popularity => self.popularity,
            AutoplaySource::Recommendations => self.recommendations,
            AutoplaySource::Random => self.random,
        }
    }

    pub fn total(&self) -> f64 {
        AutoplaySource::ALL.iter().map(|s| self.share(*s)).sum()
    }
}

/// Weighted selector tuning
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    pub shares: SourceShares,
    /// Per-rank decay applied to a listener's favorites (rank 0 is strongest)
    pub favorites_decay: f64,
    /// Maximum candidates fetched per source
    pub fetch_limit: usize,
    /// Fixed RNG seed for reproducible picks; entropy when unset
    pub rng_seed: Option<u64>,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            shares: SourceShares::default(),
            favorites_decay: 0.05,
            fetch_limit: 50,
            rng_seed: None,
        }
    }
}

impl SelectorConfig {
    /// Warn when shares do not sum to 1.0
    ///
    /// Selection still works (weights are relative), but the configured
    /// percentages no longer mean what they say.
    pub fn validate(&self) -> bool {
        let total = self.shares.total();
        let negative = AutoplaySource::ALL
            .iter()
            .any(|s| self.shares.share(*s) < 0.0);

        if negative {
            warn!("Selector shares contain a negative value, it will be treated as 0");
        }
        if (total - 1.0).abs() > SHARE_SUM_TOLERANCE {
            warn!(total, "Selector source shares do not sum to 1.0");
            return false;
        }
        !negative
    }
}

/// Recommendation pool growth
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecommendationConfig {
    /// A seed is not reused within this window
    pub seed_cooldown_secs: u64,
    /// Period of the pool growth timer
    pub growth_interval_secs: u64,
    /// Pool size cap; oldest ids are evicted first
    pub max_pool_size: usize,
    /// Minimum track score to be considered as a seed
    pub min_seed_score: f64,
    /// Number of top-scored tracks examined when choosing a seed
    pub seed_candidates: usize,
}

impl Default for RecommendationConfig {
    fn default() -> Self {
        Self {
            seed_cooldown_secs: 24 * 60 * 60,
            growth_interval_secs: 30 * 60,
            max_pool_size: 200,
            min_seed_score: 0.0,
            seed_candidates: 25,
        }
    }
}

impl RecommendationConfig {
    pub fn seed_cooldown(&self) -> Duration {
        Duration::from_secs(self.seed_cooldown_secs)
    }

    pub fn growth_interval(&self) -> Duration {
        Duration::from_secs(self.growth_interval_secs.max(1))
    }
}

/// Audio cache behaviour
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Download attempts for transient resolver failures
    pub retry_attempts: u32,
    pub retry_backoff_ms: u64,
    /// Allowed difference between probed and stored duration
    pub duration_tolerance_secs: f64,
    /// Period of the background validate-and-prune pass
    pub validate_interval_secs: u64,
    /// Extension given to completed downloads
    pub file_extension: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            retry_attempts: 3,
            retry_backoff_ms: 1000,
            duration_tolerance_secs: 1.0,
            validate_interval_secs: 6 * 60 * 60,
            file_extension: "opus".to_string(),
        }
    }
}

impl CacheConfig {
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn validate_interval(&self) -> Duration {
        Duration::from_secs(self.validate_interval_secs.max(1))
    }
}

/// Playback controller behaviour
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Voice channel passed to the transport on connect
    pub voice_channel: String,
    /// Transport errors for one item; the error reaching this count treats
    /// the item as finished
    pub max_error_retries: u32,
    pub error_retry_delay_ms: u64,
    pub reconnect_delay_ms: u64,
    /// Period of the position refresh fed to the state publisher
    pub progress_interval_ms: u64,
    pub initial_volume: f32,
    /// Autoplay enabled at startup
    pub autoplay: bool,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            voice_channel: "default".to_string(),
            max_error_retries: 3,
            error_retry_delay_ms: 2000,
            reconnect_delay_ms: 5000,
            progress_interval_ms: 5000,
            initial_volume: 0.5,
            autoplay: true,
        }
    }
}

impl PlaybackConfig {
    pub fn error_retry_delay(&self) -> Duration {
        Duration::from_millis(self.error_retry_delay_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms.max(1))
    }
}

/// Listener presence policy
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PresenceConfig {
    pub enabled: bool,
    /// Delay between the last listener leaving and the automatic pause
    pub grace_secs: u64,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            grace_secs: 10,
        }
    }
}

impl PresenceConfig {
    pub fn grace(&self) -> Duration {
        Duration::from_secs(self.grace_secs)
    }
}

/// State publisher debounce
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PublisherConfig {
    pub debounce_ms: u64,
    /// Position change that alone justifies a new snapshot
    pub position_delta_secs: f64,
    /// Broadcast channel capacity
    pub event_capacity: usize,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 1000,
            position_delta_secs: 2.0,
            event_capacity: 256,
        }
    }
}

impl PublisherConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}
