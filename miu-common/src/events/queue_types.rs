//! Queue type definitions
//!
//! Supporting types for queue origin, autoplay source tags and change triggers.

use serde::{Deserialize, Serialize};

/// Which queue an item was scheduled through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueOrigin {
    /// Explicit play request from a user
    User,
    /// System-initiated autoplay pick
    Autoplay,
}

impl std::fmt::Display for QueueOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueOrigin::User => write!(f, "user"),
            QueueOrigin::Autoplay => write!(f, "autoplay"),
        }
    }
}

/// Candidate pool an autoplay pick was drawn from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoplaySource {
    Playlist,
    Favorites,
    Popularity,
    Recommendations,
    Random,
}

impl AutoplaySource {
    /// All sources in precedence order (earlier sources win cross-source duplicates)
    pub const ALL: [AutoplaySource; 5] = [
        AutoplaySource::Playlist,
        AutoplaySource::Favorites,
        AutoplaySource::Popularity,
        AutoplaySource::Recommendations,
        AutoplaySource::Random,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AutoplaySource::Playlist => "playlist",
            AutoplaySource::Favorites => "favorites",
            AutoplaySource::Popularity => "popularity",
            AutoplaySource::Recommendations => "recommendations",
            AutoplaySource::Random => "random",
        }
    }
}

impl std::fmt::Display for AutoplaySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why the queue changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum QueueChangeTrigger {
    UserEnqueue,
    UserRemove,
    AutoplayRefill,
    TrackAdvance,
    AutoplayDisabled,
    Shutdown,
}

impl std::fmt::Display for QueueChangeTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueChangeTrigger::UserEnqueue => write!(f, "UserEnqueue"),
            QueueChangeTrigger::UserRemove => write!(f, "UserRemove"),
            QueueChangeTrigger::AutoplayRefill => write!(f, "AutoplayRefill"),
            QueueChangeTrigger::TrackAdvance => write!(f, "TrackAdvance"),
            QueueChangeTrigger::AutoplayDisabled => write!(f, "AutoplayDisabled"),
            QueueChangeTrigger::Shutdown => write!(f, "Shutdown"),
        }
    }
}
