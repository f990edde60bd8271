//! Autoplay candidate selection
//!
//! **Responsibilities:**
//! - Gather per-source candidate lists (playlist, favorites, popularity,
//!   recommendations, random)
//! - Fuse them into one weighted pool and draw without replacement
//! - Maintain the recommendation pool from rotating seeds

pub mod recommendations;
pub mod selector;
pub mod sources;

pub use recommendations::{refresh_recommendations, RecommendationPool};
pub use selector::{
    build_candidate_pool, pick_candidates, pick_without_replacement, SelectionCandidate,
    SourceLists,
};
pub use sources::gather_sources;
