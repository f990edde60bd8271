//! # MIU Common Library
//!
//! Shared code for the MIU playback engine and its tooling:
//! - Error type and result alias
//! - Configuration file discovery and TOML loading
//! - Event types (`EngineEvent`) and the `EventBus`
//! - Snapshot view types published to observers
//! - Duration conversion helpers

pub mod config;
pub mod error;
pub mod events;
pub mod time;

pub use error::{Error, Result};
