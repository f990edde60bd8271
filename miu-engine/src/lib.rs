//! MIU continuous playback engine library
//!
//! Drives a single voice channel from two FIFO queues (explicit user
//! requests, then autoplay picks), keeps a bounded buffer of weighted
//! autoplay selections, manages the local audio cache and publishes
//! debounced state snapshots.
//!
//! Entry point is [`Engine::start`], which returns a cloneable
//! [`EngineHandle`].

pub mod cache;
pub mod collaborators;
pub mod config;
pub mod db;
pub mod error;
pub mod model;
pub mod playback;
pub mod publisher;
pub mod refill;
pub mod selection;

pub use config::EngineConfig;
pub use error::{Error, Result};
pub use playback::engine::{Engine, EngineDeps, EngineHandle};
