//! Playback subsystem
//!
//! The engine actor and the pure state it drives: queues with their
//! duplicate guard, cooldown windows, the Idle/Playing/Paused controller,
//! listener presence and cancellable timers.

pub mod controller;
pub mod cooldown;
pub mod engine;
pub mod presence;
pub mod queue;
pub mod scheduler;

pub use controller::{ErrorDisposition, NowPlaying, PauseReason, PlaybackController};
pub use cooldown::CooldownTracker;
pub use engine::{Engine, EngineDeps, EngineHandle};
pub use presence::{PresenceAction, PresenceMonitor};
pub use queue::{EnqueueRejection, QueueStore};
pub use scheduler::{Scheduler, TimerHandle};
