//! Playback engine actor
//!
//! One task owns every queue, the controller state and the voice
//! connection. Everything else talks to it through [`EngineHandle`], whose
//! calls become [`EngineCommand`] messages processed strictly in order, so
//! two `play_next` runs can never overlap.
//!
//! **Module Structure:**
//! - `core.rs` - EngineCore struct, startup wiring, dispatch loop, teardown
//! - `commands.rs` - Command messages and the refill worker's link back in
//! - `handle.rs` - Public cloneable handle
//! - `queue.rs` - Enqueue, removal, autoplay toggling, selection context
//! - `playback.rs` - play_next, completion, skip, pause/resume, transport
//!   and presence events

mod commands;
mod core;
mod handle;
mod playback;
mod queue;

pub use commands::{EngineCommand, EngineLink};
pub use self::core::{Engine, EngineDeps};
pub use handle::EngineHandle;
