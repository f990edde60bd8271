//! External collaborators
//!
//! The engine talks to the outside world through four seams:
//! - [`VoiceTransport`] / [`VoiceConnection`]: plays a local file to listeners
//! - [`MediaResolver`]: metadata, downloads and recommendations for an id
//! - [`Tracking`]: listen history and per-user favorites
//! - [`DurationProbe`]: reads the real duration of a cached file
//!
//! Each seam ships with a reference implementation so the binary runs
//! without any network service.

mod clock;
mod library;
mod probe;
mod resolver;
mod tracking;
mod transport;

pub use clock::ClockTransport;
pub use library::LocalLibraryResolver;
pub use probe::{DurationProbe, SymphoniaProbe};
pub use resolver::{MediaInfo, MediaResolver, ResolverError};
pub use tracking::Tracking;
pub use transport::{
    PlayResource, PlaybackId, TransportError, TransportEvent, VoiceConnection, VoiceTransport,
};
