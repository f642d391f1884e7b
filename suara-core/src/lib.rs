//! # suara-core
//!
//! Continuous dictation and read-aloud engine for a speech learning app.
//!
//! ## Architecture
//!
//! ```text
//! Microphone prompt ─► DictationSession ◄── RecognitionPort events
//!                           │   ▲
//!              TranscriptAccumulator  RestartScheduler (ended → delayed start)
//!                           │
//!              broadcast::Sender<TranscriptEvent / SessionStatusEvent>
//!
//! ReadAloud ─► select_voice ─► SynthesisPort ─► SpeechStatusEvent
//! ```
//!
//! Platform capabilities are traits in [`platform`]; [`runtime`] hosts both
//! controllers in one tokio task for async hosts.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod export;
pub mod ipc;
pub mod platform;
pub mod runtime;
pub mod session;
pub mod speech;
pub mod transcript;
pub mod voice;

// Convenience re-exports for downstream crates
pub use config::SuaraConfig;
pub use error::{ErrorKind, SuaraError};
pub use export::{DirectorySink, DownloadSink, ExportKind};
pub use ipc::events::{
    SessionState, SessionStatusEvent, SpeechStatus, SpeechStatusEvent, TranscriptEvent,
};
pub use platform::Platform;
pub use runtime::{PlatformEvents, SessionSnapshot, SuaraHandle, SuaraRuntime};
pub use session::DictationSession;
pub use speech::ReadAloud;
pub use transcript::{Transcript, TranscriptAccumulator};
pub use voice::{select_voice, Voice};
