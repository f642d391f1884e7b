//! Event types emitted to the UI surface.
//!
//! ## Channels
//!
//! | Event | Subscribe with |
//! |-------|----------------|
//! | `TranscriptEvent` | `DictationSession::subscribe_transcripts`, `SuaraHandle::subscribe_transcripts` |
//! | `SessionStatusEvent` | `DictationSession::subscribe_status`, `SuaraHandle::subscribe_status` |
//! | `SpeechStatusEvent` | `ReadAloud::subscribe_status`, `SuaraHandle::subscribe_speech` |

use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;

// ---------------------------------------------------------------------------
// Transcript events
// ---------------------------------------------------------------------------

/// Emitted whenever the displayed dictation text changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptEvent {
    /// Monotonically increasing event sequence number.
    pub seq: u64,
    /// Restart epoch the text was produced in.
    pub epoch: u64,
    /// Finalized text; append-only while a session runs.
    pub confirmed: String,
    /// Still-revisable tail of the current utterance.
    pub provisional: String,
    /// What the UI should display.
    pub text: String,
    /// `true` for the frozen transcript published when a session stops.
    pub is_final: bool,
}

// ---------------------------------------------------------------------------
// Session status events
// ---------------------------------------------------------------------------

/// Emitted when the dictation session changes state or has something to say.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatusEvent {
    pub state: SessionState,
    /// Human-readable status line.
    pub message: Option<String>,
    /// Error category when this event reports a failure.
    pub error: Option<ErrorKind>,
}

/// Lifecycle state of the dictation session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Created, never started.
    Idle,
    /// Waiting for the microphone permission answer.
    RequestingPermission,
    /// Recognizer running, results flowing.
    Listening,
    /// Recognizer ended on its own; a restart is scheduled.
    Restarting,
    /// Stopped by the user, a fatal error, or a clear.
    Stopped,
}

// ---------------------------------------------------------------------------
// Read-aloud events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechStatusEvent {
    pub status: SpeechStatus,
    pub message: Option<String>,
    pub error: Option<ErrorKind>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeechStatus {
    /// Nothing queued.
    Idle,
    /// Utterance handed to the synthesizer, waiting for it to start.
    Queued,
    Speaking,
    Finished,
    Cancelled,
    Failed,
}

impl SpeechStatus {
    /// Whether playback controls should be enabled in this status.
    pub fn controls_enabled(self) -> bool {
        !matches!(self, SpeechStatus::Queued | SpeechStatus::Speaking)
    }
}
