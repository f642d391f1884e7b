//! Platform capability ports.
//!
//! The engine never talks to a browser or OS directly. Hosts inject whatever
//! subset of the three ports the platform actually offers through
//! [`Platform`]; a missing port is `None`, not a runtime probe.
//!
//! Port calls are synchronous and return immediately. Everything the platform
//! reports later (recognition results, `ended`, the permission answer,
//! synthesis progress) comes back as an event through the runtime queue.

pub mod stub;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::SuaraConfig;
use crate::voice::Voice;

/// Failure of a synchronous port call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PortError {
    #[error("port rejected the call in its current state: {0}")]
    InvalidState(String),

    #[error("platform error: {0}")]
    Platform(String),
}

// ---------------------------------------------------------------------------
// Recognition
// ---------------------------------------------------------------------------

/// Settings pushed to the recognizer once, before the first `start()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecognitionSettings {
    pub locale: String,
    pub continuous: bool,
    pub interim_results: bool,
    pub max_alternatives: u32,
}

impl From<&SuaraConfig> for RecognitionSettings {
    fn from(config: &SuaraConfig) -> Self {
        Self {
            locale: config.locale.clone(),
            continuous: config.continuous,
            interim_results: config.interim_results,
            max_alternatives: config.max_alternatives,
        }
    }
}

/// One entry of a result batch: the best alternative for one utterance segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecognitionResult {
    pub text: String,
    pub is_final: bool,
}

impl RecognitionResult {
    pub fn final_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: true,
        }
    }

    pub fn interim(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: false,
        }
    }
}

/// One delivery from the recognizer.
///
/// `results` holds every entry of the current recognizer session in index
/// order, not only the changed ones; `result_index` is the first entry the
/// platform marked as changed. Indices restart at 0 after every restart.
///
/// Reconciliation always walks the whole of `results`; `result_index` is only
/// logged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecognitionResultBatch {
    pub result_index: usize,
    pub results: Vec<RecognitionResult>,
}

impl RecognitionResultBatch {
    pub fn new(result_index: usize, results: Vec<RecognitionResult>) -> Self {
        Self {
            result_index,
            results,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// How the session reacts to a recognizer error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Absorbed silently; the recognizer recovers through `ended`.
    Suppressed,
    /// Absorbed, with an optional status line.
    Transient,
    /// Reported to the user; recording continues.
    Reported,
    /// Ends the session.
    Fatal,
}

/// Error codes reported by the recognizer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RecognitionErrorCode {
    NoSpeech,
    AudioCapture,
    Aborted,
    NotAllowed,
    PermissionDenied,
    ServiceNotAllowed,
    LanguageNotSupported,
    Network,
    BadGrammar,
    Other(String),
}

impl RecognitionErrorCode {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "no-speech" => Self::NoSpeech,
            "audio-capture" => Self::AudioCapture,
            "aborted" => Self::Aborted,
            "not-allowed" => Self::NotAllowed,
            "permission-denied" => Self::PermissionDenied,
            "service-not-allowed" => Self::ServiceNotAllowed,
            "language-not-supported" => Self::LanguageNotSupported,
            "network" => Self::Network,
            "bad-grammar" => Self::BadGrammar,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::NoSpeech => "no-speech",
            Self::AudioCapture => "audio-capture",
            Self::Aborted => "aborted",
            Self::NotAllowed => "not-allowed",
            Self::PermissionDenied => "permission-denied",
            Self::ServiceNotAllowed => "service-not-allowed",
            Self::LanguageNotSupported => "language-not-supported",
            Self::Network => "network",
            Self::BadGrammar => "bad-grammar",
            Self::Other(code) => code,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Aborted => ErrorSeverity::Suppressed,
            Self::NoSpeech | Self::AudioCapture => ErrorSeverity::Transient,
            Self::NotAllowed
            | Self::PermissionDenied
            | Self::ServiceNotAllowed
            | Self::LanguageNotSupported => ErrorSeverity::Fatal,
            Self::Network | Self::BadGrammar | Self::Other(_) => ErrorSeverity::Reported,
        }
    }

    /// Permission-class codes are surfaced as `PermissionDenied` rather than a generic failure.
    pub fn is_permission(&self) -> bool {
        matches!(
            self,
            Self::NotAllowed | Self::PermissionDenied | Self::ServiceNotAllowed
        )
    }
}

impl std::fmt::Display for RecognitionErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything the recognizer reports asynchronously.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionEvent {
    Started,
    Result(RecognitionResultBatch),
    Error(RecognitionErrorCode),
    Ended,
}

/// A continuous speech-recognition session supplied by the platform.
///
/// At most one session is active per port. The platform may end a session on
/// its own at any time, even in continuous mode.
pub trait RecognitionPort: Send + 'static {
    fn configure(&mut self, settings: &RecognitionSettings);

    /// Begin (or resume) recognition. Fails if the platform is not ready,
    /// e.g. immediately after it reported `ended`.
    fn start(&mut self) -> std::result::Result<(), PortError>;

    /// Ask the recognizer to stop. Calling this on a stopped port may fail; callers tolerate it.
    fn stop(&mut self) -> std::result::Result<(), PortError>;
}

// ---------------------------------------------------------------------------
// Microphone permission
// ---------------------------------------------------------------------------

/// Answer to a microphone access request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "outcome", content = "detail")]
pub enum PermissionOutcome {
    Granted,
    Denied,
    NoDevice,
    Failed(String),
}

pub trait MicrophoneAccess: Send + 'static {
    /// Show the permission prompt. The answer arrives later as a `PermissionOutcome`.
    fn request_access(&mut self) -> std::result::Result<(), PortError>;
}

// ---------------------------------------------------------------------------
// Synthesis
// ---------------------------------------------------------------------------

/// Everything the synthesizer needs to speak one utterance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechRequest {
    pub text: String,
    pub locale: String,
    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,
    /// `None` lets the synthesizer use its own default voice.
    pub voice: Option<Voice>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SynthesisEvent {
    Started,
    Ended,
    Error(String),
    /// The platform voice list changed; cached selections are stale.
    VoicesChanged,
}

pub trait SynthesisPort: Send + 'static {
    fn speak(&mut self, request: SpeechRequest) -> std::result::Result<(), PortError>;

    /// Drop the current and all queued utterances.
    fn cancel(&mut self);

    /// Voices currently known to the platform. May be empty until `VoicesChanged`.
    fn list_voices(&self) -> Vec<Voice>;
}

// ---------------------------------------------------------------------------
// Capability provider
// ---------------------------------------------------------------------------

/// The set of ports a host platform offers.
#[derive(Default)]
pub struct Platform {
    pub recognition: Option<Box<dyn RecognitionPort>>,
    pub microphone: Option<Box<dyn MicrophoneAccess>>,
    pub synthesis: Option<Box<dyn SynthesisPort>>,
}

impl Platform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_recognition(mut self, port: impl RecognitionPort) -> Self {
        self.recognition = Some(Box::new(port));
        self
    }

    pub fn with_microphone(mut self, port: impl MicrophoneAccess) -> Self {
        self.microphone = Some(Box::new(port));
        self
    }

    pub fn with_synthesis(mut self, port: impl SynthesisPort) -> Self {
        self.synthesis = Some(Box::new(port));
        self
    }
}

impl std::fmt::Debug for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Platform")
            .field("recognition", &self.recognition.is_some())
            .field("microphone", &self.microphone.is_some())
            .field("synthesis", &self.synthesis.is_some())
            .finish()
    }
}
