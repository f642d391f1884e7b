use serde::{Deserialize, Serialize};
use thiserror::Error;

/// All errors produced by suara-core.
#[derive(Debug, Error)]
pub enum SuaraError {
    #[error("microphone access was denied")]
    PermissionDenied,

    #[error("no microphone available{}", detail_suffix(.0))]
    DeviceUnavailable(Option<String>),

    #[error("transient recognition glitch: {0}")]
    TransientRecognitionGlitch(String),

    #[error("speech recognition failed: {0}")]
    RecognitionFatal(String),

    #[error("speech recognition is not supported on this platform")]
    RecognitionUnavailable,

    #[error("speech synthesis is not supported on this platform")]
    SynthesisUnavailable,

    #[error("speech synthesis failed: {0}")]
    SynthesisFailure(String),

    #[error("there is no text to use")]
    EmptyInput,

    #[error("dictation session is already running")]
    AlreadyRunning,

    #[error("dictation session is not running")]
    NotRunning,

    #[error("runtime has shut down")]
    RuntimeClosed,

    #[error("config error: {0}")]
    Config(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

fn detail_suffix(detail: &Option<String>) -> String {
    detail
        .as_deref()
        .map(|d| format!(": {d}"))
        .unwrap_or_default()
}

pub type Result<T> = std::result::Result<T, SuaraError>;

/// Serializable error category published to the UI alongside status events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    PermissionDenied,
    DeviceUnavailable,
    TransientRecognitionGlitch,
    RecognitionFatal,
    RecognitionUnavailable,
    SynthesisUnavailable,
    SynthesisFailure,
    EmptyInput,
    InvalidState,
    Internal,
}

impl SuaraError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SuaraError::PermissionDenied => ErrorKind::PermissionDenied,
            SuaraError::DeviceUnavailable(_) => ErrorKind::DeviceUnavailable,
            SuaraError::TransientRecognitionGlitch(_) => ErrorKind::TransientRecognitionGlitch,
            SuaraError::RecognitionFatal(_) => ErrorKind::RecognitionFatal,
            SuaraError::RecognitionUnavailable => ErrorKind::RecognitionUnavailable,
            SuaraError::SynthesisUnavailable => ErrorKind::SynthesisUnavailable,
            SuaraError::SynthesisFailure(_) => ErrorKind::SynthesisFailure,
            SuaraError::EmptyInput => ErrorKind::EmptyInput,
            SuaraError::AlreadyRunning | SuaraError::NotRunning => ErrorKind::InvalidState,
            SuaraError::RuntimeClosed
            | SuaraError::Config(_)
            | SuaraError::Io(_)
            | SuaraError::Other(_) => ErrorKind::Internal,
        }
    }

    /// Fatal errors end the dictation session; everything else is recoverable.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SuaraError::PermissionDenied
                | SuaraError::DeviceUnavailable(_)
                | SuaraError::RecognitionFatal(_)
                | SuaraError::RecognitionUnavailable
        )
    }

    /// One user-facing sentence describing the remedy.
    pub fn user_message(&self) -> String {
        match self {
            SuaraError::PermissionDenied => {
                "Microphone access was denied. Allow the microphone in your browser or \
                 system settings, then reload and try again."
                    .into()
            }
            SuaraError::DeviceUnavailable(_) => {
                "No microphone was found. Make sure the device has a working microphone.".into()
            }
            SuaraError::TransientRecognitionGlitch(code) if code == "no-speech" => {
                "No speech detected yet, still listening.".into()
            }
            SuaraError::TransientRecognitionGlitch(code) => {
                format!("Recognition hiccup ({code}), still recording.")
            }
            SuaraError::RecognitionFatal(detail) => {
                format!("Speech recognition stopped ({detail}). Press record to try again.")
            }
            SuaraError::RecognitionUnavailable => {
                "This browser does not support speech recognition. Try Chrome, Safari or Edge."
                    .into()
            }
            SuaraError::SynthesisUnavailable => {
                "This browser does not support text-to-speech.".into()
            }
            SuaraError::SynthesisFailure(_) => {
                "Something went wrong while playing the audio.".into()
            }
            SuaraError::EmptyInput => "There is no text yet. Write or record something first.".into(),
            other => other.to_string(),
        }
    }
}
