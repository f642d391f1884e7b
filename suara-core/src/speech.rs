//! `ReadAloud`: text-to-speech playback controller.
//!
//! Wraps the optional [`SynthesisPort`]: rejects empty text before touching
//! the port, cancels whatever is playing before every `speak()`, and keeps
//! the voice choice cached until the platform reports a new voice list.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::{
    config::SuaraConfig,
    error::{ErrorKind, Result, SuaraError},
    ipc::events::{SpeechStatus, SpeechStatusEvent},
    platform::{SpeechRequest, SynthesisEvent, SynthesisPort},
    voice::{select_voice, Voice},
};

const BROADCAST_CAP: usize = 64;

/// Error codes the synthesizer reports for utterances we cancelled ourselves.
const CANCELLATION_CODES: [&str; 2] = ["interrupted", "canceled"];

#[derive(Debug, Default)]
struct VoiceCacheInner {
    voices: Vec<Voice>,
    selected: Option<Voice>,
    /// Set until the first query and whenever the platform reports a change.
    stale: bool,
}

/// Voice list and current selection, readable from any thread.
#[derive(Debug, Clone)]
pub struct VoiceCache(Arc<Mutex<VoiceCacheInner>>);

impl Default for VoiceCache {
    fn default() -> Self {
        Self(Arc::new(Mutex::new(VoiceCacheInner {
            stale: true,
            ..VoiceCacheInner::default()
        })))
    }
}

impl VoiceCache {
    pub fn selected(&self) -> Option<Voice> {
        self.0.lock().selected.clone()
    }

    pub fn voices(&self) -> Vec<Voice> {
        self.0.lock().voices.clone()
    }

    fn is_stale(&self) -> bool {
        self.0.lock().stale
    }

    fn mark_stale(&self) {
        self.0.lock().stale = true;
    }

    fn store(&self, voices: Vec<Voice>, selected: Option<Voice>) {
        let mut inner = self.0.lock();
        inner.voices = voices;
        inner.selected = selected;
        // An empty list usually means the platform has not loaded voices yet.
        inner.stale = inner.voices.is_empty();
    }
}

pub struct ReadAloud {
    config: SuaraConfig,
    port: Option<Box<dyn SynthesisPort>>,
    voices: VoiceCache,
    last_text: Option<String>,
    status: SpeechStatus,
    status_tx: broadcast::Sender<SpeechStatusEvent>,
}

impl std::fmt::Debug for ReadAloud {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadAloud")
            .field("status", &self.status)
            .field("has_port", &self.port.is_some())
            .field("voices", &self.voices)
            .finish_non_exhaustive()
    }
}

impl ReadAloud {
    pub fn new(config: SuaraConfig, port: Option<Box<dyn SynthesisPort>>) -> Self {
        let (status_tx, _) = broadcast::channel(BROADCAST_CAP);
        Self {
            config,
            port,
            voices: VoiceCache::default(),
            last_text: None,
            status: SpeechStatus::Idle,
            status_tx,
        }
    }

    pub fn is_available(&self) -> bool {
        self.port.is_some()
    }

    pub fn status(&self) -> SpeechStatus {
        self.status
    }

    pub fn voice_cache(&self) -> VoiceCache {
        self.voices.clone()
    }

    pub fn subscribe_status(&self) -> broadcast::Receiver<SpeechStatusEvent> {
        self.status_tx.subscribe()
    }

    pub(crate) fn status_sender(&self) -> broadcast::Sender<SpeechStatusEvent> {
        self.status_tx.clone()
    }

    /// Speak `text`, interrupting anything already playing.
    ///
    /// # Errors
    /// - `EmptyInput` for empty or whitespace-only text (no port call is made).
    /// - `SynthesisUnavailable` if the platform has no synthesizer.
    /// - `SynthesisFailure` if the synthesizer refuses the utterance.
    pub fn speak(&mut self, text: &str) -> Result<()> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SuaraError::EmptyInput);
        }
        if self.port.is_none() {
            return Err(SuaraError::SynthesisUnavailable);
        }

        if self.voices.is_stale() {
            self.refresh_voices();
        }
        let request = SpeechRequest {
            text: text.to_string(),
            locale: self.config.locale.clone(),
            rate: self.config.speech_rate,
            pitch: self.config.speech_pitch,
            volume: self.config.speech_volume,
            voice: self.voices.selected(),
        };
        match request.voice.as_ref() {
            Some(v) => debug!(voice = %v.name, "speaking with selected voice"),
            None => debug!("speaking with platform default voice"),
        }

        let Some(port) = self.port.as_mut() else {
            return Err(SuaraError::SynthesisUnavailable);
        };
        port.cancel();
        if let Err(e) = port.speak(request) {
            let err = SuaraError::SynthesisFailure(e.to_string());
            self.set_status(SpeechStatus::Failed, Some(err.user_message()), Some(err.kind()));
            return Err(err);
        }

        self.last_text = Some(text.to_string());
        self.set_status(SpeechStatus::Queued, None, None);
        Ok(())
    }

    /// Speak the most recent text again.
    ///
    /// # Errors
    /// `EmptyInput` if nothing has been spoken yet; otherwise as [`ReadAloud::speak`].
    pub fn repeat(&mut self) -> Result<()> {
        let Some(text) = self.last_text.clone() else {
            return Err(SuaraError::EmptyInput);
        };
        self.speak(&text)
    }

    /// Silence playback. A no-op without a synthesizer.
    pub fn cancel(&mut self) {
        let Some(port) = self.port.as_mut() else {
            return;
        };
        port.cancel();
        if !self.status.controls_enabled() {
            self.set_status(SpeechStatus::Cancelled, None, None);
        }
    }

    pub fn handle(&mut self, event: SynthesisEvent) {
        match event {
            SynthesisEvent::Started => {
                self.set_status(SpeechStatus::Speaking, Some("Playing audio…".into()), None);
            }
            SynthesisEvent::Ended => {
                // While Queued this is the cancelled previous utterance finishing.
                if self.status == SpeechStatus::Speaking {
                    self.set_status(SpeechStatus::Finished, Some("Finished playing!".into()), None);
                }
            }
            SynthesisEvent::Error(code) => {
                if CANCELLATION_CODES.contains(&code.as_str()) {
                    debug!(%code, "utterance cancelled");
                    // While Queued this is the previous utterance making way for the new one.
                    if self.status == SpeechStatus::Speaking {
                        self.set_status(SpeechStatus::Cancelled, None, None);
                    }
                    return;
                }
                let err = SuaraError::SynthesisFailure(code);
                warn!(error = %err, "speech synthesis error");
                self.set_status(SpeechStatus::Failed, Some(err.user_message()), Some(err.kind()));
            }
            SynthesisEvent::VoicesChanged => {
                self.voices.mark_stale();
                self.refresh_voices();
            }
        }
    }

    fn refresh_voices(&mut self) {
        let Some(port) = self.port.as_ref() else {
            return;
        };
        let voices = port.list_voices();
        let selected = select_voice(&voices, &self.config.locale, &self.config.voice).cloned();
        info!(
            available = voices.len(),
            selected = selected.as_ref().map(|v| v.name.as_str()).unwrap_or("<platform default>"),
            locale = %self.config.locale,
            "voice list refreshed"
        );
        self.voices.store(voices, selected);
    }

    fn set_status(&mut self, status: SpeechStatus, message: Option<String>, error: Option<ErrorKind>) {
        self.status = status;
        let _ = self.status_tx.send(SpeechStatusEvent {
            status,
            message,
            error,
        });
    }
}
