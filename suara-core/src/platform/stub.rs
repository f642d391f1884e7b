//! Stub ports that record every call instead of touching a real platform.
//!
//! Used to exercise the session and runtime end-to-end without a browser.
//! Each stub hands out a cloneable [`CallLog`] so tests can keep observing
//! calls after the stub has been moved into a [`Platform`](super::Platform).

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use parking_lot::Mutex;
use tracing::debug;

use super::{
    MicrophoneAccess, PortError, RecognitionPort, RecognitionSettings, SpeechRequest,
    SynthesisPort,
};
use crate::voice::Voice;

/// Shared, append-only record of port calls.
#[derive(Debug)]
pub struct CallLog<T>(Arc<Mutex<Vec<T>>>);

impl<T> Clone for CallLog<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T> Default for CallLog<T> {
    fn default() -> Self {
        Self(Arc::new(Mutex::new(Vec::new())))
    }
}

impl<T: Clone> CallLog<T> {
    pub fn push(&self, call: T) {
        self.0.lock().push(call);
    }

    pub fn snapshot(&self) -> Vec<T> {
        self.0.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.0.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.lock().is_empty()
    }

    pub fn count(&self, pred: impl Fn(&T) -> bool) -> usize {
        self.0.lock().iter().filter(|c| pred(c)).count()
    }
}

// ---------------------------------------------------------------------------
// Recognition
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionCall {
    Configure(RecognitionSettings),
    Start,
    Stop,
}

/// Recognizer stub. `start()` fails while the shared failure flag is set.
#[derive(Debug, Default)]
pub struct StubRecognition {
    calls: CallLog<RecognitionCall>,
    fail_start: Arc<AtomicBool>,
}

impl StubRecognition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> CallLog<RecognitionCall> {
        self.calls.clone()
    }

    /// Flag controlling whether subsequent `start()` calls fail.
    pub fn start_failure_switch(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.fail_start)
    }
}

impl RecognitionPort for StubRecognition {
    fn configure(&mut self, settings: &RecognitionSettings) {
        self.calls.push(RecognitionCall::Configure(settings.clone()));
    }

    fn start(&mut self) -> Result<(), PortError> {
        self.calls.push(RecognitionCall::Start);
        if self.fail_start.load(Ordering::SeqCst) {
            debug!("StubRecognition::start failing on request");
            return Err(PortError::InvalidState("recognition has already started".into()));
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<(), PortError> {
        self.calls.push(RecognitionCall::Stop);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Microphone
// ---------------------------------------------------------------------------

/// Microphone stub. Counts prompts; the answer is delivered by the caller.
#[derive(Debug, Default)]
pub struct StubMicrophone {
    requests: CallLog<()>,
}

impl StubMicrophone {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn requests(&self) -> CallLog<()> {
        self.requests.clone()
    }
}

impl MicrophoneAccess for StubMicrophone {
    fn request_access(&mut self) -> Result<(), PortError> {
        self.requests.push(());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Synthesis
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum SynthesisCall {
    Speak(SpeechRequest),
    Cancel,
    ListVoices,
}

/// Synthesizer stub with a mutable voice list.
#[derive(Debug, Default)]
pub struct StubSynthesis {
    calls: CallLog<SynthesisCall>,
    voices: Arc<Mutex<Vec<Voice>>>,
}

impl StubSynthesis {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_voices(voices: Vec<Voice>) -> Self {
        Self {
            calls: CallLog::default(),
            voices: Arc::new(Mutex::new(voices)),
        }
    }

    pub fn calls(&self) -> CallLog<SynthesisCall> {
        self.calls.clone()
    }

    /// Handle for replacing the voice list after the stub was moved.
    pub fn voices(&self) -> Arc<Mutex<Vec<Voice>>> {
        Arc::clone(&self.voices)
    }
}

impl SynthesisPort for StubSynthesis {
    fn speak(&mut self, request: SpeechRequest) -> Result<(), PortError> {
        self.calls.push(SynthesisCall::Speak(request));
        Ok(())
    }

    fn cancel(&mut self) {
        self.calls.push(SynthesisCall::Cancel);
    }

    fn list_voices(&self) -> Vec<Voice> {
        self.calls.push(SynthesisCall::ListVoices);
        self.voices.lock().clone()
    }
}
