//! `DictationSession`: continuous dictation controller.
//!
//! ## Lifecycle
//!
//! ```text
//! start_session()  → microphone prompt, state = RequestingPermission
//!   └─► granted    → transcript seeded, recognizer start(), state = Listening
//!       └─► ended  → epoch += 1, restart scheduled, state = Restarting
//!           └─► RestartDue(ticket) → recognizer start(), state = Listening
//! stop_session()   → restart cancelled, recognizer stop(), state = Stopped
//! ```
//!
//! The session is a plain `&mut self` state machine. It never blocks and
//! never spawns: platform callbacks and timer expiries are fed in through
//! [`DictationSession::handle`], which is what makes the restart race
//! testable without real time.
//!
//! ## Restart tickets
//!
//! Every scheduled restart carries a [`RestartTicket`] of
//! `(session generation, epoch)`. A ticket is only honoured while the user
//! still intends to record and both numbers match the live session, so a timer
//! that fires after `stop_session()` (or after a stop + new start) is inert
//! even if the scheduler failed to cancel it.

pub mod state;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, info, info_span, warn, Span};

use crate::{
    config::SuaraConfig,
    error::{ErrorKind, Result, SuaraError},
    ipc::events::{SessionState, SessionStatusEvent, TranscriptEvent},
    platform::{
        ErrorSeverity, MicrophoneAccess, PermissionOutcome, PortError, RecognitionErrorCode,
        RecognitionEvent, RecognitionPort, RecognitionResultBatch, RecognitionSettings,
    },
    transcript::{Transcript, TranscriptAccumulator},
};

/// Broadcast channel capacity: 256 events buffered for slow consumers.
const BROADCAST_CAP: usize = 256;

/// Identifies one scheduled recognizer restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RestartTicket {
    pub session: u64,
    pub epoch: u64,
}

/// Timer service for delayed restarts.
///
/// When the delay elapses the implementation must feed
/// `SessionEvent::RestartDue(ticket)` back into the session.
pub trait RestartScheduler: Send + 'static {
    fn schedule(&mut self, delay: Duration, ticket: RestartTicket);

    /// Best effort; the session ignores stale tickets regardless.
    fn cancel(&mut self, ticket: RestartTicket);
}

/// Scheduler for hosts that own their timers (e.g. a JS `setTimeout` bridge)
/// and for deterministic tests: it only records what was asked of it.
#[derive(Debug, Clone, Default)]
pub struct ManualScheduler {
    pending: Arc<Mutex<Vec<(Duration, RestartTicket)>>>,
    cancelled: Arc<Mutex<Vec<RestartTicket>>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scheduled tickets not yet cancelled or taken, oldest first.
    pub fn pending(&self) -> Vec<(Duration, RestartTicket)> {
        self.pending.lock().clone()
    }

    pub fn cancelled(&self) -> Vec<RestartTicket> {
        self.cancelled.lock().clone()
    }

    /// Remove and return every pending ticket, as if their delays elapsed.
    pub fn take_due(&self) -> Vec<RestartTicket> {
        self.pending.lock().drain(..).map(|(_, t)| t).collect()
    }
}

impl RestartScheduler for ManualScheduler {
    fn schedule(&mut self, delay: Duration, ticket: RestartTicket) {
        self.pending.lock().push((delay, ticket));
    }

    fn cancel(&mut self, ticket: RestartTicket) {
        self.pending.lock().retain(|(_, t)| *t != ticket);
        self.cancelled.lock().push(ticket);
    }
}

/// Everything that can happen to a session besides direct UI calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Permission(PermissionOutcome),
    Recognition(RecognitionEvent),
    RestartDue(RestartTicket),
}

/// The dictation controller. One instance per tab/window, held by the host.
pub struct DictationSession {
    config: SuaraConfig,
    recognition: Option<Box<dyn RecognitionPort>>,
    microphone: Option<Box<dyn MicrophoneAccess>>,
    scheduler: Box<dyn RestartScheduler>,
    state: SessionState,
    /// User intent: `true` from `start_session()` until stop, clear or a fatal error.
    recording: bool,
    /// Incremented on every `start_session()`.
    generation: u64,
    /// Recognizer restarts within the current session.
    epoch: u64,
    pending_restart: Option<RestartTicket>,
    /// Restarts since the last non-empty result batch.
    restarts_without_results: u32,
    accumulator: TranscriptAccumulator,
    /// Text currently on screen; seeds the next session.
    display: String,
    last_error: Option<ErrorKind>,
    seq: u64,
    span: Span,
    transcript_tx: broadcast::Sender<TranscriptEvent>,
    status_tx: broadcast::Sender<SessionStatusEvent>,
}

impl std::fmt::Debug for DictationSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DictationSession")
            .field("state", &self.state)
            .field("recording", &self.recording)
            .field("generation", &self.generation)
            .field("epoch", &self.epoch)
            .field("pending_restart", &self.pending_restart)
            .field("has_recognition", &self.recognition.is_some())
            .field("has_microphone", &self.microphone.is_some())
            .finish_non_exhaustive()
    }
}

impl DictationSession {
    /// Create an idle session. The recognizer (if any) is configured immediately.
    pub fn new(
        config: SuaraConfig,
        mut recognition: Option<Box<dyn RecognitionPort>>,
        microphone: Option<Box<dyn MicrophoneAccess>>,
        scheduler: Box<dyn RestartScheduler>,
    ) -> Self {
        if let Some(port) = recognition.as_mut() {
            port.configure(&RecognitionSettings::from(&config));
        }
        let (transcript_tx, _) = broadcast::channel(BROADCAST_CAP);
        let (status_tx, _) = broadcast::channel(BROADCAST_CAP);

        Self {
            config,
            recognition,
            microphone,
            scheduler,
            state: SessionState::Idle,
            recording: false,
            generation: 0,
            epoch: 0,
            pending_restart: None,
            restarts_without_results: 0,
            accumulator: TranscriptAccumulator::new(),
            display: String::new(),
            last_error: None,
            seq: 0,
            span: Span::none(),
            transcript_tx,
            status_tx,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn has_recognition(&self) -> bool {
        self.recognition.is_some()
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn transcript(&self) -> &Transcript {
        self.accumulator.snapshot()
    }

    /// What the UI should currently display.
    pub fn display_text(&self) -> &str {
        &self.display
    }

    /// Category of the most recent failure, cleared when a session starts.
    pub fn last_error(&self) -> Option<ErrorKind> {
        self.last_error
    }

    pub fn subscribe_transcripts(&self) -> broadcast::Receiver<TranscriptEvent> {
        self.transcript_tx.subscribe()
    }

    pub fn subscribe_status(&self) -> broadcast::Receiver<SessionStatusEvent> {
        self.status_tx.subscribe()
    }

    pub(crate) fn transcript_sender(&self) -> broadcast::Sender<TranscriptEvent> {
        self.transcript_tx.clone()
    }

    pub(crate) fn status_sender(&self) -> broadcast::Sender<SessionStatusEvent> {
        self.status_tx.clone()
    }

    /// Sync the user's manual edits of the output field.
    ///
    /// # Errors
    /// `SuaraError::AlreadyRunning` while a session is active; the transcript owns the text then.
    pub fn replace_text(&mut self, text: &str) -> Result<()> {
        if self.state.is_active() {
            return Err(SuaraError::AlreadyRunning);
        }
        self.display = text.to_string();
        Ok(())
    }

    /// Begin a dictation session: prompt for the microphone and wait for the answer.
    ///
    /// # Errors
    /// - `AlreadyRunning` if a session is active.
    /// - `RecognitionUnavailable` / `DeviceUnavailable` if the platform lacks the capability.
    pub fn start_session(&mut self) -> Result<()> {
        if self.state.is_active() {
            return Err(SuaraError::AlreadyRunning);
        }
        if self.recognition.is_none() {
            let err = SuaraError::RecognitionUnavailable;
            self.publish_error(&err);
            return Err(err);
        }
        if self.microphone.is_none() {
            let err = SuaraError::DeviceUnavailable(Some("microphone access is not supported".into()));
            self.publish_error(&err);
            return Err(err);
        }

        self.generation += 1;
        self.span = info_span!("dictation", session = self.generation);
        let span = self.span.clone();
        let _enter = span.enter();

        self.recording = true;
        self.last_error = None;
        self.set_state(SessionState::RequestingPermission);
        self.publish_status(Some("Requesting microphone access…".into()), None);
        info!("dictation session requested");

        let requested = match self.microphone.as_mut() {
            Some(mic) => mic.request_access(),
            None => Ok(()),
        };
        if let Err(e) = requested {
            let err = SuaraError::DeviceUnavailable(Some(e.to_string()));
            self.fail_session(&err);
            return Err(err);
        }
        Ok(())
    }

    /// Stop recording at the user's request.
    ///
    /// Returns the frozen transcript now on display.
    ///
    /// # Errors
    /// `NotRunning` if no session is active.
    pub fn stop_session(&mut self) -> Result<String> {
        if !self.state.is_active() {
            return Err(SuaraError::NotRunning);
        }
        let span = self.span.clone();
        let _enter = span.enter();

        // Before the grant nothing was recorded and the display still holds the old text.
        let had_transcript = matches!(
            self.state,
            SessionState::Listening | SessionState::Restarting
        );
        self.halt();
        let final_text = if had_transcript {
            self.freeze_transcript()
        } else {
            self.display.clone()
        };
        self.publish_status(Some("Recording finished, text kept.".into()), None);
        info!(chars = final_text.chars().count(), "dictation session stopped");
        Ok(final_text)
    }

    /// Stop (if running) and discard all text.
    pub fn clear_session(&mut self) {
        let span = self.span.clone();
        let _enter = span.enter();

        if self.state.is_active() {
            self.halt();
        } else if self.state == SessionState::Idle {
            self.set_state(SessionState::Stopped);
        }
        self.accumulator.reset();
        self.epoch = 0;
        self.restarts_without_results = 0;
        self.display.clear();
        self.publish_transcript(true);
        self.publish_status(Some("Recording cleared, ready to record again.".into()), None);
        info!("dictation session cleared");
    }

    /// Feed one asynchronous event into the state machine.
    pub fn handle(&mut self, event: SessionEvent) {
        let span = self.span.clone();
        let _enter = span.enter();

        match event {
            SessionEvent::Permission(outcome) => self.on_permission(outcome),
            SessionEvent::Recognition(event) => self.on_recognition(event),
            SessionEvent::RestartDue(ticket) => self.on_restart_due(ticket),
        }
    }

    // ── Event handlers ───────────────────────────────────────────────────────

    fn on_permission(&mut self, outcome: PermissionOutcome) {
        if self.state != SessionState::RequestingPermission || !self.recording {
            debug!(?outcome, state = %self.state, "permission answer arrived late, ignored");
            return;
        }

        match outcome {
            PermissionOutcome::Granted => self.begin_listening(),
            PermissionOutcome::Denied => self.fail_session(&SuaraError::PermissionDenied),
            PermissionOutcome::NoDevice => self.fail_session(&SuaraError::DeviceUnavailable(None)),
            PermissionOutcome::Failed(detail) => {
                self.fail_session(&SuaraError::DeviceUnavailable(Some(detail)))
            }
        }
    }

    fn begin_listening(&mut self) {
        self.accumulator.seed(&self.display);
        self.epoch = 0;
        self.restarts_without_results = 0;
        self.set_state(SessionState::Listening);

        if let Err(e) = self.start_recognizer() {
            self.fail_session(&SuaraError::RecognitionFatal(e.to_string()));
            return;
        }
        self.publish_transcript(false);
        self.publish_status(Some("Recording… speak now!".into()), None);
        info!("listening");
    }

    fn on_recognition(&mut self, event: RecognitionEvent) {
        match event {
            RecognitionEvent::Started => {
                debug!(epoch = self.epoch, "recognizer started");
            }
            RecognitionEvent::Result(batch) => self.on_result(batch),
            RecognitionEvent::Error(code) => self.on_recognizer_error(code),
            RecognitionEvent::Ended => self.on_ended(),
        }
    }

    fn on_result(&mut self, batch: RecognitionResultBatch) {
        if self.state != SessionState::Listening {
            debug!(state = %self.state, "result batch outside listening, ignored");
            return;
        }
        debug!(
            result_index = batch.result_index,
            entries = batch.results.len(),
            epoch = self.epoch,
            "result batch"
        );
        if !batch.is_empty() {
            self.restarts_without_results = 0;
        }
        self.accumulator.apply(&batch, self.epoch);
        self.publish_transcript(false);
    }

    fn on_recognizer_error(&mut self, code: RecognitionErrorCode) {
        if !self.state.is_active() {
            debug!(%code, "recognizer error while stopped, ignored");
            return;
        }

        match code.severity() {
            ErrorSeverity::Suppressed => {
                debug!(%code, "recognizer error suppressed");
            }
            ErrorSeverity::Transient => {
                debug!(%code, "transient recognizer error, still listening");
                let glitch = SuaraError::TransientRecognitionGlitch(code.to_string());
                self.publish_status(Some(glitch.user_message()), None);
            }
            ErrorSeverity::Reported => {
                warn!(%code, "recognizer error, still recording");
                let glitch = SuaraError::TransientRecognitionGlitch(code.to_string());
                self.publish_status(Some(glitch.user_message()), Some(glitch.kind()));
            }
            ErrorSeverity::Fatal => {
                let err = if code.is_permission() {
                    SuaraError::PermissionDenied
                } else {
                    SuaraError::RecognitionFatal(code.to_string())
                };
                self.fail_session(&err);
            }
        }
    }

    fn on_ended(&mut self) {
        if !self.recording || self.state != SessionState::Listening {
            debug!(state = %self.state, "recognizer ended, no restart");
            return;
        }

        self.restarts_without_results += 1;
        if let Some(cap) = self.config.max_consecutive_restarts {
            if self.restarts_without_results > cap {
                self.fail_session(&SuaraError::RecognitionFatal(format!(
                    "recognizer ended {cap} times in a row without results"
                )));
                return;
            }
        }

        // Results from the ended run are done; anything still interim will not be finalized.
        self.accumulator.clear_provisional();
        self.display = self.accumulator.snapshot().display();

        self.epoch += 1;
        let ticket = RestartTicket {
            session: self.generation,
            epoch: self.epoch,
        };
        self.pending_restart = Some(ticket);
        self.set_state(SessionState::Restarting);
        self.scheduler.schedule(self.config.restart_delay(), ticket);
        self.publish_transcript(false);
        debug!(epoch = self.epoch, delay_ms = self.config.restart_delay_ms, "restart scheduled");
    }

    fn on_restart_due(&mut self, ticket: RestartTicket) {
        let live = self.recording
            && self.state == SessionState::Restarting
            && self.pending_restart == Some(ticket)
            && ticket.session == self.generation
            && ticket.epoch == self.epoch;
        if !live {
            debug!(?ticket, state = %self.state, "stale restart ticket, ignored");
            return;
        }

        self.pending_restart = None;
        match self.start_recognizer() {
            Ok(()) => {
                self.set_state(SessionState::Listening);
                info!(epoch = self.epoch, "recognizer restarted");
            }
            Err(e) => {
                self.fail_session(&SuaraError::RecognitionFatal(format!("restart failed: {e}")));
            }
        }
    }

    // ── Internal helpers ─────────────────────────────────────────────────────

    fn start_recognizer(&mut self) -> std::result::Result<(), PortError> {
        match self.recognition.as_mut() {
            Some(port) => port.start(),
            None => Err(PortError::Platform(
                "speech recognition is not supported".into(),
            )),
        }
    }

    /// Drop recording intent, cancel any restart and stop the recognizer.
    fn halt(&mut self) {
        let was = self.state;
        self.recording = false;
        if let Some(ticket) = self.pending_restart.take() {
            self.scheduler.cancel(ticket);
        }
        if matches!(was, SessionState::Listening | SessionState::Restarting) {
            if let Some(port) = self.recognition.as_mut() {
                if let Err(e) = port.stop() {
                    debug!("recognizer stop failed (already stopped?): {e}");
                }
            }
        }
        self.set_state(SessionState::Stopped);
    }

    /// Publish the stop-time transcript and remember it as the displayed text.
    fn freeze_transcript(&mut self) -> String {
        self.display = self.accumulator.snapshot().finalize();
        self.publish_transcript(true);
        self.display.clone()
    }

    fn fail_session(&mut self, err: &SuaraError) {
        debug_assert!(err.is_fatal(), "{err} does not end a session");
        let had_transcript = matches!(
            self.state,
            SessionState::Listening | SessionState::Restarting
        );
        warn!(error = %err, state = %self.state, "dictation session failed");
        self.halt();
        if had_transcript {
            self.freeze_transcript();
        }
        self.publish_error(err);
    }

    fn set_state(&mut self, target: SessionState) {
        debug_assert!(
            self.state.can_transition_to(&target),
            "invalid transition {} -> {}",
            self.state,
            target
        );
        debug!("dictation state: {} -> {}", self.state, target);
        self.state = target;
    }

    fn publish_transcript(&mut self, is_final: bool) {
        let transcript = self.accumulator.snapshot();
        let text = if is_final {
            self.display.clone()
        } else {
            let live = transcript.display();
            self.display = live.clone();
            live
        };
        let event = TranscriptEvent {
            seq: self.seq,
            epoch: self.epoch,
            confirmed: transcript.confirmed.clone(),
            provisional: transcript.provisional.clone(),
            text,
            is_final,
        };
        self.seq += 1;
        let _ = self.transcript_tx.send(event);
    }

    fn publish_status(&self, message: Option<String>, error: Option<ErrorKind>) {
        let _ = self.status_tx.send(SessionStatusEvent {
            state: self.state,
            message,
            error,
        });
    }

    fn publish_error(&mut self, err: &SuaraError) {
        self.last_error = Some(err.kind());
        self.publish_status(Some(err.user_message()), Some(err.kind()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::Ordering;

    use tokio::sync::broadcast::error::TryRecvError;

    use crate::platform::stub::{CallLog, RecognitionCall, StubMicrophone, StubRecognition};
    use crate::platform::RecognitionResult;

    struct Harness {
        session: DictationSession,
        calls: CallLog<RecognitionCall>,
        fail_start: Arc<std::sync::atomic::AtomicBool>,
        scheduler: ManualScheduler,
    }

    fn harness_with(config: SuaraConfig) -> Harness {
        let recognition = StubRecognition::new();
        let calls = recognition.calls();
        let fail_start = recognition.start_failure_switch();
        let scheduler = ManualScheduler::new();
        let session = DictationSession::new(
            config,
            Some(Box::new(recognition)),
            Some(Box::new(StubMicrophone::new())),
            Box::new(scheduler.clone()),
        );
        Harness {
            session,
            calls,
            fail_start,
            scheduler,
        }
    }

    fn harness() -> Harness {
        harness_with(SuaraConfig::default())
    }

    fn starts(calls: &CallLog<RecognitionCall>) -> usize {
        calls.count(|c| *c == RecognitionCall::Start)
    }

    fn listening(h: &mut Harness) {
        h.session.start_session().expect("start session");
        h.session
            .handle(SessionEvent::Permission(PermissionOutcome::Granted));
        assert_eq!(h.session.state(), SessionState::Listening);
    }

    fn result(h: &mut Harness, results: &[(&str, bool)]) {
        let batch = RecognitionResultBatch::new(
            0,
            results
                .iter()
                .map(|(t, f)| RecognitionResult {
                    text: (*t).into(),
                    is_final: *f,
                })
                .collect(),
        );
        h.session
            .handle(SessionEvent::Recognition(RecognitionEvent::Result(batch)));
    }

    fn ended(h: &mut Harness) {
        h.session
            .handle(SessionEvent::Recognition(RecognitionEvent::Ended));
    }

    fn fire_due(h: &mut Harness) {
        for ticket in h.scheduler.take_due() {
            h.session.handle(SessionEvent::RestartDue(ticket));
        }
    }

    #[test]
    fn new_session_configures_recognizer_once() {
        let h = harness();
        let calls = h.calls.snapshot();
        assert_eq!(calls.len(), 1);
        assert!(matches!(&calls[0], RecognitionCall::Configure(s) if s.locale == "id-ID" && s.continuous));
        assert_eq!(h.session.state(), SessionState::Idle);
    }

    #[test]
    fn grant_starts_recognizer_and_listens() {
        let mut h = harness();
        h.session.start_session().expect("start session");
        assert_eq!(h.session.state(), SessionState::RequestingPermission);
        assert_eq!(starts(&h.calls), 0);

        h.session
            .handle(SessionEvent::Permission(PermissionOutcome::Granted));
        assert_eq!(h.session.state(), SessionState::Listening);
        assert_eq!(starts(&h.calls), 1);
        assert_eq!(h.session.epoch(), 0);
    }

    #[test]
    fn denial_stops_without_touching_transcript() {
        let mut h = harness();
        h.session.replace_text("kept").expect("replace text");
        let mut status = h.session.subscribe_status();

        h.session.start_session().expect("start session");
        h.session
            .handle(SessionEvent::Permission(PermissionOutcome::Denied));

        assert_eq!(h.session.state(), SessionState::Stopped);
        assert_eq!(h.session.last_error(), Some(ErrorKind::PermissionDenied));
        assert_eq!(h.session.display_text(), "kept");
        assert_eq!(starts(&h.calls), 0);

        let mut last = None;
        while let Ok(ev) = status.try_recv() {
            last = Some(ev);
        }
        let last = last.expect("status event");
        assert_eq!(last.state, SessionState::Stopped);
        assert_eq!(last.error, Some(ErrorKind::PermissionDenied));
    }

    #[test]
    fn missing_device_is_device_unavailable() {
        let mut h = harness();
        h.session.start_session().expect("start session");
        h.session
            .handle(SessionEvent::Permission(PermissionOutcome::NoDevice));
        assert_eq!(h.session.state(), SessionState::Stopped);
        assert_eq!(h.session.last_error(), Some(ErrorKind::DeviceUnavailable));
    }

    #[test]
    fn start_without_recognizer_is_refused() {
        let mut session = DictationSession::new(
            SuaraConfig::default(),
            None,
            Some(Box::new(StubMicrophone::new())),
            Box::new(ManualScheduler::new()),
        );
        let err = session.start_session().expect_err("no recognizer");
        assert!(matches!(err, SuaraError::RecognitionUnavailable));
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[test]
    fn double_start_is_rejected() {
        let mut h = harness();
        listening(&mut h);
        assert!(matches!(
            h.session.start_session(),
            Err(SuaraError::AlreadyRunning)
        ));
    }

    #[test]
    fn results_update_display_text() {
        let mut h = harness();
        let mut transcripts = h.session.subscribe_transcripts();
        listening(&mut h);

        result(&mut h, &[("halo", true), (" apa kab", false)]);
        assert_eq!(h.session.display_text(), "halo  apa kab");

        let mut last = None;
        while let Ok(ev) = transcripts.try_recv() {
            last = Some(ev);
        }
        let last = last.expect("transcript event");
        assert_eq!(last.confirmed, "halo ");
        assert_eq!(last.provisional, " apa kab");
        assert!(!last.is_final);
    }

    #[test]
    fn resumed_session_appends_to_existing_text() {
        let mut h = harness();
        h.session.replace_text("catatan kemarin").expect("replace");
        listening(&mut h);
        result(&mut h, &[("lanjut", true)]);
        assert_eq!(h.session.transcript().confirmed, "catatan kemarin lanjut ");
    }

    #[test]
    fn ended_while_recording_restarts_after_delay() {
        let mut h = harness();
        listening(&mut h);
        result(&mut h, &[("hello ", true)]);

        ended(&mut h);
        assert_eq!(h.session.state(), SessionState::Restarting);
        assert_eq!(h.session.epoch(), 1);
        let pending = h.scheduler.pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].0, Duration::from_millis(100));
        assert_eq!(starts(&h.calls), 1, "no start before the delay elapses");

        fire_due(&mut h);
        assert_eq!(h.session.state(), SessionState::Listening);
        assert_eq!(starts(&h.calls), 2);

        // Indices restarted; the new run only carries new speech.
        result(&mut h, &[("world", true)]);
        assert_eq!(h.session.transcript().confirmed, "hello world ");
    }

    #[test]
    fn stop_between_ended_and_restart_never_starts_again() {
        let mut h = harness();
        listening(&mut h);
        ended(&mut h);
        let ticket = h.scheduler.pending()[0].1;

        h.session.stop_session().expect("stop");
        assert_eq!(h.scheduler.cancelled(), vec![ticket]);
        assert!(h.scheduler.pending().is_empty());

        // Even if the timer fires anyway, the ticket is stale.
        h.session.handle(SessionEvent::RestartDue(ticket));
        assert_eq!(starts(&h.calls), 1);
        assert_eq!(h.session.state(), SessionState::Stopped);
    }

    #[test]
    fn ticket_from_previous_session_is_inert() {
        let mut h = harness();
        listening(&mut h);
        ended(&mut h);
        let old_ticket = h.scheduler.pending()[0].1;
        h.session.stop_session().expect("stop");

        listening(&mut h);
        ended(&mut h);
        assert_eq!(h.session.epoch(), old_ticket.epoch);

        h.session.handle(SessionEvent::RestartDue(old_ticket));
        assert_eq!(h.session.state(), SessionState::Restarting);
        assert_eq!(starts(&h.calls), 2);

        fire_due(&mut h);
        assert_eq!(h.session.state(), SessionState::Listening);
        assert_eq!(starts(&h.calls), 3);
    }

    #[test]
    fn failed_restart_stops_with_recognition_fatal() {
        let mut h = harness();
        listening(&mut h);
        result(&mut h, &[("sebelum", true)]);
        ended(&mut h);

        h.fail_start.store(true, Ordering::SeqCst);
        fire_due(&mut h);

        assert_eq!(h.session.state(), SessionState::Stopped);
        assert!(!h.session.is_recording());
        assert_eq!(h.session.last_error(), Some(ErrorKind::RecognitionFatal));
        assert_eq!(h.session.display_text(), "sebelum");
    }

    #[test]
    fn initial_start_failure_is_fatal() {
        let mut h = harness();
        h.fail_start.store(true, Ordering::SeqCst);
        h.session.start_session().expect("start session");
        h.session
            .handle(SessionEvent::Permission(PermissionOutcome::Granted));
        assert_eq!(h.session.state(), SessionState::Stopped);
        assert_eq!(h.session.last_error(), Some(ErrorKind::RecognitionFatal));
    }

    #[test]
    fn non_fatal_errors_keep_listening_through_restart() {
        let mut h = harness();
        let mut status = h.session.subscribe_status();
        listening(&mut h);

        for (i, code) in ["no-speech", "audio-capture", "aborted", "network"]
            .into_iter()
            .enumerate()
        {
            h.session.handle(SessionEvent::Recognition(RecognitionEvent::Error(
                RecognitionErrorCode::parse(code),
            )));
            assert_eq!(h.session.state(), SessionState::Listening, "{code}");

            // The recognizer still ends afterwards; that drives the restart.
            ended(&mut h);
            assert_eq!(h.session.state(), SessionState::Restarting, "{code}");
            fire_due(&mut h);
            assert_eq!(h.session.state(), SessionState::Listening, "{code}");
            assert_eq!(starts(&h.calls), i + 2, "{code}");
        }
        assert!(h.session.is_recording());
        assert_eq!(h.session.last_error(), None);

        let events: Vec<SessionStatusEvent> = std::iter::from_fn(|| status.try_recv().ok()).collect();
        let no_speech = events
            .iter()
            .find(|ev| ev.message.as_deref() == Some("No speech detected yet, still listening."))
            .expect("no-speech status");
        assert_eq!(no_speech.error, None);
        let network = events
            .iter()
            .find(|ev| ev.message.as_deref() == Some("Recognition hiccup (network), still recording."))
            .expect("network status");
        assert_eq!(network.state, SessionState::Listening);
        assert_eq!(network.error, Some(ErrorKind::TransientRecognitionGlitch));
        assert!(
            !events.iter().any(|ev| ev
                .message
                .as_deref()
                .is_some_and(|m| m.contains("aborted"))),
            "aborted is never surfaced"
        );
    }

    #[test]
    fn fatal_error_cancels_pending_restart() {
        let mut h = harness();
        listening(&mut h);
        ended(&mut h);
        let ticket = h.scheduler.pending()[0].1;

        h.session.handle(SessionEvent::Recognition(RecognitionEvent::Error(
            RecognitionErrorCode::NotAllowed,
        )));
        assert_eq!(h.session.state(), SessionState::Stopped);
        assert_eq!(h.session.last_error(), Some(ErrorKind::PermissionDenied));
        assert_eq!(h.scheduler.cancelled(), vec![ticket]);

        h.session.handle(SessionEvent::RestartDue(ticket));
        assert_eq!(starts(&h.calls), 1);
    }

    #[test]
    fn fatal_error_after_ended_does_not_restart() {
        let mut h = harness();
        listening(&mut h);
        h.session.handle(SessionEvent::Recognition(RecognitionEvent::Error(
            RecognitionErrorCode::LanguageNotSupported,
        )));
        ended(&mut h);
        assert_eq!(h.session.state(), SessionState::Stopped);
        assert!(h.scheduler.pending().is_empty());
        assert_eq!(h.session.last_error(), Some(ErrorKind::RecognitionFatal));
    }

    #[test]
    fn stop_mid_utterance_shows_but_does_not_commit_interim() {
        let mut h = harness();
        listening(&mut h);
        result(&mut h, &[("testing", false)]);

        let final_text = h.session.stop_session().expect("stop");
        assert_eq!(final_text, "testing");
        assert_eq!(h.session.transcript().confirmed, "");
        assert!(h.calls.snapshot().contains(&RecognitionCall::Stop));

        // Next session seeds from the display, not from any epoch counter:
        // a fresh final "ok" is new speech, not a suffix of "testing".
        listening(&mut h);
        result(&mut h, &[("ok", true)]);
        assert_eq!(h.session.transcript().confirmed, "testing ok ");
    }

    #[test]
    fn stop_prefers_confirmed_text() {
        let mut h = harness();
        listening(&mut h);
        result(&mut h, &[("hello world", true), (" and th", false)]);
        assert_eq!(h.session.stop_session().expect("stop"), "hello world");
    }

    #[test]
    fn stop_when_idle_is_not_running() {
        let mut h = harness();
        assert!(matches!(h.session.stop_session(), Err(SuaraError::NotRunning)));
    }

    #[test]
    fn stop_while_requesting_permission_ignores_late_grant() {
        let mut h = harness();
        h.session.replace_text("kept").expect("replace text");
        h.session.start_session().expect("start session");
        assert_eq!(h.session.stop_session().expect("stop"), "kept");
        h.session
            .handle(SessionEvent::Permission(PermissionOutcome::Granted));
        assert_eq!(h.session.state(), SessionState::Stopped);
        assert_eq!(starts(&h.calls), 0);
        assert!(!h.calls.snapshot().contains(&RecognitionCall::Stop));
    }

    #[test]
    fn results_after_stop_are_ignored() {
        let mut h = harness();
        listening(&mut h);
        result(&mut h, &[("satu", true)]);
        h.session.stop_session().expect("stop");
        result(&mut h, &[("satu", true), (" dua", true)]);
        assert_eq!(h.session.display_text(), "satu");
    }

    #[test]
    fn clear_empties_everything_and_resets_epoch() {
        let mut h = harness();
        let mut transcripts = h.session.subscribe_transcripts();
        listening(&mut h);
        result(&mut h, &[("hapus ini", true)]);
        ended(&mut h);
        assert_eq!(h.session.epoch(), 1);

        h.session.clear_session();
        assert_eq!(h.session.state(), SessionState::Stopped);
        assert_eq!(h.session.epoch(), 0);
        assert!(h.session.transcript().is_empty());
        assert_eq!(h.session.display_text(), "");
        assert!(h.scheduler.pending().is_empty());

        let mut last = None;
        loop {
            match transcripts.try_recv() {
                Ok(ev) => last = Some(ev),
                Err(TryRecvError::Empty) => break,
                Err(e) => panic!("unexpected recv error: {e}"),
            }
        }
        let last = last.expect("transcript event");
        assert!(last.is_final);
        assert_eq!(last.text, "");
    }

    #[test]
    fn clear_on_idle_session_moves_to_stopped() {
        let mut h = harness();
        h.session.clear_session();
        assert_eq!(h.session.state(), SessionState::Stopped);
        h.session.clear_session();
        assert_eq!(h.session.state(), SessionState::Stopped);
    }

    #[test]
    fn ended_drops_interim_tail_from_display() {
        let mut h = harness();
        listening(&mut h);
        result(&mut h, &[("sudah", true), (" belum sel", false)]);
        ended(&mut h);
        assert_eq!(h.session.display_text(), "sudah ");
        assert_eq!(h.session.transcript().provisional, "");
    }

    #[test]
    fn restart_cap_stops_session_when_exceeded() {
        let mut h = harness_with(SuaraConfig {
            max_consecutive_restarts: Some(2),
            ..SuaraConfig::default()
        });
        listening(&mut h);

        ended(&mut h);
        fire_due(&mut h);
        ended(&mut h);
        fire_due(&mut h);
        assert_eq!(h.session.state(), SessionState::Listening);

        ended(&mut h);
        assert_eq!(h.session.state(), SessionState::Stopped);
        assert_eq!(h.session.last_error(), Some(ErrorKind::RecognitionFatal));
    }

    #[test]
    fn results_reset_restart_cap() {
        let mut h = harness_with(SuaraConfig {
            max_consecutive_restarts: Some(1),
            ..SuaraConfig::default()
        });
        listening(&mut h);
        for word in ["a", "b", "c"] {
            result(&mut h, &[(word, true)]);
            ended(&mut h);
            fire_due(&mut h);
            assert_eq!(h.session.state(), SessionState::Listening);
        }
        assert_eq!(h.session.transcript().confirmed, "a b c ");
    }

    #[test]
    fn replace_text_refused_while_recording() {
        let mut h = harness();
        listening(&mut h);
        assert!(matches!(
            h.session.replace_text("x"),
            Err(SuaraError::AlreadyRunning)
        ));
    }
}
