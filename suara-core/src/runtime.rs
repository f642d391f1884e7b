//! Async runtime hosting the dictation and read-aloud controllers.
//!
//! ```text
//! SuaraHandle ──Command──┐
//! PlatformEvents ────────┼──► mpsc (unbounded) ──► runtime task
//! TokioScheduler ─RestartDue┘                        │
//!                                   DictationSession + ReadAloud
//!                                                    │
//!                                   broadcast::Sender<…Event>
//! ```
//!
//! One tokio task owns both controllers and processes one message at a time,
//! so platform callbacks, UI commands and restart timers can never interleave
//! inside a transition. Commands carry a oneshot reply.

use std::collections::HashMap;
use std::ops::ControlFlow;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{
    config::SuaraConfig,
    error::{ErrorKind, Result, SuaraError},
    export::{export_text, DownloadSink, ExportKind},
    ipc::events::{
        SessionState, SessionStatusEvent, SpeechStatus, SpeechStatusEvent, TranscriptEvent,
    },
    platform::{PermissionOutcome, Platform, RecognitionEvent, SynthesisEvent},
    session::{DictationSession, RestartScheduler, RestartTicket, SessionEvent},
    speech::{ReadAloud, VoiceCache},
};

type Reply<T> = oneshot::Sender<Result<T>>;

enum Command {
    StartSession(Reply<()>),
    StopSession(Reply<String>),
    ClearSession(Reply<()>),
    ReplaceText(String, Reply<()>),
    Speak(String, Reply<()>),
    RepeatSpeech(Reply<()>),
    CancelSpeech(Reply<()>),
    Export {
        kind: ExportKind,
        /// `None` exports the dictation transcript currently on display.
        text: Option<String>,
        sink: Box<dyn DownloadSink + Send>,
        reply: Reply<String>,
    },
    Snapshot(Reply<SessionSnapshot>),
    Shutdown(Reply<()>),
}

enum RuntimeMessage {
    Command(Command),
    Session(SessionEvent),
    Synthesis(SynthesisEvent),
}

/// Point-in-time view of the runtime, for UIs that attach late.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub recording: bool,
    pub epoch: u64,
    pub text: String,
    pub confirmed: String,
    pub provisional: String,
    pub last_error: Option<ErrorKind>,
    pub speech: SpeechStatus,
}

// ---------------------------------------------------------------------------
// Restart timers
// ---------------------------------------------------------------------------

/// Restart scheduler backed by tokio timers.
///
/// Holds only a weak sender so pending timers never keep the runtime alive.
struct TokioScheduler {
    tx: mpsc::WeakUnboundedSender<RuntimeMessage>,
    timers: HashMap<RestartTicket, JoinHandle<()>>,
}

impl TokioScheduler {
    fn new(tx: &mpsc::UnboundedSender<RuntimeMessage>) -> Self {
        Self {
            tx: tx.downgrade(),
            timers: HashMap::new(),
        }
    }
}

impl RestartScheduler for TokioScheduler {
    fn schedule(&mut self, delay: Duration, ticket: RestartTicket) {
        self.timers.retain(|_, timer| !timer.is_finished());
        let tx = self.tx.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(tx) = tx.upgrade() {
                let _ = tx.send(RuntimeMessage::Session(SessionEvent::RestartDue(ticket)));
            }
        });
        if let Some(previous) = self.timers.insert(ticket, timer) {
            previous.abort();
        }
    }

    fn cancel(&mut self, ticket: RestartTicket) {
        if let Some(timer) = self.timers.remove(&ticket) {
            timer.abort();
            debug!(?ticket, "restart timer aborted");
        }
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        for (_, timer) in self.timers.drain() {
            timer.abort();
        }
    }
}

// ---------------------------------------------------------------------------
// Runtime task
// ---------------------------------------------------------------------------

pub struct SuaraRuntime {
    session: DictationSession,
    speech: ReadAloud,
    rx: mpsc::UnboundedReceiver<RuntimeMessage>,
}

impl SuaraRuntime {
    /// Build the controllers around `platform` and start the runtime task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(mut config: SuaraConfig, platform: Platform) -> SuaraHandle {
        config.normalize();
        let (tx, rx) = mpsc::unbounded_channel();

        let session = DictationSession::new(
            config.clone(),
            platform.recognition,
            platform.microphone,
            Box::new(TokioScheduler::new(&tx)),
        );
        let speech = ReadAloud::new(config, platform.synthesis);

        let handle = SuaraHandle {
            tx,
            transcript_tx: session.transcript_sender(),
            status_tx: session.status_sender(),
            speech_tx: speech.status_sender(),
            voices: speech.voice_cache(),
        };

        info!(
            recognition = session.has_recognition(),
            synthesis = speech.is_available(),
            "suara runtime starting"
        );
        let runtime = SuaraRuntime {
            session,
            speech,
            rx,
        };
        tokio::spawn(runtime.run());
        handle
    }

    async fn run(mut self) {
        while let Some(message) = self.rx.recv().await {
            match message {
                RuntimeMessage::Session(event) => self.session.handle(event),
                RuntimeMessage::Synthesis(event) => self.speech.handle(event),
                RuntimeMessage::Command(command) => {
                    if self.execute(command).is_break() {
                        break;
                    }
                }
            }
        }
        info!("suara runtime stopped");
    }

    fn execute(&mut self, command: Command) -> ControlFlow<()> {
        match command {
            Command::StartSession(reply) => {
                let _ = reply.send(self.session.start_session());
            }
            Command::StopSession(reply) => {
                let _ = reply.send(self.session.stop_session());
            }
            Command::ClearSession(reply) => {
                // The text being read aloud is gone too.
                self.speech.cancel();
                self.session.clear_session();
                let _ = reply.send(Ok(()));
            }
            Command::ReplaceText(text, reply) => {
                let _ = reply.send(self.session.replace_text(&text));
            }
            Command::Speak(text, reply) => {
                let _ = reply.send(self.speech.speak(&text));
            }
            Command::RepeatSpeech(reply) => {
                let _ = reply.send(self.speech.repeat());
            }
            Command::CancelSpeech(reply) => {
                self.speech.cancel();
                let _ = reply.send(Ok(()));
            }
            Command::Export {
                kind,
                text,
                mut sink,
                reply,
            } => {
                let text = text.unwrap_or_else(|| self.session.display_text().to_string());
                let result = export_text(&text, kind, sink.as_mut());
                if let Err(e) = &result {
                    warn!(error = %e, ?kind, "export failed");
                }
                let _ = reply.send(result);
            }
            Command::Snapshot(reply) => {
                let _ = reply.send(Ok(self.snapshot()));
            }
            Command::Shutdown(reply) => {
                if self.session.state().is_active() {
                    let _ = self.session.stop_session();
                }
                self.speech.cancel();
                // Later senders fail fast instead of queueing into a dead task.
                self.rx.close();
                let _ = reply.send(Ok(()));
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    fn snapshot(&self) -> SessionSnapshot {
        let transcript = self.session.transcript();
        SessionSnapshot {
            state: self.session.state(),
            recording: self.session.is_recording(),
            epoch: self.session.epoch(),
            text: self.session.display_text().to_string(),
            confirmed: transcript.confirmed.clone(),
            provisional: transcript.provisional.clone(),
            last_error: self.session.last_error(),
            speech: self.speech.status(),
        }
    }
}

// ---------------------------------------------------------------------------
// Handles
// ---------------------------------------------------------------------------

/// Cloneable UI-side handle. Every method is a message to the runtime task.
#[derive(Clone)]
pub struct SuaraHandle {
    tx: mpsc::UnboundedSender<RuntimeMessage>,
    transcript_tx: broadcast::Sender<TranscriptEvent>,
    status_tx: broadcast::Sender<SessionStatusEvent>,
    speech_tx: broadcast::Sender<SpeechStatusEvent>,
    voices: VoiceCache,
}

impl std::fmt::Debug for SuaraHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SuaraHandle")
            .field("closed", &self.tx.is_closed())
            .finish_non_exhaustive()
    }
}

impl SuaraHandle {
    async fn request<T>(&self, command: impl FnOnce(Reply<T>) -> Command) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(RuntimeMessage::Command(command(reply_tx)))
            .map_err(|_| SuaraError::RuntimeClosed)?;
        reply_rx.await.map_err(|_| SuaraError::RuntimeClosed)?
    }

    pub async fn start_session(&self) -> Result<()> {
        self.request(Command::StartSession).await
    }

    /// Returns the frozen transcript.
    pub async fn stop_session(&self) -> Result<String> {
        self.request(Command::StopSession).await
    }

    pub async fn clear_session(&self) -> Result<()> {
        self.request(Command::ClearSession).await
    }

    pub async fn replace_text(&self, text: impl Into<String>) -> Result<()> {
        let text = text.into();
        self.request(|reply| Command::ReplaceText(text, reply)).await
    }

    pub async fn speak(&self, text: impl Into<String>) -> Result<()> {
        let text = text.into();
        self.request(|reply| Command::Speak(text, reply)).await
    }

    pub async fn repeat_speech(&self) -> Result<()> {
        self.request(Command::RepeatSpeech).await
    }

    pub async fn cancel_speech(&self) -> Result<()> {
        self.request(Command::CancelSpeech).await
    }

    /// Export the dictation transcript as `rekaman-saya-<date>.txt`.
    pub async fn export_recording(&self, sink: impl DownloadSink + Send + 'static) -> Result<String> {
        let sink: Box<dyn DownloadSink + Send> = Box::new(sink);
        self.request(|reply| Command::Export {
            kind: ExportKind::Recorded,
            text: None,
            sink,
            reply,
        })
        .await
    }

    /// Export read-aloud editor text as `teks-saya-<date>.txt`.
    pub async fn export_written(
        &self,
        text: impl Into<String>,
        sink: impl DownloadSink + Send + 'static,
    ) -> Result<String> {
        let text = text.into();
        let sink: Box<dyn DownloadSink + Send> = Box::new(sink);
        self.request(|reply| Command::Export {
            kind: ExportKind::Written,
            text: Some(text),
            sink,
            reply,
        })
        .await
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot> {
        self.request(Command::Snapshot).await
    }

    /// Stop any session and playback, then end the runtime task.
    pub async fn shutdown(&self) -> Result<()> {
        self.request(Command::Shutdown).await
    }

    pub fn subscribe_transcripts(&self) -> broadcast::Receiver<TranscriptEvent> {
        self.transcript_tx.subscribe()
    }

    pub fn subscribe_status(&self) -> broadcast::Receiver<SessionStatusEvent> {
        self.status_tx.subscribe()
    }

    pub fn subscribe_speech(&self) -> broadcast::Receiver<SpeechStatusEvent> {
        self.speech_tx.subscribe()
    }

    pub fn voice_cache(&self) -> VoiceCache {
        self.voices.clone()
    }

    /// Entry point for platform callbacks.
    pub fn platform_events(&self) -> PlatformEvents {
        PlatformEvents {
            tx: self.tx.clone(),
        }
    }
}

/// Sender half given to the platform bridge.
#[derive(Clone)]
pub struct PlatformEvents {
    tx: mpsc::UnboundedSender<RuntimeMessage>,
}

impl std::fmt::Debug for PlatformEvents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlatformEvents")
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

impl PlatformEvents {
    fn send(&self, message: RuntimeMessage) -> Result<()> {
        self.tx.send(message).map_err(|_| SuaraError::RuntimeClosed)
    }

    pub fn deliver_recognition(&self, event: RecognitionEvent) -> Result<()> {
        self.send(RuntimeMessage::Session(SessionEvent::Recognition(event)))
    }

    pub fn deliver_permission(&self, outcome: PermissionOutcome) -> Result<()> {
        self.send(RuntimeMessage::Session(SessionEvent::Permission(outcome)))
    }

    pub fn deliver_synthesis(&self, event: SynthesisEvent) -> Result<()> {
        self.send(RuntimeMessage::Synthesis(event))
    }
}
