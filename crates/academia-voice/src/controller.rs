//! Voice Session Controller - the live conversation loop
//!
//! One task owns all session state and processes commands and collaborator
//! events strictly one at a time, in arrival order:
//!
//! ```text
//!   activate ─▶ listening ──utterance──▶ thinking ──answer──▶ speaking
//!                  ▲   │                    │                    │
//!                  │   └─empty/no result─┐  └──failure──┐        │
//!                  └────── debounce ◀────┴──────────────┴─ end ──┘
//! ```
//!
//! Each activation gets a fresh epoch. Sinks, reasoning tasks and debounce timers
//! carry the epoch they were created under, so anything arriving from an earlier
//! activation is dropped instead of mutating the current one.

use crate::config::VoiceConfig;
use crate::conversation_log::{ConversationLog, SessionLog};
use crate::device::{DeviceGuard, DeviceKind, DeviceRegistry};
use crate::error::{VoiceError, VoiceResult};
use crate::event::{
    Command, PlaybackSink, SessionEvent, TranscriberEvent, TranscriberFault, TranscriberSink,
};
use crate::reasoning::{ReasoningRequest, ReasoningService};
use crate::state::{Language, StatusEvent, VoiceStatus};
use crate::synthesizer::{SpeechRequest, SpeechSynthesizer};
use crate::transcriber::SpeechTranscriber;
use crate::turn::{History, Turn};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Consecutive non-fatal restart failures before the session gives up.
const MAX_RESTART_FAILURES: u32 = 5;

/// Collaborators the controller drives.
pub struct Capabilities {
    pub transcriber: Arc<dyn SpeechTranscriber>,
    pub reasoning: Arc<dyn ReasoningService>,
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
    /// `None` for guests: turns stay in memory only.
    pub log: Option<ConversationLog>,
    pub devices: Arc<DeviceRegistry>,
}

impl Capabilities {
    pub fn new(
        transcriber: Arc<dyn SpeechTranscriber>,
        reasoning: Arc<dyn ReasoningService>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
    ) -> Self {
        Self {
            transcriber,
            reasoning,
            synthesizer,
            log: None,
            devices: DeviceRegistry::global(),
        }
    }

    pub fn with_log(mut self, log: ConversationLog) -> Self {
        self.log = Some(log);
        self
    }

    pub fn with_devices(mut self, devices: Arc<DeviceRegistry>) -> Self {
        self.devices = devices;
        self
    }
}

/// State readable from outside the session task.
#[derive(Debug, Default)]
struct SessionView {
    history: History,
    live: bool,
    language: Language,
    voice: String,
}

/// Handle to a running voice session.
///
/// Dropping the handle tears the session down: the transcriber is stopped, the
/// synthesizer cancelled and the audio devices released.
pub struct VoiceSessionController {
    tx: mpsc::UnboundedSender<SessionEvent>,
    status_rx: watch::Receiver<VoiceStatus>,
    view: Arc<RwLock<SessionView>>,
    task: JoinHandle<()>,
}

impl VoiceSessionController {
    /// Spawn the session task. Must be called inside a tokio runtime.
    pub fn spawn(config: VoiceConfig, capabilities: Capabilities) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(VoiceStatus::Idle);
        let view = Arc::new(RwLock::new(SessionView {
            language: config.language,
            voice: config.voice.clone(),
            ..Default::default()
        }));

        let session = Session {
            language: config.language,
            voice: config.voice.clone(),
            config,
            caps: capabilities,
            status: VoiceStatus::Idle,
            status_tx,
            view: Arc::clone(&view),
            tx: tx.clone(),
            live: false,
            epoch: 0,
            next_id: 0,
            listening: None,
            in_flight: None,
            playback: None,
            restart: None,
            restart_failures: 0,
            guards: Vec::new(),
            session_log: None,
        };
        let task = tokio::spawn(session.run(rx));

        Self {
            tx,
            status_rx,
            view,
            task,
        }
    }

    /// Switch the session on. No-op when already live.
    ///
    /// Fails with `VoiceError::Permission`/`DeviceUnavailable` when the transcriber
    /// cannot be acquired and `DeviceBusy` when another session holds the devices;
    /// the status stays `idle` and the session can be activated again.
    pub async fn activate(&self) -> VoiceResult<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(Command::Activate(reply_tx))?;
        reply_rx
            .await
            .map_err(|_| VoiceError::ChannelSend("voice session task stopped".to_string()))?
    }

    /// Switch the session off. Idempotent. On return the transcriber has been told
    /// to stop, the synthesizer to cancel, and the status is `idle`.
    pub async fn deactivate(&self) {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.send(Command::Deactivate(reply_tx)).is_ok() {
            let _ = reply_rx.await;
        }
    }

    pub fn current_status(&self) -> VoiceStatus {
        *self.status_rx.borrow()
    }

    /// Receiver that sees every status change (for UIs).
    pub fn subscribe(&self) -> watch::Receiver<VoiceStatus> {
        self.status_rx.clone()
    }

    /// Turns of the current (or most recent) activation, oldest first.
    pub fn history(&self) -> Vec<Turn> {
        self.read_view(|v| v.history.snapshot())
    }

    pub fn is_live(&self) -> bool {
        self.read_view(|v| v.live)
    }

    pub fn language(&self) -> Language {
        self.read_view(|v| v.language)
    }

    /// Takes effect at the next transcriber start and the next reply spoken.
    pub fn set_language(&self, language: Language) {
        let _ = self.send(Command::SetLanguage(language));
    }

    pub fn voice(&self) -> String {
        self.read_view(|v| v.voice.clone())
    }

    /// Takes effect at the next reply spoken. Blank names are ignored.
    pub fn set_voice(&self, voice: impl Into<String>) {
        let _ = self.send(Command::SetVoice(voice.into()));
    }

    fn send(&self, command: Command) -> VoiceResult<()> {
        self.tx
            .send(SessionEvent::Command(command))
            .map_err(|e| VoiceError::ChannelSend(e.to_string()))
    }

    fn read_view<T>(&self, f: impl FnOnce(&SessionView) -> T) -> T {
        let view = self.view.read().unwrap_or_else(|e| e.into_inner());
        f(&view)
    }
}

impl Drop for VoiceSessionController {
    fn drop(&mut self) {
        if self.send(Command::Shutdown).is_err() {
            self.task.abort();
        }
    }
}

/// Session state, owned by the session task.
struct Session {
    config: VoiceConfig,
    caps: Capabilities,
    status: VoiceStatus,
    status_tx: watch::Sender<VoiceStatus>,
    view: Arc<RwLock<SessionView>>,
    tx: mpsc::UnboundedSender<SessionEvent>,
    live: bool,
    language: Language,
    voice: String,
    epoch: u64,
    /// Source of listen/request/playback/timer ids.
    next_id: u64,
    /// Id of the transcriber listen currently running.
    listening: Option<u64>,
    /// The single outstanding reasoning request.
    in_flight: Option<(u64, JoinHandle<()>)>,
    playback: Option<u64>,
    restart: Option<(u64, JoinHandle<()>)>,
    /// Non-fatal restart failures since the last successful start.
    restart_failures: u32,
    guards: Vec<DeviceGuard>,
    session_log: Option<SessionLog>,
}

impl Session {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<SessionEvent>) {
        while let Some(event) = rx.recv().await {
            match event {
                SessionEvent::Command(Command::Shutdown) => break,
                SessionEvent::Command(command) => self.on_command(command),
                SessionEvent::Transcriber {
                    epoch,
                    listen,
                    event,
                } => self.on_transcriber(epoch, listen, event),
                SessionEvent::ReasoningDone {
                    epoch,
                    request,
                    outcome,
                } => self.on_reasoning(epoch, request, outcome),
                SessionEvent::Playback {
                    epoch,
                    playback,
                    outcome,
                } => self.on_playback(epoch, playback, outcome),
                SessionEvent::RestartListening { epoch, timer } => self.on_restart(epoch, timer),
            }
        }
        if self.live {
            self.teardown("session closed");
        }
        debug!(target: "academia::voice", "voice session task stopped");
    }

    fn on_command(&mut self, command: Command) {
        match command {
            Command::Activate(reply) => {
                let _ = reply.send(self.activate());
            }
            Command::Deactivate(reply) => {
                if self.live {
                    self.teardown("deactivated");
                }
                let _ = reply.send(());
            }
            Command::SetLanguage(language) => {
                info!(target: "academia::voice", language = language.code(), "language changed");
                self.language = language;
                self.write_view(|v| v.language = language);
            }
            Command::SetVoice(voice) => {
                let voice = voice.trim().to_string();
                if voice.is_empty() {
                    debug!(target: "academia::voice", "ignoring blank voice");
                    return;
                }
                info!(target: "academia::voice", voice = %voice, "voice changed");
                self.write_view(|v| v.voice = voice.clone());
                self.voice = voice;
            }
            Command::Shutdown => {}
        }
    }

    fn activate(&mut self) -> VoiceResult<()> {
        if self.live {
            return Ok(());
        }

        let mic = self
            .caps
            .devices
            .acquire(DeviceKind::Microphone, &self.config.microphone_id)?;
        let speaker = self
            .caps
            .devices
            .acquire(DeviceKind::Speaker, &self.config.speaker_id)?;

        self.caps.synthesizer.cancel();
        self.epoch += 1;

        let listen = self.next_id();
        let sink = TranscriberSink::new(self.epoch, listen, self.tx.clone());
        if let Err(e) = self.caps.transcriber.start(self.language.locale(), sink) {
            warn!(target: "academia::voice", error = %e, "transcriber unavailable; session not started");
            return Err(if e.is_fatal() {
                e
            } else {
                VoiceError::DeviceUnavailable(e.to_string())
            });
        }

        self.live = true;
        self.restart_failures = 0;
        self.listening = Some(listen);
        self.guards = vec![mic, speaker];
        self.session_log = self.caps.log.as_ref().map(ConversationLog::begin_session);
        self.write_view(|v| {
            v.history.clear();
            v.live = true;
        });
        info!(target: "academia::voice", epoch = self.epoch, locale = self.language.locale(), "voice session activated");
        self.transition(StatusEvent::Activated);
        Ok(())
    }

    /// Stop everything and return to idle. Used for deactivation and unrecoverable faults.
    fn teardown(&mut self, reason: &str) {
        self.live = false;
        self.epoch += 1;

        if let Some((_, timer)) = self.restart.take() {
            timer.abort();
        }
        if let Some((request, task)) = self.in_flight.take() {
            debug!(target: "academia::voice", request, "abandoning in-flight reasoning request");
            task.abort();
        }
        self.listening = None;
        self.playback = None;
        self.caps.transcriber.stop();
        self.caps.synthesizer.cancel();
        self.guards.clear();
        self.session_log = None;

        self.write_view(|v| v.live = false);
        info!(target: "academia::voice", reason, "voice session stopped");
        self.transition(StatusEvent::Deactivated);
    }

    fn on_transcriber(&mut self, epoch: u64, listen: u64, event: TranscriberEvent) {
        if epoch != self.epoch || self.listening != Some(listen) {
            debug!(target: "academia::voice", epoch, listen, ?event, "dropping stale transcriber event");
            return;
        }

        match event {
            TranscriberEvent::Started => {
                debug!(target: "academia::voice", listen, "transcriber started");
            }
            TranscriberEvent::Result(text) => self.on_utterance(text),
            TranscriberEvent::Ended => {
                self.listening = None;
                self.transition(StatusEvent::ListenEndedEmpty);
                self.schedule_restart();
            }
            TranscriberEvent::Fault(fault) => {
                self.listening = None;
                if fault.is_recoverable() {
                    warn!(target: "academia::voice", ?fault, "transcriber fault; will restart");
                    self.transition(StatusEvent::ListenEndedEmpty);
                    self.schedule_restart();
                } else {
                    warn!(target: "academia::voice", ?fault, "transcriber lost; ending session");
                    self.teardown(match fault {
                        TranscriberFault::PermissionDenied => "microphone permission revoked",
                        _ => "transcriber unavailable",
                    });
                }
            }
        }
    }

    fn on_utterance(&mut self, text: String) {
        if self.status != VoiceStatus::Listening || self.in_flight.is_some() {
            debug!(target: "academia::voice", status = %self.status, "dropping utterance while busy");
            return;
        }

        // Nothing more is heard until this utterance is resolved.
        self.caps.transcriber.stop();
        self.listening = None;

        let text = text.trim().to_string();
        if text.is_empty() {
            debug!(target: "academia::voice", "empty utterance");
            self.transition(StatusEvent::ListenEndedEmpty);
            self.schedule_restart();
            return;
        }

        self.transition(StatusEvent::UtteranceRecognized);
        self.record(Turn::user(text.clone()));
        self.ask(text);
    }

    fn ask(&mut self, prompt: String) {
        let request = self.next_id();
        let epoch = self.epoch;
        let timeout = self.config.reasoning_timeout();
        let reasoning = Arc::clone(&self.caps.reasoning);
        let tx = self.tx.clone();

        let task = tokio::spawn(async move {
            let outcome = match tokio::time::timeout(timeout, reasoning.ask(ReasoningRequest::new(prompt))).await {
                Ok(Ok(reply)) => reply.into_answer(),
                Ok(Err(e)) => Err(e),
                Err(_) => Err(VoiceError::Timeout(timeout)),
            };
            let _ = tx.send(SessionEvent::ReasoningDone {
                epoch,
                request,
                outcome,
            });
        });
        self.in_flight = Some((request, task));
    }

    fn on_reasoning(&mut self, epoch: u64, request: u64, outcome: VoiceResult<String>) {
        let current = self.in_flight.as_ref().map(|(id, _)| *id);
        if epoch != self.epoch || current != Some(request) {
            debug!(target: "academia::voice", epoch, request, "discarding stale reasoning reply");
            return;
        }
        self.in_flight = None;

        match outcome {
            Ok(answer) => {
                self.transition(StatusEvent::ReasoningSucceeded);
                self.record(Turn::model(answer.clone()));
                self.speak(answer);
            }
            Err(e) => {
                warn!(target: "academia::voice", error = %e, "reasoning failed; no reply this turn");
                self.transition(StatusEvent::ReasoningFailed);
                self.schedule_restart();
            }
        }
    }

    fn speak(&mut self, text: String) {
        // At most one playback: clear whatever might still be queued.
        self.caps.synthesizer.cancel();

        let playback = self.next_id();
        let sink = PlaybackSink::new(self.epoch, playback, self.tx.clone());
        let request = SpeechRequest {
            text,
            locale: self.language.locale().to_string(),
            voice: self.voice.clone(),
            pitch: self.config.speech_pitch,
            rate: self.config.speech_rate,
        };
        match self.caps.synthesizer.speak(request, sink) {
            Ok(()) => self.playback = Some(playback),
            Err(e) => {
                warn!(target: "academia::voice", error = %e, "synthesis failed to start");
                self.transition(StatusEvent::PlaybackEnded);
                self.schedule_restart();
            }
        }
    }

    fn on_playback(&mut self, epoch: u64, playback: u64, outcome: Result<(), String>) {
        if epoch != self.epoch || self.playback != Some(playback) {
            debug!(target: "academia::voice", epoch, playback, "dropping stale playback event");
            return;
        }
        self.playback = None;
        if let Err(reason) = outcome {
            warn!(target: "academia::voice", %reason, "playback failed");
        }
        self.transition(StatusEvent::PlaybackEnded);
        self.schedule_restart();
    }

    /// Restart the transcriber after the debounce, unless one is already pending.
    /// The delay doubles with each consecutive failed restart.
    fn schedule_restart(&mut self) {
        if !self.live || self.restart.is_some() {
            return;
        }
        let timer = self.next_id();
        let epoch = self.epoch;
        let delay = self.restart_delay();
        let tx = self.tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(SessionEvent::RestartListening { epoch, timer });
        });
        self.restart = Some((timer, handle));
    }

    fn on_restart(&mut self, epoch: u64, timer: u64) {
        let current = self.restart.as_ref().map(|(id, _)| *id);
        if epoch != self.epoch || current != Some(timer) {
            return;
        }
        self.restart = None;
        if !self.live || self.status != VoiceStatus::Listening || self.listening.is_some() {
            return;
        }

        let listen = self.next_id();
        let sink = TranscriberSink::new(self.epoch, listen, self.tx.clone());
        match self.caps.transcriber.start(self.language.locale(), sink) {
            Ok(()) => {
                debug!(target: "academia::voice", listen, "transcriber restarted");
                self.restart_failures = 0;
                self.listening = Some(listen);
            }
            Err(e) if e.is_fatal() => {
                warn!(target: "academia::voice", error = %e, "transcriber cannot restart; ending session");
                self.teardown("transcriber unavailable");
            }
            Err(e) => {
                self.restart_failures += 1;
                if self.restart_failures >= MAX_RESTART_FAILURES {
                    warn!(target: "academia::voice", error = %e, failures = self.restart_failures, "transcriber keeps failing; ending session");
                    self.teardown("transcriber keeps failing");
                    return;
                }
                warn!(target: "academia::voice", error = %e, failures = self.restart_failures, "transcriber restart failed; retrying");
                self.schedule_restart();
            }
        }
    }

    fn restart_delay(&self) -> Duration {
        self.config.restart_debounce() * 2u32.pow(self.restart_failures.min(MAX_RESTART_FAILURES))
    }

    fn record(&mut self, turn: Turn) {
        let stored = {
            let mut view = self.view.write().unwrap_or_else(|e| e.into_inner());
            view.history.push(turn).clone()
        };
        if let Some(log) = self.session_log.as_mut() {
            log.append(&stored);
        }
    }

    fn transition(&mut self, event: StatusEvent) {
        let from = self.status;
        let to = from.next(event, self.live);
        if from == to {
            return;
        }
        info!(target: "academia::voice", from = %from, to = %to, epoch = self.epoch, "status");
        self.status = to;
        self.status_tx.send_replace(to);
    }

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn write_view(&self, f: impl FnOnce(&mut SessionView)) {
        let mut view = self.view.write().unwrap_or_else(|e| e.into_inner());
        f(&mut view);
    }
}
