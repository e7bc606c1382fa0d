//! Event plumbing between collaborators and the session task.
//!
//! Every capability gets an explicit sink instead of capturing controller state.
//! A sink carries the activation epoch plus the id of the listen or playback it
//! belongs to, so the session task can tell current events from leftovers of a
//! stopped listen, a cancelled playback, or an earlier activation.

use crate::error::VoiceResult;
use crate::state::Language;
use tokio::sync::{mpsc, oneshot};

/// Why a transcriber stopped abnormally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscriberFault {
    /// The user or platform revoked microphone access.
    PermissionDenied,
    /// The recognizer or its input went away for good.
    Unavailable(String),
    /// Anything transient (network hiccup, no-speech, aborted).
    Other(String),
}

impl TranscriberFault {
    /// Recoverable faults restart listening after the debounce; the rest end the session.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, TranscriberFault::Other(_))
    }
}

#[derive(Debug)]
pub(crate) enum TranscriberEvent {
    Started,
    Result(String),
    Ended,
    Fault(TranscriberFault),
}

#[derive(Debug)]
pub(crate) enum Command {
    Activate(oneshot::Sender<VoiceResult<()>>),
    Deactivate(oneshot::Sender<()>),
    SetLanguage(Language),
    SetVoice(String),
    Shutdown,
}

#[derive(Debug)]
pub(crate) enum SessionEvent {
    Command(Command),
    Transcriber {
        epoch: u64,
        listen: u64,
        event: TranscriberEvent,
    },
    ReasoningDone {
        epoch: u64,
        request: u64,
        outcome: VoiceResult<String>,
    },
    Playback {
        epoch: u64,
        playback: u64,
        outcome: Result<(), String>,
    },
    RestartListening {
        epoch: u64,
        timer: u64,
    },
}

/// Handle a transcriber reports through for one `start` call.
#[derive(Debug, Clone)]
pub struct TranscriberSink {
    epoch: u64,
    listen: u64,
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl TranscriberSink {
    pub(crate) fn new(epoch: u64, listen: u64, tx: mpsc::UnboundedSender<SessionEvent>) -> Self {
        Self { epoch, listen, tx }
    }

    pub fn started(&self) {
        self.emit(TranscriberEvent::Started);
    }

    /// A recognized utterance. Empty text counts as "nothing heard".
    pub fn result(&self, text: impl Into<String>) {
        self.emit(TranscriberEvent::Result(text.into()));
    }

    pub fn ended(&self) {
        self.emit(TranscriberEvent::Ended);
    }

    pub fn error(&self, fault: TranscriberFault) {
        self.emit(TranscriberEvent::Fault(fault));
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    fn emit(&self, event: TranscriberEvent) {
        // Closed channel means the session is gone; nothing left to tell.
        let _ = self.tx.send(SessionEvent::Transcriber {
            epoch: self.epoch,
            listen: self.listen,
            event,
        });
    }
}

/// Handle a synthesizer reports completion through for one `speak` call.
#[derive(Debug, Clone)]
pub struct PlaybackSink {
    epoch: u64,
    playback: u64,
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl PlaybackSink {
    pub(crate) fn new(epoch: u64, playback: u64, tx: mpsc::UnboundedSender<SessionEvent>) -> Self {
        Self {
            epoch,
            playback,
            tx,
        }
    }

    pub fn finished(&self) {
        self.emit(Ok(()));
    }

    pub fn failed(&self, reason: impl Into<String>) {
        self.emit(Err(reason.into()));
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    fn emit(&self, outcome: Result<(), String>) {
        let _ = self.tx.send(SessionEvent::Playback {
            epoch: self.epoch,
            playback: self.playback,
            outcome,
        });
    }
}
