//! Scripted collaborators for driving the controller deterministically.

#![allow(dead_code)]

use academia_voice::{
    ConversationStore, LogEntry, PlaybackSink, ReasoningReply, ReasoningRequest, ReasoningService,
    SpeechRequest, SpeechSynthesizer, SpeechTranscriber, TranscriberSink,
    VoiceError, VoiceResult, VoiceStatus,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

pub use academia_voice::VoiceSessionController;

/// Transcriber that records calls and lets the test speak through the last sink.
#[derive(Default)]
pub struct ScriptedTranscriber {
    state: Mutex<TranscriberState>,
}

#[derive(Default)]
struct TranscriberState {
    locales: Vec<String>,
    stops: usize,
    sink: Option<TranscriberSink>,
    denied: bool,
    failing: bool,
    attempts: usize,
}

impl ScriptedTranscriber {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn denying() -> Arc<Self> {
        let t = Self::default();
        t.state.lock().unwrap().denied = true;
        Arc::new(t)
    }

    pub fn set_denied(&self, denied: bool) {
        self.state.lock().unwrap().denied = denied;
    }

    /// Make every `start` fail with a recoverable error.
    pub fn set_failing(&self, failing: bool) {
        self.state.lock().unwrap().failing = failing;
    }

    /// Every `start` call, successful or not.
    pub fn attempts(&self) -> usize {
        self.state.lock().unwrap().attempts
    }

    /// Sink handed over by the most recent `start`.
    pub fn sink(&self) -> TranscriberSink {
        self.state
            .lock()
            .unwrap()
            .sink
            .clone()
            .expect("transcriber was never started")
    }

    pub fn say(&self, text: &str) {
        self.sink().result(text);
    }

    pub fn starts(&self) -> usize {
        self.state.lock().unwrap().locales.len()
    }

    pub fn locales(&self) -> Vec<String> {
        self.state.lock().unwrap().locales.clone()
    }

    pub fn stops(&self) -> usize {
        self.state.lock().unwrap().stops
    }
}

impl SpeechTranscriber for ScriptedTranscriber {
    fn start(&self, locale: &str, sink: TranscriberSink) -> VoiceResult<()> {
        let mut state = self.state.lock().unwrap();
        state.attempts += 1;
        if state.denied {
            return Err(VoiceError::Permission("microphone blocked".to_string()));
        }
        if state.failing {
            return Err(VoiceError::Transcriber("recognizer busy".to_string()));
        }
        state.locales.push(locale.to_string());
        state.sink = Some(sink);
        Ok(())
    }

    fn stop(&self) {
        self.state.lock().unwrap().stops += 1;
    }
}

/// Reasoning service with queued replies; optionally held until `release`.
pub struct ScriptedReasoning {
    replies: Mutex<VecDeque<VoiceResult<ReasoningReply>>>,
    prompts: Mutex<Vec<String>>,
    gate: Option<Semaphore>,
}

impl ScriptedReasoning {
    pub fn answering(text: &str) -> Arc<Self> {
        Self::build(vec![Ok(ReasoningReply::success(text))], false)
    }

    pub fn failing(error: VoiceError) -> Arc<Self> {
        Self::build(vec![Err(error)], false)
    }

    pub fn replying(reply: ReasoningReply) -> Arc<Self> {
        Self::build(vec![Ok(reply)], false)
    }

    /// Every call waits for a `release` before answering with `text`.
    pub fn gated(text: &str) -> Arc<Self> {
        Self::build(vec![Ok(ReasoningReply::success(text))], true)
    }

    fn build(replies: Vec<VoiceResult<ReasoningReply>>, gated: bool) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            prompts: Mutex::new(Vec::new()),
            gate: gated.then(|| Semaphore::new(0)),
        })
    }

    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(1);
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ReasoningService for ScriptedReasoning {
    async fn ask(&self, request: ReasoningRequest) -> VoiceResult<ReasoningReply> {
        self.prompts.lock().unwrap().push(request.prompt_text);
        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate closed").forget();
        }
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(ReasoningReply::success("ok")))
    }
}

/// Synthesizer that records requests and finishes only when told to.
#[derive(Default)]
pub struct ScriptedSynthesizer {
    state: Mutex<SynthState>,
}

#[derive(Default)]
struct SynthState {
    spoken: Vec<SpeechRequest>,
    cancels: usize,
    sink: Option<PlaybackSink>,
    fail_start: bool,
}

impl ScriptedSynthesizer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn broken() -> Arc<Self> {
        let s = Self::default();
        s.state.lock().unwrap().fail_start = true;
        Arc::new(s)
    }

    pub fn finish(&self) {
        if let Some(sink) = self.state.lock().unwrap().sink.clone() {
            sink.finished();
        }
    }

    pub fn fail(&self, reason: &str) {
        if let Some(sink) = self.state.lock().unwrap().sink.clone() {
            sink.failed(reason);
        }
    }

    pub fn spoken(&self) -> Vec<SpeechRequest> {
        self.state.lock().unwrap().spoken.clone()
    }

    pub fn cancels(&self) -> usize {
        self.state.lock().unwrap().cancels
    }
}

impl SpeechSynthesizer for ScriptedSynthesizer {
    fn speak(&self, request: SpeechRequest, sink: PlaybackSink) -> VoiceResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_start {
            return Err(VoiceError::Synthesis("no audio output".to_string()));
        }
        state.spoken.push(request);
        state.sink = Some(sink);
        Ok(())
    }

    fn cancel(&self) {
        self.state.lock().unwrap().cancels += 1;
    }
}

/// Store whose every write fails.
pub struct FailingStore;

impl ConversationStore for FailingStore {
    fn append(&self, _entry: &LogEntry) -> VoiceResult<()> {
        Err(VoiceError::Log("disk full".to_string()))
    }
}

/// Let every ready task run (paused clock: advances 1ms at most).
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

/// Wait (on the paused clock) until the controller reports `status`.
pub async fn wait_status(controller: &VoiceSessionController, status: VoiceStatus) {
    let mut rx = controller.subscribe();
    tokio::time::timeout(Duration::from_secs(60), rx.wait_for(|s| *s == status))
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {}", status))
        .map(|_| ())
        .expect("status channel closed");
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}
