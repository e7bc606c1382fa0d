//! **SpeechTranscriber**: turns live input into discrete recognized utterances.
//!
//! The controller calls `start` each time it wants one utterance and `stop` whenever
//! it must not hear anything (thinking, speaking, deactivated). Implementations
//! report back through the `TranscriberSink` they were started with.

use crate::error::VoiceResult;
use crate::event::{TranscriberFault, TranscriberSink};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};
use tokio::task::JoinHandle;
use tracing::debug;

/// Speech recognition capability.
pub trait SpeechTranscriber: Send + Sync {
    /// Begin listening in `locale` (e.g. "en-US", "gu-IN").
    ///
    /// Return `VoiceError::Permission` or `VoiceError::DeviceUnavailable` when the
    /// microphone cannot be acquired; the controller treats that as fatal.
    fn start(&self, locale: &str, sink: TranscriberSink) -> VoiceResult<()>;

    /// Stop listening. Must be safe to call when not listening.
    fn stop(&self);
}

/// Transcriber fed by text lines: each `start` waits for one line and reports it
/// as the recognized utterance. Backs the terminal host and scripted sessions.
pub struct LineTranscriber<R> {
    lines: Arc<tokio::sync::Mutex<Lines<R>>>,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl<R> LineTranscriber<R>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    pub fn new(reader: R) -> Self {
        Self {
            lines: Arc::new(tokio::sync::Mutex::new(reader.lines())),
            pending: Mutex::new(None),
        }
    }
}

impl<R> SpeechTranscriber for LineTranscriber<R>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    fn start(&self, locale: &str, sink: TranscriberSink) -> VoiceResult<()> {
        debug!(target: "academia::voice", locale, "line transcriber listening");
        let lines = Arc::clone(&self.lines);
        let handle = tokio::spawn(async move {
            sink.started();
            let mut lines = lines.lock().await;
            match lines.next_line().await {
                Ok(Some(line)) => {
                    sink.result(line.trim());
                    sink.ended();
                }
                Ok(None) => sink.error(TranscriberFault::Unavailable("input closed".to_string())),
                Err(e) => sink.error(TranscriberFault::Other(e.to_string())),
            }
        });
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = pending.replace(handle) {
            previous.abort();
        }
        Ok(())
    }

    fn stop(&self) {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(handle) = pending.take() {
            handle.abort();
        }
    }
}
