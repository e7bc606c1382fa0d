//! **SpeechSynthesizer**: speaks replies aloud and reports when playback ends.
//!
//! The controller cancels before every `speak`, so implementations only ever
//! have one playback to track. `cancel` must return promptly; tearing down the
//! audio device may finish in the background.

use crate::error::{VoiceError, VoiceResult};
use crate::event::PlaybackSink;
use std::process::Stdio;
use std::sync::Mutex;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Base speaking speed for rate 1.0, in words per minute.
const BASE_WPM: f32 = 175.0;

/// Voice name meaning "the engine's own voice for this locale".
pub const DEFAULT_VOICE: &str = "default";

#[derive(Debug, Clone, PartialEq)]
pub struct SpeechRequest {
    pub text: String,
    pub locale: String,
    /// Engine-specific voice: an espeak variant (`f3`, `m2`) or a `say` voice name.
    pub voice: String,
    /// 1.0 is the voice's natural pitch.
    pub pitch: f32,
    /// 1.0 is the voice's natural speed.
    pub rate: f32,
}

impl SpeechRequest {
    fn custom_voice(&self) -> Option<&str> {
        let voice = self.voice.trim();
        (!voice.is_empty() && voice != DEFAULT_VOICE).then_some(voice)
    }
}

/// Speech output capability.
pub trait SpeechSynthesizer: Send + Sync {
    /// Start speaking. Completion (or failure) is reported through `sink`.
    fn speak(&self, request: SpeechRequest, sink: PlaybackSink) -> VoiceResult<()>;

    /// Stop any playback. Safe to call when nothing is playing.
    fn cancel(&self);
}

/// Keeps the one playback task so `cancel` can abort it.
#[derive(Default)]
struct PlaybackSlot(Mutex<Option<JoinHandle<()>>>);

impl PlaybackSlot {
    fn replace(&self, handle: JoinHandle<()>) {
        let mut slot = self.0.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = slot.replace(handle) {
            previous.abort();
        }
    }

    fn abort(&self) -> bool {
        let mut slot = self.0.lock().unwrap_or_else(|e| e.into_inner());
        match slot.take() {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }
}

/// Which command-line TTS program to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandFlavor {
    /// `espeak-ng` / `espeak`: `-v <lang>[+variant] -p <0..99> -s <wpm> --stdin`
    Espeak,
    /// macOS `say`: `[-v <voice>] -r <wpm> -f -`
    Say,
}

/// Speaks through an OS text-to-speech program run as a child process.
/// Cancelling kills the child.
pub struct CommandSynthesizer {
    program: String,
    flavor: CommandFlavor,
    current: PlaybackSlot,
}

impl CommandSynthesizer {
    pub fn new(program: impl Into<String>, flavor: CommandFlavor) -> Self {
        Self {
            program: program.into(),
            flavor,
            current: PlaybackSlot::default(),
        }
    }

    /// `say` on macOS, `espeak-ng` elsewhere. `ACADEMIA_TTS_COMMAND` overrides the program;
    /// a program named `say` uses the `say` argument style.
    pub fn from_env() -> Self {
        let default = if cfg!(target_os = "macos") { "say" } else { "espeak-ng" };
        let program = std::env::var("ACADEMIA_TTS_COMMAND").unwrap_or_else(|_| default.to_string());
        let flavor = if program.rsplit('/').next() == Some("say") {
            CommandFlavor::Say
        } else {
            CommandFlavor::Espeak
        };
        Self::new(program, flavor)
    }

    /// Command-line flags. The text itself is written to stdin, so replies that
    /// start with `-` are never parsed as options.
    fn args(&self, request: &SpeechRequest) -> Vec<String> {
        let wpm = (BASE_WPM * request.rate).round().max(1.0) as u32;
        match self.flavor {
            CommandFlavor::Espeak => {
                let lang = request.locale.split('-').next().unwrap_or("en");
                let voice = match request.custom_voice() {
                    Some(variant) => format!("{}+{}", lang, variant),
                    None => lang.to_string(),
                };
                let pitch = (50.0 * request.pitch).round().clamp(0.0, 99.0) as u32;
                vec![
                    "-v".to_string(),
                    voice,
                    "-p".to_string(),
                    pitch.to_string(),
                    "-s".to_string(),
                    wpm.to_string(),
                    "--stdin".to_string(),
                ]
            }
            CommandFlavor::Say => {
                let mut args = Vec::with_capacity(6);
                if let Some(name) = request.custom_voice() {
                    args.push("-v".to_string());
                    args.push(name.to_string());
                }
                args.extend(["-r".to_string(), wpm.to_string(), "-f".to_string(), "-".to_string()]);
                args
            }
        }
    }
}

impl SpeechSynthesizer for CommandSynthesizer {
    fn speak(&self, request: SpeechRequest, sink: PlaybackSink) -> VoiceResult<()> {
        if request.text.trim().is_empty() {
            return Err(VoiceError::Synthesis("cannot speak empty text".to_string()));
        }
        let mut child = tokio::process::Command::new(&self.program)
            .args(self.args(&request))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| VoiceError::Synthesis(format!("{}: {}", self.program, e)))?;

        let stdin = child.stdin.take();
        let program = self.program.clone();
        let handle = tokio::spawn(async move {
            if let Some(mut stdin) = stdin {
                let written = stdin.write_all(request.text.as_bytes()).await;
                // Closing stdin marks the end of the text.
                drop(stdin);
                if let Err(e) = written {
                    sink.failed(format!("{}: writing text failed: {}", program, e));
                    return;
                }
            }
            match child.wait().await {
                Ok(status) if status.success() => sink.finished(),
                Ok(status) => sink.failed(format!("{} exited with {}", program, status)),
                Err(e) => sink.failed(e.to_string()),
            }
        });
        self.current.replace(handle);
        Ok(())
    }

    fn cancel(&self) {
        if self.current.abort() {
            info!(target: "academia::voice", "speech cancelled");
        }
    }
}

/// Silent synthesizer: "plays" for a duration proportional to the word count.
pub struct PlaceholderSynthesizer {
    words_per_second: f32,
    current: PlaybackSlot,
}

impl Default for PlaceholderSynthesizer {
    fn default() -> Self {
        Self::new(BASE_WPM / 60.0)
    }
}

impl PlaceholderSynthesizer {
    pub fn new(words_per_second: f32) -> Self {
        Self {
            words_per_second: words_per_second.max(0.1),
            current: PlaybackSlot::default(),
        }
    }

    fn duration_for(&self, request: &SpeechRequest) -> Duration {
        let words = request.text.split_whitespace().count() as f32;
        Duration::from_secs_f32(words / (self.words_per_second * request.rate.max(0.1)))
    }
}

impl SpeechSynthesizer for PlaceholderSynthesizer {
    fn speak(&self, request: SpeechRequest, sink: PlaybackSink) -> VoiceResult<()> {
        let duration = self.duration_for(&request);
        debug!(target: "academia::voice", ?duration, "placeholder speech");
        let handle = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            sink.finished();
        });
        self.current.replace(handle);
        Ok(())
    }

    fn cancel(&self) {
        self.current.abort();
    }
}
