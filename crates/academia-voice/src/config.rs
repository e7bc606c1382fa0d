//! Voice session configuration.
//!
//! | Key | Default | Description |
//! |-----|---------|-------------|
//! | restart_debounce_ms | 300 | Delay before the transcriber restarts after a turn or an empty listen. |
//! | reasoning_timeout_secs | 20 | A reasoning call older than this counts as failed. |
//! | language | en | `en` or `gu`; picks transcription and synthesis locale. |
//! | voice | default | Synthesis voice: an espeak variant (`f3`) or a `say` voice name. |
//! | speech_pitch / speech_rate | 1.0 | Synthesis pitch and speed, 0.1..=2.0. |
//! | microphone_id / speaker_id | default | Device ids claimed exclusively while live. |
//! | log_path | ./data/voice_log | Sled directory for the conversation log. |
//! | user_id | (unset) | Signed-in user; unset means guest (nothing persisted). |

use crate::conversation_log::UserScope;
use crate::error::{VoiceError, VoiceResult};
use crate::state::Language;
use crate::synthesizer::DEFAULT_VOICE;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const PITCH_RATE_RANGE: std::ops::RangeInclusive<f32> = 0.1..=2.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceConfig {
    pub restart_debounce_ms: u64,
    pub reasoning_timeout_secs: u64,
    pub language: Language,
    pub voice: String,
    pub speech_pitch: f32,
    pub speech_rate: f32,
    pub microphone_id: String,
    pub speaker_id: String,
    pub log_path: String,
    #[serde(default)]
    pub user_id: Option<String>,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            restart_debounce_ms: 300,
            reasoning_timeout_secs: 20,
            language: Language::En,
            voice: DEFAULT_VOICE.to_string(),
            speech_pitch: 1.0,
            speech_rate: 1.0,
            microphone_id: "default".to_string(),
            speaker_id: "default".to_string(),
            log_path: "./data/voice_log".to_string(),
            user_id: None,
        }
    }
}

impl VoiceConfig {
    /// Load config from file and environment. Precedence: env `ACADEMIA__*` >
    /// file at `ACADEMIA_CONFIG` (default `config/voice`) > defaults.
    pub fn load() -> VoiceResult<Self> {
        let config_path =
            std::env::var("ACADEMIA_CONFIG").unwrap_or_else(|_| "config/voice".to_string());
        Self::load_from(&config_path)
    }

    /// Load from `path` (a file, or a stem whose extension `config` resolves), still
    /// honoring env overrides. A missing file just leaves the defaults in place.
    pub fn load_from(path: &str) -> VoiceResult<Self> {
        let defaults = Self::default();
        let builder = config::Config::builder()
            .set_default("restart_debounce_ms", defaults.restart_debounce_ms as i64)?
            .set_default("reasoning_timeout_secs", defaults.reasoning_timeout_secs as i64)?
            .set_default("language", defaults.language.code())?
            .set_default("voice", defaults.voice)?
            .set_default("speech_pitch", defaults.speech_pitch as f64)?
            .set_default("speech_rate", defaults.speech_rate as f64)?
            .set_default("microphone_id", defaults.microphone_id)?
            .set_default("speaker_id", defaults.speaker_id)?
            .set_default("log_path", defaults.log_path)?;

        let built = builder
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("ACADEMIA")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let loaded: Self = built.try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    pub fn validate(&self) -> VoiceResult<()> {
        if self.reasoning_timeout_secs == 0 {
            return Err(VoiceError::Config(
                "reasoning_timeout_secs must be positive".to_string(),
            ));
        }
        if !PITCH_RATE_RANGE.contains(&self.speech_pitch) {
            return Err(VoiceError::Config(format!(
                "speech_pitch {} outside 0.1..=2.0",
                self.speech_pitch
            )));
        }
        if !PITCH_RATE_RANGE.contains(&self.speech_rate) {
            return Err(VoiceError::Config(format!(
                "speech_rate {} outside 0.1..=2.0",
                self.speech_rate
            )));
        }
        if self.voice.trim().is_empty() {
            return Err(VoiceError::Config("voice must not be empty".to_string()));
        }
        if self.microphone_id.trim().is_empty() || self.speaker_id.trim().is_empty() {
            return Err(VoiceError::Config("device ids must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn restart_debounce(&self) -> Duration {
        Duration::from_millis(self.restart_debounce_ms)
    }

    pub fn reasoning_timeout(&self) -> Duration {
        Duration::from_secs(self.reasoning_timeout_secs)
    }

    /// Guest unless a non-blank `user_id` is configured.
    pub fn user_scope(&self) -> UserScope {
        match self.user_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => UserScope::User(id.to_string()),
            _ => UserScope::Guest,
        }
    }
}
