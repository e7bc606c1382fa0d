//! Session status and language.
//!
//! `VoiceStatus::next` is the whole transition table of the live session. The
//! controller never assigns a status directly; it feeds events through here so
//! the table can be checked without any collaborators attached.

use crate::error::{VoiceError, VoiceResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Exactly one of these is active at any instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoiceStatus {
    #[default]
    Idle,
    Listening,
    Thinking,
    Speaking,
}

/// Inputs to the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusEvent {
    /// User switched the session on.
    Activated,
    /// Transcriber delivered a non-empty utterance.
    UtteranceRecognized,
    /// Transcriber stopped without anything usable (no result, empty result, recoverable fault).
    ListenEndedEmpty,
    /// Reasoning service answered with a usable reply.
    ReasoningSucceeded,
    /// Reasoning service rejected, timed out, or answered with a non-success status.
    ReasoningFailed,
    /// Playback reached its end, or synthesis failed.
    PlaybackEnded,
    /// User switched the session off, or an unrecoverable fault tore it down.
    Deactivated,
}

impl VoiceStatus {
    /// Next status for `event`. `live` is the session's on/off flag *after* the event.
    /// Events that do not apply to the current status leave it unchanged (they are dropped).
    pub fn next(self, event: StatusEvent, live: bool) -> VoiceStatus {
        use StatusEvent::*;
        use VoiceStatus::*;

        let settle = if live { Listening } else { Idle };
        match (self, event) {
            (_, Deactivated) => Idle,
            (Idle, Activated) => Listening,
            (Listening, UtteranceRecognized) => Thinking,
            (Listening, ListenEndedEmpty) => settle,
            (Thinking, ReasoningSucceeded) => Speaking,
            (Thinking, ReasoningFailed) => settle,
            (Speaking, PlaybackEnded) => settle,
            (current, _) => current,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VoiceStatus::Idle => "idle",
            VoiceStatus::Listening => "listening",
            VoiceStatus::Thinking => "thinking",
            VoiceStatus::Speaking => "speaking",
        }
    }
}

impl fmt::Display for VoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Conversation language; selects the transcription and synthesis locale.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum Language {
    #[default]
    En,
    Gu,
}

impl Language {
    /// BCP-47 tag handed to the transcriber and synthesizer.
    pub fn locale(&self) -> &'static str {
        match self {
            Language::Gu => "gu-IN",
            Language::En => "en-US",
        }
    }

    /// Short code used in config files and by `espeak`-style voices.
    pub fn code(&self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Gu => "gu",
        }
    }
}

impl FromStr for Language {
    type Err = VoiceError;

    fn from_str(s: &str) -> VoiceResult<Self> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("gu") || s.eq_ignore_ascii_case("gu-IN") {
            Ok(Language::Gu)
        } else if s.eq_ignore_ascii_case("en")
            || s.eq_ignore_ascii_case("en-US")
            || s.eq_ignore_ascii_case("en-IN")
        {
            Ok(Language::En)
        } else {
            Err(VoiceError::Config(format!("unsupported language: {:?}", s)))
        }
    }
}

impl TryFrom<String> for Language {
    type Error = VoiceError;

    fn try_from(value: String) -> VoiceResult<Self> {
        value.parse()
    }
}
