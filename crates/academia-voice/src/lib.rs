//! # Academia Voice - Live Voice Session
//!
//! The controller behind the live tutoring conversation: listen for a question,
//! ask the reasoning service, speak the answer, listen again. Speech recognition,
//! reasoning and speech synthesis are injected capabilities; this crate owns the
//! turn-taking, cancellation and persistence around them.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                  VoiceSessionController                       │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐      │
//! │  │ Transcriber  │ → │  Reasoning   │ → │ Synthesizer  │      │
//! │  │ (utterances) │   │ (one at a    │   │ (playback +  │      │
//! │  │              │   │   time)      │   │   cancel)    │      │
//! │  └──────────────┘   └──────────────┘   └──────────────┘      │
//! │         ↑              restart debounce         │             │
//! │         └───────────────────────────────────────┘             │
//! │                         │ turns                               │
//! │                 ┌──────────────┐                              │
//! │                 │ Conversation │  fire-and-forget (sled)      │
//! │                 │     Log      │                              │
//! │                 └──────────────┘                              │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod controller;
pub mod conversation_log;
pub mod device;
pub mod error;
pub mod event;
pub mod reasoning;
pub mod state;
pub mod synthesizer;
pub mod transcriber;
pub mod turn;

pub use config::VoiceConfig;
pub use controller::{Capabilities, VoiceSessionController};
pub use conversation_log::{
    ConversationLog, ConversationStore, LogEntry, MemoryConversationLog, SledConversationLog,
    UserScope,
};
pub use device::{DeviceGuard, DeviceKind, DeviceRegistry};
pub use error::{VoiceError, VoiceResult};
pub use event::{PlaybackSink, TranscriberFault, TranscriberSink};
pub use reasoning::{
    OpenRouterReasoning, PlaceholderReasoning, ReasoningReply, ReasoningRequest, ReasoningService,
};
pub use state::{Language, StatusEvent, VoiceStatus};
pub use synthesizer::{
    CommandFlavor, CommandSynthesizer, PlaceholderSynthesizer, SpeechRequest, SpeechSynthesizer,
};
pub use transcriber::{LineTranscriber, SpeechTranscriber};
pub use turn::{History, Turn};
