//! Error types for the live voice session

use thiserror::Error;

/// Result type alias for voice operations
pub type VoiceResult<T> = Result<T, VoiceError>;

/// Errors that can occur while running a voice session
#[derive(Error, Debug)]
pub enum VoiceError {
    #[error("Microphone permission denied: {0}")]
    Permission(String),

    #[error("Audio device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("Audio device busy: {0} is held by another session")]
    DeviceBusy(String),

    #[error("Transcriber error: {0}")]
    Transcriber(String),

    #[error("Reasoning error: {0}")]
    Reasoning(String),

    #[error("Reasoning request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Synthesis error: {0}")]
    Synthesis(String),

    #[error("Conversation log error: {0}")]
    Log(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Channel send error: {0}")]
    ChannelSend(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl VoiceError {
    /// Fatal errors stop a session from starting; everything else folds back into the loop.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            VoiceError::Permission(_)
                | VoiceError::DeviceUnavailable(_)
                | VoiceError::DeviceBusy(_)
                | VoiceError::Config(_)
        )
    }
}

impl From<sled::Error> for VoiceError {
    fn from(err: sled::Error) -> Self {
        VoiceError::Log(err.to_string())
    }
}

impl From<serde_json::Error> for VoiceError {
    fn from(err: serde_json::Error) -> Self {
        VoiceError::Log(err.to_string())
    }
}

impl From<config::ConfigError> for VoiceError {
    fn from(err: config::ConfigError) -> Self {
        VoiceError::Config(err.to_string())
    }
}

impl From<reqwest::Error> for VoiceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            VoiceError::Reasoning(format!("request timed out: {}", err))
        } else {
            VoiceError::Reasoning(err.to_string())
        }
    }
}
