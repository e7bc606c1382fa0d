//! **ReasoningService**: the remote tutor that turns a spoken question into an answer.
//!
//! Replies carry a status string; only `"success"` with text is usable. Everything
//! else is folded into `VoiceError::Reasoning` so the controller has one failure path.

use crate::error::{VoiceError, VoiceResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_API_BASE: &str = "https://openrouter.ai/api/v1";
const DEFAULT_MODEL: &str = "google/gemini-2.5-flash";
const SUCCESS: &str = "success";

/// Spoken-mode tutor persona. Answers are read aloud, so no markup.
const VOICE_SYSTEM_INSTRUCTION: &str = "You are Academia Architect's voice core, a JEE/NEET tutor. \
    Be precise and pedagogical. Answers are spoken aloud: reply in two to five plain sentences, \
    no markdown, no LaTeX, spell out symbols and units.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReasoningRequest {
    pub prompt_text: String,
}

impl ReasoningRequest {
    pub fn new(prompt_text: impl Into<String>) -> Self {
        Self {
            prompt_text: prompt_text.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReasoningReply {
    pub status: String,
    #[serde(default)]
    pub text: Option<String>,
}

impl ReasoningReply {
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            status: SUCCESS.to_string(),
            text: Some(text.into()),
        }
    }

    pub fn with_status(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            text: None,
        }
    }

    /// The answer text, or an error for any non-success or empty reply.
    pub fn into_answer(self) -> VoiceResult<String> {
        if self.status != SUCCESS {
            return Err(VoiceError::Reasoning(format!(
                "non-success status: {}",
                self.status
            )));
        }
        match self.text {
            Some(text) if !text.trim().is_empty() => Ok(text),
            _ => Err(VoiceError::Reasoning("empty answer".to_string())),
        }
    }
}

/// Remote reasoning capability. Exactly one request is outstanding per session.
#[async_trait::async_trait]
pub trait ReasoningService: Send + Sync {
    async fn ask(&self, request: ReasoningRequest) -> VoiceResult<ReasoningReply>;
}

// OpenAI-compatible chat completion wire types
#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    #[serde(default)]
    content: Option<String>,
}

/// Reasoning over any OpenAI-compatible `/chat/completions` endpoint (OpenRouter by default).
#[derive(Debug, Clone)]
pub struct OpenRouterReasoning {
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl OpenRouterReasoning {
    /// Build from environment: REASONING_API_URL, REASONING_API_KEY (or OPENROUTER_API_KEY), REASONING_MODEL.
    pub fn from_env() -> VoiceResult<Self> {
        let base_url =
            std::env::var("REASONING_API_URL").unwrap_or_else(|_| DEFAULT_API_BASE.to_string());
        let api_key = std::env::var("REASONING_API_KEY")
            .or_else(|_| std::env::var("OPENROUTER_API_KEY"))
            .map_err(|_| {
                VoiceError::Config(
                    "reasoning requires REASONING_API_KEY or OPENROUTER_API_KEY".to_string(),
                )
            })?;
        let model = std::env::var("REASONING_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        Self::new(base_url, api_key, model)
    }

    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> VoiceResult<Self> {
        let api_key = api_key.into().trim().to_string();
        if api_key.is_empty() {
            return Err(VoiceError::Config("reasoning API key is empty".to_string()));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| VoiceError::Config(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into(),
            api_key,
            model: model.into(),
            client,
        })
    }
}

#[async_trait::async_trait]
impl ReasoningService for OpenRouterReasoning {
    async fn ask(&self, request: ReasoningRequest) -> VoiceResult<ReasoningReply> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let body = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: VOICE_SYSTEM_INSTRUCTION.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: request.prompt_text,
                },
            ],
            temperature: Some(0.7),
            max_tokens: Some(512),
        };

        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(VoiceError::Reasoning(format!(
                "API error {}: {}",
                status, body
            )));
        }

        let parsed: ChatResponse = res
            .json()
            .await
            .map_err(|e| VoiceError::Reasoning(format!("malformed response: {}", e)))?;
        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|t| t.trim().to_string())
            .unwrap_or_default();
        if text.is_empty() {
            return Ok(ReasoningReply::with_status("empty"));
        }
        Ok(ReasoningReply::success(text))
    }
}

/// Offline reasoning: answers with a fixed reply, or echoes the prompt back.
#[derive(Debug, Default)]
pub struct PlaceholderReasoning {
    /// If set, return this instead of the echo.
    pub response: Option<String>,
}

impl PlaceholderReasoning {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(s: impl Into<String>) -> Self {
        Self {
            response: Some(s.into()),
        }
    }
}

#[async_trait::async_trait]
impl ReasoningService for PlaceholderReasoning {
    async fn ask(&self, request: ReasoningRequest) -> VoiceResult<ReasoningReply> {
        let text = match self.response {
            Some(ref r) => r.clone(),
            None => format!(
                "You asked: {}. Connect a reasoning API key for a real answer.",
                request.prompt_text
            ),
        };
        Ok(ReasoningReply::success(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_reply_yields_text() {
        let reply = ReasoningReply::success("Entropy is...");
        assert_eq!(reply.into_answer().unwrap(), "Entropy is...");
    }

    #[test]
    fn non_success_status_is_an_error() {
        let reply = ReasoningReply {
            status: "error".to_string(),
            text: Some("quota exceeded".to_string()),
        };
        assert!(matches!(reply.into_answer(), Err(VoiceError::Reasoning(_))));
    }

    #[test]
    fn blank_success_is_an_error() {
        assert!(ReasoningReply::success("   ").into_answer().is_err());
    }

    #[test]
    fn request_uses_prompt_text_on_the_wire() {
        let json = serde_json::to_value(ReasoningRequest::new("define entropy")).unwrap();
        assert_eq!(json["promptText"], "define entropy");
    }

    #[test]
    fn reply_parses_without_text() {
        let reply: ReasoningReply = serde_json::from_str(r#"{"status":"blocked"}"#).unwrap();
        assert_eq!(reply.text, None);
        assert!(reply.into_answer().is_err());
    }

    #[tokio::test]
    async fn placeholder_echoes_prompt() {
        let reply = PlaceholderReasoning::new()
            .ask(ReasoningRequest::new("what is a mole"))
            .await
            .unwrap();
        assert!(reply.into_answer().unwrap().contains("what is a mole"));
    }

    #[test]
    fn empty_key_rejected() {
        assert!(OpenRouterReasoning::new(DEFAULT_API_BASE, "  ", DEFAULT_MODEL).is_err());
    }
}
