//! Chat-completion client for an OpenAI-compatible provider (Groq by default).
//!
//! Single attempt per call, no retries. Callers decide whether a failure is
//! fatal (pipelines) or reported back to a user (chat).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use crate::error::{ServiceError, ServiceResult};

pub const DEFAULT_API_BASE: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_MODEL: &str = "meta-llama/llama-4-maverick-17b-128e-instruct";

/// One completion call: system prompt, instructions and the payload they apply to.
#[derive(Clone, Debug, Default)]
pub struct CompletionRequest {
    pub system_prompt: String,
    pub instructions: String,
    pub payload: String,
    pub response_format: Option<Value>,
}

impl CompletionRequest {
    pub fn new(
        system_prompt: impl Into<String>,
        instructions: impl Into<String>,
        payload: impl Into<String>,
    ) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            instructions: instructions.into(),
            payload: payload.into(),
            response_format: None,
        }
    }

    pub fn with_response_format(mut self, format: Value) -> Self {
        self.response_format = Some(format);
        self
    }

    pub fn user_content(&self) -> String {
        format!("{}\n{}", self.instructions, self.payload)
    }
}

/// Anything that can turn a [`CompletionRequest`] into raw model text.
pub trait CompletionProvider: Send + Sync {
    fn complete(&self, request: &CompletionRequest) -> ServiceResult<String>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionConfig {
    pub api_base: String,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    temperature: f32,
    top_p: f32,
    seed: u64,
    max_tokens: u32,
    frequency_penalty: f32,
    presence_penalty: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<&'a Value>,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct WireChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Blocking HTTP client for `POST {api_base}/chat/completions`.
pub struct GroqClient {
    base_url: String,
    api_key: String,
    model: String,
    agent: ureq::Agent,
}

impl GroqClient {
    /// Fails with a configuration error when no API key is set.
    pub fn new(config: CompletionConfig) -> ServiceResult<Self> {
        let api_key = config
            .api_key
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| ServiceError::Config("GROQ_API_KEY is not set".to_string()))?;
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build();
        Ok(Self {
            base_url: config.api_base.trim_end_matches('/').to_string(),
            api_key,
            model: config.model,
            agent,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

impl CompletionProvider for GroqClient {
    fn complete(&self, request: &CompletionRequest) -> ServiceResult<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let user_content = request.user_content();
        let body = WireRequest {
            model: &self.model,
            messages: vec![
                WireMessage {
                    role: "system",
                    content: &request.system_prompt,
                },
                WireMessage {
                    role: "user",
                    content: &user_content,
                },
            ],
            temperature: 0.0,
            top_p: 1.0,
            seed: 42,
            max_tokens: 2048,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
            response_format: request.response_format.as_ref(),
        };

        tracing::debug!(model = %self.model, chars = user_content.len(), "requesting completion");

        let response = self
            .agent
            .post(&url)
            .set("Authorization", &format!("Bearer {}", self.api_key))
            .send_json(&body)
            .map_err(|e| match e {
                ureq::Error::Status(code, resp) => {
                    let detail = resp.into_string().unwrap_or_default();
                    ServiceError::ApiError(format!("HTTP {code}: {}", detail.trim()))
                }
                ureq::Error::Transport(t) => {
                    ServiceError::NetworkError(format!("Failed to reach {url}: {t}"))
                }
            })?;

        let parsed: WireResponse = response
            .into_json()
            .map_err(|e| ServiceError::ApiError(format!("Unreadable completion response: {e}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ServiceError::ApiError("Completion contained no message".to_string()))
    }
}
