use std::time::Duration;

use async_trait::async_trait;
use papa_core::{AnalysisError, LlmConfig, PapaError};
use serde::{Deserialize, Serialize};

use crate::pipeline::Analyzer;
use crate::prompt;

/// A message in a chat conversation with the LLM.
///
/// # Examples
///
/// ```
/// use papa_review::llm::{ChatMessage, Role};
///
/// let msg = ChatMessage {
///     role: Role::User,
///     content: "Review this code".into(),
/// };
/// assert!(matches!(msg.role, Role::User));
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    /// Role of the message sender.
    pub role: Role,
    /// Text content of the message.
    pub content: String,
}

/// Role in the chat conversation.
///
/// # Examples
///
/// ```
/// use papa_review::llm::Role;
///
/// let role = Role::System;
/// assert_eq!(serde_json::to_string(&role).unwrap(), "\"system\"");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System-level instructions.
    System,
    /// User input.
    User,
    /// Assistant response.
    Assistant,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    error: Option<ProviderError>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ProviderError {
    message: String,
}

/// OpenAI-compatible chat completions client.
///
/// Works with any provider that exposes the `/v1/chat/completions` endpoint:
/// DeepSeek (the default), OpenAI, Ollama, vLLM, LiteLLM, etc.
///
/// # Examples
///
/// ```
/// use papa_core::LlmConfig;
/// use papa_review::llm::LlmClient;
///
/// let config = LlmConfig {
///     api_key: Some("test-key".into()),
///     ..LlmConfig::default()
/// };
/// let client = LlmClient::new(&config).unwrap();
/// assert_eq!(client.model(), "deepseek-coder");
/// ```
pub struct LlmClient {
    client: reqwest::Client,
    config: LlmConfig,
}

impl LlmClient {
    /// Create a new LLM client from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`PapaError::Config`] if the HTTP client cannot be built.
    pub fn new(config: &LlmConfig) -> Result<Self, PapaError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PapaError::Config(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    /// Return the model name from the configuration.
    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Send a chat completion request and return the text response.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError::Transport`] when the request cannot be sent
    /// or the body cannot be read, [`AnalysisError::Provider`] on a
    /// non-success status or an `error` object, and
    /// [`AnalysisError::EmptyResponse`] when no content comes back.
    pub async fn chat(&self, messages: Vec<ChatMessage>) -> Result<String, AnalysisError> {
        let url = format!(
            "{}/v1/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );

        let body = serde_json::json!({
            "model": self.config.model,
            "messages": messages,
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature,
        });

        let mut request = self.client.post(&url);
        if let Some(api_key) = &self.config.api_key {
            request = request.header("Authorization", format!("Bearer {api_key}"));
        }
        request = request.header("Content-Type", "application/json");

        let response = request
            .json(&body)
            .send()
            .await
            .map_err(|e| AnalysisError::Transport(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(AnalysisError::Provider(format!(
                "LLM API error {status}: {body_text}"
            )));
        }

        let text = response
            .text()
            .await
            .map_err(|e| AnalysisError::Transport(format!("failed to read response: {e}")))?;
        let parsed: CompletionResponse = serde_json::from_str(&text).map_err(|e| {
            AnalysisError::Provider(format!("unexpected response structure: {e}"))
        })?;

        if let Some(error) = parsed.error {
            return Err(AnalysisError::Provider(error.message));
        }

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(AnalysisError::EmptyResponse)
    }
}

#[async_trait]
impl Analyzer for LlmClient {
    async fn analyze(&self, diff: &str) -> Result<String, AnalysisError> {
        let messages = vec![
            ChatMessage {
                role: Role::System,
                content: prompt::build_system_prompt(),
            },
            ChatMessage {
                role: Role::User,
                content: prompt::build_review_prompt(diff),
            },
        ];
        tracing::debug!(model = %self.config.model, diff_bytes = diff.len(), "requesting analysis");
        self.chat(messages).await
    }
}
