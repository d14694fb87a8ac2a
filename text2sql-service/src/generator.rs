//! SQL 生成模块
//!
//! Sends the prompt to a chat-completion model and returns its text.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::config::LlmSettings;
use common::errors::{AppError, AppResult};
use serde::{Deserialize, Serialize};

use crate::prompt::build_prompt;

/// A remote text-completion model.
#[async_trait]
pub trait CompletionModel: Send + Sync {
    /// Returns the model's raw text answer for `prompt`.
    async fn complete(&self, prompt: &str) -> AppResult<String>;

    /// Model identifier, for logging.
    fn name(&self) -> &str;
}

/// Groq chat-completions client (OpenAI-compatible wire format).
pub struct GroqChatModel {
    settings: LlmSettings,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

impl GroqChatModel {
    pub fn new(settings: LlmSettings) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| AppError::Internal(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { settings, client })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.settings.base_url)
    }
}

#[async_trait]
impl CompletionModel for GroqChatModel {
    async fn complete(&self, prompt: &str) -> AppResult<String> {
        let api_key = self
            .settings
            .api_key
            .as_deref()
            .ok_or_else(|| AppError::Configuration("GROQ_API_KEY is not set".into()))?;

        let body = ChatRequest {
            model: &self.settings.model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.settings.temperature,
        };

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::ExternalService(format!("model request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<serde_json::Value>(&text)
                .ok()
                .and_then(|json| json.pointer("/error/message").and_then(|m| m.as_str()).map(String::from))
                .unwrap_or(text);
            return Err(AppError::ExternalService(format!(
                "model returned {}: {}",
                status, detail
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| AppError::LlmResponse(format!("unreadable body: {}", e)))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| AppError::LlmResponse("response has no message content".into()))
    }

    fn name(&self) -> &str {
        &self.settings.model
    }
}

/// Turns a question into SQL through the prompt and the model.
#[derive(Clone)]
pub struct QueryGenerator {
    model: Arc<dyn CompletionModel>,
}

impl QueryGenerator {
    pub fn new(model: Arc<dyn CompletionModel>) -> Self {
        Self { model }
    }

    /// Generates SQL for `question`. The model output is trimmed but
    /// otherwise returned untouched.
    pub async fn generate_sql(&self, question: &str) -> AppResult<String> {
        let prompt = build_prompt(question);
        let raw = self.model.complete(&prompt).await?;
        let sql = raw.trim().to_string();
        tracing::info!(model = self.model.name(), sql = %sql, "SQL generated");
        Ok(sql)
    }
}
