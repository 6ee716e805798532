use std::time::{Duration, Instant};

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use thiserror::Error;

use crate::core::config::Settings;
use crate::core::metrics;
use crate::db::models::ChatMessage;
use crate::services::prompts::TITLE_PROMPT;

#[derive(Debug, Error)]
pub(crate) enum CompletionError {
    #[error("completion request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("completion API returned {status}: {body}")]
    Upstream { status: u16, body: String },
    #[error("completion response had no content")]
    EmptyResponse,
}

/// Text generation backend. One attempt per call; callers decide what a
/// failure means.
#[async_trait]
pub(crate) trait CompletionService: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, CompletionError>;

    async fn titleize(&self, text: &str) -> Result<String, CompletionError>;
}

/// OpenAI-compatible `/chat/completions` client.
#[derive(Debug, Clone)]
pub(crate) struct OpenAiCompletionService {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    summarize_model: String,
    max_tokens: u32,
    temperature: f64,
    summarize_temperature: f64,
}

impl OpenAiCompletionService {
    pub(crate) fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let ai = settings.ai();
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .timeout(Duration::from_secs(ai.ai_request_timeout))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            api_key: ai.openai_api_key.clone(),
            base_url: ai.openai_base_url.trim_end_matches('/').to_string(),
            model: ai.ai_model.clone(),
            summarize_model: ai.summarize_model.clone(),
            max_tokens: ai.ai_max_tokens,
            temperature: ai.ai_temperature,
            summarize_temperature: ai.summarize_temperature,
        })
    }

    async fn chat_completion(
        &self,
        kind: &'static str,
        payload: Value,
    ) -> Result<String, CompletionError> {
        let timer = Instant::now();
        let url = format!("{}/chat/completions", self.base_url);

        let result = async {
            let response =
                self.client.post(&url).bearer_auth(&self.api_key).json(&payload).send().await?;
            let status = response.status();
            let body: Value = response.json().await.unwrap_or(Value::Null);
            if !status.is_success() {
                return Err(CompletionError::Upstream { status: status.as_u16(), body: body.to_string() });
            }
            extract_content(&body).ok_or(CompletionError::EmptyResponse)
        }
        .await;

        let outcome = if result.is_ok() { "ok" } else { "error" };
        metrics::completion_call(kind, outcome, timer.elapsed());
        match &result {
            Ok(_) => tracing::debug!(kind, elapsed_ms = timer.elapsed().as_millis() as u64, "Completion finished"),
            Err(err) => tracing::warn!(kind, error = %err, "Completion failed"),
        }

        result
    }
}

#[async_trait]
impl CompletionService for OpenAiCompletionService {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, CompletionError> {
        let payload = json!({
            "model": self.model,
            "messages": messages,
            "max_completion_tokens": self.max_tokens,
            "temperature": self.temperature,
        });
        self.chat_completion("reply", payload).await
    }

    async fn titleize(&self, text: &str) -> Result<String, CompletionError> {
        let payload = json!({
            "model": self.summarize_model,
            "messages": [
                {"role": "system", "content": TITLE_PROMPT},
                {"role": "user", "content": text},
            ],
            "temperature": self.summarize_temperature,
        });
        let title = clean_title(&self.chat_completion("title", payload).await?);
        if title.is_empty() {
            return Err(CompletionError::EmptyResponse);
        }
        Ok(title)
    }
}

fn extract_content(body: &Value) -> Option<String> {
    body.get("choices")
        .and_then(|choices| choices.get(0))
        .and_then(|choice| choice.get("message"))
        .and_then(|message| message.get("content"))
        .and_then(|value| value.as_str())
        .map(str::to_string)
}

fn clean_title(raw: &str) -> String {
    raw.trim().trim_matches('"').trim().to_string()
}
