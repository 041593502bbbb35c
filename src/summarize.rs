//! Prose summaries of table samples from an external text-generation service.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::config::SummarizerSettings;
use crate::sqlite::Row;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SummarizeError {
    /// The service could not produce a summary; the message is for diagnostics.
    #[error("Summarization unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, table: &str, rows: &[Row]) -> Result<String, SummarizeError>;
}

pub fn build_prompt(rows: &[Row]) -> Result<String, SummarizeError> {
    let data = serde_json::to_string(rows)
        .map_err(|e| SummarizeError::Unavailable(format!("failed to encode rows: {}", e)))?;
    Ok(format!("Summarize this data: {}", data))
}

/// OpenRouter (OpenAI-compatible) chat completions client.
pub struct OpenRouterSummarizer {
    settings: SummarizerSettings,
    api_key: Option<String>,
    http_client: Client,
}

impl OpenRouterSummarizer {
    pub fn new(settings: SummarizerSettings, api_key: Option<String>) -> Result<Self, SummarizeError> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| SummarizeError::Unavailable(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            settings,
            api_key,
            http_client,
        })
    }

    /// Read the API key from the environment variable named in `settings`.
    pub fn from_env(settings: SummarizerSettings) -> Result<Self, SummarizeError> {
        let api_key = std::env::var(&settings.api_key_env)
            .ok()
            .filter(|key| !key.is_empty());
        if api_key.is_none() {
            warn!(
                env = %settings.api_key_env,
                "summarizer API key not set; summaries will be unavailable"
            );
        }
        Self::new(settings, api_key)
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/api/v1/chat/completions",
            self.settings.base_url.trim_end_matches('/')
        )
    }
}

/// Pull `choices[0].message.content` out of a chat completions response.
pub fn parse_completion(response: &Value) -> Result<String, SummarizeError> {
    response
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| {
            SummarizeError::Unavailable("response did not contain a completion".to_string())
        })
}

#[async_trait]
impl Summarizer for OpenRouterSummarizer {
    #[instrument(skip(self, rows), fields(rows = rows.len()), level = "debug")]
    async fn summarize(&self, table: &str, rows: &[Row]) -> Result<String, SummarizeError> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            SummarizeError::Unavailable(format!("{} is not set", self.settings.api_key_env))
        })?;

        let request_body = json!({
            "model": self.settings.model,
            "messages": [{ "role": "user", "content": build_prompt(rows)? }],
        });

        let response = self
            .http_client
            .post(self.endpoint())
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&request_body)
            .send()
            .await
            .map_err(|e| SummarizeError::Unavailable(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            warn!(%status, table, "summarizer returned an error");
            return Err(SummarizeError::Unavailable(format!(
                "API error (status {}): {}",
                status, error_text
            )));
        }

        let response_json: Value = response
            .json()
            .await
            .map_err(|e| SummarizeError::Unavailable(format!("failed to parse response: {}", e)))?;
        debug!(table, "received summary");
        parse_completion(&response_json)
    }
}
