use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::Deserialize;
use serde_json::Value;

pub const OPENAI_API_BASE: &str = "https://api.openai.com/v1";

/// The external text-completion service.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Reply to a single prompt. An empty string means the service produced
    /// no text.
    async fn generate_reply(&self, prompt: &str) -> Result<String>;
}

/// Chat-completions client (HTTP direct, no SDK).
pub struct OpenAiClient {
    http_client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OpenAiClient {
    pub fn new(
        api_key: &str,
        model: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", api_key))
                .context("Invalid API key format")?,
        );

        let http_client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        let base_url: String = base_url.into();

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.into(),
        })
    }
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn generate_reply(&self, prompt: &str) -> Result<String> {
        let response = self
            .http_client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&build_request(&self.model, prompt))
            .send()
            .await
            .context("Failed to send request")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("OpenAI API error ({}): {}", status, error_text);
        }

        let raw: ChatCompletion = response
            .json()
            .await
            .context("Failed to parse response")?;

        Ok(raw.into_reply())
    }
}

/// Only the latest user message is sent; earlier turns of the thread are not.
fn build_request(model: &str, prompt: &str) -> Value {
    serde_json::json!({
        "model": model,
        "messages": [
            { "role": "user", "content": prompt }
        ],
    })
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl ChatCompletion {
    fn into_reply(self) -> String {
        self.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default()
    }
}
