//! OpenAI-compatible chat completions backend.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::time::Duration;

use super::{CompletionBackend, CompletionMode};
use crate::config::OpenAIConfig;

/// Calls `POST {base_url}/chat/completions` with a single user message,
/// bounded by `max_tokens`. JSON mode requests
/// `response_format = {"type": "json_object"}`.
///
/// Works with any server speaking the OpenAI chat API (Groq, Together,
/// local gateways) by pointing `base_url` at it.
pub struct OpenAIBackend {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    max_tokens: u32,
    api_key: String,
}

impl OpenAIBackend {
    pub fn new(config: &OpenAIConfig, api_key: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            api_key: api_key.to_string(),
        })
    }

    fn request_body(&self, prompt: &str, mode: CompletionMode) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "max_tokens": self.max_tokens,
        });
        if mode == CompletionMode::Json {
            body["response_format"] = serde_json::json!({ "type": "json_object" });
        }
        body
    }
}

fn parse_response(json: &serde_json::Value) -> Result<String> {
    json.pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("Invalid chat response: missing choices[0].message.content"))
}

#[async_trait]
impl CompletionBackend for OpenAIBackend {
    fn name(&self) -> &str {
        "openai"
    }

    async fn complete(&self, prompt: &str, mode: CompletionMode) -> Result<String> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&self.request_body(prompt, mode))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("OpenAI API error {}: {}", status, body_text);
        }

        let json: serde_json::Value = response.json().await?;
        parse_response(&json)
    }
}
