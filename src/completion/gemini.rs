//! Google Gemini `generateContent` backend.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::time::Duration;

use super::{CompletionBackend, CompletionMode};
use crate::config::GeminiConfig;

/// Calls `POST {base_url}/models/{model}:generateContent` with the prompt
/// as the only user turn. JSON mode sets
/// `generationConfig.responseMimeType` to `application/json`.
pub struct GeminiBackend {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl GeminiBackend {
    pub fn new(config: &GeminiConfig, api_key: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint: format!(
                "{}/models/{}:generateContent",
                config.base_url.trim_end_matches('/'),
                config.model
            ),
            api_key: api_key.to_string(),
        })
    }
}

fn request_body(prompt: &str, mode: CompletionMode) -> serde_json::Value {
    let mut body = serde_json::json!({
        "contents": [
            { "role": "user", "parts": [{ "text": prompt }] }
        ],
    });
    if mode == CompletionMode::Json {
        body["generationConfig"] = serde_json::json!({
            "responseMimeType": "application/json",
        });
    }
    body
}

/// Concatenate the text parts of the first candidate.
fn parse_response(json: &serde_json::Value) -> Result<String> {
    let parts = json
        .pointer("/candidates/0/content/parts")
        .and_then(|p| p.as_array())
        .ok_or_else(|| {
            let reason = json
                .pointer("/promptFeedback/blockReason")
                .and_then(|r| r.as_str())
                .unwrap_or("missing candidates");
            anyhow::anyhow!("Invalid Gemini response: {}", reason)
        })?;

    Ok(parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect::<Vec<_>>()
        .concat())
}

#[async_trait]
impl CompletionBackend for GeminiBackend {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn complete(&self, prompt: &str, mode: CompletionMode) -> Result<String> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("x-goog-api-key", &self.api_key)
            .json(&request_body(prompt, mode))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("Gemini API error {}: {}", status, body_text);
        }

        let json: serde_json::Value = response.json().await?;
        parse_response(&json)
    }
}
