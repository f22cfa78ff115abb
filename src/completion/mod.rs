//! Text and JSON completion with ordered provider fallback.
//!
//! A [`CompletionGateway`] holds an ordered list of [`CompletionBackend`]s
//! and tries them one at a time, one attempt each, until one produces a
//! usable answer:
//! - **[`GeminiBackend`]**: Google `generateContent`, the primary.
//! - **[`OpenAIBackend`]**: any OpenAI-compatible `chat/completions`
//!   endpoint, the secondary, capped at a fixed `max_tokens`.
//!
//! Backends whose API key is absent are never constructed, so the gateway
//! may hold zero, one or two entries. Adding another provider means
//! implementing the trait and pushing it onto the list.
//!
//! # Failure handling
//!
//! Every backend error is logged and swallowed. An empty answer counts as
//! a failure. In JSON mode, an answer that does not parse (after Markdown
//! code fences are stripped) also counts as a failure. When no backend
//! succeeds the gateway returns `None`; callers show a fallback message.
//!
//! ```rust
//! use atelier::completion::strip_code_fences;
//!
//! assert_eq!(strip_code_fences("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
//! assert_eq!(strip_code_fences("{\"a\": 1}"), "{\"a\": 1}");
//! ```

mod gemini;
mod openai;

pub use gemini::GeminiBackend;
pub use openai::OpenAIBackend;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{CompletionConfig, Config};

/// Requested output shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompletionMode {
    #[default]
    Text,
    Json,
}

/// A prompt plus the shape the caller wants back.
#[derive(Debug, Clone, Deserialize)]
pub struct CompletionRequest {
    pub prompt: String,
    #[serde(default)]
    pub mode: CompletionMode,
}

/// Plain-text answer and the backend that produced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Completion {
    pub text: String,
    pub provider: String,
}

/// Parsed JSON answer and the backend that produced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JsonCompletion {
    pub json: serde_json::Value,
    pub provider: String,
}

/// Either kind of answer, as returned by [`CompletionGateway::generate`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CompletionOutput {
    Text(Completion),
    Json(JsonCompletion),
}

/// One upstream text-generation provider.
///
/// Implementations make a single attempt per call and report any problem
/// (transport, HTTP status, unexpected response shape) as an error. They
/// do not need to check for empty output or parse JSON; the gateway does.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Short provider label reported as provenance (e.g. `"gemini"`).
    fn name(&self) -> &str;

    /// Send `prompt` as a single user turn and return the raw text.
    ///
    /// In [`CompletionMode::Json`] the backend enables its provider's
    /// structured-output switch; the returned text is still unparsed.
    async fn complete(&self, prompt: &str, mode: CompletionMode) -> Result<String>;
}

/// Ordered, best-effort fallback over completion backends.
pub struct CompletionGateway {
    backends: Vec<Box<dyn CompletionBackend>>,
}

impl CompletionGateway {
    /// Build a gateway from backends in priority order.
    pub fn new(backends: Vec<Box<dyn CompletionBackend>>) -> Self {
        Self { backends }
    }

    /// Build the standard Gemini → OpenAI gateway. Providers without a
    /// resolved API key are left out.
    pub fn from_config(config: &CompletionConfig) -> Result<Self> {
        let mut backends: Vec<Box<dyn CompletionBackend>> = Vec::new();

        match &config.gemini.api_key {
            Some(key) => backends.push(Box::new(GeminiBackend::new(&config.gemini, key)?)),
            None => info!(
                env = %config.gemini.api_key_env,
                "gemini completion disabled: no API key"
            ),
        }

        match &config.openai.api_key {
            Some(key) => backends.push(Box::new(OpenAIBackend::new(&config.openai, key)?)),
            None => info!(
                env = %config.openai.api_key_env,
                "openai completion disabled: no API key"
            ),
        }

        Ok(Self::new(backends))
    }

    /// Names of configured backends, in the order they are tried.
    pub fn providers(&self) -> Vec<&str> {
        self.backends.iter().map(|b| b.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    /// First non-empty text answer, or `None` if every backend failed.
    pub async fn generate_text(&self, prompt: &str) -> Option<Completion> {
        for backend in &self.backends {
            match backend.complete(prompt, CompletionMode::Text).await {
                Ok(text) if !text.trim().is_empty() => {
                    debug!(provider = backend.name(), "text completion succeeded");
                    return Some(Completion {
                        text,
                        provider: backend.name().to_string(),
                    });
                }
                Ok(_) => warn!(provider = backend.name(), "empty completion, falling back"),
                Err(e) => warn!(
                    provider = backend.name(),
                    error = %e,
                    "completion failed, falling back"
                ),
            }
        }
        warn!("no completion provider produced text");
        None
    }

    /// First answer that parses as JSON, or `None` if every backend failed.
    pub async fn generate_json(&self, prompt: &str) -> Option<JsonCompletion> {
        for backend in &self.backends {
            let raw = match backend.complete(prompt, CompletionMode::Json).await {
                Ok(raw) => raw,
                Err(e) => {
                    warn!(
                        provider = backend.name(),
                        error = %e,
                        "json completion failed, falling back"
                    );
                    continue;
                }
            };

            match parse_json_answer(&raw) {
                Ok(json) => {
                    debug!(provider = backend.name(), "json completion succeeded");
                    return Some(JsonCompletion {
                        json,
                        provider: backend.name().to_string(),
                    });
                }
                Err(e) => warn!(
                    provider = backend.name(),
                    error = %e,
                    "json completion did not parse, falling back"
                ),
            }
        }
        warn!("no completion provider produced valid json");
        None
    }

    /// Dispatch on the request's mode.
    pub async fn generate(&self, request: &CompletionRequest) -> Option<CompletionOutput> {
        match request.mode {
            CompletionMode::Text => self
                .generate_text(&request.prompt)
                .await
                .map(CompletionOutput::Text),
            CompletionMode::Json => self
                .generate_json(&request.prompt)
                .await
                .map(CompletionOutput::Json),
        }
    }
}

/// CLI entry point: run one completion and print the result.
pub async fn run_generate(config: &Config, prompt: &str, json: bool) -> Result<()> {
    if prompt.trim().is_empty() {
        anyhow::bail!("prompt must not be empty");
    }

    let gateway = CompletionGateway::from_config(&config.completion)?;
    if gateway.is_empty() {
        anyhow::bail!(
            "no completion provider configured; set {} or {}",
            config.completion.gemini.api_key_env,
            config.completion.openai.api_key_env
        );
    }

    if json {
        let out = gateway
            .generate_json(prompt)
            .await
            .ok_or_else(|| anyhow::anyhow!("generation failed"))?;
        eprintln!("provider: {}", out.provider);
        println!("{}", serde_json::to_string_pretty(&out.json)?);
    } else {
        let out = gateway
            .generate_text(prompt)
            .await
            .ok_or_else(|| anyhow::anyhow!("generation failed"))?;
        eprintln!("provider: {}", out.provider);
        println!("{}", out.text);
    }
    Ok(())
}

/// Strip fences, then parse. Empty bodies are rejected explicitly so the
/// log says why.
fn parse_json_answer(raw: &str) -> Result<serde_json::Value> {
    let body = strip_code_fences(raw);
    if body.is_empty() {
        anyhow::bail!("empty response");
    }
    Ok(serde_json::from_str(body)?)
}

/// Remove a Markdown code fence around a model answer.
///
/// Handles ```` ```json ```` and bare ```` ``` ```` fences, with or without
/// a newline after the opening fence, and ignores any prose before the
/// fence. Text without a fence is returned trimmed.
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(start) = trimmed.find("```") else {
        return trimmed;
    };

    let inner = &trimmed[start + 3..];
    let inner = match inner.find('\n') {
        Some(nl) if inner[..nl].trim().chars().all(|c| c.is_ascii_alphanumeric()) => {
            &inner[nl + 1..]
        }
        _ => inner
            .strip_prefix("json")
            .or_else(|| inner.strip_prefix("JSON"))
            .unwrap_or(inner),
    };

    match inner.find("```") {
        Some(end) => inner[..end].trim(),
        None => inner.trim(),
    }
}
