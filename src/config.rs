//! TOML configuration parsing and validation.
//!
//! Provider credentials are never written into the config file. Each
//! completion provider names the environment variable holding its key;
//! [`load_config`] resolves that variable once, and a missing key leaves
//! the provider disabled rather than failing.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub server: ServerConfig,
    #[serde(default)]
    pub completion: CompletionConfig,
    #[serde(default)]
    pub feeds: FeedsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

/// Both completion backends, in priority order: Gemini first, then the
/// OpenAI-compatible chat endpoint.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct CompletionConfig {
    #[serde(default)]
    pub gemini: GeminiConfig,
    #[serde(default)]
    pub openai: OpenAIConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GeminiConfig {
    #[serde(default = "default_gemini_model")]
    pub model: String,
    #[serde(default = "default_gemini_base_url")]
    pub base_url: String,
    #[serde(default = "default_gemini_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Resolved from `api_key_env` by [`load_config`].
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            model: default_gemini_model(),
            base_url: default_gemini_base_url(),
            api_key_env: default_gemini_key_env(),
            timeout_secs: default_timeout_secs(),
            api_key: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct OpenAIConfig {
    #[serde(default = "default_openai_model")]
    pub model: String,
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
    #[serde(default = "default_openai_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Resolved from `api_key_env` by [`load_config`].
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self {
            model: default_openai_model(),
            base_url: default_openai_base_url(),
            api_key_env: default_openai_key_env(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
            api_key: None,
        }
    }
}

fn default_gemini_model() -> String {
    "gemini-2.0-flash".to_string()
}
fn default_gemini_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}
fn default_gemini_key_env() -> String {
    "GEMINI_API_KEY".to_string()
}
fn default_openai_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_openai_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct FeedsConfig {
    /// RSS/Atom URLs polled by the trending-papers view.
    #[serde(default)]
    pub trending: Vec<String>,
    #[serde(default = "default_feed_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for FeedsConfig {
    fn default() -> Self {
        Self {
            trending: Vec::new(),
            timeout_secs: default_feed_timeout_secs(),
        }
    }
}

fn default_feed_timeout_secs() -> u64 {
    15
}

impl Config {
    /// Configuration used by commands that can run without a config file
    /// (`generate`, `feed`). Database and bind address point at local
    /// defaults; credentials are still picked up from the environment.
    pub fn minimal() -> Self {
        let mut config = Self {
            db: DbConfig {
                path: PathBuf::from("./data/atelier.sqlite"),
            },
            server: ServerConfig {
                bind: "127.0.0.1:7340".to_string(),
            },
            completion: CompletionConfig::default(),
            feeds: FeedsConfig::default(),
        };
        config.completion.resolve_credentials(|name| std::env::var(name).ok());
        config
    }
}

impl CompletionConfig {
    /// Fill in `api_key` for each provider using `lookup` on its
    /// `api_key_env`. Blank values count as absent.
    pub fn resolve_credentials<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let clean = |v: Option<String>| v.filter(|k| !k.trim().is_empty());
        self.gemini.api_key = clean(lookup(&self.gemini.api_key_env));
        self.openai.api_key = clean(lookup(&self.openai.api_key_env));
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config = parse_config(&content)?;
    config
        .completion
        .resolve_credentials(|name| std::env::var(name).ok());
    Ok(config)
}

/// Parse and validate config text without touching the environment.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    if config.server.bind.trim().is_empty() {
        anyhow::bail!("server.bind must not be empty");
    }

    if config.completion.openai.max_tokens == 0 {
        anyhow::bail!("completion.openai.max_tokens must be > 0");
    }

    if config.completion.gemini.model.trim().is_empty()
        || config.completion.openai.model.trim().is_empty()
    {
        anyhow::bail!("completion model names must not be empty");
    }

    for url in &config.feeds.trending {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            anyhow::bail!("feeds.trending entry is not an http(s) URL: '{}'", url);
        }
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = r#"
[db]
path = "./data/atelier.sqlite"

[server]
bind = "127.0.0.1:7340"
"#;

    #[test]
    fn defaults_fill_missing_sections() {
        let cfg = parse_config(BASE).unwrap();
        assert_eq!(cfg.completion.gemini.api_key_env, "GEMINI_API_KEY");
        assert_eq!(cfg.completion.openai.max_tokens, 1024);
        assert!(cfg.feeds.trending.is_empty());
        assert!(cfg.completion.gemini.api_key.is_none());
    }

    #[test]
    fn rejects_zero_max_tokens() {
        let text = format!("{}\n[completion.openai]\nmax_tokens = 0\n", BASE);
        let err = parse_config(&text).unwrap_err();
        assert!(err.to_string().contains("max_tokens"));
    }

    #[test]
    fn rejects_non_http_feed() {
        let text = format!("{}\n[feeds]\ntrending = [\"ftp://x\"]\n", BASE);
        assert!(parse_config(&text).is_err());
    }

    #[test]
    fn credentials_resolved_from_named_variables() {
        let text = format!(
            "{}\n[completion.gemini]\napi_key_env = \"MY_GEMINI\"\n",
            BASE
        );
        let mut cfg = parse_config(&text).unwrap();
        cfg.completion.resolve_credentials(|name| match name {
            "MY_GEMINI" => Some("g-key".to_string()),
            "OPENAI_API_KEY" => Some("   ".to_string()),
            _ => None,
        });
        assert_eq!(cfg.completion.gemini.api_key.as_deref(), Some("g-key"));
        assert!(cfg.completion.openai.api_key.is_none());
    }
}
