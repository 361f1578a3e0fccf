//! Configuration management for claude-proxy
//!
//! Configuration is loaded from environment variables, after `.env` files in
//! `~/.claude-proxy/` and the working directory have been applied.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};

use crate::routing::Provider;

/// Base URL and key for one upstream
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderEndpoint {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
}

/// Borrowed view of a complete endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Credential<'a> {
    pub base_url: &'a str,
    pub api_key: &'a str,
}

impl ProviderEndpoint {
    /// Both URL and key, or `None` if either is missing
    pub fn credential(&self) -> Option<Credential<'_>> {
        Some(Credential {
            base_url: self.base_url.as_deref()?,
            api_key: self.api_key.as_deref()?,
        })
    }
}

/// Log line format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(anyhow!("Unknown log format '{}', expected text or json", other)),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Longest wait for the next upstream chunk, in seconds
    pub idle_timeout_secs: u64,
    pub log_format: LogFormat,

    /// `anthropic-version` sent to passthrough upstreams
    pub anthropic_version: String,

    pub glm: ProviderEndpoint,
    pub anthropic: ProviderEndpoint,
    pub openai: ProviderEndpoint,
    pub openrouter: ProviderEndpoint,
    pub gemini: ProviderEndpoint,

    /// OpenRouter app attribution
    pub openrouter_referer: Option<String>,
    pub openrouter_title: Option<String>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source.
    ///
    /// Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        Ok(Self {
            host: var("CLAUDE_PROXY_HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            port: var("CLAUDE_PROXY_PORT")
                .unwrap_or_else(|| "17870".to_string())
                .parse()
                .context("Invalid CLAUDE_PROXY_PORT")?,
            idle_timeout_secs: var("CLAUDE_PROXY_IDLE_TIMEOUT_SECS")
                .unwrap_or_else(|| "180".to_string())
                .parse()
                .context("Invalid CLAUDE_PROXY_IDLE_TIMEOUT_SECS")?,
            log_format: var("CLAUDE_PROXY_LOG_FORMAT")
                .map(|value| value.parse())
                .transpose()
                .context("Invalid CLAUDE_PROXY_LOG_FORMAT")?
                .unwrap_or_default(),

            anthropic_version: var("ANTHROPIC_VERSION")
                .unwrap_or_else(|| "2023-06-01".to_string()),

            glm: ProviderEndpoint {
                base_url: var("GLM_UPSTREAM_URL"),
                api_key: var("ZAI_API_KEY").or_else(|| var("GLM_API_KEY")),
            },
            anthropic: ProviderEndpoint {
                base_url: var("ANTHROPIC_UPSTREAM_URL"),
                api_key: var("ANTHROPIC_API_KEY"),
            },
            openai: ProviderEndpoint {
                base_url: Some(
                    var("OPENAI_API_URL").unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
                ),
                api_key: var("OPENAI_API_KEY"),
            },
            openrouter: ProviderEndpoint {
                base_url: Some(
                    var("OPENROUTER_API_URL")
                        .unwrap_or_else(|| "https://openrouter.ai/api/v1".to_string()),
                ),
                api_key: var("OPENROUTER_API_KEY"),
            },
            gemini: ProviderEndpoint {
                base_url: Some(
                    var("GEMINI_API_URL")
                        .unwrap_or_else(|| "https://generativelanguage.googleapis.com".to_string()),
                ),
                api_key: var("GEMINI_API_KEY"),
            },

            openrouter_referer: var("OPENROUTER_REFERER"),
            openrouter_title: var("OPENROUTER_TITLE"),
        })
    }

    pub fn endpoint(&self, provider: Provider) -> &ProviderEndpoint {
        match provider {
            Provider::Glm => &self.glm,
            Provider::Anthropic => &self.anthropic,
            Provider::OpenAi => &self.openai,
            Provider::OpenRouter => &self.openrouter,
            Provider::Gemini => &self.gemini,
        }
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

/// Variables a provider needs, for error messages
pub fn credential_hint(provider: Provider) -> &'static str {
    match provider {
        Provider::Glm => "GLM_UPSTREAM_URL and ZAI_API_KEY",
        Provider::Anthropic => "ANTHROPIC_UPSTREAM_URL and ANTHROPIC_API_KEY",
        Provider::OpenAi => "OPENAI_API_KEY",
        Provider::OpenRouter => "OPENROUTER_API_KEY",
        Provider::Gemini => "GEMINI_API_KEY",
    }
}

/// `~/.claude-proxy/.env`, if a home directory is known
pub fn user_env_file() -> Option<PathBuf> {
    let home = env::var_os("HOME").or_else(|| env::var_os("USERPROFILE"))?;
    Some(PathBuf::from(home).join(".claude-proxy").join(".env"))
}

/// Apply `.env` files; already-set variables win over file values
pub fn load_env_files() {
    if let Some(path) = user_env_file() {
        dotenvy::from_path(path).ok();
    }
    dotenvy::dotenv().ok();
}
