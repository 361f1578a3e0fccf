//! Provider routing
//!
//! Decides which backend serves a request: the resolver reads the model
//! string, the session slot remembers the last choice, and the advisor warns
//! about capabilities the chosen backend lacks.

pub mod advisor;
pub mod resolver;
pub mod session;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use advisor::{advise, capabilities_used, Advisory, Capability};
pub use resolver::{resolve, ResolveError};
pub use session::SessionRoutingState;

/// Upstream backends the gateway can target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Glm,
    Anthropic,
    OpenAi,
    OpenRouter,
    Gemini,
}

impl Provider {
    pub const ALL: [Provider; 5] = [
        Provider::Glm,
        Provider::Anthropic,
        Provider::OpenAi,
        Provider::OpenRouter,
        Provider::Gemini,
    ];

    /// Token used in model strings and JSON (`openai/gpt-4o`)
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Glm => "glm",
            Provider::Anthropic => "anthropic",
            Provider::OpenAi => "openai",
            Provider::OpenRouter => "openrouter",
            Provider::Gemini => "gemini",
        }
    }

    /// Exact, case-sensitive token lookup
    pub fn from_token(token: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.as_str() == token)
    }

    /// Model used when the caller names the provider but no model
    pub fn default_model(&self) -> &'static str {
        match self {
            Provider::Glm => "glm-4.7",
            Provider::Anthropic => "claude-sonnet-4-5",
            Provider::OpenAi => "gpt-4o",
            Provider::OpenRouter => "openrouter/auto",
            Provider::Gemini => "gemini-2.5-flash",
        }
    }

    /// Backends that already speak the canonical protocol
    pub fn is_passthrough(&self) -> bool {
        matches!(self, Provider::Glm | Provider::Anthropic)
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = ResolveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_token(s).ok_or_else(|| ResolveError::UnknownProvider(s.to_string()))
    }
}

/// A resolved routing target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderModel {
    pub provider: Provider,
    pub model: String,
}

impl ProviderModel {
    pub fn new(provider: Provider, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }

    /// Target used before any request has been routed
    pub fn fallback() -> Self {
        Self::new(Provider::Glm, Provider::Glm.default_model())
    }
}

impl fmt::Display for ProviderModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.provider, self.model)
    }
}
