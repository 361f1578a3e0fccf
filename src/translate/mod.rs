//! Translation layer between the canonical protocol and provider formats
//!
//! Each backend gets a [`Translator`]: it encodes a canonical request into the
//! provider's HTTP request and decodes the provider's streamed body back into
//! canonical events. The set of backends is closed, so dispatch goes through
//! the [`ProviderTranslator`] enum rather than trait objects.

pub mod context;
pub mod gemini;
pub mod openai;
pub mod passthrough;

use thiserror::Error;

use crate::canonical::{CanonicalRequest, ErrorDetail, StreamEvent};
use crate::proxy::UpstreamRequest;
use crate::streaming::LineTooLong;

pub use context::{DecodeContext, ToolCallAccumulator};
pub use gemini::GeminiTranslator;
pub use openai::{OpenAiDialect, OpenAiTranslator};
pub use passthrough::{PassthroughDialect, PassthroughTranslator};

/// Errors that can occur during translation
#[derive(Debug, Error)]
pub enum TranslationError {
    /// The canonical request cannot be expressed for this provider
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// An upstream frame could not be parsed
    #[error("Malformed upstream payload: {0}")]
    MalformedChunk(String),

    /// Accumulated tool call arguments are not valid JSON
    #[error("Malformed tool call arguments: {0}")]
    MalformedArguments(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A credential or forwarded value is not a legal header value
    #[error("Invalid value for header {0}")]
    InvalidHeader(&'static str),

    /// The provider reported an error inside a 2xx stream
    #[error("{message}")]
    Upstream {
        kind: String,
        message: String,
        status: Option<u16>,
    },
}

impl From<LineTooLong> for TranslationError {
    fn from(error: LineTooLong) -> Self {
        TranslationError::MalformedChunk(error.to_string())
    }
}

impl TranslationError {
    /// Canonical error payload for this failure
    pub fn to_error_detail(&self) -> ErrorDetail {
        match self {
            TranslationError::Upstream {
                kind,
                message,
                status,
            } => ErrorDetail {
                kind: kind.clone(),
                message: message.clone(),
                status: *status,
            },
            TranslationError::InvalidRequest(_) => {
                ErrorDetail::new("invalid_request_error", self.to_string())
            }
            _ => ErrorDetail::new("api_error", self.to_string()),
        }
    }
}

/// Converts between the canonical protocol and one provider's wire format.
///
/// `decode_chunk` is called once per upstream body chunk, in order, with the
/// same context for the whole request. An empty chunk marks the clean end of
/// the upstream body and asks the translator to flush buffered partial input.
pub trait Translator {
    /// Build the provider request for `request` targeting `model`
    fn encode_request(
        &self,
        request: &CanonicalRequest,
        model: &str,
    ) -> Result<UpstreamRequest, TranslationError>;

    /// Decode one upstream chunk into zero or more canonical events
    fn decode_chunk(
        &self,
        chunk: &[u8],
        ctx: &mut DecodeContext,
    ) -> Result<Vec<StreamEvent>, TranslationError>;
}

/// The closed set of translators
#[derive(Debug, Clone)]
pub enum ProviderTranslator {
    Passthrough(PassthroughTranslator),
    OpenAi(OpenAiTranslator),
    Gemini(GeminiTranslator),
}

impl Translator for ProviderTranslator {
    fn encode_request(
        &self,
        request: &CanonicalRequest,
        model: &str,
    ) -> Result<UpstreamRequest, TranslationError> {
        match self {
            ProviderTranslator::Passthrough(t) => t.encode_request(request, model),
            ProviderTranslator::OpenAi(t) => t.encode_request(request, model),
            ProviderTranslator::Gemini(t) => t.encode_request(request, model),
        }
    }

    fn decode_chunk(
        &self,
        chunk: &[u8],
        ctx: &mut DecodeContext,
    ) -> Result<Vec<StreamEvent>, TranslationError> {
        match self {
            ProviderTranslator::Passthrough(t) => t.decode_chunk(chunk, ctx),
            ProviderTranslator::OpenAi(t) => t.decode_chunk(chunk, ctx),
            ProviderTranslator::Gemini(t) => t.decode_chunk(chunk, ctx),
        }
    }
}

/// Join a base URL and a path without doubling the slash
pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}
