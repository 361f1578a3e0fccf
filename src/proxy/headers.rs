//! Header utilities for upstream requests
//!
//! Upstream requests carry only the headers built here: content type, the
//! provider credential, and an explicit allow-list of inbound headers. Caller
//! headers are otherwise never forwarded.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};

use crate::translate::TranslationError;

/// Header carrying the Messages API version
pub const ANTHROPIC_VERSION: HeaderName = HeaderName::from_static("anthropic-version");
/// Header carrying opt-in Messages API beta features
pub const ANTHROPIC_BETA: HeaderName = HeaderName::from_static("anthropic-beta");

/// How a provider expects its API key
#[derive(Debug, Clone, Copy)]
pub enum Auth<'a> {
    /// `Authorization: Bearer <key>`
    Bearer(&'a str),
    /// `<header>: <key>`
    ApiKey {
        header: &'static str,
        key: &'a str,
    },
}

/// Build the base header set for a provider request
pub fn build_upstream_headers(auth: Auth<'_>) -> Result<HeaderMap, TranslationError> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    match auth {
        Auth::Bearer(key) => {
            headers.insert(AUTHORIZATION, header_value("authorization", &format!("Bearer {}", key))?);
        }
        Auth::ApiKey { header, key } => {
            headers.insert(HeaderName::from_static(header), header_value(header, key)?);
        }
    }

    Ok(headers)
}

/// Insert an optional header, rejecting values that cannot go on the wire
pub fn insert_optional(
    headers: &mut HeaderMap,
    name: &'static str,
    value: Option<&str>,
) -> Result<(), TranslationError> {
    if let Some(value) = value {
        headers.insert(HeaderName::from_static(name), header_value(name, value)?);
    }
    Ok(())
}

fn header_value(name: &'static str, value: &str) -> Result<HeaderValue, TranslationError> {
    HeaderValue::from_str(value).map_err(|_| TranslationError::InvalidHeader(name))
}
