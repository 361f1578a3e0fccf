//! Model string resolution
//!
//! `openai/gpt-4o`, `gemini:gemini-2.5-pro` and `anthropic:` name a provider
//! explicitly. A bare model string keeps the provider chosen last.

use thiserror::Error;

use super::{Provider, ProviderModel};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("Unknown provider '{0}'. Expected one of: glm, anthropic, openai, openrouter, gemini")]
    UnknownProvider(String),
}

/// Resolve a model string against the current sticky target.
///
/// The provider hint is the text before the first `:` or `/`. A known hint
/// always wins; an unknown one is an error even when sticky state exists.
/// Without a hint the sticky provider is kept and the model string is used
/// verbatim, falling back to the sticky model when empty. With neither, the
/// fixed default target applies.
pub fn resolve(model: &str, sticky: Option<&ProviderModel>) -> Result<ProviderModel, ResolveError> {
    match model.find(|c: char| c == ':' || c == '/') {
        Some(split) => {
            let token = &model[..split];
            let rest = &model[split + 1..];
            let provider = Provider::from_token(token)
                .ok_or_else(|| ResolveError::UnknownProvider(token.to_string()))?;

            let model = if rest.is_empty() {
                provider.default_model()
            } else {
                rest
            };
            Ok(ProviderModel::new(provider, model))
        }
        None => Ok(match sticky {
            Some(current) if model.is_empty() => current.clone(),
            Some(current) => ProviderModel::new(current.provider, model),
            None => ProviderModel::fallback(),
        }),
    }
}
