//! Capability advisories
//!
//! Backends differ in what they can do. When a request relies on something
//! the chosen backend lacks, the gateway says so in the logs and carries on.

use std::collections::BTreeSet;
use std::fmt;

use crate::canonical::{ContentBlock, MessagesRequest};

use super::Provider;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Capability {
    Tools,
    Vision,
    Thinking,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Tools => "tools",
            Capability::Vision => "vision",
            Capability::Thinking => "thinking",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static support table
pub fn supported_capabilities(provider: Provider) -> &'static [Capability] {
    use Capability::*;
    match provider {
        Provider::Glm => &[Tools, Thinking],
        Provider::Anthropic => &[Tools, Vision, Thinking],
        Provider::OpenAi => &[Tools, Vision],
        Provider::OpenRouter => &[Vision],
        Provider::Gemini => &[Tools, Vision],
    }
}

/// Capabilities a request relies on
pub fn capabilities_used(request: &MessagesRequest) -> BTreeSet<Capability> {
    let mut used = BTreeSet::new();

    if request.tools.as_ref().is_some_and(|tools| !tools.is_empty()) {
        used.insert(Capability::Tools);
    }
    if request.thinking.is_some() {
        used.insert(Capability::Thinking);
    }

    for message in &request.messages {
        for block in message.content.blocks() {
            match block {
                ContentBlock::ToolUse { .. } | ContentBlock::ToolResult { .. } => {
                    used.insert(Capability::Tools);
                }
                ContentBlock::Image { .. } => {
                    used.insert(Capability::Vision);
                }
                ContentBlock::Thinking { .. } | ContentBlock::RedactedThinking { .. } => {
                    used.insert(Capability::Thinking);
                }
                _ => {}
            }
        }
    }

    used
}

/// Capabilities used by a request that its provider does not support
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advisory {
    pub provider: Provider,
    pub unsupported: Vec<Capability>,
}

impl fmt::Display for Advisory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<_> = self.unsupported.iter().map(Capability::as_str).collect();
        write!(
            f,
            "{} may not support {} used by this request",
            self.provider,
            names.join(", ")
        )
    }
}

/// Compute the advisory for a request routed to `provider`; `None` when the
/// provider covers everything the request uses.
pub fn advise(request: &MessagesRequest, provider: Provider) -> Option<Advisory> {
    let supported = supported_capabilities(provider);
    let unsupported: Vec<_> = capabilities_used(request)
        .into_iter()
        .filter(|capability| !supported.contains(capability))
        .collect();

    if unsupported.is_empty() {
        None
    } else {
        Some(Advisory {
            provider,
            unsupported,
        })
    }
}
