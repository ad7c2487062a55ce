//! Wire-format adaptation of the canonical conversation.
//!
//! Each family owns the request shape of one API style. The family is chosen
//! once from the model name when the provider config is loaded.

pub(crate) mod claude;
pub(crate) mod gemini;
pub(crate) mod openai;

use serde_json::Value;

use crate::api::ChatMessage;
use crate::error::Result;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ProviderFamily {
    /// OpenAI-compatible chat completions; also the fallback shape.
    OpenAI,
    Claude,
    Gemini,
}

impl ProviderFamily {
    /// Case-sensitive substring match on the configured model name.
    pub fn from_model(model: &str) -> Self {
        if model.contains("claude") {
            ProviderFamily::Claude
        } else if model.contains("gemini") {
            ProviderFamily::Gemini
        } else {
            ProviderFamily::OpenAI
        }
    }

    /// Build the request body this family's API expects.
    ///
    /// The temperature is passed through as given: range checks are left to
    /// the provider, which rejects out-of-range values itself.
    pub fn build(&self, request: &CanonicalRequest<'_>) -> Result<Value> {
        let body = match self {
            ProviderFamily::OpenAI => {
                serde_json::to_value(openai::ChatCompletionRequest::from(request))?
            }
            ProviderFamily::Claude => {
                serde_json::to_value(claude::MessagesRequest::from(request))?
            }
            ProviderFamily::Gemini => {
                serde_json::to_value(gemini::GenerateContentRequest::from(request))?
            }
        };
        Ok(body)
    }
}

impl std::fmt::Display for ProviderFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Provider-agnostic view of one call, borrowed from the conversation.
#[derive(Clone, Debug)]
pub struct CanonicalRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [ChatMessage],
    pub system: Option<&'a str>,
    /// `None` when the provider does not accept a temperature.
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
}
