use serde::Serialize;

use crate::api::ChatMessage;
use crate::providers::CanonicalRequest;

/// The canonical body, sent as is.
#[derive(Clone, Debug, Serialize)]
pub(crate) struct ChatCompletionRequest {
    pub(crate) model: String,
    pub(crate) messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) max_tokens: Option<u32>,
}

impl From<&CanonicalRequest<'_>> for ChatCompletionRequest {
    fn from(request: &CanonicalRequest<'_>) -> Self {
        ChatCompletionRequest {
            model: request.model.to_string(),
            messages: request.messages.to_vec(),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        }
    }
}
