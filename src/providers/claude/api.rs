use serde::Serialize;

use crate::api::{ChatMessage, Role};
use crate::providers::CanonicalRequest;

#[derive(Clone, Debug, Serialize)]
pub(crate) struct MessagesRequest {
    pub(crate) model: String,

    pub(crate) messages: Vec<ChatMessage>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) temperature: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) max_tokens: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) system: Option<String>,
}

impl From<&CanonicalRequest<'_>> for MessagesRequest {
    fn from(request: &CanonicalRequest<'_>) -> Self {
        // The system instruction travels in its own field, never as a turn.
        let messages = request
            .messages
            .iter()
            .filter(|m| m.role != Role::System)
            .cloned()
            .collect();

        MessagesRequest {
            model: request.model.to_string(),
            messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            system: request.system.map(str::to_string),
        }
    }
}
