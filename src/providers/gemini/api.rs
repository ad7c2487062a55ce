use serde::Serialize;

use crate::providers::CanonicalRequest;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub(crate) struct Part {
    pub(crate) text: String,
}

impl Part {
    pub fn new_text(text: &str) -> Self {
        Part {
            text: text.to_string(),
        }
    }
}

// Gemini representation of messages.
#[derive(Clone, Debug, Serialize)]
pub(crate) struct Content {
    pub(crate) role: Role,
    pub(crate) parts: Vec<Part>,
}

#[derive(Clone, Debug, Serialize)]
pub(crate) struct SystemInstruction {
    pub(crate) parts: Vec<Part>,
}

#[derive(Clone, Debug, Default, Serialize)]
pub(crate) struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) temperature: Option<f64>,

    #[serde(rename = "maxOutputTokens", skip_serializing_if = "Option::is_none")]
    pub(crate) max_output_tokens: Option<u32>,
}

#[derive(Clone, Debug, Serialize)]
pub(crate) struct GenerateContentRequest {
    pub(crate) contents: Vec<Content>,

    #[serde(rename = "generationConfig")]
    pub(crate) generation_config: GenerationConfig,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) system_instruction: Option<SystemInstruction>,
}

impl From<&CanonicalRequest<'_>> for GenerateContentRequest {
    fn from(request: &CanonicalRequest<'_>) -> Self {
        let mut contents = Vec::with_capacity(request.messages.len());
        let mut system_instruction = None;

        for message in request.messages {
            let parts = vec![Part::new_text(&message.content)];
            match message.role {
                // A later system turn replaces an earlier one.
                crate::api::Role::System => {
                    system_instruction = Some(SystemInstruction { parts });
                }
                crate::api::Role::User => contents.push(Content {
                    role: Role::User,
                    parts,
                }),
                crate::api::Role::Assistant => contents.push(Content {
                    role: Role::Model,
                    parts,
                }),
            }
        }

        GenerateContentRequest {
            contents,
            generation_config: GenerationConfig {
                temperature: request.temperature,
                max_output_tokens: request.max_tokens,
            },
            system_instruction,
        }
    }
}
