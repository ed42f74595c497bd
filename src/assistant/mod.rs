//! Conversational assistant integration.
//!
//! The text-generation service is an opaque request/response collaborator:
//! it receives the serialized calendar + goal context, the running chat
//! history, and the user's utterance, and returns either prose or a single
//! action JSON object. Parsing/validation of that reply lives in
//! `protocol`; context construction in `prompts`.

pub mod client;
pub mod protocol;
pub mod prompts;

pub use client::{DisabledAssistant, HttpAssistant};

use async_trait::async_trait;

use crate::types::ChatMessage;

#[derive(Debug, thiserror::Error)]
pub enum AssistantError {
    #[error("Assistant is not configured. Set assistant.apiKey in config.")]
    Disabled,

    #[error("Assistant transport: {0}")]
    Http(String),

    #[error("Assistant API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Assistant returned an empty reply")]
    EmptyReply,
}

#[async_trait]
pub trait AssistantGateway: Send + Sync {
    /// One exchange: calendar/goal context + prior turns + the new
    /// utterance, returning the raw reply text.
    async fn send(
        &self,
        context: &str,
        history: &[ChatMessage],
        utterance: &str,
    ) -> Result<String, AssistantError>;
}
