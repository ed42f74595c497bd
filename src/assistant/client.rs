//! HTTP assistant client (Anthropic Messages API shape).

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::{AssistantError, AssistantGateway};
use crate::types::{AssistantConfig, ChatMessage, ChatRole};

const HTTP_TIMEOUT_SECS: u64 = 60;
const MAX_REPLY_TOKENS: u32 = 1024;
const API_VERSION: &str = "2023-06-01";

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    text: String,
}

pub struct HttpAssistant {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
}

impl HttpAssistant {
    pub fn new(config: &AssistantConfig) -> Result<HttpAssistant, AssistantError> {
        if !config.enabled {
            return Err(AssistantError::Disabled);
        }
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or(AssistantError::Disabled)?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .map_err(|e| AssistantError::Http(e.to_string()))?;

        Ok(HttpAssistant {
            client,
            api_url: config.api_url.clone(),
            api_key,
            model: config.model.clone(),
        })
    }
}

fn role_name(role: ChatRole) -> &'static str {
    match role {
        ChatRole::User => "user",
        ChatRole::Assistant => "assistant",
    }
}

#[async_trait]
impl AssistantGateway for HttpAssistant {
    async fn send(
        &self,
        context: &str,
        history: &[ChatMessage],
        utterance: &str,
    ) -> Result<String, AssistantError> {
        let mut messages: Vec<serde_json::Value> = history
            .iter()
            .map(|m| serde_json::json!({"role": role_name(m.role), "content": m.content}))
            .collect();
        messages.push(serde_json::json!({"role": "user", "content": utterance}));

        let body = serde_json::json!({
            "model": self.model,
            "max_tokens": MAX_REPLY_TOKENS,
            "system": context,
            "messages": messages,
        });

        let response = self
            .client
            .post(&self.api_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| AssistantError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AssistantError::Api {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| AssistantError::Http(e.to_string()))?;

        let reply: String = parsed
            .content
            .iter()
            .filter(|block| block.kind == "text")
            .map(|block| block.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        if reply.trim().is_empty() {
            return Err(AssistantError::EmptyReply);
        }
        Ok(reply)
    }
}

/// Placeholder gateway used when no assistant is configured: every send
/// fails with `Disabled`, which the chat surface turns into a helpful
/// message instead of a crash.
pub struct DisabledAssistant;

#[async_trait]
impl AssistantGateway for DisabledAssistant {
    async fn send(
        &self,
        _context: &str,
        _history: &[ChatMessage],
        _utterance: &str,
    ) -> Result<String, AssistantError> {
        Err(AssistantError::Disabled)
    }
}
