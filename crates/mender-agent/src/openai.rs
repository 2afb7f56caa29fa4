//! OpenAI-style chat completion backend
//!
//! Single attempt per call. No retry loop and no backoff: a failed call is
//! reported to the caller, which degrades it to an empty advisory.

use crate::auth::require_api_key;
use crate::backend::{GenerationRequest, TextBackend};
use async_trait::async_trait;
use mender_core::config::OpenAiConfig;
use mender_core::{BackendId, MenderError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Chat message format
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

/// Chat completion request format
#[derive(Debug, Clone, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

/// Chat completion response format
#[derive(Debug, Clone, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// GPT-style backend
#[derive(Debug, Clone)]
pub struct OpenAiBackend {
    config: OpenAiConfig,
    client: reqwest::Client,
}

impl OpenAiBackend {
    /// Create a backend whose calls are bounded by `timeout`
    pub fn new(config: OpenAiConfig, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MenderError::Backend(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { config, client })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl TextBackend for OpenAiBackend {
    fn id(&self) -> BackendId {
        BackendId::Gpt
    }

    fn is_configured(&self) -> bool {
        require_api_key(BackendId::Gpt, self.config.api_key.as_deref()).is_ok()
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let api_key = require_api_key(BackendId::Gpt, self.config.api_key.as_deref())?;

        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &request.system {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: system.clone(),
            });
        }
        messages.push(ChatMessage {
            role: "user".to_string(),
            content: request.prompt.clone(),
        });

        let body = ChatRequest {
            model: self.config.model.clone(),
            messages,
            temperature: request.temperature.unwrap_or(self.config.temperature),
        };

        tracing::debug!("Sending chat completion request ({})", self.config.model);

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| MenderError::Backend(format!("Failed to send request: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown".to_string());
            return Err(MenderError::Backend(format!(
                "OpenAI API error {}: {}",
                status, error_text
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| MenderError::Backend(format!("Failed to parse response: {}", e)))?;

        let output = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| MenderError::Backend("No choices in response".to_string()))?;

        tracing::info!("[GPT-4] => {} chars", output.len());
        Ok(output)
    }
}
