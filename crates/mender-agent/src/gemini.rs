//! Gemini-style content generation backend

use crate::auth::require_api_key;
use crate::backend::{GenerationRequest, TextBackend};
use async_trait::async_trait;
use mender_core::config::GeminiConfig;
use mender_core::{BackendId, MenderError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Clone, Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Debug, Clone, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Clone, Deserialize)]
struct Candidate {
    content: Content,
}

/// Gemini backend
#[derive(Debug, Clone)]
pub struct GeminiBackend {
    config: GeminiConfig,
    client: reqwest::Client,
}

impl GeminiBackend {
    /// Create a backend whose calls are bounded by `timeout`
    pub fn new(config: GeminiConfig, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MenderError::Backend(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { config, client })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        )
    }
}

#[async_trait]
impl TextBackend for GeminiBackend {
    fn id(&self) -> BackendId {
        BackendId::Gemini
    }

    fn is_configured(&self) -> bool {
        require_api_key(BackendId::Gemini, self.config.api_key.as_deref()).is_ok()
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let api_key = require_api_key(BackendId::Gemini, self.config.api_key.as_deref())?;

        let body = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: request.prompt.clone(),
                }],
            }],
            system_instruction: request.system.as_ref().map(|s| Content {
                parts: vec![Part { text: s.clone() }],
            }),
            generation_config: request
                .temperature
                .map(|temperature| GenerationConfig { temperature }),
        };

        tracing::debug!("Sending generateContent request ({})", self.config.model);

        let response = self
            .client
            .post(self.endpoint())
            .query(&[("key", api_key)])
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
                "Gemini API error {}: {}",
                status, error_text
            )));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| MenderError::Backend(format!("Failed to parse response: {}", e)))?;

        let candidate = parsed
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| MenderError::Backend("No candidates in response".to_string()))?;

        let output: String = candidate
            .content
            .parts
            .into_iter()
            .map(|p| p.text)
            .collect::<Vec<_>>()
            .join("");

        tracing::info!("[Gemini] => {} chars", output.len());
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn backend(base_url: &str, api_key: Option<&str>) -> GeminiBackend {
        GeminiBackend::new(
            GeminiConfig {
                base_url: base_url.to_string(),
                model: "gemini-pro".to_string(),
                api_key: api_key.map(str::to_string),
            },
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_generate_content_joins_parts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-pro:generateContent"))
            .and(query_param("key", "g-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [
                    {"content": {"parts": [{"text": "restart "}, {"text": "the container"}]}}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let out = backend(&server.uri(), Some("g-key"))
            .generate(&GenerationRequest::new("ctx"))
            .await
            .unwrap();
        assert_eq!(out, "restart the container");
    }

    #[tokio::test]
    async fn test_missing_key_makes_no_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let result = backend(&server.uri(), None)
            .generate(&GenerationRequest::new("ctx"))
            .await;
        assert!(matches!(result, Err(MenderError::Auth(_))));
    }

    #[tokio::test]
    async fn test_no_candidates() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"candidates": []})))
            .mount(&server)
            .await;

        let result = backend(&server.uri(), Some("k"))
            .generate(&GenerationRequest::new("ctx"))
            .await;
        assert!(matches!(result, Err(MenderError::Backend(_))));
    }
}
