//! Text-generation backend seam

use crate::gemini::GeminiBackend;
use crate::openai::OpenAiBackend;
use async_trait::async_trait;
use mender_core::{BackendId, MenderConfig, MenderError, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One prompt for a backend
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub system: Option<String>,
    pub prompt: String,
    pub temperature: Option<f32>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            system: None,
            prompt: prompt.into(),
            temperature: None,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// A text-generation endpoint: `generate(prompt) -> text`
#[async_trait]
pub trait TextBackend: Send + Sync {
    /// Which backend this is
    fn id(&self) -> BackendId;

    /// Whether credentials are present
    fn is_configured(&self) -> bool;

    /// Single attempt; missing credentials fail before any network call
    async fn generate(&self, request: &GenerationRequest) -> Result<String>;
}

/// Backends by id, built once from configuration
#[derive(Clone, Default)]
pub struct BackendRegistry {
    backends: HashMap<BackendId, Arc<dyn TextBackend>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the OpenAI and Gemini backends from configuration
    pub fn from_config(config: &MenderConfig) -> Result<Self> {
        let timeout = config.backend_timeout();
        let openai = OpenAiBackend::new(config.backends.openai.clone(), timeout)?;
        let gemini = GeminiBackend::new(config.backends.gemini.clone(), timeout)?;

        let built: [&dyn TextBackend; 2] = [&openai, &gemini];
        for backend in built {
            if !backend.is_configured() {
                tracing::warn!("No API key for {} => backend disabled", backend.id().label());
            }
        }

        Ok(Self::new()
            .with_backend(Arc::new(openai))
            .with_backend(Arc::new(gemini)))
    }

    /// Register (or replace) a backend under its own id
    pub fn with_backend(mut self, backend: Arc<dyn TextBackend>) -> Self {
        self.backends.insert(backend.id(), backend);
        self
    }

    pub fn get(&self, id: BackendId) -> Option<Arc<dyn TextBackend>> {
        self.backends.get(&id).cloned()
    }
}

/// Canned backend for tests and dry runs
///
/// Records every prompt it receives. A `None` reply makes `generate` fail.
#[derive(Clone)]
pub struct StaticBackend {
    id: BackendId,
    reply: Option<String>,
    delay: Option<Duration>,
    calls: Arc<AtomicUsize>,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl StaticBackend {
    pub fn new(id: BackendId, reply: impl Into<String>) -> Self {
        Self {
            id,
            reply: Some(reply.into()),
            delay: None,
            calls: Arc::new(AtomicUsize::new(0)),
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A backend whose every call fails
    pub fn failing(id: BackendId) -> Self {
        Self {
            reply: None,
            ..Self::new(id, "")
        }
    }

    /// Sleep before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl TextBackend for StaticBackend {
    fn id(&self) -> BackendId {
        self.id
    }

    fn is_configured(&self) -> bool {
        true
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(request.prompt.clone());
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.reply
            .clone()
            .ok_or_else(|| MenderError::Backend(format!("{} unavailable", self.id.label())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_backend_records_prompts() {
        let backend = StaticBackend::new(BackendId::Gpt, "answer");
        let out = backend
            .generate(&GenerationRequest::new("question"))
            .await
            .unwrap();
        assert_eq!(out, "answer");
        assert_eq!(backend.call_count(), 1);
        assert_eq!(backend.prompts(), vec!["question".to_string()]);
    }

    #[tokio::test]
    async fn test_failing_backend() {
        let backend = StaticBackend::failing(BackendId::Gemini);
        assert!(backend.generate(&GenerationRequest::new("q")).await.is_err());
    }

    #[test]
    fn test_registry_from_default_config() {
        let registry = BackendRegistry::from_config(&MenderConfig::default()).unwrap();
        let gpt = registry.get(BackendId::Gpt).unwrap();
        assert_eq!(gpt.id(), BackendId::Gpt);
        assert!(!gpt.is_configured());
        assert!(registry.get(BackendId::Gemini).is_some());
    }

    #[test]
    fn test_registry_replace() {
        let registry = BackendRegistry::new()
            .with_backend(Arc::new(StaticBackend::new(BackendId::Gpt, "one")))
            .with_backend(Arc::new(StaticBackend::new(BackendId::Gpt, "two")));
        assert!(registry.get(BackendId::Gpt).is_some());
        assert!(registry.get(BackendId::Gemini).is_none());
    }
}
