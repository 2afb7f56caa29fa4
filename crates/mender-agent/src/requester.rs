//! Advisory requester
//!
//! Sends a context string to every configured backend at once and collects
//! the answers. Each call is bounded by the configured timeout; a backend
//! that times out, fails, or has no credentials contributes an empty answer.

use crate::backend::{BackendRegistry, GenerationRequest};
use crate::search::{SearchHit, SearchProvider, TavilySearch};
use futures::future::join_all;
use mender_core::config::MAX_SEARCH_RESULTS;
use mender_core::fail_open::{fail_open_or_default, with_deadline};
use mender_core::{Advisory, AdvisoryRequest, AdvisoryResponse, BackendId, MenderConfig, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const ADVISORY_SYSTEM_PROMPT: &str =
    "You are an operations assistant for a fleet of containerized services. \
     Diagnose the issue and suggest a fix. If a service's code should change, \
     say \"refactor service '<name>'\".";

/// Fans advisory requests out to backends in configuration order
pub struct AdvisoryRequester {
    registry: BackendRegistry,
    order: Vec<BackendId>,
    search: Option<Arc<dyn SearchProvider>>,
    max_search_results: usize,
    timeout: Duration,
}

impl AdvisoryRequester {
    pub fn new(registry: BackendRegistry, order: Vec<BackendId>, timeout: Duration) -> Self {
        Self {
            registry,
            order,
            search: None,
            max_search_results: 2,
            timeout,
        }
    }

    /// Build from configuration, attaching search when enabled
    pub fn from_config(config: &MenderConfig, registry: BackendRegistry) -> Result<Self> {
        let mut requester = Self::new(
            registry,
            config.backends.order.clone(),
            config.backend_timeout(),
        );
        if config.search.enabled {
            let search = TavilySearch::new(config.search.clone(), config.backend_timeout())?;
            requester = requester.with_search(Arc::new(search), config.search.max_results);
        }
        Ok(requester)
    }

    /// Include up to `max_results` search hits (never more than three) in prompts
    pub fn with_search(mut self, search: Arc<dyn SearchProvider>, max_results: usize) -> Self {
        self.search = Some(search);
        self.max_search_results = max_results.min(MAX_SEARCH_RESULTS);
        self
    }

    /// Query every configured backend
    pub async fn request(&self, request: &AdvisoryRequest) -> Advisory {
        self.request_from(request, &self.order).await
    }

    /// Query the subset of configured backends named in `backends`
    ///
    /// Responses always follow configuration order, not the order of `backends`.
    pub async fn request_from(
        &self,
        request: &AdvisoryRequest,
        backends: &[BackendId],
    ) -> Advisory {
        info!("[Advisory] => analyzing {}", request.context);

        let hits = self.search_hits(&request.context).await;

        let selected: Vec<BackendId> = self
            .order
            .iter()
            .copied()
            .filter(|id| backends.contains(id))
            .collect();

        let calls = selected.iter().map(|&id| {
            let prompt = advisory_prompt(id, &request.context, &hits);
            self.ask(id, prompt)
        });
        let texts = join_all(calls).await;

        Advisory::new(
            selected
                .into_iter()
                .zip(texts)
                .map(|(source, text)| AdvisoryResponse { source, text })
                .collect(),
        )
    }

    /// Ask a single backend, degrading any failure to an empty string
    pub async fn ask(&self, id: BackendId, request: GenerationRequest) -> String {
        let Some(backend) = self.registry.get(id) else {
            warn!("{} not registered => skipping", id.label());
            return String::new();
        };

        let text = fail_open_or_default(
            id.label(),
            with_deadline(self.timeout, async move { backend.generate(&request).await }),
        )
        .await;

        if !text.is_empty() {
            info!("[{}] => {}", id.label(), preview(&text));
        }
        text
    }

    async fn search_hits(&self, query: &str) -> Vec<SearchHit> {
        let Some(search) = &self.search else {
            return Vec::new();
        };
        if self.max_search_results == 0 {
            return Vec::new();
        }

        let mut hits = fail_open_or_default(
            "search",
            with_deadline(self.timeout, search.search(query, self.max_search_results)),
        )
        .await;
        hits.truncate(self.max_search_results);
        hits
    }
}

/// Per-backend advisory prompt
fn advisory_prompt(id: BackendId, context: &str, hits: &[SearchHit]) -> GenerationRequest {
    let rendered = render_hits(hits);
    match id {
        BackendId::Gpt => GenerationRequest::new(format!(
            "Context: {}\nSearchResults: {}\nSuggest improvements or refactor.",
            context, rendered
        ))
        .with_system(ADVISORY_SYSTEM_PROMPT),
        BackendId::Gemini => {
            GenerationRequest::new(format!("Context: {}\nSearch: {}", context, rendered))
                .with_system(ADVISORY_SYSTEM_PROMPT)
        }
    }
}

fn render_hits(hits: &[SearchHit]) -> String {
    if hits.is_empty() {
        "[]".to_string()
    } else {
        let items: Vec<String> = hits.iter().map(|h| h.to_string()).collect();
        format!("[{}]", items.join(", "))
    }
}

fn preview(text: &str) -> String {
    let mut out: String = text.chars().take(200).collect();
    if text.chars().count() > 200 {
        out.push_str(" ...");
    }
    out
}
