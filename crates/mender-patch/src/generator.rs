//! Patch generation
//!
//! Turns a [`RefactorDirective`] into a unified diff by sending the
//! service's source bundle to the code backend. Nothing is sent when the
//! service name is rejected, its directory is missing, or it holds no source
//! files.

use crate::catalog::ServiceCatalog;
use mender_agent::{AdvisoryRequester, GenerationRequest};
use mender_core::{BackendId, RefactorDirective};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

const REFACTOR_SYSTEM_PROMPT: &str = "Refactoring assistant. Reply with a unified diff only.";
const REFACTOR_TEMPERATURE: f32 = 0.3;

/// Result of asking for a patch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchCandidate {
    /// Service name failed validation or has no directory
    Rejected { reason: String },
    /// Directory exists but holds no eligible source files
    EmptyBundle,
    /// Backend produced nothing usable
    NoPatch,
    Diff { service_dir: PathBuf, diff: String },
}

impl PatchCandidate {
    pub fn into_diff(self) -> Option<String> {
        match self {
            PatchCandidate::Diff { diff, .. } => Some(diff),
            _ => None,
        }
    }
}

/// Generates diffs for a service through the code backend
pub struct PatchGenerator {
    catalog: ServiceCatalog,
    requester: Arc<AdvisoryRequester>,
    backend: BackendId,
}

impl PatchGenerator {
    pub fn new(
        catalog: ServiceCatalog,
        requester: Arc<AdvisoryRequester>,
        backend: BackendId,
    ) -> Self {
        Self {
            catalog,
            requester,
            backend,
        }
    }

    pub async fn generate(&self, directive: &RefactorDirective) -> PatchCandidate {
        let service_dir = match self.catalog.resolve(&directive.service_name) {
            Ok(dir) => dir,
            Err(e) => {
                warn!("Refactor of {:?} rejected: {}", directive.service_name, e);
                return PatchCandidate::Rejected {
                    reason: e.to_string(),
                };
            }
        };

        let bundle = self
            .catalog
            .collect_bundle(&directive.service_name, &service_dir);
        if bundle.is_empty() {
            warn!("No source files in {} => skipping", service_dir.display());
            return PatchCandidate::EmptyBundle;
        }

        info!(
            "Requesting patch for {} ({} files)",
            directive.service_name,
            bundle.files.len()
        );

        let request = GenerationRequest::new(refactor_prompt(directive, &bundle.render()))
            .with_system(REFACTOR_SYSTEM_PROMPT)
            .with_temperature(REFACTOR_TEMPERATURE);
        let reply = self.requester.ask(self.backend, request).await;

        match extract_diff(&reply) {
            Some(diff) => PatchCandidate::Diff { service_dir, diff },
            None => {
                warn!("No patch produced for {}", directive.service_name);
                PatchCandidate::NoPatch
            }
        }
    }

    /// The diff alone, if one was produced
    pub async fn generate_patch(&self, directive: &RefactorDirective) -> Option<String> {
        self.generate(directive).await.into_diff()
    }
}

fn refactor_prompt(directive: &RefactorDirective, code: &str) -> String {
    let mut prompt = format!(
        "You are a code refactoring expert. Provide a unified diff patch to improve the code.\n\
         SERVICE: {}\n",
        directive.service_name
    );
    if let Some(instructions) = directive.instructions.as_deref().filter(|s| !s.trim().is_empty()) {
        prompt.push_str(&format!("INSTRUCTIONS: {}\n", instructions.trim()));
    }
    prompt.push_str("CODE:\n");
    prompt.push_str(code);
    prompt
}

/// Pull the diff out of a reply, unwrapping a markdown fence if present
fn extract_diff(reply: &str) -> Option<String> {
    let trimmed = reply.trim();
    if trimmed.is_empty() {
        return None;
    }

    let body = match trimmed.find("```") {
        Some(start) => {
            let after = &trimmed[start + 3..];
            // skip the info string (```diff)
            let after = after.split_once('\n').map(|(_, rest)| rest).unwrap_or("");
            match after.find("```") {
                Some(end) => &after[..end],
                None => after,
            }
        }
        None => trimmed,
    };

    let body = body.trim_matches('\n');
    if body.trim().is_empty() {
        None
    } else {
        Some(format!("{}\n", body.trim_end()))
    }
}
