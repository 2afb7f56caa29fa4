//! Shared data model for the patch pipeline

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of one running container, as reported by the container runtime
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerStatus {
    /// Container name (first token of the runtime's output line)
    pub name: String,
    /// Everything after the name, verbatim
    pub raw_status: String,
    /// Whether the status text contains an issue keyword
    pub is_actionable: bool,
}

/// Free-text context handed to the advisory backends
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvisoryRequest {
    pub context: String,
}

impl AdvisoryRequest {
    pub fn new(context: impl Into<String>) -> Self {
        Self {
            context: context.into(),
        }
    }

    /// Context used when a container is flagged by the classifier
    pub fn for_container(status: &ContainerStatus) -> Self {
        Self::new(format!(
            "Container {} => {}",
            status.name,
            status.raw_status.to_lowercase()
        ))
    }
}

/// Text-generation backend identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendId {
    /// OpenAI-style chat completion
    Gpt,
    /// Gemini-style content generation
    Gemini,
}

impl BackendId {
    /// Label used to tag responses in combined advisory text
    pub fn label(&self) -> &'static str {
        match self {
            BackendId::Gpt => "GPT-4",
            BackendId::Gemini => "GEMINI",
        }
    }
}

impl fmt::Display for BackendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendId::Gpt => write!(f, "gpt"),
            BackendId::Gemini => write!(f, "gemini"),
        }
    }
}

impl std::str::FromStr for BackendId {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gpt" | "gpt-4" | "openai" => Ok(BackendId::Gpt),
            "gemini" | "google" => Ok(BackendId::Gemini),
            _ => Err(format!("Invalid backend: {}. Use gpt or gemini.", s)),
        }
    }
}

/// One backend's answer to an advisory request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvisoryResponse {
    pub source: BackendId,
    /// Empty when the backend was unavailable or failed
    pub text: String,
}

/// All backend answers for one request, in configuration order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Advisory {
    pub responses: Vec<AdvisoryResponse>,
}

impl Advisory {
    pub fn new(responses: Vec<AdvisoryResponse>) -> Self {
        Self { responses }
    }

    /// Ordered concatenation of the non-empty responses, each tagged with its backend
    pub fn combined(&self) -> String {
        let mut combined = String::new();
        for response in self.responses.iter().filter(|r| !r.text.trim().is_empty()) {
            combined.push_str(&format!("[{} SAYS]\n{}\n", response.source.label(), response.text));
        }
        combined
    }

    /// True when no backend produced any text
    pub fn is_empty(&self) -> bool {
        self.responses.iter().all(|r| r.text.trim().is_empty())
    }

    /// Text returned by a specific backend, if it answered
    pub fn text_from(&self, backend: BackendId) -> Option<&str> {
        self.responses
            .iter()
            .find(|r| r.source == backend && !r.text.trim().is_empty())
            .map(|r| r.text.as_str())
    }
}

/// Instruction to refactor a named service, extracted from advisory text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefactorDirective {
    /// Untrusted until checked against the service allow-list
    pub service_name: String,
    /// Advisory text carried over into the patch prompt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

impl RefactorDirective {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            instructions: None,
        }
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }
}

/// A single source file inside a service bundle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    /// Path relative to the service directory
    pub name: String,
    pub content: String,
}

/// Source files gathered from `services/<name>`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceCodeBundle {
    pub service_name: String,
    pub files: Vec<SourceFile>,
}

impl ServiceCodeBundle {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Render as `--- FILE: <name>` blocks in collection order
    pub fn render(&self) -> String {
        let mut out = String::new();
        for file in &self.files {
            out.push_str(&format!("--- FILE: {}\n{}\n", file.name, file.content));
        }
        out
    }
}

/// Outcome of one patch application attempt
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchResult {
    pub applied: bool,
    pub strip_level_used: Option<u8>,
    pub stderr: Option<String>,
}

impl PatchResult {
    pub fn applied(strip_level: u8) -> Self {
        Self {
            applied: true,
            strip_level_used: Some(strip_level),
            stderr: None,
        }
    }

    pub fn rejected(stderr: Option<String>) -> Self {
        Self {
            applied: false,
            strip_level_used: None,
            stderr,
        }
    }
}

/// How a single pipeline run ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CycleOutcome {
    /// Classifier found nothing actionable
    NoIssue,
    /// Advisory text contained no refactor directive
    NoDirective { advisory: String },
    /// Autonomous refactoring is switched off
    RefactorDisabled { service_name: String },
    /// Service name failed validation or its directory is missing
    ServiceRejected { service_name: String, reason: String },
    /// Service directory had no allow-listed source files
    EmptyBundle { service_name: String },
    /// Code backend returned nothing usable
    NoPatch { service_name: String },
    /// Patch applied
    Patched { service_name: String, result: PatchResult },
    /// Both strip levels rejected; needs manual review
    PatchRejected { service_name: String, result: PatchResult },
    /// An external tool failed and the stage was aborted
    Aborted { reason: String },
}

impl CycleOutcome {
    pub fn is_patched(&self) -> bool {
        matches!(self, CycleOutcome::Patched { .. })
    }
}

impl fmt::Display for CycleOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleOutcome::NoIssue => write!(f, "no issue"),
            CycleOutcome::NoDirective { .. } => write!(f, "no refactor directive"),
            CycleOutcome::RefactorDisabled { service_name } => {
                write!(f, "refactor of '{}' skipped (autonomous refactor off)", service_name)
            }
            CycleOutcome::ServiceRejected {
                service_name,
                reason,
            } => write!(f, "service '{}' rejected: {}", service_name, reason),
            CycleOutcome::EmptyBundle { service_name } => {
                write!(f, "no recognized code in '{}'", service_name)
            }
            CycleOutcome::NoPatch { service_name } => {
                write!(f, "no patch generated for '{}'", service_name)
            }
            CycleOutcome::Patched {
                service_name,
                result,
            } => write!(
                f,
                "patched '{}' (-p{})",
                service_name,
                result.strip_level_used.unwrap_or_default()
            ),
            CycleOutcome::PatchRejected { service_name, .. } => {
                write!(f, "patch for '{}' rejected, manual review needed", service_name)
            }
            CycleOutcome::Aborted { reason } => write!(f, "aborted: {}", reason),
        }
    }
}
