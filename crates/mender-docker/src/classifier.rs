//! Issue classifier

use mender_core::ContainerStatus;

/// Status substrings that make a container actionable
pub const ISSUE_KEYWORDS: &[&str] = &["unhealthy", "restarting", "dead"];

/// True iff the lower-cased status text contains any issue keyword
pub fn is_actionable_status(status_text: &str) -> bool {
    let lowered = status_text.to_lowercase();
    ISSUE_KEYWORDS.iter().any(|keyword| lowered.contains(keyword))
}

/// Classify a polled container
pub fn classify(status: &ContainerStatus) -> bool {
    is_actionable_status(&status.raw_status)
}
