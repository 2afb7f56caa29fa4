//! Credential checks for text-generation backends
//!
//! Keys are resolved once at startup into the configuration. A backend with
//! no key must fail before any network call is attempted.

use mender_core::{BackendId, MenderError, Result};

/// Return the backend's key, or `MenderError::Auth` if none is configured
pub fn require_api_key(backend: BackendId, key: Option<&str>) -> Result<&str> {
    match key.map(str::trim) {
        Some(k) if !k.is_empty() => Ok(k),
        _ => Err(MenderError::Auth(format!(
            "No API key configured for {}. Set {}.",
            backend.label(),
            key_env_hint(backend)
        ))),
    }
}

fn key_env_hint(backend: BackendId) -> &'static str {
    match backend {
        BackendId::Gpt => "OPENAI_API_KEY",
        BackendId::Gemini => "GEMINI_API_KEY (or GOOGLE_API_KEY)",
    }
}
