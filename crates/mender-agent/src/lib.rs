//! # mender-agent
//!
//! Text-generation backends and the advisory half of the pipeline.
//!
//! - [`TextBackend`] implementations for OpenAI-style chat completion and
//!   Gemini-style content generation
//! - [`AdvisoryRequester`] fans a context string out to the configured
//!   backends and collects their answers in configuration order
//! - [`parse_directive`] extracts a `refactor service <name>` instruction
//! - [`Debate`] runs the optional generation/critic rounds
//!
//! Every backend call is single-attempt and time-bounded. A failing backend
//! contributes an empty answer; it never fails the request.

mod auth;
mod backend;
mod debate;
mod directive;
mod gemini;
mod openai;
mod requester;
mod search;

pub use auth::require_api_key;
pub use backend::{BackendRegistry, GenerationRequest, StaticBackend, TextBackend};
pub use debate::{Debate, DebateOutcome};
pub use directive::{mentions_refactor, parse_directive};
pub use gemini::GeminiBackend;
pub use openai::OpenAiBackend;
pub use requester::AdvisoryRequester;
pub use search::{SearchHit, SearchProvider, TavilySearch};
