//! # mender-server
//!
//! Out-of-band control surface for the Mender pipeline.
//!
//! - `POST /webhook` triggers the advisory chain or a direct refactor
//! - `GET /ws` is a JSON event channel carrying the same `trigger_ai` request
//! - `GET /api/health` reports liveness

mod events;
mod server;
mod webhook;

pub use events::{handle_event, WsEvent};
pub use server::{bind_with_fallback, router, serve, AppState, SharedState};
pub use webhook::WebhookRequest;
