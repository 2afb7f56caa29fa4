//! GET /ws - JSON event channel
//!
//! Every frame is `{"event": <name>, "data": <object>}`. The server greets with
//! `welcome`, answers `trigger_ai` with `ai_response`, and anything else with
//! `error`.

use crate::server::SharedState;
use crate::webhook::NO_CONTEXT;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{Sink, SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

/// One event frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WsEvent {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl WsEvent {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    fn welcome() -> Self {
        Self::new("welcome", json!({ "msg": "Connected to mender" }))
    }

    fn error(message: impl Into<String>) -> Self {
        Self::new("error", json!({ "msg": message.into() }))
    }
}

/// Answer one client event
pub async fn handle_event(app: &SharedState, event: WsEvent) -> WsEvent {
    match event.event.as_str() {
        "trigger_ai" => {
            let context = event
                .data
                .get("context")
                .and_then(Value::as_str)
                .unwrap_or(NO_CONTEXT);
            let report = app.pipeline.advise_and_refactor(context).await;
            WsEvent::new(
                "ai_response",
                json!({ "answer": report.answer(), "outcome": report.outcome }),
            )
        }
        other => WsEvent::error(format!("unknown event: {}", other)),
    }
}

pub(crate) async fn ws_handler(
    ws: WebSocketUpgrade,
    State(app): State<SharedState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, app))
}

async fn handle_socket(socket: WebSocket, app: SharedState) {
    info!("[WebSocket] connect");
    let (mut sender, mut receiver) = socket.split();

    if send(&mut sender, &WsEvent::welcome()).await.is_err() {
        return;
    }

    while let Some(Ok(message)) = receiver.next().await {
        let reply = match message {
            Message::Text(text) => match serde_json::from_str::<WsEvent>(&text) {
                Ok(event) => handle_event(&app, event).await,
                Err(e) => WsEvent::error(format!("malformed event: {}", e)),
            },
            Message::Close(_) => break,
            _ => continue,
        };

        if send(&mut sender, &reply).await.is_err() {
            break;
        }
    }

    info!("[WebSocket] disconnect");
}

async fn send<S>(sender: &mut S, event: &WsEvent) -> Result<(), ()>
where
    S: Sink<Message> + Unpin,
{
    let text = serde_json::to_string(event).map_err(|e| debug!("encode failed: {}", e))?;
    sender.send(Message::Text(text)).await.map_err(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::tests::pipeline;
    use crate::server::AppState;
    use std::sync::Arc;

    fn state(reply: &str, root: &std::path::Path) -> SharedState {
        Arc::new(AppState {
            pipeline: pipeline(reply, root),
        })
    }

    #[test]
    fn test_event_frame_shape() {
        let parsed: WsEvent =
            serde_json::from_str(r#"{"event":"trigger_ai","data":{"context":"db down"}}"#).unwrap();
        assert_eq!(parsed.event, "trigger_ai");
        assert_eq!(parsed.data["context"], "db down");

        let bare: WsEvent = serde_json::from_str(r#"{"event":"ping"}"#).unwrap();
        assert_eq!(bare.data, Value::Null);

        let welcome = serde_json::to_value(WsEvent::welcome()).unwrap();
        assert_eq!(welcome["event"], "welcome");
    }

    #[tokio::test]
    async fn test_trigger_ai_event() {
        let dir = tempfile::tempdir().unwrap();
        let app = state("Scale the workers.", dir.path());

        let reply = handle_event(
            &app,
            WsEvent::new("trigger_ai", json!({ "context": "queue backlog" })),
        )
        .await;

        assert_eq!(reply.event, "ai_response");
        assert_eq!(reply.data["answer"], "[GPT-4 SAYS]\nScale the workers.\n");
    }

    #[tokio::test]
    async fn test_unknown_event() {
        let dir = tempfile::tempdir().unwrap();
        let reply = handle_event(&state("x", dir.path()), WsEvent::new("ping", Value::Null)).await;
        assert_eq!(reply.event, "error");
    }
}
