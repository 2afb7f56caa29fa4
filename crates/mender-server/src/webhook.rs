//! POST /webhook

use crate::server::SharedState;
use axum::{extract::State, response::Json};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

pub(crate) const NO_CONTEXT: &str = "(no context)";

/// Webhook payload
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookRequest {
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub service_name: Option<String>,
    #[serde(default)]
    pub instructions: Option<String>,
}

pub(crate) async fn webhook(
    State(app): State<SharedState>,
    Json(request): Json<WebhookRequest>,
) -> Json<Value> {
    info!("[Webhook] => {}", request.action);

    match request.action.as_str() {
        "trigger_ai" => {
            let context = request.context.as_deref().unwrap_or(NO_CONTEXT);
            let report = app.pipeline.advise_and_refactor(context).await;
            Json(json!({
                "status": "ok",
                "answer": report.answer(),
                "outcome": report.outcome,
            }))
        }
        "refactor_service" => {
            let Some(service_name) = request.service_name.as_deref() else {
                return Json(json!({
                    "status": "error",
                    "error": "service_name is required",
                }));
            };
            let outcome = app
                .pipeline
                .refactor_service(service_name, request.instructions.as_deref())
                .await;
            Json(json!({ "status": "ok", "outcome": outcome }))
        }
        _ => Json(json!({ "status": "no action" })),
    }
}

#[cfg(test)]
mod tests {
    use crate::server::router;
    use crate::server::tests::{body_json, pipeline};
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use serde_json::json;
    use tower::ServiceExt;

    fn post(body: &str) -> Request<Body> {
        Request::post("/webhook")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_unknown_action() {
        let dir = tempfile::tempdir().unwrap();
        let response = router(pipeline("x", dir.path()))
            .oneshot(post(r#"{"action": "dance"}"#))
            .await
            .unwrap();
        assert_eq!(body_json(response).await, json!({"status": "no action"}));
    }

    #[tokio::test]
    async fn test_trigger_ai_returns_answer() {
        let dir = tempfile::tempdir().unwrap();
        let response = router(pipeline("Restart the cache.", dir.path()))
            .oneshot(post(r#"{"action": "trigger_ai"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["answer"], "[GPT-4 SAYS]\nRestart the cache.\n");
        assert_eq!(body["outcome"]["outcome"], "no_directive");
    }

    #[tokio::test]
    async fn test_refactor_missing_service_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let response = router(pipeline("x", dir.path()))
            .oneshot(post(r#"{"action": "refactor_service", "service_name": "../etc"}"#))
            .await
            .unwrap();

        let body = body_json(response).await;
        assert_eq!(body["outcome"]["outcome"], "service_rejected");
        assert_eq!(body["outcome"]["service_name"], "../etc");
    }

    #[tokio::test]
    async fn test_refactor_without_name() {
        let dir = tempfile::tempdir().unwrap();
        let response = router(pipeline("x", dir.path()))
            .oneshot(post(r#"{"action": "refactor_service"}"#))
            .await
            .unwrap();
        assert_eq!(body_json(response).await["status"], "error");
    }

    #[tokio::test]
    async fn test_malformed_json_is_client_error() {
        let dir = tempfile::tempdir().unwrap();
        let response = router(pipeline("x", dir.path()))
            .oneshot(post("{not json"))
            .await
            .unwrap();
        assert!(response.status().is_client_error());
    }
}
