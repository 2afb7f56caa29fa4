//! Axum web server for the control surface

use crate::{events, webhook};
use axum::{response::Json, routing::get, routing::post, Router};
use mender_core::config::ServerConfig;
use mender_orchestrator::Pipeline;
use std::future::Future;
use std::io::ErrorKind;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Shared application state
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
}

pub type SharedState = Arc<AppState>;

/// Build the router over a shared pipeline
pub fn router(pipeline: Arc<Pipeline>) -> Router {
    let app_state = Arc::new(AppState { pipeline });

    Router::new()
        .route("/webhook", post(webhook::webhook))
        .route("/ws", get(events::ws_handler))
        .route("/api/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app_state)
}

/// Bind `host:port`, falling back to `host:fallback_port` when the first is taken
pub async fn bind_with_fallback(
    host: &str,
    port: u16,
    fallback_port: u16,
) -> anyhow::Result<TcpListener> {
    match TcpListener::bind((host, port)).await {
        Ok(listener) => Ok(listener),
        Err(e) if e.kind() == ErrorKind::AddrInUse => {
            warn!("Port {} in use => switching to {}", port, fallback_port);
            Ok(TcpListener::bind((host, fallback_port)).await?)
        }
        Err(e) => Err(e.into()),
    }
}

/// Serve until `shutdown` resolves
pub async fn serve<F>(
    pipeline: Arc<Pipeline>,
    config: &ServerConfig,
    shutdown: F,
) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = bind_with_fallback(&config.host, config.port, config.fallback_port).await?;
    info!("Control surface listening on {}", listener.local_addr()?);

    axum::serve(listener, router(pipeline))
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("Control surface stopped");
    Ok(())
}

/// GET /api/health
async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "mender"
    }))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use mender_agent::{BackendRegistry, StaticBackend};
    use mender_core::{BackendId, MenderConfig};
    use mender_docker::MockDockerExecutor;
    use mender_patch::MockPatchTool;
    use tower::ServiceExt;

    /// Pipeline whose GPT backend always answers `reply`
    pub(crate) fn pipeline(reply: &str, services_root: &std::path::Path) -> Arc<Pipeline> {
        let mut config = MenderConfig::default();
        config.backends.order = vec![BackendId::Gpt];
        config.services.root = services_root.to_path_buf();
        Arc::new(
            Pipeline::new(
                Arc::new(config),
                Arc::new(MockDockerExecutor::new()),
                BackendRegistry::new()
                    .with_backend(Arc::new(StaticBackend::new(BackendId::Gpt, reply))),
                Arc::new(MockPatchTool::new()),
            )
            .unwrap(),
        )
    }

    pub(crate) async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let dir = tempfile::tempdir().unwrap();
        let response = router(pipeline("ok", dir.path()))
            .oneshot(Request::get("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            serde_json::json!({"status": "ok", "service": "mender"})
        );
    }

    #[tokio::test]
    async fn test_bind_falls_back_when_port_taken() {
        let taken = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let port = taken.local_addr().unwrap().port();

        let listener = bind_with_fallback("127.0.0.1", port, 0).await.unwrap();
        assert_ne!(listener.local_addr().unwrap().port(), port);
    }
}
