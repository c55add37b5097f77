//! LCN control surface
//!
//! Serves the `lcn/*` websocket commands on `/api/websocket` using axum,
//! plus plain status and health endpoints.

pub mod auth;
pub mod websocket;

use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use lcn_hub::Hub;
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::auth::AuthPolicy;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<Hub>,
    pub auth: Arc<AuthPolicy>,
}

impl AppState {
    pub fn new(hub: Arc<Hub>, auth: AuthPolicy) -> Self {
        Self {
            hub,
            auth: Arc::new(auth),
        }
    }
}

/// API status response
#[derive(Serialize)]
struct ApiStatus {
    message: &'static str,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    hosts: usize,
    loaded: usize,
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/websocket", get(websocket::ws_handler))
        .route("/api/", get(api_status))
        .route("/api/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Start the API server; returns when `shutdown` resolves
pub async fn start_server<F>(state: AppState, addr: &str, shutdown: F) -> std::io::Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let router = create_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("API server listening on {}", addr);
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
}

// ==================== Handlers ====================

/// GET /api/ - Returns API status
async fn api_status() -> Json<ApiStatus> {
    Json(ApiStatus {
        message: "API running.",
    })
}

/// GET /api/health
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let entries = state.hub.entries().iter();
    Json(HealthResponse {
        status: "ok",
        hosts: entries.len(),
        loaded: entries.iter().filter(|e| e.is_loaded()).count(),
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use lcn_bus::{ConnectionSettings, DimMode, MemoryConnector};
    use lcn_config_entries::{ConfigEntries, ConfigEntrySource};
    use lcn_devices::StoreSnapshot;
    use lcn_registries::{Registries, Storage};
    use tempfile::TempDir;
    use tower::ServiceExt;

    pub(crate) const HOST: &str = "pchk";

    /// State with one loaded host backed by an in-memory bus
    pub(crate) async fn create_test_state() -> (TempDir, AppState, Arc<MemoryConnector>) {
        let temp_dir = TempDir::new().unwrap();
        let registries = Arc::new(Registries::new(temp_dir.path()));
        let entries = Arc::new(ConfigEntries::new(Arc::new(Storage::new(temp_dir.path()))));
        let connector = Arc::new(MemoryConnector::new());
        let hub = Arc::new(Hub::new(registries, entries, connector.clone()));

        let entry = hub
            .add_host(
                ConnectionSettings {
                    name: HOST.to_string(),
                    host: "192.168.2.41".to_string(),
                    port: 4114,
                    username: "lcn".to_string(),
                    password: "lcn".to_string(),
                    sk_num_tries: 0,
                    dim_mode: DimMode::Steps200,
                },
                StoreSnapshot::default(),
                ConfigEntrySource::User,
            )
            .await
            .unwrap();
        hub.setup_entry(&entry.entry_id).await.unwrap();

        (temp_dir, AppState::new(hub, AuthPolicy::open()), connector)
    }

    #[tokio::test]
    async fn test_api_status() {
        let (_dir, state, _) = create_test_state().await;
        let app = create_router(state);

        let response = app
            .oneshot(Request::builder().uri("/api/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_health_check() {
        let (_dir, state, _) = create_test_state().await;
        let app = create_router(state);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["hosts"], 1);
        assert_eq!(json["loaded"], 1);
    }

    #[tokio::test]
    async fn test_websocket_requires_upgrade() {
        let (_dir, state, _) = create_test_state().await;
        let app = create_router(state);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/websocket")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert!(response.status().is_client_error());
    }
}
