//! WebAPI - REST API Endpoints
//!
//! ## Responsibilities
//!
//! - HTTP API routes
//! - Request validation
//! - Response formatting

mod routes;

pub use routes::create_router;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::models::HealthResponse;
use crate::state::AppState;

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let (storage_ok, classifier_ok, analysis_ok) = state.analysis_client.health_check().await;

    let response = HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        storage_connected: storage_ok,
        classifier_connected: classifier_ok,
        analysis_connected: analysis_ok,
    };

    Json(response)
}

/// Status endpoint: capture state, quota, loading flag
pub async fn service_status(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.store.snapshot().await;

    Json(json!({
        "device_state": state.device.state().await,
        "run_in_flight": state.orchestrator.is_running().await,
        "is_loading": snapshot.is_loading,
        "quota": {
            "remaining": state.quota.remaining().await,
            "authenticated": state.quota.is_authenticated().await,
        }
    }))
}
