//! Route definitions and handlers

use axum::{
    extract::{Multipart, State},
    routing::{get, post},
    Json, Router,
};

use crate::analysis_client::AnalysisBackend;
use crate::device_controller::{DeviceController, DeviceSource};
use crate::error::{Error, Result};
use crate::models::{AnalysisResult, ApiResponse};
use crate::orchestrator::CaptureOrchestrator;
use crate::quota_gate::QuotaGate;
use crate::result_store::ResultSnapshot;
use crate::state::AppState;

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health & status
        .route("/healthz", get(super::health_check))
        .route("/api/status", get(super::service_status))
        // File-based analysis
        .route("/api/analyze", post(analyze_upload))
        // Camera capture flow
        .route("/api/capture/open", post(open_capture))
        .route("/api/capture/shoot", post(shoot_and_analyze))
        .route("/api/capture/close", post(close_capture))
        // Current result
        .route("/api/result", get(current_result))
        .with_state(state)
}

/// Pull the image bytes out of a multipart body (`image` or `file` field)
async fn read_image_field(mut multipart: Multipart) -> Result<Vec<u8>> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::Validation(format!("invalid multipart body: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name == "image" || name == "file" {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| Error::Validation(format!("unreadable image field: {}", e)))?;
            return Ok(bytes.to_vec());
        }
    }
    Err(Error::Validation(
        "no image field in multipart body".to_string(),
    ))
}

/// Gate, open the device and wait for readiness
///
/// When the quota denies the attempt the device is never acquired. A
/// readiness failure tears the session down before surfacing the error.
async fn open_flow<Q, S>(quota: &Q, device: &DeviceController<S>) -> Result<()>
where
    Q: QuotaGate,
    S: DeviceSource,
{
    if !quota.can_upload().await {
        return Err(Error::Unauthorized(
            "upload quota exhausted, sign in to continue".to_string(),
        ));
    }

    device.open().await?;

    if let Err(e) = device.wait_ready().await {
        device.close().await;
        return Err(e);
    }

    Ok(())
}

/// Capture the current frame, release the device, run the analysis
///
/// The device is closed on both capture outcomes; the session never
/// outlives the frame grab.
async fn shoot_flow<S, B, Q>(
    device: &DeviceController<S>,
    orchestrator: &CaptureOrchestrator<B, Q>,
) -> Result<AnalysisResult>
where
    S: DeviceSource,
    B: AnalysisBackend,
    Q: QuotaGate,
{
    let frame = match device.capture().await {
        Ok(frame) => {
            device.close().await;
            frame
        }
        Err(e) => {
            device.close().await;
            return Err(e);
        }
    };

    orchestrator.run(frame).await
}

/// Analyze an uploaded image file
async fn analyze_upload(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<ApiResponse<AnalysisResult>>> {
    // Gate before the image is even accepted
    if !state.quota.can_upload().await {
        return Err(Error::Unauthorized(
            "upload quota exhausted, sign in to continue".to_string(),
        ));
    }

    let image = read_image_field(multipart).await?;
    let result = state.orchestrator.run(image).await?;
    Ok(Json(ApiResponse::success(result)))
}

/// Open the capture device and wait for readiness
async fn open_capture(State(state): State<AppState>) -> Result<Json<ApiResponse<&'static str>>> {
    open_flow(state.quota.as_ref(), state.device.as_ref()).await?;
    Ok(Json(ApiResponse::success("ready")))
}

/// Capture a frame and drive a full analysis run
async fn shoot_and_analyze(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<AnalysisResult>>> {
    let result = shoot_flow(state.device.as_ref(), state.orchestrator.as_ref()).await?;
    Ok(Json(ApiResponse::success(result)))
}

/// Cancel the capture session, releasing the device
async fn close_capture(State(state): State<AppState>) -> Json<ApiResponse<&'static str>> {
    state.device.close().await;
    Json(ApiResponse::success("closed"))
}

/// Current result snapshot for presentation
async fn current_result(State(state): State<AppState>) -> Json<ApiResponse<ResultSnapshot>> {
    Json(ApiResponse::success(state.store.snapshot().await))
}
