//! Trivision Gateway
//!
//! Main entry point for the capture-and-analyze service.

use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use trivision::analysis_client::RemoteAnalysisClient;
use trivision::device_controller::{DeviceController, FfmpegConfig, FfmpegSource};
use trivision::image_cache::ImageCache;
use trivision::orchestrator::CaptureOrchestrator;
use trivision::quota_gate::QuotaService;
use trivision::result_store::ResultStore;
use trivision::state::{AppConfig, AppState};
use trivision::web_api;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "trivision=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Trivision Gateway v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = AppConfig::default();
    tracing::info!(
        storage_url = %config.storage_url,
        classifier_url = %config.classifier_url,
        analysis_url = %config.analysis_url,
        camera_input = %config.camera_input,
        cache_dir = %config.cache_dir.display(),
        "Configuration loaded"
    );

    // Initialize components
    let device = Arc::new(DeviceController::new(FfmpegSource::new(FfmpegConfig {
        input: config.camera_input.clone(),
        input_format: config.camera_format.clone(),
        frame_timeout_sec: 10,
    })));
    tracing::info!("DeviceController initialized");

    let analysis_client = Arc::new(RemoteAnalysisClient::with_timeout(
        config.storage_url.clone(),
        config.classifier_url.clone(),
        config.analysis_url.clone(),
        Duration::from_secs(config.request_timeout_sec),
    ));
    tracing::info!(
        request_timeout_sec = config.request_timeout_sec,
        "RemoteAnalysisClient initialized"
    );

    let cache = Arc::new(ImageCache::new(config.cache_dir.clone()).await?);
    tracing::info!(cache_dir = %config.cache_dir.display(), "ImageCache initialized");

    let store = Arc::new(ResultStore::new());
    let quota = Arc::new(QuotaService::new(config.free_uploads));
    tracing::info!(free_uploads = config.free_uploads, "QuotaService initialized");

    let orchestrator = Arc::new(CaptureOrchestrator::new(
        analysis_client.clone(),
        quota.clone(),
        store.clone(),
        cache,
    ));
    tracing::info!("CaptureOrchestrator initialized");

    // Create application state
    let state = AppState {
        config,
        device,
        analysis_client,
        orchestrator,
        store,
        quota,
    };

    // Create router
    let app = web_api::create_router(state.clone())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = format!("{}:{}", state.config.host, state.config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
