//! Application state
//!
//! Holds all shared components and state

use crate::analysis_client::RemoteAnalysisClient;
use crate::device_controller::{DeviceController, FfmpegSource};
use crate::orchestrator::CaptureOrchestrator;
use crate::quota_gate::{QuotaService, DEFAULT_FREE_UPLOADS};
use crate::result_store::ResultStore;
use std::path::PathBuf;
use std::sync::Arc;

/// Orchestrator wired with the production backend and quota service
pub type Orchestrator = CaptureOrchestrator<RemoteAnalysisClient, QuotaService>;

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Storage service base URL (S3-style upload)
    pub storage_url: String,
    /// Classifier service base URL
    pub classifier_url: String,
    /// Enrichment analysis service base URL
    pub analysis_url: String,
    /// Server port
    pub port: u16,
    /// Server host
    pub host: String,
    /// Local image cache directory
    pub cache_dir: PathBuf,
    /// Capture device input (device node or URL)
    pub camera_input: String,
    /// ffmpeg input format for the capture device
    pub camera_format: String,
    /// Timeout for each remote analysis call in seconds
    pub request_timeout_sec: u64,
    /// Free operations for anonymous sessions
    pub free_uploads: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            storage_url: std::env::var("STORAGE_URL")
                .unwrap_or_else(|_| "http://localhost:8080".to_string()),
            classifier_url: std::env::var("CLASSIFIER_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:5001".to_string()),
            analysis_url: std::env::var("ANALYSIS_URL")
                .unwrap_or_else(|_| "http://localhost:8080".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            cache_dir: std::env::var("CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("/var/lib/trivision/cache")),
            camera_input: std::env::var("CAMERA_INPUT")
                .unwrap_or_else(|_| "/dev/video0".to_string()),
            camera_format: std::env::var("CAMERA_FORMAT").unwrap_or_else(|_| "v4l2".to_string()),
            request_timeout_sec: std::env::var("REQUEST_TIMEOUT_SEC")
                .ok()
                .and_then(|t| t.parse().ok())
                .unwrap_or(30),
            free_uploads: std::env::var("FREE_UPLOADS")
                .ok()
                .and_then(|n| n.parse().ok())
                .unwrap_or(DEFAULT_FREE_UPLOADS),
        }
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Application config
    pub config: AppConfig,
    /// DeviceController (capture session lifecycle)
    pub device: Arc<DeviceController<FfmpegSource>>,
    /// RemoteAnalysisClient (storage/classifier/analysis adapter)
    pub analysis_client: Arc<RemoteAnalysisClient>,
    /// CaptureOrchestrator (end-to-end run driver)
    pub orchestrator: Arc<Orchestrator>,
    /// ResultStore (current result + loading flag)
    pub store: Arc<ResultStore>,
    /// QuotaService (usage gate)
    pub quota: Arc<QuotaService>,
}
