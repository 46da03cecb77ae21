//! Trivision Gateway Library
//!
//! Capture-and-analyze orchestration: one image in, one consolidated
//! sustainability analysis out.
//!
//! ## Architecture (7 Components)
//!
//! 1. DeviceController - Capture device acquisition, readiness, teardown
//! 2. RemoteAnalysisClient - Storage/classifier/analysis adapter
//! 3. CaptureOrchestrator - End-to-end run driver under the quota gate
//! 4. ResultStore - Current result + loading flag, replaced wholesale
//! 5. QuotaGate - Usage quota capability interface
//! 6. ImageCache - Local image persistence (opaque image refs)
//! 7. WebAPI - REST API endpoints
//!
//! ## Design Principles
//!
//! - Single finite-state enum for the capture session, one transition fn
//! - Strict sequential remote pipeline, short-circuit on first failure
//! - Injected capabilities (quota, backend, device) for testing with fakes

pub mod analysis_client;
pub mod device_controller;
pub mod image_cache;
pub mod orchestrator;
pub mod quota_gate;
pub mod result_store;
pub mod web_api;

pub mod error;
pub mod models;
pub mod state;

pub use error::{Error, Result};
pub use state::AppState;
