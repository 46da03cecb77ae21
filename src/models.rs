//! Shared models and types
//!
//! This module contains types shared across multiple modules
//! to avoid circular dependencies.

use serde::{Deserialize, Serialize};

/// Standard API response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub storage_connected: bool,
    pub classifier_connected: bool,
    pub analysis_connected: bool,
}

/// Resale assessment section of an analysis
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResaleInfo {
    pub is_resalable: bool,
    #[serde(default)]
    pub platforms: Vec<String>,
    #[serde(default)]
    pub condition: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub tips: String,
}

/// Recycling assessment section of an analysis
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecycleInfo {
    pub is_recyclable: bool,
    #[serde(default)]
    pub centers: Vec<String>,
    #[serde(default)]
    pub material: String,
    #[serde(default)]
    pub process: String,
    #[serde(default)]
    pub impact: String,
}

/// Reuse assessment section of an analysis
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReuseInfo {
    pub is_reusable: bool,
    #[serde(default)]
    pub ways: Vec<String>,
    #[serde(default)]
    pub durability: String,
    #[serde(default)]
    pub benefits: String,
    #[serde(default)]
    pub tutorial: String,
}

/// Consolidated sustainability assessment returned by the analysis service
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemAnalysis {
    pub resalable: ResaleInfo,
    pub recyclable: RecycleInfo,
    pub reusable: ReuseInfo,
    pub biodegradable: bool,
    #[serde(default)]
    pub time_to_degrade: String,
    #[serde(default)]
    pub description: String,
}

/// Consolidated result of one orchestration run
///
/// The structure is always fully populated. A placeholder with empty
/// strings and false flags is published before any network call so
/// consumers never observe a partial shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Opaque local reference to the accepted image (cache path)
    pub image_ref: String,
    /// Public URL returned by the storage service
    pub storage_url: String,
    /// Class label returned by the classifier
    pub predicted_class: String,
    /// Classifier confidence in percent, 0..=100
    pub confidence: f64,
    pub analysis: ItemAnalysis,
}

impl AnalysisResult {
    /// All-empty/false result published at the start of a run
    pub fn placeholder(image_ref: impl Into<String>) -> Self {
        Self {
            image_ref: image_ref.into(),
            ..Default::default()
        }
    }

    /// Assemble the final result from the three remote responses
    pub fn assemble(
        image_ref: String,
        storage_url: String,
        predicted_class: String,
        confidence: f64,
        analysis: ItemAnalysis,
    ) -> Self {
        Self {
            image_ref,
            storage_url,
            predicted_class,
            confidence,
            analysis,
        }
    }
}
