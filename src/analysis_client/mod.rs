//! RemoteAnalysisClient - Remote Analysis Adapter
//!
//! ## Responsibilities
//!
//! - Storage upload, classification and enrichment calls
//! - Multipart form construction (one image payload, three services)
//! - Response parsing and required-field validation
//!
//! The three operations are independent and idempotent; none consumes
//! another's output. Sequencing is the orchestrator's concern.

use crate::error::{Error, Result};
use crate::models::ItemAnalysis;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::time::Duration;

/// Storage upload response
#[derive(Debug, Clone)]
pub struct UploadOutcome {
    pub url: String,
}

/// Classification response
#[derive(Debug, Clone)]
pub struct ClassifyOutcome {
    pub predicted_class: String,
    /// Confidence in percent, validated to 0..=100
    pub confidence: f64,
}

/// Contract over the three remote analysis operations
///
/// Injected into the orchestrator so runs can be driven by fakes in tests.
#[allow(async_fn_in_trait)]
pub trait AnalysisBackend: Send + Sync + 'static {
    /// `POST {storage}/upload`, field `image` -> `{ url }`
    async fn upload_to_storage(&self, image: Vec<u8>) -> Result<UploadOutcome>;

    /// `POST {classifier}/upload`, field `file` -> `{ predicted_class, confidence }`
    async fn classify(&self, image: Vec<u8>) -> Result<ClassifyOutcome>;

    /// `POST {analysis}/analyze`, field `image` -> `{ analysis }`
    async fn enrich(&self, image: Vec<u8>) -> Result<ItemAnalysis>;
}

#[derive(Debug, Deserialize)]
struct UploadWire {
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ClassifyWire {
    predicted_class: Option<String>,
    confidence: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct EnrichWire {
    analysis: Option<ItemAnalysis>,
}

/// HTTP client for the three analysis services
pub struct RemoteAnalysisClient {
    client: reqwest::Client,
    storage_url: String,
    classifier_url: String,
    analysis_url: String,
}

impl RemoteAnalysisClient {
    /// Create new client with the default 30s request timeout
    pub fn new(storage_url: String, classifier_url: String, analysis_url: String) -> Self {
        Self::with_timeout(
            storage_url,
            classifier_url,
            analysis_url,
            Duration::from_secs(30),
        )
    }

    /// Create new client with custom request timeout
    pub fn with_timeout(
        storage_url: String,
        classifier_url: String,
        analysis_url: String,
        timeout: Duration,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            storage_url,
            classifier_url,
            analysis_url,
        }
    }

    async fn post_image(
        &self,
        url: &str,
        field: &'static str,
        image: Vec<u8>,
    ) -> Result<reqwest::Response> {
        let form = Form::new().part(
            field,
            Part::bytes(image)
                .file_name("captured.jpg")
                .mime_str("image/jpeg")?,
        );

        let resp = self
            .client
            .post(url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| Error::Network(format!("{} unreachable: {}", url, e)))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Network(format!(
                "{} returned {}: {}",
                url,
                status,
                body.trim()
            )));
        }

        Ok(resp)
    }

    /// Check whether one of the remote services answers at all
    async fn ping(&self, base_url: &str) -> bool {
        self.client.get(base_url).send().await.is_ok()
    }

    /// Reachability of (storage, classifier, analysis)
    pub async fn health_check(&self) -> (bool, bool, bool) {
        (
            self.ping(&self.storage_url).await,
            self.ping(&self.classifier_url).await,
            self.ping(&self.analysis_url).await,
        )
    }
}

impl AnalysisBackend for RemoteAnalysisClient {
    async fn upload_to_storage(&self, image: Vec<u8>) -> Result<UploadOutcome> {
        let url = format!("{}/upload", self.storage_url);
        let resp = self.post_image(&url, "image", image).await?;

        let wire: UploadWire = resp
            .json()
            .await
            .map_err(|e| Error::Network(format!("storage response unparsable: {}", e)))?;

        let storage_url = wire
            .url
            .filter(|u| !u.is_empty())
            .ok_or_else(|| Error::Network("storage response missing url".to_string()))?;

        tracing::debug!(url = %storage_url, "Storage upload complete");
        Ok(UploadOutcome { url: storage_url })
    }

    async fn classify(&self, image: Vec<u8>) -> Result<ClassifyOutcome> {
        let url = format!("{}/upload", self.classifier_url);
        let resp = self.post_image(&url, "file", image).await?;

        let wire: ClassifyWire = resp
            .json()
            .await
            .map_err(|e| Error::Network(format!("classifier response unparsable: {}", e)))?;

        let predicted_class = wire
            .predicted_class
            .filter(|c| !c.is_empty())
            .ok_or_else(|| Error::Network("classifier response missing predicted_class".to_string()))?;

        let confidence = wire
            .confidence
            .ok_or_else(|| Error::Network("classifier response missing confidence".to_string()))?;
        if !(0.0..=100.0).contains(&confidence) {
            return Err(Error::Network(format!(
                "classifier confidence out of range: {}",
                confidence
            )));
        }

        tracing::debug!(
            predicted_class = %predicted_class,
            confidence = confidence,
            "Classification complete"
        );
        Ok(ClassifyOutcome {
            predicted_class,
            confidence,
        })
    }

    async fn enrich(&self, image: Vec<u8>) -> Result<ItemAnalysis> {
        let url = format!("{}/analyze", self.analysis_url);
        let resp = self.post_image(&url, "image", image).await?;

        let wire: EnrichWire = resp
            .json()
            .await
            .map_err(|e| Error::Network(format!("analysis response unparsable: {}", e)))?;

        let analysis = wire
            .analysis
            .ok_or_else(|| Error::Network("analysis response missing analysis".to_string()))?;

        tracing::debug!("Enrichment complete");
        Ok(analysis)
    }
}
