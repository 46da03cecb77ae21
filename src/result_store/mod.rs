//! ResultStore - Current Analysis Result
//!
//! Holds the result of the most recent orchestration run together with the
//! loading flag. Every update replaces the result wholesale with a complete
//! structure; partial field patches do not exist. Presentation reads the
//! snapshot; no business logic lives here.

use crate::models::AnalysisResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// Renderable view of the store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultSnapshot {
    pub result: Option<AnalysisResult>,
    pub is_loading: bool,
    pub updated_at: DateTime<Utc>,
}

/// ResultStore instance
pub struct ResultStore {
    inner: RwLock<ResultSnapshot>,
}

impl ResultStore {
    /// Create new empty store
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(ResultSnapshot {
                result: None,
                is_loading: false,
                updated_at: Utc::now(),
            }),
        }
    }

    /// Publish a placeholder and raise the loading flag (run start)
    pub async fn begin(&self, placeholder: AnalysisResult) {
        let mut inner = self.inner.write().await;
        inner.result = Some(placeholder);
        inner.is_loading = true;
        inner.updated_at = Utc::now();
    }

    /// Replace the result wholesale and clear the loading flag (run success)
    pub async fn publish(&self, result: AnalysisResult) {
        let mut inner = self.inner.write().await;
        inner.result = Some(result);
        inner.is_loading = false;
        inner.updated_at = Utc::now();
    }

    /// Clear the loading flag, keeping the placeholder in place (run failure)
    ///
    /// Partial results from a failed run are never merged in; the
    /// placeholder published at run start stays as the visible value.
    pub async fn fail(&self) {
        let mut inner = self.inner.write().await;
        inner.is_loading = false;
        inner.updated_at = Utc::now();
    }

    /// Current snapshot
    pub async fn snapshot(&self) -> ResultSnapshot {
        self.inner.read().await.clone()
    }
}

impl Default for ResultStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_store() {
        let store = ResultStore::new();
        let snap = store.snapshot().await;
        assert!(snap.result.is_none());
        assert!(!snap.is_loading);
    }

    #[tokio::test]
    async fn test_begin_publishes_placeholder_with_loading() {
        let store = ResultStore::new();
        store.begin(AnalysisResult::placeholder("ref-1")).await;
        let snap = store.snapshot().await;
        assert!(snap.is_loading);
        let result = snap.result.unwrap();
        assert_eq!(result.image_ref, "ref-1");
        assert_eq!(result.storage_url, "");
        assert_eq!(result.predicted_class, "");
    }

    #[tokio::test]
    async fn test_publish_replaces_wholesale() {
        let store = ResultStore::new();
        store.begin(AnalysisResult::placeholder("ref-1")).await;

        let mut done = AnalysisResult::placeholder("ref-1");
        done.storage_url = "https://cdn/x/1.jpg".to_string();
        done.predicted_class = "plastic_bottle".to_string();
        done.confidence = 92.5;
        store.publish(done.clone()).await;

        let snap = store.snapshot().await;
        assert!(!snap.is_loading);
        assert_eq!(snap.result.unwrap(), done);
    }

    #[tokio::test]
    async fn test_fail_clears_loading_keeps_placeholder() {
        let store = ResultStore::new();
        store.begin(AnalysisResult::placeholder("ref-1")).await;
        store.fail().await;

        let snap = store.snapshot().await;
        assert!(!snap.is_loading);
        let result = snap.result.unwrap();
        assert_eq!(result.storage_url, "");
        assert_eq!(result.predicted_class, "");
    }
}
