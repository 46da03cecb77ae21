//! CaptureOrchestrator - One End-to-End Analysis Run
//!
//! ## Responsibilities
//!
//! - Quota gate check before any work
//! - Placeholder publication before any network call
//! - Strict upload -> classify -> enrich sequencing, short-circuit on
//!   first failure, no partial merges
//! - Single quota decrement per fully successful run
//! - At-most-one run in flight

use crate::analysis_client::AnalysisBackend;
use crate::error::{Error, Result};
use crate::image_cache::ImageCache;
use crate::models::AnalysisResult;
use crate::quota_gate::QuotaGate;
use crate::result_store::ResultStore;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// CaptureOrchestrator instance
pub struct CaptureOrchestrator<B: AnalysisBackend, Q: QuotaGate> {
    backend: Arc<B>,
    quota: Arc<Q>,
    store: Arc<ResultStore>,
    cache: Arc<ImageCache>,
    running: RwLock<bool>,
}

impl<B: AnalysisBackend, Q: QuotaGate> CaptureOrchestrator<B, Q> {
    /// Create new orchestrator
    pub fn new(
        backend: Arc<B>,
        quota: Arc<Q>,
        store: Arc<ResultStore>,
        cache: Arc<ImageCache>,
    ) -> Self {
        Self {
            backend,
            quota,
            store,
            cache,
            running: RwLock::new(false),
        }
    }

    /// Whether a run is currently in flight
    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }

    /// Drive one complete analysis run for the given image bytes
    ///
    /// Errors are terminal for the attempt; there are no retries. A second
    /// call while one run is in flight is rejected.
    pub async fn run(&self, image: Vec<u8>) -> Result<AnalysisResult> {
        if image.is_empty() {
            return Err(Error::Validation("no image available".to_string()));
        }

        if !self.quota.can_upload().await {
            return Err(Error::Unauthorized(
                "upload quota exhausted, sign in to continue".to_string(),
            ));
        }

        {
            let mut running = self.running.write().await;
            if *running {
                tracing::warn!("Analysis run already in flight, rejecting");
                return Err(Error::Validation(
                    "an analysis run is already in progress".to_string(),
                ));
            }
            *running = true;
        }

        let outcome = self.execute(image).await;

        {
            let mut running = self.running.write().await;
            *running = false;
        }

        outcome
    }

    async fn execute(&self, image: Vec<u8>) -> Result<AnalysisResult> {
        let run_id = Uuid::new_v4();
        let started = std::time::Instant::now();

        let image_ref = self.cache.save(&image).await?;
        let image_ref = image_ref.display().to_string();

        // The placeholder goes out before the first network call so
        // consumers always have a complete renderable value
        self.store
            .begin(AnalysisResult::placeholder(image_ref.clone()))
            .await;

        tracing::info!(
            run_id = %run_id,
            image_ref = %image_ref,
            size = image.len(),
            "Analysis run started"
        );

        match self.remote_steps(&image_ref, image).await {
            Ok(result) => {
                self.store.publish(result.clone()).await;
                self.quota.decrement_uploads().await;

                tracing::info!(
                    run_id = %run_id,
                    predicted_class = %result.predicted_class,
                    confidence = result.confidence,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Analysis run complete"
                );
                Ok(result)
            }
            Err(e) => {
                // Discard everything obtained so far; only the loading flag
                // changes, the placeholder stays visible
                self.store.fail().await;

                tracing::error!(
                    run_id = %run_id,
                    error = %e,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Analysis run failed"
                );
                Err(e)
            }
        }
    }

    /// The three remote calls, strictly sequential, short-circuiting
    async fn remote_steps(&self, image_ref: &str, image: Vec<u8>) -> Result<AnalysisResult> {
        let upload = self.backend.upload_to_storage(image.clone()).await?;
        let classified = self.backend.classify(image.clone()).await?;
        let analysis = self.backend.enrich(image).await?;

        Ok(AnalysisResult::assemble(
            image_ref.to_string(),
            upload.url,
            classified.predicted_class,
            classified.confidence,
            analysis,
        ))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::analysis_client::{ClassifyOutcome, UploadOutcome};
    use crate::models::ItemAnalysis;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use tokio::sync::Notify;

    fn filled_analysis() -> ItemAnalysis {
        let mut analysis = ItemAnalysis::default();
        analysis.recyclable.is_recyclable = true;
        analysis.recyclable.material = "PET".to_string();
        analysis.recyclable.centers = vec!["City recycling center".to_string()];
        analysis.time_to_degrade = "450 years".to_string();
        analysis.description = "A plastic bottle".to_string();
        analysis
    }

    #[derive(Default)]
    pub(crate) struct FakeBackend {
        upload_calls: AtomicU32,
        classify_calls: AtomicU32,
        enrich_calls: AtomicU32,
        fail_upload: bool,
        fail_classify: bool,
        fail_enrich: bool,
        /// When set, `upload_to_storage` signals `upload_entered` and then
        /// parks until notified, letting tests observe mid-run state
        hold_in_upload: Option<Arc<Notify>>,
        upload_entered: Option<Arc<Notify>>,
    }

    impl AnalysisBackend for FakeBackend {
        async fn upload_to_storage(&self, _image: Vec<u8>) -> Result<UploadOutcome> {
            self.upload_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(entered) = &self.upload_entered {
                entered.notify_one();
            }
            if let Some(hold) = &self.hold_in_upload {
                hold.notified().await;
            }
            if self.fail_upload {
                return Err(Error::Network("storage unreachable".to_string()));
            }
            Ok(UploadOutcome {
                url: "https://cdn/x/1.jpg".to_string(),
            })
        }

        async fn classify(&self, _image: Vec<u8>) -> Result<ClassifyOutcome> {
            self.classify_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_classify {
                return Err(Error::Network("classifier returned 500".to_string()));
            }
            Ok(ClassifyOutcome {
                predicted_class: "plastic_bottle".to_string(),
                confidence: 92.5,
            })
        }

        async fn enrich(&self, _image: Vec<u8>) -> Result<ItemAnalysis> {
            self.enrich_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_enrich {
                return Err(Error::Network("analysis returned 502".to_string()));
            }
            Ok(filled_analysis())
        }
    }

    #[derive(Default)]
    pub(crate) struct FakeQuota {
        pub(crate) denied: AtomicBool,
        pub(crate) decrements: AtomicU32,
    }

    impl QuotaGate for FakeQuota {
        async fn can_upload(&self) -> bool {
            !self.denied.load(Ordering::SeqCst)
        }

        async fn decrement_uploads(&self) {
            self.decrements.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Harness {
        orchestrator: Arc<CaptureOrchestrator<FakeBackend, FakeQuota>>,
        backend: Arc<FakeBackend>,
        quota: Arc<FakeQuota>,
        store: Arc<ResultStore>,
    }

    async fn harness(backend: FakeBackend, quota: FakeQuota) -> Harness {
        let dir = std::env::temp_dir().join(format!("trivision-orch-{}", Uuid::new_v4()));
        let cache = Arc::new(ImageCache::new(dir).await.unwrap());
        let backend = Arc::new(backend);
        let quota = Arc::new(quota);
        let store = Arc::new(ResultStore::new());
        let orchestrator = Arc::new(CaptureOrchestrator::new(
            backend.clone(),
            quota.clone(),
            store.clone(),
            cache,
        ));
        Harness {
            orchestrator,
            backend,
            quota,
            store,
        }
    }

    fn sample_image() -> Vec<u8> {
        vec![0xff, 0xd8, 0xff, 0xe0, 0x00, 0x10]
    }

    #[tokio::test]
    async fn test_successful_run_assembles_all_three_responses() {
        let h = harness(FakeBackend::default(), FakeQuota::default()).await;

        let result = h.orchestrator.run(sample_image()).await.unwrap();

        assert_eq!(result.storage_url, "https://cdn/x/1.jpg");
        assert_eq!(result.predicted_class, "plastic_bottle");
        assert_eq!(result.confidence, 92.5);
        assert!((0.0..=100.0).contains(&result.confidence));
        assert_eq!(result.analysis, filled_analysis());
        assert!(!result.image_ref.is_empty());

        let snap = h.store.snapshot().await;
        assert!(!snap.is_loading);
        assert_eq!(snap.result.unwrap(), result);
        assert_eq!(h.quota.decrements.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_image_is_rejected_before_any_work() {
        let h = harness(FakeBackend::default(), FakeQuota::default()).await;

        let err = h.orchestrator.run(Vec::new()).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        assert_eq!(h.backend.upload_calls.load(Ordering::SeqCst), 0);
        assert!(h.store.snapshot().await.result.is_none());
        assert_eq!(h.quota.decrements.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_quota_denied_touches_nothing() {
        let quota = FakeQuota::default();
        quota.denied.store(true, Ordering::SeqCst);
        let h = harness(FakeBackend::default(), quota).await;

        let err = h.orchestrator.run(sample_image()).await.unwrap_err();
        assert!(matches!(err, Error::Unauthorized(_)));

        assert_eq!(h.backend.upload_calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.backend.classify_calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.backend.enrich_calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.quota.decrements.load(Ordering::SeqCst), 0);
        assert!(h.store.snapshot().await.result.is_none());
    }

    #[tokio::test]
    async fn test_placeholder_visible_while_network_in_flight() {
        let hold = Arc::new(Notify::new());
        let entered = Arc::new(Notify::new());
        let backend = FakeBackend {
            hold_in_upload: Some(hold.clone()),
            upload_entered: Some(entered.clone()),
            ..Default::default()
        };
        let h = harness(backend, FakeQuota::default()).await;

        let runner = h.orchestrator.clone();
        let handle = tokio::spawn(async move { runner.run(sample_image()).await });

        entered.notified().await;
        let snap = h.store.snapshot().await;
        assert!(snap.is_loading);
        let placeholder = snap.result.unwrap();
        assert_eq!(placeholder.storage_url, "");
        assert_eq!(placeholder.predicted_class, "");
        assert!(!placeholder.analysis.biodegradable);

        hold.notify_one();
        handle.await.unwrap().unwrap();
        assert!(!h.store.snapshot().await.is_loading);
    }

    #[tokio::test]
    async fn test_classify_failure_discards_upload_and_skips_enrich() {
        let backend = FakeBackend {
            fail_classify: true,
            ..Default::default()
        };
        let h = harness(backend, FakeQuota::default()).await;

        let err = h.orchestrator.run(sample_image()).await.unwrap_err();
        assert!(matches!(err, Error::Network(_)));

        assert_eq!(h.backend.upload_calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.backend.classify_calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.backend.enrich_calls.load(Ordering::SeqCst), 0);

        // The storage URL obtained before the failure is never merged in
        let snap = h.store.snapshot().await;
        assert!(!snap.is_loading);
        let visible = snap.result.unwrap();
        assert_eq!(visible.storage_url, "");
        assert_eq!(visible.predicted_class, "");
        assert_eq!(h.quota.decrements.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_upload_failure_skips_remaining_steps() {
        let backend = FakeBackend {
            fail_upload: true,
            ..Default::default()
        };
        let h = harness(backend, FakeQuota::default()).await;

        let err = h.orchestrator.run(sample_image()).await.unwrap_err();
        assert!(matches!(err, Error::Network(_)));

        assert_eq!(h.backend.classify_calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.backend.enrich_calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.quota.decrements.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_enrich_failure_decrements_nothing() {
        let backend = FakeBackend {
            fail_enrich: true,
            ..Default::default()
        };
        let h = harness(backend, FakeQuota::default()).await;

        let err = h.orchestrator.run(sample_image()).await.unwrap_err();
        assert!(matches!(err, Error::Network(_)));
        assert_eq!(h.quota.decrements.load(Ordering::SeqCst), 0);
        assert!(!h.store.snapshot().await.is_loading);
    }

    #[tokio::test]
    async fn test_second_run_rejected_while_first_in_flight() {
        let hold = Arc::new(Notify::new());
        let entered = Arc::new(Notify::new());
        let backend = FakeBackend {
            hold_in_upload: Some(hold.clone()),
            upload_entered: Some(entered.clone()),
            ..Default::default()
        };
        let h = harness(backend, FakeQuota::default()).await;

        let runner = h.orchestrator.clone();
        let handle = tokio::spawn(async move { runner.run(sample_image()).await });
        entered.notified().await;

        assert!(h.orchestrator.is_running().await);
        let err = h.orchestrator.run(sample_image()).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        hold.notify_one();
        handle.await.unwrap().unwrap();
        assert!(!h.orchestrator.is_running().await);

        // Guard released, a new run goes through (pre-arm the upload hold)
        hold.notify_one();
        h.orchestrator.run(sample_image()).await.unwrap();
        assert_eq!(h.quota.decrements.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failed_run_releases_guard() {
        let backend = FakeBackend {
            fail_upload: true,
            ..Default::default()
        };
        let h = harness(backend, FakeQuota::default()).await;

        h.orchestrator.run(sample_image()).await.unwrap_err();
        assert!(!h.orchestrator.is_running().await);
    }
}
