//! ImageCache - Local Image Persistence
//!
//! Persists the accepted image under a uuid filename so the current
//! session has a stable local reference to render while (and after) the
//! remote calls run. The returned path is the opaque `image_ref` recorded
//! in the analysis result. Results are session-scoped, so only the most
//! recent image is kept; saving a new one prunes its predecessor.

use crate::error::Result;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use uuid::Uuid;

/// ImageCache instance
pub struct ImageCache {
    cache_dir: PathBuf,
    current: Mutex<Option<PathBuf>>,
}

impl ImageCache {
    /// Create new cache, making sure the directory exists
    pub async fn new(cache_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&cache_dir).await?;
        Ok(Self {
            cache_dir,
            current: Mutex::new(None),
        })
    }

    /// Save JPEG bytes under a fresh uuid name, returning the local ref
    ///
    /// The previously saved image, if any, is removed once the new one is
    /// on disk.
    pub async fn save(&self, data: &[u8]) -> Result<PathBuf> {
        let path = self.cache_dir.join(format!("{}.jpg", Uuid::new_v4()));
        fs::write(&path, data).await?;

        let superseded = {
            let mut current = self.current.lock().await;
            current.replace(path.clone())
        };
        if let Some(old) = superseded {
            if let Err(e) = fs::remove_file(&old).await {
                tracing::warn!(
                    path = %old.display(),
                    error = %e,
                    "Failed to prune superseded cache image"
                );
            }
        }

        tracing::debug!(
            path = %path.display(),
            size = data.len(),
            "Saved image to cache"
        );

        Ok(path)
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_save_returns_unique_refs() {
        let dir = std::env::temp_dir().join(format!("trivision-test-{}", Uuid::new_v4()));
        let cache = ImageCache::new(dir.clone()).await.unwrap();

        let a = cache.save(&[1, 2, 3]).await.unwrap();
        let b = cache.save(&[4, 5, 6]).await.unwrap();
        assert_ne!(a, b);
        assert_eq!(fs::read(&b).await.unwrap(), vec![4, 5, 6]);

        fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn test_save_prunes_superseded_image() {
        let dir = std::env::temp_dir().join(format!("trivision-test-{}", Uuid::new_v4()));
        let cache = ImageCache::new(dir.clone()).await.unwrap();

        let a = cache.save(&[1, 2, 3]).await.unwrap();
        assert_eq!(fs::read(&a).await.unwrap(), vec![1, 2, 3]);

        let b = cache.save(&[4, 5, 6]).await.unwrap();
        assert!(fs::metadata(&a).await.is_err());
        assert_eq!(fs::read(&b).await.unwrap(), vec![4, 5, 6]);

        // The directory never holds more than the latest image
        let mut entries = fs::read_dir(&dir).await.unwrap();
        let mut count = 0;
        while entries.next_entry().await.unwrap().is_some() {
            count += 1;
        }
        assert_eq!(count, 1);

        fs::remove_dir_all(&dir).await.unwrap();
    }
}
