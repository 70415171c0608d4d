//! Demo Data Cache.
//!
//! Canned detections keyed by backend video id. Entries are never evicted;
//! the cache lives as long as the [`IngestManager`](crate::IngestManager)
//! that owns it.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::RwLock;

use roadscan_core::types::BackendId;
use roadscan_remote::Detection;

#[derive(Default)]
pub struct DemoDataCache {
    entries: RwLock<HashMap<BackendId, Arc<Vec<Detection>>>>,
}

impl DemoDataCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, video_id: &str) -> Option<Arc<Vec<Detection>>> {
        self.entries.read().await.get(video_id).cloned()
    }

    pub async fn insert(&self, video_id: &str, detections: Vec<Detection>) -> Arc<Vec<Detection>> {
        let detections = Arc::new(detections);
        self.entries
            .write()
            .await
            .insert(video_id.to_string(), detections.clone());
        detections
    }

    /// Return the cached detections, or run `load` and cache what it
    /// yields. A `None` from the loader is not cached.
    pub async fn get_or_load<F, Fut, E>(
        &self,
        video_id: &str,
        load: F,
    ) -> Result<Option<Arc<Vec<Detection>>>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<Vec<Detection>>, E>>,
    {
        if let Some(hit) = self.get(video_id).await {
            return Ok(Some(hit));
        }
        match load().await? {
            Some(detections) => Ok(Some(self.insert(video_id, detections).await)),
            None => Ok(None),
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn detection(asset_type: &str) -> Detection {
        Detection {
            asset_type: asset_type.into(),
            category: None,
            latitude: 0.0,
            longitude: 0.0,
            confidence: None,
            frame_time_secs: None,
            attributes: serde_json::Value::Null,
        }
    }

    #[tokio::test]
    async fn loader_runs_once_per_video() {
        let cache = DemoDataCache::new();
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let hit = cache
                .get_or_load("v-1", || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, ()>(Some(vec![detection("sign")]))
                })
                .await
                .unwrap();
            assert_eq!(hit.unwrap().len(), 1);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_dataset_is_not_cached() {
        let cache = DemoDataCache::new();
        let hit = cache
            .get_or_load("v-1", || async { Ok::<_, ()>(None) })
            .await
            .unwrap();
        assert!(hit.is_none());
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn clear_empties_cache() {
        let cache = DemoDataCache::new();
        cache.insert("v-1", vec![detection("pothole")]).await;
        cache.insert("v-2", vec![]).await;
        assert_eq!(cache.len().await, 2);

        cache.clear().await;
        assert!(cache.get("v-1").await.is_none());
    }
}
