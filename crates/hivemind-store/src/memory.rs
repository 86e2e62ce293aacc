use moka::future::Cache;
use std::time::Duration;

/// Hot cache of serialized round reports, keyed by scenario fingerprint.
///
/// Entries expire after the reuse window so a stale report is never served
/// from memory.
pub struct ResultCache {
    inner: Cache<String, String>,
}

impl ResultCache {
    pub fn new(max_capacity: u64, ttl: Duration) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(ttl)
                .build(),
        }
    }

    pub async fn get(&self, fingerprint: &str) -> Option<String> {
        self.inner.get(fingerprint).await
    }

    pub async fn insert(&self, fingerprint: String, report_json: String) {
        self.inner.insert(fingerprint, report_json).await;
    }

    pub async fn invalidate(&self, fingerprint: &str) {
        self.inner.invalidate(fingerprint).await;
    }

    pub async fn clear(&self) {
        self.inner.invalidate_all();
        self.inner.run_pending_tasks().await;
    }

    pub fn entry_count(&self) -> u64 {
        self.inner.entry_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn insert_and_get() {
        let cache = ResultCache::new(100, Duration::from_secs(60));
        cache.insert("fp-1".to_string(), r#"{"a":1}"#.to_string()).await;

        assert_eq!(cache.get("fp-1").await, Some(r#"{"a":1}"#.to_string()));
        assert_eq!(cache.get("fp-2").await, None);
    }

    #[tokio::test]
    async fn invalidate_and_clear() {
        let cache = ResultCache::new(100, Duration::from_secs(60));
        cache.insert("fp-1".to_string(), "one".to_string()).await;
        cache.insert("fp-2".to_string(), "two".to_string()).await;

        cache.invalidate("fp-1").await;
        assert!(cache.get("fp-1").await.is_none());
        assert!(cache.get("fp-2").await.is_some());

        cache.clear().await;
        assert!(cache.get("fp-2").await.is_none());
    }

    #[tokio::test]
    async fn ttl_expiration() {
        let cache = ResultCache::new(100, Duration::from_millis(50));
        cache.insert("fp-1".to_string(), "report".to_string()).await;
        assert!(cache.get("fp-1").await.is_some());

        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(cache.get("fp-1").await.is_none());
    }
}
