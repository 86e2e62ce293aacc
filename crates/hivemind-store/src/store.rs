use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use hivemind_models::journal_schema::{AgentStatsRow, RoundRow};
use hivemind_models::{RoundReport, StoreConfig};
use tracing::debug;

use crate::error::StoreError;
use crate::journal::Journal;
use crate::memory::ResultCache;

/// Round journal with read-through reuse: moka (hot) → SQLite → None.
///
/// Every recorded round lands in SQLite. When a reuse window is configured a
/// lookup returns the newest report for the same scenario fingerprint that is
/// younger than the window, promoting SQLite hits into the hot cache.
///
/// SQLite access is synchronized via `Mutex` since `rusqlite::Connection` is not `Sync`.
pub struct RoundStore {
    memory: ResultCache,
    journal: Mutex<Journal>,
    reuse_window: Duration,
}

impl RoundStore {
    pub fn new(journal: Journal, max_capacity: u64, reuse_window: Duration) -> Self {
        // moka rejects a zero TTL; with reuse disabled the cache is never read anyway.
        let ttl = reuse_window.max(Duration::from_secs(1));
        Self {
            memory: ResultCache::new(max_capacity, ttl),
            journal: Mutex::new(journal),
            reuse_window,
        }
    }

    /// Open the journal file named by the config.
    pub fn open(config: &StoreConfig) -> Result<Self, StoreError> {
        if let Some(parent) = std::path::Path::new(&config.sqlite_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StoreError::Unavailable(format!(
                        "cannot create journal directory {}: {e}",
                        parent.display()
                    ))
                })?;
            }
        }
        let journal = Journal::open(&config.sqlite_path)?;
        Ok(Self::new(
            journal,
            config.memory_max_capacity,
            Duration::from_secs(config.reuse_window_seconds),
        ))
    }

    pub fn reuse_enabled(&self) -> bool {
        !self.reuse_window.is_zero()
    }

    /// Find a reusable report for `fingerprint` decided within the reuse window before `now`.
    /// Only rounds that met quorum are reused. The returned report has `reused` set.
    pub async fn lookup(
        &self,
        fingerprint: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<RoundReport>, StoreError> {
        if !self.reuse_enabled() {
            return Ok(None);
        }
        let window = chrono::Duration::from_std(self.reuse_window)
            .map_err(|e| StoreError::Unavailable(format!("reuse window out of range: {e}")))?;
        let since = now - window;

        if let Some(json) = self.memory.get(fingerprint).await {
            let mut report: RoundReport = serde_json::from_str(&json)?;
            if report.result.timestamp >= since {
                debug!(fingerprint, round_id = %report.round_id, "reuse hit (memory)");
                report.reused = true;
                return Ok(Some(report));
            }
            self.memory.invalidate(fingerprint).await;
        }

        let row = self.lock()?.latest_for_fingerprint(fingerprint, since)?;

        if let Some(row) = row {
            debug!(fingerprint, round_id = %row.round_id, "reuse hit (journal)");
            self.memory
                .insert(fingerprint.to_string(), row.report_json.clone())
                .await;
            let mut report: RoundReport = serde_json::from_str(&row.report_json)?;
            report.reused = true;
            return Ok(Some(report));
        }

        Ok(None)
    }

    /// Journal a freshly decided round and make it available for reuse.
    pub async fn record(&self, fingerprint: &str, report: &RoundReport) -> Result<(), StoreError> {
        self.lock()?.record(fingerprint, report)?;
        if self.reuse_enabled() && report.result.quorum_met {
            self.memory
                .insert(fingerprint.to_string(), serde_json::to_string(report)?)
                .await;
        }
        Ok(())
    }

    /// Fetch a journaled report by round id.
    pub fn get(&self, round_id: &str) -> Result<Option<RoundReport>, StoreError> {
        match self.lock()?.get(round_id)? {
            Some(row) => Ok(Some(serde_json::from_str(&row.report_json)?)),
            None => Ok(None),
        }
    }

    pub fn recent(&self, limit: usize) -> Result<Vec<RoundRow>, StoreError> {
        self.lock()?.recent(limit)
    }

    pub fn agent_stats(&self) -> Result<Vec<AgentStatsRow>, StoreError> {
        self.lock()?.agent_stats()
    }

    /// Drop rounds decided before `cutoff` and clear the hot cache.
    pub async fn prune_before(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        let deleted = self.lock()?.prune_before(cutoff)?;
        self.memory.clear().await;
        Ok(deleted)
    }

    pub fn count(&self) -> Result<usize, StoreError> {
        self.lock()?.count()
    }

    /// Get the number of entries in the hot cache.
    pub fn hot_cache_size(&self) -> u64 {
        self.memory.entry_count()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Journal>, StoreError> {
        self.journal
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("journal mutex poisoned: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::tests::make_report;
    use chrono::Duration as ChronoDuration;

    fn store(reuse_secs: u64) -> RoundStore {
        RoundStore::new(
            Journal::open_in_memory().unwrap(),
            100,
            Duration::from_secs(reuse_secs),
        )
    }

    #[tokio::test]
    async fn reuse_disabled_never_hits() {
        let store = store(0);
        let report = make_report("BTC/USDT", Utc::now());
        store.record("fp", &report).await.unwrap();

        assert!(store.lookup("fp", Utc::now()).await.unwrap().is_none());
        assert_eq!(store.count().unwrap(), 1);
        assert_eq!(store.hot_cache_size(), 0);
    }

    #[tokio::test]
    async fn lookup_hits_memory_after_record() {
        let store = store(60);
        let report = make_report("BTC/USDT", Utc::now());
        store.record("fp", &report).await.unwrap();

        let hit = store.lookup("fp", Utc::now()).await.unwrap().unwrap();
        assert!(hit.reused);
        assert_eq!(hit.round_id, report.round_id);
        assert_eq!(hit.result, report.result);
    }

    #[tokio::test]
    async fn lookup_reads_through_journal_and_promotes() {
        let mut journal = Journal::open_in_memory().unwrap();
        let report = make_report("ETH/USDT", Utc::now() - ChronoDuration::seconds(5));
        journal.record("fp-eth", &report).unwrap();
        let store = RoundStore::new(journal, 100, Duration::from_secs(60));

        let hit = store.lookup("fp-eth", Utc::now()).await.unwrap().unwrap();
        assert!(hit.reused);
        assert_eq!(hit.round_id, report.round_id);

        // Promoted to the hot cache
        assert!(store.memory.get("fp-eth").await.is_some());
    }

    #[tokio::test]
    async fn round_without_quorum_is_not_reused() {
        let store = store(60);
        let mut report = make_report("BTC/USDT", Utc::now());
        report.result.quorum_met = false;
        store.record("fp", &report).await.unwrap();

        assert!(store.lookup("fp", Utc::now()).await.unwrap().is_none());
        assert_eq!(store.hot_cache_size(), 0);
        assert_eq!(store.count().unwrap(), 1);
    }

    #[tokio::test]
    async fn stale_report_is_not_reused() {
        let store = store(30);
        let report = make_report("BTC/USDT", Utc::now() - ChronoDuration::minutes(5));
        store.record("fp", &report).await.unwrap();

        assert!(store.lookup("fp", Utc::now()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn get_and_prune() {
        let store = store(60);
        let old = make_report("BTC/USDT", Utc::now() - ChronoDuration::days(3));
        let fresh = make_report("BTC/USDT", Utc::now());
        store.record("fp-old", &old).await.unwrap();
        store.record("fp-new", &fresh).await.unwrap();

        let loaded = store.get(&old.round_id.to_string()).unwrap().unwrap();
        assert!(!loaded.reused);

        let deleted = store
            .prune_before(Utc::now() - ChronoDuration::days(1))
            .await
            .unwrap();
        assert_eq!(deleted, 1);
        assert!(store.get(&old.round_id.to_string()).unwrap().is_none());
        assert_eq!(store.recent(10).unwrap().len(), 1);
    }
}
