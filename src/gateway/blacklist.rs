use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{info, warn};

use crate::domain::{BlacklistEntry, CommentRecord, NewBlacklistEntry};
use crate::error::{ConsistencyReason, ModerationError, ModerationResult};
use crate::moderation::ResultSetHandle;
use crate::observability::Metrics;
use crate::store::BlacklistStore;

/// Blacklist cache in front of [`BlacklistStore`].
///
/// Every successful mutation flips `is_blacklisted` on the loaded records of
/// the affected author.
pub struct BlacklistSyncGateway {
    store: Arc<dyn BlacklistStore>,
    results: ResultSetHandle,
    metrics: Arc<Metrics>,
    entries: RwLock<Vec<BlacklistEntry>>,
}

impl BlacklistSyncGateway {
    pub fn new(
        store: Arc<dyn BlacklistStore>,
        results: ResultSetHandle,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            store,
            results,
            metrics,
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Reloads the list from the store and re-derives every loaded badge.
    ///
    /// # Errors
    /// `Collaborator` when the store cannot be listed; the cache is kept.
    pub async fn refresh(&self) -> ModerationResult<Vec<BlacklistEntry>> {
        let entries = self
            .store
            .list()
            .await
            .map_err(|e| ModerationError::collaborator("blacklist.list", &e))?;

        let listed: HashSet<String> = entries
            .iter()
            .map(|e| e.author_identifier.clone())
            .collect();
        *self.entries.write().unwrap_or_else(PoisonError::into_inner) = entries.clone();
        let changed = self.results.write().sync_blacklist(&listed);
        self.metrics.record_relabels(changed);
        info!(entries = entries.len(), relabelled = changed, "blacklist refreshed");
        Ok(entries)
    }

    #[must_use]
    pub fn list(&self) -> Vec<BlacklistEntry> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn contains(&self, author_identifier: &str) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|e| e.author_identifier == author_identifier)
    }

    #[must_use]
    pub fn listed_authors(&self) -> HashSet<String> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|e| e.author_identifier.clone())
            .collect()
    }

    /// Adds an author, or bumps its violation count when already listed.
    ///
    /// # Errors
    /// `ConsistencyViolation(EmptyAuthor)` for a blank identifier,
    /// `Collaborator` when the store refuses the entry.
    pub async fn add(&self, mut entry: NewBlacklistEntry) -> ModerationResult<BlacklistEntry> {
        entry.author_identifier = entry.author_identifier.trim().to_string();
        if entry.author_identifier.is_empty() {
            return Err(ModerationError::consistency(
                "authorIdentifier",
                ConsistencyReason::EmptyAuthor,
            ));
        }
        if entry.author_name.trim().is_empty() {
            entry.author_name.clone_from(&entry.author_identifier);
        }

        let saved = self
            .store
            .add(entry)
            .await
            .map_err(|e| ModerationError::collaborator("blacklist.add", &e))?;

        {
            let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
            match entries
                .iter()
                .position(|e| e.author_identifier == saved.author_identifier)
            {
                Some(index) => entries[index] = saved.clone(),
                None => entries.push(saved.clone()),
            }
        }
        let changed = self
            .results
            .write()
            .apply_blacklist(&saved.author_identifier, true);
        self.metrics.record_relabels(changed);
        info!(
            author = %saved.author_identifier,
            violation_count = saved.violation_count,
            relabelled = changed,
            "author blacklisted"
        );
        Ok(saved)
    }

    /// Blacklists the author of `record`.
    ///
    /// # Errors
    /// Same as [`Self::add`].
    pub async fn escalate(
        &self,
        record: &CommentRecord,
        reason: Option<String>,
    ) -> ModerationResult<BlacklistEntry> {
        self.add(NewBlacklistEntry::from_comment(record, reason)).await
    }

    /// Removes an author. Returns `false` without calling the store when the
    /// author is not listed.
    ///
    /// # Errors
    /// `Collaborator` when the store refuses the removal.
    pub async fn remove(&self, author_identifier: &str) -> ModerationResult<bool> {
        let blacklist_id = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|e| e.author_identifier == author_identifier)
            .map(|e| e.blacklist_id);
        let Some(blacklist_id) = blacklist_id else {
            return Ok(false);
        };

        self.store.remove(blacklist_id).await.map_err(|e| {
            warn!(author = %author_identifier, error = %e, "blacklist removal failed");
            ModerationError::collaborator("blacklist.remove", &e)
        })?;

        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|e| e.blacklist_id != blacklist_id);
        let changed = self.results.write().apply_blacklist(author_identifier, false);
        self.metrics.record_relabels(changed);
        info!(author = %author_identifier, relabelled = changed, "author removed from blacklist");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use prometheus::Registry;
    use tracing_test::traced_test;

    use super::*;
    use crate::domain::Scope;
    use crate::moderation::result_set::tests::record;
    use crate::store::memory::MemoryBlacklistStore;

    fn gateway() -> (BlacklistSyncGateway, Arc<MemoryBlacklistStore>, ResultSetHandle) {
        let store = Arc::new(MemoryBlacklistStore::new());
        let results = ResultSetHandle::new();
        results.write().load(
            vec![
                record("c1", "v1", 1, true, "bad"),
                record("c2", "v1", 2, false, "fine"),
            ],
            Scope::all(),
        );
        let metrics = Arc::new(Metrics::new(&Registry::new()).unwrap());
        let gateway = BlacklistSyncGateway::new(store.clone(), results.clone(), metrics);
        (gateway, store, results)
    }

    #[tokio::test]
    async fn escalating_twice_increments_violation_count() {
        let (gateway, store, results) = gateway();
        let target = results.read().get("c1").cloned().unwrap();

        let first = gateway.escalate(&target, None).await.unwrap();
        let second = gateway.escalate(&target, Some("repeat".into())).await.unwrap();

        assert_eq!(first.blacklist_id, second.blacklist_id);
        assert_eq!(second.violation_count, first.violation_count + 1);
        assert_eq!(gateway.list().len(), 1);
        assert_eq!(store.add_calls(), 2);
        assert!(results.read().get("c1").unwrap().is_blacklisted);
        assert!(!results.read().get("c2").unwrap().is_blacklisted);
    }

    #[tokio::test]
    #[traced_test]
    async fn add_logs_the_author_and_count() {
        let (gateway, _, results) = gateway();
        let target = results.read().get("c1").cloned().unwrap();
        gateway.escalate(&target, None).await.unwrap();

        assert!(logs_contain("author blacklisted"));
        assert!(logs_contain("author=author-c1"));
    }

    #[tokio::test]
    async fn removing_unknown_author_is_a_noop() {
        let (gateway, _, _) = gateway();
        assert!(!gateway.remove("nobody").await.unwrap());
    }

    #[tokio::test]
    async fn remove_clears_badges() {
        let (gateway, _, results) = gateway();
        let target = results.read().get("c1").cloned().unwrap();
        gateway.escalate(&target, None).await.unwrap();

        assert!(gateway.remove("author-c1").await.unwrap());
        assert!(!gateway.contains("author-c1"));
        assert!(!results.read().get("c1").unwrap().is_blacklisted);
    }

    #[tokio::test]
    async fn failed_add_leaves_badges_alone() {
        let (gateway, store, results) = gateway();
        store.fail_with(Some("backend down"));
        let target = results.read().get("c1").cloned().unwrap();

        let error = gateway.escalate(&target, None).await.unwrap_err();
        assert!(matches!(error, ModerationError::Collaborator { .. }));
        assert!(!results.read().get("c1").unwrap().is_blacklisted);
        assert!(gateway.list().is_empty());
    }

    #[tokio::test]
    async fn refresh_rederives_badges() {
        let (gateway, store, results) = gateway();
        store
            .add(NewBlacklistEntry {
                author_name: "two".into(),
                author_identifier: "author-c2".into(),
                platform: crate::domain::Platform::Youtube,
                reason: "manual".into(),
                comment_text: None,
            })
            .await
            .unwrap();

        let entries = gateway.refresh().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert!(results.read().get("c2").unwrap().is_blacklisted);
    }
}
