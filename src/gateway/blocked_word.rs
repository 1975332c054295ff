use std::sync::{Arc, PoisonError, RwLock};

use tracing::info;

use crate::domain::{BlockedWord, BlockedWordUpdate, NewBlockedWord, blocked_word::normalize_word};
use crate::error::{ConsistencyReason, ModerationError, ModerationResult};
use crate::moderation::{BlockedWordMatcher, ResultSetHandle};
use crate::observability::Metrics;
use crate::store::BlockedWordStore;

#[derive(Default)]
struct Cache {
    /// Registration order (ascending `word_id`).
    words: Vec<BlockedWord>,
    matcher: BlockedWordMatcher,
}

impl Cache {
    fn replace(&mut self, mut words: Vec<BlockedWord>) {
        words.sort_by_key(|w| w.word_id);
        self.matcher = BlockedWordMatcher::new(&words);
        self.words = words;
    }

    fn upsert(&mut self, word: BlockedWord) {
        let mut words = std::mem::take(&mut self.words);
        words.retain(|w| w.word_id != word.word_id);
        words.push(word);
        self.replace(words);
    }

    fn find(&self, word_id: i64) -> Option<&BlockedWord> {
        self.words.iter().find(|w| w.word_id == word_id)
    }

    fn is_duplicate(&self, key: &str, except: Option<i64>) -> bool {
        self.words
            .iter()
            .any(|w| Some(w.word_id) != except && normalize_word(&w.word) == key)
    }
}

/// Blocked-word cache in front of [`BlockedWordStore`].
///
/// Mutations relabel only the loaded records whose text mentions the
/// affected word.
pub struct BlockedWordSyncGateway {
    store: Arc<dyn BlockedWordStore>,
    results: ResultSetHandle,
    metrics: Arc<Metrics>,
    cache: RwLock<Cache>,
}

impl BlockedWordSyncGateway {
    pub fn new(
        store: Arc<dyn BlockedWordStore>,
        results: ResultSetHandle,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            store,
            results,
            metrics,
            cache: RwLock::new(Cache::default()),
        }
    }

    /// # Errors
    /// `Collaborator` when the store cannot be listed; the cache is kept.
    pub async fn refresh(&self) -> ModerationResult<Vec<BlockedWord>> {
        let words = self
            .store
            .list()
            .await
            .map_err(|e| ModerationError::collaborator("blocked_words.list", &e))?;
        let matcher = {
            let mut cache = self.write_cache();
            cache.replace(words);
            cache.matcher.clone()
        };
        let changed = self.results.write().relabel_all(&matcher);
        self.metrics.record_relabels(changed);
        info!(relabelled = changed, "blocked words refreshed");
        Ok(self.list())
    }

    #[must_use]
    pub fn list(&self) -> Vec<BlockedWord> {
        self.read_cache().words.clone()
    }

    /// Matcher over the active words.
    #[must_use]
    pub fn matcher(&self) -> BlockedWordMatcher {
        self.read_cache().matcher.clone()
    }

    /// # Errors
    /// `ConsistencyViolation` for a blank or duplicate word, `Collaborator`
    /// when the store refuses it.
    pub async fn add(&self, mut word: NewBlockedWord) -> ModerationResult<BlockedWord> {
        word.word = word.word.trim().to_string();
        let key = normalize_word(&word.word);
        if key.is_empty() {
            return Err(ModerationError::consistency(
                "word",
                ConsistencyReason::EmptyBlockedWord,
            ));
        }
        if self.read_cache().is_duplicate(&key, None) {
            return Err(ModerationError::consistency(
                word.word,
                ConsistencyReason::DuplicateBlockedWord,
            ));
        }

        let saved = self
            .store
            .add(word)
            .await
            .map_err(|e| ModerationError::collaborator("blocked_words.add", &e))?;
        self.apply(saved.clone(), &[saved.word.as_str()]);
        Ok(saved)
    }

    /// # Errors
    /// `ConsistencyViolation` for an unknown id or a blank/duplicate new
    /// spelling, `Collaborator` when the store refuses the update.
    pub async fn update(
        &self,
        word_id: i64,
        mut update: BlockedWordUpdate,
    ) -> ModerationResult<BlockedWord> {
        let previous = self.require(word_id)?;
        if let Some(text) = update.word.as_mut() {
            *text = text.trim().to_string();
            let key = normalize_word(text);
            if key.is_empty() {
                return Err(ModerationError::consistency(
                    word_id.to_string(),
                    ConsistencyReason::EmptyBlockedWord,
                ));
            }
            if self.read_cache().is_duplicate(&key, Some(word_id)) {
                return Err(ModerationError::consistency(
                    text.clone(),
                    ConsistencyReason::DuplicateBlockedWord,
                ));
            }
        }

        let saved = self
            .store
            .update(word_id, update)
            .await
            .map_err(|e| ModerationError::collaborator("blocked_words.update", &e))?;
        self.apply(saved.clone(), &[previous.word.as_str(), saved.word.as_str()]);
        Ok(saved)
    }

    /// # Errors
    /// `ConsistencyViolation(UnknownBlockedWord)` or `Collaborator`.
    pub async fn remove(&self, word_id: i64) -> ModerationResult<()> {
        let previous = self.require(word_id)?;
        self.store
            .remove(word_id)
            .await
            .map_err(|e| ModerationError::collaborator("blocked_words.remove", &e))?;

        let matcher = {
            let mut cache = self.write_cache();
            let mut words = std::mem::take(&mut cache.words);
            words.retain(|w| w.word_id != word_id);
            cache.replace(words);
            cache.matcher.clone()
        };
        self.relabel(&[previous.word.as_str()], &matcher);
        info!(word_id, "blocked word removed");
        Ok(())
    }

    /// Flips `is_active` and relabels the records mentioning the word.
    ///
    /// # Errors
    /// `ConsistencyViolation(UnknownBlockedWord)` or `Collaborator`.
    pub async fn toggle(&self, word_id: i64) -> ModerationResult<BlockedWord> {
        self.require(word_id)?;
        let saved = self
            .store
            .toggle(word_id)
            .await
            .map_err(|e| ModerationError::collaborator("blocked_words.toggle", &e))?;
        self.apply(saved.clone(), &[saved.word.as_str()]);
        info!(word_id, active = saved.is_active, "blocked word toggled");
        Ok(saved)
    }

    fn require(&self, word_id: i64) -> ModerationResult<BlockedWord> {
        self.read_cache().find(word_id).cloned().ok_or_else(|| {
            ModerationError::consistency(word_id.to_string(), ConsistencyReason::UnknownBlockedWord)
        })
    }

    fn apply(&self, word: BlockedWord, affected: &[&str]) {
        let matcher = {
            let mut cache = self.write_cache();
            cache.upsert(word);
            cache.matcher.clone()
        };
        self.relabel(affected, &matcher);
    }

    fn relabel(&self, affected: &[&str], matcher: &BlockedWordMatcher) {
        let mut results = self.results.write();
        let changed: usize = affected
            .iter()
            .map(|word| results.relabel_blocked_word(word, matcher))
            .sum();
        drop(results);
        self.metrics.record_relabels(changed);
    }

    fn read_cache(&self) -> std::sync::RwLockReadGuard<'_, Cache> {
        self.cache.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_cache(&self) -> std::sync::RwLockWriteGuard<'_, Cache> {
        self.cache.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use prometheus::Registry;

    use super::*;
    use crate::domain::{Scope, Severity};
    use crate::moderation::result_set::tests::record;
    use crate::store::memory::MemoryBlockedWordStore;

    fn gateway() -> (BlockedWordSyncGateway, Arc<MemoryBlockedWordStore>, ResultSetHandle) {
        let store = Arc::new(MemoryBlockedWordStore::new());
        let results = ResultSetHandle::new();
        results.write().load(
            vec![
                record("c1", "v1", 1, true, "total SCAM, you idiot"),
                record("c2", "v1", 2, false, "nice video"),
                record("c3", "v1", 3, true, "scam again"),
            ],
            Scope::all(),
        );
        let metrics = Arc::new(Metrics::new(&Registry::new()).unwrap());
        let gateway = BlockedWordSyncGateway::new(store.clone(), results.clone(), metrics);
        (gateway, store, results)
    }

    fn new_word(word: &str) -> NewBlockedWord {
        NewBlockedWord {
            word: word.to_string(),
            category: None,
            severity: None,
        }
    }

    #[tokio::test]
    async fn add_labels_matching_records_only() {
        let (gateway, _, results) = gateway();
        let scam = gateway.add(new_word("  scam ")).await.unwrap();

        assert_eq!(scam.word, "scam");
        let set = results.read();
        assert_eq!(set.get("c1").unwrap().matched_blocked_word_id, Some(scam.word_id));
        assert!(set.get("c3").unwrap().contains_blocked_word);
        assert!(!set.get("c2").unwrap().contains_blocked_word);
    }

    #[tokio::test]
    async fn rejects_blank_and_duplicate_words_without_store_call() {
        let (gateway, store, _) = gateway();
        gateway.add(new_word("scam")).await.unwrap();

        let blank = gateway.add(new_word("   ")).await.unwrap_err();
        assert!(matches!(
            blank,
            ModerationError::ConsistencyViolation {
                reason: ConsistencyReason::EmptyBlockedWord,
                ..
            }
        ));

        let duplicate = gateway.add(new_word("SCAM")).await.unwrap_err();
        assert!(matches!(
            duplicate,
            ModerationError::ConsistencyViolation {
                reason: ConsistencyReason::DuplicateBlockedWord,
                ..
            }
        ));
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn toggle_off_and_on_restores_identical_flags() {
        let (gateway, _, results) = gateway();
        let scam = gateway.add(new_word("scam")).await.unwrap();
        gateway.add(new_word("idiot")).await.unwrap();
        let before = results.read().visible_records();

        let off = gateway.toggle(scam.word_id).await.unwrap();
        assert!(!off.is_active);
        {
            let set = results.read();
            assert!(set.get("c1").unwrap().contains_blocked_word);
            assert!(!set.get("c3").unwrap().contains_blocked_word);
        }

        gateway.toggle(scam.word_id).await.unwrap();
        assert_eq!(results.read().visible_records(), before);
    }

    #[tokio::test]
    async fn update_relabels_old_and_new_spelling() {
        let (gateway, _, results) = gateway();
        let word = gateway.add(new_word("scam")).await.unwrap();

        let updated = gateway
            .update(
                word.word_id,
                BlockedWordUpdate {
                    word: Some("video".into()),
                    severity: Some(Severity::High),
                    ..BlockedWordUpdate::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.severity, Severity::High);
        let set = results.read();
        assert!(!set.get("c1").unwrap().contains_blocked_word);
        assert!(set.get("c2").unwrap().contains_blocked_word);
    }

    #[tokio::test]
    async fn unknown_ids_are_rejected() {
        let (gateway, _, _) = gateway();
        assert!(matches!(
            gateway.toggle(42).await.unwrap_err(),
            ModerationError::ConsistencyViolation {
                reason: ConsistencyReason::UnknownBlockedWord,
                ..
            }
        ));
        assert!(gateway.remove(42).await.is_err());
    }

    #[tokio::test]
    async fn remove_clears_labels() {
        let (gateway, _, results) = gateway();
        let word = gateway.add(new_word("scam")).await.unwrap();
        gateway.remove(word.word_id).await.unwrap();

        assert!(gateway.list().is_empty());
        assert!(gateway.matcher().is_empty());
        assert!(!results.read().get("c1").unwrap().contains_blocked_word);
    }
}
