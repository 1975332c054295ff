//! In-memory view over the classified comments of the current scope.
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;

use super::matcher::{BlockedWordMatcher, mentions};
use crate::domain::{CommentId, CommentRecord, Scope};

/// Records keyed by comment id, the active scope, and the operator's selection.
///
/// The selection is always a subset of the visible ids. Visible records are
/// ordered newest `commented_at` first, ties broken by `comment_id`.
#[derive(Debug, Default)]
pub struct ResultSet {
    records: HashMap<CommentId, CommentRecord>,
    scope: Scope,
    visible: Vec<CommentId>,
    selection: HashSet<CommentId>,
    loading: bool,
}

/// Counts the control plane reports alongside the visible page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultSetStats {
    pub cached: usize,
    pub visible: usize,
    pub malicious: usize,
    pub selected: usize,
    pub loading: bool,
}

impl ResultSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the cached records that fall inside `scope` with `records`
    /// and switches to `scope`. Records cached for other scopes are kept.
    pub fn load(&mut self, records: Vec<CommentRecord>, scope: Scope) -> usize {
        self.records.retain(|_, record| !scope.matches(record));
        let loaded = records.len();
        for record in records {
            self.records.insert(record.comment_id.clone(), record);
        }
        self.scope = scope;
        self.selection.clear();
        self.loading = false;
        self.recompute();
        loaded
    }

    /// Switches the visible scope. A different scope clears the selection.
    pub fn filter(&mut self, scope: Scope) {
        if scope != self.scope {
            self.selection.clear();
        }
        self.scope = scope;
        self.recompute();
    }

    #[must_use]
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn set_loading(&mut self, loading: bool) {
        self.loading = loading;
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.loading
    }

    #[must_use]
    pub fn get(&self, comment_id: &str) -> Option<&CommentRecord> {
        self.records.get(comment_id)
    }

    #[must_use]
    pub fn is_visible(&self, comment_id: &str) -> bool {
        self.records
            .get(comment_id)
            .is_some_and(|record| self.scope.matches(record))
    }

    #[must_use]
    pub fn visible_ids(&self) -> &[CommentId] {
        &self.visible
    }

    pub fn visible(&self) -> impl Iterator<Item = &CommentRecord> {
        self.visible.iter().filter_map(|id| self.records.get(id))
    }

    #[must_use]
    pub fn visible_records(&self) -> Vec<CommentRecord> {
        self.visible().cloned().collect()
    }

    /// Number of visible records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.visible.len()
    }

    /// True when nothing is visible. Independent of [`Self::is_loading`].
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.visible.is_empty()
    }

    #[must_use]
    pub fn cached_len(&self) -> usize {
        self.records.len()
    }

    /// Adds a visible id to the selection. Invisible or unknown ids are ignored.
    pub fn select(&mut self, comment_id: &str) -> bool {
        if !self.is_visible(comment_id) {
            return false;
        }
        self.selection.insert(comment_id.to_string())
    }

    pub fn deselect(&mut self, comment_id: &str) -> bool {
        self.selection.remove(comment_id)
    }

    pub fn select_all(&mut self) -> usize {
        self.selection = self.visible.iter().cloned().collect();
        self.selection.len()
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    /// Selected ids in visible order.
    #[must_use]
    pub fn selected(&self) -> Vec<CommentId> {
        self.visible
            .iter()
            .filter(|id| self.selection.contains(*id))
            .cloned()
            .collect()
    }

    /// Drops `ids` from the cache and the selection. Unknown ids are ignored.
    pub fn remove<'a>(&mut self, ids: impl IntoIterator<Item = &'a CommentId>) -> usize {
        let mut removed = 0;
        for id in ids {
            self.selection.remove(id);
            if self.records.remove(id).is_some() {
                removed += 1;
            }
        }
        if removed > 0 {
            self.recompute();
        }
        removed
    }

    /// Drops every cached record matching `scope`, returning their ids.
    pub fn remove_matching(&mut self, scope: &Scope) -> Vec<CommentId> {
        let ids: Vec<CommentId> = self
            .records
            .values()
            .filter(|record| scope.matches(record))
            .map(|record| record.comment_id.clone())
            .collect();
        self.remove(ids.iter());
        ids
    }

    /// Recomputes the blocked-word flags of records whose text mentions
    /// `word`, against the full active set in `matcher`. Returns how many
    /// records changed.
    pub fn relabel_blocked_word(&mut self, word: &str, matcher: &BlockedWordMatcher) -> usize {
        self.records
            .values_mut()
            .filter(|record| mentions(&record.text, word))
            .map(|record| usize::from(label_blocked_word(record, matcher)))
            .sum()
    }

    /// Recomputes the blocked-word flags of every cached record.
    pub fn relabel_all(&mut self, matcher: &BlockedWordMatcher) -> usize {
        self.records
            .values_mut()
            .map(|record| usize::from(label_blocked_word(record, matcher)))
            .sum()
    }

    /// Sets the blacklist badge on every cached record written by `author_identifier`.
    pub fn apply_blacklist(&mut self, author_identifier: &str, listed: bool) -> usize {
        let mut changed = 0;
        for record in self.records.values_mut() {
            if record.author_identifier == author_identifier && record.is_blacklisted != listed {
                record.is_blacklisted = listed;
                changed += 1;
            }
        }
        changed
    }

    /// Re-derives every blacklist badge from the full listed-author set.
    pub fn sync_blacklist(&mut self, listed: &HashSet<String>) -> usize {
        let mut changed = 0;
        for record in self.records.values_mut() {
            let badge = listed.contains(&record.author_identifier);
            if record.is_blacklisted != badge {
                record.is_blacklisted = badge;
                changed += 1;
            }
        }
        changed
    }

    #[must_use]
    pub fn stats(&self) -> ResultSetStats {
        ResultSetStats {
            cached: self.records.len(),
            visible: self.visible.len(),
            malicious: self.visible().filter(|r| r.is_malicious).count(),
            selected: self.selection.len(),
            loading: self.loading,
        }
    }

    fn recompute(&mut self) {
        let mut visible: Vec<&CommentRecord> = self
            .records
            .values()
            .filter(|record| self.scope.matches(record))
            .collect();
        visible.sort_by(|a, b| {
            b.commented_at
                .cmp(&a.commented_at)
                .then_with(|| a.comment_id.cmp(&b.comment_id))
        });
        self.visible = visible.into_iter().map(|r| r.comment_id.clone()).collect();
        let visible: HashSet<&CommentId> = self.visible.iter().collect();
        self.selection.retain(|id| visible.contains(id));
    }
}

/// Sets the derived flags of a freshly crawled record.
pub fn label_record(
    record: &mut CommentRecord,
    matcher: &BlockedWordMatcher,
    listed_authors: &HashSet<String>,
) {
    label_blocked_word(record, matcher);
    record.is_blacklisted = listed_authors.contains(&record.author_identifier);
}

fn label_blocked_word(record: &mut CommentRecord, matcher: &BlockedWordMatcher) -> bool {
    let matched = matcher.first_match(&record.text);
    let changed = matched != record.matched_blocked_word_id;
    record.matched_blocked_word_id = matched;
    record.contains_blocked_word = matched.is_some();
    changed
}

/// Shared handle to the single [`ResultSet`].
///
/// Guards must be dropped before any collaborator call is awaited.
#[derive(Debug, Clone, Default)]
pub struct ResultSetHandle(Arc<RwLock<ResultSet>>);

impl ResultSetHandle {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read(&self) -> RwLockReadGuard<'_, ResultSet> {
        self.0.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, ResultSet> {
        self.0.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use chrono::{NaiveDate, TimeZone, Utc};

    use super::*;
    use crate::domain::{BlockedWord, DateRange, Platform, Severity, VerdictFilter, WordCategory};

    pub(crate) fn record(id: &str, url: &str, day: u32, malicious: bool, text: &str) -> CommentRecord {
        CommentRecord {
            comment_id: id.to_string(),
            author_name: format!("author-{id}"),
            author_identifier: format!("author-{id}"),
            platform: Platform::Youtube,
            text: text.to_string(),
            is_malicious: malicious,
            toxicity_score: if malicious { 0.9 } else { 0.1 },
            contains_blocked_word: false,
            matched_blocked_word_id: None,
            is_blacklisted: false,
            commented_at: Utc.with_ymd_and_hms(2024, 1, day, 12, 0, 0).unwrap(),
            source_url: url.to_string(),
        }
    }

    fn word(id: i64, text: &str, active: bool) -> BlockedWord {
        BlockedWord {
            word_id: id,
            word: text.to_string(),
            category: WordCategory::Profanity,
            severity: Severity::Medium,
            is_active: active,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    fn sample() -> ResultSet {
        let mut set = ResultSet::new();
        set.load(
            vec![
                record("a1", "a", 1, true, "nasty spam"),
                record("a2", "a", 2, false, "nice video"),
                record("a3", "a", 3, true, "idiot"),
                record("b1", "b", 2, true, "more spam"),
            ],
            Scope::all(),
        );
        set
    }

    #[test]
    fn visible_records_are_newest_first() {
        let set = sample();
        let ids: Vec<_> = set.visible_ids().to_vec();
        assert_eq!(ids, ["a3", "a2", "b1", "a1"]);
    }

    #[test]
    fn load_replaces_only_records_inside_the_scope() {
        let mut set = sample();
        let loaded = set.load(vec![record("a9", "a", 5, false, "fresh")], Scope::for_url("a"));

        assert_eq!(loaded, 1);
        assert_eq!(set.visible_ids(), ["a9"]);
        assert!(set.get("b1").is_some());
        assert!(set.get("a1").is_none());
        assert_eq!(set.cached_len(), 2);
    }

    #[test]
    fn narrowing_the_filter_keeps_selection_within_visible() {
        let mut set = sample();
        assert_eq!(set.select_all(), 4);

        set.filter(Scope::all().with_verdict(VerdictFilter::Malicious));

        let visible: HashSet<_> = set.visible_ids().iter().cloned().collect();
        assert!(set.selected().iter().all(|id| visible.contains(id)));
        assert_eq!(set.stats().visible, 3);
    }

    #[test]
    fn removing_from_a_large_selection_keeps_the_rest_selected() {
        let mut set = ResultSet::new();
        let ids: Vec<CommentId> = (0..5_000).map(|i| format!("c{i}")).collect();
        set.load(
            ids.iter()
                .map(|id| record(id, "bulk", 1 + u32::try_from(id.len() % 28).unwrap(), false, "t"))
                .collect(),
            Scope::for_url("bulk"),
        );
        assert_eq!(set.select_all(), 5_000);

        let dropped: Vec<CommentId> = ids.iter().step_by(2).cloned().collect();
        assert_eq!(set.remove(dropped.iter()), 2_500);

        assert_eq!(set.selected().len(), 2_500);
        assert_eq!(set.stats().visible, 2_500);
    }

    #[test]
    fn reapplying_the_same_scope_keeps_selection() {
        let mut set = sample();
        set.select("a1");
        set.filter(Scope::all());
        assert_eq!(set.selected(), ["a1"]);
    }

    #[test]
    fn selecting_invisible_ids_is_a_noop() {
        let mut set = sample();
        set.filter(Scope::for_url("b"));
        assert!(!set.select("a1"));
        assert!(!set.select("missing"));
        assert!(set.select("b1"));
        assert_eq!(set.selected(), ["b1"]);
    }

    #[test]
    fn remove_is_idempotent() {
        let mut set = sample();
        set.select("a1");
        let ids = vec!["a1".to_string(), "zz".to_string()];
        assert_eq!(set.remove(ids.iter()), 1);
        assert_eq!(set.remove(ids.iter()), 0);
        assert!(set.selected().is_empty());
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn empty_scope_is_not_loading() {
        let mut set = sample();
        let range = DateRange::new(
            NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2023, 1, 2).unwrap(),
        );
        set.filter(Scope::all().with_date_range(range));
        assert!(set.is_empty());
        assert!(!set.is_loading());

        set.set_loading(true);
        assert!(set.is_loading());
    }

    #[test]
    fn toggling_a_word_off_and_on_restores_flags() {
        let mut set = sample();
        let active = [word(1, "spam", true), word(2, "idiot", true)];
        set.relabel_all(&BlockedWordMatcher::new(&active));
        let before: Vec<_> = set.visible_records();

        let off = [word(1, "spam", false), word(2, "idiot", true)];
        let changed = set.relabel_blocked_word("spam", &BlockedWordMatcher::new(&off));
        assert_eq!(changed, 2);
        assert!(!set.get("a1").unwrap().contains_blocked_word);
        assert!(set.get("a3").unwrap().contains_blocked_word);

        set.relabel_blocked_word("spam", &BlockedWordMatcher::new(&active));
        assert_eq!(set.visible_records(), before);
    }

    #[test]
    fn blacklist_badge_follows_author() {
        let mut set = sample();
        assert_eq!(set.apply_blacklist("author-a1", true), 1);
        assert!(set.get("a1").unwrap().is_blacklisted);
        assert_eq!(set.apply_blacklist("author-a1", true), 0);

        let listed: HashSet<String> = ["author-b1".to_string()].into();
        assert_eq!(set.sync_blacklist(&listed), 2);
        assert!(!set.get("a1").unwrap().is_blacklisted);
        assert!(set.get("b1").unwrap().is_blacklisted);
    }

    #[test]
    fn remove_matching_only_touches_the_given_url() {
        let mut set = sample();
        let removed = set.remove_matching(&Scope::for_url("a"));
        assert_eq!(removed.len(), 3);
        assert_eq!(set.visible_ids(), ["b1"]);
    }
}
