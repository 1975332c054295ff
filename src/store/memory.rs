//! In-process collaborators.
//!
//! Used when `SHIELD_BACKEND_MODE=memory` and as fakes in tests. Each store can
//! be told to fail (`fail_with`) so error paths can be exercised without a backend.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use chrono::{Days, Utc};
use uuid::Uuid;

use super::{
    BatchDeleteReport, BlacklistStore, BlockedWordStore, CommentStore, CrawlAnalyzer, ProgressSink,
};
use crate::domain::{
    BlacklistEntry, BlockedWord, BlockedWordUpdate, CommentId, CommentRecord, CrawlReport,
    ModerationJobRequest, NewBlacklistEntry, NewBlockedWord, RawComment, Scope,
    blocked_word::normalize_word,
};
use crate::error::FailedId;
use crate::moderation::normalize::normalize_report;

const SAMPLE_COMMENTS: &[(&str, bool, f64)] = &[
    ("영상 잘 봤습니다", false, 0.03),
    ("정말 유익한 정보네요", false, 0.05),
    ("이런 쓰레기 영상은 왜 올리냐", true, 0.91),
    ("구독하고 갑니다", false, 0.02),
    ("꺼져라 진짜 보기 싫다", true, 0.87),
    ("다음 편도 기대할게요", false, 0.04),
];

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn check_failure(slot: &Mutex<Option<String>>) -> Result<()> {
    match lock(slot).as_ref() {
        Some(message) => Err(anyhow!(message.clone())),
        None => Ok(()),
    }
}

/// Crawler that serves canned reports per URL.
///
/// Attached to a [`MemoryCommentStore`] it saves every analyzed comment there,
/// the way the backend persists a crawl.
#[derive(Debug, Default)]
pub struct MemoryCrawlAnalyzer {
    fixtures: Mutex<HashMap<String, CrawlReport>>,
    store: Option<Arc<MemoryCommentStore>>,
    sample_size: Option<usize>,
    failure: Mutex<Option<String>>,
    latency: Mutex<Option<Duration>>,
    calls: AtomicUsize,
}

impl MemoryCrawlAnalyzer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn persisting_to(store: Arc<MemoryCommentStore>) -> Self {
        Self {
            store: Some(store),
            ..Self::default()
        }
    }

    /// URLs without a registered report get `count` generated comments
    /// spread over the requested window.
    #[must_use]
    pub fn with_sample_comments(mut self, count: usize) -> Self {
        self.sample_size = Some(count);
        self
    }

    pub fn insert(&self, url: impl Into<String>, report: CrawlReport) {
        lock(&self.fixtures).insert(url.into(), report);
    }

    /// Makes every subsequent call fail with `message`; `None` clears it.
    pub fn fail_with(&self, message: Option<&str>) {
        *lock(&self.failure) = message.map(str::to_string);
    }

    pub fn set_latency(&self, latency: Option<Duration>) {
        *lock(&self.latency) = latency;
    }

    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CrawlAnalyzer for MemoryCrawlAnalyzer {
    async fn crawl_and_analyze(
        &self,
        request: &ModerationJobRequest,
        progress: &dyn ProgressSink,
    ) -> Result<CrawlReport> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        progress.report("collecting");
        let latency = *lock(&self.latency);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        check_failure(&self.failure)?;
        progress.report("scoring");
        let fixture = lock(&self.fixtures).get(request.target_url.trim()).cloned();
        let mut report = match (fixture, self.sample_size) {
            (Some(report), _) => report,
            (None, Some(count)) => sample_report(request, count),
            (None, None) => CrawlReport::default(),
        };

        if let Some(store) = &self.store {
            for raw in &mut report.records {
                if raw.external_id.as_deref().is_none_or(|id| id.trim().is_empty()) {
                    raw.external_id = Some(Uuid::new_v4().to_string());
                }
            }
            let batch = normalize_report(report.clone(), request, Utc::now());
            store.insert_all(batch.records);
        }
        Ok(report)
    }
}

fn sample_report(request: &ModerationJobRequest, count: usize) -> CrawlReport {
    let url = request.target_url.trim();
    let start = request.start_date.unwrap_or_else(|| Utc::now().date_naive());
    let span = request
        .end_date
        .and_then(|end| u64::try_from((end - start).num_days()).ok())
        .map_or(1, |days| days + 1);

    let records: Vec<RawComment> = (0..count)
        .map(|i| {
            let (text, malicious, score) = SAMPLE_COMMENTS[i % SAMPLE_COMMENTS.len()];
            let offset = u64::try_from(i).unwrap_or(0) % span;
            let day = start.checked_add_days(Days::new(offset)).unwrap_or(start);
            RawComment {
                external_id: Some(format!("{url}#{i}")),
                author_name: Some(format!("viewer-{}", i % 7)),
                text: Some(text.to_string()),
                is_malicious: malicious,
                toxicity_score: Some(score),
                publish_date: Some(format!("{day}T09:00:00Z")),
                ..RawComment::default()
            }
        })
        .collect();
    let total = u32::try_from(records.len()).unwrap_or(u32::MAX);
    CrawlReport {
        total_crawled: total,
        analyzed_count: total,
        records,
    }
}

/// Comment table keyed by comment id.
#[derive(Debug, Default)]
pub struct MemoryCommentStore {
    comments: Mutex<BTreeMap<CommentId, CommentRecord>>,
    rejected: Mutex<HashSet<CommentId>>,
    failure: Mutex<Option<String>>,
    batch_calls: AtomicUsize,
}

impl MemoryCommentStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_all(&self, records: impl IntoIterator<Item = CommentRecord>) {
        let mut comments = lock(&self.comments);
        for record in records {
            comments.insert(record.comment_id.clone(), record);
        }
    }

    /// Ids the store will refuse to delete, to simulate partial batch failures.
    pub fn reject_deletes_of(&self, ids: impl IntoIterator<Item = CommentId>) {
        lock(&self.rejected).extend(ids);
    }

    pub fn fail_with(&self, message: Option<&str>) {
        *lock(&self.failure) = message.map(str::to_string);
    }

    #[must_use]
    pub fn contains(&self, comment_id: &str) -> bool {
        lock(&self.comments).contains_key(comment_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.comments).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn batch_calls(&self) -> usize {
        self.batch_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CommentStore for MemoryCommentStore {
    async fn list(&self, scope: &Scope) -> Result<Vec<CommentRecord>> {
        check_failure(&self.failure)?;
        Ok(lock(&self.comments)
            .values()
            .filter(|record| scope.matches(record))
            .cloned()
            .collect())
    }

    async fn delete(&self, comment_id: &str) -> Result<()> {
        check_failure(&self.failure)?;
        if lock(&self.rejected).contains(comment_id) {
            bail!("comment {comment_id} cannot be deleted");
        }
        lock(&self.comments).remove(comment_id);
        Ok(())
    }

    async fn delete_batch(&self, comment_ids: &[CommentId]) -> Result<BatchDeleteReport> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        check_failure(&self.failure)?;
        let rejected = lock(&self.rejected).clone();
        let mut comments = lock(&self.comments);
        let mut report = BatchDeleteReport::default();
        for id in comment_ids {
            if rejected.contains(id) {
                report.failed.push(FailedId {
                    comment_id: id.clone(),
                    reason: "rejected by comment store".to_string(),
                });
            } else {
                comments.remove(id);
                report.deleted.push(id.clone());
            }
        }
        Ok(report)
    }

    async fn delete_all(&self, scope: &Scope) -> Result<u64> {
        check_failure(&self.failure)?;
        let mut comments = lock(&self.comments);
        let before = comments.len();
        comments.retain(|_, record| !scope.matches(record));
        Ok((before - comments.len()) as u64)
    }
}

#[derive(Debug, Default)]
pub struct MemoryBlacklistStore {
    entries: Mutex<BTreeMap<i64, BlacklistEntry>>,
    next_id: Mutex<i64>,
    failure: Mutex<Option<String>>,
    add_calls: AtomicUsize,
}

impl MemoryBlacklistStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_with(&self, message: Option<&str>) {
        *lock(&self.failure) = message.map(str::to_string);
    }

    #[must_use]
    pub fn add_calls(&self) -> usize {
        self.add_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BlacklistStore for MemoryBlacklistStore {
    async fn list(&self) -> Result<Vec<BlacklistEntry>> {
        check_failure(&self.failure)?;
        Ok(lock(&self.entries).values().cloned().collect())
    }

    async fn add(&self, entry: NewBlacklistEntry) -> Result<BlacklistEntry> {
        self.add_calls.fetch_add(1, Ordering::SeqCst);
        check_failure(&self.failure)?;
        let mut entries = lock(&self.entries);
        let now = Utc::now();

        if let Some(existing) = entries
            .values_mut()
            .find(|e| e.author_identifier == entry.author_identifier)
        {
            existing.violation_count = existing.violation_count.saturating_add(1);
            existing.updated_at = Some(now);
            if !entry.reason.is_empty() {
                existing.reason = entry.reason;
            }
            if entry.comment_text.is_some() {
                existing.comment_text = entry.comment_text;
            }
            return Ok(existing.clone());
        }

        let blacklist_id = {
            let mut next_id = lock(&self.next_id);
            *next_id += 1;
            *next_id
        };
        let created = BlacklistEntry {
            blacklist_id,
            author_name: entry.author_name,
            author_identifier: entry.author_identifier,
            platform: entry.platform,
            reason: entry.reason,
            violation_count: 1,
            comment_text: entry.comment_text,
            created_at: now,
            updated_at: None,
        };
        entries.insert(blacklist_id, created.clone());
        Ok(created)
    }

    async fn remove(&self, blacklist_id: i64) -> Result<()> {
        check_failure(&self.failure)?;
        lock(&self.entries)
            .remove(&blacklist_id)
            .map(|_| ())
            .ok_or_else(|| anyhow!("blacklist entry {blacklist_id} not found"))
    }
}

#[derive(Debug, Default)]
pub struct MemoryBlockedWordStore {
    words: Mutex<BTreeMap<i64, BlockedWord>>,
    next_id: Mutex<i64>,
    failure: Mutex<Option<String>>,
}

impl MemoryBlockedWordStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_with(&self, message: Option<&str>) {
        *lock(&self.failure) = message.map(str::to_string);
    }
}

#[async_trait]
impl BlockedWordStore for MemoryBlockedWordStore {
    async fn list(&self) -> Result<Vec<BlockedWord>> {
        check_failure(&self.failure)?;
        Ok(lock(&self.words).values().cloned().collect())
    }

    async fn add(&self, word: NewBlockedWord) -> Result<BlockedWord> {
        check_failure(&self.failure)?;
        let trimmed = word.word.trim().to_string();
        let key = normalize_word(&trimmed);
        let mut words = lock(&self.words);
        if words.values().any(|w| normalize_word(&w.word) == key) {
            bail!("이미 등록된 단어입니다: {trimmed}");
        }
        let word_id = {
            let mut next_id = lock(&self.next_id);
            *next_id += 1;
            *next_id
        };
        let created = BlockedWord {
            word_id,
            word: trimmed,
            category: word.category.unwrap_or_default(),
            severity: word.severity.unwrap_or_default(),
            is_active: true,
            created_at: Utc::now(),
            updated_at: None,
        };
        words.insert(word_id, created.clone());
        Ok(created)
    }

    async fn update(&self, word_id: i64, update: BlockedWordUpdate) -> Result<BlockedWord> {
        check_failure(&self.failure)?;
        let mut words = lock(&self.words);
        let word = words
            .get_mut(&word_id)
            .ok_or_else(|| anyhow!("차단 단어를 찾을 수 없습니다: {word_id}"))?;
        if let Some(text) = update.word {
            word.word = text.trim().to_string();
        }
        if let Some(category) = update.category {
            word.category = category;
        }
        if let Some(severity) = update.severity {
            word.severity = severity;
        }
        word.updated_at = Some(Utc::now());
        Ok(word.clone())
    }

    async fn remove(&self, word_id: i64) -> Result<()> {
        check_failure(&self.failure)?;
        lock(&self.words)
            .remove(&word_id)
            .map(|_| ())
            .ok_or_else(|| anyhow!("차단 단어를 찾을 수 없습니다: {word_id}"))
    }

    async fn toggle(&self, word_id: i64) -> Result<BlockedWord> {
        check_failure(&self.failure)?;
        let mut words = lock(&self.words);
        let word = words
            .get_mut(&word_id)
            .ok_or_else(|| anyhow!("차단 단어를 찾을 수 없습니다: {word_id}"))?;
        word.is_active = !word.is_active;
        word.updated_at = Some(Utc::now());
        Ok(word.clone())
    }
}
