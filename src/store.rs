//! Collaborator contracts consumed by the orchestrator.
//!
//! Each trait covers one externally-owned service. The transport lives in
//! [`crate::clients`]; [`memory`] provides in-process implementations for
//! local runs and tests.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{
    BlacklistEntry, BlockedWord, BlockedWordUpdate, CommentId, CommentRecord, CrawlReport,
    ModerationJobRequest, NewBlacklistEntry, NewBlockedWord, Scope,
};
use crate::error::FailedId;

/// Receives advisory progress text from a running job.
pub trait ProgressSink: Send + Sync {
    fn report(&self, stage: &str);
}

/// Crawl + toxicity analysis service.
#[async_trait]
pub trait CrawlAnalyzer: Send + Sync {
    /// Crawls `request.target_url` and returns one scored record per comment.
    async fn crawl_and_analyze(
        &self,
        request: &ModerationJobRequest,
        progress: &dyn ProgressSink,
    ) -> Result<CrawlReport>;
}

/// Outcome of a batch delete. Ids absent from both lists were not attempted.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchDeleteReport {
    pub deleted: Vec<CommentId>,
    #[serde(default)]
    pub failed: Vec<FailedId>,
}

#[async_trait]
pub trait CommentStore: Send + Sync {
    async fn list(&self, scope: &Scope) -> Result<Vec<CommentRecord>>;

    async fn delete(&self, comment_id: &str) -> Result<()>;

    async fn delete_batch(&self, comment_ids: &[CommentId]) -> Result<BatchDeleteReport>;

    /// Deletes every stored comment matching `scope`; returns the number removed.
    async fn delete_all(&self, scope: &Scope) -> Result<u64>;
}

#[async_trait]
pub trait BlacklistStore: Send + Sync {
    async fn list(&self) -> Result<Vec<BlacklistEntry>>;

    /// Adds an author, or bumps `violation_count` when the author is already listed.
    async fn add(&self, entry: NewBlacklistEntry) -> Result<BlacklistEntry>;

    async fn remove(&self, blacklist_id: i64) -> Result<()>;
}

#[async_trait]
pub trait BlockedWordStore: Send + Sync {
    async fn list(&self) -> Result<Vec<BlockedWord>>;

    async fn add(&self, word: NewBlockedWord) -> Result<BlockedWord>;

    async fn update(&self, word_id: i64, update: BlockedWordUpdate) -> Result<BlockedWord>;

    async fn remove(&self, word_id: i64) -> Result<()>;

    /// Flips `is_active` and returns the updated word.
    async fn toggle(&self, word_id: i64) -> Result<BlockedWord>;
}
