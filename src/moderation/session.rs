//! Operator-facing façade over the orchestrator components.
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{info, warn};

use super::controller::{AnalysisJobController, JobSink};
use super::result_set::{ResultSetHandle, ResultSetStats, label_record};
use super::triage::{BulkTriageService, CsvExport, DeleteOutcome};
use crate::domain::{
    AnalysisJob, BlacklistEntry, CommentId, CommentRecord, ErrorInfo, JobId,
    ModerationJobRequest, Scope,
};
use crate::error::{ModerationError, ModerationResult, RejectionReason};
use crate::gateway::{BlacklistSyncGateway, BlockedWordSyncGateway};
use crate::observability::Metrics;
use crate::store::{BlacklistStore, BlockedWordStore, CommentStore, CrawlAnalyzer};

/// The four external services a session talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub analyzer: Arc<dyn CrawlAnalyzer>,
    pub comments: Arc<dyn CommentStore>,
    pub blacklist: Arc<dyn BlacklistStore>,
    pub blocked_words: Arc<dyn BlockedWordStore>,
}

/// Selection edit requested by the operator.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum SelectionChange {
    Select { ids: Vec<CommentId> },
    Deselect { ids: Vec<CommentId> },
    SelectAll,
    Clear,
}

/// Visible records plus counts, newest first.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentPage {
    pub scope: Scope,
    pub stats: ResultSetStats,
    pub selected: Vec<CommentId>,
    pub records: Vec<CommentRecord>,
}

/// Folds job results into the result set with derived flags applied.
struct ResultFolder {
    results: ResultSetHandle,
    blacklist: Arc<BlacklistSyncGateway>,
    blocked_words: Arc<BlockedWordSyncGateway>,
    metrics: Arc<Metrics>,
}

impl ResultFolder {
    fn fold(&self, mut records: Vec<CommentRecord>, scope: Scope) -> usize {
        let matcher = self.blocked_words.matcher();
        let listed = self.blacklist.listed_authors();
        for record in &mut records {
            label_record(record, &matcher, &listed);
        }
        let mut results = self.results.write();
        let loaded = results.load(records, scope);
        self.metrics.record_loaded(loaded, results.cached_len());
        loaded
    }
}

impl JobSink for ResultFolder {
    fn on_submitted(&self, _job: &AnalysisJob) {
        self.results.write().set_loading(true);
    }

    fn on_success(&self, request: &ModerationJobRequest, records: Vec<CommentRecord>) {
        let loaded = self.fold(records, job_scope(request));
        info!(target_url = %request.target_url, loaded, "job results loaded");
    }

    fn on_failure(&self, _request: &ModerationJobRequest, _error: &ErrorInfo) {
        self.results.write().set_loading(false);
    }
}

/// Scope a job's results are loaded under: its URL, every date and verdict.
///
/// The requested window bounds the crawl, not the view. Comments with a
/// missing or relative publish date resolve against the submission time and
/// would otherwise fall outside a past window.
#[must_use]
pub fn job_scope(request: &ModerationJobRequest) -> Scope {
    Scope::for_url(request.target_url.trim())
}

/// One operator's moderation workspace: the job controller, the result set,
/// both sync gateways and the triage service.
pub struct ModerationSession {
    controller: AnalysisJobController,
    results: ResultSetHandle,
    comments: Arc<dyn CommentStore>,
    blacklist: Arc<BlacklistSyncGateway>,
    blocked_words: Arc<BlockedWordSyncGateway>,
    triage: BulkTriageService,
    folder: Arc<ResultFolder>,
    metrics: Arc<Metrics>,
}

impl ModerationSession {
    pub fn new(collaborators: Collaborators, metrics: Arc<Metrics>, crawl_timeout: Duration) -> Self {
        let results = ResultSetHandle::new();
        let blacklist = Arc::new(BlacklistSyncGateway::new(
            collaborators.blacklist,
            results.clone(),
            Arc::clone(&metrics),
        ));
        let blocked_words = Arc::new(BlockedWordSyncGateway::new(
            collaborators.blocked_words,
            results.clone(),
            Arc::clone(&metrics),
        ));
        let triage = BulkTriageService::new(
            Arc::clone(&collaborators.comments),
            Arc::clone(&blacklist),
            results.clone(),
            Arc::clone(&metrics),
        );
        let folder = Arc::new(ResultFolder {
            results: results.clone(),
            blacklist: Arc::clone(&blacklist),
            blocked_words: Arc::clone(&blocked_words),
            metrics: Arc::clone(&metrics),
        });
        let controller = AnalysisJobController::with_sink(
            collaborators.analyzer,
            Arc::clone(&metrics),
            crawl_timeout,
            Arc::clone(&folder) as Arc<dyn JobSink>,
        );

        Self {
            controller,
            results,
            comments: collaborators.comments,
            blacklist,
            blocked_words,
            triage,
            folder,
            metrics,
        }
    }

    /// Loads both authority lists. Called once at startup.
    ///
    /// # Errors
    /// `Collaborator` when either list cannot be fetched.
    pub async fn sync_lists(&self) -> ModerationResult<()> {
        self.blacklist.refresh().await?;
        self.blocked_words.refresh().await?;
        Ok(())
    }

    // jobs

    /// # Errors
    /// See [`AnalysisJobController::submit`].
    pub fn submit(&self, request: ModerationJobRequest) -> ModerationResult<AnalysisJob> {
        self.controller.submit(request)
    }

    /// # Errors
    /// See [`AnalysisJobController::retry`].
    pub fn retry(&self) -> ModerationResult<AnalysisJob> {
        self.controller.retry()
    }

    /// # Errors
    /// See [`AnalysisJobController::cancel`].
    pub fn cancel(&self) -> ModerationResult<JobId> {
        self.controller.cancel()
    }

    #[must_use]
    pub fn current_job(&self) -> Option<AnalysisJob> {
        self.controller.snapshot()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<AnalysisJob>> {
        self.controller.subscribe()
    }

    /// Waits for job `id` to settle. Its records are loaded by then.
    pub async fn wait_settled(&self, id: JobId) -> Option<AnalysisJob> {
        self.controller.wait_settled(id).await
    }

    // result set

    #[must_use]
    pub fn results(&self) -> &ResultSetHandle {
        &self.results
    }

    #[must_use]
    pub fn page(&self) -> CommentPage {
        let results = self.results.read();
        CommentPage {
            scope: results.scope().clone(),
            stats: results.stats(),
            selected: results.selected(),
            records: results.visible_records(),
        }
    }

    pub fn filter(&self, scope: Scope) -> CommentPage {
        self.results.write().filter(scope);
        self.page()
    }

    pub fn change_selection(&self, change: SelectionChange) -> Vec<CommentId> {
        let mut results = self.results.write();
        match change {
            SelectionChange::Select { ids } => {
                for id in &ids {
                    results.select(id);
                }
            }
            SelectionChange::Deselect { ids } => {
                for id in &ids {
                    results.deselect(id);
                }
            }
            SelectionChange::SelectAll => {
                results.select_all();
            }
            SelectionChange::Clear => results.clear_selection(),
        }
        results.selected()
    }

    /// Loads previously stored comments for `scope` from the comment store.
    ///
    /// # Errors
    /// `Collaborator` when the store cannot be listed; the result set is unchanged
    /// apart from the loading flag being cleared.
    pub async fn load_history(&self, scope: Scope) -> ModerationResult<usize> {
        self.results.write().set_loading(true);
        let records = match self.comments.list(&scope).await {
            Ok(records) => records,
            Err(error) => {
                self.results.write().set_loading(false);
                warn!(error = %error, "loading stored comments failed");
                return Err(ModerationError::collaborator("comments.list", &error));
            }
        };
        Ok(self.folder.fold(records, scope))
    }

    /// Deletes every stored comment for `url` and drops them from the result set.
    ///
    /// # Errors
    /// `Validation(EmptyOrInvalidUrl)` for a blank url, `Collaborator` when the
    /// store refuses; nothing is dropped locally in either case.
    pub async fn discard_history(&self, url: &str) -> ModerationResult<u64> {
        if url.trim().is_empty() {
            return Err(ModerationError::Validation(
                RejectionReason::EmptyOrInvalidUrl,
            ));
        }
        let scope = Scope::for_url(url.trim());
        let removed = self
            .comments
            .delete_all(&scope)
            .await
            .map_err(|e| ModerationError::collaborator("comments.delete_all", &e))?;
        let (dropped, cached) = {
            let mut results = self.results.write();
            let dropped = results.remove_matching(&scope).len();
            (dropped, results.cached_len())
        };
        self.metrics.record_deleted(dropped, cached);
        info!(url = %url.trim(), removed, dropped, "comment history discarded");
        Ok(removed)
    }

    // triage

    /// # Errors
    /// See [`BulkTriageService::delete_selected`].
    pub async fn delete_selected(&self) -> ModerationResult<DeleteOutcome> {
        self.triage.delete_selected().await
    }

    /// # Errors
    /// See [`BulkTriageService::delete_all_in_scope`].
    pub async fn delete_all_in_scope(&self) -> ModerationResult<DeleteOutcome> {
        self.triage.delete_all_in_scope().await
    }

    /// # Errors
    /// See [`BulkTriageService::delete_one`].
    pub async fn delete_one(&self, comment_id: &str) -> ModerationResult<DeleteOutcome> {
        self.triage.delete_one(comment_id).await
    }

    /// # Errors
    /// See [`BulkTriageService::export_csv`].
    pub async fn export_csv(&self) -> ModerationResult<CsvExport> {
        self.triage.export_csv().await
    }

    /// # Errors
    /// See [`BulkTriageService::escalate_to_blacklist`].
    pub async fn escalate(
        &self,
        comment_id: &str,
        reason: Option<String>,
    ) -> ModerationResult<BlacklistEntry> {
        self.triage.escalate_to_blacklist(comment_id, reason).await
    }

    // authority lists

    #[must_use]
    pub fn blacklist(&self) -> &BlacklistSyncGateway {
        &self.blacklist
    }

    #[must_use]
    pub fn blocked_words(&self) -> &BlockedWordSyncGateway {
        &self.blocked_words
    }
}
