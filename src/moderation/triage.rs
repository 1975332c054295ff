//! Bulk operations over the visible records.
//!
//! Every operation validates against the result set first, then calls the
//! collaborator with no lock held, then applies only what the collaborator
//! confirmed.
use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use super::csv_export::{export_file_name, render_csv};
use super::result_set::ResultSetHandle;
use crate::domain::{BlacklistEntry, CommentId};
use crate::error::{ConsistencyReason, FailedId, ModerationError, ModerationResult};
use crate::gateway::BlacklistSyncGateway;
use crate::observability::Metrics;
use crate::store::CommentStore;

const NOT_CONFIRMED: &str = "not confirmed by comment store";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteOutcome {
    pub deleted: Vec<CommentId>,
}

/// Rendered export ready to be served as a download.
#[derive(Debug, Clone)]
pub struct CsvExport {
    pub file_name: String,
    pub rows: usize,
    pub bytes: Vec<u8>,
}

pub struct BulkTriageService {
    comments: Arc<dyn CommentStore>,
    blacklist: Arc<BlacklistSyncGateway>,
    results: ResultSetHandle,
    metrics: Arc<Metrics>,
}

impl BulkTriageService {
    pub fn new(
        comments: Arc<dyn CommentStore>,
        blacklist: Arc<BlacklistSyncGateway>,
        results: ResultSetHandle,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            comments,
            blacklist,
            results,
            metrics,
        }
    }

    /// Deletes the selected records in one batch call.
    ///
    /// # Errors
    /// `ConsistencyViolation(EmptySelection)` with nothing selected,
    /// `Collaborator` when the batch call fails (nothing removed), and
    /// `PartialBatchFailure` when only some ids were confirmed (those are
    /// removed, the rest stay).
    pub async fn delete_selected(&self) -> ModerationResult<DeleteOutcome> {
        let ids = self.results.read().selected();
        if ids.is_empty() {
            return Err(ModerationError::consistency(
                "selection",
                ConsistencyReason::EmptySelection,
            ));
        }
        self.delete_batch(ids).await
    }

    /// Deletes exactly the visible records, never anything outside the scope.
    ///
    /// # Errors
    /// Same as [`Self::delete_selected`]; an empty scope is `EmptySelection`.
    pub async fn delete_all_in_scope(&self) -> ModerationResult<DeleteOutcome> {
        let ids = self.results.read().visible_ids().to_vec();
        if ids.is_empty() {
            return Err(ModerationError::consistency(
                "scope",
                ConsistencyReason::EmptySelection,
            ));
        }
        self.delete_batch(ids).await
    }

    /// # Errors
    /// `ConsistencyViolation(UnknownComment)` for an id that is not loaded,
    /// `Collaborator` when the store refuses the delete.
    pub async fn delete_one(&self, comment_id: &str) -> ModerationResult<DeleteOutcome> {
        if self.results.read().get(comment_id).is_none() {
            return Err(ModerationError::consistency(
                comment_id,
                ConsistencyReason::UnknownComment,
            ));
        }
        if let Err(error) = self.comments.delete(comment_id).await {
            self.metrics.triage_failures.inc();
            warn!(comment_id, error = %error, "comment delete failed");
            return Err(ModerationError::collaborator("comments.delete", &error));
        }

        let deleted = vec![comment_id.to_string()];
        let cached = {
            let mut results = self.results.write();
            results.remove(deleted.iter());
            results.cached_len()
        };
        self.metrics.record_deleted(1, cached);
        info!(comment_id, "comment deleted");
        Ok(DeleteOutcome { deleted })
    }

    /// Renders the visible records as CSV on the blocking pool.
    ///
    /// # Errors
    /// `Collaborator` if rendering fails; the result set is never touched.
    pub async fn export_csv(&self) -> ModerationResult<CsvExport> {
        let records = self.results.read().visible_records();
        let rows = records.len();
        let bytes = tokio::task::spawn_blocking(move || render_csv(&records))
            .await
            .map_err(|e| ModerationError::collaborator("csv.render", &anyhow::Error::from(e)))?
            .map_err(|e| ModerationError::collaborator("csv.render", &anyhow::Error::from(e)))?;
        info!(rows, bytes = bytes.len(), "comments exported");
        Ok(CsvExport {
            file_name: export_file_name(Utc::now()),
            rows,
            bytes,
        })
    }

    /// Blacklists the author of a malicious, not yet blacklisted record.
    ///
    /// # Errors
    /// `ConsistencyViolation` (`UnknownComment`, `NotMalicious`,
    /// `AlreadyBlacklisted`) before any gateway call, `Collaborator` when
    /// the gateway fails.
    pub async fn escalate_to_blacklist(
        &self,
        comment_id: &str,
        reason: Option<String>,
    ) -> ModerationResult<BlacklistEntry> {
        let record = self.results.read().get(comment_id).cloned();
        let Some(record) = record else {
            return Err(ModerationError::consistency(
                comment_id,
                ConsistencyReason::UnknownComment,
            ));
        };
        if !record.is_malicious {
            return Err(ModerationError::consistency(
                comment_id,
                ConsistencyReason::NotMalicious,
            ));
        }
        if record.is_blacklisted || self.blacklist.contains(&record.author_identifier) {
            return Err(ModerationError::consistency(
                record.author_identifier,
                ConsistencyReason::AlreadyBlacklisted,
            ));
        }

        match self.blacklist.escalate(&record, reason).await {
            Ok(entry) => {
                self.metrics.escalations.inc();
                Ok(entry)
            }
            Err(error) => {
                self.metrics.triage_failures.inc();
                Err(error)
            }
        }
    }

    async fn delete_batch(&self, ids: Vec<CommentId>) -> ModerationResult<DeleteOutcome> {
        let report = match self.comments.delete_batch(&ids).await {
            Ok(report) => report,
            Err(error) => {
                self.metrics.triage_failures.inc();
                warn!(requested = ids.len(), error = %error, "batch delete failed");
                return Err(ModerationError::collaborator("comments.delete_batch", &error));
            }
        };

        let requested: HashSet<&CommentId> = ids.iter().collect();
        let deleted: Vec<CommentId> = report
            .deleted
            .into_iter()
            .filter(|id| requested.contains(id))
            .collect();
        let confirmed: HashSet<&CommentId> = deleted.iter().collect();
        let mut failed = report.failed;
        let reported: HashSet<CommentId> = failed.iter().map(|f| f.comment_id.clone()).collect();
        failed.extend(
            ids.iter()
                .filter(|id| !confirmed.contains(id) && !reported.contains(*id))
                .map(|id| FailedId {
                    comment_id: id.clone(),
                    reason: NOT_CONFIRMED.to_string(),
                }),
        );

        let cached = {
            let mut results = self.results.write();
            results.remove(deleted.iter());
            results.cached_len()
        };
        self.metrics.record_deleted(deleted.len(), cached);

        if failed.is_empty() {
            info!(deleted = deleted.len(), "batch delete confirmed");
            Ok(DeleteOutcome { deleted })
        } else {
            self.metrics.triage_failures.inc();
            warn!(
                deleted = deleted.len(),
                failed = failed.len(),
                "batch delete partially failed"
            );
            Err(ModerationError::PartialBatchFailure {
                succeeded: deleted,
                failed,
            })
        }
    }
}
