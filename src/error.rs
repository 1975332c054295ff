use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{CommentId, JobId};

/// Why a job request was rejected. Variants are listed in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectionReason {
    EmptyOrInvalidUrl,
    MissingDateRange,
    InvertedRange,
    RangeTooLong,
}

impl RejectionReason {
    /// Request field the operator has to fix.
    #[must_use]
    pub fn field(self) -> &'static str {
        match self {
            RejectionReason::EmptyOrInvalidUrl => "targetUrl",
            RejectionReason::MissingDateRange => "startDate/endDate",
            RejectionReason::InvertedRange => "startDate",
            RejectionReason::RangeTooLong => "endDate",
        }
    }
}

/// Why a triage or gateway operation was refused before any collaborator call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConsistencyReason {
    NotMalicious,
    AlreadyBlacklisted,
    EmptySelection,
    UnknownComment,
    UnknownBlockedWord,
    DuplicateBlockedWord,
    EmptyBlockedWord,
    EmptyAuthor,
    NoJobInFlight,
    NoFailedJob,
}

/// Ids a bulk operation could not apply, with the collaborator's reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedId {
    pub comment_id: CommentId,
    pub reason: String,
}

#[derive(Debug, Error)]
pub enum ModerationError {
    #[error("request rejected ({:?}) on field {}", .0, .0.field())]
    Validation(RejectionReason),

    #[error("job {running_job} is still in flight")]
    InFlightConflict { running_job: JobId },

    #[error("{operation} failed: {message}")]
    Collaborator {
        operation: &'static str,
        message: String,
    },

    #[error("{} of {} ids failed", .failed.len(), .failed.len() + .succeeded.len())]
    PartialBatchFailure {
        succeeded: Vec<CommentId>,
        failed: Vec<FailedId>,
    },

    #[error("{reason:?} for {subject}")]
    ConsistencyViolation {
        subject: String,
        reason: ConsistencyReason,
    },
}

impl ModerationError {
    pub(crate) fn collaborator(operation: &'static str, error: &anyhow::Error) -> Self {
        Self::Collaborator {
            operation,
            message: format!("{error:#}"),
        }
    }

    pub(crate) fn consistency(subject: impl Into<String>, reason: ConsistencyReason) -> Self {
        Self::ConsistencyViolation {
            subject: subject.into(),
            reason,
        }
    }
}

pub type ModerationResult<T> = Result<T, ModerationError>;
