use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::comment::RawComment;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Analysis request as typed by the operator. Dates are calendar days,
/// `end_date` inclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModerationJobRequest {
    pub target_url: String,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
}

impl ModerationJobRequest {
    #[must_use]
    pub fn new(target_url: impl Into<String>, start_date: NaiveDate, end_date: NaiveDate) -> Self {
        Self {
            target_url: target_url.into(),
            start_date: Some(start_date),
            end_date: Some(end_date),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobOutcome {
    Success,
    Failed,
}

/// Lifecycle of a job. `Settled(_)` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", content = "outcome", rename_all = "lowercase")]
pub enum JobState {
    Idle,
    Submitting,
    Running,
    Settled(JobOutcome),
}

impl JobState {
    /// True while a job occupies the controller's single slot.
    #[must_use]
    pub fn is_in_flight(self) -> bool {
        matches!(self, JobState::Submitting | JobState::Running)
    }

    #[must_use]
    pub fn is_settled(self) -> bool {
        matches!(self, JobState::Settled(_))
    }
}

impl AsRef<str> for JobState {
    fn as_ref(&self) -> &str {
        match self {
            JobState::Idle => "idle",
            JobState::Submitting => "submitting",
            JobState::Running => "running",
            JobState::Settled(JobOutcome::Success) => "succeeded",
            JobState::Settled(JobOutcome::Failed) => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSummary {
    pub total_crawled: u32,
    pub analyzed_count: u32,
    pub skipped_count: u32,
}

/// Failure surfaced to the operator; `message` is the upstream text verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
}

impl ErrorInfo {
    pub const COLLABORATOR: &'static str = "collaborator";
    pub const CANCELLED: &'static str = "cancelled";
    pub const ABORTED: &'static str = "aborted";

    #[must_use]
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

/// Snapshot of one crawl+analyze cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisJob {
    pub id: JobId,
    pub request: ModerationJobRequest,
    pub state: JobState,
    pub submitted_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
    pub summary: Option<JobSummary>,
    pub error: Option<ErrorInfo>,
    /// Advisory progress text; has no effect on correctness.
    pub progress: Option<String>,
}

impl AnalysisJob {
    #[must_use]
    pub fn submitted(request: ModerationJobRequest) -> Self {
        Self {
            id: JobId::new(),
            request,
            state: JobState::Submitting,
            submitted_at: Utc::now(),
            settled_at: None,
            summary: None,
            error: None,
            progress: None,
        }
    }
}

/// Output of the crawl/analyze collaborator: one scored record per crawled comment.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlReport {
    #[serde(default)]
    pub total_crawled: u32,
    #[serde(default)]
    pub analyzed_count: u32,
    #[serde(default, alias = "comments", alias = "results")]
    pub records: Vec<RawComment>,
}
