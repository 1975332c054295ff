//! Domain types shared by the orchestrator, the gateways and the control plane.

pub mod blacklist;
pub mod blocked_word;
pub mod comment;
pub mod job;
pub mod scope;

pub use blacklist::{BlacklistEntry, NewBlacklistEntry};
pub use blocked_word::{BlockedWord, BlockedWordUpdate, NewBlockedWord, Severity, WordCategory};
pub use comment::{CommentId, CommentRecord, Platform, RawComment, Verdict};
pub use job::{
    AnalysisJob, CrawlReport, ErrorInfo, JobId, JobOutcome, JobState, JobSummary,
    ModerationJobRequest,
};
pub use scope::{DateRange, Scope, VerdictFilter};
