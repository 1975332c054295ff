//! Job orchestration and result-set triage.

pub mod controller;
pub mod csv_export;
pub mod matcher;
pub mod normalize;
pub mod result_set;
pub mod session;
pub mod triage;
pub mod validator;

pub use controller::AnalysisJobController;
pub use matcher::BlockedWordMatcher;
pub use result_set::{ResultSet, ResultSetHandle, ResultSetStats};
pub use session::ModerationSession;
pub use triage::{BulkTriageService, CsvExport, DeleteOutcome};
pub use validator::JobRequestValidator;
