//! Pre-submission checks for moderation job requests.
use chrono::{Duration, NaiveDate};
use reqwest::Url;

use crate::domain::ModerationJobRequest;
use crate::error::RejectionReason;

/// Longest analysis window, in days between start and end date.
pub const MAX_RANGE_DAYS: i64 = 7;

/// Stateless validator. Rules run in a fixed order and the first failure is reported.
#[derive(Debug, Clone, Copy, Default)]
pub struct JobRequestValidator;

impl JobRequestValidator {
    /// # Errors
    /// Returns the first violated [`RejectionReason`].
    pub fn validate(request: &ModerationJobRequest) -> Result<(), RejectionReason> {
        if !is_valid_target(&request.target_url) {
            return Err(RejectionReason::EmptyOrInvalidUrl);
        }
        let (Some(start), Some(end)) = (request.start_date, request.end_date) else {
            return Err(RejectionReason::MissingDateRange);
        };
        if start > end {
            return Err(RejectionReason::InvertedRange);
        }
        if end - start > Duration::days(MAX_RANGE_DAYS) {
            return Err(RejectionReason::RangeTooLong);
        }
        Ok(())
    }

    /// Default end date offered when the start date changes. Shorter ranges stay valid.
    #[must_use]
    pub fn propose_end_date(start: NaiveDate) -> NaiveDate {
        start + Duration::days(MAX_RANGE_DAYS)
    }
}

/// Absolute http(s) URL with a host, or a scheme-less reference that reads as
/// one once `https://` is prepended (`youtube.com/watch?v=…`).
fn is_valid_target(raw: &str) -> bool {
    let raw = raw.trim();
    if raw.is_empty() || raw.chars().any(char::is_whitespace) {
        return false;
    }
    let parsed = if raw.contains("://") {
        Url::parse(raw)
    } else {
        Url::parse(&format!("https://{raw}"))
    };
    parsed.is_ok_and(|url| matches!(url.scheme(), "http" | "https") && url.host().is_some())
}
