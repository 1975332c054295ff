use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::comment::{CommentRecord, Verdict};

/// Inclusive calendar-day range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    #[must_use]
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    #[must_use]
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerdictFilter {
    #[default]
    All,
    Clean,
    Malicious,
}

impl VerdictFilter {
    #[must_use]
    pub fn admits(self, verdict: Verdict) -> bool {
        match self {
            VerdictFilter::All => true,
            VerdictFilter::Clean => verdict == Verdict::Clean,
            VerdictFilter::Malicious => verdict == Verdict::Malicious,
        }
    }
}

/// URL filter, date range and verdict filter that decide which records are visible.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scope {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub date_range: Option<DateRange>,
    #[serde(default)]
    pub verdict: VerdictFilter,
}

impl Scope {
    /// Scope that shows every cached record.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn for_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_date_range(mut self, range: DateRange) -> Self {
        self.date_range = Some(range);
        self
    }

    #[must_use]
    pub fn with_verdict(mut self, verdict: VerdictFilter) -> Self {
        self.verdict = verdict;
        self
    }

    #[must_use]
    pub fn matches(&self, record: &CommentRecord) -> bool {
        if let Some(url) = self.url.as_deref() {
            if record.source_url != url {
                return false;
            }
        }
        if let Some(range) = &self.date_range {
            if !range.contains(record.commented_at.date_naive()) {
                return false;
            }
        }
        self.verdict.admits(record.verdict())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::domain::comment::Platform;

    fn record(url: &str, day: u32, malicious: bool) -> CommentRecord {
        CommentRecord {
            comment_id: format!("{url}-{day}"),
            author_name: "author".into(),
            author_identifier: "author".into(),
            platform: Platform::Youtube,
            text: "text".into(),
            is_malicious: malicious,
            toxicity_score: 0.0,
            contains_blocked_word: false,
            matched_blocked_word_id: None,
            is_blacklisted: false,
            commented_at: Utc.with_ymd_and_hms(2024, 1, day, 12, 0, 0).unwrap(),
            source_url: url.into(),
        }
    }

    #[test]
    fn default_scope_matches_everything() {
        assert!(Scope::all().matches(&record("a", 1, true)));
        assert!(Scope::all().matches(&record("b", 2, false)));
    }

    #[test]
    fn scope_combines_url_range_and_verdict() {
        let range = DateRange::new(
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 4).unwrap(),
        );
        let scope = Scope::for_url("a")
            .with_date_range(range)
            .with_verdict(VerdictFilter::Malicious);

        assert!(scope.matches(&record("a", 2, true)));
        assert!(scope.matches(&record("a", 4, true)));
        assert!(!scope.matches(&record("a", 5, true)));
        assert!(!scope.matches(&record("a", 3, false)));
        assert!(!scope.matches(&record("b", 3, true)));
    }
}
