//! Turns a crawler report into result-set records.
use std::collections::HashSet;

use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::domain::{CommentRecord, CrawlReport, JobSummary, ModerationJobRequest, Platform, RawComment};
use crate::util::time::resolve_publish_date;

const ANONYMOUS_AUTHOR: &str = "익명";

/// 1回のクロールの正規化結果。
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedBatch {
    pub records: Vec<CommentRecord>,
    pub summary: JobSummary,
}

/// Drops comments with empty text, skips repeated ids, and resolves dates
/// against `submitted_at`. Derived flags start cleared; the session labels
/// records before they reach the result set.
#[must_use]
pub fn normalize_report(
    report: CrawlReport,
    request: &ModerationJobRequest,
    submitted_at: DateTime<Utc>,
) -> NormalizedBatch {
    let source_url = request.target_url.trim().to_string();
    let fallback_platform = platform_for_url(&source_url);
    let crawled = u32::try_from(report.records.len()).unwrap_or(u32::MAX);

    let mut seen = HashSet::new();
    let mut skipped = 0u32;
    let mut records = Vec::with_capacity(report.records.len());

    for raw in report.records {
        let Some(record) = to_record(raw, &source_url, fallback_platform, submitted_at) else {
            continue;
        };
        if !seen.insert(record.comment_id.clone()) {
            debug!(comment_id = %record.comment_id, "skipping duplicate crawled comment");
            skipped += 1;
            continue;
        }
        records.push(record);
    }

    let summary = JobSummary {
        total_crawled: report.total_crawled.max(crawled),
        analyzed_count: u32::try_from(records.len()).unwrap_or(u32::MAX),
        skipped_count: skipped,
    };
    NormalizedBatch { records, summary }
}

fn to_record(
    raw: RawComment,
    source_url: &str,
    fallback_platform: Platform,
    submitted_at: DateTime<Utc>,
) -> Option<CommentRecord> {
    let text = raw.text.map(|t| t.trim().to_string()).filter(|t| !t.is_empty())?;
    let author_name = non_blank(raw.author_name).unwrap_or_else(|| ANONYMOUS_AUTHOR.to_string());
    let author_identifier = non_blank(raw.author_identifier).unwrap_or_else(|| author_name.clone());
    let comment_id = non_blank(raw.external_id).unwrap_or_else(|| Uuid::new_v4().to_string());

    Some(CommentRecord {
        comment_id,
        author_name,
        author_identifier,
        platform: raw.platform.unwrap_or(fallback_platform),
        text,
        is_malicious: raw.is_malicious,
        toxicity_score: raw.toxicity_score.unwrap_or(0.0).clamp(0.0, 1.0),
        contains_blocked_word: false,
        matched_blocked_word_id: None,
        is_blacklisted: false,
        commented_at: resolve_publish_date(raw.publish_date.as_deref(), submitted_at),
        source_url: source_url.to_string(),
    })
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// URLのホストからプラットフォームを推定する。
#[must_use]
pub fn platform_for_url(url: &str) -> Platform {
    let lowered = url.to_ascii_lowercase();
    if lowered.contains("naver.com") {
        Platform::NaverBlog
    } else if lowered.contains("instagram.com") {
        Platform::Instagram
    } else if lowered.contains("tiktok.com") {
        Platform::Tiktok
    } else if lowered.contains("twitter.com") || lowered.contains("x.com/") {
        Platform::Twitter
    } else {
        Platform::Youtube
    }
}
