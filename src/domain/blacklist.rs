use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::comment::{CommentRecord, Platform};

/// Entry of the authoritative blacklist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlacklistEntry {
    pub blacklist_id: i64,
    pub author_name: String,
    pub author_identifier: String,
    pub platform: Platform,
    pub reason: String,
    /// Never decreases for a given `author_identifier`.
    pub violation_count: u32,
    pub comment_text: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Request to blacklist an author. Adding an author that is already listed
/// bumps the existing entry's violation count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBlacklistEntry {
    pub author_name: String,
    pub author_identifier: String,
    #[serde(default)]
    pub platform: Platform,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub comment_text: Option<String>,
}

impl NewBlacklistEntry {
    /// Builds an escalation request from a malicious comment.
    #[must_use]
    pub fn from_comment(record: &CommentRecord, reason: Option<String>) -> Self {
        let reason = reason
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| format!("악성 댓글 (toxicity {:.1})", record.toxicity_score));
        Self {
            author_name: record.author_name.clone(),
            author_identifier: record.author_identifier.clone(),
            platform: record.platform,
            reason,
            comment_text: Some(record.text.clone()),
        }
    }
}
