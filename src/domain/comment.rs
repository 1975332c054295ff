use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stable comment identifier (the crawler's external id).
pub type CommentId = String;

/// Platform the comment was crawled from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Platform {
    #[default]
    Youtube,
    NaverBlog,
    Instagram,
    Tiktok,
    Twitter,
}

impl AsRef<str> for Platform {
    fn as_ref(&self) -> &str {
        match self {
            Platform::Youtube => "YOUTUBE",
            Platform::NaverBlog => "NAVER_BLOG",
            Platform::Instagram => "INSTAGRAM",
            Platform::Tiktok => "TIKTOK",
            Platform::Twitter => "TWITTER",
        }
    }
}

/// Binary classification assigned by the external scorer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Clean,
    Malicious,
}

impl Verdict {
    #[must_use]
    pub fn from_flag(is_malicious: bool) -> Self {
        if is_malicious {
            Verdict::Malicious
        } else {
            Verdict::Clean
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Clean => f.write_str("clean"),
            Verdict::Malicious => f.write_str("malicious"),
        }
    }
}

/// A classified comment as held by the result set.
///
/// `is_blacklisted` and `contains_blocked_word` are derived flags: they are
/// written only through gateway synchronisation and relabelling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentRecord {
    pub comment_id: CommentId,
    pub author_name: String,
    pub author_identifier: String,
    pub platform: Platform,
    pub text: String,
    pub is_malicious: bool,
    pub toxicity_score: f64,
    pub contains_blocked_word: bool,
    pub matched_blocked_word_id: Option<i64>,
    pub is_blacklisted: bool,
    pub commented_at: DateTime<Utc>,
    pub source_url: String,
}

impl CommentRecord {
    #[must_use]
    pub fn verdict(&self) -> Verdict {
        Verdict::from_flag(self.is_malicious)
    }
}

/// Comment as returned by the crawl/analyze collaborator, before normalization.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawComment {
    #[serde(default, alias = "external_id")]
    pub external_id: Option<String>,
    #[serde(default, alias = "author")]
    pub author_name: Option<String>,
    #[serde(default, alias = "author_identifier")]
    pub author_identifier: Option<String>,
    #[serde(default)]
    pub platform: Option<Platform>,
    #[serde(default, alias = "content")]
    pub text: Option<String>,
    #[serde(default, alias = "is_malicious")]
    pub is_malicious: bool,
    #[serde(default, alias = "toxicity_score")]
    pub toxicity_score: Option<f64>,
    /// Absolute timestamp or relative text such as `3일 전`.
    #[serde(default, alias = "publish_date")]
    pub publish_date: Option<String>,
}
