use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WordCategory {
    #[default]
    Profanity,
    Hate,
    Violence,
    Sexual,
    Spam,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

/// A user-managed blocked word.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockedWord {
    pub word_id: i64,
    pub word: String,
    pub category: WordCategory,
    pub severity: Severity,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBlockedWord {
    pub word: String,
    #[serde(default)]
    pub category: Option<WordCategory>,
    #[serde(default)]
    pub severity: Option<Severity>,
}

/// Partial update; `None` fields keep their current value.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockedWordUpdate {
    #[serde(default)]
    pub word: Option<String>,
    #[serde(default)]
    pub category: Option<WordCategory>,
    #[serde(default)]
    pub severity: Option<Severity>,
}

/// Case-insensitive key used for uniqueness checks and matching.
#[must_use]
pub fn normalize_word(word: &str) -> String {
    word.trim().to_lowercase()
}
