//! 禁止ワードのマッチング。
use aho_corasick::{AhoCorasick, MatchKind};
use tracing::warn;

use crate::domain::{BlockedWord, blocked_word::normalize_word};

/// Case-insensitive substring matcher over the active blocked words.
///
/// When several words occur in a text the one registered first wins, so a
/// comment keeps the same `matched_blocked_word_id` across relabels.
#[derive(Debug, Clone, Default)]
pub struct BlockedWordMatcher {
    automaton: Option<AhoCorasick>,
    entries: Vec<(i64, String)>,
}

impl BlockedWordMatcher {
    /// `words`からマッチャーを構築する。無効・空のエントリはスキップします。
    /// 入力順が優先順位になります。
    pub fn new<'a>(words: impl IntoIterator<Item = &'a BlockedWord>) -> Self {
        let entries: Vec<(i64, String)> = words
            .into_iter()
            .filter(|w| w.is_active)
            .map(|w| (w.word_id, normalize_word(&w.word)))
            .filter(|(_, key)| !key.is_empty())
            .collect();

        if entries.is_empty() {
            return Self::default();
        }

        let automaton = match AhoCorasick::builder()
            .match_kind(MatchKind::Standard)
            .build(entries.iter().map(|(_, key)| key.as_str()))
        {
            Ok(ac) => Some(ac),
            Err(error) => {
                warn!(%error, patterns = entries.len(), "falling back to linear blocked-word scan");
                None
            }
        };

        Self { automaton, entries }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Id of the highest-priority active word contained in `text`.
    #[must_use]
    pub fn first_match(&self, text: &str) -> Option<i64> {
        if self.entries.is_empty() {
            return None;
        }
        let haystack = text.to_lowercase();
        let index = match &self.automaton {
            Some(ac) => ac
                .find_overlapping_iter(&haystack)
                .map(|m| m.pattern().as_usize())
                .min(),
            None => self
                .entries
                .iter()
                .position(|(_, key)| haystack.contains(key.as_str())),
        }?;
        self.entries.get(index).map(|(id, _)| *id)
    }
}

/// Whether `text` contains `word` under the matcher's normalization.
#[must_use]
pub fn mentions(text: &str, word: &str) -> bool {
    let key = normalize_word(word);
    !key.is_empty() && text.to_lowercase().contains(&key)
}
