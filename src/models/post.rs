//! Post model and its deduplication identity.

use serde::{Deserialize, Serialize};

/// Number of text characters folded into a fallback dedup key.
const DEDUP_TEXT_CHARS: usize = 40;

/// One post extracted from a feed element.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    /// Display name of the author.
    pub username: String,
    /// Author handle (e.g. `@someone`).
    pub handle: String,
    /// Post body text.
    pub text: String,
    /// ISO-8601 timestamp, empty when the feed did not expose one.
    pub timestamp: String,
    /// Media URLs in DOM order, unique within the post.
    pub media_urls: Vec<String>,
    /// Hashtags found in `text`, in order of appearance.
    pub hashtags: Vec<String>,
    /// Mentions found in `text`, in order of appearance.
    pub mentions: Vec<String>,
    /// Canonical permalink, empty when unknown.
    pub url: String,
}

/// Identity used to suppress duplicate posts within a run.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey(String);

impl DedupKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// An empty key means the post carries no identity at all.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Post {
    /// Permalink when present, otherwise username plus the first 40 chars of text.
    pub fn dedup_key(&self) -> DedupKey {
        if !self.url.is_empty() {
            return DedupKey(self.url.clone());
        }
        let prefix: String = self.text.chars().take(DEDUP_TEXT_CHARS).collect();
        DedupKey(format!("{}{}", self.username, prefix))
    }

    /// Short single-line preview of the text for log lines.
    pub fn preview(&self, max_chars: usize) -> String {
        self.text
            .chars()
            .take(max_chars)
            .map(|c| if c == '\n' { ' ' } else { c })
            .collect()
    }
}
