use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::feed::normalize_url;

/// One entry of a feed for the current run. Items are never persisted;
/// only their cache key is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// Entry id as published by the feed (`guid` / Atom `id`), may be empty.
    pub guid: String,
    pub title: Option<String>,
    pub link: Option<String>,
    pub content: Option<String>,
    pub summary: Option<String>,
    pub author: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    /// Plugin metadata, keys are `namespace:key`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl Item {
    pub fn new(guid: impl Into<String>) -> Self {
        Self {
            guid: guid.into(),
            ..Default::default()
        }
    }

    /// Normalized item URL, falling back to the raw link when it does not
    /// parse as an absolute URL.
    pub fn normalized_link(&self) -> Option<String> {
        let link = self.link.as_deref()?.trim();
        if link.is_empty() {
            return None;
        }
        Some(normalize_url(link).unwrap_or_else(|_| link.to_string()))
    }

    /// Deterministic hash of the title, used when a feed deduplicates by title.
    pub fn title_hash(&self) -> Option<String> {
        let title = self.title.as_deref()?.trim();
        if title.is_empty() {
            return None;
        }
        let mut hasher = Sha256::new();
        hasher.update(title.to_lowercase().as_bytes());
        Some(hex::encode(hasher.finalize()))
    }

    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or("(Untitled)")
    }

    /// Get the best available content for display
    pub fn display_content(&self) -> &str {
        self.content
            .as_deref()
            .or(self.summary.as_deref())
            .unwrap_or("")
    }

    pub fn meta(&self, namespace: &str, key: &str) -> Option<&str> {
        self.metadata
            .get(&format!("{}:{}", namespace, key))
            .map(String::as_str)
    }

    pub fn set_meta(&mut self, namespace: &str, key: &str, value: impl Into<String>) {
        self.metadata
            .insert(format!("{}:{}", namespace, key), value.into());
    }

    pub fn take_meta(&mut self, namespace: &str, key: &str) -> Option<String> {
        self.metadata.remove(&format!("{}:{}", namespace, key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalized_link() {
        let mut item = Item::new("e1");
        item.link = Some("HTTPS://Example.com/Post/1/".into());
        assert_eq!(
            item.normalized_link().as_deref(),
            Some("https://example.com/post/1")
        );
    }

    #[test]
    fn test_normalized_link_falls_back_to_raw() {
        let mut item = Item::new("e1");
        item.link = Some("/relative/post".into());
        assert_eq!(item.normalized_link().as_deref(), Some("/relative/post"));

        item.link = Some("   ".into());
        assert_eq!(item.normalized_link(), None);
    }

    #[test]
    fn test_title_hash_is_case_and_whitespace_insensitive() {
        let mut a = Item::new("a");
        a.title = Some("Hello World".into());
        let mut b = Item::new("b");
        b.title = Some("  hello world ".into());
        assert_eq!(a.title_hash(), b.title_hash());
        assert_eq!(a.title_hash().unwrap().len(), 64);
    }

    #[test]
    fn test_title_hash_none_without_title() {
        assert_eq!(Item::new("x").title_hash(), None);
    }

    #[test]
    fn test_display_title_without_title() {
        let item = Item::new("e1");
        assert_eq!(item.display_title(), "(Untitled)");
    }

    #[test]
    fn test_display_content_falls_back_to_summary() {
        let mut item = Item::new("e1");
        item.summary = Some("Short summary".into());
        assert_eq!(item.display_content(), "Short summary");
        item.content = Some("Full content".into());
        assert_eq!(item.display_content(), "Full content");
    }

    #[test]
    fn test_metadata_is_namespaced() {
        let mut item = Item::new("e1");
        item.set_meta("tags", "color", "red");
        item.set_meta("other", "color", "blue");
        assert_eq!(item.meta("tags", "color"), Some("red"));
        assert_eq!(item.meta("other", "color"), Some("blue"));
        assert_eq!(item.meta("tags", "size"), None);
    }
}
