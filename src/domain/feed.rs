use std::fmt;

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use url::Url;

pub const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

/// Canonical identity of a feed: its normalized URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeedId(String);

impl FeedId {
    pub fn parse(url: &str) -> Result<Self, url::ParseError> {
        normalize_url(url).map(Self)
    }

    /// Wrap a value that is already in canonical form (e.g. read back from the store).
    pub fn from_canonical(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FeedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortBy {
    #[default]
    None,
    Time,
    Title,
}

/// A configured feed. Built once from the configuration and shared
/// read-only with every worker.
#[derive(Debug, Clone)]
pub struct FeedSource {
    pub id: FeedId,
    pub url: Url,
    pub ttl: TimeDelta,
    pub enabled: bool,
    pub sort_by: SortBy,
    pub ignore_duplicate_titles: bool,
    pub title_override: Option<String>,
}

impl FeedSource {
    pub fn new(url: &str, ttl_days: u32) -> Result<Self, url::ParseError> {
        let parsed = Url::parse(url.trim())?;
        Ok(Self {
            id: FeedId::parse(url)?,
            url: parsed,
            ttl: ttl_from_days(ttl_days),
            enabled: true,
            sort_by: SortBy::None,
            ignore_duplicate_titles: false,
            title_override: None,
        })
    }

    pub fn display_title<'a>(&'a self, parsed_title: Option<&'a str>) -> &'a str {
        self.title_override
            .as_deref()
            .or(parsed_title)
            .unwrap_or(self.id.as_str())
    }
}

pub fn ttl_from_days(days: u32) -> TimeDelta {
    TimeDelta::seconds(i64::from(days) * SECONDS_PER_DAY)
}

/// Normalize a URL into its canonical string form.
///
/// Scheme, host and path are lower-cased, default ports dropped, a trailing
/// slash on the path removed and the fragment discarded. The query string is
/// kept verbatim since many feeds are addressed by it.
pub fn normalize_url(raw: &str) -> Result<String, url::ParseError> {
    let url = Url::parse(raw.trim())?;

    let mut out = String::with_capacity(raw.len());
    out.push_str(&url.scheme().to_ascii_lowercase());
    out.push_str("://");
    if let Some(host) = url.host_str() {
        out.push_str(&host.to_ascii_lowercase());
    }
    // `Url::port` is already `None` for the scheme's default port.
    if let Some(port) = url.port() {
        out.push(':');
        out.push_str(&port.to_string());
    }

    let path = url.path().to_lowercase();
    out.push_str(path.trim_end_matches('/'));

    if let Some(query) = url.query() {
        if !query.is_empty() {
            out.push('?');
            out.push_str(query);
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_lowercases_scheme_host_and_path() {
        let n = normalize_url("HTTPS://Example.COM/Blog/Feed.XML").unwrap();
        assert_eq!(n, "https://example.com/blog/feed.xml");
    }

    #[test]
    fn test_normalize_drops_default_port_and_fragment() {
        assert_eq!(
            normalize_url("http://example.com:80/feed#top").unwrap(),
            "http://example.com/feed"
        );
        assert_eq!(
            normalize_url("https://example.com:443/feed").unwrap(),
            "https://example.com/feed"
        );
        assert_eq!(
            normalize_url("https://example.com:8443/feed").unwrap(),
            "https://example.com:8443/feed"
        );
    }

    #[test]
    fn test_normalize_trailing_slash() {
        assert_eq!(
            normalize_url("https://example.com/feed/").unwrap(),
            normalize_url("https://example.com/feed").unwrap()
        );
        assert_eq!(normalize_url("https://example.com/").unwrap(), "https://example.com");
    }

    #[test]
    fn test_normalize_keeps_query() {
        assert_eq!(
            normalize_url("https://example.com/index.php?feed=rss2").unwrap(),
            "https://example.com/index.php?feed=rss2"
        );
    }

    #[test]
    fn test_normalize_rejects_garbage() {
        assert!(normalize_url("not a url").is_err());
    }

    #[test]
    fn test_feed_source_defaults() {
        let feed = FeedSource::new("https://Example.com/feed/", 1).unwrap();
        assert_eq!(feed.id.as_str(), "https://example.com/feed");
        assert_eq!(feed.ttl, TimeDelta::seconds(86_400));
        assert!(feed.enabled);
        assert_eq!(feed.sort_by, SortBy::None);
    }

    #[test]
    fn test_display_title_prefers_override() {
        let mut feed = FeedSource::new("https://example.com/feed", 1).unwrap();
        assert_eq!(feed.display_title(Some("Parsed")), "Parsed");
        assert_eq!(feed.display_title(None), "https://example.com/feed");
        feed.title_override = Some("Mine".into());
        assert_eq!(feed.display_title(Some("Parsed")), "Mine");
    }
}
