use chrono::Utc;
use feed_rs::parser;
use html_escape::decode_html_entities;

use crate::app::{FreshetError, Result};
use crate::domain::Item;
use crate::fetcher::RawFeed;

/// A feed after parsing: channel metadata plus its items in feed order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedFeed {
    pub title: Option<String>,
    pub link: Option<String>,
    pub description: Option<String>,
    pub items: Vec<Item>,
}

pub trait FeedParser {
    fn parse(&self, raw: &RawFeed) -> Result<ParsedFeed>;
}

/// Parses RSS 0.9x/1.0/2.0, Atom and JSON Feed through feed-rs.
#[derive(Clone)]
pub struct Normalizer;

impl Default for Normalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Normalizer {
    pub fn new() -> Self {
        Self
    }
}

impl FeedParser for Normalizer {
    fn parse(&self, raw: &RawFeed) -> Result<ParsedFeed> {
        let feed = parser::parse(raw.body.as_slice())
            .map_err(|e| FreshetError::FeedParse(e.to_string()))?;

        let items = feed
            .entries
            .into_iter()
            .map(|entry| {
                let link = entry.links.first().map(|l| l.href.clone());
                let mut item = Item::new(entry.id);

                item.title = entry.title.map(|t| decode_html_entities(&t.content).to_string());
                item.link = link;
                item.content = entry
                    .content
                    .and_then(|c| c.body)
                    .map(|b| decode_html_entities(&b).to_string());
                item.summary = entry.summary.map(|s| decode_html_entities(&s.content).to_string());
                item.author = entry.authors.first().map(|a| a.name.clone());
                item.published_at = entry
                    .published
                    .or(entry.updated)
                    .map(|dt| dt.with_timezone(&Utc));

                item
            })
            .collect();

        Ok(ParsedFeed {
            title: feed.title.map(|t| decode_html_entities(&t.content).to_string()),
            link: feed.links.first().map(|l| l.href.clone()),
            description: feed.description.map(|d| decode_html_entities(&d.content).to_string()),
            items,
        })
    }
}
