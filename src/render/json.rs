use serde::Serialize;

use crate::app::{FreshetError, Result};
use crate::config::OutputFormat;
use crate::domain::{FeedId, Item};
use crate::render::{Artifact, Renderer};
use crate::worker::FeedResult;

#[derive(Serialize)]
struct JsonDocument<'a> {
    generator: &'static str,
    feeds: Vec<JsonFeed<'a>>,
}

#[derive(Serialize)]
struct JsonFeed<'a> {
    id: &'a FeedId,
    url: &'a str,
    title: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    link: Option<&'a str>,
    items: &'a [Item],
}

/// Pretty-printed JSON document listing the new items of every feed.
#[derive(Debug, Clone, Default)]
pub struct JsonRenderer;

impl JsonRenderer {
    pub fn new() -> Self {
        Self
    }
}

impl Renderer for JsonRenderer {
    fn format(&self) -> OutputFormat {
        OutputFormat::Json
    }

    fn render(&self, results: &[FeedResult]) -> Result<Artifact> {
        let doc = JsonDocument {
            generator: concat!("freshet/", env!("CARGO_PKG_VERSION")),
            feeds: results
                .iter()
                .filter(|r| !r.items.is_empty())
                .map(|r| JsonFeed {
                    id: &r.feed.id,
                    url: r.feed.url.as_str(),
                    title: r.display_title(),
                    link: r.link.as_deref(),
                    items: &r.items,
                })
                .collect(),
        };

        let mut body =
            serde_json::to_string_pretty(&doc).map_err(|e| FreshetError::Render(e.to_string()))?;
        body.push('\n');

        Ok(Artifact {
            format: OutputFormat::Json,
            body,
        })
    }
}
