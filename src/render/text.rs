use std::fmt::Write;

use crate::app::Result;
use crate::config::OutputFormat;
use crate::domain::Item;
use crate::render::{Artifact, Renderer};
use crate::worker::FeedResult;

const RULE_WIDTH: usize = 72;
const SUMMARY_LINES: usize = 4;

/// Plain-text digest: one block per feed with new items.
///
/// Nothing at all is produced when no feed has new items.
#[derive(Debug, Clone, Default)]
pub struct TextRenderer {
    show_dates: bool,
}

impl TextRenderer {
    pub fn new(show_dates: bool) -> Self {
        Self { show_dates }
    }

    fn write_item(&self, out: &mut String, item: &Item) {
        let _ = writeln!(out, "* {}", item.display_title());
        if let Some(author) = item.author.as_deref() {
            let _ = writeln!(out, "  by {}", author);
        }
        if let Some(link) = item.link.as_deref() {
            let _ = writeln!(out, "  {}", link);
        }
        if self.show_dates {
            if let Some(at) = item.published_at {
                let _ = writeln!(out, "  {}", at.format("%Y-%m-%d %H:%M UTC"));
            }
        }

        let summary = item.summary.as_deref().unwrap_or_else(|| item.display_content());
        for line in summary
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .take(SUMMARY_LINES)
        {
            let _ = writeln!(out, "  {}", line);
        }
        out.push('\n');
    }
}

impl Renderer for TextRenderer {
    fn format(&self) -> OutputFormat {
        OutputFormat::Text
    }

    fn render(&self, results: &[FeedResult]) -> Result<Artifact> {
        let mut out = String::new();

        for result in results.iter().filter(|r| !r.items.is_empty()) {
            let _ = writeln!(out, "{}", result.display_title());
            if let Some(link) = result.link.as_deref() {
                let _ = writeln!(out, "{}", link);
            }
            let _ = writeln!(out, "{}", "-".repeat(RULE_WIDTH));
            for item in &result.items {
                self.write_item(&mut out, item);
            }
        }

        if !out.is_empty() {
            let _ = writeln!(out, "-- ");
            let _ = writeln!(out, "freshet {}", env!("CARGO_PKG_VERSION"));
        }

        Ok(Artifact {
            format: OutputFormat::Text,
            body: out,
        })
    }
}
