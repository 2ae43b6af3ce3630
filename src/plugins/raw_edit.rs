use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use regex::bytes::Regex;

use crate::config::Config;
use crate::domain::FeedId;
use crate::hooks::{FeedContext, Flow, HookPriority, HookResult, Plugin, Stage};

#[derive(Debug, Clone)]
struct Edit {
    pattern: Regex,
    replace: Vec<u8>,
}

#[derive(Debug, Clone, Default)]
struct FeedEdits {
    edits: Vec<Edit>,
    save_edited_as: Option<PathBuf>,
}

/// Applies regex substitutions to the downloaded bytes of a feed before it
/// is parsed, typically to repair markup the parser rejects.
///
/// Runs after [`RawFeedSaveAs`](super::RawFeedSaveAs), so `save_as` keeps
/// the bytes as served and `save_edited_as` the bytes as parsed.
#[derive(Debug, Clone, Default)]
pub struct RawFeedEdit {
    feeds: HashMap<FeedId, FeedEdits>,
}

impl RawFeedEdit {
    pub const NAME: &'static str = "raw_feed_edit";

    pub fn from_config(config: &Config) -> Self {
        let feeds = config
            .feeds_by_id()
            .into_iter()
            .filter(|(_, fc)| !fc.edits.is_empty())
            .map(|(id, fc)| {
                let edits = fc
                    .edits
                    .iter()
                    .filter_map(|edit| match Regex::new(&edit.pattern) {
                        Ok(pattern) => Some(Edit {
                            pattern,
                            replace: edit.replace.clone().into_bytes(),
                        }),
                        Err(e) => {
                            tracing::warn!("Ignoring edit {:?} for {}: {}", edit.pattern, id, e);
                            None
                        }
                    })
                    .collect();
                let entry = FeedEdits {
                    edits,
                    save_edited_as: fc.save_edited_as.clone(),
                };
                (id, entry)
            })
            .collect();
        Self { feeds }
    }
}

impl Plugin for RawFeedEdit {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn stages(&self) -> Vec<Stage> {
        vec![Stage::PostFeedDownload]
    }

    fn priority(&self) -> HookPriority {
        HookPriority::HIGH
    }

    fn post_feed_download(&self, ctx: &mut FeedContext<'_>) -> HookResult {
        let Some(feed_edits) = self.feeds.get(&ctx.feed.id) else {
            return Ok(Flow::Continue);
        };
        let Some(raw) = ctx.raw.as_mut() else {
            return Ok(Flow::Continue);
        };

        for edit in &feed_edits.edits {
            let edited = edit
                .pattern
                .replace_all(&raw.body, edit.replace.as_slice())
                .into_owned();
            if edited != raw.body {
                tracing::debug!("Edit {} changed the raw feed", edit.pattern);
            }
            raw.body = edited;
        }

        if let Some(path) = &feed_edits.save_edited_as {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent)?;
                }
            }
            fs::write(path, &raw.body)?;
            tracing::debug!("Saved edited feed to {}", path.display());
        }

        Ok(Flow::Continue)
    }
}
