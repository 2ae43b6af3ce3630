use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use crate::config::Config;
use crate::domain::FeedId;
use crate::hooks::{FeedContext, Flow, HookPriority, HookResult, Plugin, Stage};

#[derive(Debug, Clone)]
struct SaveTarget {
    path: PathBuf,
    save_only: bool,
}

/// Writes the downloaded bytes of a feed to its `save_as` file. Feeds
/// marked `save_only` are skipped once saved.
#[derive(Debug, Clone, Default)]
pub struct RawFeedSaveAs {
    targets: HashMap<FeedId, SaveTarget>,
}

impl RawFeedSaveAs {
    pub const NAME: &'static str = "raw_feed_save_as";

    pub fn from_config(config: &Config) -> Self {
        let targets = config
            .feeds_by_id()
            .into_iter()
            .filter_map(|(id, fc)| {
                fc.save_as.clone().map(|path| {
                    (
                        id,
                        SaveTarget {
                            path,
                            save_only: fc.save_only,
                        },
                    )
                })
            })
            .collect();
        Self { targets }
    }
}

impl Plugin for RawFeedSaveAs {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn stages(&self) -> Vec<Stage> {
        vec![Stage::PostFeedDownload]
    }

    // Runs first so later download hooks cannot alter what gets saved.
    fn priority(&self) -> HookPriority {
        HookPriority::HIGHEST
    }

    fn post_feed_download(&self, ctx: &mut FeedContext<'_>) -> HookResult {
        let Some(target) = self.targets.get(&ctx.feed.id) else {
            return Ok(Flow::Continue);
        };
        let Some(raw) = ctx.raw.as_ref() else {
            return Ok(Flow::Continue);
        };

        if let Some(parent) = target.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(&target.path, &raw.body)?;
        tracing::debug!(
            "Saved {} raw bytes to {}",
            raw.body.len(),
            target.path.display()
        );

        if target.save_only {
            Ok(Flow::Skip)
        } else {
            Ok(Flow::Continue)
        }
    }
}
