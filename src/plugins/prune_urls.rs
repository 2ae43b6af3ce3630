use url::Url;

use crate::config::Config;
use crate::hooks::{FeedContext, Flow, HookResult, Plugin, Stage};
use crate::plugins::FeedToggle;

/// Shows item links without query strings and fragments.
///
/// Runs at output time only: cache keys are derived from the full link,
/// so feeds whose posts differ only by query (`?p=42`) keep distinct items.
#[derive(Debug, Clone, Default)]
pub struct PruneUrls {
    toggle: FeedToggle,
}

impl PruneUrls {
    pub const NAME: &'static str = "prune_urls";

    pub fn from_config(config: &Config) -> Self {
        Self {
            toggle: FeedToggle::from_config(config, config.defaults.prune_urls, |fc| {
                fc.prune_urls
            }),
        }
    }
}

impl Plugin for PruneUrls {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn stages(&self) -> Vec<Stage> {
        vec![Stage::PreFeedOutput]
    }

    fn pre_feed_output(&self, ctx: &mut FeedContext<'_>) -> HookResult {
        if !self.toggle.enabled_for(&ctx.feed.id) {
            return Ok(Flow::Continue);
        }
        for item in ctx.items_mut() {
            if let Some(link) = item.link.as_mut() {
                *link = prune(link);
            }
        }
        Ok(Flow::Continue)
    }
}

fn prune(link: &str) -> String {
    match Url::parse(link) {
        Ok(mut url) => {
            url.set_query(None);
            url.set_fragment(None);
            url.to_string()
        }
        Err(_) => link
            .split(|c| c == '?' || c == '#')
            .next()
            .unwrap_or(link)
            .to_string(),
    }
}
