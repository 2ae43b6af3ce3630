use crate::config::Config;
use crate::hooks::{FeedContext, Flow, HookResult, Plugin, Stage};
use crate::plugins::FeedToggle;

/// Suppresses item descriptions: summary and content are both removed
/// before output, leaving title, author, link and date.
#[derive(Debug, Clone, Default)]
pub struct SummaryOnly {
    toggle: FeedToggle,
}

impl SummaryOnly {
    pub const NAME: &'static str = "summary_only";

    pub fn from_config(config: &Config) -> Self {
        Self {
            toggle: FeedToggle::from_config(config, config.defaults.summary_only, |fc| {
                fc.summary_only
            }),
        }
    }
}

impl Plugin for SummaryOnly {
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
            item.summary = None;
            item.content = None;
        }
        Ok(Flow::Continue)
    }
}
