use crate::config::Config;
use crate::hooks::{HookResult, ItemContext, ItemVerdict, Plugin, Stage};
use crate::plugins::FeedToggle;

/// Clears item authors for every feed that does not ask to show them.
#[derive(Debug, Clone, Default)]
pub struct ShowAuthors {
    toggle: FeedToggle,
}

impl ShowAuthors {
    pub const NAME: &'static str = "show_authors";

    pub fn from_config(config: &Config) -> Self {
        Self {
            toggle: FeedToggle::from_config(config, config.defaults.show_authors, |fc| {
                fc.show_authors
            }),
        }
    }
}

impl Plugin for ShowAuthors {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn stages(&self) -> Vec<Stage> {
        vec![Stage::PostFeedProcess]
    }

    fn post_feed_process(&self, ctx: &mut ItemContext<'_>) -> HookResult<ItemVerdict> {
        if !self.toggle.enabled_for(&ctx.feed.id) {
            ctx.item.author = None;
        }
        Ok(ItemVerdict::Keep)
    }
}
