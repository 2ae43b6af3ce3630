//! Built-in plugins and the per-plugin persistent key/value store.
//!
//! - [`ShowAuthors`]: strips item authors unless a feed asks to keep them
//! - [`RawFeedSaveAs`]: copies the downloaded bytes to a file, optionally
//!   skipping the feed afterwards
//! - [`RawFeedEdit`]: regex substitutions on the downloaded bytes before
//!   parsing
//! - [`PruneUrls`]: shows item links without query strings and fragments
//! - [`SummaryOnly`]: removes item summaries and content before output

mod data;
mod prune_urls;
mod raw_edit;
mod save_as;
mod show_authors;
mod summary_only;

pub use data::PluginData;
pub use prune_urls::PruneUrls;
pub use raw_edit::RawFeedEdit;
pub use save_as::RawFeedSaveAs;
pub use show_authors::ShowAuthors;
pub use summary_only::SummaryOnly;

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::{Config, FeedConfig};
use crate::domain::FeedId;
use crate::hooks::Plugin;

/// The plugins every run registers, configured from `config`.
pub fn builtin_plugins(config: &Config) -> Vec<Arc<dyn Plugin>> {
    vec![
        Arc::new(RawFeedSaveAs::from_config(config)),
        Arc::new(RawFeedEdit::from_config(config)),
        Arc::new(PruneUrls::from_config(config)),
        Arc::new(ShowAuthors::from_config(config)),
        Arc::new(SummaryOnly::from_config(config)),
    ]
}

/// A boolean feature with a global default and per-feed overrides.
#[derive(Debug, Clone, Default)]
struct FeedToggle {
    default: bool,
    overrides: HashMap<FeedId, bool>,
}

impl FeedToggle {
    fn from_config(
        config: &Config,
        default: bool,
        pick: impl Fn(&FeedConfig) -> Option<bool>,
    ) -> Self {
        let overrides = config
            .feeds_by_id()
            .into_iter()
            .filter_map(|(id, fc)| pick(fc).map(|on| (id, on)))
            .collect();
        Self { default, overrides }
    }

    fn enabled_for(&self, id: &FeedId) -> bool {
        self.overrides.get(id).copied().unwrap_or(self.default)
    }
}
