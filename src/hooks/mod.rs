//! Plugin extension points.
//!
//! A feed passes through a fixed sequence of stages; at each stage every
//! plugin registered for it runs in priority order, receiving a mutable
//! context. Plugins see the accumulated edits of the plugins before them.
//!
//! ```text
//! PreFeedDownload → PostFeedDownload → PostFeedParse
//!     → PostFeedProcess (per item) → PreFeedOutput → PostOutput (once per run)
//! ```

mod chain;

pub use chain::{HookChain, HookRegistration};

use std::fmt;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::{FeedSource, Item};
use crate::fetcher::RawFeed;
use crate::normalizer::ParsedFeed;
use crate::plugins::PluginData;
use crate::render::Artifact;
use crate::worker::FeedResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    PreFeedDownload,
    PostFeedDownload,
    PostFeedParse,
    PostFeedProcess,
    PreFeedOutput,
    PostOutput,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Stage::PreFeedDownload,
        Stage::PostFeedDownload,
        Stage::PostFeedParse,
        Stage::PostFeedProcess,
        Stage::PreFeedOutput,
        Stage::PostOutput,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::PreFeedDownload => "PreFeedDownload",
            Stage::PostFeedDownload => "PostFeedDownload",
            Stage::PostFeedParse => "PostFeedParse",
            Stage::PostFeedProcess => "PostFeedProcess",
            Stage::PreFeedOutput => "PreFeedOutput",
            Stage::PostOutput => "PostOutput",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The stages that run once per feed with a [`FeedContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedStage {
    PreFeedDownload,
    PostFeedDownload,
    PostFeedParse,
    PreFeedOutput,
}

impl From<FeedStage> for Stage {
    fn from(stage: FeedStage) -> Self {
        match stage {
            FeedStage::PreFeedDownload => Stage::PreFeedDownload,
            FeedStage::PostFeedDownload => Stage::PostFeedDownload,
            FeedStage::PostFeedParse => Stage::PostFeedParse,
            FeedStage::PreFeedOutput => Stage::PreFeedOutput,
        }
    }
}

/// Whether processing of the current feed goes on after a hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// Stop this feed for the rest of the run. Not an error.
    Skip,
}

/// A `PostFeedProcess` hook's decision about one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemVerdict {
    Keep,
    /// Remove this item only; siblings keep going.
    Drop,
}

/// Lower values execute first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HookPriority(pub i32);

impl Default for HookPriority {
    fn default() -> Self {
        HookPriority::NORMAL
    }
}

impl HookPriority {
    pub const HIGHEST: HookPriority = HookPriority(0);
    pub const HIGH: HookPriority = HookPriority(25);
    pub const NORMAL: HookPriority = HookPriority(50);
    pub const LOW: HookPriority = HookPriority(75);
    pub const LOWEST: HookPriority = HookPriority(100);
}

/// Errors raised by plugins.
#[derive(Debug, Error)]
pub enum HookError {
    #[error("{0}")]
    Failed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type HookResult<T = Flow> = std::result::Result<T, HookError>;

/// Context handed to the per-feed stages. Fields are filled in as the
/// feed progresses: `raw` after download, `parsed` after parsing.
pub struct FeedContext<'a> {
    pub feed: &'a FeedSource,
    pub now: DateTime<Utc>,
    pub data: &'a PluginData,
    pub raw: Option<RawFeed>,
    pub parsed: Option<ParsedFeed>,
}

impl<'a> FeedContext<'a> {
    pub fn new(feed: &'a FeedSource, now: DateTime<Utc>, data: &'a PluginData) -> Self {
        Self {
            feed,
            now,
            data,
            raw: None,
            parsed: None,
        }
    }

    /// Items of the parsed feed, empty before parsing.
    pub fn items_mut(&mut self) -> &mut Vec<Item> {
        &mut self.parsed.get_or_insert_with(ParsedFeed::default).items
    }
}

pub struct ItemContext<'a> {
    pub feed: &'a FeedSource,
    pub now: DateTime<Utc>,
    pub data: &'a PluginData,
    pub item: &'a mut Item,
}

pub struct OutputContext<'a> {
    pub now: DateTime<Utc>,
    pub data: &'a PluginData,
    pub results: &'a [FeedResult],
    pub artifacts: &'a [Artifact],
}

/// An extension registered with the [`HookChain`].
///
/// A plugin declares the stages it takes part in; only the matching
/// methods are ever called. Ties in [`priority`](Plugin::priority) are
/// broken by [`name`](Plugin::name).
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    fn stages(&self) -> Vec<Stage>;

    fn priority(&self) -> HookPriority {
        HookPriority::default()
    }

    fn pre_feed_download(&self, _ctx: &mut FeedContext<'_>) -> HookResult {
        Ok(Flow::Continue)
    }

    fn post_feed_download(&self, _ctx: &mut FeedContext<'_>) -> HookResult {
        Ok(Flow::Continue)
    }

    fn post_feed_parse(&self, _ctx: &mut FeedContext<'_>) -> HookResult {
        Ok(Flow::Continue)
    }

    fn post_feed_process(&self, _ctx: &mut ItemContext<'_>) -> HookResult<ItemVerdict> {
        Ok(ItemVerdict::Keep)
    }

    fn pre_feed_output(&self, _ctx: &mut FeedContext<'_>) -> HookResult {
        Ok(Flow::Continue)
    }

    fn post_output(&self, _ctx: &OutputContext<'_>) -> HookResult<()> {
        Ok(())
    }
}
