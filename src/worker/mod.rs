//! Per-feed processing.
//!
//! A [`FeedWorker`] drives one feed through its states:
//!
//! ```text
//! Pending → PreHooksRun → Downloaded → PostDownloadHooksRun → Parsed
//!     → PostParseHooksRun → ItemsFiltered → CacheChecked
//!     → PostProcessHooksRun → [Done] | [Skipped] | [Failed] | [Cancelled]
//! ```
//!
//! Cancellation is observed between states only. Cache inserts for a feed
//! happen in one step at the very end, so a feed that is skipped, fails or
//! is cancelled leaves the cache untouched. Only items still present after
//! `PreFeedOutput` are inserted; whatever reaches the renderers is exactly
//! what gets remembered.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::app::{FreshetError, Result};
use crate::cache::{CacheKey, ItemCache};
use crate::domain::{FeedSource, Item, SortBy};
use crate::fetcher::Fetcher;
use crate::hooks::{FeedContext, FeedStage, Flow, HookChain, ItemContext, ItemVerdict, Stage};
use crate::normalizer::FeedParser;
use crate::plugins::PluginData;

/// Everything a worker shares with the rest of the run.
pub struct RunContext {
    /// Wall-clock time of the run; every novelty decision and insert uses it.
    pub now: DateTime<Utc>,
    pub cache: Arc<ItemCache>,
    pub data: Arc<PluginData>,
    pub token: CancellationToken,
}

impl RunContext {
    pub fn new(now: DateTime<Utc>, cache: Arc<ItemCache>, data: Arc<PluginData>) -> Self {
        Self {
            now,
            cache,
            data,
            token: CancellationToken::new(),
        }
    }

    pub fn with_token(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedState {
    Pending,
    PreHooksRun,
    Downloaded,
    PostDownloadHooksRun,
    Parsed,
    PostParseHooksRun,
    ItemsFiltered,
    CacheChecked,
    PostProcessHooksRun,
}

impl fmt::Display for FeedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// The new items of one feed, ready for rendering.
#[derive(Debug, Clone)]
pub struct FeedResult {
    pub feed: Arc<FeedSource>,
    /// Title announced by the feed itself.
    pub title: Option<String>,
    pub link: Option<String>,
    pub items: Vec<Item>,
}

impl FeedResult {
    /// The configured title override, else the feed's own title, else its id.
    pub fn display_title(&self) -> &str {
        self.feed.display_title(self.title.as_deref())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Disabled,
    /// A hook at this stage asked to skip the feed.
    Hook(Stage),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Disabled => f.write_str("disabled"),
            SkipReason::Hook(stage) => write!(f, "skipped at {}", stage),
        }
    }
}

/// Terminal state of one feed.
#[derive(Debug)]
pub enum FeedOutcome {
    Done(FeedResult),
    Skipped(SkipReason),
    Failed(FreshetError),
    Cancelled,
}

impl FeedOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, FeedOutcome::Failed(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            FeedOutcome::Done(_) => "done",
            FeedOutcome::Skipped(_) => "skipped",
            FeedOutcome::Failed(_) => "failed",
            FeedOutcome::Cancelled => "cancelled",
        }
    }
}

type Step<T> = std::result::Result<T, FeedOutcome>;

/// Item metadata carrying the cache identity through `PreFeedOutput`, where
/// hooks may rewrite the fields the identity was derived from.
const IDENTITY_NS: &str = "freshet";
const IDENTITY_KEY: &str = "cache_identity";

pub struct FeedWorker {
    fetcher: Arc<dyn Fetcher + Send + Sync>,
    parser: Arc<dyn FeedParser + Send + Sync>,
    hooks: Arc<HookChain>,
}

impl FeedWorker {
    pub fn new(
        fetcher: Arc<dyn Fetcher + Send + Sync>,
        parser: Arc<dyn FeedParser + Send + Sync>,
        hooks: Arc<HookChain>,
    ) -> Self {
        Self {
            fetcher,
            parser,
            hooks,
        }
    }

    /// Process `feed` to a terminal state. Never panics on feed errors;
    /// they come back as [`FeedOutcome::Failed`].
    pub async fn process(&self, feed: Arc<FeedSource>, run: &RunContext) -> FeedOutcome {
        let span = tracing::info_span!("feed", id = %feed.id);
        let outcome = match self.run_states(&feed, run).instrument(span.clone()).await {
            Ok(result) => FeedOutcome::Done(result),
            Err(outcome) => outcome,
        };

        let _enter = span.enter();
        match &outcome {
            FeedOutcome::Done(result) => {
                tracing::info!("{} new items", result.items.len())
            }
            FeedOutcome::Skipped(reason) => tracing::info!("Feed {}", reason),
            FeedOutcome::Failed(e) => tracing::warn!("Feed failed: {}", e),
            FeedOutcome::Cancelled => tracing::info!("Feed cancelled"),
        }
        outcome
    }

    async fn run_states(&self, feed: &Arc<FeedSource>, run: &RunContext) -> Step<FeedResult> {
        let mut ctx = FeedContext::new(feed.as_ref(), run.now, run.data.as_ref());
        let mut state = FeedState::Pending;

        checkpoint(run, state)?;
        self.stage(FeedStage::PreFeedDownload, &mut ctx)?;
        advance(&mut state, FeedState::PreHooksRun);

        checkpoint(run, state)?;
        let raw = self
            .fetcher
            .fetch(&feed.url)
            .await
            .map_err(FeedOutcome::Failed)?;
        ctx.raw = Some(raw);
        advance(&mut state, FeedState::Downloaded);

        checkpoint(run, state)?;
        self.stage(FeedStage::PostFeedDownload, &mut ctx)?;
        advance(&mut state, FeedState::PostDownloadHooksRun);

        checkpoint(run, state)?;
        let raw = ctx.raw.take().ok_or_else(|| {
            FeedOutcome::Failed(FreshetError::Other("raw feed removed by a hook".into()))
        })?;
        let parsed = self.parser.parse(&raw).map_err(FeedOutcome::Failed)?;
        ctx.raw = Some(raw);
        ctx.parsed = Some(parsed);
        advance(&mut state, FeedState::Parsed);

        checkpoint(run, state)?;
        self.stage(FeedStage::PostFeedParse, &mut ctx)?;
        advance(&mut state, FeedState::PostParseHooksRun);

        checkpoint(run, state)?;
        let candidates = dedup_within_run(feed, std::mem::take(ctx.items_mut()));
        advance(&mut state, FeedState::ItemsFiltered);

        let fresh: Vec<(CacheKey, Item)> = candidates
            .into_iter()
            .filter(|(key, item)| {
                let seen = run.cache.contains(key, run.now);
                if seen {
                    tracing::debug!("Already seen: {}", item.display_title());
                }
                !seen
            })
            .collect();
        advance(&mut state, FeedState::CacheChecked);

        checkpoint(run, state)?;
        let mut kept = Vec::with_capacity(fresh.len());
        for (key, mut item) in fresh {
            let mut item_ctx = ItemContext {
                feed: feed.as_ref(),
                now: run.now,
                data: run.data.as_ref(),
                item: &mut item,
            };
            match self.hooks.dispatch_item(&mut item_ctx) {
                Ok(ItemVerdict::Keep) => kept.push((key, item)),
                Ok(ItemVerdict::Drop) => {
                    tracing::debug!("Item dropped by hook: {}", item.display_title())
                }
                Err(e) => return Err(FeedOutcome::Failed(e)),
            }
        }
        sort_items(&mut kept, feed.sort_by);
        let mut pending = HashSet::with_capacity(kept.len());
        *ctx.items_mut() = kept
            .into_iter()
            .map(|(key, mut item)| {
                item.set_meta(IDENTITY_NS, IDENTITY_KEY, key.identity.as_str());
                pending.insert(key.identity);
                item
            })
            .collect();
        advance(&mut state, FeedState::PostProcessHooksRun);

        checkpoint(run, state)?;
        self.stage(FeedStage::PreFeedOutput, &mut ctx)?;

        let keys: Vec<CacheKey> = ctx
            .items_mut()
            .iter_mut()
            .filter_map(|item| item.take_meta(IDENTITY_NS, IDENTITY_KEY))
            .filter(|identity| pending.remove(identity))
            .map(|identity| CacheKey::new(feed.id.clone(), identity))
            .collect();
        if !pending.is_empty() {
            tracing::debug!("{} items removed before output, not cached", pending.len());
        }

        // Last chance to stop: past this point the feed commits.
        checkpoint(run, state)?;
        for key in keys {
            run.cache.insert(key, run.now, feed.ttl);
        }

        let parsed = ctx.parsed.take().unwrap_or_default();
        Ok(FeedResult {
            feed: Arc::clone(feed),
            title: parsed.title,
            link: parsed.link,
            items: parsed.items,
        })
    }

    fn stage(&self, stage: FeedStage, ctx: &mut FeedContext<'_>) -> Step<()> {
        match self.hooks.dispatch(stage, ctx) {
            Ok(Flow::Continue) => Ok(()),
            Ok(Flow::Skip) => Err(FeedOutcome::Skipped(SkipReason::Hook(stage.into()))),
            Err(e) => Err(FeedOutcome::Failed(e)),
        }
    }
}

fn advance(state: &mut FeedState, next: FeedState) {
    tracing::trace!("{} -> {}", state, next);
    *state = next;
}

fn checkpoint(run: &RunContext, state: FeedState) -> Step<()> {
    if run.token.is_cancelled() {
        tracing::debug!("Cancelled in state {}", state);
        Err(FeedOutcome::Cancelled)
    } else {
        Ok(())
    }
}

/// Pair every item with its cache key, keeping only the first item per key.
/// Items without any usable identity cannot be tracked and are left out.
fn dedup_within_run(feed: &FeedSource, items: Vec<Item>) -> Vec<(CacheKey, Item)> {
    let mut seen = HashSet::with_capacity(items.len());
    items
        .into_iter()
        .filter_map(|item| {
            let Some(key) = CacheKey::for_item(feed, &item) else {
                tracing::debug!("Item without link, guid or title ignored");
                return None;
            };
            if !seen.insert(key.clone()) {
                tracing::debug!("Duplicate within feed: {}", key.identity);
                return None;
            }
            Some((key, item))
        })
        .collect()
}

fn sort_items(items: &mut [(CacheKey, Item)], sort_by: SortBy) {
    match sort_by {
        SortBy::None => {}
        // Oldest first; undated items keep their order after dated ones.
        SortBy::Time => items.sort_by(|(_, a), (_, b)| match (a.published_at, b.published_at) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }),
        SortBy::Title => {
            items.sort_by_cached_key(|(_, item)| item.title.as_deref().unwrap_or("").to_lowercase())
        }
    }
}
