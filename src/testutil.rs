//! Stub collaborators shared by the pipeline tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::app::{FreshetError, Result};
use crate::fetcher::{Fetcher, RawFeed};
use crate::hooks::{FeedContext, Flow, HookResult, ItemContext, ItemVerdict, Plugin, Stage};

/// Serves canned bodies by URL and records how it was called.
#[derive(Default)]
pub struct StubFetcher {
    bodies: Mutex<HashMap<String, String>>,
    delay: Option<Duration>,
    cancel_on_fetch: Option<CancellationToken>,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub calls: AtomicUsize,
}

impl StubFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Cancel `token` from inside the first fetch.
    pub fn cancelling(mut self, token: CancellationToken) -> Self {
        self.cancel_on_fetch = Some(token);
        self
    }

    pub fn serve(self, url: &str, body: impl Into<String>) -> Self {
        self.set(url, body);
        self
    }

    pub fn set(&self, url: &str, body: impl Into<String>) {
        let url = Url::parse(url).unwrap().to_string();
        self.bodies.lock().unwrap().insert(url, body.into());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for StubFetcher {
    async fn fetch(&self, url: &Url) -> Result<RawFeed> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(token) = &self.cancel_on_fetch {
            token.cancel();
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        let body = self.bodies.lock().unwrap().get(url.as_str()).cloned();
        body.map(RawFeed::new)
            .ok_or_else(|| FreshetError::Fetch(format!("404 for {}", url)))
    }
}

/// Build an RSS 2.0 document from `(title, link)` pairs.
pub fn rss(title: &str, items: &[(&str, &str)]) -> String {
    let mut out = format!(
        "<?xml version=\"1.0\"?><rss version=\"2.0\"><channel><title>{}</title><link>https://example.com/</link>",
        title
    );
    for (item_title, link) in items {
        out.push_str(&format!(
            "<item><title>{}</title><link>{}</link><guid>{}</guid></item>",
            item_title, link, link
        ));
    }
    out.push_str("</channel></rss>");
    out
}

/// Skips every feed at the given stage.
pub struct SkipAt(pub Stage);

impl Plugin for SkipAt {
    fn name(&self) -> &str {
        "skip_at"
    }

    fn stages(&self) -> Vec<Stage> {
        vec![self.0]
    }

    fn pre_feed_download(&self, _ctx: &mut FeedContext<'_>) -> HookResult {
        Ok(Flow::Skip)
    }

    fn post_feed_download(&self, _ctx: &mut FeedContext<'_>) -> HookResult {
        Ok(Flow::Skip)
    }

    fn post_feed_parse(&self, _ctx: &mut FeedContext<'_>) -> HookResult {
        Ok(Flow::Skip)
    }

    fn pre_feed_output(&self, _ctx: &mut FeedContext<'_>) -> HookResult {
        Ok(Flow::Skip)
    }
}

/// Skips one feed after download, by URL substring.
pub struct SkipFeed(pub &'static str);

impl Plugin for SkipFeed {
    fn name(&self) -> &str {
        "skip_feed"
    }

    fn stages(&self) -> Vec<Stage> {
        vec![Stage::PostFeedDownload]
    }

    fn post_feed_download(&self, ctx: &mut FeedContext<'_>) -> HookResult {
        if ctx.feed.id.as_str().contains(self.0) {
            Ok(Flow::Skip)
        } else {
            Ok(Flow::Continue)
        }
    }
}

/// Drops items whose title matches.
pub struct DropTitle(pub &'static str);

impl Plugin for DropTitle {
    fn name(&self) -> &str {
        "drop_title"
    }

    fn stages(&self) -> Vec<Stage> {
        vec![Stage::PostFeedProcess]
    }

    fn post_feed_process(&self, ctx: &mut ItemContext<'_>) -> HookResult<ItemVerdict> {
        if ctx.item.title.as_deref() == Some(self.0) {
            Ok(ItemVerdict::Drop)
        } else {
            Ok(ItemVerdict::Keep)
        }
    }
}

pub fn arc<P: Plugin + 'static>(plugin: P) -> Arc<dyn Plugin> {
    Arc::new(plugin)
}
