use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Semaphore;

use crate::app::FreshetError;
use crate::domain::FeedSource;
use crate::worker::{FeedOutcome, FeedResult, FeedWorker, RunContext, SkipReason};

pub use crate::config::DEFAULT_WORKERS;

/// What happened to one configured feed during a run.
#[derive(Debug)]
pub struct FeedReport {
    pub feed: Arc<FeedSource>,
    pub outcome: FeedOutcome,
}

/// Per-feed outcomes of a run, in configuration order.
#[derive(Debug, Default)]
pub struct RunReport {
    pub feeds: Vec<FeedReport>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunCounts {
    pub done: usize,
    pub skipped: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub new_items: usize,
}

impl RunReport {
    /// Results of the feeds that completed.
    pub fn results(&self) -> Vec<FeedResult> {
        self.feeds
            .iter()
            .filter_map(|r| match &r.outcome {
                FeedOutcome::Done(result) => Some(result.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn counts(&self) -> RunCounts {
        let mut counts = RunCounts::default();
        for report in &self.feeds {
            match &report.outcome {
                FeedOutcome::Done(result) => {
                    counts.done += 1;
                    counts.new_items += result.items.len();
                }
                FeedOutcome::Skipped(_) => counts.skipped += 1,
                FeedOutcome::Failed(_) => counts.failed += 1,
                FeedOutcome::Cancelled => counts.cancelled += 1,
            }
        }
        counts
    }

    /// True when at least one feed was dispatched and every dispatched
    /// feed failed. Disabled feeds are never dispatched.
    pub fn nothing_processed(&self) -> bool {
        let mut dispatched = self
            .feeds
            .iter()
            .filter(|r| !matches!(r.outcome, FeedOutcome::Skipped(SkipReason::Disabled)))
            .peekable();
        dispatched.peek().is_some() && dispatched.all(|r| r.outcome.is_failed())
    }
}

/// Runs feeds through a [`FeedWorker`] with at most `workers` feeds in
/// flight at once.
pub struct Scheduler {
    worker: Arc<FeedWorker>,
    workers: usize,
}

impl Scheduler {
    pub fn new(worker: Arc<FeedWorker>) -> Self {
        Self::with_workers(worker, DEFAULT_WORKERS)
    }

    pub fn with_workers(worker: Arc<FeedWorker>, workers: usize) -> Self {
        Self {
            worker,
            workers: workers.max(1),
        }
    }

    /// Process every feed once and wait for all of them.
    ///
    /// Feeds start in order as permits free up. Once `run.token` is
    /// cancelled, feeds still waiting for a permit are reported
    /// [`FeedOutcome::Cancelled`] without being started.
    pub async fn run_once(&self, feeds: &[Arc<FeedSource>], run: Arc<RunContext>) -> RunReport {
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut handles = Vec::with_capacity(feeds.len());

        for feed in feeds {
            if !feed.enabled {
                handles.push((feed.clone(), None));
                continue;
            }

            let worker = self.worker.clone();
            let semaphore = semaphore.clone();
            let run = run.clone();
            let task_feed = feed.clone();

            let handle = tokio::spawn(async move {
                let _permit = tokio::select! {
                    biased;
                    _ = run.token.cancelled() => return FeedOutcome::Cancelled,
                    permit = semaphore.acquire_owned() => match permit {
                        Ok(p) => p,
                        Err(_) => return FeedOutcome::Cancelled,
                    },
                };
                worker.process(task_feed, &run).await
            });

            handles.push((feed.clone(), Some(handle)));
        }

        let outcomes = join_all(handles.into_iter().map(|(feed, handle)| async move {
            let outcome = match handle {
                None => FeedOutcome::Skipped(SkipReason::Disabled),
                Some(handle) => match handle.await {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        tracing::error!("Task join error for {}: {}", feed.id, e);
                        FeedOutcome::Failed(FreshetError::Other(format!(
                            "worker task ended abnormally: {}",
                            e
                        )))
                    }
                },
            };
            FeedReport { feed, outcome }
        }))
        .await;

        RunReport { feeds: outcomes }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use chrono::{TimeZone, Utc};
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::cache::ItemCache;
    use crate::hooks::{HookChain, Plugin};
    use crate::normalizer::Normalizer;
    use crate::plugins::PluginData;
    use crate::testutil::{arc, rss, DropTitle, SkipFeed, StubFetcher};

    fn feeds(urls: &[&str]) -> Vec<Arc<FeedSource>> {
        urls.iter()
            .map(|u| Arc::new(FeedSource::new(u, 1).unwrap()))
            .collect()
    }

    fn scheduler(
        fetcher: Arc<StubFetcher>,
        plugins: Vec<Arc<dyn Plugin>>,
        workers: usize,
    ) -> Scheduler {
        let worker = FeedWorker::new(
            fetcher,
            Arc::new(Normalizer::new()),
            Arc::new(HookChain::from_plugins(plugins)),
        );
        Scheduler::with_workers(Arc::new(worker), workers)
    }

    fn run(cache: &Arc<ItemCache>) -> Arc<RunContext> {
        Arc::new(RunContext::new(
            Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(),
            cache.clone(),
            Arc::new(PluginData::new()),
        ))
    }

    fn fetcher_for(urls: &[&str]) -> StubFetcher {
        urls.iter().fold(StubFetcher::new(), |f, url| {
            let link = format!("{}/item", url);
            f.serve(url, rss(url, &[("Item", link.as_str()), ("Other", "https://other.example/x")]))
        })
    }

    #[tokio::test]
    async fn test_pool_bounds_concurrency() {
        let urls: Vec<String> = (0..12).map(|i| format!("https://example.com/f{}", i)).collect();
        let refs: Vec<&str> = urls.iter().map(String::as_str).collect();
        let fetcher = Arc::new(fetcher_for(&refs).with_delay(Duration::from_millis(20)));
        let cache = Arc::new(ItemCache::new());

        let report = scheduler(fetcher.clone(), vec![], 3)
            .run_once(&feeds(&refs), run(&cache))
            .await;

        assert_eq!(report.counts().done, 12);
        assert!(fetcher.max_in_flight.load(Ordering::SeqCst) <= 3);
        assert_eq!(fetcher.calls(), 12);
    }

    #[tokio::test]
    async fn test_short_circuit_one_feed_others_complete() {
        let urls = ["https://example.com/a", "https://example.com/skipme", "https://example.com/c"];
        let fetcher = Arc::new(fetcher_for(&urls));
        let cache = Arc::new(ItemCache::new());

        let report = scheduler(fetcher, vec![arc(SkipFeed("skipme"))], 2)
            .run_once(&feeds(&urls), run(&cache))
            .await;

        assert!(matches!(report.feeds[0].outcome, FeedOutcome::Done(_)));
        assert!(matches!(report.feeds[1].outcome, FeedOutcome::Skipped(_)));
        assert!(matches!(report.feeds[2].outcome, FeedOutcome::Done(_)));
        assert_eq!(report.results().len(), 2);
        // Two items per completed feed, none from the skipped one.
        assert_eq!(cache.len(), 4);
        assert!(cache
            .entries()
            .iter()
            .all(|e| !e.key.feed_id.as_str().contains("skipme")));
    }

    #[tokio::test]
    async fn test_item_drop_only_affects_that_item() {
        let urls = ["https://example.com/a", "https://example.com/b"];
        let fetcher = Arc::new(fetcher_for(&urls));
        let cache = Arc::new(ItemCache::new());

        let report = scheduler(fetcher, vec![arc(DropTitle("Other"))], 2)
            .run_once(&feeds(&urls), run(&cache))
            .await;

        for result in report.results() {
            let titles: Vec<_> = result.items.iter().map(|i| i.display_title()).collect();
            assert_eq!(titles, vec!["Item"]);
        }
        assert_eq!(report.counts().new_items, 2);
    }

    #[tokio::test]
    async fn test_failures_recorded_run_continues() {
        let urls = ["https://example.com/a", "https://example.com/missing"];
        let fetcher = Arc::new(fetcher_for(&urls[..1]));
        let cache = Arc::new(ItemCache::new());

        let report = scheduler(fetcher, vec![], 2)
            .run_once(&feeds(&urls), run(&cache))
            .await;

        let counts = report.counts();
        assert_eq!(counts.done, 1);
        assert_eq!(counts.failed, 1);
        assert!(!report.nothing_processed());
    }

    #[tokio::test]
    async fn test_all_failed_is_nothing_processed() {
        let urls = ["https://example.com/a", "https://example.com/b"];
        let fetcher = Arc::new(StubFetcher::new());
        let cache = Arc::new(ItemCache::new());

        let report = scheduler(fetcher, vec![], 2)
            .run_once(&feeds(&urls), run(&cache))
            .await;
        assert!(report.nothing_processed());
    }

    #[tokio::test]
    async fn test_disabled_feed_reported_skipped_not_fetched() {
        let urls = ["https://example.com/a", "https://example.com/off"];
        let fetcher = Arc::new(fetcher_for(&urls));
        let cache = Arc::new(ItemCache::new());
        let mut list = feeds(&urls);
        Arc::make_mut(&mut list[1]).enabled = false;

        let report = scheduler(fetcher.clone(), vec![], 2)
            .run_once(&list, run(&cache))
            .await;

        assert!(matches!(
            report.feeds[1].outcome,
            FeedOutcome::Skipped(SkipReason::Disabled)
        ));
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_cancellation_abandons_pending_feeds() {
        let urls = ["https://example.com/a", "https://example.com/b", "https://example.com/c"];
        let token = CancellationToken::new();
        let fetcher = Arc::new(
            fetcher_for(&urls)
                .with_delay(Duration::from_millis(10))
                .cancelling(token.clone()),
        );
        let cache = Arc::new(ItemCache::new());
        let ctx = Arc::new(
            RunContext::new(Utc::now(), cache.clone(), Arc::new(PluginData::new()))
                .with_token(token),
        );

        let report = scheduler(fetcher.clone(), vec![], 1)
            .run_once(&feeds(&urls), ctx)
            .await;

        let counts = report.counts();
        assert_eq!(counts.cancelled, 3);
        assert_eq!(counts.failed, 0);
        assert_eq!(fetcher.calls(), 1);
        assert!(cache.is_empty());
        assert!(!report.nothing_processed());
    }

    #[test]
    fn test_no_feeds() {
        let cache = Arc::new(ItemCache::new());
        let sched = scheduler(Arc::new(StubFetcher::new()), vec![], 2);
        let report = tokio_test::block_on(sched.run_once(&[], run(&cache)));

        assert!(report.feeds.is_empty());
        assert!(!report.nothing_processed());
        assert_eq!(report.counts(), RunCounts::default());
    }
}
