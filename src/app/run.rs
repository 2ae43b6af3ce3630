use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::app::{AppContext, FreshetError, Result};
use crate::cache::PruneStats;
use crate::config::{Config, OutputConfig};
use crate::hooks::OutputContext;
use crate::render::{renderer_for, Artifact};
use crate::scheduler::{RunReport, Scheduler};
use crate::worker::{FeedOutcome, RunContext};

/// Knobs of a single run, defaulted from the configuration and
/// overridable from the command line.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub workers: usize,
    pub deadline: Option<Duration>,
    pub no_cache_update: bool,
    pub outputs: Vec<OutputConfig>,
}

impl RunOptions {
    pub fn from_config(config: &Config) -> Self {
        let outputs = if config.outputs.is_empty() {
            vec![OutputConfig::default()]
        } else {
            config.outputs.clone()
        };
        Self {
            workers: config.defaults.workers,
            deadline: config.deadline(),
            no_cache_update: config.defaults.no_cache_update,
            outputs,
        }
    }
}

/// Everything a run produced. Run-level failures are collected in
/// `errors` so the per-feed report survives them.
#[derive(Debug)]
pub struct RunSummary {
    pub report: RunReport,
    pub artifacts: Vec<Artifact>,
    pub pruned: PruneStats,
    /// Number of cache entries written, `None` when saving was disabled or failed.
    pub saved: Option<usize>,
    pub errors: Vec<FreshetError>,
}

impl RunSummary {
    /// Fail with the first run-level error, if any.
    pub fn into_result(mut self) -> Result<Self> {
        if self.errors.is_empty() {
            Ok(self)
        } else {
            Err(self.errors.remove(0))
        }
    }

    /// One status line per feed, for the terminal.
    pub fn status_lines(&self) -> Vec<String> {
        self.report
            .feeds
            .iter()
            .map(|r| {
                let detail = match &r.outcome {
                    FeedOutcome::Done(result) => format!("{} new", result.items.len()),
                    FeedOutcome::Skipped(reason) => reason.to_string(),
                    FeedOutcome::Failed(e) => e.to_string(),
                    FeedOutcome::Cancelled => String::new(),
                };
                format!("{:<9} {} {}", r.outcome.label(), r.feed.id, detail)
                    .trim_end()
                    .to_string()
            })
            .collect()
    }
}

impl AppContext {
    pub async fn run(&self, options: &RunOptions, token: CancellationToken) -> RunSummary {
        self.run_at(Utc::now(), options, token).await
    }

    /// One pipeline run as of `now`:
    /// load, prune, schedule, render, post-output hooks, prune, save.
    ///
    /// Cache persistence happens last, so a failing store never
    /// suppresses output that was already written.
    pub async fn run_at(
        &self,
        now: DateTime<Utc>,
        options: &RunOptions,
        token: CancellationToken,
    ) -> RunSummary {
        let mut errors = Vec::new();

        let cache = Arc::new(self.load_cache());
        let data = Arc::new(self.load_plugin_data());
        let live = self.live_feed_ids();
        let pruned = cache.prune(now, &live);

        let deadline = options.deadline.map(|d| spawn_deadline(d, token.clone()));
        let run = Arc::new(RunContext::new(now, cache.clone(), data.clone()).with_token(token));
        let scheduler = Scheduler::with_workers(Arc::new(self.worker()), options.workers);

        tracing::info!(
            "Processing {} feeds with {} workers",
            self.feeds.len(),
            options.workers
        );
        let report = scheduler.run_once(&self.feeds, run).await;
        if let Some(handle) = deadline {
            handle.abort();
        }

        let counts = report.counts();
        tracing::info!(
            "{} done, {} skipped, {} failed, {} cancelled; {} new items",
            counts.done,
            counts.skipped,
            counts.failed,
            counts.cancelled,
            counts.new_items
        );

        let results = report.results();
        let mut artifacts = Vec::with_capacity(options.outputs.len());
        for output in &options.outputs {
            let rendered = renderer_for(output, &self.config)
                .render(&results)
                .and_then(|artifact| {
                    artifact.write_to(output.path.as_deref())?;
                    Ok(artifact)
                });
            match rendered {
                Ok(artifact) => artifacts.push(artifact),
                Err(e) => {
                    tracing::error!("Output failed: {}", e);
                    errors.push(e);
                }
            }
        }

        // Failures here are reported by the chain and do not fail the run.
        self.hooks.dispatch_post_output(&OutputContext {
            now,
            data: data.as_ref(),
            results: &results,
            artifacts: &artifacts,
        });

        let saved = if options.no_cache_update {
            tracing::info!("Cache update disabled, nothing saved");
            None
        } else {
            cache.prune(now, &live);
            match self.save(&cache, &data) {
                Ok(n) => Some(n),
                Err(e) => {
                    tracing::error!("Could not save item cache: {}", e);
                    errors.push(e);
                    None
                }
            }
        };

        if report.nothing_processed() {
            tracing::error!("Every feed failed");
            errors.push(FreshetError::NoFeedsProcessed);
        }

        RunSummary {
            report,
            artifacts,
            pruned,
            saved,
            errors,
        }
    }

    /// Load the cache, prune it against the configured feeds and save it.
    pub fn prune_cache(&self, now: DateTime<Utc>) -> Result<(PruneStats, usize)> {
        let cache = self.load_cache();
        let data = self.load_plugin_data();
        let stats = cache.prune(now, &self.live_feed_ids());
        let kept = self.save(&cache, &data)?;
        Ok((stats, kept))
    }
}

fn spawn_deadline(after: Duration, token: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(after).await;
        tracing::warn!("Deadline of {:?} reached, cancelling run", after);
        token.cancel();
    })
}
