use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::app::{AppContext, FreshetError, Result, RunOptions};
use crate::cache::CacheEntry;
use crate::cli::OutputArg;
use crate::config::OutputConfig;
use crate::domain::{FeedSource, SortBy, SECONDS_PER_DAY};

/// Command-line overrides for `run`.
#[derive(Debug, Clone, Default)]
pub struct RunOverrides {
    pub workers: Option<usize>,
    pub deadline_secs: Option<u64>,
    pub no_cache_update: bool,
    pub output: Option<OutputArg>,
}

impl RunOverrides {
    pub fn apply(&self, mut options: RunOptions) -> RunOptions {
        if let Some(workers) = self.workers {
            options.workers = workers.max(1);
        }
        if let Some(secs) = self.deadline_secs {
            options.deadline = (secs > 0).then(|| std::time::Duration::from_secs(secs));
        }
        if self.no_cache_update {
            options.no_cache_update = true;
        }
        if let Some(format) = self.output {
            options.outputs = vec![OutputConfig {
                format: format.into(),
                path: None,
            }];
        }
        options
    }
}

/// Run the pipeline once. With no feeds configured the run still happens,
/// so entries of removed feeds are pruned from the cache.
pub async fn run(ctx: &AppContext, overrides: &RunOverrides, token: CancellationToken) -> Result<()> {
    if ctx.feeds.is_empty() {
        tracing::warn!("No feeds configured");
    }

    let options = overrides.apply(RunOptions::from_config(&ctx.config));
    let summary = ctx.run(&options, token).await;

    for line in summary.status_lines() {
        eprintln!("  {}", line);
    }
    let counts = summary.report.counts();
    eprintln!(
        "Run complete: {} new items, {} failed, {} skipped, {} cancelled",
        counts.new_items, counts.failed, counts.skipped, counts.cancelled
    );

    summary.into_result().map(|_| ())
}

pub fn list_feeds(ctx: &AppContext) -> Result<()> {
    if ctx.feeds.is_empty() {
        println!("No feeds");
        return Ok(());
    }

    for feed in &ctx.feeds {
        println!("{}", feed_line(feed));
    }
    Ok(())
}

fn feed_line(feed: &FeedSource) -> String {
    let mut flags = Vec::new();
    if !feed.enabled {
        flags.push("disabled".to_string());
    }
    match feed.sort_by {
        SortBy::None => {}
        SortBy::Time => flags.push("sort=time".to_string()),
        SortBy::Title => flags.push("sort=title".to_string()),
    }
    if feed.ignore_duplicate_titles {
        flags.push("dedup=title".to_string());
    }

    let days = feed.ttl.num_seconds() / SECONDS_PER_DAY;
    let mut line = format!("{}\n  ttl {}d", feed.display_title(None), days);
    if !flags.is_empty() {
        line.push_str(&format!(", {}", flags.join(", ")));
    }
    if feed.title_override.is_some() {
        line.push_str(&format!("\n  {}", feed.id));
    }
    line
}

#[derive(Serialize)]
struct CacheRow<'a> {
    feed: &'a str,
    identity: &'a str,
    first_seen: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    ttl_secs: i64,
}

impl<'a> From<&'a CacheEntry> for CacheRow<'a> {
    fn from(entry: &'a CacheEntry) -> Self {
        Self {
            feed: entry.key.feed_id.as_str(),
            identity: &entry.key.identity,
            first_seen: entry.first_seen,
            expires_at: entry.expires_at(),
            ttl_secs: entry.ttl.num_seconds(),
        }
    }
}

pub fn list_cache(ctx: &AppContext, json: bool) -> Result<()> {
    let entries = ctx.load_cache().entries();

    if json {
        let rows: Vec<CacheRow<'_>> = entries.iter().map(CacheRow::from).collect();
        let body = serde_json::to_string_pretty(&rows)
            .map_err(|e| FreshetError::Render(e.to_string()))?;
        println!("{}", body);
        return Ok(());
    }

    if entries.is_empty() {
        println!("Cache is empty");
        return Ok(());
    }

    for entry in &entries {
        println!(
            "{}  {}  {}",
            entry.expires_at().format("%Y-%m-%d %H:%M"),
            entry.key.feed_id,
            entry.key.identity
        );
    }
    println!("{} entries", entries.len());
    Ok(())
}

pub fn prune_cache(ctx: &AppContext) -> Result<()> {
    let (stats, kept) = ctx.prune_cache(Utc::now())?;
    println!(
        "Pruned {} entries ({} expired, {} orphaned, {} future-dated), {} kept",
        stats.total(),
        stats.expired,
        stats.orphaned,
        stats.future,
        kept
    );
    Ok(())
}
