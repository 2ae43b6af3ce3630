//! # Freshet
//!
//! Fetches a set of feeds, works out which items have not been seen in an
//! earlier run, and hands only those to the configured outputs.
//!
//! ## Architecture
//!
//! ```text
//! Scheduler → FeedWorker ─┬→ Fetcher → FeedParser
//!                         ├→ HookChain (plugins, per stage)
//!                         └→ ItemCache (novelty, TTL) ⇄ Store
//!           → Renderers → PostOutput hooks → Store
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! # List configured feeds
//! freshet feeds
//!
//! # Fetch everything once and print what is new
//! freshet run
//!
//! # Same, as JSON, giving up after a minute
//! freshet run --output json --deadline 60
//!
//! # Inspect the cache
//! freshet cache list
//! ```

/// Application context, run pipeline and error types.
///
/// [`AppContext`](app::AppContext) wires configuration, store, fetcher,
/// parser and plugins together; [`AppContext::run`](app::AppContext::run)
/// performs one complete run.
pub mod app;

/// The persistent "seen items" cache.
pub mod cache;

/// Command-line interface using clap.
///
/// - `run` - process every feed once
/// - `feeds` - list configured feeds
/// - `cache list [--json]` / `cache prune` - cache maintenance
pub mod cli;

/// Configuration management.
///
/// Loads from `~/.config/freshet/config.toml`.
pub mod config;

/// Core domain models.
///
/// - [`FeedSource`](domain::FeedSource): a configured feed and its policies
/// - [`Item`](domain::Item): one entry of a feed for the current run
pub mod domain;

/// Fetching raw feeds over HTTP(S) or from `file://` URLs.
pub mod fetcher;

/// Pipeline stages and the ordered plugin chain.
pub mod hooks;

/// Feed parsing.
///
/// Converts RSS 0.9x/1.0/2.0, Atom 0.3/1.0, and JSON Feed 1.0
/// into [`Item`](domain::Item) lists.
pub mod normalizer;

/// Built-in plugins and per-plugin persistent data.
pub mod plugins;

/// Output renderers (plain text, JSON).
pub mod render;

/// Bounded worker pool running every feed of a run.
pub mod scheduler;

/// SQLite persistence for the cache and plugin data.
///
/// - [`Store`](store::Store): whole-collection load/save
/// - [`SqliteStore`](store::SqliteStore): SQLite implementation
pub mod store;

/// Processing of a single feed.
pub mod worker;

#[cfg(test)]
mod testutil;
