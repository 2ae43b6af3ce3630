use std::collections::HashSet;
use std::sync::Arc;

use crate::app::error::{FreshetError, Result};
use crate::cache::ItemCache;
use crate::config::Config;
use crate::domain::{FeedId, FeedSource};
use crate::fetcher::http_fetcher::HttpFetcher;
use crate::fetcher::Fetcher;
use crate::hooks::{HookChain, Plugin};
use crate::normalizer::{FeedParser, Normalizer};
use crate::plugins::{builtin_plugins, PluginData};
use crate::store::sqlite::SqliteStore;
use crate::store::Store;
use crate::worker::FeedWorker;

pub type SharedStore = Arc<dyn Store + Send + Sync>;

/// Everything a run needs, wired from the configuration.
pub struct AppContext {
    pub config: Config,
    pub feeds: Vec<Arc<FeedSource>>,
    /// `None` when the cache database could not be opened.
    pub store: Option<SharedStore>,
    pub fetcher: Arc<dyn Fetcher + Send + Sync>,
    pub parser: Arc<dyn FeedParser + Send + Sync>,
    pub hooks: Arc<HookChain>,
}

impl AppContext {
    pub fn new(config: Config) -> Result<Self> {
        let store = Self::open_store(&config);
        let fetcher: Arc<dyn Fetcher + Send + Sync> = Arc::new(HttpFetcher::new()?);
        Self::with_parts(config, store, fetcher)
    }

    /// Build a context around an explicit store and fetcher.
    pub fn with_parts(
        config: Config,
        store: Option<SharedStore>,
        fetcher: Arc<dyn Fetcher + Send + Sync>,
    ) -> Result<Self> {
        config.validate()?;
        let feeds = config
            .feed_sources()?
            .into_iter()
            .map(Arc::new)
            .collect();
        let hooks = HookChain::from_plugins(builtin_plugins(&config));

        Ok(Self {
            config,
            feeds,
            store,
            fetcher,
            parser: Arc::new(Normalizer::new()),
            hooks: Arc::new(hooks),
        })
    }

    pub fn in_memory(config: Config, fetcher: Arc<dyn Fetcher + Send + Sync>) -> Result<Self> {
        let store: SharedStore = Arc::new(SqliteStore::in_memory()?);
        Self::with_parts(config, Some(store), fetcher)
    }

    /// Register an extra plugin next to the built-in ones.
    pub fn register(&mut self, plugin: Arc<dyn Plugin>) {
        Arc::make_mut(&mut self.hooks).register(plugin);
    }

    /// Opening the cache is allowed to fail: the run proceeds with an empty
    /// cache and the failure surfaces when the cache is saved.
    fn open_store(config: &Config) -> Option<SharedStore> {
        let opened = config
            .cache_path()
            .map_err(FreshetError::from)
            .and_then(|path| {
                tracing::debug!("Opening cache at {}", path.display());
                SqliteStore::new(&path)
            });

        match opened {
            Ok(store) => Some(Arc::new(store)),
            Err(e) => {
                tracing::warn!("Could not open item cache, continuing without it: {}", e);
                None
            }
        }
    }

    /// Ids of every configured feed, disabled ones included.
    pub fn live_feed_ids(&self) -> HashSet<FeedId> {
        self.feeds.iter().map(|f| f.id.clone()).collect()
    }

    pub fn worker(&self) -> FeedWorker {
        FeedWorker::new(
            self.fetcher.clone(),
            self.parser.clone(),
            self.hooks.clone(),
        )
    }

    pub fn load_cache(&self) -> ItemCache {
        match &self.store {
            Some(store) => ItemCache::load(store.as_ref()),
            None => ItemCache::new(),
        }
    }

    pub fn load_plugin_data(&self) -> PluginData {
        match &self.store {
            Some(store) => PluginData::load(store.as_ref()),
            None => PluginData::new(),
        }
    }

    /// Persist the cache and the plugin data. Any failure is a
    /// [`FreshetError::CacheIo`].
    pub fn save(&self, cache: &ItemCache, data: &PluginData) -> Result<usize> {
        let store = self
            .store
            .as_ref()
            .ok_or_else(|| FreshetError::CacheIo("cache store is not available".into()))?;

        let entries = cache.entries();
        store
            .save_all(&entries, &data.rows())
            .map_err(as_cache_io)?;
        tracing::debug!("Saved {} cache entries", entries.len());
        Ok(entries.len())
    }
}

fn as_cache_io(e: FreshetError) -> FreshetError {
    match e {
        FreshetError::CacheIo(_) => e,
        other => FreshetError::CacheIo(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::config::FeedConfig;
    use crate::hooks::Stage;
    use crate::testutil::StubFetcher;

    fn config(urls: &[&str]) -> Config {
        let mut config = Config::default();
        config.feeds = urls.iter().map(|u| FeedConfig::new(*u)).collect();
        config
    }

    #[test]
    fn test_builtin_plugins_registered() {
        let ctx = AppContext::in_memory(config(&[]), Arc::new(StubFetcher::new())).unwrap();
        let names: Vec<_> = ctx
            .hooks
            .registrations(Stage::PostFeedProcess)
            .iter()
            .map(|r| r.name.as_str())
            .collect();
        assert_eq!(names, vec!["show_authors"]);
        assert_eq!(ctx.hooks.registrations(Stage::PostFeedDownload).len(), 2);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = AppContext::in_memory(config(&["nope"]), Arc::new(StubFetcher::new()));
        assert!(matches!(result, Err(FreshetError::Config(_))));
    }

    #[test]
    fn test_live_ids_include_disabled_feeds() {
        let mut cfg = config(&["https://example.com/a", "https://example.com/b"]);
        cfg.feeds[1].enabled = false;
        let ctx = AppContext::in_memory(cfg, Arc::new(StubFetcher::new())).unwrap();
        assert_eq!(ctx.live_feed_ids().len(), 2);
    }

    #[test]
    fn test_save_without_store_is_cache_io() {
        let ctx =
            AppContext::with_parts(config(&[]), None, Arc::new(StubFetcher::new())).unwrap();
        let result = ctx.save(&ItemCache::new(), &PluginData::new());
        assert!(matches!(result, Err(FreshetError::CacheIo(_))));
    }

    #[test]
    fn test_save_and_reload() {
        let ctx = AppContext::in_memory(
            config(&["https://example.com/a"]),
            Arc::new(StubFetcher::new()),
        )
        .unwrap();
        let cache = ItemCache::new();
        cache.insert(
            crate::cache::CacheKey::new(ctx.feeds[0].id.clone(), "https://example.com/a/1"),
            Utc::now(),
            ctx.feeds[0].ttl,
        );
        let data = PluginData::new();
        data.set("ns", "k", "v");

        assert_eq!(ctx.save(&cache, &data).unwrap(), 1);
        assert_eq!(ctx.load_cache().len(), 1);
        assert_eq!(ctx.load_plugin_data().get("ns", "k").as_deref(), Some("v"));
    }
}
