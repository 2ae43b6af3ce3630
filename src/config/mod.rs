//! Configuration management.
//!
//! Configuration is read from `~/.config/freshet/config.toml` unless a path
//! is given. If the default file doesn't exist, one with comments is created.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::domain::{FeedId, FeedSource, SortBy};

pub const DEFAULT_WORKERS: usize = 5;
pub const DEFAULT_TTL_DAYS: u32 = 30;
/// Longest retention accepted, about a century.
pub const MAX_TTL_DAYS: u32 = 36_500;

/// Main configuration struct.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub defaults: Defaults,
    pub feeds: Vec<FeedConfig>,
    pub outputs: Vec<OutputConfig>,
}

/// Global settings and per-feed fallbacks.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Defaults {
    /// Maximum number of feeds processed concurrently.
    pub workers: usize,
    /// Days an item stays in the cache after it was first seen.
    pub ttl_days: u32,
    /// SQLite cache file (default: `<data_dir>/freshet/cache.db`).
    pub cache_path: Option<PathBuf>,
    pub show_authors: bool,
    pub show_dates: bool,
    pub summary_only: bool,
    pub prune_urls: bool,
    pub sort_by: SortBy,
    /// Cancel the run after this many seconds (0 = never).
    pub deadline_secs: u64,
    /// Run without persisting the cache.
    pub no_cache_update: bool,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            ttl_days: DEFAULT_TTL_DAYS,
            cache_path: None,
            show_authors: false,
            show_dates: false,
            summary_only: false,
            prune_urls: false,
            sort_by: SortBy::None,
            deadline_secs: 0,
            no_cache_update: false,
        }
    }
}

/// One `[[feeds]]` table.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    pub url: String,
    pub ttl_days: Option<u32>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub sort_by: Option<SortBy>,
    #[serde(default)]
    pub ignore_duplicate_titles: bool,
    /// Replaces the title announced by the feed.
    pub title: Option<String>,
    pub show_authors: Option<bool>,
    pub summary_only: Option<bool>,
    pub prune_urls: Option<bool>,
    /// Copy the raw downloaded feed to this file.
    pub save_as: Option<PathBuf>,
    /// Only save the raw feed; do not process it further.
    #[serde(default)]
    pub save_only: bool,
    /// Regex substitutions applied to the raw feed before parsing, in order.
    #[serde(default)]
    pub edits: Vec<EditConfig>,
    /// Copy the edited raw feed to this file.
    pub save_edited_as: Option<PathBuf>,
}

/// One `[[feeds.edits]]` table: replace every match of `pattern` with
/// `replace` (`$1`, `${name}` refer to capture groups).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EditConfig {
    pub pattern: String,
    #[serde(default)]
    pub replace: String,
}

fn default_enabled() -> bool {
    true
}

impl FeedConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ttl_days: None,
            enabled: true,
            sort_by: None,
            ignore_duplicate_titles: false,
            title: None,
            show_authors: None,
            summary_only: None,
            prune_urls: None,
            save_as: None,
            save_only: false,
            edits: Vec::new(),
            save_edited_as: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// One `[[outputs]]` table.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub format: OutputFormat,
    /// Destination file; standard output when absent.
    pub path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from `path`, or from the default path.
    ///
    /// An explicit path must exist. A missing default file is created with
    /// comments and the defaults are returned.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => {
                let default_path = Self::default_config_path()?;
                if !default_path.exists() {
                    Self::create_default_config(&default_path)?;
                    return Ok(Self::default());
                }
                default_path
            }
        };

        let content = fs::read_to_string(&config_path).map_err(|e| ConfigError::Io {
            path: config_path.clone(),
            source: e,
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: config_path,
            source: e,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Get the default config file path: `~/.config/freshet/config.toml`
    pub fn default_config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(config_dir.join("freshet").join("config.toml"))
    }

    pub fn cache_path(&self) -> Result<PathBuf, ConfigError> {
        if let Some(ref path) = self.defaults.cache_path {
            return Ok(path.clone());
        }
        let data_dir = dirs::data_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(data_dir.join("freshet").join("cache.db"))
    }

    pub fn deadline(&self) -> Option<Duration> {
        match self.defaults.deadline_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// Check everything that can be checked before a run starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.defaults.workers == 0 {
            return Err(ConfigError::InvalidWorkers);
        }
        if self.defaults.ttl_days > MAX_TTL_DAYS {
            return Err(ConfigError::TtlOutOfRange {
                scope: "defaults".into(),
                days: self.defaults.ttl_days,
            });
        }
        for fc in &self.feeds {
            for edit in &fc.edits {
                regex::bytes::Regex::new(&edit.pattern).map_err(|e| ConfigError::InvalidEdit {
                    url: fc.url.clone(),
                    source: e,
                })?;
            }
        }
        self.feed_sources().map(|_| ())
    }

    /// Build the canonical feed list, in configuration order.
    pub fn feed_sources(&self) -> Result<Vec<FeedSource>, ConfigError> {
        let mut seen = HashSet::new();
        let mut sources = Vec::with_capacity(self.feeds.len());

        for fc in &self.feeds {
            let ttl_days = fc.ttl_days.unwrap_or(self.defaults.ttl_days);
            if ttl_days > MAX_TTL_DAYS {
                return Err(ConfigError::TtlOutOfRange {
                    scope: fc.url.clone(),
                    days: ttl_days,
                });
            }
            let mut source = FeedSource::new(&fc.url, ttl_days)
                .map_err(|e| ConfigError::InvalidFeedUrl {
                    url: fc.url.clone(),
                    source: e,
                })?;

            if !seen.insert(source.id.clone()) {
                return Err(ConfigError::DuplicateFeed(source.id.to_string()));
            }
            if fc.save_only && fc.save_as.is_none() {
                return Err(ConfigError::SaveOnlyWithoutSaveAs(fc.url.clone()));
            }

            source.enabled = fc.enabled;
            source.sort_by = fc.sort_by.unwrap_or(self.defaults.sort_by);
            source.ignore_duplicate_titles = fc.ignore_duplicate_titles;
            source.title_override = fc.title.clone();
            sources.push(source);
        }

        Ok(sources)
    }

    /// Per-feed settings keyed by canonical id. Feeds whose URL does not
    /// parse are left out; `validate` reports them.
    pub fn feeds_by_id(&self) -> HashMap<FeedId, &FeedConfig> {
        self.feeds
            .iter()
            .filter_map(|fc| FeedId::parse(&fc.url).ok().map(|id| (id, fc)))
            .collect()
    }

    /// Create a default config file with comments.
    fn create_default_config(path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let mut file = fs::File::create(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        file.write_all(Self::default_config_content().as_bytes())
            .map_err(|e| ConfigError::Io {
                path: path.to_path_buf(),
                source: e,
            })?;

        Ok(())
    }

    /// Generate the default config file content with comments.
    fn default_config_content() -> &'static str {
        r##"# freshet configuration

[defaults]
# Number of feeds fetched and processed at the same time
workers = 5

# Days an item is remembered after it was first seen
ttl_days = 30

# Item cache location (default: <data dir>/freshet/cache.db)
# cache_path = "/path/to/cache.db"

# Keep item authors in the output
show_authors = false

# Print publication dates in text output
show_dates = false

# Show only title, author, link and date of each item
summary_only = false

# Show item links without query strings and fragments
prune_urls = false

# Item order within a feed: "none", "time" or "title"
sort_by = "none"

# Cancel the run after this many seconds (0 = no limit)
deadline_secs = 0

# Process feeds without remembering what was seen
no_cache_update = false

# One [[feeds]] table per feed. Per-feed settings override [defaults].
#
# [[feeds]]
# url = "https://blog.rust-lang.org/feed.xml"
# ttl_days = 7
# enabled = true
# sort_by = "time"
# ignore_duplicate_titles = false
# title = "Rust Blog"
# show_authors = true
# save_as = "/tmp/rust-blog.xml"
# save_only = false
#
# Regex substitutions applied to the downloaded feed before it is parsed
# [[feeds.edits]]
# pattern = "&nbsp;"
# replace = "&#160;"
# save_edited_as = "/tmp/rust-blog-edited.xml"

# Renderers. Without any [[outputs]] table, text goes to standard output.
#
# [[outputs]]
# format = "text"
# path = "/tmp/freshet.txt"
#
# [[outputs]]
# format = "json"
"##
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Failed to read/write config file at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid feed URL \"{url}\": {source}")]
    InvalidFeedUrl {
        url: String,
        source: url::ParseError,
    },

    #[error("Feed {0} is configured more than once")]
    DuplicateFeed(String),

    #[error("Feed {0}: save_only requires save_as")]
    SaveOnlyWithoutSaveAs(String),

    #[error("workers must be at least 1")]
    InvalidWorkers,

    #[error("{scope}: ttl_days {days} is above the limit of {max} days", max = MAX_TTL_DAYS)]
    TtlOutOfRange { scope: String, days: u32 },

    #[error("Feed {url}: invalid edit pattern: {source}")]
    InvalidEdit { url: String, source: regex::Error },
}
