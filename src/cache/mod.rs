//! Persistent "have we seen this item?" cache.
//!
//! Entries are keyed by `(feed, item identity)` and expire `ttl` after they
//! were first seen. The map is sharded ([`DashMap`]) so workers touching
//! unrelated keys do not contend on a single lock.
//!
//! Pruning is a barrier: it runs before the worker pool starts (and again
//! before the cache is persisted), never concurrently with lookups.

use std::collections::HashSet;

use chrono::{DateTime, TimeDelta, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::domain::{FeedId, FeedSource, Item};
use crate::store::Store;

/// Identity of a cached item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey {
    pub feed_id: FeedId,
    /// Normalized item URL, `guid:<id>`, or `title:<sha256>` when the feed
    /// deduplicates by title.
    pub identity: String,
}

impl CacheKey {
    pub fn new(feed_id: FeedId, identity: impl Into<String>) -> Self {
        Self {
            feed_id,
            identity: identity.into(),
        }
    }

    /// Derive the key for `item` under `feed`'s dedup policy.
    ///
    /// Returns `None` for items with no usable identity (no title under
    /// title dedup, and neither link nor guid otherwise).
    pub fn for_item(feed: &FeedSource, item: &Item) -> Option<Self> {
        if feed.ignore_duplicate_titles {
            if let Some(hash) = item.title_hash() {
                return Some(Self::new(feed.id.clone(), format!("title:{}", hash)));
            }
        }

        if let Some(link) = item.normalized_link() {
            return Some(Self::new(feed.id.clone(), link));
        }

        let guid = item.guid.trim();
        if guid.is_empty() {
            None
        } else {
            Some(Self::new(feed.id.clone(), format!("guid:{}", guid)))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub first_seen: DateTime<Utc>,
    /// Retention window of the owning feed at insert time.
    pub ttl: TimeDelta,
}

impl CacheEntry {
    pub fn expires_at(&self) -> DateTime<Utc> {
        expiry(self.first_seen, self.ttl)
    }

    /// Live while `first_seen <= now <= first_seen + ttl`.
    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        self.first_seen <= now && now <= self.expires_at()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PruneStats {
    pub expired: usize,
    pub orphaned: usize,
    pub future: usize,
}

impl PruneStats {
    pub fn total(&self) -> usize {
        self.expired + self.orphaned + self.future
    }
}

#[derive(Debug, Clone, Copy)]
struct Stamp {
    first_seen: DateTime<Utc>,
    ttl: TimeDelta,
}

impl Stamp {
    fn expires_at(&self) -> DateTime<Utc> {
        expiry(self.first_seen, self.ttl)
    }

    fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        self.first_seen <= now && now <= self.expires_at()
    }
}

/// `first_seen + ttl`, saturating at the largest representable time.
fn expiry(first_seen: DateTime<Utc>, ttl: TimeDelta) -> DateTime<Utc> {
    first_seen
        .checked_add_signed(ttl)
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[derive(Debug, Default)]
pub struct ItemCache {
    entries: DashMap<CacheKey, Stamp>,
}

impl ItemCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: impl IntoIterator<Item = CacheEntry>) -> Self {
        let cache = Self::new();
        for entry in entries {
            cache.entries.insert(
                entry.key,
                Stamp {
                    first_seen: entry.first_seen,
                    ttl: entry.ttl,
                },
            );
        }
        cache
    }

    /// Load the cache from `store`. A failing store yields an empty cache;
    /// the failure is logged, not returned.
    pub fn load<S: Store + ?Sized>(store: &S) -> Self {
        match store.load_entries() {
            Ok(entries) => {
                let cache = Self::from_entries(entries);
                tracing::debug!("Loaded {} cache entries", cache.len());
                cache
            }
            Err(e) => {
                tracing::warn!("Could not load item cache, starting empty: {}", e);
                Self::new()
            }
        }
    }

    /// True iff an unexpired entry exists for `key` at `now`.
    pub fn contains(&self, key: &CacheKey, now: DateTime<Utc>) -> bool {
        self.entries
            .get(key)
            .map(|stamp| stamp.is_live_at(now))
            .unwrap_or(false)
    }

    /// Record `key` as seen at `first_seen`.
    ///
    /// A live entry is left untouched (first sighting wins), so an item never
    /// turns "new" again inside its window. An entry that is already expired
    /// at `first_seen` is replaced. Returns whether a write happened.
    pub fn insert(&self, key: CacheKey, first_seen: DateTime<Utc>, ttl: TimeDelta) -> bool {
        match self.entries.entry(key) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_live_at(first_seen) {
                    false
                } else {
                    occupied.insert(Stamp { first_seen, ttl });
                    true
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Stamp { first_seen, ttl });
                true
            }
        }
    }

    /// Drop expired entries, entries stamped in the future, and entries of
    /// feeds that are no longer configured.
    pub fn prune(&self, now: DateTime<Utc>, live_feeds: &HashSet<FeedId>) -> PruneStats {
        let mut stats = PruneStats::default();

        self.entries.retain(|key, stamp| {
            if !live_feeds.contains(&key.feed_id) {
                tracing::debug!(
                    "Dropping {} from {}: feed no longer configured",
                    key.identity,
                    key.feed_id
                );
                stats.orphaned += 1;
                false
            } else if stamp.first_seen > now {
                tracing::debug!(
                    "Dropping {} from {}: first seen in the future ({})",
                    key.identity,
                    key.feed_id,
                    stamp.first_seen
                );
                stats.future += 1;
                false
            } else if stamp.expires_at() < now {
                tracing::debug!("Dropping {} from {}: expired", key.identity, key.feed_id);
                stats.expired += 1;
                false
            } else {
                true
            }
        });

        if stats.total() > 0 {
            tracing::info!(
                "Pruned cache: {} expired, {} orphaned, {} future-dated",
                stats.expired,
                stats.orphaned,
                stats.future
            );
        }
        stats
    }

    pub fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.entries.get(key).map(|stamp| CacheEntry {
            key: key.clone(),
            first_seen: stamp.first_seen,
            ttl: stamp.ttl,
        })
    }

    /// Snapshot of all entries, sorted by key.
    pub fn entries(&self) -> Vec<CacheEntry> {
        let mut entries: Vec<CacheEntry> = self
            .entries
            .iter()
            .map(|r| CacheEntry {
                key: r.key().clone(),
                first_seen: r.value().first_seen,
                ttl: r.value().ttl,
            })
            .collect();
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
