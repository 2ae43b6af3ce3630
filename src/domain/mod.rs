pub mod feed;
pub mod item;

pub use feed::{normalize_url, ttl_from_days, FeedId, FeedSource, SortBy, SECONDS_PER_DAY};
pub use item::Item;
