pub mod sqlite;

use crate::app::Result;
use crate::cache::CacheEntry;

pub use sqlite::SqliteStore;

/// One `(namespace, key, value)` row of plugin data.
pub type PluginDataRow = (String, String, String);

/// Durable backing for the item cache and plugin data.
///
/// Both collections are loaded and saved whole; `save_all` replaces whatever
/// was stored before.
pub trait Store {
    fn load_entries(&self) -> Result<Vec<CacheEntry>>;
    fn load_plugin_data(&self) -> Result<Vec<PluginDataRow>>;

    /// Replace the cache and the plugin data together: either both are
    /// written or neither is.
    fn save_all(&self, entries: &[CacheEntry], rows: &[PluginDataRow]) -> Result<()>;
}
