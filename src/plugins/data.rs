use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::store::{PluginDataRow, Store};

type Namespaces = BTreeMap<String, BTreeMap<String, String>>;

/// Key/value data that plugins keep between runs, one namespace per plugin.
///
/// Loaded before the run and saved with the item cache.
#[derive(Debug, Default)]
pub struct PluginData {
    namespaces: Mutex<Namespaces>,
}

impl PluginData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rows(rows: impl IntoIterator<Item = PluginDataRow>) -> Self {
        let mut namespaces = Namespaces::new();
        for (namespace, key, value) in rows {
            namespaces.entry(namespace).or_default().insert(key, value);
        }
        Self {
            namespaces: Mutex::new(namespaces),
        }
    }

    /// Load from `store`; failures are logged and yield empty data.
    pub fn load<S: Store + ?Sized>(store: &S) -> Self {
        match store.load_plugin_data() {
            Ok(rows) => Self::from_rows(rows),
            Err(e) => {
                tracing::warn!("Could not load plugin data, starting empty: {}", e);
                Self::new()
            }
        }
    }

    pub fn get(&self, namespace: &str, key: &str) -> Option<String> {
        self.with(|ns| ns.get(namespace).and_then(|m| m.get(key)).cloned())
    }

    pub fn set(&self, namespace: &str, key: &str, value: impl Into<String>) {
        let value = value.into();
        self.with(|ns| {
            ns.entry(namespace.to_string())
                .or_default()
                .insert(key.to_string(), value);
        })
    }

    pub fn remove(&self, namespace: &str, key: &str) -> Option<String> {
        self.with(|ns| {
            let map = ns.get_mut(namespace)?;
            let removed = map.remove(key);
            if map.is_empty() {
                ns.remove(namespace);
            }
            removed
        })
    }

    pub fn namespace(&self, namespace: &str) -> BTreeMap<String, String> {
        self.with(|ns| ns.get(namespace).cloned().unwrap_or_default())
    }

    pub fn rows(&self) -> Vec<PluginDataRow> {
        self.with(|ns| {
            ns.iter()
                .flat_map(|(namespace, map)| {
                    map.iter()
                        .map(move |(k, v)| (namespace.clone(), k.clone(), v.clone()))
                })
                .collect()
        })
    }

    fn with<R>(&self, f: impl FnOnce(&mut Namespaces) -> R) -> R {
        // Every closure is a single map operation, so a poisoned map is
        // still consistent.
        let mut guard = self
            .namespaces
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;

    #[test]
    fn test_namespaces_are_separate() {
        let data = PluginData::new();
        data.set("a", "k", "1");
        data.set("b", "k", "2");
        assert_eq!(data.get("a", "k").as_deref(), Some("1"));
        assert_eq!(data.get("b", "k").as_deref(), Some("2"));
        assert_eq!(data.get("c", "k"), None);
    }

    #[test]
    fn test_remove_drops_empty_namespace() {
        let data = PluginData::new();
        data.set("a", "k", "1");
        assert_eq!(data.remove("a", "k").as_deref(), Some("1"));
        assert!(data.namespace("a").is_empty());
        assert!(data.rows().is_empty());
    }

    #[test]
    fn test_save_and_load_through_store() {
        let store = SqliteStore::in_memory().unwrap();
        let data = PluginData::new();
        data.set("counter", "runs", "7");
        data.set("counter", "last", "2024-01-01");
        store.save_all(&[], &data.rows()).unwrap();

        let loaded = PluginData::load(&store);
        assert_eq!(loaded.get("counter", "runs").as_deref(), Some("7"));
        assert_eq!(loaded.namespace("counter").len(), 2);
    }
}
