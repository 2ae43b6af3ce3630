use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use rusqlite::{params, Connection, Transaction};
use rusqlite_migration::{Migrations, M};

use crate::app::{FreshetError, Result};
use crate::cache::{CacheEntry, CacheKey};
use crate::domain::FeedId;
use crate::store::{PluginDataRow, Store};

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.run_migrations()?;
        Ok(store)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.run_migrations()?;
        Ok(store)
    }

    fn run_migrations(&self) -> Result<()> {
        let migrations = Migrations::new(vec![M::up(include_str!(
            "../../migrations/001-initial/up.sql"
        ))]);

        let mut conn = self.conn()?;
        migrations
            .to_latest(&mut conn)
            .map_err(|e| FreshetError::CacheIo(format!("migration failed: {}", e)))?;

        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| FreshetError::CacheIo(format!("store lock poisoned: {}", e)))
    }

    fn format_datetime(dt: &DateTime<Utc>) -> String {
        dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
    }

    fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
    }

    fn write_entries(tx: &Transaction<'_>, entries: &[CacheEntry]) -> Result<()> {
        tx.execute("DELETE FROM cache_entries", [])?;
        let mut stmt = tx.prepare(
            "INSERT INTO cache_entries (feed_id, identity, first_seen, ttl_secs)
             VALUES (?1, ?2, ?3, ?4)",
        )?;
        for entry in entries {
            stmt.execute(params![
                entry.key.feed_id.as_str(),
                entry.key.identity,
                Self::format_datetime(&entry.first_seen),
                entry.ttl.num_seconds()
            ])?;
        }
        Ok(())
    }

    fn write_plugin_data(tx: &Transaction<'_>, rows: &[PluginDataRow]) -> Result<()> {
        tx.execute("DELETE FROM plugin_data", [])?;
        let mut stmt =
            tx.prepare("INSERT INTO plugin_data (namespace, key, value) VALUES (?1, ?2, ?3)")?;
        for (namespace, key, value) in rows {
            stmt.execute(params![namespace, key, value])?;
        }
        Ok(())
    }
}

impl Store for SqliteStore {
    fn load_entries(&self) -> Result<Vec<CacheEntry>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            "SELECT feed_id, identity, first_seen, ttl_secs
             FROM cache_entries ORDER BY feed_id, identity",
        )?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut entries = Vec::with_capacity(rows.len());
        for (feed_id, identity, first_seen, ttl_secs) in rows {
            let Some(first_seen_at) = Self::parse_datetime(&first_seen) else {
                tracing::warn!(
                    "Skipping cache entry {} with unreadable timestamp {:?}",
                    identity,
                    first_seen
                );
                continue;
            };
            let Some(ttl) = TimeDelta::try_seconds(ttl_secs).filter(|ttl| *ttl >= TimeDelta::zero())
            else {
                tracing::warn!(
                    "Skipping cache entry {} with invalid ttl of {} seconds",
                    identity,
                    ttl_secs
                );
                continue;
            };
            entries.push(CacheEntry {
                key: CacheKey::new(FeedId::from_canonical(feed_id), identity),
                first_seen: first_seen_at,
                ttl,
            });
        }

        Ok(entries)
    }

    fn load_plugin_data(&self) -> Result<Vec<PluginDataRow>> {
        let conn = self.conn()?;

        let mut stmt =
            conn.prepare("SELECT namespace, key, value FROM plugin_data ORDER BY namespace, key")?;

        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    fn save_all(&self, entries: &[CacheEntry], rows: &[PluginDataRow]) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        Self::write_entries(&tx, entries)?;
        Self::write_plugin_data(&tx, rows)?;
        tx.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn entry(feed: &str, identity: &str, first_seen: DateTime<Utc>, days: i64) -> CacheEntry {
        CacheEntry {
            key: CacheKey::new(FeedId::parse(feed).unwrap(), identity),
            first_seen,
            ttl: TimeDelta::days(days),
        }
    }

    #[test]
    fn test_empty_store_loads_nothing() {
        let store = SqliteStore::in_memory().unwrap();
        assert!(store.load_entries().unwrap().is_empty());
        assert!(store.load_plugin_data().unwrap().is_empty());
    }

    #[test]
    fn test_entries_round_trip_exactly() {
        let store = SqliteStore::in_memory().unwrap();
        let precise = Utc
            .with_ymd_and_hms(2024, 3, 1, 12, 30, 15)
            .unwrap()
            + TimeDelta::nanoseconds(123_456_789);

        let entries = vec![
            entry("https://a.example/feed", "https://a.example/1", precise, 30),
            entry("https://b.example/feed", "guid:xyz", precise, 1),
        ];
        store.save_all(&entries, &[]).unwrap();

        assert_eq!(store.load_entries().unwrap(), entries);
    }

    #[test]
    fn test_save_replaces_previous_contents() {
        let store = SqliteStore::in_memory().unwrap();
        let now = Utc::now();

        let first = [
            entry("https://a.example/feed", "1", now, 1),
            entry("https://a.example/feed", "2", now, 1),
        ];
        store.save_all(&first, &[]).unwrap();
        store
            .save_all(&[entry("https://a.example/feed", "3", now, 1)], &[])
            .unwrap();

        let loaded = store.load_entries().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].key.identity, "3");
    }

    #[test]
    fn test_plugin_data_round_trip() {
        let store = SqliteStore::in_memory().unwrap();
        let rows = vec![
            ("counter".to_string(), "runs".to_string(), "3".to_string()),
            ("notes".to_string(), "last".to_string(), "hello".to_string()),
        ];
        store.save_all(&[], &rows).unwrap();
        assert_eq!(store.load_plugin_data().unwrap(), rows);
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("cache.db");
        let now = Utc::now();

        {
            let store = SqliteStore::new(&path).unwrap();
            store
                .save_all(&[entry("https://a.example/feed", "1", now, 7)], &[])
                .unwrap();
        }

        let store = SqliteStore::new(&path).unwrap();
        let loaded = store.load_entries().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].first_seen, now);
        assert_eq!(loaded[0].ttl, TimeDelta::days(7));
    }

    #[test]
    fn test_unreadable_timestamp_is_skipped() {
        let store = SqliteStore::in_memory().unwrap();
        store
            .conn()
            .unwrap()
            .execute(
                "INSERT INTO cache_entries (feed_id, identity, first_seen, ttl_secs)
                 VALUES ('https://a.example/feed', '1', 'yesterday', 60)",
                [],
            )
            .unwrap();

        assert!(store.load_entries().unwrap().is_empty());
    }

    #[test]
    fn test_invalid_ttl_is_skipped() {
        let store = SqliteStore::in_memory().unwrap();
        store
            .conn()
            .unwrap()
            .execute_batch(
                "INSERT INTO cache_entries (feed_id, identity, first_seen, ttl_secs) VALUES
                 ('https://a.example/feed', 'huge', '2024-01-01T00:00:00Z', 9223372036854775807),
                 ('https://a.example/feed', 'negative', '2024-01-01T00:00:00Z', -5),
                 ('https://a.example/feed', 'ok', '2024-01-01T00:00:00Z', 60);",
            )
            .unwrap();

        let loaded = store.load_entries().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].key.identity, "ok");
    }

    #[test]
    fn test_save_all_writes_both_tables() {
        let store = SqliteStore::in_memory().unwrap();
        let now = Utc::now();
        let entries = vec![entry("https://a.example/feed", "1", now, 1)];
        let rows = vec![("counter".to_string(), "runs".to_string(), "1".to_string())];

        store.save_all(&entries, &rows).unwrap();

        assert_eq!(store.load_entries().unwrap(), entries);
        assert_eq!(store.load_plugin_data().unwrap(), rows);
    }

    #[test]
    fn test_save_all_is_one_transaction() {
        let store = SqliteStore::in_memory().unwrap();
        let now = Utc::now();
        store
            .save_all(&[entry("https://a.example/feed", "old", now, 1)], &[])
            .unwrap();

        // Duplicate plugin rows violate the primary key after the cache table
        // has already been rewritten inside the transaction.
        let dup = ("ns".to_string(), "k".to_string(), "v".to_string());
        let result = store.save_all(
            &[entry("https://a.example/feed", "new", now, 1)],
            &[dup.clone(), dup],
        );

        assert!(result.is_err());
        let loaded = store.load_entries().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].key.identity, "old");
    }
}
