//! SQLite Store - Embedded Persistent Key-Value Store
//!
//! Durable single-file storage for [`CacheEntry`] records, keyed by string.
//! Supports point lookup, delete-by-key, delete-all and full scans; nothing
//! else is indexed.
//!
//! # Password Protection
//!
//! A store created with a password records a salted SHA-256 verifier. Opening
//! it again with a different password, or without one, fails with
//! [`CacheError::InvalidPassword`] before any entry is read. A store created
//! without a password rejects any password.
//!
//! # Thread Safety
//!
//! The single connection is guarded by a mutex; every operation is one
//! statement or one transaction, so concurrent callers never observe a
//! half-replaced entry.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, Row, params};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::config::PersistentCacheConfig;
use crate::entry::CacheEntry;
use crate::error::CacheError;

// Instants and durations are stored as microseconds.
const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS cache_entries (
    key             TEXT PRIMARY KEY NOT NULL,
    value           BLOB NOT NULL,
    expiry          INTEGER,
    renewal         INTEGER,
    absolute_expiry INTEGER
);
CREATE TABLE IF NOT EXISTS cache_meta (
    name  TEXT PRIMARY KEY NOT NULL,
    value TEXT NOT NULL
);
";

const SELECT_ENTRY: &str =
    "SELECT key, value, expiry, renewal, absolute_expiry FROM cache_entries";

const PASSWORD_SALT: &str = "password_salt";
const PASSWORD_HASH: &str = "password_hash";

/// Row as read from SQLite, before instants are decoded
struct RawEntry {
    key: String,
    value: Vec<u8>,
    expiry: Option<i64>,
    renewal: Option<i64>,
    absolute_expiry: Option<i64>,
}

impl RawEntry {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            key: row.get(0)?,
            value: row.get(1)?,
            expiry: row.get(2)?,
            renewal: row.get(3)?,
            absolute_expiry: row.get(4)?,
        })
    }

    fn decode(self) -> Result<CacheEntry, CacheError> {
        let key = self.key;
        let instant = |micros: Option<i64>, column: &str| -> Result<Option<DateTime<Utc>>, CacheError> {
            micros
                .map(|micros| {
                    DateTime::from_timestamp_micros(micros).ok_or_else(|| CacheError::Corrupt {
                        key: key.clone(),
                        reason: format!("{column} {micros} is out of range"),
                    })
                })
                .transpose()
        };

        let expiry = instant(self.expiry, "expiry")?;
        let absolute_expiry = instant(self.absolute_expiry, "absolute_expiry")?;
        let renewal = self
            .renewal
            .map(|micros| {
                u64::try_from(micros)
                    .map(Duration::from_micros)
                    .map_err(|_| CacheError::Corrupt {
                        key: key.clone(),
                        reason: format!("negative renewal {micros}"),
                    })
            })
            .transpose()?;

        Ok(CacheEntry {
            key,
            value: self.value,
            expiry,
            renewal,
            absolute_expiry,
        })
    }
}

fn encode_instant(at: Option<DateTime<Utc>>) -> Option<i64> {
    at.map(|at| at.timestamp_micros())
}

fn encode_duration(duration: Option<Duration>) -> Option<i64> {
    duration.map(|d| i64::try_from(d.as_micros()).unwrap_or(i64::MAX))
}

fn hash_password(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

fn read_meta(conn: &Connection, name: &str) -> Result<Option<String>, CacheError> {
    Ok(conn
        .query_row(
            "SELECT value FROM cache_meta WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )
        .optional()?)
}

/// SQLite-backed store for cache entries
pub struct SqliteStore {
    conn: Mutex<Connection>,
    path: PathBuf,
}

impl SqliteStore {
    /// Open (or create) the store described by `config`
    ///
    /// # Errors
    ///
    /// - [`CacheError::InvalidConfig`] if the configuration is invalid
    /// - [`CacheError::InvalidPassword`] if the password does not match the store
    /// - [`CacheError::Store`] / [`CacheError::Io`] if the file cannot be opened
    pub fn open(config: &PersistentCacheConfig) -> Result<Self, CacheError> {
        config.validate()?;
        let path = config.cache_path.clone();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let mut conn = Connection::open(&path)?;

        let tx = conn.transaction()?;
        let is_new: bool = tx.query_row(
            "SELECT COUNT(*) = 0 FROM sqlite_master WHERE type = 'table' AND name = 'cache_meta'",
            [],
            |row| row.get(0),
        )?;
        tx.execute_batch(SCHEMA)?;

        if is_new {
            if let Some(password) = config.password.as_deref() {
                let salt = hex::encode(rand::random::<[u8; 16]>());
                tx.execute(
                    "INSERT INTO cache_meta (name, value) VALUES (?1, ?2), (?3, ?4)",
                    params![
                        PASSWORD_SALT,
                        salt,
                        PASSWORD_HASH,
                        hash_password(&salt, password)
                    ],
                )?;
            }
        } else {
            Self::verify_password(&tx, &path, config.password.as_deref())?;
        }
        tx.commit()?;

        info!(
            path = %path.display(),
            created = is_new,
            protected = config.password.is_some(),
            "SQLite cache store opened"
        );

        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    fn verify_password(
        conn: &Connection,
        path: &Path,
        password: Option<&str>,
    ) -> Result<(), CacheError> {
        let stored = read_meta(conn, PASSWORD_HASH)?;

        let accepted = match (stored, password) {
            (None, None) => true,
            (Some(hash), Some(password)) => {
                let salt = read_meta(conn, PASSWORD_SALT)?.unwrap_or_default();
                hash_password(&salt, password) == hash
            }
            _ => false,
        };

        if accepted {
            Ok(())
        } else {
            Err(CacheError::InvalidPassword {
                path: path.to_path_buf(),
            })
        }
    }

    /// Path of the store file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Look up the entry stored under `key`
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or the row cannot be decoded.
    pub fn find(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        let conn = self.conn.lock();
        let raw = conn
            .query_row(
                &format!("{SELECT_ENTRY} WHERE key = ?1"),
                params![key],
                RawEntry::from_row,
            )
            .optional()?;
        raw.map(RawEntry::decode).transpose()
    }

    /// Insert a new entry
    ///
    /// # Errors
    ///
    /// Returns an error if an entry with the same key exists or the write fails.
    pub fn insert(&self, entry: &CacheEntry) -> Result<(), CacheError> {
        let conn = self.conn.lock();
        Self::insert_with(&conn, entry)
    }

    fn insert_with(conn: &Connection, entry: &CacheEntry) -> Result<(), CacheError> {
        conn.execute(
            "INSERT INTO cache_entries (key, value, expiry, renewal, absolute_expiry)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                entry.key,
                entry.value,
                encode_instant(entry.expiry),
                encode_duration(entry.renewal),
                encode_instant(entry.absolute_expiry),
            ],
        )?;
        Ok(())
    }

    /// Delete any entry under `entry.key` and insert `entry`, atomically
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction fails; the previous entry is kept.
    pub fn replace(&self, entry: &CacheEntry) -> Result<(), CacheError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let removed = tx.execute(
            "DELETE FROM cache_entries WHERE key = ?1",
            params![entry.key],
        )?;
        Self::insert_with(&tx, entry)?;
        tx.commit()?;

        debug!(key = %entry.key, replaced = removed > 0, bytes = entry.value.len(), "[SQLite] Stored entry");
        Ok(())
    }

    /// Move the expiry of `key` from `expected` to `expiry`
    ///
    /// Returns `false` if the key no longer exists or its expiry changed in the
    /// meantime (the entry was overwritten or renewed by another caller).
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn update_expiry(
        &self,
        key: &str,
        expected: Option<DateTime<Utc>>,
        expiry: Option<DateTime<Utc>>,
    ) -> Result<bool, CacheError> {
        let conn = self.conn.lock();
        let updated = conn.execute(
            "UPDATE cache_entries SET expiry = ?3 WHERE key = ?1 AND expiry IS ?2",
            params![key, encode_instant(expected), encode_instant(expiry)],
        )?;
        Ok(updated > 0)
    }

    /// Delete `key` only if it is expired at `now`; returns the number of rows removed
    ///
    /// An entry rewritten after the caller observed it as expired is kept.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn delete_expired(&self, key: &str, now: DateTime<Utc>) -> Result<usize, CacheError> {
        let conn = self.conn.lock();
        Ok(conn.execute(
            "DELETE FROM cache_entries WHERE key = ?1 AND expiry IS NOT NULL AND expiry <= ?2",
            params![key, now.timestamp_micros()],
        )?)
    }

    /// Delete the entry stored under `key`; returns the number of rows removed
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn delete(&self, key: &str) -> Result<usize, CacheError> {
        let conn = self.conn.lock();
        Ok(conn.execute("DELETE FROM cache_entries WHERE key = ?1", params![key])?)
    }

    /// Delete every entry; returns the number of rows removed
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn delete_all(&self) -> Result<usize, CacheError> {
        let conn = self.conn.lock();
        Ok(conn.execute("DELETE FROM cache_entries", [])?)
    }

    /// Every stored entry, expired or not
    ///
    /// # Errors
    ///
    /// Returns an error if the scan fails or a row cannot be decoded.
    pub fn entries(&self) -> Result<Vec<CacheEntry>, CacheError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!("{SELECT_ENTRY} ORDER BY key"))?;
        let raw = stmt
            .query_map([], RawEntry::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        raw.into_iter().map(RawEntry::decode).collect()
    }

    /// Number of stored entries
    ///
    /// # Errors
    ///
    /// Returns an error if the scan fails.
    pub fn count(&self) -> Result<u64, CacheError> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM cache_entries", [], |row| row.get(0))?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    /// Sum of the byte lengths of all stored values
    ///
    /// # Errors
    ///
    /// Returns an error if the scan fails.
    pub fn total_value_bytes(&self) -> Result<u64, CacheError> {
        let conn = self.conn.lock();
        let total: i64 = conn.query_row(
            "SELECT COALESCE(SUM(LENGTH(value)), 0) FROM cache_entries",
            [],
            |row| row.get(0),
        )?;
        Ok(u64::try_from(total).unwrap_or_default())
    }

    /// Whether the store answers queries
    pub fn ping(&self) -> bool {
        let conn = self.conn.lock();
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .is_ok()
    }

    /// Close the connection, reporting any error SQLite raises on close
    ///
    /// # Errors
    ///
    /// Returns an error if SQLite fails to close the file cleanly.
    pub fn close(self) -> Result<(), CacheError> {
        let path = self.path;
        self.conn.into_inner().close().map_err(|(_, e)| e)?;
        info!(path = %path.display(), "SQLite cache store closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::EntryOptions;

    fn open_temp() -> (tempfile::TempDir, SqliteStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(&PersistentCacheConfig::new(dir.path().join("store.db"))).unwrap();
        (dir, store)
    }

    fn entry(key: &str, value: &[u8], options: &EntryOptions) -> CacheEntry {
        let now = DateTime::from_timestamp_micros(1_700_000_000_000_000).unwrap_or_default();
        CacheEntry::new(key, value.to_vec(), options, now)
    }

    #[test]
    fn test_entry_columns_round_trip() {
        let (_dir, store) = open_temp();
        let options = EntryOptions::new()
            .with_absolute_expiration_relative_to_now(Duration::from_secs(60))
            .with_sliding_expiration(Duration::from_millis(1_500));
        let original = entry("k", b"value", &options);

        store.insert(&original).unwrap();

        assert_eq!(store.find("k").unwrap(), Some(original));
        assert_eq!(store.find("missing").unwrap(), None);
    }

    #[test]
    fn test_insert_rejects_duplicate_key() {
        let (_dir, store) = open_temp();
        let first = entry("k", b"1", &EntryOptions::new());

        store.insert(&first).unwrap();
        assert!(store.insert(&first).is_err());
    }

    #[test]
    fn test_replace_overwrites() {
        let (_dir, store) = open_temp();
        store.replace(&entry("k", b"1", &EntryOptions::new())).unwrap();
        store.replace(&entry("k", b"22", &EntryOptions::new())).unwrap();

        assert_eq!(store.count().unwrap(), 1);
        assert_eq!(store.find("k").unwrap().map(|e| e.value), Some(b"22".to_vec()));
    }

    #[test]
    fn test_delete_and_aggregates() {
        let (_dir, store) = open_temp();
        for key in ["a", "b", "c"] {
            store.insert(&entry(key, &[0, 1], &EntryOptions::new())).unwrap();
        }

        assert_eq!(store.delete("a").unwrap(), 1);
        assert_eq!(store.delete("a").unwrap(), 0);
        assert_eq!(store.count().unwrap(), 2);
        assert_eq!(store.total_value_bytes().unwrap(), 4);

        let keys: Vec<_> = store.entries().unwrap().into_iter().map(|e| e.key).collect();
        assert_eq!(keys, vec!["b".to_string(), "c".to_string()]);

        assert_eq!(store.delete_all().unwrap(), 2);
        assert_eq!(store.count().unwrap(), 0);
        assert_eq!(store.total_value_bytes().unwrap(), 0);
    }

    #[test]
    fn test_update_expiry_is_compare_and_set() {
        let (_dir, store) = open_temp();
        let at = |micros| DateTime::from_timestamp_micros(micros).unwrap_or_default();
        assert!(!store.update_expiry("missing", None, Some(at(1))).unwrap());

        store.insert(&entry("k", b"v", &EntryOptions::new())).unwrap();
        assert!(store.update_expiry("k", None, Some(at(42))).unwrap());
        assert!(!store.update_expiry("k", None, Some(at(7))).unwrap());
        assert!(store.update_expiry("k", Some(at(42)), Some(at(43))).unwrap());
        assert_eq!(store.find("k").unwrap().and_then(|e| e.expiry), Some(at(43)));
    }

    #[test]
    fn test_delete_expired_keeps_live_entries() {
        let (_dir, store) = open_temp();
        let now = DateTime::from_timestamp_micros(1_700_000_000_000_000).unwrap_or_default();
        let options = EntryOptions::new().with_absolute_expiration_relative_to_now(Duration::from_secs(1));
        store.insert(&entry("k", b"v", &options)).unwrap();
        store.insert(&entry("forever", b"v", &EntryOptions::new())).unwrap();

        assert_eq!(store.delete_expired("k", now).unwrap(), 0);
        assert_eq!(store.delete_expired("forever", DateTime::<Utc>::MAX_UTC).unwrap(), 0);
        assert_eq!(
            store.delete_expired("k", now + chrono::Duration::seconds(1)).unwrap(),
            1
        );
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn test_data_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let config = PersistentCacheConfig::new(dir.path().join("nested").join("store.db"));

        let store = SqliteStore::open(&config).unwrap();
        store.insert(&entry("k", b"durable", &EntryOptions::new())).unwrap();
        assert!(store.ping());
        store.close().unwrap();

        let reopened = SqliteStore::open(&config).unwrap();
        assert_eq!(reopened.find("k").unwrap().map(|e| e.value), Some(b"durable".to_vec()));
    }
}
