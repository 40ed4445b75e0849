//! Storage subsystem for docsql
//!
//! The backing relational engine (SQLite) holds the canonical state of every
//! document type: the `entities` table plus one side table per declared
//! index. Nothing is cached in memory, so reopening the same file restores
//! all documents and all view history.
//!
//! # Design Principles
//!
//! - One connection per store handle, shared explicitly via `Arc<Store>`
//! - Every mutation runs inside one transaction: commit at the end or roll
//!   back on the first error
//! - Checksum-verified bodies on every read
//!
//! # Invariants Enforced
//!
//! - `sequence` unique and strictly increasing, never reassigned
//! - `id` unique across all types, never reassigned
//! - Update/delete of an absent id is a consistency fault, never a no-op

mod entities;
mod errors;
mod record;

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};
use std::time::Duration;

use rusqlite::{Connection, Transaction};

use crate::config::StoreConfig;
use crate::observability::{log_event_with_fields, warn_event, Event, Logger, MetricsRegistry};

pub use entities::{init_tables, EntityStore};
pub use errors::{Severity, StorageError, StorageErrorCode, StorageResult};
pub use record::{format_timestamp, parse_timestamp, EntityMeta, EntityRecord};

pub(crate) use errors::SqlContext;

/// Handle on the backing store.
///
/// Access is synchronous: writers and readers take the connection lock for
/// the duration of one operation. The lock is not reentrant; asking for it
/// again from inside a write fails with `DOCSQL_REENTRANT_ACCESS`.
pub struct Store {
    conn: Mutex<Connection>,
    /// Thread currently running a write transaction
    writer: Mutex<Option<ThreadId>>,
    config: StoreConfig,
    metrics: MetricsRegistry,
}

/// Clears the writer slot when the write ends, including by unwinding.
struct WriterSlot<'s> {
    slot: &'s Mutex<Option<ThreadId>>,
}

impl<'s> WriterSlot<'s> {
    fn claim(slot: &'s Mutex<Option<ThreadId>>) -> Self {
        *slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(thread::current().id());
        Self { slot }
    }
}

impl Drop for WriterSlot<'_> {
    fn drop(&mut self) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl Store {
    /// Open (or create) the store described by `config` and ensure the
    /// entity table exists.
    pub fn open(config: StoreConfig) -> StorageResult<Self> {
        Logger::init_min_severity(config.log_level);

        let conn = match &config.path {
            Some(path) => Connection::open(path).sql_context("open database file")?,
            None => Connection::open_in_memory().sql_context("open in-memory database")?,
        };

        conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))
            .sql_context("set busy timeout")?;
        if !config.is_in_memory() {
            conn.execute_batch(&format!(
                "PRAGMA journal_mode={};",
                config.journal_mode.as_pragma()
            ))
            .sql_context("set journal mode")?;
        }

        init_tables(&conn)?;

        let location = config
            .path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| ":memory:".to_string());
        log_event_with_fields(Event::DatabaseOpen, &[("location", &location)]);

        Ok(Self {
            conn: Mutex::new(conn),
            writer: Mutex::new(None),
            config,
            metrics: MetricsRegistry::new(),
        })
    }

    /// Open a private in-memory store
    pub fn open_in_memory() -> StorageResult<Self> {
        Self::open(StoreConfig::in_memory())
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn metrics(&self) -> &MetricsRegistry {
        &self.metrics
    }

    fn held_by_current_thread(&self) -> bool {
        *self.writer.lock().unwrap_or_else(PoisonError::into_inner) == Some(thread::current().id())
    }

    /// Take the connection lock.
    ///
    /// A panic inside a write (typically a view callback) poisons the
    /// mutex after the transaction has already rolled back on unwind, so
    /// the connection is taken back instead of failing every later call.
    fn lock(&self, operation: &str) -> StorageResult<MutexGuard<'_, Connection>> {
        if self.held_by_current_thread() {
            return Err(StorageError::reentrant_access(operation));
        }

        Ok(self.conn.lock().unwrap_or_else(|poisoned| {
            warn_event(Event::LockRecovered, &[("operation", operation)]);
            self.conn.clear_poison();
            poisoned.into_inner()
        }))
    }

    fn record_rollback(&self, reason: &str) {
        self.metrics.increment_rollbacks();
        Logger::warn(Event::WriteRollback.as_str(), &[("reason", reason)]);
    }

    /// Run `f` inside one transaction.
    ///
    /// Commits when `f` succeeds; rolls back and returns the error when it
    /// or the commit fails. Nothing `f` wrote is visible to readers before
    /// the commit.
    pub fn write<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, E>,
        E: From<StorageError> + std::fmt::Display,
    {
        let mut conn = self.lock("write")?;
        let _writer = WriterSlot::claim(&self.writer);
        let tx = conn.transaction().sql_context("begin transaction")?;

        match f(&tx) {
            // A failed commit drops the transaction, which rolls it back
            Ok(value) => match tx.commit() {
                Ok(()) => {
                    self.metrics.increment_commits();
                    Ok(value)
                }
                Err(source) => {
                    let err = StorageError::storage_failed("commit transaction", source);
                    self.record_rollback(&err.to_string());
                    Err(err.into())
                }
            },
            Err(err) => {
                let reason = err.to_string();
                if let Err(rollback) = tx.rollback() {
                    Logger::error(
                        "ROLLBACK_FAILED",
                        &[("reason", &reason), ("rollback", &rollback.to_string())],
                    );
                }
                self.record_rollback(&reason);
                Err(err)
            }
        }
    }

    /// Run a read-only closure against committed state.
    pub fn read<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Connection) -> Result<T, E>,
        E: From<StorageError>,
    {
        let conn = self.lock("read")?;
        f(&conn)
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_commits() {
        let store = Store::open_in_memory().unwrap();

        let meta = store
            .write(|tx| EntityStore::new(tx).insert("movie", b"x"))
            .unwrap();

        let found = store
            .read(|conn| EntityStore::new(conn).get("movie", &meta.id))
            .unwrap();
        assert!(found.is_some());
        assert_eq!(store.metrics().snapshot().transactions_committed, 1);
    }

    #[test]
    fn test_write_rolls_back_on_error() {
        let store = Store::open_in_memory().unwrap();

        let result: StorageResult<()> = store.write(|tx| {
            EntityStore::new(tx).insert("movie", b"x")?;
            EntityStore::new(tx).update("movie", "missing", b"y")?;
            Ok(())
        });
        assert_eq!(result.unwrap_err().code(), StorageErrorCode::ConsistencyFault);

        let count = store
            .read(|conn| EntityStore::new(conn).count_by_type("movie"))
            .unwrap();
        assert_eq!(count, 0);
        assert_eq!(store.metrics().snapshot().transactions_rolled_back, 1);
    }

    #[test]
    fn test_failed_commit_counts_as_rollback() {
        let store = Store::open_in_memory().unwrap();
        store
            .read(|conn| {
                conn.execute_batch(
                    "PRAGMA foreign_keys = ON;
                     CREATE TABLE parent (id INTEGER PRIMARY KEY);
                     CREATE TABLE child (
                         parent INTEGER REFERENCES parent(id) DEFERRABLE INITIALLY DEFERRED
                     );",
                )
                .sql_context("create tables")
            })
            .unwrap();

        // Deferred constraints are only checked at COMMIT
        let result: StorageResult<()> = store.write(|tx| {
            tx.execute("INSERT INTO child (parent) VALUES (7)", [])
                .sql_context("insert child")?;
            Ok(())
        });
        let err = result.unwrap_err();
        assert_eq!(err.code(), StorageErrorCode::StorageFailed);
        assert_eq!(err.message(), "commit transaction");

        let snapshot = store.metrics().snapshot();
        assert_eq!(snapshot.transactions_committed, 0);
        assert_eq!(snapshot.transactions_rolled_back, 1);

        let rows: i64 = store
            .read(|conn| {
                conn.query_row("SELECT COUNT(*) FROM child", [], |row| row.get(0))
                    .sql_context("count children")
            })
            .unwrap();
        assert_eq!(rows, 0);
    }

    #[test]
    fn test_nested_access_from_write_is_rejected() {
        let store = Store::open_in_memory().unwrap();

        let nested: StorageResult<u64> = store.write(|_tx| {
            let err = store
                .read(|conn| EntityStore::new(conn).count_by_type("movie"))
                .unwrap_err();
            assert_eq!(err.code(), StorageErrorCode::ReentrantAccess);
            Ok(0)
        });
        assert!(nested.is_ok());

        // The slot is released once the write returns
        assert_eq!(
            store
                .read(|conn| EntityStore::new(conn).count_by_type("movie"))
                .unwrap(),
            0
        );
    }

    #[test]
    fn test_panic_inside_write_does_not_wedge_the_store() {
        let store = Store::open_in_memory().unwrap();

        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _: StorageResult<()> = store.write(|tx| {
                EntityStore::new(tx).insert("movie", b"lost")?;
                panic!("writer died");
            });
        }));
        assert!(outcome.is_err());

        let count = store
            .read(|conn| EntityStore::new(conn).count_by_type("movie"))
            .unwrap();
        assert_eq!(count, 0);
        store
            .write(|tx| EntityStore::new(tx).insert("movie", b"kept"))
            .unwrap();
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docs.db");

        let id = {
            let store = Store::open(StoreConfig::at(&path)).unwrap();
            store
                .write(|tx| EntityStore::new(tx).insert("movie", b"kept"))
                .unwrap()
                .id
        };

        let store = Store::open(StoreConfig::at(&path)).unwrap();
        let record = store
            .read(|conn| EntityStore::new(conn).get("movie", &id))
            .unwrap()
            .unwrap();
        assert_eq!(record.body, b"kept".to_vec());
    }
}
