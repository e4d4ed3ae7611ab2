//! Lock rows for cross-process mutual exclusion
//!
//! A row `(operation, holder, locked_at)` means `holder` owns `operation`
//! until it deletes the row or the row goes stale. Timestamps are
//! microseconds since the Unix epoch.

use anyhow::Result;
use rusqlite::{params, OptionalExtension};

use super::database::Database;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockRecord {
    pub operation: String,
    pub holder: String,
    pub locked_at: i64,
}

pub struct LockStore<'a> {
    db: &'a Database,
}

impl<'a> LockStore<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Claim `operation` for `holder` if it is free or stale.
    ///
    /// Single conditional upsert: the row is written when absent, or
    /// overwritten when `now - locked_at >= ttl`. The returned row tells
    /// whether this holder ended up owning it. `None` means the write
    /// reported nothing and the caller should confirm with [`Self::holder`].
    pub fn try_claim(
        &self,
        operation: &str,
        holder: &str,
        now_micros: i64,
        ttl_micros: i64,
    ) -> Result<Option<bool>> {
        let owner: Option<String> = self
            .db
            .conn()
            .query_row(
                "INSERT INTO locks (operation, holder, locked_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(operation) DO UPDATE SET
                    holder = excluded.holder,
                    locked_at = excluded.locked_at
                 WHERE ?3 - locks.locked_at >= ?4
                 RETURNING holder",
                params![operation, holder, now_micros, ttl_micros],
                |row| row.get(0),
            )
            .optional()?;

        Ok(owner.map(|owner| owner == holder))
    }

    /// Current holder of `operation`
    pub fn holder(&self, operation: &str) -> Result<Option<String>> {
        let holder = self
            .db
            .conn()
            .query_row(
                "SELECT holder FROM locks WHERE operation = ?1",
                [operation],
                |row| row.get(0),
            )
            .optional()?;
        Ok(holder)
    }

    pub fn get(&self, operation: &str) -> Result<Option<LockRecord>> {
        let record = self
            .db
            .conn()
            .query_row(
                "SELECT operation, holder, locked_at FROM locks WHERE operation = ?1",
                [operation],
                |row| {
                    Ok(LockRecord {
                        operation: row.get(0)?,
                        holder: row.get(1)?,
                        locked_at: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    /// Delete every row held by `holder`; returns how many were removed
    pub fn release(&self, holder: &str) -> Result<usize> {
        let rows = self
            .db
            .conn()
            .execute("DELETE FROM locks WHERE holder = ?1", [holder])?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    const TTL: i64 = 30_000_000;

    fn create_test_db() -> (Database, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db = Database::new(&temp_dir.path().join("common.sqlite"))
            .expect("Failed to create database");
        (db, temp_dir)
    }

    #[test]
    fn test_free_lock_is_claimed() {
        let (db, _temp) = create_test_db();
        let store = LockStore::new(&db);

        assert_eq!(store.try_claim("op", "a", 1_000, TTL).unwrap(), Some(true));
        let record = store.get("op").unwrap().unwrap();
        assert_eq!(record.holder, "a");
        assert_eq!(record.locked_at, 1_000);
    }

    #[test]
    fn test_fresh_lock_is_not_overwritten() {
        let (db, _temp) = create_test_db();
        let store = LockStore::new(&db);

        store.try_claim("op", "a", 1_000, TTL).unwrap();
        let claimed = store.try_claim("op", "b", 1_000 + TTL - 1, TTL).unwrap();
        assert_ne!(claimed, Some(true));
        assert_eq!(store.holder("op").unwrap().as_deref(), Some("a"));
    }

    #[test]
    fn test_stale_lock_is_taken_over() {
        let (db, _temp) = create_test_db();
        let store = LockStore::new(&db);

        store.try_claim("op", "a", 1_000, TTL).unwrap();
        assert_eq!(
            store.try_claim("op", "b", 1_000 + TTL, TTL).unwrap(),
            Some(true)
        );
        let record = store.get("op").unwrap().unwrap();
        assert_eq!(record.holder, "b");
        assert_eq!(record.locked_at, 1_000 + TTL);
    }

    #[test]
    fn test_release_only_removes_own_rows() {
        let (db, _temp) = create_test_db();
        let store = LockStore::new(&db);

        store.try_claim("one", "a", 1_000, TTL).unwrap();
        store.try_claim("two", "b", 1_000, TTL).unwrap();

        assert_eq!(store.release("a").unwrap(), 1);
        assert_eq!(store.release("a").unwrap(), 0);
        assert!(store.get("one").unwrap().is_none());
        assert_eq!(store.holder("two").unwrap().as_deref(), Some("b"));
    }

    #[test]
    fn test_operations_are_independent() {
        let (db, _temp) = create_test_db();
        let store = LockStore::new(&db);

        assert_eq!(store.try_claim("one", "a", 1_000, TTL).unwrap(), Some(true));
        assert_eq!(store.try_claim("two", "b", 1_000, TTL).unwrap(), Some(true));
    }
}
