//! Calls already reported to the call UI
//!
//! The OS may deliver the same VoIP push more than once. Each call id is
//! recorded with the time it was first reported (microseconds) so repeats
//! can be recognised.

use anyhow::Result;
use rusqlite::{params, OptionalExtension};

use super::database::Database;

pub struct CallAccountingStore<'a> {
    db: &'a Database,
}

impl<'a> CallAccountingStore<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// When `call_id` was last accounted, if ever
    pub fn accounted_at(&self, call_id: &str) -> Result<Option<i64>> {
        let at = self
            .db
            .conn()
            .query_row(
                "SELECT at FROM call_kit_calls WHERE id = ?1",
                [call_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(at)
    }

    /// Record `call_id` as reported at `now_micros` unless it was already
    /// reported less than `window_micros` away from it.
    ///
    /// One conditional upsert, so two processes handling the same push
    /// cannot both win. Returns false for a repeat.
    pub fn claim(&self, call_id: &str, now_micros: i64, window_micros: i64) -> Result<bool> {
        let written: Option<i64> = self
            .db
            .conn()
            .query_row(
                "INSERT INTO call_kit_calls (id, at) VALUES (?1, ?2)
                 ON CONFLICT(id) DO UPDATE SET at = excluded.at
                 WHERE abs(?2 - call_kit_calls.at) >= ?3
                 RETURNING at",
                params![call_id, now_micros, window_micros],
                |row| row.get(0),
            )
            .optional()?;
        Ok(written.is_some())
    }
}
