//! Signed-in account lookup
//!
//! Rows are written by the main application at sign-in; background
//! processes only read them.

use anyhow::Result;
use rusqlite::OptionalExtension;

use super::database::Database;

pub struct AccountStore<'a> {
    db: &'a Database,
}

impl<'a> AccountStore<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// User id of the locally known account
    pub fn current(&self) -> Result<Option<String>> {
        let user_id = self
            .db
            .conn()
            .query_row("SELECT user_id FROM accounts LIMIT 1", [], |row| row.get(0))
            .optional()?;
        Ok(user_id)
    }
}
