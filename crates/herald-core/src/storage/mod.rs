//! Persistence layer
//!
//! SQLite-based credential store shared with the main application:
//! - Signed-in account
//! - Bearer token pairs
//! - Cross-process locks
//! - Reported VoIP calls
//!
//! Plus the JSON defaults file written through the bridge.

use chrono::Utc;

mod accounts;
mod call_accounting;
mod database;
pub mod defaults;
mod locks;
pub mod tokens;

pub use accounts::AccountStore;
pub use call_accounting::CallAccountingStore;
pub use database::{is_busy, Database};
pub use defaults::{Defaults, NotificationChannel};
pub use locks::{LockRecord, LockStore};
pub use tokens::{Session, Token, TokenPair, TokenStore};

/// Current time in microseconds since the Unix epoch, the unit of `locks`
/// and `call_kit_calls` timestamps
#[inline]
pub fn now_micros() -> i64 {
    Utc::now().timestamp_micros()
}
