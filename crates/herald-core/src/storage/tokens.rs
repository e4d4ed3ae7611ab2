//! Bearer token pairs
//!
//! Stored as JSON text in `tokens.credentials`, one row per user. The main
//! application writes the same rows, so the JSON layout and the timestamp
//! format follow what it produces.

use std::fmt;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

use super::database::Database;

/// One secret with its expiry
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    pub secret: String,
    #[serde(with = "app_timestamp")]
    pub expire_at: DateTime<Utc>,
}

impl Token {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expire_at
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("secret", &"<redacted>")
            .field("expire_at", &self.expire_at)
            .finish()
    }
}

/// Session the token pair belongs to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub user_agent: String,
    pub ip: String,
    #[serde(with = "app_timestamp")]
    pub last_activated_at: DateTime<Utc>,
}

/// Access and refresh tokens of one signed-in user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access: Token,
    pub refresh: Token,
    pub user_id: String,
    /// Rows written before sessions were tracked have no session
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<Session>,
}

impl TokenPair {
    /// Whether the access token needs a refresh at `now`
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        self.access.is_expired_at(now)
    }

    /// Whether the refresh token can still be exchanged at `now`
    pub fn can_refresh(&self, now: DateTime<Utc>) -> bool {
        !self.refresh.is_expired_at(now)
    }

    /// Encode into the persisted JSON text
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).context("Failed to encode credentials")
    }

    /// Decode from the persisted JSON text
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to decode credentials")
    }
}

/// Access to the `tokens` table
pub struct TokenStore<'a> {
    db: &'a Database,
}

impl<'a> TokenStore<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Token pair for `user_id`, if one is stored
    pub fn get(&self, user_id: &str) -> Result<Option<TokenPair>> {
        let json: Option<String> = self
            .db
            .conn()
            .query_row(
                "SELECT credentials FROM tokens WHERE user_id = ?1 LIMIT 1",
                [user_id],
                |row| row.get(0),
            )
            .optional()?;

        json.as_deref().map(TokenPair::from_json).transpose()
    }

    /// Whether any token row exists for `user_id`, without decoding it
    pub fn exists(&self, user_id: &str) -> Result<bool> {
        let found: Option<i64> = self
            .db
            .conn()
            .query_row(
                "SELECT 1 FROM tokens WHERE user_id = ?1 LIMIT 1",
                [user_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Insert or replace the pair keyed by its user id
    pub fn upsert(&self, pair: &TokenPair) -> Result<()> {
        let json = pair.to_json()?;
        self.db.conn().execute(
            "INSERT INTO tokens (user_id, credentials) VALUES (?1, ?2)
             ON CONFLICT(user_id) DO UPDATE SET credentials = excluded.credentials",
            params![pair.user_id, json],
        )?;
        Ok(())
    }
}

/// Timestamps as the main application writes them (`2024-05-01 12:30:00.000Z`),
/// also accepting RFC 3339 on read
pub mod app_timestamp {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3fZ";

    pub fn format(value: &DateTime<Utc>) -> String {
        value.format(FORMAT).to_string()
    }

    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.fZ") {
            return Some(naive.and_utc());
        }
        DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {raw}")))
    }
}
