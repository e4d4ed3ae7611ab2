//! Incoming VoIP push payload

use serde::de::{self, Deserializer};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("invalid VoIP payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("VoIP payload must be a JSON object")]
    NotAnObject,
}

/// Routing data the server attaches to a call push
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallExtra {
    /// Account the call is addressed to
    #[serde(default)]
    pub recipient_id: Option<String>,
    #[serde(default)]
    pub chat_id: Option<String>,
}

/// Validated VoIP push
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoipPayload {
    pub id: String,
    pub caller_name: String,
    pub handle: String,
    pub is_video: bool,
    /// Present when the call already ended before the push arrived
    pub ended_at: Option<String>,
    pub extra: CallExtra,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPayload {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    caller_name: Option<String>,
    #[serde(default)]
    handle: Option<String>,
    #[serde(default, deserialize_with = "flexible_bool")]
    is_video: bool,
    #[serde(default, deserialize_with = "marker")]
    ended_at: Option<String>,
    #[serde(default)]
    extra: Option<CallExtra>,
}

impl VoipPayload {
    /// Parse the push dictionary. A missing or empty call id gets a fresh one.
    pub fn parse(raw: &[u8]) -> Result<Self, PayloadError> {
        let value: serde_json::Value = serde_json::from_slice(raw)?;
        Self::from_value(value)
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self, PayloadError> {
        if !value.is_object() {
            return Err(PayloadError::NotAnObject);
        }
        let raw: RawPayload = serde_json::from_value(value)?;

        let id = raw
            .id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        Ok(Self {
            id,
            caller_name: raw.caller_name.unwrap_or_default(),
            handle: raw.handle.unwrap_or_default(),
            is_video: raw.is_video,
            ended_at: raw.ended_at,
            extra: raw.extra.unwrap_or_default(),
        })
    }

    /// Stand-in for a push that could not be parsed; the call UI still has
    /// to show something
    pub fn placeholder() -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            caller_name: String::new(),
            handle: String::new(),
            is_video: false,
            ended_at: None,
            extra: CallExtra::default(),
        }
    }

    pub fn has_ended(&self) -> bool {
        self.ended_at.is_some()
    }

    pub fn chat_id(&self) -> Option<&str> {
        self.extra.chat_id.as_deref().filter(|id| !id.is_empty())
    }

    pub fn recipient_id(&self) -> Option<&str> {
        self.extra.recipient_id.as_deref().filter(|id| !id.is_empty())
    }
}

/// `true`/`false` either as JSON booleans or as strings
fn flexible_bool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Bool(b) => Ok(b),
        serde_json::Value::Null => Ok(false),
        serde_json::Value::String(s) => match s.to_ascii_lowercase().as_str() {
            "true" | "1" => Ok(true),
            "false" | "0" | "" => Ok(false),
            other => Err(de::Error::custom(format!("invalid isVideo value: {other}"))),
        },
        serde_json::Value::Number(n) => Ok(n.as_i64().unwrap_or(0) != 0),
        other => Err(de::Error::custom(format!("invalid isVideo value: {other}"))),
    }
}

/// Any non-null value marks the call as ended; kept as text for logging
fn marker<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) if s.is_empty() => None,
        serde_json::Value::String(s) => Some(s),
        other => Some(other.to_string()),
    })
}
