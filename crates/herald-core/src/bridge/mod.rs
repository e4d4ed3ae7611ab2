//! Method-call bridge to the GUI application
//!
//! The application calls into the native shell by method name with a JSON
//! argument map, and gets back a success value, an error with a code, or
//! "not implemented". Method names are the wire contract.

mod channel;
#[cfg(unix)]
pub mod tee;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub use channel::MethodChannel;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodCall {
    pub method: String,
    #[serde(default)]
    pub arguments: Value,
}

impl MethodCall {
    pub fn new(method: impl Into<String>, arguments: Value) -> Self {
        Self {
            method: method.into(),
            arguments,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum MethodResponse {
    Success {
        result: Value,
    },
    Error {
        code: String,
        message: String,
    },
    NotImplemented,
}

impl MethodResponse {
    pub fn success(result: impl Into<Value>) -> Self {
        Self::Success {
            result: result.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// Failure of a bridge method, reported to the caller with its code
#[derive(Debug, Error)]
#[error("{code}: {message}")]
pub struct MethodError {
    pub code: &'static str,
    pub message: String,
}

impl MethodError {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn invalid_arguments(message: impl Into<String>) -> Self {
        Self::new("INVALID_ARGUMENTS", message)
    }
}

impl From<MethodError> for MethodResponse {
    fn from(e: MethodError) -> Self {
        Self::Error {
            code: e.code.to_string(),
            message: e.message,
        }
    }
}

/// Operating system services behind the bridge
pub trait Platform: Send + Sync {
    /// Whether the app may draw over other apps (incoming call overlay)
    fn can_draw_overlays(&self) -> bool;

    fn open_overlay_settings(&self) -> anyhow::Result<()>;

    /// Show the app above the lock screen, e.g. for an answered call
    fn foreground_from_lockscreen(&self) -> anyhow::Result<()>;

    /// CPU architecture name, if the OS reports one
    fn architecture(&self) -> Option<String>;
}

/// Desktop host: overlays are always allowed and there is no lock screen
/// to leave
#[derive(Debug, Default, Clone, Copy)]
pub struct HostPlatform;

impl Platform for HostPlatform {
    fn can_draw_overlays(&self) -> bool {
        true
    }

    fn open_overlay_settings(&self) -> anyhow::Result<()> {
        Ok(())
    }

    fn foreground_from_lockscreen(&self) -> anyhow::Result<()> {
        Ok(())
    }

    fn architecture(&self) -> Option<String> {
        Some(std::env::consts::ARCH.to_string()).filter(|arch| !arch.is_empty())
    }
}
