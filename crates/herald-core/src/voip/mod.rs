//! VoIP push handling
//!
//! The OS kills a process that receives a VoIP push without reporting an
//! incoming call, so every push is shown first and corrected afterwards:
//! see [`VoipAdmission`].

mod admission;
mod payload;

use anyhow::Result;
use async_trait::async_trait;

pub use admission::{AdmissionHandle, Confirmation, Decision, Evaluation, VoipAdmission};
pub use payload::{CallExtra, PayloadError, VoipPayload};

/// Why a reported call was ended right away
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndReason {
    /// No credentials for the addressed account
    Unauthorized,
    /// Ended before the push arrived, or answered on another device
    HandledRemotely,
    /// Same call reported moments ago
    Duplicate,
}

impl EndReason {
    /// Code handed to the call UI
    pub fn code(self) -> u8 {
        match self {
            Self::Unauthorized => 1,
            Self::HandledRemotely => 3,
            Self::Duplicate => 4,
        }
    }
}

/// System call UI
#[async_trait]
pub trait CallUi: Send + Sync {
    /// Show the incoming call. Must happen for every push.
    async fn report_incoming_call(&self, call: &VoipPayload) -> Result<()>;

    /// Dismiss a call shown earlier
    async fn end_call(&self, call_id: &str, reason: EndReason) -> Result<()>;
}
