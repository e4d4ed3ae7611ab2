//! Remote messenger API
//!
//! The background pipeline needs three calls: exchanging a refresh token,
//! probing that a chat is still there (which also counts as delivery on the
//! server), and reading the ongoing call of a chat.

mod client;
mod error;
pub mod types;

use async_trait::async_trait;

pub use client::GraphQlClient;
pub use error::ApiError;
pub use types::{CallMember, OngoingCall, RemoteUser};

use crate::storage::TokenPair;

/// Remote calls used by the pipeline
#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// Exchange a refresh secret for a new token pair
    async fn refresh_session(&self, refresh_secret: &str) -> Result<TokenPair, ApiError>;

    /// Read the first item of `chat_id`; `false` if the chat does not exist
    async fn chat_exists(&self, access_secret: &str, chat_id: &str) -> Result<bool, ApiError>;

    /// Call currently running in `chat_id`, if any
    async fn ongoing_call(
        &self,
        access_secret: &str,
        chat_id: &str,
    ) -> Result<Option<OngoingCall>, ApiError>;
}
