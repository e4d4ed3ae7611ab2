//! Delivery acknowledgment
//!
//! When a message push arrives, the extension reads the chat it belongs to.
//! The read doubles as a delivery report on the server side and tells us
//! whether the chat still exists.
//!
//! Nothing here may take the host down: every failure is logged and turned
//! into an [`AckOutcome`].

use tracing::{info, warn};

use crate::context::PushContext;
use crate::session::SessionKeeper;
use crate::storage::AccountStore;

/// What [`DeliveryAcknowledger::acknowledge`] ended up doing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AckOutcome {
    /// The chat was read; `exists` is false if the server no longer has it
    Acknowledged { exists: bool },
    /// No signed-in account in the shared store
    NoAccount,
    /// The account has no stored credentials
    NoCredentials,
    /// No API endpoint configured in the shared defaults
    NotConfigured,
    /// Store or remote failure, already logged
    Failed(String),
}

impl AckOutcome {
    pub fn is_acknowledged(&self) -> bool {
        matches!(self, Self::Acknowledged { .. })
    }
}

#[derive(Clone)]
pub struct DeliveryAcknowledger {
    ctx: PushContext,
}

impl DeliveryAcknowledger {
    pub fn new(ctx: PushContext) -> Self {
        Self { ctx }
    }

    /// Report delivery of a push for `chat_id`.
    ///
    /// Runs under the account's session lock so it never races a token
    /// refresh in another process; the lock is released before returning
    /// whatever the remote call did.
    pub async fn acknowledge(&self, chat_id: &str) -> AckOutcome {
        let account = match self.ctx.open_db().and_then(|db| AccountStore::new(&db).current()) {
            Ok(Some(user_id)) => user_id,
            Ok(None) => {
                info!(chat_id, "No account signed in, skipping acknowledgment");
                return AckOutcome::NoAccount;
            }
            Err(e) => {
                warn!(chat_id, error = %e, "Failed to read account");
                return AckOutcome::Failed(e.to_string());
            }
        };

        let Some(api) = self.ctx.api().cloned() else {
            warn!(chat_id, "API not configured, skipping acknowledgment");
            return AckOutcome::NotConfigured;
        };

        let session = match SessionKeeper::new(self.ctx.clone()).authorize(&account).await {
            Ok(Some(session)) => session,
            Ok(None) => return AckOutcome::NoCredentials,
            Err(e) => {
                warn!(chat_id, user_id = %account, error = %e, "Failed to authorize");
                return AckOutcome::Failed(e.to_string());
            }
        };

        let result = api.chat_exists(session.access_secret(), chat_id).await;

        if let Err(e) = session.release() {
            warn!(chat_id, error = %e, "Failed to release session lock");
        }

        match result {
            Ok(exists) => {
                info!(chat_id, exists, "Delivery acknowledged");
                AckOutcome::Acknowledged { exists }
            }
            Err(e) => {
                warn!(chat_id, error = %e, transient = e.is_transient(), "Acknowledgment failed");
                AckOutcome::Failed(e.to_string())
            }
        }
    }
}
