//! Session refresh
//!
//! [`SessionRefresher`] performs the remote token exchange.
//! [`SessionKeeper`] wraps it in the cross-process lock so that the main
//! application and any number of extension processes never refresh the
//! same account at the same time, and persists the result.

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::api::{ApiError, RemoteApi};
use crate::context::PushContext;
use crate::lock::LockGuard;
use crate::storage::{TokenPair, TokenStore};

/// Lock serializing credential work for one account
pub fn refresh_lock_name(user_id: &str) -> String {
    format!("refreshSession({user_id})")
}

/// Exchanges refresh tokens for new token pairs
#[derive(Clone)]
pub struct SessionRefresher {
    api: Arc<dyn RemoteApi>,
}

impl SessionRefresher {
    pub fn new(api: Arc<dyn RemoteApi>) -> Self {
        Self { api }
    }

    /// New token pair for `pair`'s refresh secret.
    ///
    /// On failure the caller keeps using `pair`.
    pub async fn refresh(&self, pair: &TokenPair) -> Result<TokenPair, ApiError> {
        let refreshed = self.api.refresh_session(&pair.refresh.secret).await?;
        if refreshed.user_id != pair.user_id {
            warn!(
                expected = %pair.user_id,
                actual = %refreshed.user_id,
                "Refreshed session belongs to a different user"
            );
        }
        Ok(refreshed)
    }
}

/// Credentials usable for remote calls, with the account lock held.
///
/// Remote calls made while this is alive cannot race a refresh in another
/// process. Dropping it releases the lock.
pub struct AuthorizedSession {
    credentials: TokenPair,
    refreshed: bool,
    guard: LockGuard,
}

impl AuthorizedSession {
    pub fn credentials(&self) -> &TokenPair {
        &self.credentials
    }

    pub fn access_secret(&self) -> &str {
        &self.credentials.access.secret
    }

    /// Whether the credentials were refreshed during this authorization
    pub fn was_refreshed(&self) -> bool {
        self.refreshed
    }

    /// Release the account lock now
    pub fn release(self) -> Result<()> {
        self.guard.release()
    }
}

/// Loads, refreshes and persists credentials under the account lock
#[derive(Clone)]
pub struct SessionKeeper {
    ctx: PushContext,
}

impl SessionKeeper {
    pub fn new(ctx: PushContext) -> Self {
        Self { ctx }
    }

    /// Lock the account and return usable credentials.
    ///
    /// `Ok(None)` when no token pair is stored for `user_id`. Refresh
    /// failures are logged and the stored pair is returned as is.
    pub async fn authorize(&self, user_id: &str) -> Result<Option<AuthorizedSession>> {
        let guard = self.ctx.locks().lock(&refresh_lock_name(user_id)).await?;

        // Read only after locking: another process may have just refreshed
        let stored = {
            let db = self.ctx.open_db()?;
            TokenStore::new(&db).get(user_id)?
        };
        let Some(mut credentials) = stored else {
            info!(user_id, "No credentials stored for account");
            return Ok(None);
        };

        let mut refreshed = false;
        let now = Utc::now();
        if credentials.needs_refresh(now) {
            match self.refresh_and_store(&credentials).await {
                Some(fresh) => {
                    credentials = fresh;
                    refreshed = true;
                }
                None => debug!(user_id, "Continuing with stored credentials"),
            }
        }

        Ok(Some(AuthorizedSession {
            credentials,
            refreshed,
            guard,
        }))
    }

    async fn refresh_and_store(&self, stale: &TokenPair) -> Option<TokenPair> {
        let user_id = stale.user_id.as_str();

        if !stale.can_refresh(Utc::now()) {
            warn!(user_id, "Refresh token expired, cannot refresh session");
            return None;
        }

        let Some(api) = self.ctx.api() else {
            warn!(user_id, "Access token expired but API is not configured");
            return None;
        };

        let fresh = match SessionRefresher::new(api.clone()).refresh(stale).await {
            Ok(fresh) => fresh,
            Err(e) => {
                warn!(user_id, error = %e, transient = e.is_transient(), "Session refresh failed");
                return None;
            }
        };

        let persisted = self
            .ctx
            .open_db()
            .and_then(|db| TokenStore::new(&db).upsert(&fresh));
        match persisted {
            Ok(()) => info!(user_id, "Session refreshed"),
            // Still usable for this run; the app refreshes again on its own
            Err(e) => warn!(user_id, error = %e, "Failed to persist refreshed session"),
        }

        Some(fresh)
    }
}
