//! Test doubles shared by the pipeline tests

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use parking_lot::Mutex;
use tempfile::TempDir;

use crate::api::{ApiError, OngoingCall, RemoteApi};
use crate::context::PushContext;
use crate::lock::LockConfig;
use crate::paths::SharedContainer;
use crate::storage::tokens::tests::sample_pair;
use crate::storage::{TokenPair, TokenStore};
use crate::voip::{CallUi, EndReason, VoipPayload};

/// Scripted remote API that counts calls
#[derive(Default)]
pub struct FakeApi {
    pub refreshed: Mutex<Option<Result<TokenPair, String>>>,
    pub chats: Mutex<HashMap<String, bool>>,
    pub calls: Mutex<HashMap<String, OngoingCall>>,
    pub fail_chat: Mutex<bool>,
    pub delay: Mutex<Option<Duration>>,
    pub refresh_calls: AtomicUsize,
    pub chat_calls: AtomicUsize,
    pub call_calls: AtomicUsize,
    pub last_bearer: Mutex<Option<String>>,
}

impl FakeApi {
    pub fn refresh_count(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn chat_count(&self) -> usize {
        self.chat_calls.load(Ordering::SeqCst)
    }

    pub fn call_count(&self) -> usize {
        self.call_calls.load(Ordering::SeqCst)
    }

    async fn maybe_delay(&self) {
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl RemoteApi for FakeApi {
    async fn refresh_session(&self, _refresh_secret: &str) -> Result<TokenPair, ApiError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        self.maybe_delay().await;
        match self.refreshed.lock().clone() {
            Some(Ok(pair)) => Ok(pair),
            Some(Err(code)) => Err(ApiError::Rejected(code)),
            None => Err(ApiError::GraphQl("no refresh scripted".to_string())),
        }
    }

    async fn chat_exists(&self, access_secret: &str, chat_id: &str) -> Result<bool, ApiError> {
        self.chat_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_bearer.lock() = Some(access_secret.to_string());
        self.maybe_delay().await;
        if *self.fail_chat.lock() {
            return Err(ApiError::Status {
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        Ok(self.chats.lock().get(chat_id).copied().unwrap_or(true))
    }

    async fn ongoing_call(
        &self,
        access_secret: &str,
        chat_id: &str,
    ) -> Result<Option<OngoingCall>, ApiError> {
        self.call_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_bearer.lock() = Some(access_secret.to_string());
        self.maybe_delay().await;
        Ok(self.calls.lock().get(chat_id).cloned())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEvent {
    Reported(String),
    /// Call id and end reason code
    Ended(String, u8),
}

/// Call UI that records what it was asked to do
#[derive(Default)]
pub struct RecordingCallUi {
    pub events: Mutex<Vec<UiEvent>>,
    pub fail_report: Mutex<bool>,
    /// How long reporting a call takes
    pub report_delay: Mutex<Option<Duration>>,
}

impl RecordingCallUi {
    pub fn events(&self) -> Vec<UiEvent> {
        self.events.lock().clone()
    }
}

#[async_trait]
impl CallUi for RecordingCallUi {
    async fn report_incoming_call(&self, call: &VoipPayload) -> anyhow::Result<()> {
        let delay = *self.report_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if *self.fail_report.lock() {
            anyhow::bail!("call UI unavailable");
        }
        self.events.lock().push(UiEvent::Reported(call.id.clone()));
        Ok(())
    }

    async fn end_call(&self, call_id: &str, reason: EndReason) -> anyhow::Result<()> {
        self.events
            .lock()
            .push(UiEvent::Ended(call_id.to_string(), reason.code()));
        Ok(())
    }
}

/// Temporary shared container with a fast-polling lock manager
pub fn test_context(temp: &TempDir) -> PushContext {
    PushContext::new(SharedContainer::at(temp.path()))
        .with_lock_config(LockConfig::default().with_poll_interval(Duration::from_millis(10)))
}

/// Insert the signed-in account and its token pair
pub fn sign_in(ctx: &PushContext, user_id: &str, access_expires_in: ChronoDuration) -> TokenPair {
    let db = ctx.open_db().unwrap();
    db.conn()
        .execute("INSERT OR REPLACE INTO accounts (user_id) VALUES (?1)", [user_id])
        .unwrap();
    let pair = sample_pair(user_id, access_expires_in);
    TokenStore::new(&db).upsert(&pair).unwrap();
    pair
}

/// Insert only the account row, without credentials
pub fn add_account(ctx: &PushContext, user_id: &str) {
    let db = ctx.open_db().unwrap();
    db.conn()
        .execute("INSERT OR REPLACE INTO accounts (user_id) VALUES (?1)", [user_id])
        .unwrap();
}
