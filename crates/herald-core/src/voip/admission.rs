//! Call admission for incoming VoIP pushes
//!
//! Two phases:
//! 1. Report the call to the UI. Mandatory and issued immediately, in
//!    parallel with the local authorization and deduplication checks.
//! 2. Correct it: end the call if it is unauthorized, already over, or a
//!    repeat. For calls that stay up, a cancellable remote confirmation
//!    checks whether the user already joined from another device and ends
//!    the call if so.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{CallUi, EndReason, VoipPayload};
use crate::constants::calls;
use crate::context::PushContext;
use crate::notifications::{cancel_by_thread_substring, NotificationCenter};
use crate::session::SessionKeeper;
use crate::storage::{now_micros, AccountStore, CallAccountingStore, TokenStore};

/// Result of the local checks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub authorized: bool,
    /// Account the call is for, when authorized
    pub user_id: Option<String>,
    /// False when the same call was reported within the dedup window
    pub do_report: bool,
}

impl Evaluation {
    fn unauthorized() -> Self {
        Self {
            authorized: false,
            user_id: None,
            do_report: true,
        }
    }
}

/// What phase 2 does with the reported call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Keep,
    End(EndReason),
}

impl Decision {
    pub fn from_evaluation(evaluation: &Evaluation, payload: &VoipPayload) -> Self {
        if !evaluation.authorized {
            Self::End(EndReason::Unauthorized)
        } else if payload.has_ended() {
            Self::End(EndReason::HandledRemotely)
        } else if !evaluation.do_report {
            Self::End(EndReason::Duplicate)
        } else {
            Self::Keep
        }
    }
}

/// How the remote confirmation finished
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Confirmation {
    /// The user is already in the call elsewhere; the call was ended
    JoinedElsewhere,
    /// The call is ongoing and the user has not joined yet
    NotJoined,
    /// The chat has no ongoing call
    NoOngoingCall,
    /// Could not check: no API, no credentials, or the request failed
    Unavailable,
    Cancelled,
}

/// Handle on one admitted push
#[derive(Debug)]
pub struct AdmissionHandle {
    pub call_id: String,
    pub evaluation: Evaluation,
    pub decision: Decision,
    /// Whether the call UI accepted the report
    pub shown: bool,
    confirmation: Option<JoinHandle<Confirmation>>,
    cancel: CancellationToken,
}

impl AdmissionHandle {
    /// Stop the remote confirmation, e.g. when the host runs out of time
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait up to `budget` for the remote confirmation, cancelling it when
    /// time runs out
    pub async fn confirmation_within(self, budget: Duration) -> Option<Confirmation> {
        let cancel = self.cancel.clone();
        let call_id = self.call_id.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(budget).await;
            debug!(%call_id, "Call confirmation out of time");
            cancel.cancel();
        });
        let confirmation = self.confirmation().await;
        timer.abort();
        confirmation
    }

    /// Wait for the remote confirmation, if one was started
    pub async fn confirmation(self) -> Option<Confirmation> {
        let task = self.confirmation?;
        match task.await {
            Ok(confirmation) => Some(confirmation),
            Err(e) => {
                warn!(call_id = %self.call_id, error = %e, "Call confirmation task failed");
                Some(Confirmation::Unavailable)
            }
        }
    }
}

#[derive(Clone)]
pub struct VoipAdmission {
    ctx: PushContext,
    ui: Arc<dyn CallUi>,
    notifications: Arc<dyn NotificationCenter>,
}

impl VoipAdmission {
    pub fn new(
        ctx: PushContext,
        ui: Arc<dyn CallUi>,
        notifications: Arc<dyn NotificationCenter>,
    ) -> Self {
        Self {
            ctx,
            ui,
            notifications,
        }
    }

    /// Handle a raw push. Unparseable pushes are still shown, then ended
    /// as unauthorized.
    pub async fn admit_raw(&self, raw: &[u8]) -> AdmissionHandle {
        match VoipPayload::parse(raw) {
            Ok(payload) => self.admit(payload).await,
            Err(e) => {
                warn!(error = %e, "Rejecting malformed VoIP payload");
                let payload = VoipPayload::placeholder();
                let shown = self.report(&payload).await;
                let decision = Decision::End(EndReason::Unauthorized);
                if shown {
                    self.end(&payload.id, EndReason::Unauthorized).await;
                }
                AdmissionHandle {
                    call_id: payload.id,
                    evaluation: Evaluation::unauthorized(),
                    decision,
                    shown,
                    confirmation: None,
                    cancel: CancellationToken::new(),
                }
            }
        }
    }

    /// Handle one parsed push. Never fails; see [`AdmissionHandle`].
    pub async fn admit(&self, payload: VoipPayload) -> AdmissionHandle {
        let cancel = CancellationToken::new();

        let (shown, evaluation) =
            tokio::join!(self.report(&payload), self.evaluate_in_background(&payload));

        let decision = Decision::from_evaluation(&evaluation, &payload);
        info!(
            call_id = %payload.id,
            authorized = evaluation.authorized,
            do_report = evaluation.do_report,
            shown,
            ?decision,
            "VoIP call admitted"
        );

        // Corrections only ever follow a call the UI accepted
        let mut confirmation = None;
        if shown {
            match decision {
                Decision::End(reason) => self.end(&payload.id, reason).await,
                Decision::Keep => {
                    confirmation = self.spawn_confirmation(&payload, &evaluation, cancel.clone());
                }
            }
        }

        AdmissionHandle {
            call_id: payload.id,
            evaluation,
            decision,
            shown,
            confirmation,
            cancel,
        }
    }

    /// Local checks against the credential store at `now` (microseconds).
    ///
    /// Store failures while authorizing count as unauthorized; failures
    /// while deduplicating leave the call reportable.
    pub fn evaluate_at(&self, payload: &VoipPayload, now: i64) -> Evaluation {
        let user_id = match self.authorized_user(payload) {
            Ok(Some(user_id)) => user_id,
            Ok(None) => {
                info!(call_id = %payload.id, "No credentials for call recipient");
                return Evaluation::unauthorized();
            }
            Err(e) => {
                warn!(call_id = %payload.id, error = %e, "Authorization check failed");
                return Evaluation::unauthorized();
            }
        };

        let do_report = match self.account_call(&payload.id, now) {
            Ok(do_report) => do_report,
            Err(e) => {
                warn!(call_id = %payload.id, error = %e, "Call deduplication failed");
                true
            }
        };

        Evaluation {
            authorized: true,
            user_id: Some(user_id),
            do_report,
        }
    }

    async fn evaluate_in_background(&self, payload: &VoipPayload) -> Evaluation {
        let this = self.clone();
        let payload = payload.clone();
        match tokio::task::spawn_blocking(move || this.evaluate_at(&payload, now_micros())).await {
            Ok(evaluation) => evaluation,
            Err(e) => {
                warn!(error = %e, "Call evaluation task failed");
                Evaluation::unauthorized()
            }
        }
    }

    /// Account the call is for, if it has credentials
    fn authorized_user(&self, payload: &VoipPayload) -> anyhow::Result<Option<String>> {
        let db = self.ctx.open_db()?;
        let Some(account) = AccountStore::new(&db).current()? else {
            return Ok(None);
        };

        let user_id = payload
            .recipient_id()
            .map(str::to_string)
            .unwrap_or(account);

        if TokenStore::new(&db).exists(&user_id)? {
            Ok(Some(user_id))
        } else {
            Ok(None)
        }
    }

    /// Record the call; false if it was already recorded within the window
    fn account_call(&self, call_id: &str, now: i64) -> anyhow::Result<bool> {
        let db = self.ctx.open_db()?;
        let window = i64::try_from(calls::DEDUP_WINDOW.as_micros()).unwrap_or(i64::MAX);

        let claimed = CallAccountingStore::new(&db).claim(call_id, now, window)?;
        if !claimed {
            debug!(call_id, "Call reported recently");
        }
        Ok(claimed)
    }

    fn spawn_confirmation(
        &self,
        payload: &VoipPayload,
        evaluation: &Evaluation,
        cancel: CancellationToken,
    ) -> Option<JoinHandle<Confirmation>> {
        if !evaluation.authorized || !evaluation.do_report || payload.has_ended() {
            return None;
        }
        let user_id = evaluation.user_id.clone()?;
        let chat_id = payload.chat_id()?.to_string();
        let call_id = payload.id.clone();
        let this = self.clone();

        Some(tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(%call_id, "Call confirmation cancelled");
                    Confirmation::Cancelled
                }
                confirmation = this.confirm(&call_id, &chat_id, &user_id) => confirmation,
            }
        }))
    }

    async fn confirm(&self, call_id: &str, chat_id: &str, user_id: &str) -> Confirmation {
        let Some(api) = self.ctx.api().cloned() else {
            debug!(call_id, "API not configured, skipping call confirmation");
            return Confirmation::Unavailable;
        };

        let session = match SessionKeeper::new(self.ctx.clone()).authorize(user_id).await {
            Ok(Some(session)) => session,
            Ok(None) => return Confirmation::Unavailable,
            Err(e) => {
                warn!(call_id, error = %e, "Failed to authorize call confirmation");
                return Confirmation::Unavailable;
            }
        };

        let result = api.ongoing_call(session.access_secret(), chat_id).await;
        drop(session);

        let call = match result {
            Ok(Some(call)) => call,
            Ok(None) => return Confirmation::NoOngoingCall,
            Err(e) => {
                warn!(call_id, chat_id, error = %e, "Failed to read ongoing call");
                return Confirmation::Unavailable;
            }
        };

        if !call.has_member(user_id) {
            return Confirmation::NotJoined;
        }

        info!(call_id, chat_id, "Call already joined on another device");
        self.end(call_id, EndReason::HandledRemotely).await;
        if let Err(e) = cancel_by_thread_substring(self.notifications.as_ref(), chat_id) {
            warn!(chat_id, error = %e, "Failed to clean up call notifications");
        }
        Confirmation::JoinedElsewhere
    }

    async fn report(&self, payload: &VoipPayload) -> bool {
        match self.ui.report_incoming_call(payload).await {
            Ok(()) => true,
            Err(e) => {
                warn!(call_id = %payload.id, error = %e, "Failed to report incoming call");
                false
            }
        }
    }

    async fn end(&self, call_id: &str, reason: EndReason) {
        if let Err(e) = self.ui.end_call(call_id, reason).await {
            warn!(call_id, reason = reason.code(), error = %e, "Failed to end call");
        }
    }
}
