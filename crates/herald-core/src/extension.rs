//! Notification-service extension host
//!
//! The OS hands every message push to the extension before displaying it
//! and gives it a short time to finish. The content goes back right away;
//! the delivery acknowledgment continues in the background until it
//! completes or the OS announces the deadline.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::context::PushContext;
use crate::delivery::{AckOutcome, DeliveryAcknowledger};
use crate::notifications::DeliveredNotification;

/// Content of a message push
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationContent {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub thread: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
    /// Custom keys of the push
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl NotificationContent {
    pub fn chat_id(&self) -> Option<&str> {
        self.data
            .get("chatId")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
    }

    pub fn to_delivered(&self) -> DeliveredNotification {
        DeliveredNotification {
            id: self.id.clone(),
            thread: self.thread.clone(),
            title: self.title.clone(),
            body: self.body.clone(),
        }
    }
}

struct PendingAck {
    content: NotificationContent,
    cancel: CancellationToken,
    task: Option<JoinHandle<AckOutcome>>,
}

pub struct ServiceExtension {
    acknowledger: DeliveryAcknowledger,
    pending: Mutex<Option<PendingAck>>,
}

impl ServiceExtension {
    pub fn new(ctx: PushContext) -> Self {
        Self {
            acknowledger: DeliveryAcknowledger::new(ctx),
            pending: Mutex::new(None),
        }
    }

    /// Take a push and return the content to display.
    ///
    /// If the push belongs to a chat, its acknowledgment starts in the
    /// background; see [`Self::finish`] and [`Self::time_will_expire`].
    pub fn receive(&self, request: NotificationContent) -> NotificationContent {
        let mut content = request;
        if content.thread.is_empty() {
            if let Some(chat_id) = content.chat_id() {
                content.thread = chat_id.to_string();
            }
        }

        let cancel = CancellationToken::new();
        let task = content.chat_id().map(|chat_id| {
            let chat_id = chat_id.to_string();
            let acknowledger = self.acknowledger.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!(%chat_id, "Acknowledgment cancelled");
                        AckOutcome::Failed("cancelled".to_string())
                    }
                    outcome = acknowledger.acknowledge(&chat_id) => outcome,
                }
            })
        });

        let previous = self.pending.lock().replace(PendingAck {
            content: content.clone(),
            cancel,
            task,
        });
        if let Some(previous) = previous {
            // One push at a time per extension instance
            warn!(id = %previous.content.id, "Replacing unfinished notification");
            previous.cancel.cancel();
        }

        content
    }

    /// Wait for the background acknowledgment of the current push
    pub async fn finish(&self) -> Option<AckOutcome> {
        let task = self.pending.lock().as_mut().and_then(|p| p.task.take())?;
        match task.await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                warn!(error = %e, "Acknowledgment task failed");
                Some(AckOutcome::Failed(e.to_string()))
            }
        }
    }

    /// The OS is about to stop the extension: abandon the acknowledgment
    /// and hand back the best content available
    pub fn time_will_expire(&self) -> Option<NotificationContent> {
        let pending = self.pending.lock().take()?;
        pending.cancel.cancel();
        Some(pending.content)
    }
}
