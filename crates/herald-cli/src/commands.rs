//! Subcommand implementations
//!
//! Each returns the JSON value printed as the command result.

use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::{json, Map, Value};

use herald_core::bridge::{HostPlatform, MethodCall, MethodChannel};
use herald_core::delivery::AckOutcome;
use herald_core::extension::{NotificationContent, ServiceExtension};
use herald_core::notifications::{FileNotificationCenter, NotificationCenter};
use herald_core::voip::{Confirmation, Decision, VoipAdmission};
use herald_core::{PushContext, SharedContainer};

use crate::console::ConsoleCallUi;

/// Payload bytes from a file, or stdin for `-`
pub fn read_payload(source: &str) -> Result<Vec<u8>> {
    if source == "-" {
        let mut raw = Vec::new();
        std::io::stdin()
            .read_to_end(&mut raw)
            .context("Failed to read payload from stdin")?;
        return Ok(raw);
    }
    std::fs::read(source).with_context(|| format!("Failed to read payload {}", source))
}

fn notification_center(container: &SharedContainer) -> Arc<FileNotificationCenter> {
    Arc::new(FileNotificationCenter::new(container.notifications_path()))
}

pub async fn ack(
    container: SharedContainer,
    budget: Duration,
    chat_id: &str,
    id: Option<String>,
    title: String,
    body: String,
) -> Result<Value> {
    container.ensure()?;
    let notifications = notification_center(&container);
    let extension = ServiceExtension::new(PushContext::from_container(container));

    let mut data = Map::new();
    data.insert("chatId".to_string(), Value::String(chat_id.to_string()));
    let request = NotificationContent {
        id: id.unwrap_or_else(|| chat_id.to_string()),
        title,
        body,
        data,
        ..Default::default()
    };

    let content = extension.receive(request);

    let acknowledgment = match tokio::time::timeout(budget, extension.finish()).await {
        Ok(outcome) => outcome.as_ref().map(ack_json).unwrap_or(Value::Null),
        Err(_) => {
            tracing::warn!(chat_id, "Out of time, delivering best attempt");
            extension.time_will_expire();
            json!({ "status": "expired" })
        }
    };

    if let Err(e) = notifications.post(content.to_delivered()) {
        tracing::warn!(error = %e, "Failed to record displayed notification");
    }

    Ok(json!({
        "notification": content,
        "acknowledgment": acknowledgment,
    }))
}

pub async fn voip(container: SharedContainer, budget: Duration, raw: &[u8]) -> Result<Value> {
    container.ensure()?;
    let ui = Arc::new(ConsoleCallUi::default());
    let admission = VoipAdmission::new(
        PushContext::from_container(container.clone()),
        ui.clone(),
        notification_center(&container),
    );

    let handle = admission.admit_raw(raw).await;
    let call_id = handle.call_id.clone();
    let evaluation = handle.evaluation.clone();
    let decision = match handle.decision {
        Decision::Keep => json!("keep"),
        Decision::End(reason) => json!({ "end": reason.code() }),
    };
    let shown = handle.shown;
    let confirmation = handle
        .confirmation_within(budget)
        .await
        .map(confirmation_name);

    Ok(json!({
        "callId": call_id,
        "shown": shown,
        "authorized": evaluation.authorized,
        "doReport": evaluation.do_report,
        "decision": decision,
        "confirmation": confirmation,
        "events": ui.transcript(),
    }))
}

pub fn bridge(container: SharedContainer, method: &str, args: &str) -> Result<Value> {
    let arguments: Value =
        serde_json::from_str(args).with_context(|| format!("Invalid JSON arguments: {}", args))?;
    let notifications = notification_center(&container);
    let channel = MethodChannel::new(container, Arc::new(HostPlatform), notifications);

    let response = channel.dispatch(&MethodCall::new(method, arguments));
    Ok(serde_json::to_value(response)?)
}

fn ack_json(outcome: &AckOutcome) -> Value {
    match outcome {
        AckOutcome::Acknowledged { exists } => json!({ "status": "acknowledged", "exists": exists }),
        AckOutcome::NoAccount => json!({ "status": "noAccount" }),
        AckOutcome::NoCredentials => json!({ "status": "noCredentials" }),
        AckOutcome::NotConfigured => json!({ "status": "notConfigured" }),
        AckOutcome::Failed(reason) => json!({ "status": "failed", "reason": reason }),
    }
}

fn confirmation_name(confirmation: Confirmation) -> &'static str {
    match confirmation {
        Confirmation::JoinedElsewhere => "joinedElsewhere",
        Confirmation::NotJoined => "notJoined",
        Confirmation::NoOngoingCall => "noOngoingCall",
        Confirmation::Unavailable => "unavailable",
        Confirmation::Cancelled => "cancelled",
    }
}
