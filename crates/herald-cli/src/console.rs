//! Call UI for a headless host
//!
//! There is no call screen to drive, so reported and ended calls are kept
//! as a transcript that ends up in the command output.

use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};

use herald_core::voip::{CallUi, EndReason, VoipPayload};

#[derive(Default)]
pub struct ConsoleCallUi {
    transcript: Mutex<Vec<Value>>,
}

impl ConsoleCallUi {
    pub fn transcript(&self) -> Vec<Value> {
        self.transcript
            .lock()
            .map(|t| t.clone())
            .unwrap_or_default()
    }

    fn record(&self, event: Value) {
        if let Ok(mut transcript) = self.transcript.lock() {
            transcript.push(event);
        }
    }
}

#[async_trait]
impl CallUi for ConsoleCallUi {
    async fn report_incoming_call(&self, call: &VoipPayload) -> Result<()> {
        tracing::info!(call_id = %call.id, caller = %call.caller_name, "Showing incoming call");
        self.record(json!({
            "event": "reportIncomingCall",
            "id": call.id,
            "callerName": call.caller_name,
            "handle": call.handle,
            "isVideo": call.is_video,
        }));
        Ok(())
    }

    async fn end_call(&self, call_id: &str, reason: EndReason) -> Result<()> {
        tracing::info!(call_id, reason = reason.code(), "Ending call");
        self.record(json!({
            "event": "endCall",
            "id": call_id,
            "reason": reason.code(),
        }));
        Ok(())
    }
}
