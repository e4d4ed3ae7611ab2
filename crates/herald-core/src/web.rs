//! Browser push routing
//!
//! Decisions the web service worker makes: which displayed notifications a
//! page asks to close, and where a notification click should go.

use std::str::FromStr;

use anyhow::Result;
use serde_json::{Map, Value};
use url::Url;

use crate::notifications::{cancel_by_thread_substring, NotificationCenter};

const CLOSE_ALL_PREFIX: &str = "closeAll:";

/// Message posted to the worker by an open page
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerCommand {
    /// Close every notification of a chat
    CloseAll { chat_id: String },
}

impl FromStr for WorkerCommand {
    type Err = anyhow::Error;

    fn from_str(message: &str) -> Result<Self> {
        match message.strip_prefix(CLOSE_ALL_PREFIX) {
            Some(chat_id) if !chat_id.is_empty() => Ok(Self::CloseAll {
                chat_id: chat_id.to_string(),
            }),
            Some(_) => anyhow::bail!("closeAll without chat id"),
            None => anyhow::bail!("unknown worker message: {message}"),
        }
    }
}

impl WorkerCommand {
    /// Apply the command; returns whether any notification was closed
    pub fn apply(&self, center: &dyn NotificationCenter) -> Result<bool> {
        match self {
            Self::CloseAll { chat_id } => cancel_by_thread_substring(center, chat_id),
        }
    }
}

/// A browser window controlled by the worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientWindow {
    pub id: String,
    pub url: Url,
    /// Detached call windows and the like; never reused for navigation
    pub popup: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickAction {
    /// Focus an existing window and navigate it
    Focus { window_id: String, url: Url },
    OpenWindow(Url),
}

/// Path a notification with `data` opens
pub fn deep_link(data: &Map<String, Value>) -> String {
    match data.get("chatId").and_then(Value::as_str) {
        Some(chat_id) if !chat_id.is_empty() => format!("/chat/{chat_id}"),
        _ => "/".to_string(),
    }
}

/// Where a click on a notification carrying `data` should go.
///
/// The first non-popup window on `origin` is reused; otherwise a new one
/// is opened.
pub fn route_click(origin: &Url, data: &Map<String, Value>, windows: &[ClientWindow]) -> Result<ClickAction> {
    let target = origin.join(&deep_link(data))?;

    let reusable = windows
        .iter()
        .find(|w| !w.popup && w.url.origin() == origin.origin());

    Ok(match reusable {
        Some(window) => ClickAction::Focus {
            window_id: window.id.clone(),
            url: target,
        },
        None => ClickAction::OpenWindow(target),
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::notifications::{DeliveredNotification, MemoryNotificationCenter};

    fn origin() -> Url {
        Url::parse("https://app.example.com").unwrap()
    }

    fn window(id: &str, url: &str, popup: bool) -> ClientWindow {
        ClientWindow {
            id: id.to_string(),
            url: Url::parse(url).unwrap(),
            popup,
        }
    }

    fn chat_data(chat_id: &str) -> Map<String, Value> {
        json!({ "chatId": chat_id }).as_object().unwrap().clone()
    }

    #[test]
    fn test_parse_close_all() {
        assert_eq!(
            "closeAll:chat-1".parse::<WorkerCommand>().unwrap(),
            WorkerCommand::CloseAll {
                chat_id: "chat-1".to_string()
            }
        );
        assert!("closeAll:".parse::<WorkerCommand>().is_err());
        assert!("ping".parse::<WorkerCommand>().is_err());
    }

    #[test]
    fn test_close_all_removes_chat_notifications() {
        let center = MemoryNotificationCenter::new();
        center.post(DeliveredNotification::new("1", "chat-1")).unwrap();
        center.post(DeliveredNotification::new("2", "chat-2")).unwrap();

        let command: WorkerCommand = "closeAll:chat-1".parse().unwrap();
        assert!(command.apply(&center).unwrap());
        assert_eq!(center.delivered().unwrap().len(), 1);
        assert!(!command.apply(&center).unwrap());
    }

    #[test]
    fn test_deep_link() {
        assert_eq!(deep_link(&chat_data("abc")), "/chat/abc");
        assert_eq!(deep_link(&Map::new()), "/");
    }

    #[test]
    fn test_click_focuses_first_eligible_window() {
        let windows = [
            window("popup", "https://app.example.com/call", true),
            window("other", "https://other.example.com/", false),
            window("main", "https://app.example.com/chat/x", false),
            window("second", "https://app.example.com/", false),
        ];

        let action = route_click(&origin(), &chat_data("abc"), &windows).unwrap();
        assert_eq!(
            action,
            ClickAction::Focus {
                window_id: "main".to_string(),
                url: Url::parse("https://app.example.com/chat/abc").unwrap(),
            }
        );
    }

    #[test]
    fn test_click_opens_window_when_none_eligible() {
        let windows = [window("popup", "https://app.example.com/call", true)];

        let action = route_click(&origin(), &Map::new(), &windows).unwrap();
        assert_eq!(
            action,
            ClickAction::OpenWindow(Url::parse("https://app.example.com/").unwrap())
        );
    }
}
