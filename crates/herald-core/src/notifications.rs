//! Displayed notifications and their cleanup
//!
//! [`NotificationCenter`] abstracts the OS list of notifications currently
//! on screen. Cleanup removes the ones made obsolete by something that
//! happened elsewhere, either by exact id (tag) or by chat thread.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A notification currently shown to the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveredNotification {
    /// Identifier (tag) the notification was posted with
    pub id: String,
    /// Thread identifier, normally derived from the chat id
    #[serde(default)]
    pub thread: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
}

impl DeliveredNotification {
    pub fn new(id: impl Into<String>, thread: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            thread: thread.into(),
            title: String::new(),
            body: String::new(),
        }
    }
}

/// OS notification list
pub trait NotificationCenter: Send + Sync {
    fn delivered(&self) -> Result<Vec<DeliveredNotification>>;
    fn post(&self, notification: DeliveredNotification) -> Result<()>;
    fn remove(&self, ids: &[String]) -> Result<()>;
}

/// Remove the notification posted as `tag`, if it is still shown
pub fn cancel_by_tag(center: &dyn NotificationCenter, tag: &str) -> Result<()> {
    center.remove(&[tag.to_string()])
}

/// Remove every notification whose thread contains `thread`.
///
/// Returns whether anything matched. An empty `thread` matches nothing.
pub fn cancel_by_thread_substring(center: &dyn NotificationCenter, thread: &str) -> Result<bool> {
    if thread.is_empty() {
        return Ok(false);
    }

    let matching: Vec<String> = center
        .delivered()?
        .into_iter()
        .filter(|n| n.thread.contains(thread))
        .map(|n| n.id)
        .collect();

    if matching.is_empty() {
        return Ok(false);
    }

    debug!(thread, count = matching.len(), "Removing notifications");
    center.remove(&matching)?;
    Ok(true)
}

/// In-process notification list
#[derive(Debug, Default)]
pub struct MemoryNotificationCenter {
    shown: Mutex<Vec<DeliveredNotification>>,
}

impl MemoryNotificationCenter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl NotificationCenter for MemoryNotificationCenter {
    fn delivered(&self) -> Result<Vec<DeliveredNotification>> {
        Ok(self.shown.lock().clone())
    }

    fn post(&self, notification: DeliveredNotification) -> Result<()> {
        let mut shown = self.shown.lock();
        shown.retain(|n| n.id != notification.id);
        shown.push(notification);
        Ok(())
    }

    fn remove(&self, ids: &[String]) -> Result<()> {
        self.shown.lock().retain(|n| !ids.contains(&n.id));
        Ok(())
    }
}

/// Notification list kept as JSON in the shared container, so that
/// separate host processes see the same set
#[derive(Debug)]
pub struct FileNotificationCenter {
    path: PathBuf,
    // Serializes read-modify-write within this process
    write_lock: Mutex<()>,
}

impl FileNotificationCenter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<Vec<DeliveredNotification>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        if contents.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse {}", self.path.display()))
    }

    fn save(&self, notifications: &[DeliveredNotification]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(notifications)?)?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to write {}", self.path.display()))
    }
}

impl NotificationCenter for FileNotificationCenter {
    fn delivered(&self) -> Result<Vec<DeliveredNotification>> {
        self.load()
    }

    fn post(&self, notification: DeliveredNotification) -> Result<()> {
        let _guard = self.write_lock.lock();
        let mut shown = self.load()?;
        shown.retain(|n| n.id != notification.id);
        shown.push(notification);
        self.save(&shown)
    }

    fn remove(&self, ids: &[String]) -> Result<()> {
        let _guard = self.write_lock.lock();
        let mut shown = self.load()?;
        let before = shown.len();
        shown.retain(|n| !ids.contains(&n.id));
        if shown.len() != before {
            self.save(&shown)?;
        }
        Ok(())
    }
}
