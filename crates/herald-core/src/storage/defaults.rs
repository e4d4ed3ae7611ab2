//! Shared key/value defaults
//!
//! The main application writes plain string settings here through the
//! bridge (`writeDefaults`), and background processes read them: most
//! importantly the API `url` and `endpoint`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

const CHANNEL_PREFIX: &str = "channel.";

/// Android-style notification channel descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationChannel {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub sound: Option<String>,
}

/// Defaults file contents
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Defaults {
    #[serde(flatten)]
    values: BTreeMap<String, String>,
}

impl Defaults {
    /// Load from `path`; a missing file is an empty set of defaults
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read defaults {}", path.display()))?;
        let defaults = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse defaults {}", path.display()))?;
        Ok(defaults)
    }

    /// Write to `path` atomically (temp file + rename)
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        let tmp = tmp_path(path);
        fs::write(&tmp, contents)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Ok(metadata) = fs::metadata(&tmp) {
                let mut permissions = metadata.permissions();
                permissions.set_mode(0o600);
                let _ = fs::set_permissions(&tmp, permissions);
            }
        }

        fs::rename(&tmp, path)
            .with_context(|| format!("Failed to write defaults {}", path.display()))?;
        Ok(())
    }

    /// Read-modify-write a single key
    pub fn write_key(path: &Path, key: &str, value: &str) -> Result<()> {
        let mut defaults = Self::load_from_path(path)?;
        defaults.set(key, value);
        defaults.save_to_path(path)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    /// Store a channel descriptor; an existing channel with the same id is replaced
    pub fn set_channel(&mut self, channel: &NotificationChannel) -> Result<()> {
        let encoded = serde_json::to_string(channel)?;
        self.set(format!("{CHANNEL_PREFIX}{}", channel.id), encoded);
        Ok(())
    }

    pub fn channel(&self, id: &str) -> Option<NotificationChannel> {
        self.get(&format!("{CHANNEL_PREFIX}{id}"))
            .and_then(|raw| serde_json::from_str(raw).ok())
    }

    pub fn channels(&self) -> Vec<NotificationChannel> {
        self.values
            .iter()
            .filter(|(key, _)| key.starts_with(CHANNEL_PREFIX))
            .filter_map(|(_, raw)| serde_json::from_str(raw).ok())
            .collect()
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(format!(".{}.tmp", std::process::id()));
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_missing_file_is_empty() {
        let temp = TempDir::new().unwrap();
        let defaults = Defaults::load_from_path(&temp.path().join("defaults.json")).unwrap();
        assert_eq!(defaults.get("url"), None);
    }

    #[test]
    fn test_write_key_persists() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("defaults.json");

        Defaults::write_key(&path, "url", "https://example.com").unwrap();
        Defaults::write_key(&path, "endpoint", "/api/graphql").unwrap();
        Defaults::write_key(&path, "url", "https://other.example.com").unwrap();

        let defaults = Defaults::load_from_path(&path).unwrap();
        assert_eq!(defaults.get("url"), Some("https://other.example.com"));
        assert_eq!(defaults.get("endpoint"), Some("/api/graphql"));
    }

    #[test]
    fn test_channels_are_replaced_by_id() {
        let mut defaults = Defaults::default();
        let mut channel = NotificationChannel {
            id: "calls".to_string(),
            name: "Calls".to_string(),
            description: None,
            sound: Some("ringtone".to_string()),
        };
        defaults.set_channel(&channel).unwrap();
        channel.name = "Incoming calls".to_string();
        defaults.set_channel(&channel).unwrap();

        assert_eq!(defaults.channels().len(), 1);
        assert_eq!(defaults.channel("calls").unwrap().name, "Incoming calls");
    }
}
