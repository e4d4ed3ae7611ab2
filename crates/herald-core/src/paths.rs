//! Shared container paths
//!
//! Every file the background pipeline touches lives in one directory that
//! the main application and all extension processes share. The directory
//! is passed around as a [`SharedContainer`] handle instead of being looked
//! up globally, so the hosting process decides where it is.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::constants::container;

/// Handle to the shared container directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedContainer {
    root: PathBuf,
}

impl SharedContainer {
    /// Use an explicit directory as the container
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve the container: explicit path, then `HERALD_CONTAINER_DIR`,
    /// then `<data dir>/herald/group`
    pub fn resolve(explicit: Option<&Path>) -> Self {
        if let Some(path) = explicit {
            return Self::at(path);
        }

        if let Some(dir) = std::env::var_os(container::ENV_CONTAINER_DIR)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
        {
            return Self::at(dir);
        }

        let base = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
        Self::at(
            base.join(container::DEFAULT_DIR_NAME)
                .join(container::GROUP_DIR_NAME),
        )
    }

    /// Create the container directory if it does not exist yet
    pub fn ensure(&self) -> Result<&Self> {
        std::fs::create_dir_all(&self.root).with_context(|| {
            format!(
                "Failed to create shared container {}",
                self.root.display()
            )
        })?;
        Ok(self)
    }

    /// Whether the container directory exists
    pub fn exists(&self) -> bool {
        self.root.is_dir()
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `common.sqlite`, shared with the main application
    pub fn db_path(&self) -> PathBuf {
        self.root.join(container::DATABASE_FILE)
    }

    pub fn defaults_path(&self) -> PathBuf {
        self.root.join(container::DEFAULTS_FILE)
    }

    pub fn notifications_path(&self) -> PathBuf {
        self.root.join(container::NOTIFICATIONS_FILE)
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join(container::LOGS_DIR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_path_wins() {
        let container = SharedContainer::resolve(Some(Path::new("/tmp/herald-test")));
        assert_eq!(container.root(), Path::new("/tmp/herald-test"));
        assert_eq!(
            container.db_path(),
            PathBuf::from("/tmp/herald-test/common.sqlite")
        );
        assert_eq!(
            container.logs_dir(),
            PathBuf::from("/tmp/herald-test/logs")
        );
    }

    #[test]
    fn ensure_creates_directory() {
        let temp = tempfile::TempDir::new().unwrap();
        let container = SharedContainer::at(temp.path().join("nested").join("group"));
        assert!(!container.exists());
        container.ensure().unwrap();
        assert!(container.exists());
    }
}
