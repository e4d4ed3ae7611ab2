//! Per-process pipeline context
//!
//! Bundles what every component needs: the shared container, the lock
//! manager over its database, and the remote API when one is configured.
//! The hosting process builds one and hands clones to each component.

use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use tracing::warn;

use crate::api::{GraphQlClient, RemoteApi};
use crate::config::ApiConfig;
use crate::lock::{LockConfig, LockManager};
use crate::paths::SharedContainer;
use crate::storage::{Database, Defaults};

#[derive(Clone)]
pub struct PushContext {
    container: SharedContainer,
    locks: LockManager,
    api: Option<Arc<dyn RemoteApi>>,
}

impl PushContext {
    /// Context without a remote API; see [`Self::from_container`]
    pub fn new(container: SharedContainer) -> Self {
        let locks = LockManager::new(container.db_path());
        Self {
            container,
            locks,
            api: None,
        }
    }

    /// Context with the API configured from the container's defaults.
    ///
    /// Unreadable defaults or a missing endpoint leave the API unset; remote
    /// steps are then skipped rather than failing the host.
    pub fn from_container(container: SharedContainer) -> Self {
        let defaults = match Defaults::load_from_path(&container.defaults_path()) {
            Ok(defaults) => defaults,
            Err(e) => {
                warn!(error = %e, "Failed to read shared defaults");
                Defaults::default()
            }
        };

        let api: Option<Arc<dyn RemoteApi>> = match ApiConfig::from_defaults(&defaults) {
            Some(config) => match GraphQlClient::new(config) {
                Ok(client) => Some(Arc::new(client)),
                Err(e) => {
                    warn!(error = %e, "Failed to build API client");
                    None
                }
            },
            None => {
                warn!("API endpoint not configured in shared defaults");
                None
            }
        };

        Self {
            api,
            ..Self::new(container)
        }
    }

    pub fn with_api(mut self, api: Arc<dyn RemoteApi>) -> Self {
        self.api = Some(api);
        self
    }

    pub fn with_lock_config(mut self, config: LockConfig) -> Self {
        self.locks = LockManager::with_config(self.container.db_path(), config);
        self
    }

    pub fn container(&self) -> &SharedContainer {
        &self.container
    }

    pub fn locks(&self) -> &LockManager {
        &self.locks
    }

    pub fn api(&self) -> Option<&Arc<dyn RemoteApi>> {
        self.api.as_ref()
    }

    /// Fresh connection to the shared credential store
    pub fn open_db(&self) -> Result<Database> {
        Database::new(&self.container.db_path())
    }
}

impl fmt::Debug for PushContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PushContext")
            .field("container", &self.container)
            .field("locks", &self.locks)
            .field("api", &self.api.is_some())
            .finish()
    }
}
