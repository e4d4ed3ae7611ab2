//! Runtime configuration
//!
//! Background processes cannot ask the application for settings, so
//! everything comes from the shared container's defaults file plus a few
//! environment overrides.

use std::time::Duration;

use url::Url;

use crate::constants::api;
use crate::storage::Defaults;

/// Where and how to reach the GraphQL API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    pub endpoint: Url,
    pub timeout: Duration,
}

impl ApiConfig {
    pub fn new(endpoint: Url) -> Self {
        Self {
            endpoint,
            timeout: api::REQUEST_TIMEOUT,
        }
    }

    /// Build from the `url` and `endpoint` defaults written by the app.
    ///
    /// `None` when either is missing or they do not form a valid URL; the
    /// caller skips remote work in that case.
    pub fn from_defaults(defaults: &Defaults) -> Option<Self> {
        let base = defaults.get(api::URL_KEY)?;
        let path = defaults.get(api::ENDPOINT_KEY)?;
        let endpoint = Url::parse(&format!("{base}{path}")).ok()?;

        let timeout = std::env::var(api::ENV_REQUEST_TIMEOUT)
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(api::REQUEST_TIMEOUT);

        Some(Self { endpoint, timeout })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}
