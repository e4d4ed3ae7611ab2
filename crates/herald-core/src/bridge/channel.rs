//! Method dispatch

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::{MethodCall, MethodError, MethodResponse, Platform};
use crate::notifications::{cancel_by_tag, cancel_by_thread_substring, NotificationCenter};
use crate::paths::SharedContainer;
use crate::storage::{Defaults, NotificationChannel};

type MethodResult = Result<Value, MethodError>;

/// Answers bridge calls from the application
#[derive(Clone)]
pub struct MethodChannel {
    container: SharedContainer,
    platform: Arc<dyn Platform>,
    notifications: Arc<dyn NotificationCenter>,
}

impl MethodChannel {
    pub fn new(
        container: SharedContainer,
        platform: Arc<dyn Platform>,
        notifications: Arc<dyn NotificationCenter>,
    ) -> Self {
        Self {
            container,
            platform,
            notifications,
        }
    }

    pub fn dispatch(&self, call: &MethodCall) -> MethodResponse {
        debug!(method = %call.method, "Bridge call");
        let args = call.arguments.as_object();

        let result = match call.method.as_str() {
            "canDrawOverlays" => Ok(Value::Bool(self.platform.can_draw_overlays())),
            "openOverlaySettings" => self.platform_call(|p| p.open_overlay_settings()),
            "foregroundFromLockscreen" => self.platform_call(|p| p.foreground_from_lockscreen()),
            "createNotificationChannel" => self.create_notification_channel(args),
            "getArchitecture" => self.architecture(),
            "getSharedDirectory" => Ok(self.shared_directory()),
            "writeDefaults" => self.write_defaults(args),
            "cancelNotification" => self.cancel_notification(args),
            "cancelNotificationsContaining" => self.cancel_notifications_containing(args),
            "redirectStdOut" => self.redirect_std_out(),
            _ => return MethodResponse::NotImplemented,
        };

        match result {
            Ok(value) => MethodResponse::success(value),
            Err(e) => {
                warn!(method = %call.method, error = %e, "Bridge call failed");
                e.into()
            }
        }
    }

    fn platform_call(&self, f: impl FnOnce(&dyn Platform) -> anyhow::Result<()>) -> MethodResult {
        f(self.platform.as_ref())
            .map(|()| Value::Null)
            .map_err(|e| MethodError::new("PLATFORM_ERROR", e.to_string()))
    }

    fn architecture(&self) -> MethodResult {
        self.platform
            .architecture()
            .map(Value::String)
            .ok_or_else(|| MethodError::new("UNAVAILABLE", "Architecture not available."))
    }

    /// Container path, or null when it cannot be created
    fn shared_directory(&self) -> Value {
        match self.container.ensure() {
            Ok(container) => Value::String(container.root().to_string_lossy().into_owned()),
            Err(e) => {
                warn!(error = %e, "Shared container unavailable");
                Value::Null
            }
        }
    }

    fn write_defaults(&self, args: Option<&Map<String, Value>>) -> MethodResult {
        let key = required_str(args, "key")?;
        let value = match args.and_then(|a| a.get("value")) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => {
                return Err(MethodError::invalid_arguments("`value` is required"))
            }
            Some(other) => other.to_string(),
        };

        Defaults::write_key(&self.container.defaults_path(), key, &value)
            .map_err(|e| MethodError::new("DEFAULTS_ERROR", e.to_string()))?;
        Ok(Value::Null)
    }

    fn create_notification_channel(&self, args: Option<&Map<String, Value>>) -> MethodResult {
        let channel = NotificationChannel {
            id: required_str(args, "id")?.to_string(),
            name: required_str(args, "name")?.to_string(),
            description: optional_str(args, "description"),
            sound: optional_str(args, "sound"),
        };

        let path = self.container.defaults_path();
        let mut defaults = Defaults::load_from_path(&path)
            .map_err(|e| MethodError::new("CHANNEL_ERROR", e.to_string()))?;
        defaults
            .set_channel(&channel)
            .and_then(|()| defaults.save_to_path(&path))
            .map_err(|e| MethodError::new("CHANNEL_ERROR", e.to_string()))?;
        Ok(Value::Bool(true))
    }

    fn cancel_notification(&self, args: Option<&Map<String, Value>>) -> MethodResult {
        let tag = required_str(args, "tag")?;
        cancel_by_tag(self.notifications.as_ref(), tag)
            .map_err(|e| MethodError::new("NOTIFICATION_ERROR", e.to_string()))?;
        Ok(Value::Null)
    }

    fn cancel_notifications_containing(&self, args: Option<&Map<String, Value>>) -> MethodResult {
        let thread = required_str(args, "thread")?;
        cancel_by_thread_substring(self.notifications.as_ref(), thread)
            .map(Value::Bool)
            .map_err(|e| MethodError::new("NOTIFICATION_ERROR", e.to_string()))
    }

    #[cfg(unix)]
    fn redirect_std_out(&self) -> MethodResult {
        use crate::constants::logs;

        let path = self.container.logs_dir().join(logs::TEE_FILE);
        super::tee::redirect_std_out(&path)
            .map(|_| Value::String("ok".to_string()))
            .map_err(|e| MethodError::new("FILE_ERROR", format!("{e:#}")))
    }

    #[cfg(not(unix))]
    fn redirect_std_out(&self) -> MethodResult {
        Err(MethodError::new(
            "UNSUPPORTED",
            "Redirecting standard output is not supported on this platform",
        ))
    }
}

fn required_str<'a>(args: Option<&'a Map<String, Value>>, key: &str) -> Result<&'a str, MethodError> {
    args.and_then(|a| a.get(key))
        .and_then(Value::as_str)
        .ok_or_else(|| MethodError::invalid_arguments(format!("`{key}` must be a string")))
}

fn optional_str(args: Option<&Map<String, Value>>, key: &str) -> Option<String> {
    args.and_then(|a| a.get(key))
        .and_then(Value::as_str)
        .map(str::to_string)
}
