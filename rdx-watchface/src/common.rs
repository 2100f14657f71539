//! Contains common, primitive types shared across the watchface core.
//!
//! This module defines the key types used to identify event handlers and the
//! outstanding timers owned by the tick scheduler, plus the immutable identity
//! of the running application. Keys are generational, so a token that has been
//! removed or cancelled is never mistaken for a newer one.

use crate::error::WatchError;
use slotmap::new_key_type;

new_key_type! {
    /// Opaque token returned when a system event handler is registered.
    ///
    /// Hand it back to `remove_event_handler` to unregister. A removed token
    /// stays invalid forever, so removing it twice is reported as an error
    /// rather than silently dropping some other handler.
    pub struct HandlerId;

    /// Identifies one armed foreground (per-second) timer.
    pub struct TimerId;

    /// Identifies one armed ambient (per-minute) alarm.
    pub struct AlarmId;
}

/// The immutable identity of the application, fixed once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppIdentity {
    app_id: String,
    name: String,
}

impl AppIdentity {
    /// Builds the identity from a reverse-DNS application id.
    ///
    /// The display name is the last dot-separated segment of the id
    /// (`org.example.clock` becomes `clock`). An id without a dot, or one that
    /// ends with a dot, is not a valid launch context.
    pub fn from_app_id(app_id: &str) -> Result<Self, WatchError> {
        let name = app_id
            .rsplit_once('.')
            .map(|(_, tail)| tail)
            .filter(|tail| !tail.is_empty())
            .ok_or_else(|| WatchError::InvalidContext {
                reason: format!("application id '{app_id}' has no domain name segment"),
            })?;
        Ok(Self {
            app_id: app_id.to_string(),
            name: name.to_string(),
        })
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}
