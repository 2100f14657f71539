//! Defines the configuration for a watchface application.
//!
//! The struct is designed to be deserialized from a TOML file using `serde`
//! and the `config` crate, with `WATCHFACE_*` environment variables layered on
//! top. Everything except the application id has a sensible default, so a
//! development build can run with no file at all.

use crate::error::WatchError;
use crate::time::SystemClock;
use chrono_tz::Tz;
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use std::path::Path;

pub const DEFAULT_APP_ID: &str = "org.rustadex.watchface";
const ENV_PREFIX: &str = "WATCHFACE";

/// The top-level configuration for a `WatchApp`.
#[derive(Debug, Clone, Deserialize)]
pub struct WatchConfig {
    /// Reverse-DNS application id. The last segment becomes the display name.
    pub app_id: String,

    /// Width of the surface handed to the `create` hook.
    #[serde(default = "default_edge")]
    pub width: u32,

    /// Height of the surface handed to the `create` hook.
    #[serde(default = "default_edge")]
    pub height: u32,

    /// Timezone used to render snapshots. When absent the zone is taken from
    /// `/etc/localtime`, falling back to UTC.
    #[serde(default)]
    pub timezone: Option<Tz>,

    /// Whether the host grants wake-capable alarms. Registering an ambient
    /// tick hook without this privilege fails startup.
    #[serde(default = "default_alarm_privilege")]
    pub alarm_privilege: bool,

    /// Buffer size of the lifecycle notice broadcast channel.
    #[serde(default = "default_notice_capacity")]
    pub notice_capacity: usize,

    /// Maximum number of handlers per system event kind.
    #[serde(default = "default_handler_capacity")]
    pub handler_capacity: usize,
}

impl WatchConfig {
    /// Loads the configuration from an optional TOML file, then applies
    /// `WATCHFACE_*` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, WatchError> {
        let mut builder = Config::builder().set_default("app_id", DEFAULT_APP_ID)?;
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml));
        }
        let config = builder
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?;
        Ok(config.try_deserialize()?)
    }

    /// Parses a configuration from TOML text, without environment overrides.
    pub fn from_toml(text: &str) -> Result<Self, WatchError> {
        let config = Config::builder()
            .set_default("app_id", DEFAULT_APP_ID)?
            .add_source(File::from_str(text, FileFormat::Toml))
            .build()?;
        Ok(config.try_deserialize()?)
    }

    /// The wall clock this configuration asks for.
    pub fn clock(&self) -> SystemClock {
        match self.timezone {
            Some(timezone) => SystemClock::new(timezone),
            None => SystemClock::from_localtime(Tz::UTC),
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            app_id: DEFAULT_APP_ID.to_string(),
            width: default_edge(),
            height: default_edge(),
            timezone: None,
            alarm_privilege: default_alarm_privilege(),
            notice_capacity: default_notice_capacity(),
            handler_capacity: default_handler_capacity(),
        }
    }
}

// --- Default value functions for serde ---

fn default_edge() -> u32 {
    360
}

fn default_alarm_privilege() -> bool {
    true
}

fn default_notice_capacity() -> usize {
    256
}

fn default_handler_capacity() -> usize {
    64
}
