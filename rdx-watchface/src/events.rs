//! Defines the event types flowing into and out of the watchface core.
//!
//! Inbound: system conditions reported by the host ([`SystemEventKind`],
//! [`AppEvent`]) and launch requests ([`AppControl`]). Outbound: the
//! [`LifecycleNotice`] stream that observers subscribe to.

use crate::components::lifecycle::LifecycleState;
use crate::time::TimeSnapshot;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Bundle key carrying the requested operation.
pub const OPERATION_KEY: &str = "operation";
/// Bundle key carrying the caller's application id.
pub const CALLER_KEY: &str = "__AUL_CALLER_APPID__";
/// Operation used when a launch request does not name one.
pub const DEFAULT_OPERATION: &str = "http://tizen.org/appcontrol/operation/default";

/// System conditions the host can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SystemEventKind {
    LowMemory,
    LowBattery,
    LanguageChanged,
    RegionChanged,
    /// The wall clock jumped (manual set, network sync, timezone change).
    /// Consumed by the core itself; applications cannot register for it.
    WallClockChanged,
}

impl SystemEventKind {
    /// The kinds applications may register handlers for.
    pub const USER_FACING: [SystemEventKind; 4] = [
        SystemEventKind::LowMemory,
        SystemEventKind::LowBattery,
        SystemEventKind::LanguageChanged,
        SystemEventKind::RegionChanged,
    ];

    pub fn is_user_facing(self) -> bool {
        !matches!(self, SystemEventKind::WallClockChanged)
    }

    /// Parses the short names used by the shell and configuration files.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "low-memory" | "lowmem" => Some(Self::LowMemory),
            "low-battery" | "lowbat" => Some(Self::LowBattery),
            "language" | "lang" => Some(Self::LanguageChanged),
            "region" => Some(Self::RegionChanged),
            "clock" | "time" => Some(Self::WallClockChanged),
            _ => None,
        }
    }
}

impl fmt::Display for SystemEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::LowMemory => "low-memory",
            Self::LowBattery => "low-battery",
            Self::LanguageChanged => "language",
            Self::RegionChanged => "region",
            Self::WallClockChanged => "clock",
        };
        f.write_str(name)
    }
}

/// The opaque payload accompanying a system event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventValue {
    None,
    /// A numeric level, e.g. a memory pressure or battery status code.
    Level(i32),
    /// A textual value, e.g. the new language or region tag.
    Text(String),
}

/// A system event as delivered to application handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppEvent {
    pub kind: SystemEventKind,
    pub value: EventValue,
}

/// Raw key/value launch payload as delivered by the host.
pub type LaunchBundle = BTreeMap<String, String>;

/// A decoded application-control (launch) request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppControl {
    pub operation: String,
    pub caller: Option<String>,
    pub extra: BTreeMap<String, String>,
}

impl AppControl {
    /// Decodes a raw launch bundle.
    ///
    /// A missing operation falls back to [`DEFAULT_OPERATION`]; an operation
    /// that is present but empty cannot be decoded.
    pub fn decode(bundle: &LaunchBundle) -> Result<Self, String> {
        let operation = match bundle.get(OPERATION_KEY) {
            Some(op) if op.trim().is_empty() => {
                return Err("launch request carries an empty operation".to_string())
            }
            Some(op) => op.clone(),
            None => DEFAULT_OPERATION.to_string(),
        };
        let caller = bundle.get(CALLER_KEY).cloned();
        let extra = bundle
            .iter()
            .filter(|(key, _)| key.as_str() != OPERATION_KEY && key.as_str() != CALLER_KEY)
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        Ok(Self {
            operation,
            caller,
            extra,
        })
    }
}

impl Default for AppControl {
    fn default() -> Self {
        Self {
            operation: DEFAULT_OPERATION.to_string(),
            caller: None,
            extra: BTreeMap::new(),
        }
    }
}

/// Notifications broadcast by the engine for observers (shells, tests,
/// diagnostics). They describe what the core did; they are not callbacks.
#[derive(Debug, Clone)]
pub enum LifecycleNotice {
    /// The lifecycle state changed.
    StateChanged {
        from: LifecycleState,
        to: LifecycleState,
    },
    /// Ambient mode was entered or left.
    AmbientChanged { ambient: bool },
    /// The foreground tick fired and the next one was armed.
    TimeTick { snapshot: TimeSnapshot, next_in: Duration },
    /// An ambient tick was delivered.
    AmbientTick { snapshot: TimeSnapshot },
    /// The ambient alarm was armed.
    AlarmArmed { initial: Duration, period: Duration },
    /// A stimulus was rejected as invalid for the current state.
    Rejected { stimulus: &'static str, reason: String },
    /// A system event was fanned out to `handlers` registered handlers.
    SystemEvent { kind: SystemEventKind, handlers: usize },
    /// The loop has exited and shutdown has completed.
    Exited,
}
