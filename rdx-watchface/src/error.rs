//! Error types surfaced by the watchface core and its host collaborators.
//!
//! `WatchError` is what the public facade returns. Every variant maps onto a
//! stable numeric [`ErrorCode`] so hosts that speak status codes can report
//! it. `HostError` is what a host collaborator (surface provider, timers,
//! subscription registry, ambient peer) reports back to the core; the core
//! logs those and degrades instead of failing the run.

use crate::components::lifecycle::Rejection;
use thiserror::Error;

/// Numeric status codes reported by the facade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ErrorCode {
    Success = 0,
    OutOfMemory = -12,
    PermissionDenied = -13,
    InvalidParameter = -22,
    AlreadyRunning = -114,
    InvalidContext = -0x0110_0001,
}

impl ErrorCode {
    /// The raw integer value of the code.
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

/// Errors returned by the watchface facade.
#[derive(Debug, Error)]
pub enum WatchError {
    /// An argument was malformed, or a handler token was unknown.
    #[error("invalid parameter: {reason}")]
    InvalidParameter { reason: String },

    /// A handler record could not be allocated.
    #[error("out of memory while {context}")]
    OutOfMemory { context: String },

    /// The call was made outside a valid lifecycle window, or the launch
    /// context itself is unusable.
    #[error("invalid context: {reason}")]
    InvalidContext { reason: String },

    /// `run` was called while the application loop is already running.
    #[error("the application loop is already running")]
    AlreadyRunning,

    /// A capability the application asked for was not granted by the host.
    #[error("permission denied: {capability}")]
    PermissionDenied { capability: String },

    /// No `create` hook was registered.
    #[error("a create hook must be registered before running")]
    MissingCreateHook,

    /// The `create` hook returned `false`.
    #[error("application create hook failed; startup aborted")]
    CreateFailed,

    /// The host could not provide a drawable surface.
    #[error("failed to create a {width}x{height} surface")]
    Surface {
        width: u32,
        height: u32,
        #[source]
        source: HostError,
    },

    /// The configuration could not be loaded or deserialised.
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

impl WatchError {
    /// Maps the error onto the facade's status code.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidParameter { .. } | Self::Config(_) => ErrorCode::InvalidParameter,
            Self::OutOfMemory { .. } => ErrorCode::OutOfMemory,
            Self::InvalidContext { .. }
            | Self::MissingCreateHook
            | Self::CreateFailed
            | Self::Surface { .. } => ErrorCode::InvalidContext,
            Self::AlreadyRunning => ErrorCode::AlreadyRunning,
            Self::PermissionDenied { .. } => ErrorCode::PermissionDenied,
        }
    }

    /// Whether this error belongs to the fatal startup class, which ends the
    /// run instead of being recovered locally.
    pub fn is_fatal_startup(&self) -> bool {
        matches!(
            self,
            Self::MissingCreateHook
                | Self::CreateFailed
                | Self::Surface { .. }
                | Self::PermissionDenied { .. }
                | Self::Config(_)
        )
    }

    pub(crate) fn invalid_parameter(reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_context(reason: impl Into<String>) -> Self {
        Self::InvalidContext {
            reason: reason.into(),
        }
    }
}

impl From<Rejection> for WatchError {
    fn from(rejection: Rejection) -> Self {
        Self::InvalidContext {
            reason: rejection.to_string(),
        }
    }
}

/// Failures reported by host collaborators.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HostError {
    #[error("{subsystem} is unavailable: {message}")]
    Unavailable {
        subsystem: &'static str,
        message: String,
    },

    #[error("{subsystem} rejected the request: {message}")]
    Rejected {
        subsystem: &'static str,
        message: String,
    },

    /// The engine loop is gone, so nothing can be delivered to it any more.
    #[error("the application loop has already exited")]
    LoopClosed,
}
