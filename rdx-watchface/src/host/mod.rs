//! Contracts for the host collaborators the core depends on.
//!
//! The core never talks to a windowing toolkit, a timer wheel, an alarm
//! daemon or a system bus directly. It consumes the small traits below and the
//! host supplies implementations. [`runtime`] provides tokio-backed ones that
//! are good enough for development and the shell.

pub mod runtime;

use crate::common::{AlarmId, TimerId};
use crate::error::HostError;
use crate::events::SystemEventKind;
use crate::time::ClockSource;
use std::time::Duration;

/// A drawable surface handed out by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceHandle {
    pub id: u64,
    pub width: u32,
    pub height: u32,
}

/// Creates and destroys the application's drawable surface.
pub trait SurfaceProvider: Send {
    fn create_surface(&mut self, width: u32, height: u32) -> Result<SurfaceHandle, HostError>;
    fn destroy_surface(&mut self, surface: SurfaceHandle);
}

/// A cancellable one-shot scheduler for the foreground tick.
///
/// When a timer elapses the implementation reports it back to the loop with
/// [`AppHandle::notify_timer_fired`](crate::app::AppHandle::notify_timer_fired).
pub trait OneShotTimer: Send {
    fn arm(&mut self, delay: Duration) -> Result<TimerId, HostError>;
    /// Cancelling an unknown or already-fired timer is a no-op.
    fn cancel(&mut self, id: TimerId);
}

/// A cancellable, wake-capable periodic scheduler for the ambient tick.
///
/// Implementations must keep firing across process suspension and may
/// coalesce missed periods into a single fire. Fires are reported with
/// [`AppHandle::notify_alarm_fired`](crate::app::AppHandle::notify_alarm_fired).
pub trait WakeAlarm: Send {
    fn init(&mut self, app_id: &str) -> Result<(), HostError>;
    fn arm_repeating(&mut self, initial: Duration, period: Duration) -> Result<AlarmId, HostError>;
    /// Cancelling an unknown alarm is a no-op.
    fn cancel(&mut self, id: AlarmId);
    fn fini(&mut self);
}

/// Subscribes the application to host system notifications. Notifications are
/// delivered with [`AppHandle::system_event`](crate::app::AppHandle::system_event).
pub trait EventRegistry: Send {
    fn subscribe(&mut self, kind: SystemEventKind) -> Result<(), HostError>;
    fn unsubscribe(&mut self, kind: SystemEventKind) -> Result<(), HostError>;
}

/// The outbound half of the ambient signal channel.
pub trait AmbientPeer: Send {
    /// Tells the low-power compositor that the ambient frame is drawn.
    fn notify_draw_done(&mut self) -> Result<(), HostError>;
}

/// Every collaborator the core needs, bundled.
pub struct HostServices {
    pub clock: Box<dyn ClockSource>,
    pub surface: Box<dyn SurfaceProvider>,
    pub timer: Box<dyn OneShotTimer>,
    pub alarm: Box<dyn WakeAlarm>,
    pub registry: Box<dyn EventRegistry>,
    pub peer: Box<dyn AmbientPeer>,
}
