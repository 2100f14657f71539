//! Tokio-backed host collaborators.
//!
//! These run the engine on a plain tokio runtime with no platform services:
//! timers are spawned sleep tasks, the wake alarm is an `interval_at` ticker,
//! the surface is headless and the event registry only keeps books. Each one
//! reports back into the engine loop through an [`AppHandle`].

use super::{AmbientPeer, EventRegistry, HostServices, OneShotTimer, SurfaceHandle, SurfaceProvider, WakeAlarm};
use crate::app::AppHandle;
use crate::common::{AlarmId, TimerId};
use crate::config::WatchConfig;
use crate::error::HostError;
use crate::events::SystemEventKind;
use slotmap::SlotMap;
use std::collections::HashSet;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, trace};

impl HostServices {
    /// Builds the tokio-backed collaborators for `config`, reporting into the
    /// loop behind `handle`.
    pub fn tokio(config: &WatchConfig, handle: &AppHandle) -> Self {
        Self {
            clock: Box::new(config.clock()),
            surface: Box::new(HeadlessSurface::default()),
            timer: Box::new(TokioTimer::new(handle.clone())),
            alarm: Box::new(TokioAlarm::new(handle.clone(), config.alarm_privilege)),
            registry: Box::new(LocalRegistry::default()),
            peer: Box::new(LogPeer),
        }
    }
}

fn runtime(subsystem: &'static str) -> Result<Handle, HostError> {
    Handle::try_current().map_err(|e| HostError::Unavailable {
        subsystem,
        message: e.to_string(),
    })
}

/// Foreground timer: one sleeping task per armed timer.
pub struct TokioTimer {
    handle: AppHandle,
    tasks: SlotMap<TimerId, JoinHandle<()>>,
}

impl TokioTimer {
    pub fn new(handle: AppHandle) -> Self {
        Self {
            handle,
            tasks: SlotMap::with_key(),
        }
    }
}

impl OneShotTimer for TokioTimer {
    fn arm(&mut self, delay: Duration) -> Result<TimerId, HostError> {
        let runtime = runtime("timer")?;
        self.tasks.retain(|_, task| !task.is_finished());
        let handle = self.handle.clone();
        let id = self.tasks.insert_with_key(|id| {
            runtime.spawn(async move {
                tokio::time::sleep(delay).await;
                if handle.notify_timer_fired(id).is_err() {
                    trace!("Timer {:?} fired after the loop exited", id);
                }
            })
        });
        Ok(id)
    }

    fn cancel(&mut self, id: TimerId) {
        if let Some(task) = self.tasks.remove(id) {
            task.abort();
        }
    }
}

impl Drop for TokioTimer {
    fn drop(&mut self) {
        for (_, task) in self.tasks.drain() {
            task.abort();
        }
    }
}

/// Ambient alarm: a minute-aligned ticker that coalesces missed periods.
pub struct TokioAlarm {
    handle: AppHandle,
    privileged: bool,
    owner: Option<String>,
    tasks: SlotMap<AlarmId, JoinHandle<()>>,
}

impl TokioAlarm {
    pub fn new(handle: AppHandle, privileged: bool) -> Self {
        Self {
            handle,
            privileged,
            owner: None,
            tasks: SlotMap::with_key(),
        }
    }
}

impl WakeAlarm for TokioAlarm {
    fn init(&mut self, app_id: &str) -> Result<(), HostError> {
        if !self.privileged {
            return Err(HostError::Rejected {
                subsystem: "alarm",
                message: format!("{app_id} does not hold the wake-alarm privilege"),
            });
        }
        self.owner = Some(app_id.to_string());
        debug!("Alarm subsystem ready for {}", app_id);
        Ok(())
    }

    fn arm_repeating(&mut self, initial: Duration, period: Duration) -> Result<AlarmId, HostError> {
        if self.owner.is_none() {
            return Err(HostError::Unavailable {
                subsystem: "alarm",
                message: "the alarm subsystem was not initialised".to_string(),
            });
        }
        let runtime = runtime("alarm")?;
        let handle = self.handle.clone();
        let id = self.tasks.insert_with_key(|id| {
            runtime.spawn(async move {
                let mut ticker = interval_at(Instant::now() + initial, period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    ticker.tick().await;
                    if handle.notify_alarm_fired(id).is_err() {
                        break;
                    }
                }
            })
        });
        Ok(id)
    }

    fn cancel(&mut self, id: AlarmId) {
        if let Some(task) = self.tasks.remove(id) {
            task.abort();
        }
    }

    fn fini(&mut self) {
        for (_, task) in self.tasks.drain() {
            task.abort();
        }
        if let Some(owner) = self.owner.take() {
            debug!("Alarm subsystem released for {}", owner);
        }
    }
}

impl Drop for TokioAlarm {
    fn drop(&mut self) {
        self.fini();
    }
}

/// A surface that exists only as a size.
#[derive(Debug, Default)]
pub struct HeadlessSurface {
    next_id: u64,
}

impl SurfaceProvider for HeadlessSurface {
    fn create_surface(&mut self, width: u32, height: u32) -> Result<SurfaceHandle, HostError> {
        if width == 0 || height == 0 {
            return Err(HostError::Rejected {
                subsystem: "surface",
                message: "surface dimensions must be non-zero".to_string(),
            });
        }
        self.next_id += 1;
        debug!("Headless surface #{} created ({}x{})", self.next_id, width, height);
        Ok(SurfaceHandle {
            id: self.next_id,
            width,
            height,
        })
    }

    fn destroy_surface(&mut self, surface: SurfaceHandle) {
        debug!("Headless surface #{} destroyed", surface.id);
    }
}

/// Keeps track of subscriptions. Events themselves are injected through
/// [`AppHandle::system_event`].
#[derive(Debug, Default)]
pub struct LocalRegistry {
    active: HashSet<SystemEventKind>,
}

impl LocalRegistry {
    pub fn is_subscribed(&self, kind: SystemEventKind) -> bool {
        self.active.contains(&kind)
    }
}

impl EventRegistry for LocalRegistry {
    fn subscribe(&mut self, kind: SystemEventKind) -> Result<(), HostError> {
        self.active.insert(kind);
        Ok(())
    }

    fn unsubscribe(&mut self, kind: SystemEventKind) -> Result<(), HostError> {
        self.active.remove(&kind);
        Ok(())
    }
}

/// Logs the draw-done handshake instead of sending it anywhere.
#[derive(Debug, Default)]
pub struct LogPeer;

impl AmbientPeer for LogPeer {
    fn notify_draw_done(&mut self) -> Result<(), HostError> {
        info!("Ambient frame drawn");
        Ok(())
    }
}
