//! Recording fakes for the host collaborators.
//!
//! Every fake writes what it was asked to do into a shared [`Journal`], so a
//! test can assert the exact order of host calls across collaborators.

use crate::common::{AlarmId, TimerId};
use crate::error::HostError;
use crate::events::SystemEventKind;
use crate::host::{AmbientPeer, EventRegistry, OneShotTimer, SurfaceHandle, SurfaceProvider, WakeAlarm};
use crate::time::{ClockSource, TimeSnapshot};
use slotmap::SlotMap;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// An ordered, shareable log of calls.
#[derive(Debug, Clone, Default)]
pub(crate) struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub(crate) fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub(crate) fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub(crate) fn count(&self, entry: &str) -> usize {
        self.0.lock().unwrap().iter().filter(|e| *e == entry).count()
    }

    pub(crate) fn clear(&self) {
        self.0.lock().unwrap().clear();
    }
}

/// A UTC snapshot on 2024-03-10 (a Sunday) at the given time of day.
pub(crate) fn snapshot(hour24: u32, minute: u32, second: u32, millisecond: u32) -> TimeSnapshot {
    TimeSnapshot {
        year: 2024,
        month: 3,
        day: 10,
        day_of_week: 1,
        hour: match hour24 % 12 {
            0 => 12,
            h => h,
        },
        hour24,
        minute,
        second,
        millisecond,
        timestamp: 1_710_028_800 + i64::from(hour24 * 3600 + minute * 60 + second),
        timezone: "UTC".to_string(),
    }
}

/// A clock that reads whatever the test last set.
#[derive(Debug, Clone)]
pub(crate) struct ManualClock(Arc<Mutex<TimeSnapshot>>);

impl ManualClock {
    pub(crate) fn new(now: TimeSnapshot) -> Self {
        Self(Arc::new(Mutex::new(now)))
    }

    pub(crate) fn set(&self, now: TimeSnapshot) {
        *self.0.lock().unwrap() = now;
    }
}

impl ClockSource for ManualClock {
    fn now(&self) -> TimeSnapshot {
        self.0.lock().unwrap().clone()
    }
}

pub(crate) struct RecordingTimer {
    journal: Journal,
    armed: SlotMap<TimerId, Duration>,
    issued: Arc<Mutex<Vec<TimerId>>>,
}

impl RecordingTimer {
    pub(crate) fn new(journal: Journal) -> Self {
        Self {
            journal,
            armed: SlotMap::with_key(),
            issued: Arc::default(),
        }
    }

    /// Every id handed out so far, oldest first.
    pub(crate) fn issued(&self) -> Arc<Mutex<Vec<TimerId>>> {
        self.issued.clone()
    }
}

impl OneShotTimer for RecordingTimer {
    fn arm(&mut self, delay: Duration) -> Result<TimerId, HostError> {
        let id = self.armed.insert(delay);
        self.issued.lock().unwrap().push(id);
        self.journal.push(format!("timer.arm({}ms)", delay.as_millis()));
        Ok(id)
    }

    fn cancel(&mut self, id: TimerId) {
        self.armed.remove(id);
        self.journal.push("timer.cancel");
    }
}

pub(crate) struct RecordingAlarm {
    journal: Journal,
    armed: SlotMap<AlarmId, Duration>,
    issued: Arc<Mutex<Vec<AlarmId>>>,
    failing: bool,
}

impl RecordingAlarm {
    pub(crate) fn new(journal: Journal) -> Self {
        Self {
            journal,
            armed: SlotMap::with_key(),
            issued: Arc::default(),
            failing: false,
        }
    }

    /// Makes `init` and `arm_repeating` fail.
    pub(crate) fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    pub(crate) fn issued(&self) -> Arc<Mutex<Vec<AlarmId>>> {
        self.issued.clone()
    }

    fn refuse(&self) -> HostError {
        HostError::Unavailable {
            subsystem: "alarm",
            message: "alarm daemon is down".to_string(),
        }
    }
}

impl WakeAlarm for RecordingAlarm {
    fn init(&mut self, app_id: &str) -> Result<(), HostError> {
        if self.failing {
            return Err(self.refuse());
        }
        self.journal.push(format!("alarm.init({app_id})"));
        Ok(())
    }

    fn arm_repeating(&mut self, initial: Duration, period: Duration) -> Result<AlarmId, HostError> {
        if self.failing {
            return Err(self.refuse());
        }
        let id = self.armed.insert(period);
        self.issued.lock().unwrap().push(id);
        self.journal.push(format!(
            "alarm.arm({}s, every {}s)",
            initial.as_secs(),
            period.as_secs()
        ));
        Ok(id)
    }

    fn cancel(&mut self, id: AlarmId) {
        self.armed.remove(id);
        self.journal.push("alarm.cancel");
    }

    fn fini(&mut self) {
        self.journal.push("alarm.fini");
    }
}

#[derive(Clone)]
pub(crate) struct RecordingRegistry {
    journal: Journal,
    active: Arc<Mutex<BTreeSet<SystemEventKind>>>,
    failing: bool,
}

impl RecordingRegistry {
    pub(crate) fn new(journal: Journal) -> Self {
        Self {
            journal,
            active: Arc::default(),
            failing: false,
        }
    }

    pub(crate) fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    /// The kinds currently subscribed.
    pub(crate) fn active(&self) -> Vec<SystemEventKind> {
        self.active.lock().unwrap().iter().copied().collect()
    }
}

impl EventRegistry for RecordingRegistry {
    fn subscribe(&mut self, kind: SystemEventKind) -> Result<(), HostError> {
        if self.failing {
            return Err(HostError::Rejected {
                subsystem: "registry",
                message: format!("cannot subscribe to {kind}"),
            });
        }
        self.active.lock().unwrap().insert(kind);
        self.journal.push(format!("registry.subscribe({kind})"));
        Ok(())
    }

    fn unsubscribe(&mut self, kind: SystemEventKind) -> Result<(), HostError> {
        self.active.lock().unwrap().remove(&kind);
        self.journal.push(format!("registry.unsubscribe({kind})"));
        Ok(())
    }
}

pub(crate) struct RecordingPeer {
    journal: Journal,
}

impl RecordingPeer {
    pub(crate) fn new(journal: Journal) -> Self {
        Self { journal }
    }
}

impl AmbientPeer for RecordingPeer {
    fn notify_draw_done(&mut self) -> Result<(), HostError> {
        self.journal.push("peer.draw_done");
        Ok(())
    }
}

/// The id every [`RecordingSurface`] hands out.
pub(crate) const SURFACE_ID: u64 = 7;

pub(crate) struct RecordingSurface {
    journal: Journal,
    failing: bool,
}

impl RecordingSurface {
    pub(crate) fn new(journal: Journal) -> Self {
        Self {
            journal,
            failing: false,
        }
    }

    pub(crate) fn failing(mut self) -> Self {
        self.failing = true;
        self
    }
}

impl SurfaceProvider for RecordingSurface {
    fn create_surface(&mut self, width: u32, height: u32) -> Result<SurfaceHandle, HostError> {
        if self.failing {
            return Err(HostError::Unavailable {
                subsystem: "surface",
                message: "no display".to_string(),
            });
        }
        self.journal.push(format!("surface.create({width}x{height})"));
        Ok(SurfaceHandle {
            id: SURFACE_ID,
            width,
            height,
        })
    }

    fn destroy_surface(&mut self, _surface: SurfaceHandle) {
        self.journal.push("surface.destroy");
    }
}
