//! The tick scheduler: one foreground timer and one ambient alarm.
//!
//! Neither timer trusts a cached "now". The foreground timer is a one-shot that
//! is re-armed on every fire with the delay to the next second boundary, read
//! from a fresh snapshot; the ambient alarm is armed with the delay to the next
//! minute boundary and then repeats every minute. Arming always cancels the
//! previous timer first, so at most one of each is ever outstanding.

use crate::common::{AlarmId, TimerId};
use crate::error::HostError;
use crate::host::{OneShotTimer, WakeAlarm};
use crate::time::TimeSnapshot;
use std::time::Duration;
use tracing::{debug, trace};

/// Period of the ambient alarm.
pub const AMBIENT_PERIOD: Duration = Duration::from_secs(60);

/// Delay until the next whole second.
pub fn foreground_delay(snapshot: &TimeSnapshot) -> Duration {
    Duration::from_millis(u64::from(1000 - snapshot.millisecond.min(999)))
}

/// Delay until the next whole minute.
pub fn ambient_initial_delay(snapshot: &TimeSnapshot) -> Duration {
    Duration::from_secs(u64::from(60 - snapshot.second.min(59)))
}

/// Owns the outstanding foreground timer and ambient alarm.
pub struct TickScheduler {
    timer: Box<dyn OneShotTimer>,
    alarm: Box<dyn WakeAlarm>,
    time_tick: Option<TimerId>,
    ambient_tick: Option<AlarmId>,
    alarm_ready: bool,
}

impl TickScheduler {
    pub fn new(timer: Box<dyn OneShotTimer>, alarm: Box<dyn WakeAlarm>) -> Self {
        Self {
            timer,
            alarm,
            time_tick: None,
            ambient_tick: None,
            alarm_ready: false,
        }
    }

    /// Prepares the alarm subsystem for this application. Idempotent.
    pub fn init_alarm(&mut self, app_id: &str) -> Result<(), HostError> {
        if self.alarm_ready {
            return Ok(());
        }
        self.alarm.init(app_id)?;
        self.alarm_ready = true;
        Ok(())
    }

    /// Cancels any stale foreground timer and arms the next one.
    pub fn arm_time_tick(&mut self, snapshot: &TimeSnapshot) -> Result<Duration, HostError> {
        self.cancel_time_tick();
        let delay = foreground_delay(snapshot);
        let id = self.timer.arm(delay)?;
        self.time_tick = Some(id);
        trace!("Next time tick in {:?}", delay);
        Ok(delay)
    }

    /// Cancels the foreground timer if one is armed.
    pub fn cancel_time_tick(&mut self) {
        if let Some(id) = self.time_tick.take() {
            self.timer.cancel(id);
        }
    }

    /// Claims a fired foreground timer. Returns `false` for a fire that
    /// belongs to a timer that has since been cancelled or replaced.
    pub fn accept_time_tick(&mut self, id: TimerId) -> bool {
        if self.time_tick == Some(id) {
            self.time_tick = None;
            true
        } else {
            trace!("Dropping stale time tick {:?}", id);
            false
        }
    }

    /// Cancels any previous alarm and arms a repeating one aligned to the next
    /// minute boundary. Returns the initial delay.
    pub fn arm_ambient(&mut self, snapshot: &TimeSnapshot) -> Result<Duration, HostError> {
        self.disarm_ambient();
        let initial = ambient_initial_delay(snapshot);
        let id = self.alarm.arm_repeating(initial, AMBIENT_PERIOD)?;
        self.ambient_tick = Some(id);
        debug!("Ambient alarm armed: first in {:?}, then every {:?}", initial, AMBIENT_PERIOD);
        Ok(initial)
    }

    /// Disarms the ambient alarm if one is armed.
    pub fn disarm_ambient(&mut self) {
        if let Some(id) = self.ambient_tick.take() {
            self.alarm.cancel(id);
        }
    }

    /// Whether a fired alarm is the one currently armed.
    pub fn accept_ambient(&self, id: AlarmId) -> bool {
        self.ambient_tick == Some(id)
    }

    pub fn time_tick_armed(&self) -> bool {
        self.time_tick.is_some()
    }

    pub fn ambient_armed(&self) -> bool {
        self.ambient_tick.is_some()
    }

    /// Cancels everything and releases the alarm subsystem.
    pub fn release(&mut self) {
        self.cancel_time_tick();
        self.disarm_ambient();
        if self.alarm_ready {
            self.alarm.fini();
            self.alarm_ready = false;
        }
    }
}
