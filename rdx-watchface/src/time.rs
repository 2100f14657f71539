//! Wall-clock snapshots and the clock sources that produce them.
//!
//! The core never caches "now": every tick, every alarm arm and every ambient
//! refresh reads a fresh [`TimeSnapshot`] from a [`ClockSource`]. Snapshots are
//! plain values handed to callbacks by reference; a callback that wants to keep
//! one past its return has to clone it.

use chrono::{DateTime, Datelike, Timelike, Utc};
use chrono_tz::Tz;
use std::path::Path;
use tracing::debug;

const LOCALTIME_LINK: &str = "/etc/localtime";
const ZONEINFO_MARKER: &str = "zoneinfo/";

/// A broken-down reading of the wall clock in the device's timezone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeSnapshot {
    pub year: i32,
    /// 1..=12
    pub month: u32,
    pub day: u32,
    /// 1 (Sunday) ..= 7 (Saturday)
    pub day_of_week: u32,
    /// 12-hour presentation, 1..=12
    pub hour: u32,
    /// 0..=23
    pub hour24: u32,
    pub minute: u32,
    pub second: u32,
    /// 0..=999
    pub millisecond: u32,
    /// Seconds since the Unix epoch.
    pub timestamp: i64,
    /// IANA timezone identifier, e.g. `Europe/Berlin`.
    pub timezone: String,
}

impl TimeSnapshot {
    /// Builds a snapshot from a zoned date-time.
    pub fn from_datetime(now: &DateTime<Tz>) -> Self {
        let hour24 = now.hour();
        let hour = match hour24 % 12 {
            0 => 12,
            h => h,
        };
        Self {
            year: now.year(),
            month: now.month(),
            day: now.day(),
            day_of_week: now.weekday().number_from_sunday(),
            hour,
            hour24,
            minute: now.minute(),
            // Leap seconds surface as nanosecond overflow in chrono.
            second: now.second().min(59),
            millisecond: now.timestamp_subsec_millis().min(999),
            timestamp: now.timestamp(),
            timezone: now.timezone().name().to_string(),
        }
    }

    /// The snapshot's instant as a UTC date-time.
    pub fn utc_time(&self) -> Option<DateTime<Utc>> {
        DateTime::<Utc>::from_timestamp(self.timestamp, self.millisecond * 1_000_000)
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn timezone(&self) -> &str {
        &self.timezone
    }
}

/// Produces time snapshots on demand.
pub trait ClockSource: Send {
    fn now(&self) -> TimeSnapshot;
}

/// The host wall clock, rendered in a fixed timezone.
#[derive(Debug, Clone)]
pub struct SystemClock {
    timezone: Tz,
}

impl SystemClock {
    pub fn new(timezone: Tz) -> Self {
        Self { timezone }
    }

    /// Uses the zone the `/etc/localtime` symlink points at, or `fallback`
    /// when the link is missing or names an unknown zone.
    pub fn from_localtime(fallback: Tz) -> Self {
        let timezone = discover_timezone(Path::new(LOCALTIME_LINK)).unwrap_or(fallback);
        debug!("System clock using timezone {}", timezone.name());
        Self::new(timezone)
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }
}

impl ClockSource for SystemClock {
    fn now(&self) -> TimeSnapshot {
        let now = Utc::now().with_timezone(&self.timezone);
        TimeSnapshot::from_datetime(&now)
    }
}

/// Reads the timezone name out of a `.../zoneinfo/Area/City` symlink target.
fn discover_timezone(link: &Path) -> Option<Tz> {
    let target = std::fs::read_link(link).ok()?;
    let target = target.to_string_lossy();
    zone_from_link_target(&target)
}

fn zone_from_link_target(target: &str) -> Option<Tz> {
    let (_, zone) = target.split_once(ZONEINFO_MARKER)?;
    zone.parse::<Tz>().ok()
}

/// Convenience for building snapshots at a given UTC instant.
#[cfg(test)]
pub(crate) fn snapshot_at(timezone: Tz, utc: DateTime<Utc>) -> TimeSnapshot {
    TimeSnapshot::from_datetime(&utc.with_timezone(&timezone))
}
