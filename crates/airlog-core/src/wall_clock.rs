//! Wall-clock time derived from a one-off network sync
//!
//! The device has no RTC. Until connectivity syncs the time, only uptime is
//! known; after a sync the wall clock is the synced epoch plus the monotonic
//! time elapsed since.

use core::fmt::Write;

use embassy_time::{Duration, Instant};
use time::{OffsetDateTime, UtcOffset};

/// Local timezone offset of the device (UTC+3).
pub const TIMEZONE_OFFSET_SECS: i32 = 3 * 3600;

#[derive(Debug, Clone, Copy)]
struct SyncPoint {
    at: Instant,
    unix_secs: i64,
}

/// Maps monotonic instants onto local calendar time once synced.
#[derive(Debug, Clone, Copy)]
pub struct WallClock {
    sync: Option<SyncPoint>,
    offset: UtcOffset,
}

impl Default for WallClock {
    fn default() -> Self {
        Self::new(TIMEZONE_OFFSET_SECS)
    }
}

impl WallClock {
    pub fn new(offset_secs: i32) -> Self {
        Self {
            sync: None,
            offset: UtcOffset::from_whole_seconds(offset_secs).unwrap_or(UtcOffset::UTC),
        }
    }

    /// Record that `unix_secs` was the UTC time at `at`.
    pub fn sync(&mut self, at: Instant, unix_secs: i64) {
        self.sync = Some(SyncPoint { at, unix_secs });
    }

    pub fn is_synced(&self) -> bool {
        self.sync.is_some()
    }

    /// Seconds since the Unix epoch at `at`, if synced.
    pub fn unix_time(&self, at: Instant) -> Option<i64> {
        let sync = self.sync?;
        let offset = if at >= sync.at {
            at.saturating_duration_since(sync.at).as_secs() as i64
        } else {
            -(sync.at.saturating_duration_since(at).as_secs() as i64)
        };
        Some(sync.unix_secs + offset)
    }

    fn local(&self, at: Instant) -> Option<OffsetDateTime> {
        let unix = self.unix_time(at)?;
        OffsetDateTime::from_unix_timestamp(unix)
            .ok()
            .map(|dt| dt.to_offset(self.offset))
    }

    /// Write `YYYY-MM-DD HH:MM:SS`. Writes nothing and returns `false` when
    /// the clock has not been synced.
    pub fn write_date_time<W: Write>(&self, at: Instant, out: &mut W) -> bool {
        let Some(dt) = self.local(at) else {
            return false;
        };
        write!(
            out,
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            dt.year(),
            u8::from(dt.month()),
            dt.day(),
            dt.hour(),
            dt.minute(),
            dt.second()
        )
        .is_ok()
    }

    /// Write `HH:MM:SS` of local time, or of `uptime` when not synced.
    pub fn write_clock<W: Write>(&self, at: Instant, uptime: Duration, out: &mut W) {
        match self.local(at) {
            Some(dt) => {
                write!(out, "{:02}:{:02}:{:02}", dt.hour(), dt.minute(), dt.second()).ok();
            }
            None => {
                let secs = uptime.as_secs();
                write!(
                    out,
                    "{:02}:{:02}:{:02}",
                    secs / 3600,
                    (secs % 3600) / 60,
                    secs % 60
                )
                .ok();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use heapless::String;

    #[test]
    fn test_unsynced_clock_writes_nothing() {
        let clock = WallClock::default();
        let mut out = String::<32>::new();
        assert!(!clock.write_date_time(Instant::from_secs(5), &mut out));
        assert!(out.is_empty());
    }

    #[test]
    fn test_date_time_follows_elapsed_time_and_offset() {
        let mut clock = WallClock::default();
        // 2024-01-01 00:00:00 UTC
        clock.sync(Instant::from_secs(100), 1_704_067_200);

        let mut out = String::<32>::new();
        assert!(clock.write_date_time(Instant::from_secs(161), &mut out));
        assert_eq!(out.as_str(), "2024-01-01 03:01:01");
    }

    #[test]
    fn test_clock_falls_back_to_uptime() {
        let clock = WallClock::default();
        let mut out = String::<16>::new();
        clock.write_clock(Instant::from_secs(0), Duration::from_secs(3725), &mut out);
        assert_eq!(out.as_str(), "01:02:05");
    }
}
