//! Wall-clock and local calendar

use chrono::{
    DateTime, Duration, FixedOffset, Local, NaiveDate, NaiveDateTime, NaiveTime, Offset, TimeZone,
    Utc,
};
use mailwarm_common::config::WarmupConfig;
use mailwarm_common::{Error, Result};
use std::sync::{Arc, RwLock};

/// Source of the current time and of the "local" calendar used for
/// windows and day boundaries
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Convert a local wall-clock time to UTC
    fn local_to_utc(&self, local: NaiveDateTime) -> DateTime<Utc>;

    /// Local calendar date of a UTC instant
    fn local_date(&self, at: DateTime<Utc>) -> NaiveDate;

    fn today(&self) -> NaiveDate {
        self.local_date(self.now())
    }

    /// UTC bounds of a local calendar day, end inclusive at the last nanosecond
    fn day_bounds(&self, date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
        let start = date.and_time(NaiveTime::MIN);
        let next = start + Duration::days(1);
        (
            self.local_to_utc(start),
            self.local_to_utc(next) - Duration::nanoseconds(1),
        )
    }
}

/// Host clock in the host's local zone
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn local_to_utc(&self, local: NaiveDateTime) -> DateTime<Utc> {
        // A wall time skipped by a DST jump resolves to the hour after
        Local
            .from_local_datetime(&local)
            .earliest()
            .or_else(|| {
                Local
                    .from_local_datetime(&(local + Duration::hours(1)))
                    .earliest()
            })
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|| Utc.from_utc_datetime(&local))
    }

    fn local_date(&self, at: DateTime<Utc>) -> NaiveDate {
        at.with_timezone(&Local).date_naive()
    }
}

/// Clock with a fixed UTC offset, optionally pinned to an instant
#[derive(Debug)]
pub struct FixedOffsetClock {
    offset: FixedOffset,
    pinned: RwLock<Option<DateTime<Utc>>>,
}

impl FixedOffsetClock {
    pub fn new(offset: FixedOffset) -> Self {
        Self {
            offset,
            pinned: RwLock::new(None),
        }
    }

    /// Offset given in minutes east of UTC
    pub fn from_minutes(minutes: i32) -> Result<Self> {
        FixedOffset::east_opt(minutes * 60)
            .map(Self::new)
            .ok_or_else(|| Error::Config(format!("Invalid UTC offset: {} minutes", minutes)))
    }

    pub fn utc() -> Self {
        Self::new(Utc.fix())
    }

    /// Freeze the clock at `at`
    pub fn pinned_at(self, at: DateTime<Utc>) -> Self {
        self.set(at);
        self
    }

    /// Move a pinned clock
    pub fn set(&self, at: DateTime<Utc>) {
        let mut pinned = self.pinned.write().unwrap_or_else(|e| e.into_inner());
        *pinned = Some(at);
    }

    /// Advance a pinned clock
    pub fn advance(&self, by: Duration) {
        let next = self.now() + by;
        self.set(next);
    }
}

impl Clock for FixedOffsetClock {
    fn now(&self) -> DateTime<Utc> {
        let pinned = *self.pinned.read().unwrap_or_else(|e| e.into_inner());
        pinned.unwrap_or_else(Utc::now)
    }

    fn local_to_utc(&self, local: NaiveDateTime) -> DateTime<Utc> {
        let shifted = local - Duration::seconds(i64::from(self.offset.local_minus_utc()));
        Utc.from_utc_datetime(&shifted)
    }

    fn local_date(&self, at: DateTime<Utc>) -> NaiveDate {
        at.with_timezone(&self.offset).date_naive()
    }
}

/// Build the clock selected by the warmup configuration
pub fn clock_from_config(config: &WarmupConfig) -> Result<Arc<dyn Clock>> {
    match config.utc_offset_minutes {
        Some(minutes) => Ok(Arc::new(FixedOffsetClock::from_minutes(minutes)?)),
        None => Ok(Arc::new(SystemClock)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn naive(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    #[test]
    fn test_fixed_offset_conversion() {
        let clock = FixedOffsetClock::from_minutes(120).unwrap();
        let utc = clock.local_to_utc(naive(2024, 3, 4, 8, 0));
        assert_eq!(utc, Utc.with_ymd_and_hms(2024, 3, 4, 6, 0, 0).unwrap());
        assert_eq!(
            clock.local_date(Utc.with_ymd_and_hms(2024, 3, 4, 23, 30, 0).unwrap()),
            NaiveDate::from_ymd_opt(2024, 3, 5).unwrap()
        );
    }

    #[test]
    fn test_day_bounds_cover_local_day() {
        let clock = FixedOffsetClock::from_minutes(-300).unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        let (start, end) = clock.day_bounds(date);

        assert_eq!(start, Utc.with_ymd_and_hms(2024, 3, 4, 5, 0, 0).unwrap());
        assert_eq!(
            end,
            Utc.with_ymd_and_hms(2024, 3, 5, 5, 0, 0).unwrap() - Duration::nanoseconds(1)
        );
        assert_eq!(clock.local_date(start), date);
        assert_eq!(clock.local_date(end), date);
    }

    #[test]
    fn test_pinned_clock_advances() {
        let at = Utc.with_ymd_and_hms(2024, 3, 4, 10, 0, 0).unwrap();
        let clock = FixedOffsetClock::utc().pinned_at(at);
        assert_eq!(clock.now(), at);

        clock.advance(Duration::minutes(5));
        assert_eq!(clock.now(), at + Duration::minutes(5));
        assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2024, 3, 4).unwrap());
    }

    #[test]
    fn test_invalid_offset_rejected() {
        assert!(FixedOffsetClock::from_minutes(24 * 60).is_err());
    }
}
