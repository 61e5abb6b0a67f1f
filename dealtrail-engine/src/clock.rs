//! Wall-clock abstraction so lease expiry and day-scoped redemption stay testable.

use chrono::{DateTime, FixedOffset, Local, NaiveDate, Utc};
use std::sync::Mutex;

use crate::vendor::DayOfWeek;

/// Source of "now" and of the device-local calendar day.
pub trait Clock: Send + Sync {
    /// Current instant.
    fn now(&self) -> DateTime<Utc>;

    /// Device-local calendar day (midnight to midnight).
    fn today(&self) -> NaiveDate;

    /// Device-local day of the week.
    fn weekday(&self) -> DayOfWeek {
        DayOfWeek::from_date(self.today())
    }
}

/// Clock backed by the host's system time and local timezone.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

/// Manually driven clock pinned to a fixed offset.
#[derive(Debug)]
pub struct FixedClock {
    instant: Mutex<DateTime<FixedOffset>>,
}

impl FixedClock {
    #[must_use]
    pub const fn new(instant: DateTime<FixedOffset>) -> Self {
        Self {
            instant: Mutex::new(instant),
        }
    }

    /// Parse an RFC 3339 timestamp; the offset becomes the "local" zone.
    ///
    /// # Errors
    ///
    /// Returns an error if the timestamp is not valid RFC 3339.
    pub fn parse(rfc3339: &str) -> Result<Self, chrono::ParseError> {
        DateTime::parse_from_rfc3339(rfc3339).map(Self::new)
    }

    /// Move the clock forward (or backward for negative durations).
    pub fn advance(&self, by: chrono::Duration) {
        let mut guard = self
            .instant
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *guard += by;
    }

    fn current(&self) -> DateTime<FixedOffset> {
        *self
            .instant
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.current().with_timezone(&Utc)
    }

    fn today(&self) -> NaiveDate {
        self.current().date_naive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_uses_its_own_offset_for_calendar_day() {
        let clock = FixedClock::parse("2024-06-03T23:30:00-08:00").unwrap();
        assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2024, 6, 3).unwrap());
        assert_eq!(clock.now().date_naive(), NaiveDate::from_ymd_opt(2024, 6, 4).unwrap());
        assert_eq!(clock.weekday(), DayOfWeek::Monday);

        clock.advance(chrono::Duration::hours(1));
        assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2024, 6, 4).unwrap());
        assert_eq!(clock.weekday(), DayOfWeek::Tuesday);
    }
}
