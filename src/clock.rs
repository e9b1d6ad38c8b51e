//! Time source for everything that depends on "today".
//!
//! Lifecycle decisions compare calendar dates, so the service never reads the
//! wall clock directly. Production code injects [`SystemClock`]; tests and
//! administrative tooling use [`ManualClock`].

use std::sync::Mutex;

use chrono::{DateTime, Days, Local, NaiveDate, NaiveTime, Utc};

pub trait Clock: Send + Sync {
    /// Current local calendar date.
    fn today(&self) -> NaiveDate;

    /// Current instant, used for audit timestamps.
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }

    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    today: Mutex<NaiveDate>,
}

impl ManualClock {
    pub fn new(today: NaiveDate) -> Self {
        Self {
            today: Mutex::new(today),
        }
    }

    pub fn set(&self, today: NaiveDate) {
        *self.today.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = today;
    }

    pub fn advance_days(&self, days: u64) -> NaiveDate {
        let mut guard = self.today.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = guard.checked_add_days(Days::new(days)).unwrap_or(*guard);
        *guard
    }
}

impl Clock for ManualClock {
    fn today(&self) -> NaiveDate {
        *self.today.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn now(&self) -> DateTime<Utc> {
        self.today().and_time(NaiveTime::MIN).and_utc()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::new(NaiveDate::from_ymd_opt(2024, 2, 28).unwrap());
        assert_eq!(
            clock.advance_days(2),
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
        );
        assert_eq!(clock.now().date_naive(), clock.today());
        clock.set(NaiveDate::from_ymd_opt(2022, 10, 1).unwrap());
        assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2022, 10, 1).unwrap());
    }
}
