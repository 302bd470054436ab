use std::sync::Mutex;

use chrono::{DateTime, Utc};

/// Single time source per `assign` / sweep invocation so scoring,
/// timer due dates, and audit timestamps agree with each other.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Test clock advanced manually instead of sleeping.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(now) }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        match self.now.lock() {
            Ok(mut guard) => *guard = now,
            Err(poisoned) => *poisoned.into_inner() = now,
        }
    }

    pub fn advance(&self, duration: chrono::Duration) {
        match self.now.lock() {
            Ok(mut guard) => *guard += duration,
            Err(poisoned) => *poisoned.into_inner() += duration,
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        match self.now.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, Utc};

    use super::{Clock, FixedClock};

    #[test]
    fn fixed_clock_advances_without_sleeping() {
        let start: DateTime<Utc> =
            DateTime::parse_from_rfc3339("2026-03-01T09:00:00Z").expect("valid").with_timezone(&Utc);
        let clock = FixedClock::new(start);

        assert_eq!(clock.now(), start);

        clock.advance(Duration::minutes(46));
        assert_eq!(clock.now(), start + Duration::minutes(46));
    }
}
