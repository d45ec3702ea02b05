use chrono::{DateTime, Utc};
use chrono_tz::Tz;

/// Zone used when `[clock] timezone` is not set.
pub const DEFAULT_TIMEZONE: Tz = chrono_tz::Asia::Shanghai;

/// Source of "now" in the configured time zone.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Tz>;
}

/// Wall clock in a named zone. The UTC offset is resolved on every call, so
/// daylight-saving changes apply without a restart.
pub struct SystemClock {
    tz: Tz,
}

impl SystemClock {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Tz> {
        Utc::now().with_timezone(&self.tz)
    }
}

#[cfg(test)]
pub struct FixedClock(std::sync::Mutex<DateTime<Tz>>);

#[cfg(test)]
impl FixedClock {
    /// `rfc3339` read in [`DEFAULT_TIMEZONE`].
    pub fn at(rfc3339: &str) -> Self {
        Self::in_zone(rfc3339, DEFAULT_TIMEZONE)
    }

    pub fn in_zone(rfc3339: &str, tz: Tz) -> Self {
        Self(std::sync::Mutex::new(parse_in(rfc3339, tz)))
    }

    /// Move the clock, keeping its zone.
    pub fn set(&self, rfc3339: &str) {
        let mut now = self.0.lock().unwrap();
        *now = parse_in(rfc3339, now.timezone());
    }
}

#[cfg(test)]
fn parse_in(rfc3339: &str, tz: Tz) -> DateTime<Tz> {
    DateTime::parse_from_rfc3339(rfc3339)
        .unwrap()
        .with_timezone(&tz)
}

#[cfg(test)]
impl Clock for FixedClock {
    fn now(&self) -> DateTime<Tz> {
        *self.0.lock().unwrap()
    }
}
