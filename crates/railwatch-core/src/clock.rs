use std::{str::FromStr, sync::Mutex};

use chrono::{NaiveDateTime, NaiveTime, Utc};
use chrono_tz::Tz;

use crate::{errors::Error, Result};

const DAY_SECS: i64 = 24 * 60 * 60;
const HALF_DAY_SECS: i64 = DAY_SECS / 2;

/// Source of local wall-clock time.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// Wall clock in a fixed IANA timezone (departure boards report local times).
#[derive(Clone, Copy, Debug)]
pub struct SystemClock {
    tz: Tz,
}

impl SystemClock {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Utc::now().with_timezone(&self.tz).naive_local()
    }
}

/// Manually driven clock.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<NaiveDateTime>,
}

impl FixedClock {
    pub fn new(now: NaiveDateTime) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: NaiveDateTime) {
        if let Ok(mut guard) = self.now.lock() {
            *guard = now;
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        match self.now.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

/// What "time until departure" means once the scheduled time-of-day is behind us.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DepartedPolicy {
    /// The delta wraps modulo 24h: a time earlier than now is tomorrow's departure.
    #[default]
    NextDay,
    /// Signed same-day delta: a time earlier than now has departed and is skipped.
    Ignore,
}

impl FromStr for DepartedPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "next-day" | "next_day" | "nextday" => Ok(Self::NextDay),
            "ignore" => Ok(Self::Ignore),
            other => Err(Error::Config(format!(
                "unknown departed policy {other:?} (expected next-day or ignore)"
            ))),
        }
    }
}

/// Seconds from `now` until `scheduled`, or `None` when the service has already
/// departed under [`DepartedPolicy::Ignore`].
pub fn seconds_until(scheduled: NaiveTime, now: NaiveTime, policy: DepartedPolicy) -> Option<i64> {
    let delta = (scheduled - now).num_seconds();
    match policy {
        DepartedPolicy::NextDay => Some(delta.rem_euclid(DAY_SECS)),
        DepartedPolicy::Ignore if delta < 0 => None,
        DepartedPolicy::Ignore => Some(delta),
    }
}

/// Signed delay of `estimate` relative to `scheduled`, folded into (-12h, +12h].
///
/// A 23:58 service expected at 00:05 is seven minutes late, not a day early.
pub fn signed_delay_seconds(scheduled: NaiveTime, estimate: NaiveTime) -> i64 {
    let mut delta = (estimate - scheduled).num_seconds();
    if delta > HALF_DAY_SECS {
        delta -= DAY_SECS;
    } else if delta <= -HALF_DAY_SECS {
        delta += DAY_SECS;
    }
    delta
}
