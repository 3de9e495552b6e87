use std::{
    fmt,
    hash::{Hash, Hasher},
    sync::OnceLock,
};

use chrono::NaiveTime;
use regex::Regex;

use crate::{errors::Error, Result};

/// Length of a station CRS code (`HIT`, `KGX`, ...).
pub const STATION_CODE_LEN: usize = 3;

/// Inbound message id on the messaging channel. Ids grow monotonically.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MessageId(pub i64);

/// Sender of an inbound message (numeric chat id on Telegram).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SenderId(pub i64);

/// A scheduled departure the monitor tracks: `HH:MM ORIGIN DEST`.
///
/// Identity is the serialized triple. Two services with the same text are the
/// same service, no matter where they came from.
#[derive(Clone, Debug)]
pub struct MonitoredService {
    scheduled_text: String,
    scheduled: NaiveTime,
    origin: String,
    destination: String,
}

impl MonitoredService {
    /// Parse a `HH:MM ORIGIN DEST` command.
    ///
    /// The time must be 24-hour and zero padded; both station codes must be
    /// exactly three characters. Tokens may be separated by any whitespace.
    pub fn parse(raw: &str) -> Result<Self> {
        let parts = raw.split_whitespace().collect::<Vec<_>>();
        let [time, origin, destination] = parts.as_slice() else {
            return Err(Error::invalid_command(
                raw,
                format!("expected 3 fields, got {}", parts.len()),
            ));
        };

        let scheduled = parse_clock_time(time)
            .ok_or_else(|| Error::invalid_command(raw, format!("invalid time: {time}")))?;

        for code in [origin, destination] {
            if code.chars().count() != STATION_CODE_LEN {
                return Err(Error::invalid_command(
                    raw,
                    format!("station code must be {STATION_CODE_LEN} characters: {code}"),
                ));
            }
        }

        Ok(Self {
            scheduled_text: time.to_string(),
            scheduled,
            origin: origin.to_string(),
            destination: destination.to_string(),
        })
    }

    pub fn scheduled(&self) -> NaiveTime {
        self.scheduled
    }

    /// Scheduled departure exactly as the user wrote it (`HH:MM`).
    pub fn scheduled_text(&self) -> &str {
        &self.scheduled_text
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// Canonical `HH:MM ORIGIN DEST` form, used as the storage record and identity.
    pub fn serialise(&self) -> String {
        format!(
            "{} {} {}",
            self.scheduled_text, self.origin, self.destination
        )
    }

    /// Human description used as the subject of every notification.
    pub fn describe(&self) -> String {
        format!(
            "The {} service from {} to {}",
            self.scheduled_text, self.origin, self.destination
        )
    }
}

impl PartialEq for MonitoredService {
    fn eq(&self, other: &Self) -> bool {
        self.scheduled_text == other.scheduled_text
            && self.origin == other.origin
            && self.destination == other.destination
    }
}

impl Eq for MonitoredService {}

impl Hash for MonitoredService {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.scheduled_text.hash(state);
        self.origin.hash(state);
        self.destination.hash(state);
    }
}

impl fmt::Display for MonitoredService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.serialise())
    }
}

/// Parse a strict `HH:MM` clock time (24-hour, zero padded).
pub fn parse_clock_time(s: &str) -> Option<NaiveTime> {
    static CLOCK_RE: OnceLock<Regex> = OnceLock::new();
    let re = CLOCK_RE
        .get_or_init(|| Regex::new(r"^([01]\d|2[0-3]):[0-5]\d$").expect("valid regex"));
    if !re.is_match(s) {
        return None;
    }
    NaiveTime::parse_from_str(s, "%H:%M").ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_normalises_whitespace() {
        let svc = MonitoredService::parse("  09:15   HIT\tKGX ").unwrap();
        assert_eq!(svc.serialise(), "09:15 HIT KGX");
        assert_eq!(svc.scheduled(), NaiveTime::from_hms_opt(9, 15, 0).unwrap());
        assert_eq!(svc.describe(), "The 09:15 service from HIT to KGX");
    }

    #[test]
    fn rejects_short_station_code() {
        let err = MonitoredService::parse("09:15 HIT K").unwrap_err();
        assert!(matches!(err, Error::InvalidCommand { .. }));
    }

    #[test]
    fn rejects_wrong_field_count() {
        assert!(MonitoredService::parse("09:15 HIT").is_err());
        assert!(MonitoredService::parse("09:15 HIT KGX now").is_err());
        assert!(MonitoredService::parse("").is_err());
    }

    #[test]
    fn clock_time_must_be_zero_padded_24h() {
        assert!(parse_clock_time("09:15").is_some());
        assert!(parse_clock_time("23:59").is_some());
        assert!(parse_clock_time("9:15").is_none());
        assert!(parse_clock_time("24:00").is_none());
        assert!(parse_clock_time("12:60").is_none());
        assert!(parse_clock_time("On time").is_none());
    }

    #[test]
    fn equality_is_by_serialized_triple() {
        let a = MonitoredService::parse("09:15 HIT KGX").unwrap();
        let b = MonitoredService::parse("09:15  HIT  KGX").unwrap();
        let c = MonitoredService::parse("09:15 HIT STP").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
