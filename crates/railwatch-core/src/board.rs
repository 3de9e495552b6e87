//! Departure-board port.
//!
//! Adapters fetch a board from the provider, map each row into a
//! [`BoardEntry`] and use [`select_service`] so every provider applies the same
//! exact-match rules.

use async_trait::async_trait;
use chrono::NaiveTime;

use crate::{
    domain::{parse_clock_time, MonitoredService},
    Result,
};

/// Real-time state of a monitored departure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServiceStatus {
    OnTime(NaiveTime),
    DelayedWithEta(NaiveTime),
    DelayedUnknownEta,
    Cancelled,
}

/// One row of a provider's departure board, already decoded from the wire.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BoardEntry {
    /// Scheduled departure, `HH:MM`.
    pub scheduled: String,
    /// Estimated departure: `On time`, `Delayed`, `Cancelled` or `HH:MM`.
    pub estimate: String,
    /// CRS codes of the service's destination(s).
    pub destinations: Vec<String>,
    pub cancelled: bool,
}

impl BoardEntry {
    /// Map the provider's free-text estimate into a [`ServiceStatus`].
    ///
    /// Anything that is neither a clock time nor a known keyword counts as
    /// running to schedule.
    pub fn status(&self, scheduled: NaiveTime) -> ServiceStatus {
        if self.cancelled {
            return ServiceStatus::Cancelled;
        }
        let estimate = self.estimate.trim();
        if let Some(t) = parse_clock_time(estimate) {
            return if t == scheduled {
                ServiceStatus::OnTime(t)
            } else {
                ServiceStatus::DelayedWithEta(t)
            };
        }
        match estimate.to_lowercase().as_str() {
            "cancelled" => ServiceStatus::Cancelled,
            "delayed" => ServiceStatus::DelayedUnknownEta,
            _ => ServiceStatus::OnTime(scheduled),
        }
    }
}

/// Pick the row for `service`: scheduled time must match exactly and the
/// requested destination must be among the row's destinations.
pub fn select_service<'a>(
    entries: &'a [BoardEntry],
    service: &MonitoredService,
) -> Option<&'a BoardEntry> {
    entries.iter().find(|e| {
        e.scheduled == service.scheduled_text()
            && e.destinations.iter().any(|d| d == service.destination())
    })
}

/// Hexagonal port for the real-time departure board.
#[async_trait]
pub trait DepartureBoard: Send + Sync {
    /// Current status of `service`, or `None` when the board has no matching row.
    async fn query(&self, service: &MonitoredService) -> Result<Option<ServiceStatus>>;

    /// Rebuild the underlying client/session after a failure.
    async fn reset(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(std: &str, etd: &str, dests: &[&str]) -> BoardEntry {
        BoardEntry {
            scheduled: std.to_string(),
            estimate: etd.to_string(),
            destinations: dests.iter().map(|s| s.to_string()).collect(),
            cancelled: false,
        }
    }

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn selects_exact_time_and_destination() {
        let svc = MonitoredService::parse("09:15 HIT KGX").unwrap();
        let rows = vec![
            entry("09:15", "On time", &["STP"]),
            entry("09:16", "On time", &["KGX"]),
            entry("09:15", "09:20", &["PBO", "KGX"]),
        ];
        let picked = select_service(&rows, &svc).unwrap();
        assert_eq!(picked.estimate, "09:20");
    }

    #[test]
    fn no_match_is_absent() {
        let svc = MonitoredService::parse("09:15 HIT KGX").unwrap();
        let rows = vec![entry("9:15", "On time", &["KGX"])];
        assert!(select_service(&rows, &svc).is_none());
    }

    #[test]
    fn maps_estimates_to_status() {
        let sched = t(9, 0);
        assert_eq!(entry("09:00", "On time", &[]).status(sched), ServiceStatus::OnTime(sched));
        assert_eq!(entry("09:00", "09:00", &[]).status(sched), ServiceStatus::OnTime(sched));
        assert_eq!(
            entry("09:00", "09:07", &[]).status(sched),
            ServiceStatus::DelayedWithEta(t(9, 7))
        );
        assert_eq!(
            entry("09:00", "Delayed", &[]).status(sched),
            ServiceStatus::DelayedUnknownEta
        );
        assert_eq!(entry("09:00", "Cancelled", &[]).status(sched), ServiceStatus::Cancelled);

        let mut flagged = entry("09:00", "On time", &[]);
        flagged.cancelled = true;
        assert_eq!(flagged.status(sched), ServiceStatus::Cancelled);
    }
}
