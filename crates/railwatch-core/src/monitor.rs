//! Poll loop tying subscriptions, the registry, the departure board and the
//! notification sink together.
//!
//! One cycle: apply new subscription commands, query every due service, collect
//! notifications, hand them to the sink as a single batch, sleep.

use std::{sync::Arc, time::Duration};

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    board::{DepartureBoard, ServiceStatus},
    clock::{signed_delay_seconds, Clock, DepartedPolicy},
    domain::MonitoredService,
    notify::NotificationSink,
    registry::{ServiceRegistry, DEFAULT_WINDOW},
    retry::RetryPolicy,
    subscription::SubscriptionProcessor,
    Result,
};

/// Tunables for the monitor.
#[derive(Clone, Copy, Debug)]
pub struct MonitorSettings {
    pub poll_interval: Duration,
    pub window: Duration,
    pub delay_threshold: Duration,
    pub departed_policy: DepartedPolicy,
    pub retry: RetryPolicy,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(120),
            window: DEFAULT_WINDOW,
            delay_threshold: Duration::from_secs(3 * 60),
            departed_policy: DepartedPolicy::NextDay,
            retry: RetryPolicy::default(),
        }
    }
}

/// Notification text for `service` given its board status, if it deserves one.
///
/// Cancellations and unknown delays always notify; a known estimate notifies
/// only when it is more than `threshold` late, reported in whole minutes.
pub fn delay_notification(
    service: &MonitoredService,
    status: ServiceStatus,
    threshold: Duration,
) -> Option<String> {
    let info = service.describe();
    match status {
        ServiceStatus::Cancelled => Some(format!("{info} is cancelled!")),
        ServiceStatus::DelayedUnknownEta => Some(format!("{info} is delayed with no ETA")),
        ServiceStatus::OnTime(estimate) | ServiceStatus::DelayedWithEta(estimate) => {
            let delay = signed_delay_seconds(service.scheduled(), estimate);
            let threshold = i64::try_from(threshold.as_secs()).unwrap_or(i64::MAX);
            if delay > threshold {
                Some(format!("{info} is delayed by {} minutes", delay / 60))
            } else {
                None
            }
        }
    }
}

/// The orchestrator. Constructed once by the entry point and shared by
/// reference (`Arc`) with anything that needs an on-demand query.
pub struct DelayMonitor {
    settings: MonitorSettings,
    registry: Mutex<ServiceRegistry>,
    subscriptions: Mutex<SubscriptionProcessor>,
    board: Arc<dyn DepartureBoard>,
    sink: Arc<dyn NotificationSink>,
    clock: Arc<dyn Clock>,
}

impl DelayMonitor {
    pub fn new(
        settings: MonitorSettings,
        registry: ServiceRegistry,
        subscriptions: SubscriptionProcessor,
        board: Arc<dyn DepartureBoard>,
        sink: Arc<dyn NotificationSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            settings,
            registry: Mutex::new(registry),
            subscriptions: Mutex::new(subscriptions),
            board,
            sink,
            clock,
        }
    }

    pub fn settings(&self) -> &MonitorSettings {
        &self.settings
    }

    /// Serialized form of every monitored service, oldest first.
    pub async fn monitored(&self) -> Vec<String> {
        let registry = self.registry.lock().await;
        registry.services().map(|s| s.serialise()).collect()
    }

    /// Pull new subscription commands and apply them: removals first, then
    /// additions.
    pub async fn check_for_new_service_requests(&self) {
        let requests = {
            let mut subs = self.subscriptions.lock().await;
            subs.poll().await
        };
        if requests.is_empty() {
            return;
        }

        let mut registry = self.registry.lock().await;
        if !requests.remove.is_empty() {
            if let Err(e) = registry.remove_services(&requests.remove) {
                error!(error = %e, "failed to persist service removals");
            }
        }
        if !requests.add.is_empty() {
            if let Err(e) = registry.add_services(&requests.add) {
                error!(error = %e, "failed to persist new services");
            }
        }
    }

    /// Query every due service and deliver the resulting notifications as one
    /// batch. Returns the notifications composed this call (before dedup).
    ///
    /// Cancelled services are dropped from memory straight away; the store
    /// catches up on the next persisting mutation.
    pub async fn query_services(&self) -> Result<Vec<String>> {
        let now = self.clock.now().time();
        let due = {
            let registry = self.registry.lock().await;
            registry.due(now, self.settings.window, self.settings.departed_policy)
        };

        let mut notifications = Vec::new();
        for service in &due {
            info!(service = %service, "querying service");

            let board = &self.board;
            let status = self
                .settings
                .retry
                .run(
                    "departure board query",
                    move || board.query(service),
                    move || board.reset(),
                    None,
                )
                .await;

            let Some(status) = status else {
                continue;
            };

            if status == ServiceStatus::Cancelled {
                let mut registry = self.registry.lock().await;
                registry.remove_from_cache_only(&service.serialise());
            }

            if let Some(text) = delay_notification(service, status, self.settings.delay_threshold) {
                info!(service = %service, notification = %text, "sending delay warning");
                notifications.push(text);
            }
        }

        self.sink.send(&notifications).await?;
        Ok(notifications)
    }

    /// Rebuild external clients; used as the recovery step around whole-monitor
    /// calls.
    pub async fn reset_clients(&self) {
        self.board.reset().await;
        let subs = self.subscriptions.lock().await;
        subs.inbox().reconnect().await;
    }

    /// Run cycles until `cancel` fires. Shutdown is only observed between
    /// cycles and during the sleep, so a cycle never stops half way through a
    /// store write.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(
            interval_secs = self.settings.poll_interval.as_secs(),
            "delay monitor started"
        );
        loop {
            if cancel.is_cancelled() {
                break;
            }

            self.check_for_new_service_requests().await;
            if let Err(e) = self.query_services().await {
                warn!(error = %e, "failed to deliver notifications");
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.settings.poll_interval) => {}
            }
        }
        info!("delay monitor stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        clock::FixedClock,
        domain::{MessageId, SenderId},
        errors::Error,
        messaging::{
            port::Inbox,
            types::{InboundBatch, InboundMessage},
        },
        store::{CursorStore, ServiceStore},
    };
    use async_trait::async_trait;
    use chrono::{NaiveDateTime, NaiveTime};
    use std::{
        collections::HashMap,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Mutex as StdMutex,
        },
    };

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn svc(raw: &str) -> MonitoredService {
        MonitoredService::parse(raw).unwrap()
    }

    #[derive(Default)]
    struct FakeBoard {
        statuses: StdMutex<HashMap<String, ServiceStatus>>,
        failing: StdMutex<Vec<String>>,
        queries: AtomicUsize,
        resets: AtomicUsize,
    }

    impl FakeBoard {
        fn set(&self, raw: &str, status: ServiceStatus) {
            self.statuses.lock().unwrap().insert(raw.to_string(), status);
        }
    }

    #[async_trait]
    impl DepartureBoard for FakeBoard {
        async fn query(&self, service: &MonitoredService) -> Result<Option<ServiceStatus>> {
            self.queries.fetch_add(1, Ordering::SeqCst);
            let key = service.serialise();
            if self.failing.lock().unwrap().contains(&key) {
                return Err(Error::External("board down".to_string()));
            }
            Ok(self.statuses.lock().unwrap().get(&key).copied())
        }

        async fn reset(&self) {
            self.resets.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct FakeSink {
        batches: StdMutex<Vec<Vec<String>>>,
    }

    #[async_trait]
    impl NotificationSink for FakeSink {
        async fn send(&self, notifications: &[String]) -> Result<()> {
            self.batches.lock().unwrap().push(notifications.to_vec());
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeInbox {
        pending: StdMutex<Vec<InboundMessage>>,
    }

    #[async_trait]
    impl Inbox for FakeInbox {
        async fn fetch_after(&self, _after: Option<MessageId>) -> Result<InboundBatch> {
            Ok(std::mem::take(&mut *self.pending.lock().unwrap()).into())
        }

        async fn reply(&self, _to: SenderId, _text: &str) -> Result<()> {
            Ok(())
        }

        async fn reconnect(&self) {}
    }

    struct Harness {
        monitor: DelayMonitor,
        board: Arc<FakeBoard>,
        sink: Arc<FakeSink>,
        inbox: Arc<FakeInbox>,
    }

    fn harness(services: &[&str], now: &str) -> Harness {
        let mut registry = ServiceRegistry::new(ServiceStore::in_memory(), 15);
        registry
            .add_services(&services.iter().map(|s| s.to_string()).collect::<Vec<_>>())
            .unwrap();
        let board = Arc::new(FakeBoard::default());
        let sink = Arc::new(FakeSink::default());
        let inbox = Arc::new(FakeInbox::default());
        let subs = SubscriptionProcessor::new(
            inbox.clone(),
            CursorStore::in_memory(),
            RetryPolicy::default(),
        );
        let clock = Arc::new(FixedClock::new(
            NaiveDateTime::parse_from_str(now, "%Y-%m-%d %H:%M").unwrap(),
        ));
        let monitor = DelayMonitor::new(
            MonitorSettings::default(),
            registry,
            subs,
            board.clone(),
            sink.clone(),
            clock,
        );
        Harness {
            monitor,
            board,
            sink,
            inbox,
        }
    }

    #[test]
    fn small_delay_is_silent_large_delay_notifies() {
        let s = svc("09:00 HIT KGX");
        let threshold = Duration::from_secs(180);

        assert_eq!(
            delay_notification(&s, ServiceStatus::DelayedWithEta(t(9, 2)), threshold),
            None
        );
        assert_eq!(
            delay_notification(&s, ServiceStatus::DelayedWithEta(t(9, 4)), threshold).unwrap(),
            "The 09:00 service from HIT to KGX is delayed by 4 minutes"
        );
        assert_eq!(
            delay_notification(&s, ServiceStatus::DelayedWithEta(t(9, 3)), threshold),
            None
        );
        assert_eq!(delay_notification(&s, ServiceStatus::OnTime(t(9, 0)), threshold), None);
    }

    #[test]
    fn cancelled_and_unknown_eta_always_notify() {
        let s = svc("09:00 HIT KGX");
        let threshold = Duration::from_secs(180);
        assert!(delay_notification(&s, ServiceStatus::Cancelled, threshold)
            .unwrap()
            .ends_with("is cancelled!"));
        assert_eq!(
            delay_notification(&s, ServiceStatus::DelayedUnknownEta, threshold).unwrap(),
            "The 09:00 service from HIT to KGX is delayed with no ETA"
        );
    }

    #[test]
    fn early_running_is_not_a_delay() {
        let s = svc("09:00 HIT KGX");
        assert_eq!(
            delay_notification(&s, ServiceStatus::DelayedWithEta(t(8, 55)), Duration::from_secs(180)),
            None
        );
    }

    #[tokio::test]
    async fn cycle_notifies_in_order_and_drops_cancelled() {
        let h = harness(
            &["09:10 HIT KGX", "09:20 HIT STP", "09:25 HIT PBO", "12:00 HIT KGX"],
            "2026-10-18 09:00",
        );
        h.board.set("09:10 HIT KGX", ServiceStatus::DelayedWithEta(t(9, 16)));
        h.board.set("09:20 HIT STP", ServiceStatus::Cancelled);
        h.board.set("09:25 HIT PBO", ServiceStatus::OnTime(t(9, 25)));

        let out = h.monitor.query_services().await.unwrap();

        assert_eq!(
            out,
            vec![
                "The 09:10 service from HIT to KGX is delayed by 6 minutes".to_string(),
                "The 09:20 service from HIT to STP is cancelled!".to_string(),
            ]
        );
        assert_eq!(h.sink.batches.lock().unwrap().clone(), vec![out]);
        assert_eq!(
            h.monitor.monitored().await,
            vec!["09:10 HIT KGX", "09:25 HIT PBO", "12:00 HIT KGX"]
        );
        // 12:00 is outside the window and never queried.
        assert_eq!(h.board.queries.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn failing_board_degrades_to_no_notification() {
        let h = harness(&["09:10 HIT KGX"], "2026-10-18 09:00");
        h.board.failing.lock().unwrap().push("09:10 HIT KGX".to_string());

        let out = h.monitor.query_services().await.unwrap();

        assert!(out.is_empty());
        assert_eq!(h.board.queries.load(Ordering::SeqCst), 2);
        assert_eq!(h.board.resets.load(Ordering::SeqCst), 2);
        assert_eq!(h.monitor.monitored().await, vec!["09:10 HIT KGX"]);
    }

    #[tokio::test]
    async fn subscription_commands_mutate_registry() {
        let h = harness(&["09:10 HIT KGX"], "2026-10-18 09:00");
        *h.inbox.pending.lock().unwrap() = vec![
            InboundMessage::new(1, 1, "STOP 09:10 HIT KGX"),
            InboundMessage::new(2, 1, "17:42 KGX HIT"),
            InboundMessage::new(3, 1, "nonsense"),
        ];

        h.monitor.check_for_new_service_requests().await;

        assert_eq!(h.monitor.monitored().await, vec!["17:42 KGX HIT"]);
    }

    #[tokio::test]
    async fn run_stops_when_cancelled() {
        let h = harness(&[], "2026-10-18 09:00");
        let cancel = CancellationToken::new();
        cancel.cancel();
        h.monitor.run(cancel).await;
        assert!(h.sink.batches.lock().unwrap().is_empty());
    }
}
