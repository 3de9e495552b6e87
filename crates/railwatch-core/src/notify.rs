use std::{collections::HashSet, sync::Arc};

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{clock::Clock, Result};

/// Outbound side: where delay notifications are delivered.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Deliver a batch of notifications, in order.
    async fn send(&self, notifications: &[String]) -> Result<()>;
}

/// Sink used when no channel is configured. Notifications are only returned to
/// the caller (and visible through the on-demand endpoint).
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

#[async_trait]
impl NotificationSink for NullSink {
    async fn send(&self, _notifications: &[String]) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Default)]
struct SentLog {
    day: Option<NaiveDate>,
    texts: HashSet<String>,
}

/// NotificationSink decorator that delivers each distinct text at most once
/// per local day.
///
/// The log lives in memory only; a restart may repeat the day's notifications.
/// Fresh texts are handed to the inner sink one at a time and each is recorded
/// as soon as its delivery succeeds, so after a failure part way through a
/// batch only the undelivered texts are attempted again.
pub struct DedupSink {
    inner: Arc<dyn NotificationSink>,
    clock: Arc<dyn Clock>,
    sent: Mutex<SentLog>,
}

impl DedupSink {
    pub fn new(inner: Arc<dyn NotificationSink>, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner,
            clock,
            sent: Mutex::new(SentLog::default()),
        }
    }
}

#[async_trait]
impl NotificationSink for DedupSink {
    async fn send(&self, notifications: &[String]) -> Result<()> {
        let today = self.clock.now().date();

        // Held across the inner sends so concurrent callers cannot both deliver
        // the same text.
        let mut log = self.sent.lock().await;
        if log.day != Some(today) {
            log.day = Some(today);
            log.texts.clear();
        }

        let mut batch_seen: HashSet<&str> = HashSet::new();
        let mut fresh = Vec::new();
        for n in notifications {
            if log.texts.contains(n) || !batch_seen.insert(n.as_str()) {
                continue;
            }
            fresh.push(n.clone());
        }

        let suppressed = notifications.len() - fresh.len();
        if suppressed > 0 {
            debug!(suppressed, "suppressed duplicate notifications");
        }
        if fresh.is_empty() {
            return Ok(());
        }

        let mut delivered = 0usize;
        for text in fresh {
            if let Err(e) = self.inner.send(std::slice::from_ref(&text)).await {
                warn!(delivered, error = %e, "notification batch interrupted");
                return Err(e);
            }
            log.texts.insert(text);
            delivered += 1;
        }
        info!(count = delivered, "notifications delivered");
        Ok(())
    }
}
