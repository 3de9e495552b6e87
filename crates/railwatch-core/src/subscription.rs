//! Subscription commands received over the messaging channel.
//!
//! `HH:MM ORG DST` subscribes, `STOP HH:MM ORG DST` unsubscribes. Each message is
//! handled at most once: a persisted cursor holds the highest id seen and only
//! newer messages are fetched.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::{
    domain::{MessageId, MonitoredService, SenderId},
    messaging::{
        port::Inbox,
        types::{InboundBatch, InboundMessage},
    },
    retry::RetryPolicy,
    store::CursorStore,
};

const STOP_TOKEN: &str = "STOP";

pub const USAGE_HINT: &str =
    "Valid message format is HH:MM STN DEST, using station CRS codes. For example, 13:24 HIT KGX";

/// What a message body asks for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Request {
    Add(MonitoredService),
    Remove(MonitoredService),
    Invalid,
}

/// Classify a message body.
///
/// A body containing `STOP` is a removal only if what remains after stripping
/// every `STOP` is itself a valid command; otherwise the whole body is checked
/// as an add command (and will normally be invalid).
pub fn classify(body: &str) -> Request {
    if body.contains(STOP_TOKEN) {
        let stripped = body.replace(STOP_TOKEN, "");
        if let Ok(svc) = MonitoredService::parse(stripped.trim()) {
            return Request::Remove(svc);
        }
    }
    match MonitoredService::parse(body) {
        Ok(svc) => Request::Add(svc),
        Err(_) => Request::Invalid,
    }
}

/// Normalized commands collected from one batch, in arrival order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SubscriptionRequests {
    pub add: Vec<String>,
    pub remove: Vec<String>,
}

impl SubscriptionRequests {
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty()
    }
}

pub struct SubscriptionProcessor {
    inbox: Arc<dyn Inbox>,
    store: CursorStore,
    cursor: Option<MessageId>,
    retry: RetryPolicy,
}

impl SubscriptionProcessor {
    pub fn new(inbox: Arc<dyn Inbox>, store: CursorStore, retry: RetryPolicy) -> Self {
        let cursor = store.load();
        info!(cursor = ?cursor.map(|c| c.0), "message cursor loaded");
        Self {
            inbox,
            store,
            cursor,
            retry,
        }
    }

    pub fn cursor(&self) -> Option<MessageId> {
        self.cursor
    }

    pub fn inbox(&self) -> &Arc<dyn Inbox> {
        &self.inbox
    }

    /// Fetch messages newer than the cursor, reply to each sender and return
    /// the add/remove commands for the registry.
    ///
    /// A failed fetch (after retries) is an empty batch; the cursor is not
    /// touched and the same messages are fetched next time.
    pub async fn poll(&mut self) -> SubscriptionRequests {
        let after = self.cursor;
        let inbox = &self.inbox;
        let batch = self
            .retry
            .run(
                "fetch messages",
                move || inbox.fetch_after(after),
                move || inbox.reconnect(),
                InboundBatch::default(),
            )
            .await;

        let mut out = SubscriptionRequests::default();
        if batch.is_empty() {
            return out;
        }

        if let Some(last) = batch.last_seen {
            self.advance_cursor(last);
        }
        for msg in &batch.messages {
            self.advance_cursor(msg.id);

            if after.is_some_and(|a| msg.id <= a) {
                debug!(id = msg.id.0, "skipping already processed message");
                continue;
            }

            self.handle(msg, &mut out).await;
        }

        if let Some(cursor) = self.cursor {
            if let Err(e) = self.store.save(cursor) {
                warn!(cursor = cursor.0, error = %e, "failed to persist message cursor");
            }
        }

        out
    }

    fn advance_cursor(&mut self, id: MessageId) {
        if self.cursor.map_or(true, |c| id > c) {
            self.cursor = Some(id);
        }
    }

    async fn handle(&self, msg: &InboundMessage, out: &mut SubscriptionRequests) {
        match classify(&msg.text) {
            Request::Remove(svc) => {
                let normalized = svc.serialise();
                info!(id = msg.id.0, service = %normalized, "removing");
                self.reply(msg.sender, &format!("Removed! - {normalized}")).await;
                out.remove.push(normalized);
            }
            Request::Add(svc) => {
                let normalized = svc.serialise();
                info!(id = msg.id.0, service = %normalized, "subscribing");
                self.reply(msg.sender, &format!("Subscribed! - {normalized}")).await;
                out.add.push(normalized);
            }
            Request::Invalid => {
                info!(id = msg.id.0, text = %msg.text, "invalid request");
                self.reply(
                    msg.sender,
                    &format!("I received an invalid request: {}", msg.text),
                )
                .await;
                self.reply(msg.sender, USAGE_HINT).await;
            }
        }
    }

    async fn reply(&self, to: SenderId, text: &str) {
        if let Err(e) = self.inbox.reply(to, text).await {
            warn!(sender = to.0, error = %e, "failed to send reply");
        }
    }
}
