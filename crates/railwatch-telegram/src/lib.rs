//! Telegram adapter (teloxide).
//!
//! Implements the `railwatch-core` ports over the Telegram Bot API:
//! - [`Inbox`]: subscription commands are private messages to the bot, fetched
//!   with `getUpdates` using the update id as the cursor;
//! - [`NotificationSink`]: delay notifications are posted to one configured chat
//!   (usually a channel), prefixed with the date.

use std::{
    sync::{Arc, RwLock},
    time::Duration,
};

use async_trait::async_trait;
use teloxide::{
    prelude::*,
    types::{AllowedUpdate, Update, UpdateKind},
};
use tokio::time::sleep;
use tracing::{debug, warn};

use railwatch_core::{
    clock::Clock,
    domain::{MessageId, SenderId},
    errors::Error,
    messaging::{
        port::Inbox,
        types::{InboundBatch, InboundMessage},
    },
    notify::NotificationSink,
    Result,
};

pub struct TelegramMessenger {
    token: String,
    timeout: Duration,
    notify_chat: ChatId,
    clock: Arc<dyn Clock>,
    bot: RwLock<Bot>,
}

impl TelegramMessenger {
    pub fn new(
        token: impl Into<String>,
        notify_chat_id: i64,
        timeout: Duration,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let token = token.into();
        let bot = build_bot(&token, timeout)?;
        Ok(Self {
            token,
            timeout,
            notify_chat: ChatId(notify_chat_id),
            clock,
            bot: RwLock::new(bot),
        })
    }

    fn bot(&self) -> Bot {
        match self.bot.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn map_err(e: teloxide::RequestError) -> Error {
        Error::External(format!("telegram error: {e}"))
    }

    async fn with_retry<T, Fut>(&self, mut op: impl FnMut() -> Fut) -> Result<T>
    where
        Fut: std::future::IntoFuture<Output = std::result::Result<T, teloxide::RequestError>>,
        Fut::IntoFuture: Send,
    {
        const MAX_RETRIES: usize = 1;
        let mut attempts = 0usize;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) => match e {
                    teloxide::RequestError::RetryAfter(d) if attempts < MAX_RETRIES => {
                        attempts += 1;
                        sleep(d).await;
                        continue;
                    }
                    other => return Err(Self::map_err(other)),
                },
            }
        }
    }
}

fn build_bot(token: &str, timeout: Duration) -> Result<Bot> {
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| Error::External(format!("telegram client build failed: {e}")))?;
    Ok(Bot::with_client(token, client))
}

/// Text messages out of a `getUpdates` batch, oldest first. The batch's
/// `last_seen` covers every update, text or not, so stickers and photos are
/// acknowledged by the next offset.
fn inbound_batch(updates: Vec<Update>) -> InboundBatch {
    let last_seen = updates
        .iter()
        .map(|u| MessageId(i64::from(u.id)))
        .max();
    let mut messages = updates
        .into_iter()
        .filter_map(|update| {
            let UpdateKind::Message(msg) = update.kind else {
                return None;
            };
            let text = msg.text()?;
            Some(InboundMessage::new(
                i64::from(update.id),
                msg.chat.id.0,
                text,
            ))
        })
        .collect::<Vec<_>>();
    messages.sort_by_key(|m| m.id);
    InboundBatch {
        messages,
        last_seen,
    }
}

/// `dd/mm/yy: <text>`, the form notifications are posted in.
fn dated(date: chrono::NaiveDate, text: &str) -> String {
    format!("{}: {text}", date.format("%d/%m/%y"))
}

#[async_trait]
impl Inbox for TelegramMessenger {
    async fn fetch_after(&self, after: Option<MessageId>) -> Result<InboundBatch> {
        let bot = self.bot();
        let offset = match after {
            Some(MessageId(id)) => Some(
                i32::try_from(id.saturating_add(1))
                    .map_err(|_| Error::External(format!("update id out of range: {id}")))?,
            ),
            None => None,
        };

        let updates = self
            .with_retry(|| {
                let mut req = bot
                    .get_updates()
                    .timeout(0)
                    .allowed_updates([AllowedUpdate::Message]);
                if let Some(offset) = offset {
                    req = req.offset(offset);
                }
                req
            })
            .await?;

        let batch = inbound_batch(updates);
        debug!(
            count = batch.messages.len(),
            last_seen = ?batch.last_seen.map(|id| id.0),
            "fetched telegram messages"
        );
        Ok(batch)
    }

    async fn reply(&self, to: SenderId, text: &str) -> Result<()> {
        let bot = self.bot();
        self.with_retry(|| bot.send_message(ChatId(to.0), text.to_string()))
            .await?;
        Ok(())
    }

    async fn reconnect(&self) {
        match build_bot(&self.token, self.timeout) {
            Ok(bot) => {
                if let Ok(mut guard) = self.bot.write() {
                    *guard = bot;
                }
                debug!("telegram client rebuilt");
            }
            Err(e) => warn!(error = %e, "failed to rebuild telegram client"),
        }
    }
}

#[async_trait]
impl NotificationSink for TelegramMessenger {
    async fn send(&self, notifications: &[String]) -> Result<()> {
        let bot = self.bot();
        let today = self.clock.now().date();
        for note in notifications {
            let text = dated(today, note);
            self.with_retry(|| bot.send_message(self.notify_chat, text.clone()))
                .await?;
        }
        Ok(())
    }
}
