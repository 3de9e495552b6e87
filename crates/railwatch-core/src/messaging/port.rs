use async_trait::async_trait;

use crate::{
    domain::{MessageId, SenderId},
    messaging::types::InboundBatch,
    Result,
};

/// Cross-messenger port for the subscription channel.
#[async_trait]
pub trait Inbox: Send + Sync {
    /// Every message with an id strictly greater than `after`, oldest first.
    /// `None` fetches whatever the provider still holds.
    async fn fetch_after(&self, after: Option<MessageId>) -> Result<InboundBatch>;

    /// Send a direct reply to the author of an inbound message.
    async fn reply(&self, to: SenderId, text: &str) -> Result<()>;

    /// Re-authenticate / rebuild the client after a failure.
    async fn reconnect(&self);
}

/// Inbox used when no messaging channel is configured: never receives anything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullInbox;

#[async_trait]
impl Inbox for NullInbox {
    async fn fetch_after(&self, _after: Option<MessageId>) -> Result<InboundBatch> {
        Ok(InboundBatch::default())
    }

    async fn reply(&self, _to: SenderId, _text: &str) -> Result<()> {
        Ok(())
    }

    async fn reconnect(&self) {}
}
