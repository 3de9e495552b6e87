use crate::domain::{MessageId, SenderId};

/// A text message received on the messaging channel.
///
/// Channel-specific fields stay in the adapter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundMessage {
    pub id: MessageId,
    pub sender: SenderId,
    pub text: String,
}

impl InboundMessage {
    pub fn new(id: i64, sender: i64, text: impl Into<String>) -> Self {
        Self {
            id: MessageId(id),
            sender: SenderId(sender),
            text: text.into(),
        }
    }
}

/// One fetch from the messaging channel.
///
/// `last_seen` is the highest id the provider handed over, including updates
/// that carry no text and so never become an [`InboundMessage`]. The cursor
/// advances to it so those updates are not fetched again.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InboundBatch {
    pub messages: Vec<InboundMessage>,
    pub last_seen: Option<MessageId>,
}

impl InboundBatch {
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty() && self.last_seen.is_none()
    }
}

impl From<Vec<InboundMessage>> for InboundBatch {
    fn from(messages: Vec<InboundMessage>) -> Self {
        let last_seen = messages.iter().map(|m| m.id).max();
        Self {
            messages,
            last_seen,
        }
    }
}
