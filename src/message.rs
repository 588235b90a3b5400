//! Inbound message shape and the message-source abstraction (§6).
//!
//! Transport (the actual broadcast-channel client) is out of scope per §1;
//! the core only depends on this trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ChannelId, MessageId};

/// Engagement counters attached to a message, used by the Signal Scorer's
/// HDRB component (§4.1).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Engagement {
    pub forwards: u64,
    pub reactions: u64,
    pub replies: u64,
}

/// A single message pulled from a monitored channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub channel_id: ChannelId,
    pub timestamp: DateTime<Utc>,
    pub text: String,
    #[serde(default)]
    pub engagement: Engagement,
}

/// Abstraction over the broadcast-channel transport. The core never talks to
/// a concrete chat/messaging client directly.
#[async_trait]
pub trait MessageSource: Send + Sync {
    async fn connect(&self) -> anyhow::Result<()>;
    async fn disconnect(&self) -> anyhow::Result<()>;

    /// Subscribe to live messages for `channel_id`. Each received message is
    /// handed to `handler`. Implementations own their own reconnect loop.
    async fn subscribe(
        &self,
        channel_id: &str,
        handler: Box<dyn Fn(Message) + Send + Sync>,
    ) -> anyhow::Result<()>;

    /// Pull a page of history, oldest-first, starting after `from_id`
    /// (`None` means from the beginning).
    async fn fetch_history(
        &self,
        channel_id: &str,
        from_id: Option<MessageId>,
        limit: usize,
    ) -> anyhow::Result<Vec<Message>>;
}
