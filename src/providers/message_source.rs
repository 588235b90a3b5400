//! A minimal [`MessageSource`] adapter against a generic HTTP polling
//! endpoint.
//!
//! The broadcast-channel client itself is out of scope (§1): whatever
//! platform a deployment actually monitors (Telegram, Discord, a vendor
//! webhook relay, …) is expected to speak this same `fetch_history`/
//! `subscribe` contract from crate::message behind its own adapter. This
//! one exists so the binary has a real, runnable default — it polls a
//! configured base URL for `{id, channel_id, timestamp, text, engagement}`
//! JSON objects, the same shape `Message` deserializes to, in the same
//! plain-`reqwest`-client style as [`super::DexScreenerProvider`].

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::message::{Message, MessageSource};

/// Polls `{base_url}/channels/{channel_id}/messages` for history and
/// `{base_url}/channels/{channel_id}/live` for a live tail, at a fixed
/// interval. No authentication: credential loading for a concrete platform
/// is out of scope (§1) and left to whatever reverse proxy fronts this URL.
pub struct HttpPollingMessageSource {
    client: reqwest::Client,
    base_url: String,
    poll_interval: Duration,
}

impl HttpPollingMessageSource {
    pub fn new(base_url: String, poll_interval: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .expect("reqwest client builds with static config");
        Self { client, base_url, poll_interval }
    }
}

#[async_trait]
impl MessageSource for HttpPollingMessageSource {
    async fn connect(&self) -> anyhow::Result<()> {
        let url = format!("{}/health", self.base_url);
        self.client.get(&url).send().await?;
        Ok(())
    }

    async fn disconnect(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Polls the live-tail endpoint on an interval and hands each new
    /// message to `handler`, reconnecting with a fixed backoff on
    /// transport failure — the in-flight signals the Outcome Engine is
    /// already tracking are unaffected by a subscription gap (§7
    /// `message_source_disconnect`).
    async fn subscribe(&self, channel_id: &str, handler: Box<dyn Fn(Message) + Send + Sync>) -> anyhow::Result<()> {
        let mut since: Option<i64> = None;
        loop {
            let url = format!("{}/channels/{}/live", self.base_url, channel_id);
            let mut req = self.client.get(&url);
            if let Some(s) = since {
                req = req.query(&[("since", s)]);
            }

            match req.send().await.and_then(|r| r.error_for_status()) {
                Ok(resp) => match resp.json::<Vec<Message>>().await {
                    Ok(messages) => {
                        for message in messages {
                            since = Some(since.map_or(message.id, |s| s.max(message.id)));
                            handler(message);
                        }
                    }
                    Err(e) => warn!(channel_id, error = %e, "malformed live-tail response"),
                },
                Err(e) => {
                    warn!(channel_id, error = %e, "live-tail poll failed, retrying after backoff");
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn fetch_history(&self, channel_id: &str, from_id: Option<i64>, limit: usize) -> anyhow::Result<Vec<Message>> {
        let url = format!("{}/channels/{}/messages", self.base_url, channel_id);
        let mut req = self.client.get(&url).query(&[("limit", limit.to_string())]);
        if let Some(id) = from_id {
            req = req.query(&[("after", id)]);
        }

        let resp = req.send().await?.error_for_status()?;
        let messages: Vec<Message> = resp.json().await?;
        debug!(channel_id, count = messages.len(), "fetched history page");
        Ok(messages)
    }
}
