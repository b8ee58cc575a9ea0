//! Messaging channel client: long-polls the relay for inbound envelopes
//! and sends replies through the messaging API.

use anyhow::{Context, Result};
use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use tracing::{Instrument, debug, info_span};

use crate::config::ChannelConfig;
use crate::inbound::Envelope;

const TOKEN_ENV: &str = "DROVER_CHANNEL_TOKEN";

pub(crate) struct ChannelClient {
    client: Client,
    relay_url: String,
    send_url: String,
    token: String,
}

impl ChannelClient {
    /// The access token comes from the environment, never from config.
    pub(crate) fn new(config: &ChannelConfig) -> Result<Self> {
        let token = std::env::var(TOKEN_ENV)
            .with_context(|| format!("{TOKEN_ENV} environment variable not set"))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.poll_seconds + 30))
            .build()
            .context("failed to create HTTP client")?;

        Ok(Self {
            client,
            relay_url: config.relay_url.clone(),
            send_url: format!(
                "{}/{}/messages",
                config.api_url.trim_end_matches('/'),
                config.number_id
            ),
            token,
        })
    }

    /// Long-poll the relay. An empty body or 204 means no traffic.
    pub(crate) async fn poll(&self) -> Result<Vec<Envelope>> {
        let response = self
            .client
            .get(&self.relay_url)
            .bearer_auth(&self.token)
            .send()
            .await
            .context("failed to poll channel relay")?;

        let status = response.status();
        if status == reqwest::StatusCode::NO_CONTENT {
            return Ok(Vec::new());
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("relay poll failed: {status} - {body}");
        }

        let body = response.text().await.context("failed to read relay body")?;
        if body.trim().is_empty() {
            return Ok(Vec::new());
        }

        let envelopes: Vec<Envelope> =
            serde_json::from_str(&body).context("failed to parse relay envelopes")?;
        debug!(count = envelopes.len(), "polled relay");
        Ok(envelopes)
    }

    /// Send a text message to `recipient` through the messaging API.
    pub(crate) async fn send_text(&self, recipient: &str, body: &str) -> Result<()> {
        let span = info_span!("channel_send", to = %recipient);
        async {
            let payload = json!({
                "messaging_product": "whatsapp",
                "to": recipient,
                "type": "text",
                "text": {"body": body}
            });

            let response = self
                .client
                .post(&self.send_url)
                .bearer_auth(&self.token)
                .json(&payload)
                .send()
                .await
                .context("failed to send channel message")?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                anyhow::bail!("channel send failed: {status} - {body}");
            }
            debug!("message delivered to channel");
            Ok(())
        }
        .instrument(span)
        .await
    }
}

impl std::fmt::Debug for ChannelClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelClient")
            .field("relay_url", &self.relay_url)
            .field("send_url", &self.send_url)
            .finish_non_exhaustive()
    }
}
