//! Operational actions exposed to the decision step.
//!
//! Most actions call the operations API; `send_message` goes out through
//! the messaging channel. Bad arguments and API-level failures come back
//! as error outputs so the decision step can react to them; only transport
//! failures surface as errors to the controller.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use drover_core::traits::Action;
use drover_core::types::{ActionOutput, ActionSpec};
use drover_core::ActionRouter;
use reqwest::Client;
use serde_json::{Value, json};

use crate::channel::ChannelClient;
use crate::config::OperationsConfig;

const TOKEN_ENV: &str = "DROVER_OPS_TOKEN";

/// Shared HTTP client for the operations API.
pub(crate) struct OpsClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl OpsClient {
    pub(crate) fn new(config: &OperationsConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .context("failed to create HTTP client")?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            token: std::env::var(TOKEN_ENV).ok(),
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut req = self.client.request(method, format!("{}{path}", self.base_url));
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        req
    }

    async fn get(&self, path: &str) -> Result<ActionOutput> {
        let response = self
            .request(reqwest::Method::GET, path)
            .send()
            .await
            .with_context(|| format!("operations API request failed: GET {path}"))?;
        Self::into_output(response).await
    }

    async fn post(&self, path: &str, body: &Value) -> Result<ActionOutput> {
        let response = self
            .request(reqwest::Method::POST, path)
            .json(body)
            .send()
            .await
            .with_context(|| format!("operations API request failed: POST {path}"))?;
        Self::into_output(response).await
    }

    async fn into_output(response: reqwest::Response) -> Result<ActionOutput> {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if status.is_success() {
            Ok(ActionOutput::success(body))
        } else {
            Ok(ActionOutput::error(format!(
                "operations API returned {status}: {body}"
            )))
        }
    }
}

impl std::fmt::Debug for OpsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpsClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

fn required_str(arguments: &Value, key: &str) -> std::result::Result<String, ActionOutput> {
    arguments
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| ActionOutput::error(format!("missing required argument: {key}")))
}

// ---------------------------------------------------------------------------
// Instance lifecycle
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub(crate) struct StartInstanceAction {
    ops: Arc<OpsClient>,
}

#[async_trait]
impl Action for StartInstanceAction {
    fn definition(&self) -> ActionSpec {
        ActionSpec::new(
            "start_instance",
            "Start a stopped compute instance by id.",
            json!({
                "type": "object",
                "properties": {
                    "instance_id": {"type": "string", "description": "Instance identifier"}
                },
                "required": ["instance_id"]
            }),
        )
    }

    async fn execute(&self, arguments: Value) -> Result<ActionOutput> {
        let instance_id = match required_str(&arguments, "instance_id") {
            Ok(id) => id,
            Err(output) => return Ok(output),
        };
        self.ops
            .post(&format!("/instances/{instance_id}/start"), &json!({}))
            .await
    }
}

#[derive(Debug)]
pub(crate) struct StopInstanceAction {
    ops: Arc<OpsClient>,
}

#[async_trait]
impl Action for StopInstanceAction {
    fn definition(&self) -> ActionSpec {
        ActionSpec::new(
            "stop_instance",
            "Stop a running compute instance by id.",
            json!({
                "type": "object",
                "properties": {
                    "instance_id": {"type": "string", "description": "Instance identifier"}
                },
                "required": ["instance_id"]
            }),
        )
    }

    async fn execute(&self, arguments: Value) -> Result<ActionOutput> {
        let instance_id = match required_str(&arguments, "instance_id") {
            Ok(id) => id,
            Err(output) => return Ok(output),
        };
        self.ops
            .post(&format!("/instances/{instance_id}/stop"), &json!({}))
            .await
    }
}

#[derive(Debug)]
pub(crate) struct ListInstancesAction {
    ops: Arc<OpsClient>,
}

#[async_trait]
impl Action for ListInstancesAction {
    fn definition(&self) -> ActionSpec {
        ActionSpec::new(
            "list_instances",
            "List compute instances with their names and current state.",
            json!({"type": "object", "properties": {}}),
        )
    }

    async fn execute(&self, _arguments: Value) -> Result<ActionOutput> {
        self.ops.get("/instances").await
    }
}

// ---------------------------------------------------------------------------
// Billing
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub(crate) struct BillingSummaryAction {
    ops: Arc<OpsClient>,
}

#[async_trait]
impl Action for BillingSummaryAction {
    fn definition(&self) -> ActionSpec {
        ActionSpec::new(
            "billing_summary",
            "Fetch a cost breakdown for the last N days (default 30).",
            json!({
                "type": "object",
                "properties": {
                    "days": {"type": "integer", "description": "Days to look back", "default": 30}
                }
            }),
        )
    }

    async fn execute(&self, arguments: Value) -> Result<ActionOutput> {
        let days = arguments.get("days").and_then(Value::as_u64).unwrap_or(30);
        self.ops.get(&format!("/billing/summary?days={days}")).await
    }
}

// ---------------------------------------------------------------------------
// Tickets
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub(crate) struct CreateTicketAction {
    ops: Arc<OpsClient>,
}

#[async_trait]
impl Action for CreateTicketAction {
    fn definition(&self) -> ActionSpec {
        ActionSpec::new(
            "create_ticket",
            "Create a work-tracking ticket with a title and description.",
            json!({
                "type": "object",
                "properties": {
                    "title": {"type": "string"},
                    "description": {"type": "string"},
                    "acceptance_criteria": {"type": "string"}
                },
                "required": ["title", "description"]
            }),
        )
    }

    async fn execute(&self, arguments: Value) -> Result<ActionOutput> {
        let title = match required_str(&arguments, "title") {
            Ok(title) => title,
            Err(output) => return Ok(output),
        };
        let description = match required_str(&arguments, "description") {
            Ok(description) => description,
            Err(output) => return Ok(output),
        };
        let acceptance_criteria = arguments
            .get("acceptance_criteria")
            .and_then(Value::as_str)
            .unwrap_or_default();

        self.ops
            .post(
                "/tickets",
                &json!({
                    "title": title,
                    "description": description,
                    "acceptance_criteria": acceptance_criteria
                }),
            )
            .await
    }
}

// ---------------------------------------------------------------------------
// Outbound messaging
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub(crate) struct SendMessageAction {
    channel: Arc<ChannelClient>,
}

#[async_trait]
impl Action for SendMessageAction {
    fn definition(&self) -> ActionSpec {
        ActionSpec::new(
            "send_message",
            "Send a chat message to a recipient other than the current thread.",
            json!({
                "type": "object",
                "properties": {
                    "recipient": {"type": "string", "description": "Recipient phone number"},
                    "message": {"type": "string"}
                },
                "required": ["recipient", "message"]
            }),
        )
    }

    async fn execute(&self, arguments: Value) -> Result<ActionOutput> {
        let recipient = match required_str(&arguments, "recipient") {
            Ok(recipient) => recipient,
            Err(output) => return Ok(output),
        };
        let message = match required_str(&arguments, "message") {
            Ok(message) => message,
            Err(output) => return Ok(output),
        };

        self.channel.send_text(&recipient, &message).await?;
        Ok(ActionOutput::success(format!("message sent to {recipient}")))
    }
}

/// Build the full action router for the gateway.
pub(crate) fn build_router(ops: Arc<OpsClient>, channel: Arc<ChannelClient>) -> ActionRouter {
    ActionRouter::new(vec![
        Box::new(StartInstanceAction {
            ops: Arc::clone(&ops),
        }),
        Box::new(StopInstanceAction {
            ops: Arc::clone(&ops),
        }),
        Box::new(ListInstancesAction {
            ops: Arc::clone(&ops),
        }),
        Box::new(BillingSummaryAction {
            ops: Arc::clone(&ops),
        }),
        Box::new(CreateTicketAction { ops }),
        Box::new(SendMessageAction { channel }),
    ])
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_str_reports_missing_argument() {
        let output = required_str(&json!({}), "instance_id").unwrap_err();
        assert!(output.is_error);
        assert_eq!(output.content, "missing required argument: instance_id");
    }

    #[test]
    fn required_str_extracts_value() {
        let value = required_str(&json!({"instance_id": "i-1"}), "instance_id").unwrap();
        assert_eq!(value, "i-1");
    }

    #[tokio::test]
    async fn start_instance_rejects_missing_id_without_calling_api() {
        let ops = Arc::new(
            OpsClient::new(&OperationsConfig {
                base_url: "http://127.0.0.1:9".to_owned(),
            })
            .unwrap(),
        );
        let action = StartInstanceAction { ops };
        let output = action.execute(json!({})).await.unwrap();
        assert!(output.is_error);
        assert!(output.content.contains("instance_id"));
    }
}
