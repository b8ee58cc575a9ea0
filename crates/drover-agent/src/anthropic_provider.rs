//! Direct Anthropic API provider for the decision step.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{Instrument, debug, info, info_span, warn};

use drover_core::traits::Provider;
use drover_core::transcript::Transcript;
use drover_core::types::{ActionSpec, Entry, Role};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Max retry attempts for transient errors.
const MAX_RETRIES: u32 = 3;

pub struct AnthropicProvider {
    client: Client,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl AnthropicProvider {
    pub fn new(api_key: String, model: &str, max_tokens: u32) -> Result<Self> {
        debug!(model, "creating anthropic provider");

        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()
            .context("failed to create HTTP client")?;

        Ok(Self {
            client,
            api_key,
            model: model.to_owned(),
            max_tokens,
        })
    }

    /// Create from environment variable ANTHROPIC_API_KEY.
    pub fn from_env(model: &str, max_tokens: u32) -> Result<Self> {
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .context("ANTHROPIC_API_KEY environment variable not set")?;
        Self::new(api_key, model, max_tokens)
    }

    /// Send a request with retry on transient errors (429, 500, 502, 503).
    async fn send_with_retry(&self, body: &Value) -> Result<reqwest::Response> {
        let mut last_err = None;

        for attempt in 0..=MAX_RETRIES {
            let response = self
                .client
                .post(ANTHROPIC_API_URL)
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .header("content-type", "application/json")
                .json(body)
                .send()
                .await
                .context("failed to send request to Anthropic")?;

            let status = response.status();
            debug!(status = %status, attempt = attempt + 1, "http response");

            if status.is_success() {
                return Ok(response);
            }

            let is_retryable = matches!(status.as_u16(), 429 | 500 | 502 | 503);

            if !is_retryable || attempt == MAX_RETRIES {
                let error_text = response.text().await.unwrap_or_default();
                anyhow::bail!("Anthropic API error: {status} - {error_text}");
            }

            let error_text = response.text().await.unwrap_or_default();
            let backoff_ms = 1000u64 * 2u64.pow(attempt);
            warn!(
                attempt = attempt + 1,
                max = MAX_RETRIES,
                status = %status,
                backoff_ms,
                "retryable Anthropic error, backing off: {error_text}"
            );

            tokio::time::sleep(std::time::Duration::from_millis(backoff_ms)).await;

            last_err = Some(format!("{status} - {error_text}"));
        }

        anyhow::bail!(
            "Anthropic API error after retries: {}",
            last_err.unwrap_or_default()
        );
    }

    fn build_body(&self, system: &str, transcript: &Transcript, actions: &[ActionSpec]) -> Value {
        let mut body = json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "system": system,
            "messages": Self::format_entries(transcript),
        });

        if !actions.is_empty() {
            body["tools"] = json!(Self::format_actions(actions));
        }

        body
    }

    /// Convert transcript entries to the Anthropic messages array.
    ///
    /// The System entry is carried in the top-level `system` field and
    /// skipped here. Consecutive ActionResult entries collapse into one
    /// user message, the shape the API expects for tool results.
    fn format_entries(transcript: &Transcript) -> Vec<Value> {
        let mut messages: Vec<Value> = Vec::new();
        let mut pending_results: Vec<Value> = Vec::new();

        let flush_results = |messages: &mut Vec<Value>, pending: &mut Vec<Value>| {
            if !pending.is_empty() {
                messages.push(json!({
                    "role": "user",
                    "content": std::mem::take(pending)
                }));
            }
        };

        for entry in transcript.entries() {
            match entry.role {
                Role::System => {}
                Role::Human => {
                    flush_results(&mut messages, &mut pending_results);
                    messages.push(json!({
                        "role": "user",
                        "content": [{"type": "text", "text": entry.content}]
                    }));
                }
                Role::Assistant => {
                    flush_results(&mut messages, &mut pending_results);
                    let mut content = Vec::new();
                    if !entry.content.is_empty() {
                        content.push(json!({"type": "text", "text": entry.content}));
                    }
                    for request in &entry.action_requests {
                        content.push(json!({
                            "type": "tool_use",
                            "id": request.call_id,
                            "name": request.name,
                            "input": request.arguments
                        }));
                    }
                    messages.push(json!({"role": "assistant", "content": content}));
                }
                Role::ActionResult => {
                    pending_results.push(json!({
                        "type": "tool_result",
                        "tool_use_id": entry.result_of_call_id,
                        "content": entry.content,
                        "is_error": entry.is_error
                    }));
                }
            }
        }
        flush_results(&mut messages, &mut pending_results);
        messages
    }

    fn format_actions(actions: &[ActionSpec]) -> Vec<Value> {
        actions
            .iter()
            .map(|a| {
                json!({
                    "name": a.name,
                    "description": a.description,
                    "input_schema": a.parameters
                })
            })
            .collect()
    }

    /// Parse an Anthropic response into a single Assistant entry.
    fn parse_response(response: &AnthropicResponse) -> Entry {
        let mut text = String::new();
        let mut entry = Entry::assistant("");

        for block in &response.content {
            match block {
                ContentBlock::Text { text: t } => {
                    if !text.is_empty() {
                        text.push('\n');
                    }
                    text.push_str(t);
                }
                ContentBlock::ToolUse { id, name, input } => {
                    entry = entry.with_action_request(id, name, input.clone());
                }
            }
        }

        entry.content = text;
        entry
    }
}

impl std::fmt::Debug for AnthropicProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicProvider")
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn decide(
        &self,
        system: &str,
        transcript: &Transcript,
        actions: &[ActionSpec],
    ) -> Result<Entry> {
        let span = info_span!(
            "anthropic_request",
            model = %self.model,
            entry_count = transcript.len(),
            action_count = actions.len(),
        );

        async {
            let body = self.build_body(system, transcript, actions);
            let response = self.send_with_retry(&body).await?;

            let api_response: AnthropicResponse = response
                .json()
                .await
                .context("failed to parse Anthropic response")?;

            let entry = Self::parse_response(&api_response);
            info!(
                stop_reason = %api_response.stop_reason.as_deref().unwrap_or("unknown"),
                requests = entry.action_requests.len(),
                "anthropic decision"
            );

            Ok(entry)
        }
        .instrument(span)
        .await
    }
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use serde_json::json;

    #[test]
    fn entries_format_with_collapsed_results() {
        let mut transcript = Transcript::new();
        transcript.push(Entry::system("prompt"));
        transcript.push(Entry::human("stop both"));
        transcript.push(
            Entry::assistant("on it")
                .with_action_request("c1", "stop_instance", json!({"instance_id": "i-1"}))
                .with_action_request("c2", "stop_instance", json!({"instance_id": "i-2"})),
        );
        transcript.push(Entry::action_result("c1", "stopped i-1"));
        transcript.push(Entry::action_result("c2", "stopped i-2"));

        let messages = AnthropicProvider::format_entries(&transcript);
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0]["role"], "user");
        assert_eq!(messages[1]["role"], "assistant");
        assert_eq!(messages[1]["content"].as_array().unwrap().len(), 3);
        assert_eq!(messages[2]["role"], "user");
        assert_eq!(messages[2]["content"].as_array().unwrap().len(), 2);
        assert_eq!(messages[2]["content"][0]["type"], "tool_result");
    }

    #[test]
    fn response_with_tool_use_parses_into_requests() {
        let raw = json!({
            "content": [
                {"type": "text", "text": "Let me check."},
                {"type": "tool_use", "id": "c1", "name": "list_instances", "input": {}}
            ],
            "stop_reason": "tool_use"
        });
        let response: AnthropicResponse = serde_json::from_value(raw).unwrap();
        let entry = AnthropicProvider::parse_response(&response);

        assert_eq!(entry.role, Role::Assistant);
        assert_eq!(entry.content, "Let me check.");
        assert_eq!(entry.action_requests.len(), 1);
        assert_eq!(entry.action_requests[0].call_id, "c1");
    }
}
