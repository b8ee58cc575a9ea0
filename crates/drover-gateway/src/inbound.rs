//! Typed view of the messaging channel's webhook envelope.
//!
//! The relay forwards webhook bodies verbatim. Each envelope carries zero
//! or more text messages plus delivery-status notifications, which the
//! gateway ignores.

use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
pub(crate) struct Envelope {
    #[serde(default)]
    entry: Vec<EnvelopeEntry>,
}

#[derive(Debug, Deserialize)]
struct EnvelopeEntry {
    #[serde(default)]
    changes: Vec<Change>,
}

#[derive(Debug, Deserialize)]
struct Change {
    #[serde(default)]
    value: ChangeValue,
}

#[derive(Debug, Deserialize, Default)]
struct ChangeValue {
    #[serde(default)]
    messages: Vec<ChannelMessage>,
    #[serde(default)]
    statuses: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct ChannelMessage {
    #[serde(default)]
    from: Option<String>,
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    text: Option<TextBody>,
}

#[derive(Debug, Deserialize)]
struct TextBody {
    body: String,
}

impl Envelope {
    fn values(&self) -> impl Iterator<Item = &ChangeValue> {
        self.entry
            .iter()
            .flat_map(|e| e.changes.iter())
            .map(|c| &c.value)
    }

    /// Delivery receipts carry statuses and no messages.
    pub(crate) fn is_status_update(&self) -> bool {
        let mut saw_status = false;
        for value in self.values() {
            if !value.messages.is_empty() {
                return false;
            }
            saw_status |= !value.statuses.is_empty();
        }
        saw_status
    }

    /// Sender id of the first message, used as the conversation thread id.
    pub(crate) fn thread_id(&self) -> Option<String> {
        self.values()
            .flat_map(|v| v.messages.iter())
            .find_map(|m| m.from.clone())
    }

    /// Concatenated bodies of all text messages in the envelope.
    pub(crate) fn text(&self) -> Option<String> {
        let bodies: Vec<&str> = self
            .values()
            .flat_map(|v| v.messages.iter())
            .filter(|m| m.kind == "text")
            .filter_map(|m| m.text.as_ref().map(|t| t.body.as_str()))
            .collect();
        if bodies.is_empty() {
            None
        } else {
            Some(bodies.join(" "))
        }
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> Envelope {
        serde_json::from_str(raw).unwrap()
    }

    #[test]
    fn extracts_text_and_thread_from_message_envelope() {
        let envelope = parse(
            r#"{
                "entry": [{
                    "changes": [{
                        "value": {
                            "messages": [{
                                "from": "15551230001",
                                "type": "text",
                                "text": {"body": "stop the staging db"}
                            }]
                        }
                    }]
                }]
            }"#,
        );

        assert!(!envelope.is_status_update());
        assert_eq!(envelope.thread_id().as_deref(), Some("15551230001"));
        assert_eq!(envelope.text().as_deref(), Some("stop the staging db"));
    }

    #[test]
    fn joins_multiple_text_bodies() {
        let envelope = parse(
            r#"{
                "entry": [{
                    "changes": [{
                        "value": {
                            "messages": [
                                {"from": "1555", "type": "text", "text": {"body": "part one"}},
                                {"from": "1555", "type": "text", "text": {"body": "part two"}}
                            ]
                        }
                    }]
                }]
            }"#,
        );

        assert_eq!(envelope.text().as_deref(), Some("part one part two"));
    }

    #[test]
    fn status_update_is_detected_and_has_no_text() {
        let envelope = parse(
            r#"{
                "entry": [{
                    "changes": [{
                        "value": {
                            "statuses": [{"id": "wamid.x", "status": "delivered"}]
                        }
                    }]
                }]
            }"#,
        );

        assert!(envelope.is_status_update());
        assert!(envelope.text().is_none());
        assert!(envelope.thread_id().is_none());
    }

    #[test]
    fn non_text_messages_yield_no_body() {
        let envelope = parse(
            r#"{
                "entry": [{
                    "changes": [{
                        "value": {
                            "messages": [{"from": "1555", "type": "image"}]
                        }
                    }]
                }]
            }"#,
        );

        assert!(!envelope.is_status_update());
        assert_eq!(envelope.thread_id().as_deref(), Some("1555"));
        assert!(envelope.text().is_none());
    }

    #[test]
    fn empty_envelope_parses() {
        let envelope = parse("{}");
        assert!(!envelope.is_status_update());
        assert!(envelope.thread_id().is_none());
    }
}
