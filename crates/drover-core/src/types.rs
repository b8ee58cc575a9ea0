use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Unique, immutable identifier for a transcript entry. Assigned at
/// creation and never reused; deletion and lookup go through this id,
/// never through positional indices.
pub type EntryId = Uuid;

/// Entry role in a conversation transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    Human,
    Assistant,
    ActionResult,
}

/// One action requested by an Assistant entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRequest {
    /// Provider-assigned call id; pairs this request with its result.
    pub call_id: String,
    pub name: String,
    pub arguments: Value,
}

/// A single entry in a conversation transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    pub id: EntryId,
    pub role: Role,
    pub content: String,
    /// Present only on Assistant entries that request actions.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub action_requests: Vec<ActionRequest>,
    /// Present only on ActionResult entries; the call this entry answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_of_call_id: Option<String>,
    /// Set on ActionResult entries carrying an error payload.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
    pub timestamp: DateTime<Utc>,
}

impl Entry {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content: content.into(),
            action_requests: Vec::new(),
            result_of_call_id: None,
            is_error: false,
            timestamp: Utc::now(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn human(content: impl Into<String>) -> Self {
        Self::new(Role::Human, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// An ActionResult entry answering `call_id`.
    pub fn action_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        let mut entry = Self::new(Role::ActionResult, content);
        entry.result_of_call_id = Some(call_id.into());
        entry
    }

    /// An ActionResult entry carrying an error payload. The decision step
    /// observes the failure and may retry or explain it to the user.
    pub fn action_error(call_id: impl Into<String>, message: impl Into<String>) -> Self {
        let mut entry = Self::action_result(call_id, message);
        entry.is_error = true;
        entry
    }

    /// Add an action request to an Assistant entry (builder style).
    pub fn with_action_request(
        mut self,
        call_id: impl Into<String>,
        name: impl Into<String>,
        arguments: Value,
    ) -> Self {
        self.action_requests.push(ActionRequest {
            call_id: call_id.into(),
            name: name.into(),
            arguments,
        });
        self
    }

    pub fn has_action_requests(&self) -> bool {
        !self.action_requests.is_empty()
    }
}

/// An action definition advertised to the decision step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionSpec {
    pub name: String,
    pub description: String,
    /// JSON schema for the action's arguments.
    pub parameters: Value,
}

impl ActionSpec {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// Result of invoking one action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionOutput {
    pub content: String,
    pub is_error: bool,
}

impl ActionOutput {
    pub fn success(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn entry_ids_are_unique() {
        let a = Entry::human("one");
        let b = Entry::human("one");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn assistant_builder_accumulates_requests() {
        let entry = Entry::assistant("checking")
            .with_action_request("c1", "list_instances", json!({}))
            .with_action_request("c2", "billing_summary", json!({"days": 7}));

        assert_eq!(entry.role, Role::Assistant);
        assert!(entry.has_action_requests());
        assert_eq!(entry.action_requests.len(), 2);
        assert_eq!(entry.action_requests[1].name, "billing_summary");
    }

    #[test]
    fn action_error_sets_flag_and_pairing() {
        let entry = Entry::action_error("c9", "timeout");
        assert_eq!(entry.role, Role::ActionResult);
        assert!(entry.is_error);
        assert_eq!(entry.result_of_call_id.as_deref(), Some("c9"));
    }

    #[test]
    fn entry_serde_round_trip_preserves_pairing_metadata() {
        let entry = Entry::assistant("on it").with_action_request(
            "c1",
            "start_instance",
            json!({"instance_id": "i-0abc"}),
        );
        let line = serde_json::to_string(&entry).expect("serialize");
        let back: Entry = serde_json::from_str(&line).expect("deserialize");

        assert_eq!(back.id, entry.id);
        assert_eq!(back.action_requests, entry.action_requests);
        assert_eq!(back.result_of_call_id, None);
    }
}
