//! Action dispatch.

use crate::traits::{Action, ActionExecutor};
use crate::types::{ActionOutput, ActionSpec};
use anyhow::Result;
use async_trait::async_trait;
use tracing::{Instrument, debug, info_span};

/// Routes action requests to registered [`Action`] handlers by name.
///
/// A request for an unregistered name is not an infrastructure failure:
/// it comes back as an error output so the decision step can see it and
/// correct course.
#[allow(missing_debug_implementations)]
pub struct ActionRouter {
    actions: Vec<Box<dyn Action>>,
}

impl ActionRouter {
    pub fn new(actions: Vec<Box<dyn Action>>) -> Self {
        Self { actions }
    }
}

impl Default for ActionRouter {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

#[async_trait]
impl ActionExecutor for ActionRouter {
    async fn invoke(&self, name: &str, arguments: serde_json::Value) -> Result<ActionOutput> {
        let span = info_span!("action_invoke", action = %name);
        async {
            debug!(arguments = %arguments, "action arguments");
            for action in &self.actions {
                if action.definition().name == name {
                    return action.execute(arguments).await;
                }
            }
            Ok(ActionOutput::error(format!("unknown action: {name}")))
        }
        .instrument(span)
        .await
    }

    fn catalog(&self) -> Vec<ActionSpec> {
        self.actions.iter().map(|a| a.definition()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::FakeAction;

    #[tokio::test]
    async fn router_dispatches_by_name() {
        let router = ActionRouter::new(vec![
            Box::new(FakeAction::new("start_instance", "started")),
            Box::new(FakeAction::new("stop_instance", "stopped")),
        ]);

        let output = router
            .invoke("stop_instance", serde_json::json!({"instance_id": "i-1"}))
            .await
            .unwrap();
        assert!(!output.is_error);
        assert_eq!(output.content, "stopped");
    }

    #[tokio::test]
    async fn router_reports_unknown_action_as_error_output() {
        let router = ActionRouter::default();
        let output = router
            .invoke("missing", serde_json::json!({}))
            .await
            .unwrap();

        assert!(output.is_error);
        assert_eq!(output.content, "unknown action: missing");
    }

    #[test]
    fn catalog_lists_registered_definitions() {
        let router = ActionRouter::new(vec![
            Box::new(FakeAction::new("list_instances", "[]")),
            Box::new(FakeAction::new("billing_summary", "{}")),
        ]);

        let names: Vec<_> = router.catalog().into_iter().map(|spec| spec.name).collect();
        assert_eq!(names, vec!["list_instances", "billing_summary"]);
    }
}
