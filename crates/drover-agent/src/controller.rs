//! The conversation loop controller.
//!
//! One inbound message runs reconcile, then decide/act rounds until the
//! provider replies with plain text, then prune and a single persist.
//! Action failures feed back into the loop as error results; only the
//! checkpoint store and the provider can fail the whole cycle.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use drover_core::traits::{ActionExecutor, CheckpointStore, Provider};
use drover_core::types::Entry;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::reconcile;
use crate::retention::RetentionPolicy;

/// Reply delivered when the decide/act loop exceeds its round cap.
pub const FALLBACK_REPLY: &str = "Sorry, I was unable to complete this request.";

/// Source of the System entry content, refreshed every decision round.
#[derive(Debug, Clone)]
pub struct SystemPrompt {
    inline: String,
    path: Option<PathBuf>,
}

impl SystemPrompt {
    pub fn inline(text: impl Into<String>) -> Self {
        Self {
            inline: text.into(),
            path: None,
        }
    }

    /// Read the prompt from `path` on every cycle, so edits take effect
    /// without a restart. `fallback` is used when the file is unreadable.
    pub fn from_file(path: PathBuf, fallback: impl Into<String>) -> Self {
        Self {
            inline: fallback.into(),
            path: Some(path),
        }
    }

    pub fn current(&self) -> String {
        let Some(path) = &self.path else {
            return self.inline.clone();
        };
        match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "system prompt unreadable, using fallback");
                self.inline.clone()
            }
        }
    }
}

#[allow(missing_debug_implementations)]
pub struct Controller {
    provider: Arc<dyn Provider>,
    actions: Arc<dyn ActionExecutor>,
    store: Arc<dyn CheckpointStore>,
    retention: RetentionPolicy,
    system_prompt: SystemPrompt,
    max_decide_act_rounds: usize,
}

impl Controller {
    pub fn new(
        provider: Arc<dyn Provider>,
        actions: Arc<dyn ActionExecutor>,
        store: Arc<dyn CheckpointStore>,
        retention: RetentionPolicy,
        system_prompt: SystemPrompt,
        max_decide_act_rounds: usize,
    ) -> Self {
        Self {
            provider,
            actions,
            store,
            retention,
            system_prompt,
            max_decide_act_rounds,
        }
    }

    /// Run the full cycle for one inbound message and return the reply.
    ///
    /// All mutation happens on the in-memory transcript; the store sees
    /// exactly one `save`, at the end. A failure before that point leaves
    /// the checkpoint at its previous state for the delivery layer to
    /// retry against.
    pub async fn handle_inbound(&self, thread_id: &str, text: &str) -> Result<String> {
        let span = info_span!("handle_inbound", thread = %thread_id);
        async {
            let mut transcript = self
                .store
                .load(thread_id)
                .await
                .with_context(|| format!("loading checkpoint for thread {thread_id}"))?;

            let repaired = reconcile::orphan_deletions(&transcript);
            if !repaired.is_empty() {
                info!(count = repaired.len(), "reconciled transcript on load");
                transcript.delete(&repaired);
            }

            transcript.push(Entry::human(text));

            let catalog = self.actions.catalog();
            let mut reply = None;
            for round in 0..self.max_decide_act_rounds {
                let system = self.system_prompt.current();
                transcript.replace_or_insert_system(&system);

                let decision = self
                    .provider
                    .decide(&system, &transcript, &catalog)
                    .await
                    .context("decision step failed")?;
                let requests = decision.action_requests.clone();
                let decision_text = decision.content.clone();
                transcript.push(decision);

                if requests.is_empty() {
                    reply = Some(decision_text);
                    break;
                }

                debug!(round, count = requests.len(), "invoking requested actions");
                for request in &requests {
                    let entry = match self
                        .actions
                        .invoke(&request.name, request.arguments.clone())
                        .await
                    {
                        Ok(output) if output.is_error => {
                            Entry::action_error(&request.call_id, output.content)
                        }
                        Ok(output) => Entry::action_result(&request.call_id, output.content),
                        Err(err) => {
                            warn!(action = %request.name, error = %err, "action invocation failed");
                            Entry::action_error(&request.call_id, format!("action failed: {err:#}"))
                        }
                    };
                    transcript.push(entry);
                }
            }

            let reply = match reply {
                Some(reply) => reply,
                None => {
                    // Every act round appended all of its results, so the
                    // extra entries are consistent and safe to keep.
                    warn!(
                        rounds = self.max_decide_act_rounds,
                        "decision loop exceeded round cap"
                    );
                    FALLBACK_REPLY.to_owned()
                }
            };

            let pruned = self.retention.deletions(&transcript);
            if !pruned.is_empty() {
                info!(count = pruned.len(), "pruning transcript");
                transcript.delete(&pruned);
            }
            let repaired = reconcile::orphan_deletions(&transcript);
            transcript.delete(&repaired);

            self.store
                .save(thread_id, &transcript)
                .await
                .with_context(|| format!("saving checkpoint for thread {thread_id}"))?;

            Ok(reply)
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use drover_core::actions::ActionRouter;
    use drover_core::fakes::{FailingAction, FakeAction, FakeProvider, MemoryCheckpointStore};
    use drover_core::transcript::Transcript;
    use drover_core::types::Role;
    use serde_json::json;

    fn controller_with(
        provider: FakeProvider,
        router: ActionRouter,
        store: Arc<MemoryCheckpointStore>,
        max_rounds: usize,
    ) -> Controller {
        Controller::new(
            Arc::new(provider),
            Arc::new(router),
            store,
            RetentionPolicy::new(6, 10).unwrap(),
            SystemPrompt::inline("You are an operations assistant."),
            max_rounds,
        )
    }

    #[tokio::test]
    async fn plain_reply_persists_once_and_returns_text() {
        let store = Arc::new(MemoryCheckpointStore::new());
        let controller = controller_with(
            FakeProvider::replying("All quiet."),
            ActionRouter::default(),
            Arc::clone(&store),
            4,
        );

        let reply = controller.handle_inbound("t1", "status?").await.unwrap();
        assert_eq!(reply, "All quiet.");
        assert_eq!(store.save_count(), 1);

        let saved = store.load("t1").await.unwrap();
        let roles: Vec<_> = saved.entries().iter().map(|e| e.role).collect();
        assert_eq!(roles, vec![Role::System, Role::Human, Role::Assistant]);
    }

    #[tokio::test]
    async fn action_round_appends_paired_result() {
        let store = Arc::new(MemoryCheckpointStore::new());
        let provider = FakeProvider::scripted(vec![
            Entry::assistant("stopping it").with_action_request(
                "c1",
                "stop_instance",
                json!({"instance_id": "i-1"}),
            ),
            Entry::assistant("Stopped i-1."),
        ]);
        let router = ActionRouter::new(vec![Box::new(FakeAction::new("stop_instance", "stopped"))]);
        let controller = controller_with(provider, router, Arc::clone(&store), 4);

        let reply = controller.handle_inbound("t1", "stop i-1").await.unwrap();
        assert_eq!(reply, "Stopped i-1.");

        let saved = store.load("t1").await.unwrap();
        let result = saved
            .entries()
            .iter()
            .find(|e| e.role == Role::ActionResult)
            .unwrap();
        assert_eq!(result.result_of_call_id.as_deref(), Some("c1"));
        assert_eq!(result.content, "stopped");
        let (orphans, dangling) = saved.pairing_violations();
        assert!(orphans.is_empty());
        assert!(dangling.is_empty());
    }

    #[tokio::test]
    async fn failed_action_becomes_error_result_not_fatal() {
        let store = Arc::new(MemoryCheckpointStore::new());
        let provider = FakeProvider::scripted(vec![
            Entry::assistant("trying").with_action_request("c1", "flaky", json!({})),
            Entry::assistant("That did not work."),
        ]);
        let router = ActionRouter::new(vec![Box::new(FailingAction::new("flaky", "boom"))]);
        let controller = controller_with(provider, router, Arc::clone(&store), 4);

        let reply = controller.handle_inbound("t1", "do it").await.unwrap();
        assert_eq!(reply, "That did not work.");

        let saved = store.load("t1").await.unwrap();
        let result = saved
            .entries()
            .iter()
            .find(|e| e.role == Role::ActionResult)
            .unwrap();
        assert!(result.is_error);
        assert!(result.content.contains("boom"));
    }

    #[tokio::test]
    async fn runaway_loop_returns_fallback_with_consistent_checkpoint() {
        let store = Arc::new(MemoryCheckpointStore::new());
        let provider = Arc::new(FakeProvider::scripted(vec![
            Entry::assistant("again").with_action_request("c1", "list_instances", json!({})),
            Entry::assistant("again").with_action_request("c2", "list_instances", json!({})),
            Entry::assistant("again").with_action_request("c3", "list_instances", json!({})),
        ]));
        let router = ActionRouter::new(vec![Box::new(FakeAction::new("list_instances", "[]"))]);
        let controller = Controller::new(
            Arc::clone(&provider) as Arc<dyn Provider>,
            Arc::new(router),
            Arc::clone(&store) as Arc<dyn CheckpointStore>,
            RetentionPolicy::new(6, 10).unwrap(),
            SystemPrompt::inline("You are an operations assistant."),
            2,
        );

        let reply = controller.handle_inbound("t1", "loop").await.unwrap();
        assert_eq!(reply, FALLBACK_REPLY);
        assert_eq!(store.save_count(), 1);
        // The cap stops the loop before a third decision.
        assert_eq!(provider.call_count(), 2);

        let saved = store.load("t1").await.unwrap();
        let (orphans, dangling) = saved.pairing_violations();
        assert!(orphans.is_empty());
        assert!(dangling.is_empty());
    }

    #[tokio::test]
    async fn orphaned_entry_from_previous_crash_is_reconciled_on_load() {
        let store = Arc::new(MemoryCheckpointStore::new());
        let mut seeded = Transcript::new();
        seeded.push(Entry::human("earlier question"));
        seeded.push(
            Entry::assistant("interrupted").with_action_request("c9", "create_ticket", json!({})),
        );
        store.seed("t1", seeded);

        let controller = controller_with(
            FakeProvider::replying("Back online."),
            ActionRouter::default(),
            Arc::clone(&store),
            4,
        );
        controller.handle_inbound("t1", "hello again").await.unwrap();

        let saved = store.load("t1").await.unwrap();
        assert!(!saved.entries().iter().any(|e| e.content == "interrupted"));
        assert!(saved.entries().iter().any(|e| e.content == "earlier question"));
        let (orphans, dangling) = saved.pairing_violations();
        assert!(orphans.is_empty());
        assert!(dangling.is_empty());
    }

    #[tokio::test]
    async fn long_transcript_is_pruned_before_persist() {
        let store = Arc::new(MemoryCheckpointStore::new());
        let mut seeded = Transcript::new();
        seeded.push(Entry::system("old prompt"));
        for i in 0..14 {
            if i % 2 == 0 {
                seeded.push(Entry::human(format!("h{i}")));
            } else {
                seeded.push(Entry::assistant(format!("a{i}")));
            }
        }
        store.seed("t1", seeded);

        let controller = controller_with(
            FakeProvider::replying("Noted."),
            ActionRouter::default(),
            Arc::clone(&store),
            4,
        );
        controller.handle_inbound("t1", "one more").await.unwrap();

        let saved = store.load("t1").await.unwrap();
        assert!(saved.len() <= 11);
        assert_eq!(saved.entries()[0].role, Role::System);
        assert_eq!(saved.last().unwrap().content, "Noted.");
    }

    #[tokio::test]
    async fn system_prompt_file_is_read_each_cycle() {
        let prompt = SystemPrompt::from_file(PathBuf::from("/nonexistent/prompt.md"), "fallback");
        assert_eq!(prompt.current(), "fallback");
    }
}
