//! Fake implementations for testing.
#![allow(clippy::unwrap_used)]

use crate::traits::{Action, CheckpointStore, Provider};
use crate::transcript::Transcript;
use crate::types::{ActionOutput, ActionSpec, Entry};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

// ---------------------------------------------------------------------------
// FakeProvider
// ---------------------------------------------------------------------------

/// Fake provider that replays a scripted sequence of decisions.
#[derive(Debug)]
pub struct FakeProvider {
    decisions: Mutex<Vec<Entry>>,
    pub calls: Mutex<usize>,
}

impl FakeProvider {
    /// Decisions are returned in the order given, one per `decide` call.
    pub fn scripted(decisions: Vec<Entry>) -> Self {
        Self {
            decisions: Mutex::new(decisions),
            calls: Mutex::new(0),
        }
    }

    /// A provider that replies with a single plain-text entry.
    pub fn replying(text: impl Into<String>) -> Self {
        Self::scripted(vec![Entry::assistant(text)])
    }

    pub fn call_count(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl Provider for FakeProvider {
    fn name(&self) -> &str {
        "fake"
    }

    async fn decide(
        &self,
        _system: &str,
        _transcript: &Transcript,
        _actions: &[ActionSpec],
    ) -> Result<Entry> {
        *self.calls.lock().unwrap() += 1;
        let mut decisions = self.decisions.lock().unwrap();
        if decisions.is_empty() {
            anyhow::bail!("no scripted decisions left");
        }
        Ok(decisions.remove(0))
    }
}

// ---------------------------------------------------------------------------
// FakeAction / FailingAction
// ---------------------------------------------------------------------------

/// Fake action returning a canned output.
#[derive(Debug)]
pub struct FakeAction {
    spec: ActionSpec,
    output: Mutex<ActionOutput>,
}

impl FakeAction {
    pub fn new(name: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            spec: ActionSpec::new(name, "A fake action", serde_json::json!({"type": "object"})),
            output: Mutex::new(ActionOutput::success(output)),
        }
    }
}

#[async_trait]
impl Action for FakeAction {
    fn definition(&self) -> ActionSpec {
        self.spec.clone()
    }

    async fn execute(&self, _arguments: serde_json::Value) -> Result<ActionOutput> {
        Ok(self.output.lock().unwrap().clone())
    }
}

/// Action whose execution always fails at the transport level.
#[derive(Debug)]
pub struct FailingAction {
    spec: ActionSpec,
    message: String,
}

impl FailingAction {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            spec: ActionSpec::new(name, "A failing action", serde_json::json!({"type": "object"})),
            message: message.into(),
        }
    }
}

#[async_trait]
impl Action for FailingAction {
    fn definition(&self) -> ActionSpec {
        self.spec.clone()
    }

    async fn execute(&self, _arguments: serde_json::Value) -> Result<ActionOutput> {
        anyhow::bail!("{}", self.message)
    }
}

// ---------------------------------------------------------------------------
// MemoryCheckpointStore
// ---------------------------------------------------------------------------

/// In-memory checkpoint store for testing. Counts saves so tests can
/// assert that a cycle persists exactly once.
#[derive(Debug)]
pub struct MemoryCheckpointStore {
    store: Mutex<HashMap<String, Transcript>>,
    saves: Mutex<usize>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self {
            store: Mutex::new(HashMap::new()),
            saves: Mutex::new(0),
        }
    }

    pub fn save_count(&self) -> usize {
        *self.saves.lock().unwrap()
    }

    /// Seed a transcript without counting it as a save.
    pub fn seed(&self, thread_id: impl Into<String>, transcript: Transcript) {
        self.store.lock().unwrap().insert(thread_id.into(), transcript);
    }
}

impl Default for MemoryCheckpointStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn load(&self, thread_id: &str) -> Result<Transcript> {
        let store = self.store.lock().unwrap();
        Ok(store.get(thread_id).cloned().unwrap_or_default())
    }

    async fn save(&self, thread_id: &str, transcript: &Transcript) -> Result<()> {
        *self.saves.lock().unwrap() += 1;
        self.store
            .lock()
            .unwrap()
            .insert(thread_id.to_owned(), transcript.clone());
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>> {
        Ok(self.store.lock().unwrap().keys().cloned().collect())
    }
}
