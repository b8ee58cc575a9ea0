//! Core trait definitions for Drover.
//!
//! These define the contracts between components. Implementations live in
//! other crates (drover-agent for providers and the loop controller,
//! drover-gateway for actions and the checkpoint store).

use crate::transcript::Transcript;
use crate::types::{ActionOutput, ActionSpec, Entry};
use anyhow::Result;
use async_trait::async_trait;

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

/// The decision step: given the current transcript and the available
/// actions, produce the next Assistant entry.
///
/// The returned entry either carries plain text (a final reply) or one or
/// more action requests, each with a provider-assigned call id.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Provider name (e.g., "anthropic", "openai").
    fn name(&self) -> &str;

    async fn decide(
        &self,
        system: &str,
        transcript: &Transcript,
        actions: &[ActionSpec],
    ) -> Result<Entry>;
}

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

/// A single operational action the agent can take.
#[async_trait]
pub trait Action: Send + Sync {
    /// The action definition (name, description, parameter schema).
    fn definition(&self) -> ActionSpec;

    /// Execute the action with the given arguments.
    async fn execute(&self, arguments: serde_json::Value) -> Result<ActionOutput>;
}

/// Dispatches action requests to the right handler by name.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    /// Invoke an action by name.
    async fn invoke(&self, name: &str, arguments: serde_json::Value) -> Result<ActionOutput>;

    /// List all available action definitions.
    fn catalog(&self) -> Vec<ActionSpec>;
}

// ---------------------------------------------------------------------------
// Checkpoint storage
// ---------------------------------------------------------------------------

/// Storage backend for per-thread transcripts.
///
/// Threads are processed one message at a time, so a cycle holds the only
/// live copy of its transcript between `load` and `save`.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Load the transcript for a thread. Unknown threads yield an empty
    /// transcript.
    async fn load(&self, thread_id: &str) -> Result<Transcript>;

    /// Replace the stored transcript for a thread with `transcript`.
    async fn save(&self, thread_id: &str, transcript: &Transcript) -> Result<()>;

    /// List all known thread ids.
    async fn list(&self) -> Result<Vec<String>>;
}
