//! The decision loop: retention policy, orphan reconciliation, and the
//! controller that runs one inbound message through decide/act/prune.

pub mod anthropic_provider;
pub mod controller;
pub mod reconcile;
pub mod retention;

pub use anthropic_provider::AnthropicProvider;
pub use controller::{Controller, SystemPrompt};
pub use retention::RetentionPolicy;
