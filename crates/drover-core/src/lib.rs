//! Core types and trait contracts for Drover.
//!
//! Implementations live in other crates (drover-agent for the decision
//! provider and loop controller, drover-gateway for channels, actions, and
//! the checkpoint store).

pub mod actions;
pub mod fakes;
pub mod traits;
pub mod transcript;
pub mod types;

pub use actions::ActionRouter;
pub use traits::{Action, ActionExecutor, CheckpointStore, Provider};
pub use transcript::Transcript;
pub use types::{ActionOutput, ActionRequest, ActionSpec, Entry, EntryId, Role};
