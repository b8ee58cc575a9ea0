//! Retention policy: bounds transcript length while keeping request/result
//! pairs intact.
//!
//! The policy is a pure function from transcript to deletion set. It never
//! mutates the transcript; the caller applies the set through
//! [`Transcript::delete`] in one batch, so an interrupted prune can only
//! retry the whole batch, never half of a pair.

use std::collections::BTreeSet;

use anyhow::{Result, bail};
use drover_core::transcript::Transcript;
use drover_core::types::{EntryId, Role};

#[derive(Debug, Clone, Copy)]
pub struct RetentionPolicy {
    min_to_keep: usize,
    max_before_trigger: usize,
}

impl RetentionPolicy {
    /// Thresholds are validated here, once, at startup. A floor above the
    /// ceiling can never produce a sane window.
    pub fn new(min_to_keep: usize, max_before_trigger: usize) -> Result<Self> {
        if min_to_keep > max_before_trigger {
            bail!(
                "retention misconfigured: min_to_keep ({min_to_keep}) exceeds \
                 max_before_trigger ({max_before_trigger})"
            );
        }
        Ok(Self {
            min_to_keep,
            max_before_trigger,
        })
    }

    pub fn min_to_keep(&self) -> usize {
        self.min_to_keep
    }

    pub fn max_before_trigger(&self) -> usize {
        self.max_before_trigger
    }

    /// Compute the set of entry ids to drop.
    ///
    /// The ceiling check counts every entry. Deletion candidates are the
    /// Human and Assistant entries in the oldest-`excess` window, skipping
    /// a System entry at position 0. ActionResults are never candidates on
    /// their own; they join the set only through a deleted Assistant's
    /// call ids, wherever in the transcript they sit.
    pub fn deletions(&self, transcript: &Transcript) -> BTreeSet<EntryId> {
        let len = transcript.len();
        if len <= self.max_before_trigger {
            return BTreeSet::new();
        }

        let excess = len - self.min_to_keep;
        let entries = transcript.entries();
        let start = usize::from(entries.first().is_some_and(|e| e.role == Role::System));

        let mut doomed = BTreeSet::new();
        let mut doomed_calls = BTreeSet::new();
        for entry in entries.iter().take(excess).skip(start) {
            match entry.role {
                Role::Human => {
                    doomed.insert(entry.id);
                }
                Role::Assistant => {
                    doomed.insert(entry.id);
                    for request in &entry.action_requests {
                        doomed_calls.insert(request.call_id.clone());
                    }
                }
                Role::System | Role::ActionResult => {}
            }
        }

        doomed.extend(transcript.result_entry_ids(&doomed_calls));
        doomed
    }
}
