//! The per-thread conversation transcript.
//!
//! A transcript is an ordered log of [`Entry`] values. All mutation is
//! pure append or pure delete-by-id; the one exception is the reserved
//! System slot at position 0, whose content is refreshed every cycle.
//! Bounding the log is the retention policy's job, not the transcript's.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::types::{Entry, EntryId, Role};

#[derive(Debug, Clone, Default)]
pub struct Transcript {
    entries: Vec<Entry>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: Vec<Entry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&Entry> {
        self.entries.last()
    }

    /// Append entries at the end, preserving arrival order.
    pub fn append(&mut self, entries: impl IntoIterator<Item = Entry>) {
        self.entries.extend(entries);
    }

    pub fn push(&mut self, entry: Entry) {
        self.entries.push(entry);
    }

    /// Refresh the System entry: overwrite its content if position 0 holds
    /// one, otherwise insert a new System entry at position 0. Guarantees
    /// exactly one System entry, always current.
    pub fn replace_or_insert_system(&mut self, content: &str) {
        match self.entries.first_mut() {
            Some(first) if first.role == Role::System => {
                content.clone_into(&mut first.content);
            }
            _ => self.entries.insert(0, Entry::system(content)),
        }
    }

    /// Remove entries whose id is in `ids`, preserving survivor order.
    /// Ids that match nothing are ignored, so a retried deletion of the
    /// same set is a no-op.
    pub fn delete(&mut self, ids: &BTreeSet<EntryId>) {
        if ids.is_empty() {
            return;
        }
        self.entries.retain(|entry| !ids.contains(&entry.id));
    }

    /// Map from every `call_id` found in Assistant entries to the id of
    /// the owning Assistant entry.
    pub fn call_owners(&self) -> BTreeMap<String, EntryId> {
        let mut owners = BTreeMap::new();
        for entry in &self.entries {
            if entry.role == Role::Assistant {
                for request in &entry.action_requests {
                    owners.insert(request.call_id.clone(), entry.id);
                }
            }
        }
        owners
    }

    /// The set of `call_id`s answered by an ActionResult entry.
    pub fn answered_call_ids(&self) -> HashSet<&str> {
        self.entries
            .iter()
            .filter(|entry| entry.role == Role::ActionResult)
            .filter_map(|entry| entry.result_of_call_id.as_deref())
            .collect()
    }

    /// Ids of ActionResult entries answering any call in `call_ids`.
    pub fn result_entry_ids(&self, call_ids: &BTreeSet<String>) -> BTreeSet<EntryId> {
        self.entries
            .iter()
            .filter(|entry| {
                entry
                    .result_of_call_id
                    .as_ref()
                    .is_some_and(|call_id| call_ids.contains(call_id))
            })
            .map(|entry| entry.id)
            .collect()
    }

    /// Call ids requested by Assistant entries but not yet answered.
    pub fn outstanding_call_ids(&self) -> BTreeSet<String> {
        let answered = self.answered_call_ids();
        self.call_owners()
            .into_keys()
            .filter(|call_id| !answered.contains(call_id.as_str()))
            .collect()
    }

    /// Pairing violations: unanswered requests and dangling results.
    /// A valid transcript returns two empty sets.
    pub fn pairing_violations(&self) -> (BTreeSet<String>, BTreeSet<EntryId>) {
        let owners = self.call_owners();
        let orphaned_requests = self.outstanding_call_ids();
        let dangling_results = self
            .entries
            .iter()
            .filter(|entry| entry.role == Role::ActionResult)
            .filter(|entry| {
                entry
                    .result_of_call_id
                    .as_ref()
                    .is_none_or(|call_id| !owners.contains_key(call_id))
            })
            .map(|entry| entry.id)
            .collect();
        (orphaned_requests, dangling_results)
    }
}
