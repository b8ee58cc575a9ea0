//! Orphan reconciliation: restores request/result pairing after an
//! interrupted cycle.
//!
//! A crash between "action requested" and "result appended" leaves an
//! Assistant entry with an unanswered call id. Resuming such an entry is
//! not deterministic, so the whole entry goes, together with the results
//! of any calls it did get answered. The complementary failure, a result
//! with no matching request, is logged and dropped as well.

use std::collections::BTreeSet;

use drover_core::transcript::Transcript;
use drover_core::types::{EntryId, Role};
use tracing::warn;

/// Compute the deletion set that restores pairing. Pure function; the
/// caller applies it in one batch via [`Transcript::delete`].
pub fn orphan_deletions(transcript: &Transcript) -> BTreeSet<EntryId> {
    let owners = transcript.call_owners();
    let (orphaned_calls, dangling_results) = transcript.pairing_violations();

    let mut doomed = BTreeSet::new();

    let mut doomed_owners = BTreeSet::new();
    for call_id in &orphaned_calls {
        if let Some(owner_id) = owners.get(call_id) {
            doomed_owners.insert(*owner_id);
        }
    }
    if !doomed_owners.is_empty() {
        warn!(
            orphaned_calls = orphaned_calls.len(),
            entries = doomed_owners.len(),
            "removing assistant entries with unanswered action requests"
        );
    }

    // A doomed Assistant takes all of its results with it, answered or not.
    let mut doomed_calls = BTreeSet::new();
    for entry in transcript.entries() {
        if entry.role == Role::Assistant && doomed_owners.contains(&entry.id) {
            for request in &entry.action_requests {
                doomed_calls.insert(request.call_id.clone());
            }
        }
    }
    doomed.extend(doomed_owners);
    doomed.extend(transcript.result_entry_ids(&doomed_calls));

    if !dangling_results.is_empty() {
        warn!(
            count = dangling_results.len(),
            "removing action results with no matching request"
        );
        doomed.extend(dangling_results);
    }

    doomed
}
