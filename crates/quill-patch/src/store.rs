//! Per-stream holding area for proposed diffs.

use std::collections::HashMap;

use quill_protocol::{DiffProposal, StreamMachine};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::DiffStoreError;
use crate::patch::Patch;

/// Where a diff is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffStatus {
    Proposed,
    Applied,
    Discarded,
}

/// Result of applying a held diff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedDiff {
    pub id: String,
    pub file_path: String,
    pub content: String,
}

/// Diffs proposed by one stream, keyed by id, in proposal order.
///
/// Created with the stream and dropped with it; nothing is shared between
/// streams.
#[derive(Debug, Clone, Default)]
pub struct DiffStore {
    proposed: Vec<DiffProposal>,
    resolved: HashMap<String, DiffStatus>,
}

impl DiffStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold every diff a stream has proposed so far.
    pub fn from_stream(stream: &StreamMachine) -> Self {
        Self {
            proposed: stream.diffs().to_vec(),
            resolved: HashMap::new(),
        }
    }

    pub fn propose(&mut self, diff: DiffProposal) -> Result<(), DiffStoreError> {
        if self.status(&diff.id).is_some() {
            return Err(DiffStoreError::Duplicate(diff.id));
        }
        debug!(diff_id = %diff.id, file_path = %diff.file_path, "diff proposed");
        self.proposed.push(diff);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&DiffProposal> {
        self.proposed.iter().find(|diff| diff.id == id)
    }

    pub fn status(&self, id: &str) -> Option<DiffStatus> {
        if self.get(id).is_some() {
            return Some(DiffStatus::Proposed);
        }
        self.resolved.get(id).copied()
    }

    /// Diffs still awaiting a decision, in proposal order.
    pub fn pending(&self) -> &[DiffProposal] {
        &self.proposed
    }

    pub fn len(&self) -> usize {
        self.proposed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proposed.is_empty()
    }

    /// Apply the diff `id` to `current`, the present content of its file.
    ///
    /// On success the diff leaves the held set. On a malformed patch or a
    /// conflict it stays proposed and `current` is untouched.
    pub fn apply(&mut self, id: &str, current: &str) -> Result<AppliedDiff, DiffStoreError> {
        let idx = self.position(id)?;
        let content = Patch::parse(&self.proposed[idx].patch)?.apply(current)?;

        let diff = self.proposed.remove(idx);
        self.resolved.insert(diff.id.clone(), DiffStatus::Applied);
        info!(diff_id = %diff.id, file_path = %diff.file_path, "diff applied");

        Ok(AppliedDiff {
            id: diff.id,
            file_path: diff.file_path,
            content,
        })
    }

    /// Drop the diff `id` without applying it.
    pub fn discard(&mut self, id: &str) -> Result<DiffProposal, DiffStoreError> {
        let idx = self.position(id)?;
        let diff = self.proposed.remove(idx);
        self.resolved.insert(diff.id.clone(), DiffStatus::Discarded);
        info!(diff_id = %diff.id, file_path = %diff.file_path, "diff discarded");
        Ok(diff)
    }

    /// Discard everything still held, e.g. when the stream was cancelled.
    pub fn discard_all(&mut self) -> Vec<DiffProposal> {
        let drained: Vec<DiffProposal> = self.proposed.drain(..).collect();
        for diff in &drained {
            self.resolved.insert(diff.id.clone(), DiffStatus::Discarded);
        }
        if !drained.is_empty() {
            info!(count = drained.len(), "discarded all pending diffs");
        }
        drained
    }

    fn position(&self, id: &str) -> Result<usize, DiffStoreError> {
        self.proposed
            .iter()
            .position(|diff| diff.id == id)
            .ok_or_else(|| DiffStoreError::NotFound(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PatchError;
    use crate::patch::create_patch;
    use quill_protocol::StreamResponse;

    const FILE: &str = "alpha\nbeta\ngamma\n";

    fn proposal(id: &str) -> DiffProposal {
        DiffProposal::new(id, "notes.txt", "@@ -2 +2 @@\n-beta\n+BETA\n")
    }

    #[test]
    fn test_apply_removes_from_held_set() {
        let mut store = DiffStore::new();
        store.propose(proposal("d1")).unwrap();

        let applied = store.apply("d1", FILE).unwrap();
        assert_eq!(applied.content, "alpha\nBETA\ngamma\n");
        assert_eq!(applied.file_path, "notes.txt");
        assert!(store.is_empty());
        assert_eq!(store.status("d1"), Some(DiffStatus::Applied));

        assert_eq!(
            store.apply("d1", FILE).unwrap_err(),
            DiffStoreError::NotFound("d1".to_string())
        );
    }

    #[test]
    fn test_conflict_keeps_diff_and_content() {
        let mut store = DiffStore::new();
        store.propose(proposal("d1")).unwrap();

        let current = "alpha\nbeta changed\ngamma\n".to_string();
        let err = store.apply("d1", &current).unwrap_err();
        assert!(matches!(err, DiffStoreError::Patch(PatchError::Conflict { .. })));
        assert_eq!(current, "alpha\nbeta changed\ngamma\n");
        assert_eq!(store.status("d1"), Some(DiffStatus::Proposed));
    }

    #[test]
    fn test_discard_twice() {
        let mut store = DiffStore::new();
        store.propose(proposal("d1")).unwrap();

        assert_eq!(store.discard("d1").unwrap().id, "d1");
        assert_eq!(
            store.discard("d1").unwrap_err(),
            DiffStoreError::NotFound("d1".to_string())
        );
        assert_eq!(store.status("d1"), Some(DiffStatus::Discarded));
    }

    #[test]
    fn test_unknown_id() {
        let mut store = DiffStore::new();
        assert!(matches!(store.apply("nope", FILE), Err(DiffStoreError::NotFound(_))));
        assert!(matches!(store.discard("nope"), Err(DiffStoreError::NotFound(_))));
        assert_eq!(store.status("nope"), None);
    }

    #[test]
    fn test_duplicate_proposal() {
        let mut store = DiffStore::new();
        store.propose(proposal("d1")).unwrap();
        store.discard("d1").unwrap();
        assert_eq!(
            store.propose(proposal("d1")).unwrap_err(),
            DiffStoreError::Duplicate("d1".to_string())
        );
    }

    #[test]
    fn test_seeded_from_stream() {
        let modified = "alpha\nbeta\ngamma\ndelta\n";
        let stream = StreamMachine::replay([
            StreamResponse::token("Adding delta."),
            StreamResponse::diff(DiffProposal::new(
                "d1",
                "notes.txt",
                create_patch("notes.txt", FILE, modified),
            )),
            StreamResponse::diff(proposal("d2")),
            StreamResponse::done(),
        ])
        .unwrap();

        let mut store = DiffStore::from_stream(&stream);
        let ids: Vec<&str> = store.pending().iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, ["d1", "d2"]);

        assert_eq!(store.apply("d1", FILE).unwrap().content, modified);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_cancelled_stream_diffs_are_discardable() {
        let mut stream = StreamMachine::new();
        stream.accept(StreamResponse::diff(proposal("d1"))).unwrap();
        stream.accept(StreamResponse::diff(proposal("d2"))).unwrap();
        assert!(stream.cancel());

        let mut store = DiffStore::from_stream(&stream);
        let dropped = store.discard_all();
        assert_eq!(dropped.len(), 2);
        assert!(store.is_empty());
        assert_eq!(store.status("d2"), Some(DiffStatus::Discarded));
    }
}
