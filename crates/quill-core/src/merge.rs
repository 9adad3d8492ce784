//! Conflict-aware keep-both merge of two divergent note collections.
//!
//! Invoked only when local and remote history has genuinely diverged (or
//! the server explicitly flags a conflict). Resolution is last-writer-wins
//! per note id, but a losing edit between two live notes is never
//! silently discarded: it is preserved as a new note whose title records
//! which side it came from. Deletes propagate without copies.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::{Note, UNTITLED};

/// Which side of a sync produced a winning (or losing) note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Local,
    Server,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Local => write!(f, "local"),
            Side::Server => write!(f, "server"),
        }
    }
}

/// One descriptor per note id that diverged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeConflict {
    #[serde(rename = "noteId")]
    pub note_id: Uuid,
    #[serde(rename = "localUpdatedAt")]
    pub local_updated_at: chrono::DateTime<chrono::Utc>,
    #[serde(rename = "serverUpdatedAt")]
    pub server_updated_at: chrono::DateTime<chrono::Utc>,
    pub winner: Side,
    /// Id of the keep-both copy, or `None` if the loser was a tombstone
    #[serde(rename = "conflictCopyId")]
    pub conflict_copy_id: Option<Uuid>,
}

/// Result of a merge: the reconciled collection plus conflict descriptors.
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub merged: Vec<Note>,
    pub conflicts: Vec<MergeConflict>,
}

fn conflict_copy_title(title: &str, origin: Side) -> String {
    let base = title.trim();
    let base = if base.is_empty() { UNTITLED } else { base };
    format!("{} (Conflict copy from {})", base, origin)
}

fn conflict_copy(loser: &Note, origin: Side) -> Note {
    Note {
        id: Uuid::new_v4(),
        title: conflict_copy_title(&loser.title, origin),
        content: loser.content.clone(),
        updated_at: chrono::Utc::now(),
        deleted: false,
    }
}

/// Ordered union of note ids: local ids in their existing order, then
/// remote-only ids in theirs.
fn ordered_union_ids(local: &[Note], server: &[Note]) -> Vec<Uuid> {
    let mut ids = Vec::with_capacity(local.len() + server.len());
    for note in local.iter().chain(server.iter()) {
        if !ids.contains(&note.id) {
            ids.push(note.id);
        }
    }
    ids
}

/// Merge two note collections, keeping both sides of every divergent edit.
///
/// Per id:
/// - present only on one side: kept as-is
/// - identical content and tombstone state: the later `updated_at` wins
///   (tie goes to local)
/// - differing content: last-writer-wins with one [`MergeConflict`]
///   descriptor emitted; the loser is preserved as a fresh-id conflict
///   copy unless either side is a tombstone, in which case the delete
///   propagates without a copy
///
/// The merged collection is sorted by `updated_at` descending.
pub fn merge_notes_keep_both(local: &[Note], server: &[Note]) -> MergeOutcome {
    let mut merged: Vec<Note> = Vec::new();
    let mut conflicts: Vec<MergeConflict> = Vec::new();

    for id in ordered_union_ids(local, server) {
        let local_note = local.iter().find(|note| note.id == id);
        let server_note = server.iter().find(|note| note.id == id);

        let (local_note, server_note) = match (local_note, server_note) {
            (Some(l), Some(s)) => (l, s),
            (Some(only), None) | (None, Some(only)) => {
                merged.push(only.clone());
                continue;
            }
            (None, None) => continue,
        };

        if local_note.content_equals(server_note) {
            // Same content either way; prefer local on timestamp tie.
            if local_note.updated_at >= server_note.updated_at {
                merged.push(local_note.clone());
            } else {
                merged.push(server_note.clone());
            }
            continue;
        }

        let local_wins = local_note.updated_at >= server_note.updated_at;
        let (winner, loser, winner_side, loser_side) = if local_wins {
            (local_note, server_note, Side::Local, Side::Server)
        } else {
            (server_note, local_note, Side::Server, Side::Local)
        };

        merged.push(winner.clone());
        // A tombstone on either side means the edit war already ended in
        // a delete; propagating the delete must not resurrect content.
        let conflict_copy_id = if winner.deleted || loser.deleted {
            None
        } else {
            let copy = conflict_copy(loser, loser_side);
            let copy_id = copy.id;
            merged.push(copy);
            Some(copy_id)
        };

        conflicts.push(MergeConflict {
            note_id: id,
            local_updated_at: local_note.updated_at,
            server_updated_at: server_note.updated_at,
            winner: winner_side,
            conflict_copy_id,
        });
    }

    merged.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    MergeOutcome { merged, conflicts }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn note_at(title: &str, content: &str, seconds_ago: i64) -> Note {
        let mut note = Note::new(title, content);
        note.updated_at = Utc::now() - Duration::seconds(seconds_ago);
        note
    }

    #[test]
    fn test_one_sided_notes_kept() {
        let local_only = note_at("Local only", "l", 10);
        let server_only = note_at("Server only", "s", 5);

        let outcome = merge_notes_keep_both(
            std::slice::from_ref(&local_only),
            std::slice::from_ref(&server_only),
        );

        assert_eq!(outcome.merged.len(), 2);
        assert!(outcome.conflicts.is_empty());
        assert!(outcome.merged.iter().any(|n| n.id == local_only.id));
        assert!(outcome.merged.iter().any(|n| n.id == server_only.id));
    }

    #[test]
    fn test_later_writer_wins_with_conflict_copy() {
        // Merge no-loss: local older, server newer with different content.
        let local = note_at("Shared", "local body", 60);
        let mut server = local.clone();
        server.content = "server body".to_string();
        server.updated_at = Utc::now();

        let outcome =
            merge_notes_keep_both(std::slice::from_ref(&local), std::slice::from_ref(&server));

        assert_eq!(outcome.conflicts.len(), 1);
        let conflict = &outcome.conflicts[0];
        assert_eq!(conflict.note_id, local.id);
        assert_eq!(conflict.winner, Side::Server);

        let winner = outcome.merged.iter().find(|n| n.id == local.id).unwrap();
        assert_eq!(winner.content, "server body");

        let copy_id = conflict.conflict_copy_id.expect("loser must be preserved");
        let copy = outcome.merged.iter().find(|n| n.id == copy_id).unwrap();
        assert_eq!(copy.content, "local body");
        assert_eq!(copy.title, "Shared (Conflict copy from local)");
        assert!(!copy.deleted);
    }

    #[test]
    fn test_timestamp_tie_prefers_local() {
        let local = note_at("Shared", "local body", 30);
        let mut server = local.clone();
        server.content = "server body".to_string();
        server.updated_at = local.updated_at;

        let outcome =
            merge_notes_keep_both(std::slice::from_ref(&local), std::slice::from_ref(&server));

        assert_eq!(outcome.conflicts[0].winner, Side::Local);
        let winner = outcome.merged.iter().find(|n| n.id == local.id).unwrap();
        assert_eq!(winner.content, "local body");
    }

    #[test]
    fn test_tombstone_propagates_without_copy() {
        // Local tombstoned X with a bumped timestamp; remote holds an
        // older live copy. The tombstone wins and no copy is created.
        let mut server = note_at("X", "old body", 120);
        server.deleted = false;
        let mut local = server.clone();
        local.deleted = true;
        local.updated_at = Utc::now();

        let outcome =
            merge_notes_keep_both(std::slice::from_ref(&local), std::slice::from_ref(&server));

        let merged_x = outcome.merged.iter().find(|n| n.id == local.id).unwrap();
        assert!(merged_x.deleted);
        assert_eq!(outcome.conflicts.len(), 1);
        assert!(outcome.conflicts[0].conflict_copy_id.is_none());
        assert_eq!(outcome.merged.len(), 1);
    }

    #[test]
    fn test_tombstoned_loser_produces_no_copy() {
        // Remote tombstoned the note but local edited it afterwards.
        let mut server = note_at("X", "body", 0);
        server.deleted = true;
        server.updated_at = Utc::now() - Duration::seconds(60);
        let mut local = server.clone();
        local.deleted = false;
        local.content = "revived".to_string();
        local.updated_at = Utc::now();

        let outcome =
            merge_notes_keep_both(std::slice::from_ref(&local), std::slice::from_ref(&server));

        assert_eq!(outcome.conflicts.len(), 1);
        assert_eq!(outcome.conflicts[0].winner, Side::Local);
        assert!(outcome.conflicts[0].conflict_copy_id.is_none());
    }

    #[test]
    fn test_identical_notes_merge_to_one() {
        let shared = note_at("Same", "same body", 10);
        let outcome =
            merge_notes_keep_both(std::slice::from_ref(&shared), std::slice::from_ref(&shared));

        assert_eq!(outcome.merged.len(), 1);
        assert!(outcome.conflicts.is_empty());
    }

    #[test]
    fn test_merged_sorted_by_updated_at_descending() {
        let oldest = note_at("Oldest", "a", 300);
        let newest = note_at("Newest", "b", 0);
        let middle = note_at("Middle", "c", 150);

        let outcome = merge_notes_keep_both(&[oldest, newest], &[middle]);

        let timestamps: Vec<_> = outcome.merged.iter().map(|n| n.updated_at).collect();
        let mut sorted = timestamps.clone();
        sorted.sort_by(|a, b| b.cmp(a));
        assert_eq!(timestamps, sorted);
    }

    #[test]
    fn test_untitled_conflict_copy_title() {
        let mut local = note_at("  ", "local body", 0);
        local.title = "  ".to_string();
        let mut server = local.clone();
        server.content = "server body".to_string();
        server.updated_at = Utc::now() + Duration::seconds(5);

        let outcome =
            merge_notes_keep_both(std::slice::from_ref(&local), std::slice::from_ref(&server));

        let copy_id = outcome.conflicts[0].conflict_copy_id.unwrap();
        let copy = outcome.merged.iter().find(|n| n.id == copy_id).unwrap();
        assert_eq!(copy.title, "Untitled (Conflict copy from local)");
    }
}
