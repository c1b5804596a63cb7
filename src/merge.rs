//! Merge of the four partitions into the single view shown to callers.
//!
//! Pure functions only; all I/O lives in [`crate::engine`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::task::{Origin, Task, TaskId, TaskPatch};

/// Field patches for remote tasks, keyed by remote id.
pub type ModificationMap = BTreeMap<u64, TaskPatch>;

/// Remote ids that must never appear in the merged view.
///
/// Kept as an insertion-ordered list so the persisted form stays stable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tombstones(Vec<u64>);

impl Tombstones {
    pub fn contains(&self, id: u64) -> bool {
        self.0.contains(&id)
    }

    /// Returns `false` if the id was already present.
    pub fn insert(&mut self, id: u64) -> bool {
        if self.contains(id) {
            return false;
        }
        self.0.push(id);
        true
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn ids(&self) -> &[u64] {
        &self.0
    }
}

impl FromIterator<u64> for Tombstones {
    fn from_iter<I: IntoIterator<Item = u64>>(iter: I) -> Self {
        let mut set = Tombstones::default();
        for id in iter {
            set.insert(id);
        }
        set
    }
}

/// Raw partition contents, as read from storage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Partitions {
    pub remote: Vec<Task>,
    pub local: Vec<Task>,
    pub modifications: ModificationMap,
    pub tombstones: Tombstones,
}

/// Build the merged view.
///
/// Remote entries come first in cache order, minus tombstoned ids, each
/// overlaid with its patch. Local entries follow in creation order. Nothing
/// is re-sorted.
pub fn merge_view(partitions: &Partitions) -> Vec<Task> {
    let remote = partitions.remote.iter().filter_map(|task| {
        let remote_id = task.id.as_remote()?;
        if partitions.tombstones.contains(remote_id) {
            return None;
        }
        let mut merged = task.clone().with_origin(Origin::Remote);
        if let Some(patch) = partitions.modifications.get(&remote_id) {
            merged.apply(patch);
        }
        Some(merged)
    });

    let local = partitions
        .local
        .iter()
        .filter(|task| task.id.is_local())
        .map(|task| task.clone().with_origin(Origin::Local));

    remote.chain(local).collect()
}

/// Compute the task returned by an update of a remote id.
///
/// Layers, lowest priority first: a synthesized default, the cached record
/// if there is one, then the accumulated patch. Title, completion and owner
/// tag are always populated.
pub fn layer_remote(
    remote_id: u64,
    cached: Option<&Task>,
    patch: &TaskPatch,
    default_owner_tag: i64,
) -> Task {
    let mut task = Task::synthesized(TaskId::Remote(remote_id), default_owner_tag);
    if let Some(cached) = cached {
        task.title = cached.title.clone();
        task.completed = cached.completed;
        if cached.owner_tag.is_some() {
            task.owner_tag = cached.owner_tag;
        }
        task.due_date = cached.due_date;
    }
    task.apply(patch);
    task.with_origin(Origin::Remote)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{LocalIdMinter, DEFAULT_OWNER_TAG};

    fn remote(id: u64, title: &str) -> Task {
        Task {
            id: TaskId::Remote(id),
            title: title.to_string(),
            completed: false,
            owner_tag: Some(10),
            due_date: None,
            origin: Origin::Remote,
        }
    }

    fn local(minter: &LocalIdMinter, title: &str) -> Task {
        Task {
            id: minter.mint().expect("mint"),
            title: title.to_string(),
            completed: false,
            owner_tag: Some(DEFAULT_OWNER_TAG),
            due_date: None,
            origin: Origin::Remote,
        }
    }

    #[test]
    fn remote_before_local_in_source_order() {
        let minter = LocalIdMinter::new();
        let partitions = Partitions {
            remote: vec![remote(3, "c"), remote(1, "a")],
            local: vec![local(&minter, "x"), local(&minter, "y")],
            ..Partitions::default()
        };

        let titles: Vec<_> = merge_view(&partitions)
            .into_iter()
            .map(|task| (task.title, task.origin))
            .collect();
        assert_eq!(
            titles,
            vec![
                ("c".to_string(), Origin::Remote),
                ("a".to_string(), Origin::Remote),
                ("x".to_string(), Origin::Local),
                ("y".to_string(), Origin::Local),
            ]
        );
    }

    #[test]
    fn tombstones_dominate_modifications() {
        let mut partitions = Partitions {
            remote: vec![remote(1, "a"), remote(2, "b")],
            ..Partitions::default()
        };
        partitions.tombstones.insert(1);
        partitions.modifications.insert(1, TaskPatch::title("revived"));

        let view = merge_view(&partitions);
        assert_eq!(view.len(), 1);
        assert_eq!(view[0].id, TaskId::Remote(2));
    }

    #[test]
    fn modifications_overlay_cache() {
        let mut partitions = Partitions {
            remote: vec![remote(1, "a")],
            ..Partitions::default()
        };
        partitions.modifications.insert(1, TaskPatch::completed(true));

        let view = merge_view(&partitions);
        assert!(view[0].completed);
        assert_eq!(view[0].title, "a");
        assert!(!partitions.remote[0].completed);
    }

    #[test]
    fn modification_without_cache_entry_is_not_listed() {
        let mut partitions = Partitions::default();
        partitions.modifications.insert(99, TaskPatch::title("ghost"));
        assert!(merge_view(&partitions).is_empty());
    }

    #[test]
    fn layer_remote_synthesizes_missing_fields() {
        let task = layer_remote(5, None, &TaskPatch::completed(true), DEFAULT_OWNER_TAG);
        assert_eq!(task.id, TaskId::Remote(5));
        assert_eq!(task.title, "");
        assert!(task.completed);
        assert_eq!(task.owner_tag, Some(DEFAULT_OWNER_TAG));
    }

    #[test]
    fn layer_remote_prefers_patch_over_cache() {
        let cached = remote(5, "cached");
        let task = layer_remote(5, Some(&cached), &TaskPatch::title("patched"), DEFAULT_OWNER_TAG);
        assert_eq!(task.title, "patched");
        assert_eq!(task.owner_tag, Some(10));
    }

    #[test]
    fn tombstone_insert_is_idempotent() {
        let mut tombstones = Tombstones::default();
        assert!(tombstones.insert(4));
        assert!(!tombstones.insert(4));
        assert_eq!(tombstones.ids(), &[4]);

        let json = serde_json::to_string(&tombstones).expect("serialize");
        assert_eq!(json, "[4]");
    }
}
