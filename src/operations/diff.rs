// Diff Engine
// Classifies every path of two snapshots as new, modified, deleted or unchanged

use std::collections::BTreeMap;
use std::time::Duration;

use tracing::debug;

use super::snapshot::{Entry, EntryKind, Snapshot};

/// Classification of a single path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    /// Path exists only in the new snapshot
    New,
    /// Path exists in both but the entries diverge
    Modified,
    /// Path exists only in the old snapshot
    Deleted,
    /// Path exists in both and the entries are equivalent
    Unchanged,
}

/// One classified path with the entries needed to act on it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub path: String,
    pub kind: ChangeKind,
    /// Entry in the old snapshot (absent for New)
    pub old: Option<Entry>,
    /// Entry in the new snapshot (absent for Deleted)
    pub new: Option<Entry>,
}

impl Change {
    /// A modification where a file replaced a directory or vice versa
    pub fn is_replacement(&self) -> bool {
        match (&self.old, &self.new) {
            (Some(old), Some(new)) => old.kind != new.kind,
            _ => false,
        }
    }
}

/// Per-path classification of two snapshots, in lexicographic path order
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    changes: BTreeMap<String, Change>,
}

/// Number of paths in each class
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChangeSummary {
    pub new: usize,
    pub modified: usize,
    pub deleted: usize,
    pub unchanged: usize,
}

impl ChangeSet {
    pub fn get(&self, path: &str) -> Option<&Change> {
        self.changes.get(path)
    }

    pub fn kind_of(&self, path: &str) -> Option<ChangeKind> {
        self.changes.get(path).map(|c| c.kind)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Change> {
        self.changes.values()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Whether every path is unchanged
    pub fn is_clean(&self) -> bool {
        self.changes.values().all(|c| c.kind == ChangeKind::Unchanged)
    }

    pub fn summary(&self) -> ChangeSummary {
        let mut summary = ChangeSummary::default();
        for change in self.changes.values() {
            match change.kind {
                ChangeKind::New => summary.new += 1,
                ChangeKind::Modified => summary.modified += 1,
                ChangeKind::Deleted => summary.deleted += 1,
                ChangeKind::Unchanged => summary.unchanged += 1,
            }
        }
        summary
    }
}

/// Engine for comparing snapshots
#[derive(Debug, Clone)]
pub struct DiffEngine {
    /// Maximum whole-second distance between timestamps still considered equal
    tolerance: Duration,
    /// Let matching content hashes decide when both sides carry one
    compare_hashes: bool,
}

impl Default for DiffEngine {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

impl DiffEngine {
    /// Create a diff engine with the given timestamp tolerance
    pub fn new(tolerance: Duration) -> Self {
        Self {
            tolerance,
            compare_hashes: false,
        }
    }

    pub fn with_hashes(mut self, compare_hashes: bool) -> Self {
        self.compare_hashes = compare_hashes;
        self
    }

    pub fn tolerance(&self) -> Duration {
        self.tolerance
    }

    /// Classify the union of both snapshots' paths
    pub fn diff(&self, old: &Snapshot, new: &Snapshot) -> ChangeSet {
        let mut changes = BTreeMap::new();

        for entry in old.iter() {
            let change = match new.get(&entry.path) {
                None => Change {
                    path: entry.path.clone(),
                    kind: ChangeKind::Deleted,
                    old: Some(entry.clone()),
                    new: None,
                },
                Some(other) => {
                    let kind = if self.same_state(entry, other) {
                        ChangeKind::Unchanged
                    } else {
                        ChangeKind::Modified
                    };
                    Change {
                        path: entry.path.clone(),
                        kind,
                        old: Some(entry.clone()),
                        new: Some(other.clone()),
                    }
                }
            };
            changes.insert(change.path.clone(), change);
        }

        for entry in new.iter().filter(|e| !old.contains(&e.path)) {
            changes.insert(
                entry.path.clone(),
                Change {
                    path: entry.path.clone(),
                    kind: ChangeKind::New,
                    old: None,
                    new: Some(entry.clone()),
                },
            );
        }

        let set = ChangeSet { changes };
        debug!(summary = ?set.summary(), "diff computed");
        set
    }

    /// Whether two entries for the same path describe equivalent content
    ///
    /// Directories are never modified. Files compare by hash when enabled and
    /// both hashes are known, otherwise by size and then by timestamp within
    /// the tolerance. A missing timestamp on either side leaves the size as
    /// the only signal.
    pub fn same_state(&self, a: &Entry, b: &Entry) -> bool {
        match (a.kind, b.kind) {
            (EntryKind::Directory, EntryKind::Directory) => true,
            (EntryKind::File, EntryKind::File) => {
                if self.compare_hashes {
                    if let (Some(x), Some(y)) = (&a.content_hash, &b.content_hash) {
                        return x.eq_ignore_ascii_case(y);
                    }
                }
                if a.size != b.size {
                    return false;
                }
                match (a.modified_at, b.modified_at) {
                    (Some(x), Some(y)) => {
                        let distance = (x.timestamp() - y.timestamp()).unsigned_abs();
                        distance <= self.tolerance.as_secs()
                    }
                    _ => true,
                }
            }
            _ => false,
        }
    }
}
