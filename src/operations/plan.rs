// Sync Planner
// Turns a change set, a direction and confirmed deletions into an ordered plan

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::diff::{ChangeKind, ChangeSet};
use super::snapshot::{Entry, Side};
use crate::error::ConfigError;
use crate::utilities::paths::{ancestors, is_descendant};

/// Which tree is the source of truth for a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncDirection {
    LocalToRemote,
    RemoteToLocal,
}

impl SyncDirection {
    pub fn source(&self) -> Side {
        match self {
            SyncDirection::LocalToRemote => Side::Local,
            SyncDirection::RemoteToLocal => Side::Remote,
        }
    }

    pub fn destination(&self) -> Side {
        match self {
            SyncDirection::LocalToRemote => Side::Remote,
            SyncDirection::RemoteToLocal => Side::Local,
        }
    }
}

impl FromStr for SyncDirection {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "local-to-remote" | "push" | "upload" => Ok(SyncDirection::LocalToRemote),
            "remote-to-local" | "pull" | "download" => Ok(SyncDirection::RemoteToLocal),
            _ => Err(ConfigError::UnknownDirection(s.to_string())),
        }
    }
}

impl fmt::Display for SyncDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncDirection::LocalToRemote => write!(f, "local-to-remote"),
            SyncDirection::RemoteToLocal => write!(f, "remote-to-local"),
        }
    }
}

/// What the target of an action is expected to look like right before it runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreState {
    /// Nothing exists at the target path
    Absent,
    /// The target still matches this snapshot entry
    Matches(Entry),
}

/// A single step of a sync plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Copy a local file to the remote tree
    Upload { entry: Entry, expected: PreState },
    /// Copy a remote file into the local tree
    Download { entry: Entry, expected: PreState },
    /// Remove an entry from the side it was scanned on
    Delete { entry: Entry },
    CreateRemoteDir { entry: Entry, expected: PreState },
    CreateLocalDir { entry: Entry, expected: PreState },
}

impl Action {
    /// Relative path the action operates on
    pub fn path(&self) -> &str {
        &self.entry().path
    }

    /// The entry needed to perform the action
    ///
    /// For transfers and directory creation this is the source entry, for
    /// deletions it is the entry being removed.
    pub fn entry(&self) -> &Entry {
        match self {
            Action::Upload { entry, .. }
            | Action::Download { entry, .. }
            | Action::Delete { entry }
            | Action::CreateRemoteDir { entry, .. }
            | Action::CreateLocalDir { entry, .. } => entry,
        }
    }

    /// The recorded state of the target, `None` when it should be absent
    pub fn expected_target(&self) -> Option<&Entry> {
        match self {
            Action::Delete { entry } => Some(entry),
            Action::Upload { expected, .. }
            | Action::Download { expected, .. }
            | Action::CreateRemoteDir { expected, .. }
            | Action::CreateLocalDir { expected, .. } => match expected {
                PreState::Absent => None,
                PreState::Matches(entry) => Some(entry),
            },
        }
    }

    /// Side of the sync the action modifies
    pub fn target_side(&self) -> Side {
        match self {
            Action::Upload { .. } | Action::CreateRemoteDir { .. } => Side::Remote,
            Action::Download { .. } | Action::CreateLocalDir { .. } => Side::Local,
            Action::Delete { entry } => entry.side(),
        }
    }

    /// Whether the action removes or overwrites existing data
    pub fn is_destructive(&self) -> bool {
        matches!(self, Action::Delete { .. }) || self.expected_target().is_some()
    }

    pub fn is_dir_creation(&self) -> bool {
        matches!(self, Action::CreateRemoteDir { .. } | Action::CreateLocalDir { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            Action::Upload { .. } => "upload",
            Action::Download { .. } => "download",
            Action::Delete { .. } => "delete",
            Action::CreateRemoteDir { .. } => "mkdir-remote",
            Action::CreateLocalDir { .. } => "mkdir-local",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Delete { entry } => write!(f, "delete {} {}", entry.side(), entry.path),
            _ => write!(f, "{} {}", self.label(), self.path()),
        }
    }
}

/// Ordered, confirmation-gated list of actions for one cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncPlan {
    pub direction: SyncDirection,
    /// Actions in execution order
    pub actions: Vec<Action>,
    /// Deletions left out because they were not confirmed
    pub pending: Vec<String>,
    /// Paths held back because an ancestor replacement awaits confirmation
    pub deferred: Vec<String>,
}

impl SyncPlan {
    pub fn empty(direction: SyncDirection) -> Self {
        Self {
            direction,
            actions: Vec::new(),
            pending: Vec::new(),
            deferred: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Action> {
        self.actions.iter()
    }
}

/// Builds sync plans from change sets
///
/// The change set must come from `diff(destination, source)`: New and
/// Modified entries are what the source has, Deleted entries are what only
/// the destination has.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncPlanner;

impl SyncPlanner {
    pub fn new() -> Self {
        Self
    }

    /// Paths that would be removed from the destination, in path order
    ///
    /// This is the list a confirmation gate is asked to approve.
    pub fn pending_deletions(&self, changes: &ChangeSet) -> Vec<String> {
        changes
            .iter()
            .filter(|c| c.kind == ChangeKind::Deleted || c.is_replacement())
            .map(|c| c.path.clone())
            .collect()
    }

    /// Build the ordered plan
    ///
    /// Deletions come first, descendants before their ancestors. Directory
    /// creations and transfers follow in path order, so parents precede
    /// children. A directory is only deleted when every deleted path below
    /// it is confirmed too.
    pub fn plan(
        &self,
        changes: &ChangeSet,
        direction: SyncDirection,
        confirmations: &BTreeSet<String>,
    ) -> SyncPlan {
        let candidates = self.pending_deletions(changes);

        let mut unapproved: BTreeSet<String> = BTreeSet::new();
        let mut approved: Vec<&str> = Vec::new();
        for path in candidates.iter().rev() {
            let descendant_blocked = unapproved
                .range(format!("{}/", path)..)
                .next()
                .is_some_and(|d| is_descendant(d, path));
            if confirmations.contains(path) && !descendant_blocked {
                approved.push(path.as_str());
            } else {
                unapproved.insert(path.clone());
            }
        }

        let mut actions = Vec::with_capacity(changes.len());

        // approved is already in reverse path order
        for path in approved {
            if let Some(target) = changes.get(path).and_then(|c| c.old.clone()) {
                actions.push(Action::Delete { entry: target });
            }
        }

        let withheld: BTreeSet<&str> = unapproved
            .iter()
            .map(String::as_str)
            .filter(|p| changes.get(p).is_some_and(|c| c.is_replacement()))
            .collect();

        let mut deferred = Vec::new();
        for change in changes.iter() {
            if !matches!(change.kind, ChangeKind::New | ChangeKind::Modified) {
                continue;
            }
            if withheld.contains(change.path.as_str()) {
                continue;
            }
            if ancestors(&change.path).any(|a| withheld.contains(a)) {
                deferred.push(change.path.clone());
                continue;
            }
            let Some(source) = change.new.clone() else {
                continue;
            };

            let expected = match &change.old {
                Some(old) if !change.is_replacement() => PreState::Matches(old.clone()),
                _ => PreState::Absent,
            };

            let action = match (direction, source.is_dir()) {
                (SyncDirection::LocalToRemote, true) => Action::CreateRemoteDir {
                    entry: source,
                    expected,
                },
                (SyncDirection::LocalToRemote, false) => Action::Upload {
                    entry: source,
                    expected,
                },
                (SyncDirection::RemoteToLocal, true) => Action::CreateLocalDir {
                    entry: source,
                    expected,
                },
                (SyncDirection::RemoteToLocal, false) => Action::Download {
                    entry: source,
                    expected,
                },
            };
            actions.push(action);
        }

        let pending: Vec<String> = unapproved.into_iter().collect();

        debug!(
            direction = %direction,
            actions = actions.len(),
            pending = pending.len(),
            deferred = deferred.len(),
            "plan built"
        );

        SyncPlan {
            direction,
            actions,
            pending,
            deferred,
        }
    }
}
