// Action Executor
// Applies a sync plan one action at a time and records every outcome

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use filetime::FileTime;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::diff::DiffEngine;
use super::plan::{Action, SyncPlan};
use super::remote::RemoteStore;
use super::snapshot::{Entry, Side};
use crate::core::app_config::AppConfig;
use crate::error::{ActionError, DriftError};
use crate::utilities::paths::{is_descendant, local_join, remote_join};

/// Options for executing a plan
#[derive(Debug, Clone)]
pub struct ExecutorOptions {
    /// Re-read each target and refuse to act if it changed since the scan
    pub verify_drift: bool,
    /// Upper bound for a single action
    pub action_timeout: Option<Duration>,
    /// Set downloaded files' mtime to the remote timestamp
    pub preserve_mtime: bool,
    /// Dry run - check every action but don't modify anything
    pub dry_run: bool,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        let config = AppConfig::default();
        Self {
            verify_drift: config.defaults.verify_drift,
            action_timeout: config.action_timeout(),
            preserve_mtime: true,
            dry_run: false,
        }
    }
}

/// How a single action ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Skipped(String),
    Failed(String),
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Success => write!(f, "ok"),
            Outcome::Skipped(reason) => write!(f, "skipped: {}", reason),
            Outcome::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// An action paired with its outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionResult {
    pub action: Action,
    pub outcome: Outcome,
}

/// Audit record of one plan execution
#[derive(Debug, Clone, Default)]
pub struct ExecutionReport {
    /// One result per attempted action, in plan order
    pub results: Vec<ActionResult>,
    /// Execution stopped early on a cancellation signal
    pub cancelled: bool,
}

impl ExecutionReport {
    pub fn succeeded(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Success))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Skipped(_)))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Failed(_)))
    }

    /// Failure messages prefixed with their action
    pub fn errors(&self) -> Vec<String> {
        self.results
            .iter()
            .filter_map(|r| match &r.outcome {
                Outcome::Failed(reason) => Some(format!("{}: {}", r.action, reason)),
                _ => None,
            })
            .collect()
    }

    fn count(&self, pred: impl Fn(&Outcome) -> bool) -> usize {
        self.results.iter().filter(|r| pred(&r.outcome)).count()
    }
}

/// Caller-side cancellation for a running batch
#[derive(Debug, Clone)]
pub struct CancelSignal {
    sender: Arc<watch::Sender<bool>>,
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelSignal {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }

    /// Resolves once `cancel` has been called
    pub async fn cancelled(&self) {
        let mut receiver = self.sender.subscribe();
        let _ = receiver.wait_for(|cancelled| *cancelled).await;
    }
}

/// Applies plans against the local filesystem and a remote store
pub struct ActionExecutor {
    local_root: PathBuf,
    remote_root: String,
    store: Arc<dyn RemoteStore>,
    engine: DiffEngine,
    options: ExecutorOptions,
}

impl ActionExecutor {
    pub fn new(
        local_root: impl Into<PathBuf>,
        remote_root: impl Into<String>,
        store: Arc<dyn RemoteStore>,
        engine: DiffEngine,
        options: ExecutorOptions,
    ) -> Self {
        Self {
            local_root: local_root.into(),
            remote_root: remote_root.into(),
            store,
            engine,
            options,
        }
    }

    /// Execute every action in plan order
    ///
    /// A failed action is recorded and the batch continues. Cancellation stops
    /// issuing actions; an action interrupted mid-flight is recorded as failed.
    pub async fn execute(&self, plan: &SyncPlan, cancel: &CancelSignal) -> ExecutionReport {
        self.execute_with(plan, cancel, |_| {}).await
    }

    /// Like `execute`, calling `on_result` as soon as each action finishes
    pub async fn execute_with<F>(
        &self,
        plan: &SyncPlan,
        cancel: &CancelSignal,
        mut on_result: F,
    ) -> ExecutionReport
    where
        F: FnMut(&ActionResult),
    {
        let mut report = ExecutionReport::default();
        let mut broken_dirs: Vec<&str> = Vec::new();
        // directories a dry run would have created; nothing below them exists yet
        let mut planned_dirs: Vec<&str> = Vec::new();

        for action in &plan.actions {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            let broken_parent = broken_dirs.iter().find(|d| is_descendant(action.path(), d));
            let inherited = broken_parent.is_some();
            let under_planned = planned_dirs.iter().any(|d| is_descendant(action.path(), d));
            let outcome = match broken_parent {
                Some(dir) => Outcome::Skipped(format!("parent directory {} was not created", dir)),
                None => {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            report.cancelled = true;
                            Outcome::Failed("cancelled".to_string())
                        }
                        outcome = self.run(action, under_planned) => outcome,
                    }
                }
            };

            // existing directories and dry runs leave the subtree workable
            if action.is_dir_creation() && (inherited || matches!(outcome, Outcome::Failed(_))) {
                broken_dirs.push(action.path());
            }
            if action.is_dir_creation() && outcome == Outcome::Skipped(DRY_RUN.to_string()) {
                planned_dirs.push(action.path());
            }

            match &outcome {
                Outcome::Success => info!(action = %action, "done"),
                Outcome::Skipped(reason) => info!(action = %action, reason = %reason, "skipped"),
                Outcome::Failed(reason) => warn!(action = %action, reason = %reason, "failed"),
            }

            let result = ActionResult {
                action: action.clone(),
                outcome,
            };
            on_result(&result);
            report.results.push(result);

            if report.cancelled {
                break;
            }
        }

        info!(
            succeeded = report.succeeded(),
            skipped = report.skipped(),
            failed = report.failed(),
            cancelled = report.cancelled,
            "plan executed"
        );
        report
    }

    async fn run(&self, action: &Action, under_planned: bool) -> Outcome {
        let result = match self.options.action_timeout {
            Some(limit) => {
                match tokio::time::timeout(limit, self.perform(action, under_planned)).await {
                    Ok(result) => result,
                    Err(_) => Err(ActionError::Timeout(limit)),
                }
            }
            None => self.perform(action, under_planned).await,
        };

        match result {
            Ok(outcome) => outcome,
            Err(err) => Outcome::Failed(err.to_string()),
        }
    }

    /// `under_planned` marks actions below a directory the dry run only
    /// pretended to create; their targets cannot exist, so there is nothing
    /// to check.
    async fn perform(&self, action: &Action, under_planned: bool) -> Result<Outcome, ActionError> {
        if self.options.verify_drift && !under_planned {
            if let Some(outcome) = self.check_drift(action).await? {
                return Ok(outcome);
            }
        }

        if self.options.dry_run {
            return Ok(Outcome::Skipped(DRY_RUN.to_string()));
        }

        let path = action.path();
        let local = local_join(&self.local_root, path);
        let remote = remote_join(&self.remote_root, path);
        debug!(action = %action, local = %local.display(), remote = %remote, "performing");

        match action {
            Action::Upload { .. } => self.store.upload(&local, &remote).await?,
            Action::Download { entry, .. } => {
                self.store.download(&remote, &local).await?;
                if self.options.preserve_mtime {
                    if let Some(at) = entry.modified_at {
                        set_mtime(&local, at)?;
                    }
                }
            }
            Action::Delete { entry } => match entry.side() {
                Side::Remote => self.store.delete(&remote).await?,
                Side::Local => {
                    let removed = if entry.is_dir() {
                        tokio::fs::remove_dir(&local).await
                    } else {
                        tokio::fs::remove_file(&local).await
                    };
                    removed.map_err(|e| ActionError::io(&local, e))?;
                }
            },
            Action::CreateRemoteDir { .. } => self.store.create_dir(&remote).await?,
            Action::CreateLocalDir { .. } => tokio::fs::create_dir(&local)
                .await
                .map_err(|e| ActionError::io(&local, e))?,
        }

        Ok(Outcome::Success)
    }

    /// Compare the target's current state with the recorded pre-state
    ///
    /// Returns an outcome when the action has nothing left to do.
    async fn check_drift(&self, action: &Action) -> Result<Option<Outcome>, ActionError> {
        let path = action.path();
        let current = self.current_state(action.target_side(), path).await?;
        let expected = action.expected_target();

        match (action, expected, current) {
            (Action::Delete { .. }, Some(_), None) => {
                Ok(Some(Outcome::Skipped("already absent".to_string())))
            }
            (
                Action::CreateRemoteDir { .. } | Action::CreateLocalDir { .. },
                None,
                Some(found),
            ) if found.is_dir() => Ok(Some(Outcome::Skipped(ALREADY_EXISTS.to_string()))),
            (_, None, None) => Ok(None),
            (_, Some(wanted), Some(found)) if self.engine.same_state(wanted, &found) => Ok(None),
            (_, wanted, found) => Err(DriftError {
                path: path.to_string(),
                expected: wanted.map_or_else(|| "nothing".to_string(), Entry::describe),
                found: found.map_or_else(|| "nothing".to_string(), |e| e.describe()),
            }
            .into()),
        }
    }

    async fn current_state(&self, side: Side, path: &str) -> Result<Option<Entry>, ActionError> {
        match side {
            Side::Remote => {
                let remote = remote_join(&self.remote_root, path);
                let record = self.store.stat(&remote).await?;
                Ok(record.map(|r| {
                    if r.is_dir() {
                        Entry::directory(path, true)
                    } else {
                        Entry {
                            path: path.to_string(),
                            kind: r.kind,
                            size: Some(r.size.unwrap_or(0)),
                            modified_at: r.modified,
                            is_remote: true,
                            content_hash: r.hash,
                        }
                    }
                }))
            }
            Side::Local => {
                let local = local_join(&self.local_root, path);
                match tokio::fs::symlink_metadata(&local).await {
                    Ok(meta) if meta.is_dir() => Ok(Some(Entry::directory(path, false))),
                    Ok(meta) => {
                        let modified = meta.modified().ok().map(DateTime::<Utc>::from);
                        Ok(Some(Entry::file(path, meta.len(), modified, false)))
                    }
                    Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
                    Err(e) => Err(ActionError::io(local, e)),
                }
            }
        }
    }
}

const ALREADY_EXISTS: &str = "directory already exists";
const DRY_RUN: &str = "dry run";

fn set_mtime(path: &Path, at: DateTime<Utc>) -> Result<(), ActionError> {
    let time = FileTime::from_unix_time(at.timestamp(), at.timestamp_subsec_nanos());
    filetime::set_file_mtime(path, time).map_err(|e| ActionError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RemoteError;
    use crate::operations::plan::{PreState, SyncDirection};
    use crate::operations::remote::{
        MemoryRemote, RemoteListing, RemoteLister, RemoteMutator, RemoteRecord,
    };
    use crate::utilities::paths::parent_of;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::fs;
    use tempfile::TempDir;

    /// Answers `stat` by listing the parent, which fails when the parent is missing
    struct ParentListing(MemoryRemote);

    #[async_trait]
    impl RemoteLister for ParentListing {
        async fn list(&self, root: &str) -> Result<RemoteListing, RemoteError> {
            self.0.list(root).await
        }

        async fn stat(&self, path: &str) -> Result<Option<RemoteRecord>, RemoteError> {
            match parent_of(path) {
                Some(parent) if !parent.is_empty() && !self.0.exists(parent) => {
                    Err(RemoteError::Other(format!("no such folder {}", parent)))
                }
                _ => self.0.stat(path).await,
            }
        }
    }

    #[async_trait]
    impl RemoteMutator for ParentListing {
        async fn upload(&self, local: &Path, remote: &str) -> Result<(), RemoteError> {
            self.0.upload(local, remote).await
        }

        async fn download(&self, remote: &str, local: &Path) -> Result<(), RemoteError> {
            self.0.download(remote, local).await
        }

        async fn delete(&self, remote: &str) -> Result<(), RemoteError> {
            self.0.delete(remote).await
        }

        async fn create_dir(&self, remote: &str) -> Result<(), RemoteError> {
            self.0.create_dir(remote).await
        }
    }

    fn plan(direction: SyncDirection, actions: Vec<Action>) -> SyncPlan {
        SyncPlan {
            direction,
            actions,
            pending: Vec::new(),
            deferred: Vec::new(),
        }
    }

    fn executor(local: &Path, store: Arc<MemoryRemote>) -> ActionExecutor {
        ActionExecutor::new(
            local,
            "/r",
            store,
            DiffEngine::default(),
            ExecutorOptions::default(),
        )
    }

    fn local_file(dir: &Path, path: &str, data: &[u8]) -> Entry {
        fs::write(local_join(dir, path), data).unwrap();
        Entry::file(path, data.len() as u64, None, false)
    }

    #[tokio::test]
    async fn test_failures_do_not_abort_the_batch() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryRemote::new("/r"));
        store.fail_on("/r/bad.txt");

        let bad = local_file(dir.path(), "bad.txt", b"x");
        let good = local_file(dir.path(), "good.txt", b"yy");
        let plan = plan(
            SyncDirection::LocalToRemote,
            vec![
                Action::Upload { entry: bad, expected: PreState::Absent },
                Action::Upload { entry: good, expected: PreState::Absent },
            ],
        );

        let report = executor(dir.path(), store.clone()).execute(&plan, &CancelSignal::new()).await;

        assert_eq!(report.results.len(), 2);
        assert!(matches!(report.results[0].outcome, Outcome::Failed(_)));
        assert_eq!(report.results[1].outcome, Outcome::Success);
        assert_eq!(store.contents("/r/good.txt"), Some(b"yy".to_vec()));
        assert_eq!(report.errors().len(), 1);
    }

    #[tokio::test]
    async fn test_children_of_failed_directory_are_skipped() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("d")).unwrap();
        let store = Arc::new(MemoryRemote::new("/r"));
        store.fail_on("/r/d");

        let inner = local_file(dir.path(), "d/f.txt", b"1");
        let plan = plan(
            SyncDirection::LocalToRemote,
            vec![
                Action::CreateRemoteDir {
                    entry: Entry::directory("d", false),
                    expected: PreState::Absent,
                },
                Action::Upload { entry: inner, expected: PreState::Absent },
            ],
        );

        let report = executor(dir.path(), store).execute(&plan, &CancelSignal::new()).await;
        assert!(matches!(report.results[0].outcome, Outcome::Failed(_)));
        assert_eq!(
            report.results[1].outcome,
            Outcome::Skipped("parent directory d was not created".to_string())
        );
    }

    #[tokio::test]
    async fn test_drift_is_detected_before_overwriting() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryRemote::new("/r"));
        store.put_file("/r/a.txt", b"changed remotely", None);

        let source = local_file(dir.path(), "a.txt", b"new");
        let recorded = Entry::file("a.txt", 3, None, true);
        let plan = plan(
            SyncDirection::LocalToRemote,
            vec![Action::Upload { entry: source, expected: PreState::Matches(recorded) }],
        );

        let report = executor(dir.path(), store.clone()).execute(&plan, &CancelSignal::new()).await;
        let Outcome::Failed(reason) = &report.results[0].outcome else {
            panic!("expected drift failure, got {:?}", report.results[0].outcome);
        };
        assert!(reason.contains("changed since it was scanned"));
        assert_eq!(store.contents("/r/a.txt"), Some(b"changed remotely".to_vec()));
    }

    #[tokio::test]
    async fn test_delete_of_missing_target_is_skipped() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryRemote::new("/r"));
        let plan = plan(
            SyncDirection::LocalToRemote,
            vec![Action::Delete { entry: Entry::file("gone.txt", 1, None, true) }],
        );

        let report = executor(dir.path(), store).execute(&plan, &CancelSignal::new()).await;
        assert_eq!(report.results[0].outcome, Outcome::Skipped("already absent".to_string()));
    }

    #[tokio::test]
    async fn test_download_sets_local_mtime() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryRemote::new("/r"));
        let stamp = Utc.timestamp_opt(1_600_000_000, 0).unwrap();
        store.put_file("/r/photo.jpg", b"jpeg", Some(stamp));

        let plan = plan(
            SyncDirection::RemoteToLocal,
            vec![Action::Download {
                entry: Entry::file("photo.jpg", 4, Some(stamp), true),
                expected: PreState::Absent,
            }],
        );

        let report = executor(dir.path(), store).execute(&plan, &CancelSignal::new()).await;
        assert_eq!(report.results[0].outcome, Outcome::Success);

        let local = dir.path().join("photo.jpg");
        assert_eq!(fs::read(&local).unwrap(), b"jpeg");
        let modified = DateTime::<Utc>::from(fs::metadata(&local).unwrap().modified().unwrap());
        assert_eq!(modified.timestamp(), 1_600_000_000);
    }

    #[tokio::test]
    async fn test_local_deletes_and_directory_creation() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("old")).unwrap();
        let old_file = local_file(dir.path(), "old/f.txt", b"abc");
        let store = Arc::new(MemoryRemote::new("/r"));

        let plan = plan(
            SyncDirection::RemoteToLocal,
            vec![
                Action::Delete { entry: old_file },
                Action::Delete { entry: Entry::directory("old", false) },
                Action::CreateLocalDir {
                    entry: Entry::directory("new", true),
                    expected: PreState::Absent,
                },
            ],
        );

        let report = executor(dir.path(), store).execute(&plan, &CancelSignal::new()).await;
        assert_eq!(report.succeeded(), 3);
        assert!(!dir.path().join("old").exists());
        assert!(dir.path().join("new").is_dir());
    }

    #[tokio::test]
    async fn test_cancelled_signal_stops_before_next_action() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryRemote::new("/r"));
        let entry = local_file(dir.path(), "a.txt", b"a");
        let plan = plan(
            SyncDirection::LocalToRemote,
            vec![Action::Upload { entry, expected: PreState::Absent }],
        );

        let cancel = CancelSignal::new();
        cancel.cancel();
        let report = executor(dir.path(), store.clone()).execute(&plan, &cancel).await;
        assert!(report.cancelled);
        assert!(report.results.is_empty());
        assert!(!store.exists("/r/a.txt"));
    }

    #[tokio::test]
    async fn test_dry_run_changes_nothing() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryRemote::new("/r"));
        let entry = local_file(dir.path(), "a.txt", b"a");
        let plan = plan(
            SyncDirection::LocalToRemote,
            vec![Action::Upload { entry, expected: PreState::Absent }],
        );

        let options = ExecutorOptions { dry_run: true, ..ExecutorOptions::default() };
        let executor = ActionExecutor::new(dir.path(), "/r", store.clone(), DiffEngine::default(), options);
        let report = executor.execute(&plan, &CancelSignal::new()).await;
        assert_eq!(report.results[0].outcome, Outcome::Skipped("dry run".to_string()));
        assert!(!store.exists("/r/a.txt"));
    }

    #[tokio::test]
    async fn test_dry_run_below_new_directory_skips_drift_check() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("d/e")).unwrap();
        let inner = local_file(dir.path(), "d/e/f.txt", b"1");
        let store = Arc::new(ParentListing(MemoryRemote::new("/r")));

        let plan = plan(
            SyncDirection::LocalToRemote,
            vec![
                Action::CreateRemoteDir {
                    entry: Entry::directory("d", false),
                    expected: PreState::Absent,
                },
                Action::CreateRemoteDir {
                    entry: Entry::directory("d/e", false),
                    expected: PreState::Absent,
                },
                Action::Upload { entry: inner, expected: PreState::Absent },
            ],
        );

        let options = ExecutorOptions { dry_run: true, ..ExecutorOptions::default() };
        let executor = ActionExecutor::new(dir.path(), "/r", store.clone(), DiffEngine::default(), options);
        let report = executor.execute(&plan, &CancelSignal::new()).await;

        assert_eq!(report.failed(), 0, "{:?}", report.errors());
        assert!(report
            .results
            .iter()
            .all(|r| r.outcome == Outcome::Skipped("dry run".to_string())));
        assert!(!store.0.exists("/r/d"));
    }
}
