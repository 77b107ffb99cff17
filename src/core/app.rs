// Sync Session
// Runs one scan -> diff -> confirm -> plan -> execute cycle at a time

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use super::events::{CycleState, EventSink, SyncEvent};
use super::{AppConfig, ProjectConfig};
use crate::error::{ConfigError, CycleError, ScanError};
use crate::operations::confirm::ConfirmationGate;
use crate::operations::diff::{ChangeSet, DiffEngine};
use crate::operations::executor::{ActionExecutor, CancelSignal, ExecutionReport, ExecutorOptions};
use crate::operations::plan::{SyncDirection, SyncPlan, SyncPlanner};
use crate::operations::remote::RemoteStore;
use crate::operations::snapshot::{RootSource, ScanOptions, Side, Snapshot};

/// Outcome of a completed cycle
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub direction: SyncDirection,
    pub changes: ChangeSet,
    /// Deletions the gate approved
    pub approved: BTreeSet<String>,
    pub plan: SyncPlan,
    pub execution: ExecutionReport,
    /// One of the scans skipped entries
    pub partial: bool,
}

impl CycleReport {
    /// Every action succeeded or was skipped, and the batch ran to the end
    pub fn is_success(&self) -> bool {
        !self.execution.cancelled && self.execution.failed() == 0
    }
}

/// Scan, diff and plan without asking for confirmation or executing
#[derive(Debug, Clone)]
pub struct Preview {
    pub direction: SyncDirection,
    pub local: Snapshot,
    pub remote: Snapshot,
    pub changes: ChangeSet,
    /// Plan with no deletions approved; deletions show up as pending
    pub plan: SyncPlan,
}

/// A local root paired with a remote root and the store that serves it
pub struct SyncSession {
    local_root: PathBuf,
    remote_root: String,
    store: Arc<dyn RemoteStore>,
    scan: ScanOptions,
    engine: DiffEngine,
    planner: SyncPlanner,
    options: ExecutorOptions,
    events: EventSink,
    state: Mutex<CycleState>,
    busy: AtomicBool,
}

/// Releases the session when a cycle ends, however it ends
struct CycleGuard<'a> {
    session: &'a SyncSession,
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.session.set_state(CycleState::Idle);
        self.session.busy.store(false, Ordering::Release);
    }
}

impl SyncSession {
    /// Create a session with the compiled defaults
    pub fn new(
        local_root: impl Into<PathBuf>,
        remote_root: impl Into<String>,
        store: Arc<dyn RemoteStore>,
    ) -> Self {
        let app = AppConfig::default();
        let defaults = ProjectConfig::default();
        Self {
            local_root: local_root.into(),
            remote_root: remote_root.into(),
            store,
            scan: defaults.scan_options(&app),
            engine: defaults.diff_engine(&app),
            planner: SyncPlanner::new(),
            options: ExecutorOptions::default(),
            events: EventSink::none(),
            state: Mutex::new(CycleState::Idle),
            busy: AtomicBool::new(false),
        }
    }

    /// Create a session from loaded configuration
    pub fn from_config(
        project: &ProjectConfig,
        app: &AppConfig,
        store: Arc<dyn RemoteStore>,
    ) -> Result<Self, ConfigError> {
        let local_root = project.local_root()?.to_path_buf();
        let remote_root = project.remote_root()?.to_string();
        Ok(Self::new(local_root, remote_root, store)
            .with_scan_options(project.scan_options(app))
            .with_diff_engine(project.diff_engine(app))
            .with_executor_options(project.executor_options(app)))
    }

    pub fn with_scan_options(mut self, scan: ScanOptions) -> Self {
        self.scan = scan;
        self
    }

    pub fn with_diff_engine(mut self, engine: DiffEngine) -> Self {
        self.engine = engine;
        self
    }

    pub fn with_executor_options(mut self, options: ExecutorOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    pub fn local_root(&self) -> &Path {
        &self.local_root
    }

    pub fn remote_root(&self) -> &str {
        &self.remote_root
    }

    pub fn state(&self) -> CycleState {
        *self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_state(&self, next: CycleState) {
        let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if *state != next {
            *state = next;
            drop(state);
            self.events.emit(SyncEvent::State(next));
        }
    }

    fn begin(&self) -> Result<CycleGuard<'_>, CycleError> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(CycleError::Busy);
        }
        Ok(CycleGuard { session: self })
    }

    /// Run a full cycle in the given direction
    ///
    /// The gate is consulted only when the change set would delete something
    /// on the destination. Scan failures end the cycle before any action runs.
    pub async fn run_cycle<G>(
        &self,
        direction: SyncDirection,
        gate: &G,
        cancel: &CancelSignal,
    ) -> Result<CycleReport, CycleError>
    where
        G: ConfirmationGate + ?Sized,
    {
        let _guard = self.begin()?;
        info!(
            %direction,
            local = %self.local_root.display(),
            remote = %self.remote_root,
            "starting sync cycle"
        );

        let (local, remote) = self.scan_both().await?;
        let changes = self.compare(direction, &local, &remote);

        let pending = self.planner.pending_deletions(&changes);
        let approved = if pending.is_empty() {
            BTreeSet::new()
        } else {
            self.set_state(CycleState::AwaitingConfirmation);
            let approved = gate.approve(&pending);
            info!(pending = pending.len(), approved = approved.len(), "deletions reviewed");
            approved
        };

        self.set_state(CycleState::Planning);
        let plan = self.planner.plan(&changes, direction, &approved);
        if plan.has_pending() {
            info!(pending = plan.pending.len(), deferred = plan.deferred.len(), "some changes left pending");
        }

        self.set_state(CycleState::Executing);
        let executor = ActionExecutor::new(
            self.local_root.clone(),
            self.remote_root.clone(),
            Arc::clone(&self.store),
            self.engine.clone(),
            self.options.clone(),
        );
        let events = self.events.clone();
        let execution = executor
            .execute_with(&plan, cancel, |result| {
                events.emit(SyncEvent::ActionFinished(result.clone()))
            })
            .await;

        info!(
            succeeded = execution.succeeded(),
            failed = execution.failed(),
            skipped = execution.skipped(),
            "sync cycle finished"
        );

        Ok(CycleReport {
            direction,
            changes,
            approved,
            plan,
            execution,
            partial: local.is_partial() || remote.is_partial(),
        })
    }

    /// Scan both sides, diff and plan without approving or executing anything
    pub async fn preview(&self, direction: SyncDirection) -> Result<Preview, CycleError> {
        let _guard = self.begin()?;
        let (local, remote) = self.scan_both().await?;
        let changes = self.compare(direction, &local, &remote);

        self.set_state(CycleState::Planning);
        let plan = self.planner.plan(&changes, direction, &BTreeSet::new());

        Ok(Preview {
            direction,
            local,
            remote,
            changes,
            plan,
        })
    }

    /// Local walk on the blocking pool while the remote listing is fetched
    async fn scan_both(&self) -> Result<(Snapshot, Snapshot), CycleError> {
        self.set_state(CycleState::Scanning);

        let root = self.local_root.clone();
        let options = self.scan.clone();
        let local = async move {
            tokio::task::spawn_blocking(move || Snapshot::build(RootSource::Local(root), &options))
                .await
                .map_err(|e| CycleError::Join(e.to_string()))
                .and_then(|scanned| scanned.map_err(CycleError::from))
        };

        let remote = async {
            match self.store.list(&self.remote_root).await {
                Ok(listing) => {
                    Snapshot::build(RootSource::Remote(listing), &self.scan).map_err(CycleError::from)
                }
                Err(e) => Err(CycleError::Scan(ScanError::Remote(e))),
            }
        };

        let (local, remote) = match tokio::try_join!(local, remote) {
            Ok(snapshots) => snapshots,
            Err(e) => {
                warn!(error = %e, "scan failed, cycle aborted");
                return Err(e);
            }
        };

        for snapshot in [&local, &remote] {
            for warning in snapshot.warnings() {
                self.events.emit(SyncEvent::ScanWarning {
                    side: snapshot.side(),
                    warning: warning.clone(),
                });
            }
        }

        info!(local = local.len(), remote = remote.len(), "scanned both trees");
        Ok((local, remote))
    }

    /// Diff with the destination as the old side and the source as the new one
    fn compare(&self, direction: SyncDirection, local: &Snapshot, remote: &Snapshot) -> ChangeSet {
        self.set_state(CycleState::Diffing);
        let changes = match direction.source() {
            Side::Local => self.engine.diff(remote, local),
            Side::Remote => self.engine.diff(local, remote),
        };
        self.events.emit(SyncEvent::Changes(changes.summary()));
        changes
    }
}
