// Operations module
// Business logic for scanning, diffing, planning and executing a sync

pub mod snapshot;
pub mod diff;
pub mod plan;
pub mod confirm;
pub mod remote;
pub mod executor;

pub use snapshot::{Entry, EntryKind, RootSource, ScanOptions, Side, Snapshot};
pub use diff::{Change, ChangeKind, ChangeSet, ChangeSummary, DiffEngine};
pub use plan::{Action, PreState, SyncDirection, SyncPlan, SyncPlanner};
pub use confirm::{ConfirmationGate, DenyAll, PreApproved};
pub use remote::{
    CliRemote, MemoryRemote, RemoteCommands, RemoteListing, RemoteLister, RemoteMutator,
    RemoteRecord, RemoteStore,
};
pub use executor::{
    ActionExecutor, ActionResult, CancelSignal, ExecutionReport, ExecutorOptions, Outcome,
};
