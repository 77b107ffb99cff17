// Remote Sync Library
// Compares a local directory with a remote folder and plans a one-way sync

// Core infrastructure - configuration and cycle orchestration
pub mod core;

// Operations - snapshots, diffing, planning and execution
pub mod operations;

// Utilities - path and pattern helpers
pub mod utilities;

// Error types shared across modules
pub mod error;

// Tracing subscriber setup
pub mod logging;

// Re-export commonly used items for convenience
pub use crate::core::{AppConfig, CycleReport, Preview, ProjectConfig, SyncEvent, SyncSession};
pub use error::{ActionError, CycleError, RemoteError, ScanError};
pub use operations::{
    Action, ActionExecutor, CancelSignal, ChangeKind, ChangeSet, CliRemote, ConfirmationGate,
    DiffEngine, Entry, EntryKind, ExecutionReport, MemoryRemote, Outcome, Snapshot, SyncDirection,
    SyncPlan, SyncPlanner,
};
