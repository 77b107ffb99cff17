// Error Types
// Error taxonomy for scanning, diffing, planning and executing a sync cycle

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// The root of a tree could not be scanned; aborts the whole cycle
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("scan root does not exist: {0}")]
    RootNotFound(String),

    #[error("scan root is not a directory: {0}")]
    NotADirectory(String),

    #[error("scan root {root} could not be listed: {reason}")]
    Unreadable { root: String, reason: String },

    #[error("remote listing failed: {0}")]
    Remote(#[from] RemoteError),
}

/// A single entry that was skipped during a scan
///
/// Warnings never abort a scan; they mark the resulting snapshot as partial.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScanWarning {
    #[error("{path}: could not be read: {reason}")]
    Unreadable { path: String, reason: String },

    #[error("{path}: invalid path: {reason}")]
    InvalidPath { path: String, reason: PathError },

    #[error("{path}: listed more than once, keeping the first record")]
    Duplicate { path: String },

    #[error("{path}: sub-directory could not be listed: {reason}")]
    Unlistable { path: String, reason: String },
}

/// Relative path normalization failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("path is empty")]
    Empty,

    #[error("path escapes the sync root")]
    EscapesRoot,

    #[error("path is not under remote root {0}")]
    OutsideRoot(String),

    #[error("path is not valid UTF-8")]
    NotUtf8,

    #[error("an ancestor is listed as a file")]
    ParentIsFile,
}

/// The target of an action no longer matches the snapshot it was planned from
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{path} changed since it was scanned: expected {expected}, found {found}")]
pub struct DriftError {
    pub path: String,
    pub expected: String,
    pub found: String,
}

/// Failures reported by the external remote storage tool
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {status}: {stderr}")]
    Command {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("could not parse listing for {path}: {reason}")]
    Parse { path: String, reason: String },

    #[error("remote path not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Other(String),
}

/// Failure performing a single action
#[derive(Debug, Error)]
pub enum ActionError {
    #[error(transparent)]
    Drift(#[from] DriftError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

impl ActionError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Failures that end a sync cycle before any action is taken
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("a sync cycle is already running")]
    Busy,

    #[error("scan failed: {0}")]
    Scan(#[from] ScanError),

    #[error("scan task failed: {0}")]
    Join(String),
}

/// Invalid runtime configuration values
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("unknown sync direction '{0}' (expected local-to-remote or remote-to-local)")]
    UnknownDirection(String),

    #[error("no {0} root configured")]
    MissingRoot(&'static str),
}
