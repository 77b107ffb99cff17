// Remote Storage
// Listing and mutation seams for the remote tree, backed by an external CLI

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, warn};

use super::snapshot::EntryKind;
use crate::core::app_config::compiled;
use crate::error::{RemoteError, ScanWarning};
use crate::utilities::paths::{parent_of, remote_join};

/// One entry reported by the remote provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRecord {
    /// Absolute remote path
    pub path: String,
    pub kind: EntryKind,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub modified: Option<DateTime<Utc>>,
    #[serde(default)]
    pub hash: Option<String>,
}

impl RemoteRecord {
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

/// Every record below a remote root
#[derive(Debug, Clone, Default)]
pub struct RemoteListing {
    pub root: String,
    pub records: Vec<RemoteRecord>,
    /// Sub-directories that could not be listed
    pub warnings: Vec<ScanWarning>,
}

/// Read access to the remote tree
#[async_trait]
pub trait RemoteLister: Send + Sync {
    /// Recursively list everything below `root`
    async fn list(&self, root: &str) -> Result<RemoteListing, RemoteError>;

    /// Current state of a single remote path
    async fn stat(&self, path: &str) -> Result<Option<RemoteRecord>, RemoteError>;
}

/// Write access to the remote tree
#[async_trait]
pub trait RemoteMutator: Send + Sync {
    async fn upload(&self, local: &Path, remote: &str) -> Result<(), RemoteError>;
    async fn download(&self, remote: &str, local: &Path) -> Result<(), RemoteError>;
    async fn delete(&self, remote: &str) -> Result<(), RemoteError>;
    async fn create_dir(&self, remote: &str) -> Result<(), RemoteError>;
}

/// A remote provider offering both listing and mutation
pub trait RemoteStore: RemoteLister + RemoteMutator {}

impl<T: RemoteLister + RemoteMutator + ?Sized> RemoteStore for T {}

// ============================================================================
// External CLI provider
// ============================================================================

/// Argument templates for the external storage tool
///
/// `{remote}` and `{local}` are replaced with the paths of each call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteCommands {
    pub program: String,
    /// Lists one directory level as JSON
    pub list: Vec<String>,
    pub upload: Vec<String>,
    pub download: Vec<String>,
    pub delete: Vec<String>,
    pub mkdir: Vec<String>,
    /// The listing reports each file's source mtime rather than the time
    /// the service stored it. When unset, listed timestamps are dropped and
    /// files compare by size (or hash) alone.
    pub source_mtimes: bool,
}

impl Default for RemoteCommands {
    fn default() -> Self {
        let args = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        Self {
            program: compiled::REMOTE_PROGRAM.to_string(),
            list: args(&["list", "--json", "{remote}"]),
            upload: args(&["upload", "{local}", "{remote}"]),
            download: args(&["download", "{remote}", "{local}"]),
            delete: args(&["delete", "{remote}"]),
            mkdir: args(&["mkdir", "{remote}"]),
            source_mtimes: false,
        }
    }
}

fn render_args(template: &[String], remote: &str, local: Option<&Path>) -> Vec<String> {
    let local = local.map(|p| p.display().to_string()).unwrap_or_default();
    template
        .iter()
        .map(|arg| arg.replace("{remote}", remote).replace("{local}", &local))
        .collect()
}

/// Remote provider that shells out to the external storage tool
#[derive(Debug, Clone)]
pub struct CliRemote {
    commands: RemoteCommands,
}

impl CliRemote {
    pub fn new(commands: RemoteCommands) -> Self {
        Self { commands }
    }

    async fn run(&self, args: Vec<String>) -> Result<Vec<u8>, RemoteError> {
        debug!(program = %self.commands.program, ?args, "running remote command");

        let output = Command::new(&self.commands.program)
            .args(&args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| RemoteError::Spawn {
                program: self.commands.program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(RemoteError::Command {
                program: self.commands.program.clone(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(output.stdout)
    }

    /// List the immediate children of one remote directory
    async fn list_dir(&self, dir: &str) -> Result<Vec<RemoteRecord>, RemoteError> {
        let stdout = self.run(render_args(&self.commands.list, dir, None)).await?;
        let text = String::from_utf8_lossy(&stdout);
        let mut records = parse_listing_output(dir, &text)?;
        if !self.commands.source_mtimes {
            for record in &mut records {
                record.modified = None;
            }
        }
        Ok(records)
    }
}

#[async_trait]
impl RemoteLister for CliRemote {
    async fn list(&self, root: &str) -> Result<RemoteListing, RemoteError> {
        let mut listing = RemoteListing {
            root: root.to_string(),
            ..RemoteListing::default()
        };

        // The root must be listable; sub-directories only produce warnings
        let mut queue: VecDeque<String> = VecDeque::new();
        for record in self.list_dir(root).await? {
            if record.is_dir() {
                queue.push_back(record.path.clone());
            }
            listing.records.push(record);
        }

        let mut visited = BTreeSet::new();
        while let Some(dir) = queue.pop_front() {
            if !visited.insert(dir.clone()) {
                continue;
            }
            match self.list_dir(&dir).await {
                Ok(children) => {
                    for record in children {
                        if record.is_dir() {
                            queue.push_back(record.path.clone());
                        }
                        listing.records.push(record);
                    }
                }
                Err(err) => {
                    warn!(dir = %dir, error = %err, "remote sub-directory could not be listed");
                    listing.warnings.push(ScanWarning::Unlistable {
                        path: dir,
                        reason: err.to_string(),
                    });
                }
            }
        }

        Ok(listing)
    }

    async fn stat(&self, path: &str) -> Result<Option<RemoteRecord>, RemoteError> {
        let trimmed = path.trim_end_matches('/');
        let Some(parent) = parent_of(trimmed) else {
            // the root of the remote namespace always exists
            return Ok(Some(RemoteRecord {
                path: "/".to_string(),
                kind: EntryKind::Directory,
                size: None,
                modified: None,
                hash: None,
            }));
        };
        let parent = if parent.is_empty() { "/" } else { parent };

        let err = match self.list_dir(parent).await {
            Ok(children) => return Ok(children.into_iter().find(|r| r.path == trimmed)),
            Err(RemoteError::NotFound(_)) => return Ok(None),
            Err(err) => err,
        };

        // The tool only reports a failed listing; a missing parent means a missing path
        match self.stat(parent).await {
            Ok(None) => Ok(None),
            Ok(Some(record)) if !record.is_dir() => Ok(None),
            _ => Err(err),
        }
    }
}

#[async_trait]
impl RemoteMutator for CliRemote {
    async fn upload(&self, local: &Path, remote: &str) -> Result<(), RemoteError> {
        self.run(render_args(&self.commands.upload, remote, Some(local))).await?;
        Ok(())
    }

    async fn download(&self, remote: &str, local: &Path) -> Result<(), RemoteError> {
        self.run(render_args(&self.commands.download, remote, Some(local))).await?;
        Ok(())
    }

    async fn delete(&self, remote: &str) -> Result<(), RemoteError> {
        self.run(render_args(&self.commands.delete, remote, None)).await?;
        Ok(())
    }

    async fn create_dir(&self, remote: &str) -> Result<(), RemoteError> {
        self.run(render_args(&self.commands.mkdir, remote, None)).await?;
        Ok(())
    }
}

/// Listing item as printed by the storage tool
#[derive(Debug, Deserialize)]
struct ListingItem {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    path: Option<String>,
    #[serde(default, alias = "isDir", alias = "is_folder")]
    is_dir: Option<bool>,
    #[serde(default, rename = "type")]
    kind: Option<EntryKind>,
    #[serde(default)]
    size: Option<u64>,
    #[serde(default, alias = "mtime", alias = "modified_at")]
    modified: Option<DateTime<Utc>>,
    #[serde(default)]
    hash: Option<String>,
}

/// Parse the JSON printed by the storage tool for one directory
///
/// Accepts a JSON array or one JSON object per line. Items without a `path`
/// are placed under `dir` by `name`; an item describing `dir` itself is
/// dropped.
pub fn parse_listing_output(dir: &str, text: &str) -> Result<Vec<RemoteRecord>, RemoteError> {
    let parse_err = |reason: String| RemoteError::Parse {
        path: dir.to_string(),
        reason,
    };

    let trimmed = text.trim();
    let items: Vec<ListingItem> = if trimmed.is_empty() {
        Vec::new()
    } else if trimmed.starts_with('[') {
        serde_json::from_str(trimmed).map_err(|e| parse_err(e.to_string()))?
    } else {
        trimmed
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str::<ListingItem>(line))
            .collect::<Result<_, _>>()
            .map_err(|e| parse_err(e.to_string()))?
    };

    let dir_clean = dir.trim_end_matches('/');
    let mut records = Vec::with_capacity(items.len());
    for item in items {
        let path = match (item.path, item.name) {
            (Some(path), _) => {
                let path = path.trim_end_matches('/').to_string();
                if path.starts_with('/') { path } else { format!("/{}", path) }
            }
            (None, Some(name)) => remote_join(dir_clean, &name),
            (None, None) => return Err(parse_err("item has neither path nor name".to_string())),
        };
        if path == dir_clean || (dir_clean.is_empty() && path == "/") {
            continue;
        }

        let kind = match (item.kind, item.is_dir) {
            (Some(kind), _) => kind,
            (None, Some(true)) => EntryKind::Directory,
            (None, _) => EntryKind::File,
        };

        records.push(RemoteRecord {
            path,
            kind,
            size: if kind == EntryKind::File { Some(item.size.unwrap_or(0)) } else { None },
            modified: item.modified,
            hash: item.hash,
        });
    }

    Ok(records)
}

// ============================================================================
// In-memory provider
// ============================================================================

#[derive(Debug, Clone)]
struct MemoryNode {
    kind: EntryKind,
    data: Vec<u8>,
    modified: Option<DateTime<Utc>>,
}

/// Remote store kept entirely in memory
///
/// Behaves like a storage service that keeps source timestamps on upload,
/// refuses to create entries under a missing parent, and only deletes empty
/// directories. Paths registered with `fail_on` reject every mutation.
#[derive(Debug, Default)]
pub struct MemoryRemote {
    nodes: Mutex<BTreeMap<String, MemoryNode>>,
    failing: Mutex<BTreeSet<String>>,
}

impl MemoryRemote {
    /// A store containing only the directory `root`
    pub fn new(root: &str) -> Self {
        let store = Self::default();
        store.lock_nodes().insert(
            root.trim_end_matches('/').to_string(),
            MemoryNode {
                kind: EntryKind::Directory,
                data: Vec::new(),
                modified: None,
            },
        );
        store
    }

    fn lock_nodes(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, MemoryNode>> {
        self.nodes.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Add a file directly, creating missing parents
    pub fn put_file(&self, path: &str, data: &[u8], modified: Option<DateTime<Utc>>) {
        let mut nodes = self.lock_nodes();
        let mut current = String::new();
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        for segment in &segments[..segments.len().saturating_sub(1)] {
            current = format!("{}/{}", current, segment);
            nodes.entry(current.clone()).or_insert(MemoryNode {
                kind: EntryKind::Directory,
                data: Vec::new(),
                modified: None,
            });
        }
        nodes.insert(
            path.to_string(),
            MemoryNode {
                kind: EntryKind::File,
                data: data.to_vec(),
                modified,
            },
        );
    }

    /// Make every mutation of `path` fail
    pub fn fail_on(&self, path: &str) {
        self.failing
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(path.to_string());
    }

    pub fn contents(&self, path: &str) -> Option<Vec<u8>> {
        self.lock_nodes().get(path).map(|node| node.data.clone())
    }

    pub fn exists(&self, path: &str) -> bool {
        self.lock_nodes().contains_key(path)
    }

    fn check_failing(&self, path: &str) -> Result<(), RemoteError> {
        let failing = self.failing.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if failing.contains(path) {
            return Err(RemoteError::Other(format!("injected failure for {}", path)));
        }
        Ok(())
    }

    fn check_parent(nodes: &BTreeMap<String, MemoryNode>, path: &str) -> Result<(), RemoteError> {
        match parent_of(path) {
            None | Some("") => Ok(()),
            Some(parent) => match nodes.get(parent) {
                Some(node) if node.kind == EntryKind::Directory => Ok(()),
                _ => Err(RemoteError::NotFound(parent.to_string())),
            },
        }
    }

    fn record(path: &str, node: &MemoryNode) -> RemoteRecord {
        RemoteRecord {
            path: path.to_string(),
            kind: node.kind,
            size: (node.kind == EntryKind::File).then_some(node.data.len() as u64),
            modified: node.modified,
            hash: None,
        }
    }
}

#[async_trait]
impl RemoteLister for MemoryRemote {
    async fn list(&self, root: &str) -> Result<RemoteListing, RemoteError> {
        let root_clean = root.trim_end_matches('/');
        let nodes = self.lock_nodes();
        if !root_clean.is_empty() && !nodes.contains_key(root_clean) {
            return Err(RemoteError::NotFound(root.to_string()));
        }
        let prefix = format!("{}/", root_clean);
        let records = nodes
            .iter()
            .filter(|(path, _)| path.starts_with(&prefix))
            .map(|(path, node)| Self::record(path, node))
            .collect();
        Ok(RemoteListing {
            root: root.to_string(),
            records,
            warnings: Vec::new(),
        })
    }

    async fn stat(&self, path: &str) -> Result<Option<RemoteRecord>, RemoteError> {
        Ok(self.lock_nodes().get(path).map(|node| Self::record(path, node)))
    }
}

#[async_trait]
impl RemoteMutator for MemoryRemote {
    async fn upload(&self, local: &Path, remote: &str) -> Result<(), RemoteError> {
        self.check_failing(remote)?;
        let data = tokio::fs::read(local)
            .await
            .map_err(|e| RemoteError::Other(format!("{}: {}", local.display(), e)))?;
        let modified = tokio::fs::metadata(local)
            .await
            .ok()
            .and_then(|m| m.modified().ok())
            .map(DateTime::<Utc>::from);

        let mut nodes = self.lock_nodes();
        Self::check_parent(&nodes, remote)?;
        if nodes.get(remote).is_some_and(|n| n.kind == EntryKind::Directory) {
            return Err(RemoteError::Other(format!("{} is a directory", remote)));
        }
        nodes.insert(
            remote.to_string(),
            MemoryNode {
                kind: EntryKind::File,
                data,
                modified,
            },
        );
        Ok(())
    }

    async fn download(&self, remote: &str, local: &Path) -> Result<(), RemoteError> {
        self.check_failing(remote)?;
        let data = match self.lock_nodes().get(remote) {
            Some(node) if node.kind == EntryKind::File => node.data.clone(),
            Some(_) => return Err(RemoteError::Other(format!("{} is a directory", remote))),
            None => return Err(RemoteError::NotFound(remote.to_string())),
        };
        let target: PathBuf = local.to_path_buf();
        tokio::fs::write(&target, data)
            .await
            .map_err(|e| RemoteError::Other(format!("{}: {}", target.display(), e)))
    }

    async fn delete(&self, remote: &str) -> Result<(), RemoteError> {
        self.check_failing(remote)?;
        let mut nodes = self.lock_nodes();
        let prefix = format!("{}/", remote);
        if nodes.keys().any(|p| p.starts_with(&prefix)) {
            return Err(RemoteError::Other(format!("{} is not empty", remote)));
        }
        nodes
            .remove(remote)
            .map(|_| ())
            .ok_or_else(|| RemoteError::NotFound(remote.to_string()))
    }

    async fn create_dir(&self, remote: &str) -> Result<(), RemoteError> {
        self.check_failing(remote)?;
        let mut nodes = self.lock_nodes();
        Self::check_parent(&nodes, remote)?;
        if nodes.contains_key(remote) {
            return Err(RemoteError::Other(format!("{} already exists", remote)));
        }
        nodes.insert(
            remote.to_string(),
            MemoryNode {
                kind: EntryKind::Directory,
                data: Vec::new(),
                modified: None,
            },
        );
        Ok(())
    }
}
