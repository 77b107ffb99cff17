// Snapshot Builder
// Normalized, point-in-time views of the local and remote trees

use std::collections::btree_map::{self, BTreeMap};
use std::fmt;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};
use walkdir::WalkDir;

use super::remote::RemoteListing;
use crate::error::{PathError, ScanError, ScanWarning};
use crate::utilities::paths::{ancestors, relative_from_local, relative_from_remote};
use crate::utilities::PatternMatcher;

/// Whether an entry is a file or a directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    #[serde(alias = "dir", alias = "folder")]
    Directory,
}

/// Which tree a snapshot (or entry) describes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Local,
    Remote,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Local => write!(f, "local"),
            Side::Remote => write!(f, "remote"),
        }
    }
}

/// One file or directory in a snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Canonical relative path (slash-separated, no trailing slash)
    pub path: String,
    pub kind: EntryKind,
    /// Size in bytes, files only
    pub size: Option<u64>,
    /// Last modification time, when the source reports one
    pub modified_at: Option<DateTime<Utc>>,
    pub is_remote: bool,
    /// Hex SHA-256 of the content, when known
    pub content_hash: Option<String>,
}

impl Entry {
    pub fn file(
        path: impl Into<String>,
        size: u64,
        modified_at: Option<DateTime<Utc>>,
        is_remote: bool,
    ) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::File,
            size: Some(size),
            modified_at,
            is_remote,
            content_hash: None,
        }
    }

    pub fn directory(path: impl Into<String>, is_remote: bool) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::Directory,
            size: None,
            modified_at: None,
            is_remote,
            content_hash: None,
        }
    }

    pub fn with_hash(mut self, hash: impl Into<String>) -> Self {
        self.content_hash = Some(hash.into());
        self
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    pub fn side(&self) -> Side {
        if self.is_remote {
            Side::Remote
        } else {
            Side::Local
        }
    }

    /// Short human-readable description of the recorded state
    pub fn describe(&self) -> String {
        match self.kind {
            EntryKind::Directory => "directory".to_string(),
            EntryKind::File => {
                let size = self.size.unwrap_or(0);
                match self.modified_at {
                    Some(at) => format!("file ({} bytes, modified {})", size, at.to_rfc3339()),
                    None => format!("file ({} bytes)", size),
                }
            }
        }
    }
}

/// Settings shared by local and remote scans
#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    /// Skip entries whose name starts with a dot
    pub exclude_hidden: bool,
    /// Compute SHA-256 of every local file
    pub hash_files: bool,
    pub excludes: PatternMatcher,
}

impl ScanOptions {
    fn skips(&self, relative: &str) -> bool {
        if self.exclude_hidden && relative.split('/').any(|s| s.starts_with('.')) {
            return true;
        }
        self.excludes.should_exclude(relative)
    }
}

/// What a snapshot is built from
#[derive(Debug, Clone)]
pub enum RootSource {
    /// A local directory, walked recursively
    Local(PathBuf),
    /// A listing already fetched from the remote provider
    Remote(RemoteListing),
}

/// Immutable, ordered view of one tree
#[derive(Debug, Clone)]
pub struct Snapshot {
    side: Side,
    entries: BTreeMap<String, Entry>,
    warnings: Vec<ScanWarning>,
}

impl Snapshot {
    /// Build a snapshot from a local directory or a remote listing
    pub fn build(source: RootSource, options: &ScanOptions) -> Result<Self, ScanError> {
        match source {
            RootSource::Local(root) => Self::scan_local(&root, options),
            RootSource::Remote(listing) => Ok(Self::from_remote(listing, options)),
        }
    }

    /// An empty snapshot for the given side
    pub fn empty(side: Side) -> Self {
        Self {
            side,
            entries: BTreeMap::new(),
            warnings: Vec::new(),
        }
    }

    /// Assemble a snapshot from entries, materializing missing parents
    ///
    /// The first entry for a path wins; later duplicates and entries below a
    /// file are dropped with a warning.
    pub fn from_entries(side: Side, entries: impl IntoIterator<Item = Entry>) -> Self {
        Self::assemble(side, entries, Vec::new())
    }

    fn assemble(
        side: Side,
        records: impl IntoIterator<Item = Entry>,
        mut warnings: Vec<ScanWarning>,
    ) -> Self {
        let is_remote = side == Side::Remote;
        let mut entries = BTreeMap::new();

        for entry in records {
            match entries.entry(entry.path.clone()) {
                btree_map::Entry::Vacant(slot) => {
                    slot.insert(entry);
                }
                btree_map::Entry::Occupied(_) => {
                    warnings.push(ScanWarning::Duplicate { path: entry.path });
                }
            }
        }

        let orphans: Vec<String> = entries
            .keys()
            .filter(|path| {
                ancestors(path).any(|a| entries.get(a).is_some_and(Entry::is_file))
            })
            .cloned()
            .collect();
        for path in orphans {
            entries.remove(&path);
            warnings.push(ScanWarning::InvalidPath {
                path,
                reason: PathError::ParentIsFile,
            });
        }

        let missing: Vec<String> = entries
            .keys()
            .flat_map(|path| ancestors(path))
            .filter(|a| !entries.contains_key(*a))
            .map(str::to_string)
            .collect();
        for path in missing {
            entries
                .entry(path.clone())
                .or_insert_with(|| Entry::directory(path, is_remote));
        }

        for warning in &warnings {
            warn!(side = %side, "{}", warning);
        }

        Self {
            side,
            entries,
            warnings,
        }
    }

    fn scan_local(root: &Path, options: &ScanOptions) -> Result<Self, ScanError> {
        let root_name = root.display().to_string();

        let meta = fs::metadata(root).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => ScanError::RootNotFound(root_name.clone()),
            _ => ScanError::Unreadable {
                root: root_name.clone(),
                reason: e.to_string(),
            },
        })?;
        if !meta.is_dir() {
            return Err(ScanError::NotADirectory(root_name));
        }
        fs::read_dir(root).map_err(|e| ScanError::Unreadable {
            root: root_name.clone(),
            reason: e.to_string(),
        })?;

        let mut records = Vec::new();
        let mut warnings = Vec::new();

        let walker = WalkDir::new(root)
            .follow_links(false)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| match e.path().strip_prefix(root).map(relative_from_local) {
                Ok(Ok(relative)) => !options.skips(&relative),
                _ => true,
            });

        for item in walker {
            let entry = match item {
                Ok(entry) => entry,
                Err(err) => {
                    if err.depth() == 0 {
                        return Err(ScanError::Unreadable {
                            root: root_name,
                            reason: err.to_string(),
                        });
                    }
                    let path = err
                        .path()
                        .and_then(|p| p.strip_prefix(root).ok())
                        .map(|p| p.display().to_string())
                        .unwrap_or_else(|| root_name.clone());
                    warnings.push(ScanWarning::Unreadable {
                        path,
                        reason: err.to_string(),
                    });
                    continue;
                }
            };

            let raw = entry.path().strip_prefix(root).unwrap_or(entry.path());
            let relative = match relative_from_local(raw) {
                Ok(relative) => relative,
                Err(reason) => {
                    warnings.push(ScanWarning::InvalidPath {
                        path: raw.display().to_string(),
                        reason,
                    });
                    continue;
                }
            };

            let file_type = entry.file_type();
            if file_type.is_symlink() {
                debug!(path = %relative, "skipping symlink");
                continue;
            }

            if file_type.is_dir() {
                records.push(Entry::directory(relative, false));
                continue;
            }

            let meta = match entry.metadata() {
                Ok(meta) => meta,
                Err(err) => {
                    warnings.push(ScanWarning::Unreadable {
                        path: relative,
                        reason: err.to_string(),
                    });
                    continue;
                }
            };
            let modified_at = meta.modified().ok().map(DateTime::<Utc>::from);
            let mut record = Entry::file(relative, meta.len(), modified_at, false);

            if options.hash_files {
                match hash_file(entry.path()) {
                    Ok(hash) => record.content_hash = Some(hash),
                    Err(err) => {
                        warnings.push(ScanWarning::Unreadable {
                            path: record.path,
                            reason: err.to_string(),
                        });
                        continue;
                    }
                }
            }

            records.push(record);
        }

        debug!(root = %root_name, entries = records.len(), "local scan finished");
        Ok(Self::assemble(Side::Local, records, warnings))
    }

    fn from_remote(listing: RemoteListing, options: &ScanOptions) -> Self {
        let RemoteListing {
            root,
            records,
            mut warnings,
        } = listing;

        let mut entries = Vec::with_capacity(records.len());
        for record in records {
            let relative = match relative_from_remote(&root, &record.path) {
                Ok(relative) => relative,
                Err(reason) => {
                    warnings.push(ScanWarning::InvalidPath {
                        path: record.path,
                        reason,
                    });
                    continue;
                }
            };
            if options.skips(&relative) {
                continue;
            }

            let entry = match record.kind {
                EntryKind::Directory => Entry::directory(relative, true),
                EntryKind::File => Entry {
                    path: relative,
                    kind: EntryKind::File,
                    size: Some(record.size.unwrap_or(0)),
                    modified_at: record.modified,
                    is_remote: true,
                    content_hash: record.hash,
                },
            };
            entries.push(entry);
        }

        debug!(root = %root, entries = entries.len(), "remote listing normalized");
        Self::assemble(Side::Remote, entries, warnings)
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn get(&self, path: &str) -> Option<&Entry> {
        self.entries.get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in lexicographic path order
    pub fn iter(&self) -> impl Iterator<Item = &Entry> {
        self.entries.values()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Whether some entries were skipped while scanning
    pub fn is_partial(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn warnings(&self) -> &[ScanWarning] {
        &self.warnings
    }
}

/// Hex SHA-256 of a file's content
pub fn hash_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operations::remote::RemoteRecord;
    use tempfile::TempDir;

    fn remote_file(path: &str, size: u64) -> RemoteRecord {
        RemoteRecord {
            path: path.to_string(),
            kind: EntryKind::File,
            size: Some(size),
            modified: None,
            hash: None,
        }
    }

    #[test]
    fn test_local_scan_materializes_tree() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("b/c")).unwrap();
        fs::create_dir(dir.path().join("empty")).unwrap();
        fs::write(dir.path().join("a.txt"), b"0123456789").unwrap();
        fs::write(dir.path().join("b/c/d.txt"), b"").unwrap();
        fs::write(dir.path().join(".hidden"), b"x").unwrap();

        let snapshot =
            Snapshot::build(RootSource::Local(dir.path().to_path_buf()), &ScanOptions::default())
                .unwrap();

        let paths: Vec<&str> = snapshot.paths().collect();
        assert_eq!(paths, vec![".hidden", "a.txt", "b", "b/c", "b/c/d.txt", "empty"]);
        assert_eq!(snapshot.get("a.txt").unwrap().size, Some(10));
        assert_eq!(snapshot.get("b/c/d.txt").unwrap().size, Some(0));
        assert!(snapshot.get("empty").unwrap().is_dir());
        assert!(!snapshot.is_partial());
        assert_eq!(snapshot.side(), Side::Local);
    }

    #[test]
    fn test_local_scan_options() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join(".git")).unwrap();
        fs::write(dir.path().join(".git/HEAD"), b"ref").unwrap();
        fs::write(dir.path().join("keep.txt"), b"abc").unwrap();
        fs::write(dir.path().join("skip.swp"), b"abc").unwrap();

        let options = ScanOptions {
            exclude_hidden: true,
            hash_files: true,
            excludes: PatternMatcher::new(vec!["*.swp".to_string()]),
        };
        let snapshot =
            Snapshot::build(RootSource::Local(dir.path().to_path_buf()), &options).unwrap();

        let paths: Vec<&str> = snapshot.paths().collect();
        assert_eq!(paths, vec!["keep.txt"]);
        assert_eq!(
            snapshot.get("keep.txt").unwrap().content_hash.as_deref(),
            Some("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad")
        );
    }

    #[test]
    fn test_missing_root_is_scan_error() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope");
        let err = Snapshot::build(RootSource::Local(missing), &ScanOptions::default()).unwrap_err();
        assert!(matches!(err, ScanError::RootNotFound(_)));

        let file = dir.path().join("file");
        fs::write(&file, b"x").unwrap();
        let err = Snapshot::build(RootSource::Local(file), &ScanOptions::default()).unwrap_err();
        assert!(matches!(err, ScanError::NotADirectory(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_are_not_followed() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("real")).unwrap();
        fs::write(dir.path().join("real/f.txt"), b"x").unwrap();
        std::os::unix::fs::symlink(dir.path(), dir.path().join("real/loop")).unwrap();

        let snapshot =
            Snapshot::build(RootSource::Local(dir.path().to_path_buf()), &ScanOptions::default())
                .unwrap();
        let paths: Vec<&str> = snapshot.paths().collect();
        assert_eq!(paths, vec!["real", "real/f.txt"]);
    }

    #[test]
    fn test_remote_listing_normalized() {
        let listing = RemoteListing {
            root: "/Backup".to_string(),
            records: vec![
                remote_file("/Backup/docs/2024/report.pdf", 42),
                remote_file("/Backup/./notes.txt", 5),
                remote_file("/Elsewhere/x.txt", 1),
                remote_file("/Backup/notes.txt", 9),
            ],
            warnings: Vec::new(),
        };

        let snapshot = Snapshot::build(RootSource::Remote(listing), &ScanOptions::default()).unwrap();

        let paths: Vec<&str> = snapshot.paths().collect();
        assert_eq!(paths, vec!["docs", "docs/2024", "docs/2024/report.pdf", "notes.txt"]);
        assert!(snapshot.iter().all(|e| e.is_remote));
        assert_eq!(snapshot.get("notes.txt").unwrap().size, Some(5));
        assert!(snapshot.is_partial());
        assert_eq!(snapshot.warnings().len(), 2);
    }

    #[test]
    fn test_entries_below_a_file_are_dropped() {
        let snapshot = Snapshot::from_entries(
            Side::Remote,
            vec![
                Entry::file("a", 1, None, true),
                Entry::file("a/b", 1, None, true),
            ],
        );
        let paths: Vec<&str> = snapshot.paths().collect();
        assert_eq!(paths, vec!["a"]);
        assert_eq!(
            snapshot.warnings(),
            &[ScanWarning::InvalidPath {
                path: "a/b".to_string(),
                reason: PathError::ParentIsFile
            }]
        );
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_non_utf8_name_makes_local_scan_partial() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("ok.txt"), b"x").unwrap();
        fs::write(dir.path().join(OsStr::from_bytes(b"bad\xff.txt")), b"x").unwrap();

        let snapshot =
            Snapshot::build(RootSource::Local(dir.path().to_path_buf()), &ScanOptions::default())
                .unwrap();

        let paths: Vec<&str> = snapshot.paths().collect();
        assert_eq!(paths, vec!["ok.txt"]);
        assert!(snapshot.is_partial());
        assert!(matches!(
            snapshot.warnings(),
            [ScanWarning::InvalidPath { reason: PathError::NotUtf8, .. }]
        ));
    }

    #[test]
    fn test_unlistable_sub_directory_keeps_what_was_listed() {
        let listing = RemoteListing {
            root: "/Backup".to_string(),
            records: vec![
                RemoteRecord {
                    path: "/Backup/locked".to_string(),
                    kind: EntryKind::Directory,
                    size: None,
                    modified: None,
                    hash: None,
                },
                remote_file("/Backup/a.txt", 1),
            ],
            warnings: vec![ScanWarning::Unlistable {
                path: "/Backup/locked".to_string(),
                reason: "permission denied".to_string(),
            }],
        };

        let snapshot = Snapshot::build(RootSource::Remote(listing), &ScanOptions::default()).unwrap();
        let paths: Vec<&str> = snapshot.paths().collect();
        assert_eq!(paths, vec!["a.txt", "locked"]);
        assert!(snapshot.is_partial());
        assert!(matches!(snapshot.warnings(), [ScanWarning::Unlistable { .. }]));
    }
}
