// Path Utilities
// Canonical relative paths shared by local and remote snapshots

use std::path::{Component, Path, PathBuf};

use crate::error::PathError;

/// Normalize a slash-separated relative path
///
/// Empty and `.` segments are dropped, `..` pops the previous segment, and
/// a path that would climb above the root is rejected. Case is preserved.
pub fn normalize_relative(path: &str) -> Result<String, PathError> {
    let mut segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.pop().is_none() {
                    return Err(PathError::EscapesRoot);
                }
            }
            s => segments.push(s),
        }
    }

    if segments.is_empty() {
        return Err(PathError::Empty);
    }

    Ok(segments.join("/"))
}

/// Convert a path relative to a local root into canonical form
pub fn relative_from_local(path: &Path) -> Result<String, PathError> {
    let mut segments = Vec::new();

    for component in path.components() {
        match component {
            Component::Normal(name) => {
                segments.push(name.to_str().ok_or(PathError::NotUtf8)?);
            }
            Component::CurDir => {}
            Component::ParentDir => {
                if segments.pop().is_none() {
                    return Err(PathError::EscapesRoot);
                }
            }
            Component::RootDir | Component::Prefix(_) => return Err(PathError::EscapesRoot),
        }
    }

    if segments.is_empty() {
        return Err(PathError::Empty);
    }

    Ok(segments.join("/"))
}

/// Strip the remote root from an absolute remote path and normalize the rest
pub fn relative_from_remote(root: &str, path: &str) -> Result<String, PathError> {
    let root = root.trim_end_matches('/');
    let rest = if root.is_empty() {
        path
    } else {
        match path.strip_prefix(root) {
            Some(rest) if rest.is_empty() || rest.starts_with('/') => rest,
            _ => return Err(PathError::OutsideRoot(root.to_string())),
        }
    };
    normalize_relative(rest)
}

/// Join a canonical relative path onto a remote root
pub fn remote_join(root: &str, relative: &str) -> String {
    let root = root.trim_end_matches('/');
    if relative.is_empty() {
        return if root.is_empty() { "/".to_string() } else { root.to_string() };
    }
    format!("{}/{}", root, relative)
}

/// Join a canonical relative path onto a local root
pub fn local_join(root: &Path, relative: &str) -> PathBuf {
    let mut path = root.to_path_buf();
    path.extend(relative.split('/'));
    path
}

/// Parent of a canonical relative path, `None` for top-level entries
pub fn parent_of(path: &str) -> Option<&str> {
    path.rfind('/').map(|idx| &path[..idx])
}

/// Every non-root ancestor of a canonical relative path, nearest last
pub fn ancestors(path: &str) -> impl Iterator<Item = &str> {
    path.match_indices('/').map(move |(idx, _)| &path[..idx])
}

/// Whether `path` lies strictly below `ancestor`
pub fn is_descendant(path: &str, ancestor: &str) -> bool {
    path.len() > ancestor.len()
        && path.starts_with(ancestor)
        && path.as_bytes()[ancestor.len()] == b'/'
}
