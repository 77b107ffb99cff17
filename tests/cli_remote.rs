// Drives CliRemote against a shell script that keeps the "remote" tree in a
// temporary directory. The script stamps uploads with the time they were
// stored, like a hosted service does.
#![cfg(unix)]

use chrono::{DateTime, TimeZone, Utc};
use filetime::FileTime;
use pretty_assertions::assert_eq;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

use remote_sync::core::SyncSession;
use remote_sync::error::{RemoteError, ScanWarning};
use remote_sync::operations::{
    CancelSignal, CliRemote, DenyAll, EntryKind, ExecutorOptions, Outcome, RemoteCommands,
    RemoteLister, SyncDirection,
};

const SCRIPT: &str = r#"#!/bin/sh
STORE='@STORE@'
cmd="$1"; shift
case "$cmd" in
  list)
    dir="$STORE$2"
    if [ ! -d "$dir" ]; then echo "no such folder $2" >&2; exit 1; fi
    if [ -e "$dir/.locked" ]; then echo "permission denied $2" >&2; exit 1; fi
    for f in "$dir"/* "$dir"/.[!.]*; do
      [ -e "$f" ] || continue
      name=$(basename "$f")
      if [ -d "$f" ]; then
        printf '{"name":"%s","is_dir":true}\n' "$name"
      else
        size=$(wc -c < "$f" | tr -d ' ')
        stamp=$(date -u -r "$f" +%Y-%m-%dT%H:%M:%SZ)
        printf '{"name":"%s","size":%s,"modified":"%s"}\n' "$name" "$size" "$stamp"
      fi
    done ;;
  upload) cp "$1" "$STORE$2" ;;
  download) cp "$STORE$1" "$2" ;;
  delete) if [ -d "$STORE$1" ]; then rmdir "$STORE$1"; else rm "$STORE$1"; fi ;;
  mkdir) mkdir "$STORE$1" ;;
  *) echo "unknown command $cmd" >&2; exit 2 ;;
esac
"#;

/// A fake storage tool rooted in its own temp dir
struct FakeCli {
    _dir: TempDir,
    store: PathBuf,
    commands: RemoteCommands,
}

impl FakeCli {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let store = dir.path().join("store");
        fs::create_dir_all(store.join("r")).unwrap();

        let script = dir.path().join("fakecli.sh");
        fs::write(&script, SCRIPT.replace("@STORE@", &store.display().to_string())).unwrap();

        // run through sh so the freshly written script never has to be executable
        let with = |items: &[&str]| {
            std::iter::once(script.display().to_string())
                .chain(items.iter().map(|s| s.to_string()))
                .collect::<Vec<_>>()
        };
        let commands = RemoteCommands {
            program: "sh".to_string(),
            list: with(&["list", "--json", "{remote}"]),
            upload: with(&["upload", "{local}", "{remote}"]),
            download: with(&["download", "{remote}", "{local}"]),
            delete: with(&["delete", "{remote}"]),
            mkdir: with(&["mkdir", "{remote}"]),
            source_mtimes: false,
        };

        Self {
            _dir: dir,
            store,
            commands,
        }
    }

    fn remote(&self) -> CliRemote {
        CliRemote::new(self.commands.clone())
    }

    fn put(&self, path: &str, data: &[u8]) {
        let full = self.store.join(path.trim_start_matches('/'));
        fs::create_dir_all(full.parent().unwrap()).unwrap();
        fs::write(full, data).unwrap();
    }

    fn path(&self, path: &str) -> PathBuf {
        self.store.join(path.trim_start_matches('/'))
    }
}

fn write_stamped(root: &Path, path: &str, data: &[u8], secs: i64) {
    let full = root.join(path);
    fs::create_dir_all(full.parent().unwrap()).unwrap();
    fs::write(&full, data).unwrap();
    filetime::set_file_mtime(&full, FileTime::from_unix_time(secs, 0)).unwrap();
}

fn stamp(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

#[tokio::test]
async fn test_list_walks_every_level() {
    let cli = FakeCli::new();
    cli.put("/r/a.txt", b"abc");
    cli.put("/r/docs/2024/report.pdf", b"pdf!");
    fs::create_dir_all(cli.path("/r/empty")).unwrap();

    let listing = cli.remote().list("/r").await.unwrap();
    let mut paths: Vec<(&str, EntryKind)> =
        listing.records.iter().map(|r| (r.path.as_str(), r.kind)).collect();
    paths.sort_by(|a, b| a.0.cmp(b.0));

    assert_eq!(
        paths,
        vec![
            ("/r/a.txt", EntryKind::File),
            ("/r/docs", EntryKind::Directory),
            ("/r/docs/2024", EntryKind::Directory),
            ("/r/docs/2024/report.pdf", EntryKind::File),
            ("/r/empty", EntryKind::Directory),
        ]
    );
    assert!(listing.warnings.is_empty());

    let report = listing.records.iter().find(|r| r.path.ends_with("report.pdf")).unwrap();
    assert_eq!(report.size, Some(4));
    // stored-at times are not source mtimes unless configured
    assert_eq!(report.modified, None);
}

#[tokio::test]
async fn test_listed_mtimes_are_kept_when_the_tool_preserves_them() {
    let cli = FakeCli::new();
    cli.put("/r/a.txt", b"abc");
    filetime::set_file_mtime(cli.path("/r/a.txt"), FileTime::from_unix_time(1_600_000_000, 0))
        .unwrap();

    let remote = CliRemote::new(RemoteCommands {
        source_mtimes: true,
        ..cli.commands.clone()
    });
    let listing = remote.list("/r").await.unwrap();
    assert_eq!(listing.records[0].modified, Some(stamp(1_600_000_000)));
}

#[tokio::test]
async fn test_unlistable_sub_directory_becomes_warning() {
    let cli = FakeCli::new();
    cli.put("/r/ok/a.txt", b"a");
    cli.put("/r/locked/.locked", b"");
    cli.put("/r/locked/secret.txt", b"s");

    let listing = cli.remote().list("/r").await.unwrap();
    let paths: Vec<&str> = listing.records.iter().map(|r| r.path.as_str()).collect();
    assert!(paths.contains(&"/r/locked"));
    assert!(paths.contains(&"/r/ok/a.txt"));
    assert!(!paths.contains(&"/r/locked/secret.txt"));

    assert_eq!(listing.warnings.len(), 1);
    let ScanWarning::Unlistable { path, reason } = &listing.warnings[0] else {
        panic!("expected unlistable warning, got {:?}", listing.warnings[0]);
    };
    assert_eq!(path, "/r/locked");
    assert!(reason.contains("permission denied"));

    // the session reports the scan as partial but still plans the rest
    let local = TempDir::new().unwrap();
    let session = SyncSession::new(local.path(), "/r", Arc::new(cli.remote()));
    let preview = session.preview(SyncDirection::RemoteToLocal).await.unwrap();
    assert!(preview.remote.is_partial());
    assert!(preview.remote.contains("ok/a.txt"));
}

#[tokio::test]
async fn test_unlistable_root_is_an_error() {
    let cli = FakeCli::new();
    let err = cli.remote().list("/missing").await.unwrap_err();
    assert!(matches!(err, RemoteError::Command { .. }));
}

#[tokio::test]
async fn test_stat_reads_the_parent_listing() {
    let cli = FakeCli::new();
    cli.put("/r/d/f.txt", b"12345");

    let remote = cli.remote();
    let file = remote.stat("/r/d/f.txt").await.unwrap().unwrap();
    assert_eq!(file.kind, EntryKind::File);
    assert_eq!(file.size, Some(5));

    assert!(remote.stat("/r/d").await.unwrap().unwrap().is_dir());
    assert!(remote.stat("/r/d/other.txt").await.unwrap().is_none());

    // a missing parent means a missing path, not a failure
    assert!(remote.stat("/r/nope/f.txt").await.unwrap().is_none());
    assert!(remote.stat("/r/nope/deeper/f.txt").await.unwrap().is_none());

    // a parent that exists but cannot be listed is still an error
    cli.put("/r/locked/.locked", b"");
    let err = remote.stat("/r/locked/f.txt").await.unwrap_err();
    assert!(matches!(err, RemoteError::Command { .. }));
}

#[tokio::test]
async fn test_dry_run_push_into_new_directory() {
    let cli = FakeCli::new();
    let local = TempDir::new().unwrap();
    write_stamped(local.path(), "d/f.txt", b"hello", 1_600_000_000);
    write_stamped(local.path(), "d/e/g.txt", b"g", 1_600_000_000);

    let options = ExecutorOptions { dry_run: true, ..ExecutorOptions::default() };
    let session = SyncSession::new(local.path(), "/r", Arc::new(cli.remote()))
        .with_executor_options(options);
    let report = session
        .run_cycle(SyncDirection::LocalToRemote, &DenyAll, &CancelSignal::new())
        .await
        .unwrap();

    assert!(report.is_success(), "{:?}", report.execution.errors());
    assert_eq!(report.execution.results.len(), 4);
    assert!(report
        .execution
        .results
        .iter()
        .all(|r| r.outcome == Outcome::Skipped("dry run".to_string())));
    assert!(!cli.path("/r/d").exists());
}

#[tokio::test]
async fn test_push_then_preview_is_clean() {
    let cli = FakeCli::new();
    let local = TempDir::new().unwrap();
    write_stamped(local.path(), "a.txt", b"alpha", 1_600_000_000);
    write_stamped(local.path(), "sub/b.txt", b"beta", 1_600_000_000);

    let session = SyncSession::new(local.path(), "/r", Arc::new(cli.remote()));
    let report = session
        .run_cycle(SyncDirection::LocalToRemote, &DenyAll, &CancelSignal::new())
        .await
        .unwrap();
    assert!(report.is_success(), "{:?}", report.execution.errors());
    assert_eq!(fs::read(cli.path("/r/sub/b.txt")).unwrap(), b"beta");

    // the store stamped both files with the upload time
    let preview = session.preview(SyncDirection::LocalToRemote).await.unwrap();
    assert!(preview.changes.is_clean(), "{:?}", preview.changes.summary());
    assert!(preview.plan.is_empty());
}

#[tokio::test]
async fn test_pull_then_preview_is_clean() {
    let cli = FakeCli::new();
    cli.put("/r/photos/a.jpg", b"jpeg");
    let local = TempDir::new().unwrap();

    let session = SyncSession::new(local.path(), "/r", Arc::new(cli.remote()));
    let report = session
        .run_cycle(SyncDirection::RemoteToLocal, &DenyAll, &CancelSignal::new())
        .await
        .unwrap();
    assert!(report.is_success(), "{:?}", report.execution.errors());
    assert_eq!(fs::read(local.path().join("photos/a.jpg")).unwrap(), b"jpeg");

    let preview = session.preview(SyncDirection::RemoteToLocal).await.unwrap();
    assert!(preview.changes.is_clean(), "{:?}", preview.changes.summary());
}
