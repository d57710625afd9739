//! Write-temp-then-rename with file and parent-directory `fsync`.
//!
//! Generalizes the protocol used throughout this lineage for every
//! durable JSON write: write to a temp file in the same directory so the
//! later `rename` is on the same filesystem, `fsync` the temp file before
//! renaming, then `fsync` the containing directory. A crash after the
//! rename but before the directory `fsync` may leave the rename
//! non-durable across power loss but still correct in the running OS
//! view; directory-sync failures are logged, not fatal, since not every
//! platform supports opening a directory for sync (notably Windows).

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::{HookError, Result};
use crate::log::Sink;

/// Opens the parent of `path` and calls `sync_all`, swallowing any error.
pub fn fsync_parent_dir(path: &Path, sink: &dyn Sink) {
    let Some(parent) = path.parent() else { return };
    match File::open(parent) {
        Ok(dir) => {
            if let Err(e) = dir.sync_all() {
                sink.warn(&format!("directory fsync failed for {}: {e}", parent.display()));
            }
        }
        Err(e) => {
            sink.warn(&format!("could not open directory {} for fsync: {e}", parent.display()));
        }
    }
}

fn temp_path_for(path: &Path) -> PathBuf {
    let file_name = path.file_name().unwrap_or_default().to_string_lossy();
    let pid = std::process::id();
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    path.with_file_name(format!(".tmp-{file_name}-{pid}-{nanos}"))
}

/// Atomically writes `bytes` to `path`: temp file, `fsync`, `rename`,
/// parent-directory `fsync`.
pub fn atomic_write_bytes(path: &Path, bytes: &[u8], sink: &dyn Sink) -> Result<()> {
    let tmp = temp_path_for(path);
    {
        let mut options = OpenOptions::new();
        options.create(true).write(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut f = options
            .open(&tmp)
            .map_err(|e| HookError::io(tmp.clone(), e))?;
        f.write_all(bytes).map_err(|e| HookError::io(tmp.clone(), e))?;
        f.sync_all().map_err(|e| HookError::io(tmp.clone(), e))?;
    }
    fs::rename(&tmp, path).map_err(|e| HookError::io(path.to_path_buf(), e))?;
    fsync_parent_dir(path, sink);
    Ok(())
}

/// Serializes `value` as 2-space-indented JSON and writes it atomically.
pub fn atomic_write_json<T: Serialize>(path: &Path, value: &T, sink: &dyn Sink) -> Result<()> {
    let mut buf = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, serde_json::ser::PrettyFormatter::with_indent(b"  "));
    value
        .serialize(&mut ser)
        .map_err(|e| HookError::InvalidHook { path: path.to_path_buf(), source: e })?;
    atomic_write_bytes(path, &buf, sink)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::NullSink;
    use serde::Deserialize;
    use tempfile::tempdir;

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Doc {
        a: u32,
        b: String,
    }

    #[test]
    fn roundtrips_through_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("doc.json");
        let doc = Doc { a: 1, b: "x".into() };
        atomic_write_json(&path, &doc, &NullSink).unwrap();
        let read: Doc = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        assert_eq!(read, doc);
    }

    #[test]
    fn leaves_no_temp_file_behind() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("doc.json");
        atomic_write_json(&path, &Doc { a: 1, b: "x".into() }, &NullSink).unwrap();
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(".tmp-"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn overwrites_existing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("doc.json");
        atomic_write_json(&path, &Doc { a: 1, b: "x".into() }, &NullSink).unwrap();
        atomic_write_json(&path, &Doc { a: 2, b: "y".into() }, &NullSink).unwrap();
        let read: Doc = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        assert_eq!(read, Doc { a: 2, b: "y".into() });
    }

    #[test]
    fn rename_failure_surfaces_as_io_error() {
        let dir = tempdir().unwrap();
        // Pre-create the destination as a non-empty directory so `rename`
        // onto it fails.
        let path = dir.path().join("doc.json");
        fs::create_dir(&path).unwrap();
        fs::write(path.join("occupied"), b"x").unwrap();
        let err = atomic_write_json(&path, &Doc { a: 1, b: "x".into() }, &NullSink).unwrap_err();
        assert!(matches!(err, HookError::Io { .. }));
    }
}
