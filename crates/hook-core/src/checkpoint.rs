//! Checkpoint creation: step identity, file content snapshots, and git
//! state, captured together and appended to `Hook::checkpoints`.

use std::fs;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

use crate::context::Context;
use crate::git::GitProbe;
use crate::types::{CheckpointTrigger, FileSnapshot, Hook, StepCheckpoint};

const MAX_HASHED_SIZE: u64 = 10 * 1024 * 1024;
const HASH_BUF_SIZE: usize = 4096;

/// Generates a `ckpt-<8 hex>` identifier.
pub fn new_checkpoint_id() -> String {
    let mut bytes = [0u8; 4];
    OsRng.fill_bytes(&mut bytes);
    format!("ckpt-{}", hex::encode(bytes))
}

/// Snapshots one file's size/mtime/content hash, per the size-capped
/// streaming-SHA-256 rule: files over 10 MiB get an empty hash as an
/// intentional "too large" signal, not an error.
pub fn snapshot_file(path: &Path) -> FileSnapshot {
    let meta = match fs::metadata(path) {
        Ok(m) => m,
        Err(_) => return FileSnapshot::missing(path.to_path_buf()),
    };
    let size = meta.len();
    let mod_time = meta
        .modified()
        .ok()
        .map(|t| DateTime::<Utc>::from(t).to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_default();

    let sha256_prefix = if size <= MAX_HASHED_SIZE {
        hash_file_prefix(path).unwrap_or_default()
    } else {
        String::new()
    };

    FileSnapshot {
        path: path.to_path_buf(),
        exists: true,
        size: size as i64,
        mod_time,
        sha256_prefix,
    }
}

fn hash_file_prefix(path: &Path) -> Option<String> {
    let mut file = fs::File::open(path).ok()?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; HASH_BUF_SIZE];
    loop {
        let n = file.read(&mut buf).ok()?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    let digest = hasher.finalize();
    Some(hex::encode(digest)[..16].to_string())
}

/// Creates checkpoints and prunes `Hook::checkpoints` to a retention cap.
pub struct Checkpointer {
    git_probe: Arc<dyn GitProbe>,
    git_timeout: std::time::Duration,
}

impl Checkpointer {
    pub fn new(git_probe: Arc<dyn GitProbe>, git_timeout: std::time::Duration) -> Self {
        Self { git_probe, git_timeout }
    }

    /// Captures the current step context, file snapshots for the given
    /// paths, and git state; appends to `hook.checkpoints`; points
    /// `current_step.current_checkpoint_id` at it; prunes to `max_checkpoints`.
    pub fn create_checkpoint(
        &self,
        ctx: &Context,
        hook: &mut Hook,
        repo_root: &Path,
        trigger: CheckpointTrigger,
        description: impl Into<String>,
        files: &[std::path::PathBuf],
        now: DateTime<Utc>,
        max_checkpoints: usize,
    ) -> StepCheckpoint {
        let probe_ctx = ctx.with_timeout(self.git_timeout);
        let git = self.git_probe.probe(&probe_ctx, repo_root);

        let (step_name, step_index) = hook
            .current_step
            .as_ref()
            .map(|s| (Some(s.step_name.clone()), Some(s.step_index)))
            .unwrap_or((None, None));

        let files_snapshot = files.iter().map(|p| snapshot_file(p)).collect();

        let checkpoint = StepCheckpoint {
            checkpoint_id: new_checkpoint_id(),
            created_at: now,
            step_name,
            step_index,
            description: description.into(),
            trigger,
            files_snapshot,
            git_branch: git.branch,
            git_commit: git.commit,
            git_dirty: git.dirty,
        };

        hook.checkpoints.push(checkpoint.clone());
        if let Some(step) = hook.current_step.as_mut() {
            step.current_checkpoint_id = Some(checkpoint.checkpoint_id.clone());
        }
        prune_checkpoints(hook, max_checkpoints);
        checkpoint
    }
}

fn prune_checkpoints(hook: &mut Hook, max_checkpoints: usize) {
    if hook.checkpoints.len() > max_checkpoints {
        let excess = hook.checkpoints.len() - max_checkpoints;
        hook.checkpoints.drain(0..excess);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::{FakeGitProbe, GitState};
    use crate::types::StepContext;
    use std::fs;
    use tempfile::tempdir;

    fn checkpointer() -> Checkpointer {
        Checkpointer::new(
            Arc::new(FakeGitProbe(GitState {
                branch: Some("main".into()),
                commit: Some("deadbee".into()),
                dirty: false,
            })),
            std::time::Duration::from_secs(5),
        )
    }

    #[test]
    fn snapshot_missing_file_records_exists_false() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("gone.txt");
        let snap = snapshot_file(&path);
        assert!(!snap.exists);
        assert_eq!(snap.size, 0);
        assert!(snap.sha256_prefix.is_empty());
    }

    #[test]
    fn snapshot_existing_file_hashes_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.txt");
        fs::write(&path, b"hello world").unwrap();
        let snap = snapshot_file(&path);
        assert!(snap.exists);
        assert_eq!(snap.size, 11);
        assert_eq!(snap.sha256_prefix.len(), 16);
    }

    #[test]
    fn snapshot_large_file_skips_hash() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("big.bin");
        let f = fs::File::create(&path).unwrap();
        f.set_len(MAX_HASHED_SIZE + 1).unwrap();
        let snap = snapshot_file(&path);
        assert!(snap.exists);
        assert!(snap.sha256_prefix.is_empty());
    }

    #[test]
    fn create_checkpoint_appends_and_links_current_step() {
        let dir = tempdir().unwrap();
        let mut hook = Hook::new("t1", "w1", Utc::now());
        hook.current_step = Some(StepContext {
            step_name: "analyze".into(),
            step_index: 0,
            started_at: Utc::now(),
            attempt: 1,
            max_attempts: 3,
            working_on: String::new(),
            files_touched: vec![],
            last_output: String::new(),
            current_checkpoint_id: None,
        });
        let cp = checkpointer().create_checkpoint(
            &Context::background(),
            &mut hook,
            dir.path(),
            CheckpointTrigger::StepComplete,
            "step complete",
            &[],
            Utc::now(),
            50,
        );
        assert_eq!(hook.checkpoints.len(), 1);
        assert_eq!(hook.current_step.as_ref().unwrap().current_checkpoint_id.as_deref(), Some(cp.checkpoint_id.as_str()));
        assert_eq!(cp.git_branch.as_deref(), Some("main"));
    }

    #[test]
    fn checkpoints_are_pruned_to_cap() {
        let dir = tempdir().unwrap();
        let mut hook = Hook::new("t1", "w1", Utc::now());
        let cpr = checkpointer();
        for _ in 0..5 {
            cpr.create_checkpoint(&Context::background(), &mut hook, dir.path(), CheckpointTrigger::Manual, "x", &[], Utc::now(), 3);
        }
        assert_eq!(hook.checkpoints.len(), 3);
    }
}
