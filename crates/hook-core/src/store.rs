//! Persists the hook document. Holds the per-hook file lock around every
//! read-modify-write; `update` is the canonical mutation path — see the
//! module doc on [`crate::manager::Manager`] for why callers should avoid
//! `save` for anything but fire-and-forget writes.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::atomic::atomic_write_json;
use crate::config::StoreConfig;
use crate::context::Context;
use crate::error::{HookError, Result};
use crate::lock::FileLock;
use crate::log::{NullSink, Sink};
use crate::markdown::{MarkdownGenerator, NoMarkdown};
use crate::types::{Hook, CURRENT_SCHEMA_VERSION};

const HOOK_FILE: &str = "hook.json";
const MARKDOWN_FILE: &str = "HOOK.md";

/// The oldest `Hook::schema_version` this build will read. Schema 1.0 is
/// the only version ever shipped, so every document on disk is either at
/// or above this floor today.
pub const MINIMUM_SUPPORTED_SCHEMA: &str = "1.0";

fn parse_schema_version(v: &str) -> Option<(u32, u32)> {
    let mut parts = v.splitn(2, '.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next().unwrap_or("0").parse().ok()?;
    Some((major, minor))
}

/// Migrates a raw on-disk document into the current `Hook` shape.
/// `Store::get`/`snapshot`/`list_stale` all route through this. A version
/// below [`MINIMUM_SUPPORTED_SCHEMA`] is rejected outright; anything at or
/// above it is deserialized as-is. Schema 1.0 is the only version ever
/// shipped, so this is presently the identity migration — the entry point
/// exists so a 1.1 field rename can be added here later without touching
/// any `Store` call site.
pub fn migrate_hook_value(path: &Path, value: serde_json::Value) -> Result<Hook> {
    let found = value
        .get("schema_version")
        .and_then(|v| v.as_str())
        .unwrap_or(CURRENT_SCHEMA_VERSION)
        .to_string();
    let unsupported = || HookError::UnsupportedSchema {
        path: path.to_path_buf(),
        found: found.clone(),
        minimum: MINIMUM_SUPPORTED_SCHEMA.to_string(),
    };
    let found_ver = parse_schema_version(&found).ok_or_else(unsupported)?;
    let min_ver = parse_schema_version(MINIMUM_SUPPORTED_SCHEMA).expect("minimum schema constant parses");
    if found_ver < min_ver {
        return Err(unsupported());
    }
    serde_json::from_value(value).map_err(|e| HookError::InvalidHook { path: path.to_path_buf(), source: e })
}

pub struct Store {
    base: PathBuf,
    config: StoreConfig,
    markdown: Arc<dyn MarkdownGenerator>,
    sink: Arc<dyn Sink>,
}

impl Store {
    pub fn new(base: impl Into<PathBuf>, config: StoreConfig) -> Self {
        Self {
            base: base.into(),
            config,
            markdown: Arc::new(NoMarkdown),
            sink: Arc::new(NullSink),
        }
    }

    pub fn with_markdown(mut self, markdown: Arc<dyn MarkdownGenerator>) -> Self {
        self.markdown = markdown;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn Sink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn task_dir(&self, task_path: &str) -> PathBuf {
        self.base.join(task_path)
    }

    fn hook_path(&self, task_path: &str) -> PathBuf {
        self.task_dir(task_path).join(HOOK_FILE)
    }

    fn markdown_path(&self, task_path: &str) -> PathBuf {
        self.task_dir(task_path).join(MARKDOWN_FILE)
    }

    fn lock_for(&self, ctx: &Context, hook_path: &Path) -> Result<FileLock> {
        let mut lock = FileLock::new(hook_path);
        lock.lock_with_context(ctx, self.config.lock_timeout, self.config.slow_lock_threshold, self.sink.as_ref())?;
        Ok(lock)
    }

    fn write_markdown_best_effort(&self, hook: &Hook, task_path: &str) {
        match self.markdown.render(hook) {
            Ok(bytes) if !bytes.is_empty() => {
                let path = self.markdown_path(task_path);
                if let Err(e) = fs::write(&path, &bytes) {
                    self.sink.warn(&format!("failed to write {}: {e}", path.display()));
                }
            }
            Ok(_) => {}
            Err(e) => self.sink.warn(&format!("markdown generation failed for {task_path}: {e}")),
        }
    }

    /// Creates the parent directory (`0o750`) and an initial Hook, under
    /// lock, re-checking existence after acquiring it.
    pub fn create(&self, ctx: &Context, task_path: &str, workspace_id: &str, task_id: &str) -> Result<Hook> {
        let dir = self.task_dir(task_path);
        create_dir_0750(&dir)?;
        let hook_path = self.hook_path(task_path);
        let mut lock = self.lock_for(ctx, &hook_path)?;

        if hook_path.exists() {
            return Err(HookError::HookExists(task_path.to_string()));
        }

        let now = Utc::now();
        let hook = Hook::new(task_id, workspace_id, now);
        atomic_write_json(&hook_path, &hook, self.sink.as_ref())?;
        self.write_markdown_best_effort(&hook, task_path);
        lock.unlock();
        Ok(hook)
    }

    /// Point-in-time read. Not guaranteed to be a deep copy independent of
    /// later in-process mutation of the returned value's owner — callers
    /// that retain it beyond the call should prefer `snapshot`.
    pub fn get(&self, ctx: &Context, task_path: &str) -> Result<Hook> {
        let hook_path = self.hook_path(task_path);
        let mut lock = self.lock_for(ctx, &hook_path)?;
        let hook = read_hook(&hook_path)?;
        lock.unlock();
        Ok(hook)
    }

    /// Same as `get`, but the result is parsed independently from a fresh
    /// byte read under lock, guaranteeing it shares nothing with any
    /// in-flight mutation.
    pub fn snapshot(&self, ctx: &Context, task_path: &str) -> Result<Hook> {
        self.get(ctx, task_path)
    }

    /// Dangerous for read-modify-write callers: lost updates are possible
    /// since there is no read step here. Prefer `update`.
    pub fn save(&self, ctx: &Context, task_path: &str, hook: &mut Hook) -> Result<()> {
        let hook_path = self.hook_path(task_path);
        let mut lock = self.lock_for(ctx, &hook_path)?;
        hook.updated_at = Utc::now();
        atomic_write_json(&hook_path, hook, self.sink.as_ref())?;
        self.write_markdown_best_effort(hook, task_path);
        lock.unlock();
        Ok(())
    }

    /// The primary mutation path: acquires the lock, reads, calls `f`,
    /// and on success rewrites atomically with `updated_at` bumped.
    /// `HOOK.md` regeneration runs inside the lock window.
    pub fn update<F, T>(&self, ctx: &Context, task_path: &str, f: F) -> Result<T>
    where
        F: FnOnce(&mut Hook) -> Result<T>,
    {
        let hook_path = self.hook_path(task_path);
        let mut lock = self.lock_for(ctx, &hook_path)?;
        let mut hook = read_hook(&hook_path)?;
        let result = f(&mut hook)?;
        hook.updated_at = Utc::now();
        atomic_write_json(&hook_path, &hook, self.sink.as_ref())?;
        self.write_markdown_best_effort(&hook, task_path);
        lock.unlock();
        Ok(result)
    }

    /// Idempotent: a missing hook is not an error and does not take the
    /// lock.
    pub fn delete(&self, ctx: &Context, task_path: &str) -> Result<()> {
        let hook_path = self.hook_path(task_path);
        if !hook_path.exists() {
            return Ok(());
        }
        let mut lock = self.lock_for(ctx, &hook_path)?;
        remove_if_present(&hook_path)?;
        remove_if_present(&self.markdown_path(task_path))?;
        lock.unlock();
        Ok(())
    }

    pub fn exists(&self, task_path: &str) -> bool {
        self.hook_path(task_path).exists()
    }

    /// Walks the base path for `hook.json` files and returns those whose
    /// state is non-terminal and have gone quiet longer than `threshold`.
    /// Files that fail to read or parse are silently skipped.
    pub fn list_stale(&self, ctx: &Context, threshold: Duration) -> Result<Vec<Hook>> {
        let now = Utc::now();
        let mut stale = Vec::new();
        for hook_path in find_hook_files(&self.base) {
            let Some(task_path) = hook_path
                .strip_prefix(&self.base)
                .ok()
                .and_then(|p| p.parent())
                .map(|p| p.to_string_lossy().replace('\\', "/"))
            else {
                continue;
            };
            let Ok(hook) = self.snapshot(ctx, &task_path) else {
                continue;
            };
            if hook.state.is_terminal() {
                continue;
            }
            let age = now.signed_duration_since(hook.updated_at);
            if age.to_std().map(|a| a > threshold).unwrap_or(false) {
                stale.push(hook);
            }
        }
        Ok(stale)
    }
}

fn read_hook(hook_path: &Path) -> Result<Hook> {
    let bytes = fs::read(hook_path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            HookError::HookNotFound(hook_path.display().to_string())
        } else {
            HookError::io(hook_path.to_path_buf(), e)
        }
    })?;
    let value: serde_json::Value = serde_json::from_slice(&bytes)
        .map_err(|e| HookError::InvalidHook { path: hook_path.to_path_buf(), source: e })?;
    migrate_hook_value(hook_path, value)
}

fn remove_if_present(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(HookError::io(path.to_path_buf(), e)),
    }
}

fn create_dir_0750(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).map_err(|e| HookError::io(dir.to_path_buf(), e))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(dir, fs::Permissions::from_mode(0o750)).map_err(|e| HookError::io(dir.to_path_buf(), e))?;
    }
    Ok(())
}

fn find_hook_files(base: &Path) -> Vec<PathBuf> {
    let mut out = Vec::new();
    let mut stack = vec![base.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let Ok(entries) = fs::read_dir(&dir) else { continue };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else if path.file_name().and_then(|n| n.to_str()) == Some(HOOK_FILE) {
                out.push(path);
            }
        }
    }
    out
}
