//! Cross-process advisory exclusive locking on a `<target>.lock` sidecar
//! file, built on the OS-native primitives (`flock` on unix, `LockFileEx`
//! on windows) via the `fs2` crate rather than an existence check, so two
//! processes racing to acquire the same lock are actually serialized by
//! the kernel.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use fs2::FileExt;

use crate::context::Context;
use crate::error::{HookError, Result};
use crate::log::Sink;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// An advisory exclusive lock on `<target>.lock`.
#[derive(Debug)]
pub struct FileLock {
    path: PathBuf,
    file: Option<File>,
}

impl FileLock {
    /// The sidecar lock path for `target`.
    pub fn path_for(target: &Path) -> PathBuf {
        let mut lock_path = target.as_os_str().to_owned();
        lock_path.push(".lock");
        PathBuf::from(lock_path)
    }

    pub fn new(target: &Path) -> Self {
        Self {
            path: Self::path_for(target),
            file: None,
        }
    }

    /// Acquires the lock, polling every 50ms up to `timeout` and checking
    /// `ctx` on every iteration. Logs a WARN through `sink` if acquisition
    /// took longer than `slow_threshold`.
    pub fn lock_with_context(
        &mut self,
        ctx: &Context,
        timeout: Duration,
        slow_threshold: Duration,
        sink: &dyn Sink,
    ) -> Result<()> {
        let start = Instant::now();
        let deadline = start + timeout;

        let file = open_owner_only(&self.path)?;

        loop {
            match file.try_lock_exclusive() {
                Ok(()) => {
                    self.file = Some(file);
                    let elapsed = start.elapsed();
                    if elapsed > slow_threshold {
                        sink.warn(&format!(
                            "slow lock acquisition on {}: {}ms",
                            self.path.display(),
                            elapsed.as_millis()
                        ));
                    }
                    return Ok(());
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    if ctx.is_canceled() {
                        return Err(HookError::Canceled);
                    }
                    let now = Instant::now();
                    if now >= deadline || ctx.is_expired() {
                        return Err(HookError::LockTimeout {
                            path: self.path.clone(),
                            elapsed_ms: start.elapsed().as_millis() as u64,
                        });
                    }
                    let remaining = deadline.saturating_duration_since(now);
                    thread::sleep(POLL_INTERVAL.min(remaining));
                }
                Err(e) => return Err(HookError::io(self.path.clone(), e)),
            }
        }
    }

    /// Releases the OS lock, closes the handle, and best-effort removes
    /// the sidecar file. Removal errors are swallowed: another waiter may
    /// have already recreated it.
    pub fn unlock(&mut self) {
        if let Some(file) = self.file.take() {
            let _ = FileExt::unlock(&file);
            drop(file);
        }
        let _ = std::fs::remove_file(&self.path);
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        self.unlock();
    }
}

fn open_owner_only(path: &Path) -> Result<File> {
    let mut options = OpenOptions::new();
    options.create(true).truncate(false).read(true).write(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options.open(path).map_err(|e| HookError::io(path.to_path_buf(), e))
}
