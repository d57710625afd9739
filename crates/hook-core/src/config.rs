//! Constructor-level configuration. Loading these values from a file or
//! CLI flags is the surrounding pipeline's job; this crate only consumes
//! the already-parsed struct.

use std::time::Duration;

/// Tuning knobs for [`crate::store::Store`] and [`crate::checkpoint::Checkpointer`].
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// How long `FileLock::lock_with_context` waits before `LockTimeout`.
    pub lock_timeout: Duration,
    /// Acquisitions slower than this are logged at WARN.
    pub slow_lock_threshold: Duration,
    /// Dedicated timeout for the three-command git probe.
    pub git_probe_timeout: Duration,
    /// Cap on `Hook::history` length.
    pub max_history_events: usize,
    /// Cap on `Hook::checkpoints` length; `0` means "use the default".
    pub max_checkpoints: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_secs(5),
            slow_lock_threshold: Duration::from_millis(100),
            git_probe_timeout: Duration::from_secs(5),
            max_history_events: crate::types::DEFAULT_MAX_HISTORY_EVENTS,
            max_checkpoints: crate::types::DEFAULT_MAX_CHECKPOINTS,
        }
    }
}

impl StoreConfig {
    pub fn effective_max_checkpoints(&self) -> usize {
        if self.max_checkpoints == 0 {
            crate::types::DEFAULT_MAX_CHECKPOINTS
        } else {
            self.max_checkpoints
        }
    }
}

/// Tuning knobs for [`crate::manager::Manager`] and friends.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    pub store: StoreConfig,
    /// How many attempts a step gets before `max_attempts` is exhausted,
    /// when the caller does not specify one explicitly.
    pub max_step_attempts: u32,
    /// Default period for the background interval checkpointer.
    pub checkpoint_interval: Duration,
    /// A hook is stale once it has been non-terminal for longer than this.
    pub stale_threshold: Duration,
    /// A checkpoint created within this window of "now" is considered
    /// recent enough to recommend `retry_from_checkpoint`.
    pub recent_checkpoint_window: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            max_step_attempts: 3,
            checkpoint_interval: Duration::from_secs(5 * 60),
            stale_threshold: Duration::from_secs(5 * 60),
            recent_checkpoint_window: Duration::from_secs(10 * 60),
        }
    }
}
