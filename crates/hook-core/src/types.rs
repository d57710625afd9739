//! The persisted document model: [`Hook`] and everything it is made of.
//!
//! Every type here derives `Serialize`/`Deserialize` so the whole document
//! round-trips through `hook.json` without a hand-written (de)serializer.
//! Timestamps are UTC throughout; the wall clock is the source of truth
//! for ordering, not a logical clock.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The on-disk schema version written into every `hook.json`.
pub const CURRENT_SCHEMA_VERSION: &str = "1.0";

/// Default cap on `Hook::history` length; the oldest entries are dropped
/// on overflow so an append-only log left running for a long task does
/// not grow without bound.
pub const DEFAULT_MAX_HISTORY_EVENTS: usize = 200;

/// Default cap on `Hook::checkpoints` length.
pub const DEFAULT_MAX_CHECKPOINTS: usize = 50;

/// Free-form key/value details attached to a [`HookEvent`].
pub type Details = serde_json::Map<String, serde_json::Value>;

pub fn empty_details() -> Details {
    Details::new()
}

/// The finite states a hook can be in. See [`crate::state_machine`] for
/// the transition graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookState {
    Initializing,
    StepPending,
    StepRunning,
    StepValidating,
    AwaitingHuman,
    Recovering,
    Completed,
    Failed,
    Abandoned,
}

impl HookState {
    /// Terminal states have no outgoing transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, HookState::Completed | HookState::Failed | HookState::Abandoned)
    }
}

/// Why a [`StepCheckpoint`] was created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointTrigger {
    Manual,
    GitCommit,
    GitPush,
    GitPr,
    Validation,
    StepComplete,
    Interval,
}

/// Classification of how a stale hook was most likely interrupted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrashType {
    ValidationInterrupted,
    StepInterrupted,
    Unknown,
}

/// What the recovery detector recommends a resuming process do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendedAction {
    RetryStep,
    RetryFromCheckpoint,
    SkipStep,
    Manual,
}

/// Named steps known to be safe to re-run without external side effects.
pub const IDEMPOTENT_STEPS: &[&str] = &["analyze", "plan", "validate", "review", "test", "lint"];

pub fn is_idempotent_step(name: &str) -> bool {
    IDEMPOTENT_STEPS.contains(&name)
}

/// The step currently being worked on, if any.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepContext {
    pub step_name: String,
    pub step_index: i64,
    pub started_at: DateTime<Utc>,
    pub attempt: u32,
    pub max_attempts: u32,
    #[serde(default)]
    pub working_on: String,
    #[serde(default)]
    pub files_touched: Vec<PathBuf>,
    #[serde(default)]
    pub last_output: String,
    #[serde(default)]
    pub current_checkpoint_id: Option<String>,
}

/// One append-only history entry recording a state transition (or, when
/// `from_state == to_state`, a non-transitioning annotation such as
/// `checkpoint_created`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HookEvent {
    pub timestamp: DateTime<Utc>,
    pub from_state: HookState,
    pub to_state: HookState,
    pub trigger: String,
    #[serde(default)]
    pub step_name: Option<String>,
    #[serde(default)]
    pub details: Details,
}

/// A point-in-time recording of step identity, git state, and file
/// contents, tagged by the event that caused it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepCheckpoint {
    pub checkpoint_id: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub step_name: Option<String>,
    #[serde(default)]
    pub step_index: Option<i64>,
    pub description: String,
    pub trigger: CheckpointTrigger,
    #[serde(default)]
    pub files_snapshot: Vec<FileSnapshot>,
    #[serde(default)]
    pub git_branch: Option<String>,
    #[serde(default)]
    pub git_commit: Option<String>,
    #[serde(default)]
    pub git_dirty: bool,
}

/// A single file's recorded state at checkpoint time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSnapshot {
    pub path: PathBuf,
    pub exists: bool,
    pub size: i64,
    #[serde(default)]
    pub mod_time: String,
    #[serde(default)]
    pub sha256_prefix: String,
}

impl FileSnapshot {
    pub fn missing(path: PathBuf) -> Self {
        Self {
            path,
            exists: false,
            size: 0,
            mod_time: String::new(),
            sha256_prefix: String::new(),
        }
    }
}

/// A signed attestation that a validation command ran, with its command,
/// exit code, and output hashes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReceipt {
    pub receipt_id: String,
    pub step_name: String,
    pub command: String,
    pub exit_code: i32,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration: String,
    #[serde(default)]
    pub stdout_hash: String,
    #[serde(default)]
    pub stderr_hash: String,
    #[serde(default)]
    pub signature: Option<String>,
    #[serde(default)]
    pub key_path: Option<String>,
}

/// Diagnosis recorded when a stale hook is detected, guiding a resuming
/// process to a safe continuation point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryContext {
    pub detected_at: DateTime<Utc>,
    pub last_known_state: HookState,
    pub crash_type: CrashType,
    pub was_validating: bool,
    #[serde(default)]
    pub validation_cmd: Option<String>,
    #[serde(default)]
    pub partial_output: Option<String>,
    #[serde(default)]
    pub last_checkpoint_id: Option<String>,
    pub recommended_action: RecommendedAction,
    pub reason: String,
}

/// The root persisted document: one per task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hook {
    pub schema_version: String,
    pub task_id: String,
    pub workspace_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub state: HookState,
    #[serde(default)]
    pub current_step: Option<StepContext>,
    #[serde(default)]
    pub history: Vec<HookEvent>,
    #[serde(default)]
    pub checkpoints: Vec<StepCheckpoint>,
    #[serde(default)]
    pub receipts: Vec<ValidationReceipt>,
    #[serde(default)]
    pub recovery: Option<RecoveryContext>,
}

impl Hook {
    /// A freshly initializing hook, as written by `Store::create`.
    pub fn new(task_id: impl Into<String>, workspace_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            schema_version: CURRENT_SCHEMA_VERSION.to_string(),
            task_id: task_id.into(),
            workspace_id: workspace_id.into(),
            created_at: now,
            updated_at: now,
            state: HookState::Initializing,
            current_step: None,
            history: Vec::new(),
            checkpoints: Vec::new(),
            receipts: Vec::new(),
            recovery: None,
        }
    }
}

/// The relative directory identifier under which a hook is stored.
pub fn task_path(workspace_id: &str, task_id: &str) -> String {
    format!("workspaces/{workspace_id}/tasks/{task_id}")
}

/// Metadata describing an external validation command's result, as
/// handed to `Manager::create_validation_receipt` by the caller.
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub command: String,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub metadata: BTreeMap<String, String>,
}
