//! Orchestrates the state machine, store, checkpointer, interval worker,
//! recovery detector, and receipt signer into the task lifecycle API the
//! surrounding pipeline calls.
//!
//! *Cyclic reference between Manager and IntervalCheckpointer.* Each
//! needs to start/stop the other, but the worker must never hold a
//! pointer to an in-memory `Hook` — only `task_path + Store` — so every
//! tick observes the latest persisted state through the same
//! `Store::update` closure the foreground methods below use. This is the
//! one canonical trick the rest of this module is built around.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use hook_signer::{ReceiptFields, ReceiptSigner};

use crate::checkpoint::Checkpointer;
use crate::config::ManagerConfig;
use crate::context::Context;
use crate::error::{HookError, Result};
use crate::git::GitProbe;
use crate::interval::IntervalCheckpointer;
use crate::log::{NullSink, Sink};
use crate::recovery::RecoveryDetector;
use crate::state_machine;
use crate::store::Store;
use crate::types::{
    CheckpointTrigger, Details, Hook, HookState, StepContext, ValidationReceipt, ValidationResult, empty_details,
    task_path as task_path_for,
};

pub struct Manager {
    store: Arc<Store>,
    checkpointer: Arc<Checkpointer>,
    signer: Arc<dyn ReceiptSigner>,
    recovery: RecoveryDetector,
    config: ManagerConfig,
    repo_root: PathBuf,
    sink: Arc<dyn Sink>,
    interval_workers: Mutex<HashMap<String, IntervalCheckpointer>>,
}

impl Manager {
    pub fn new(
        store: Store,
        git_probe: Arc<dyn GitProbe>,
        signer: Arc<dyn ReceiptSigner>,
        config: ManagerConfig,
        repo_root: PathBuf,
    ) -> Self {
        let checkpointer = Arc::new(Checkpointer::new(git_probe, config.store.git_probe_timeout));
        let recovery = RecoveryDetector::new(config.stale_threshold, config.recent_checkpoint_window);
        Self {
            store: Arc::new(store),
            checkpointer,
            signer,
            recovery,
            config,
            repo_root,
            sink: Arc::new(NullSink),
            interval_workers: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn Sink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn checkpointer(&self) -> &Checkpointer {
        &self.checkpointer
    }

    fn task_path(&self, workspace_id: &str, task_id: &str) -> String {
        task_path_for(workspace_id, task_id)
    }

    fn max_history(&self) -> usize {
        self.config.store.max_history_events
    }

    fn max_checkpoints(&self) -> usize {
        self.config.store.effective_max_checkpoints()
    }

    pub fn create_hook(&self, ctx: &Context, workspace_id: &str, task_id: &str) -> Result<Hook> {
        let path = self.task_path(workspace_id, task_id);
        self.store.create(ctx, &path, workspace_id, task_id)
    }

    pub fn ready_hook(&self, ctx: &Context, workspace_id: &str, task_id: &str) -> Result<()> {
        let path = self.task_path(workspace_id, task_id);
        self.store.update(ctx, &path, |hook| {
            state_machine::transition(hook, HookState::StepPending, "hook_ready", empty_details(), Utc::now(), self.max_history())
        })
    }

    pub fn transition_step(
        &self,
        ctx: &Context,
        workspace_id: &str,
        task_id: &str,
        step_name: &str,
        step_index: i64,
    ) -> Result<()> {
        if step_name.is_empty() {
            return Err(HookError::EmptyStepName);
        }
        if step_index < 0 {
            return Err(HookError::NegativeStepIndex);
        }
        let path = self.task_path(workspace_id, task_id);
        let max_attempts = self.config.max_step_attempts;
        let max_history = self.max_history();
        self.store.update(ctx, &path, |hook| {
            let now = Utc::now();
            state_machine::transition(hook, HookState::StepRunning, "step_started", empty_details(), now, max_history)?;
            hook.current_step = Some(StepContext {
                step_name: step_name.to_string(),
                step_index,
                started_at: now,
                attempt: 1,
                max_attempts,
                working_on: String::new(),
                files_touched: vec![],
                last_output: String::new(),
                current_checkpoint_id: None,
            });
            Ok(())
        })
    }

    pub fn complete_step(
        &self,
        ctx: &Context,
        workspace_id: &str,
        task_id: &str,
        step_name: &str,
        files_changed: &[PathBuf],
    ) -> Result<()> {
        let path = self.task_path(workspace_id, task_id);
        let max_history = self.max_history();
        let max_checkpoints = self.max_checkpoints();
        let repo_root = self.repo_root.clone();
        let checkpointer = Arc::clone(&self.checkpointer);
        self.store.update(ctx, &path, |hook| {
            let current = hook.current_step.as_ref().ok_or(HookError::NoCurrentStep)?;
            if current.step_name != step_name {
                return Err(HookError::StepMismatch {
                    current: current.step_name.clone(),
                    expected: step_name.to_string(),
                });
            }
            let files = if files_changed.is_empty() {
                current.files_touched.clone()
            } else {
                files_changed.to_vec()
            };
            let now = Utc::now();
            state_machine::transition(hook, HookState::StepPending, "step_completed", empty_details(), now, max_history)?;
            checkpointer.create_checkpoint(
                ctx,
                hook,
                &repo_root,
                CheckpointTrigger::StepComplete,
                format!("completed step {step_name}"),
                &files,
                now,
                max_checkpoints,
            );
            Ok(())
        })
    }

    pub fn fail_step(&self, ctx: &Context, workspace_id: &str, task_id: &str, err: &str) -> Result<()> {
        let path = self.task_path(workspace_id, task_id);
        let max_history = self.max_history();
        self.store.update(ctx, &path, |hook| {
            let mut details: Details = empty_details();
            details.insert("error".to_string(), serde_json::Value::String(err.to_string()));
            state_machine::transition(hook, HookState::AwaitingHuman, "step_failed", details, Utc::now(), max_history)
        })
    }

    pub fn interrupt_step(&self, ctx: &Context, workspace_id: &str, task_id: &str) -> Result<()> {
        let path = self.task_path(workspace_id, task_id);
        let max_history = self.max_history();
        self.store.update(ctx, &path, |hook| {
            if hook.state.is_terminal() || hook.state == HookState::AwaitingHuman {
                return Ok(());
            }
            state_machine::transition(hook, HookState::AwaitingHuman, "user_interrupted", empty_details(), Utc::now(), max_history)
        })
    }

    pub fn complete_task(&self, ctx: &Context, workspace_id: &str, task_id: &str) -> Result<()> {
        let path = self.task_path(workspace_id, task_id);
        let max_history = self.max_history();
        let result = self.store.update(ctx, &path, |hook| {
            state_machine::transition(hook, HookState::Completed, "task_completed", empty_details(), Utc::now(), max_history)?;
            hook.current_step = None;
            Ok(())
        });
        self.stop_interval_checkpointing(workspace_id, task_id);
        result
    }

    pub fn fail_task(&self, ctx: &Context, workspace_id: &str, task_id: &str, err: &str) -> Result<()> {
        let path = self.task_path(workspace_id, task_id);
        let max_history = self.max_history();
        let result = self.store.update(ctx, &path, |hook| {
            let mut details: Details = empty_details();
            details.insert("error".to_string(), serde_json::Value::String(err.to_string()));
            state_machine::transition(hook, HookState::Failed, "task_failed", details, Utc::now(), max_history)
        });
        self.stop_interval_checkpointing(workspace_id, task_id);
        result
    }

    pub fn start_interval_checkpointing(&self, ctx: &Context, workspace_id: &str, task_id: &str) -> Result<()> {
        let path = self.task_path(workspace_id, task_id);
        if !self.store.exists(&path) {
            return Err(HookError::HookNotFound(path));
        }
        self.stop_interval_checkpointing(workspace_id, task_id);
        let _ = ctx;
        let worker = IntervalCheckpointer::start(
            Arc::clone(&self.store),
            Arc::clone(&self.checkpointer),
            path.clone(),
            self.repo_root.clone(),
            self.config.checkpoint_interval,
            Arc::clone(&self.sink),
        );
        self.interval_workers.lock().expect("interval registry mutex poisoned").insert(path, worker);
        Ok(())
    }

    /// Idempotent: stopping a task with no running worker is a no-op.
    pub fn stop_interval_checkpointing(&self, workspace_id: &str, task_id: &str) {
        let path = self.task_path(workspace_id, task_id);
        let worker = self.interval_workers.lock().expect("interval registry mutex poisoned").remove(&path);
        if let Some(worker) = worker {
            worker.stop();
        }
    }

    /// Builds and appends a receipt; signing failures are non-fatal and
    /// are logged rather than returned.
    pub fn create_validation_receipt(
        &self,
        ctx: &Context,
        workspace_id: &str,
        task_id: &str,
        step_name: &str,
        result: &ValidationResult,
    ) -> Result<ValidationReceipt> {
        let path = self.task_path(workspace_id, task_id);
        let signer = Arc::clone(&self.signer);
        let sink = Arc::clone(&self.sink);
        self.store.update(ctx, &path, |hook| {
            let receipt_id = format!("rcpt-{}", new_hex_suffix());
            let stdout_hash = hash_prefix(&result.stdout);
            let stderr_hash = hash_prefix(&result.stderr);
            let completed_at_unix = result.completed_at.timestamp();

            let mut receipt = ValidationReceipt {
                receipt_id: receipt_id.clone(),
                step_name: step_name.to_string(),
                command: result.command.clone(),
                exit_code: result.exit_code,
                started_at: result.started_at,
                completed_at: result.completed_at,
                duration: humantime::format_duration(Duration::from_millis(result.duration_ms)).to_string(),
                stdout_hash: stdout_hash.clone(),
                stderr_hash: stderr_hash.clone(),
                signature: None,
                key_path: None,
            };

            let task_index = hook_signer::hd_secp256k1::clamp_task_index(hook.receipts.len());
            let fields = ReceiptFields {
                receipt_id: &receipt_id,
                command: &receipt.command,
                exit_code: receipt.exit_code,
                stdout_hash: &stdout_hash,
                stderr_hash: &stderr_hash,
                completed_at_unix,
            };
            match signer.sign_receipt(&fields, task_index) {
                Ok(signed) => {
                    receipt.signature = Some(signed.signature_hex);
                    receipt.key_path = Some(signed.key_path);
                }
                Err(e) => sink.warn(&format!("failed to sign receipt {receipt_id}: {e}")),
            }

            hook.receipts.push(receipt.clone());
            Ok(receipt)
        })
    }

    pub fn verify_receipt(&self, receipt: &ValidationReceipt) -> Result<()> {
        let signature = receipt.signature.as_deref().unwrap_or("");
        let key_path = receipt.key_path.as_deref().unwrap_or("");
        let fields = ReceiptFields {
            receipt_id: &receipt.receipt_id,
            command: &receipt.command,
            exit_code: receipt.exit_code,
            stdout_hash: &receipt.stdout_hash,
            stderr_hash: &receipt.stderr_hash,
            completed_at_unix: receipt.completed_at.timestamp(),
        };
        self.signer.verify_receipt(&fields, signature, key_path).map_err(HookError::Signature)
    }

    pub fn detect_recovery_needed(&self, hook: &Hook) -> bool {
        self.recovery.detect_recovery_needed(hook)
    }

    pub fn diagnose_and_recommend(&self, ctx: &Context, workspace_id: &str, task_id: &str) -> Result<Hook> {
        let path = self.task_path(workspace_id, task_id);
        let recovery = &self.recovery;
        self.store.update(ctx, &path, |hook| {
            recovery.diagnose_and_recommend(hook);
            Ok(hook.clone())
        })
    }
}

fn hash_prefix(data: &str) -> String {
    if data.is_empty() {
        return String::new();
    }
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(data.as_bytes());
    hex::encode(&digest[..4])
}

fn new_hex_suffix() -> String {
    use rand::RngCore;
    let mut bytes = [0u8; 4];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::git::{FakeGitProbe, GitState};
    use crate::store::Store;
    use hook_signer::ed25519::NativeEd25519Signer;
    use hook_signer::keys::KeyStore;
    use tempfile::tempdir;

    fn manager(base: &std::path::Path) -> Manager {
        let store = Store::new(base.join("data"), StoreConfig::default());
        let git_probe: Arc<dyn GitProbe> = Arc::new(FakeGitProbe(GitState {
            branch: Some("main".into()),
            commit: Some("abc1234".into()),
            dirty: false,
        }));
        let signer: Arc<dyn ReceiptSigner> =
            Arc::new(NativeEd25519Signer::load(&KeyStore::new(base.join("keys"))).unwrap());
        Manager::new(store, git_probe, signer, ManagerConfig::default(), base.to_path_buf())
    }

    /// Writes a backdated `updated_at` straight to disk, bypassing
    /// `Store::update`/`save` (both of which stamp `now` on every write) so
    /// staleness can actually be simulated.
    fn backdate_updated_at(m: &Manager, ctx: &Context, task_path: &str, minutes: i64) {
        let mut hook = m.store.get(ctx, task_path).unwrap();
        hook.updated_at = Utc::now() - chrono::Duration::minutes(minutes);
        let hook_path = m.store.task_dir(task_path).join("hook.json");
        crate::atomic::atomic_write_json(&hook_path, &hook, &NullSink).unwrap();
    }

    #[test]
    fn happy_path_two_steps_then_complete() {
        let dir = tempdir().unwrap();
        let m = manager(dir.path());
        let ctx = Context::background();
        m.create_hook(&ctx, "w", "t1").unwrap();
        m.ready_hook(&ctx, "w", "t1").unwrap();
        m.transition_step(&ctx, "w", "t1", "analyze", 0).unwrap();
        m.complete_step(&ctx, "w", "t1", "analyze", &[PathBuf::from("a.go")]).unwrap();
        m.transition_step(&ctx, "w", "t1", "plan", 1).unwrap();
        m.complete_step(&ctx, "w", "t1", "plan", &[PathBuf::from("plan.md")]).unwrap();
        m.complete_task(&ctx, "w", "t1").unwrap();

        let hook = m.store.get(&ctx, &m.task_path("w", "t1")).unwrap();
        assert_eq!(hook.state, HookState::Completed);
        assert!(hook.current_step.is_none());
        assert_eq!(hook.checkpoints.len(), 2);
        assert!(hook.checkpoints.iter().all(|c| c.trigger == CheckpointTrigger::StepComplete));
        assert_eq!(hook.history.len(), 6);
    }

    #[test]
    fn crash_and_recover_at_implement_recommends_manual() {
        let dir = tempdir().unwrap();
        let m = manager(dir.path());
        let ctx = Context::background();
        m.create_hook(&ctx, "w", "t1").unwrap();
        m.ready_hook(&ctx, "w", "t1").unwrap();
        m.transition_step(&ctx, "w", "t1", "implement", 2).unwrap();

        let path = m.task_path("w", "t1");
        backdate_updated_at(&m, &ctx, &path, 10);

        let hook = m.store.get(&ctx, &path).unwrap();
        assert!(m.detect_recovery_needed(&hook));

        let diagnosed = m.diagnose_and_recommend(&ctx, "w", "t1").unwrap();
        let recovery = diagnosed.recovery.unwrap();
        assert_eq!(recovery.crash_type, crate::types::CrashType::StepInterrupted);
        assert_eq!(recovery.recommended_action, crate::types::RecommendedAction::Manual);
    }

    #[test]
    fn retry_from_checkpoint_when_a_recent_checkpoint_exists() {
        let dir = tempdir().unwrap();
        let m = manager(dir.path());
        let ctx = Context::background();
        m.create_hook(&ctx, "w", "t1").unwrap();
        m.ready_hook(&ctx, "w", "t1").unwrap();
        m.transition_step(&ctx, "w", "t1", "implement", 2).unwrap();

        let path = m.task_path("w", "t1");
        let checkpoint_id = m
            .store
            .update(&ctx, &path, |h| {
                let cp = m.checkpointer.create_checkpoint(
                    &ctx,
                    h,
                    &m.repo_root,
                    CheckpointTrigger::GitCommit,
                    "pre-crash commit",
                    &[],
                    Utc::now() - chrono::Duration::minutes(5),
                    m.max_checkpoints(),
                );
                Ok(cp.checkpoint_id)
            })
            .unwrap();

        backdate_updated_at(&m, &ctx, &path, 10);

        let diagnosed = m.diagnose_and_recommend(&ctx, "w", "t1").unwrap();
        let recovery = diagnosed.recovery.unwrap();
        assert_eq!(recovery.recommended_action, crate::types::RecommendedAction::RetryFromCheckpoint);
        assert_eq!(recovery.last_checkpoint_id.as_deref(), Some(checkpoint_id.as_str()));
    }

    #[test]
    fn signed_receipt_roundtrip_and_tamper_detection() {
        let dir = tempdir().unwrap();
        let m = manager(dir.path());
        let ctx = Context::background();
        m.create_hook(&ctx, "w", "t1").unwrap();

        let result = ValidationResult {
            command: "go test".to_string(),
            exit_code: 0,
            stdout: "ok".to_string(),
            stderr: String::new(),
            started_at: Utc::now(),
            completed_at: chrono::DateTime::from_timestamp(1_737_129_933, 0).unwrap(),
            duration_ms: 1500,
            metadata: Default::default(),
        };
        let receipt = m.create_validation_receipt(&ctx, "w", "t1", "test", &result).unwrap();
        assert!(receipt.signature.is_some());
        m.verify_receipt(&receipt).unwrap();

        let mut tampered = receipt.clone();
        tampered.exit_code = 1;
        assert!(m.verify_receipt(&tampered).is_err());
    }

    #[test]
    fn complete_task_stops_interval_checkpointer_on_all_exit_paths() {
        let dir = tempdir().unwrap();
        let m = manager(dir.path());
        let ctx = Context::background();
        m.create_hook(&ctx, "w", "t1").unwrap();
        m.ready_hook(&ctx, "w", "t1").unwrap();
        m.transition_step(&ctx, "w", "t1", "implement", 0).unwrap();
        m.start_interval_checkpointing(&ctx, "w", "t1").unwrap();
        assert!(m.interval_workers.lock().unwrap().contains_key(&m.task_path("w", "t1")));
        m.complete_task(&ctx, "w", "t1").unwrap();
        assert!(!m.interval_workers.lock().unwrap().contains_key(&m.task_path("w", "t1")));
    }
}
