//! Classifies stale hooks and recommends a safe continuation point. Never
//! refuses to produce a recommendation — worst case is `manual`.

use std::time::Duration;

use chrono::Utc;

use crate::types::{CrashType, Hook, HookState, RecommendedAction, RecoveryContext, is_idempotent_step};

#[derive(Debug, Clone)]
pub struct RecoveryDetector {
    pub stale_threshold: Duration,
    pub recent_checkpoint_window: Duration,
}

impl RecoveryDetector {
    pub fn new(stale_threshold: Duration, recent_checkpoint_window: Duration) -> Self {
        Self { stale_threshold, recent_checkpoint_window }
    }

    pub fn detect_recovery_needed(&self, hook: &Hook) -> bool {
        if hook.state.is_terminal() {
            return false;
        }
        let age = Utc::now().signed_duration_since(hook.updated_at);
        age.to_std().map(|a| a > self.stale_threshold).unwrap_or(false)
    }

    /// Ensures `hook.recovery` is populated with a diagnosis and a
    /// first-match-wins recommendation.
    pub fn diagnose_and_recommend(&self, hook: &mut Hook) {
        let now = Utc::now();
        let last_known_state = hook.state;
        let was_validating = last_known_state == HookState::StepValidating;
        let crash_type = match last_known_state {
            HookState::StepValidating => CrashType::ValidationInterrupted,
            HookState::StepRunning => CrashType::StepInterrupted,
            _ => CrashType::Unknown,
        };
        let last_checkpoint_id = hook.checkpoints.last().map(|c| c.checkpoint_id.clone());

        let recent_checkpoint = hook.checkpoints.iter().rev().find(|c| {
            now.signed_duration_since(c.created_at)
                .to_std()
                .map(|age| age <= self.recent_checkpoint_window)
                .unwrap_or(false)
        });

        let (recommended_action, reason) = if let Some(cp) = recent_checkpoint {
            (
                RecommendedAction::RetryFromCheckpoint,
                format!("recent checkpoint available: {}", cp.description),
            )
        } else if was_validating {
            (RecommendedAction::RetryStep, "validation is idempotent".to_string())
        } else if hook
            .current_step
            .as_ref()
            .is_some_and(|s| is_idempotent_step(&s.step_name))
        {
            (RecommendedAction::RetryStep, "step belongs to the idempotent family".to_string())
        } else if hook.current_step.is_some() {
            (RecommendedAction::Manual, "step modifies state".to_string())
        } else {
            (RecommendedAction::Manual, "unable to determine safe recovery action".to_string())
        };

        let partial_output = hook
            .current_step
            .as_ref()
            .map(|s| s.last_output.clone())
            .filter(|s| !s.is_empty());
        let validation_cmd = hook.current_step.as_ref().map(|s| s.working_on.clone()).filter(|s| !s.is_empty());

        hook.recovery = Some(RecoveryContext {
            detected_at: now,
            last_known_state,
            crash_type,
            was_validating,
            validation_cmd,
            partial_output,
            last_checkpoint_id,
            recommended_action,
            reason,
        });
    }
}
