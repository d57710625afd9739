//! The hook state machine: an exhaustive transition graph plus the
//! append-only history log every transition writes to.

use chrono::{DateTime, Utc};

use crate::error::{HookError, Result};
use crate::types::{Details, Hook, HookEvent, HookState};

/// Returns whether `(from, to)` is a permitted transition, including the
/// two universal transitions (`-> recovering`, `-> abandoned`) that are
/// valid from any non-terminal state.
pub fn is_valid_transition(from: HookState, to: HookState) -> bool {
    use HookState::*;
    if from.is_terminal() {
        return false;
    }
    if matches!(to, Recovering | Abandoned) {
        return true;
    }
    matches!(
        (from, to),
        (Initializing, StepPending)
            | (Initializing, Failed)
            | (StepPending, StepRunning)
            | (StepPending, Completed)
            | (StepRunning, StepValidating)
            | (StepRunning, StepPending)
            | (StepRunning, AwaitingHuman)
            | (StepRunning, Failed)
            | (StepValidating, StepPending)
            | (StepValidating, AwaitingHuman)
            | (StepValidating, Failed)
            | (AwaitingHuman, StepPending)
            | (AwaitingHuman, StepRunning)
            | (Recovering, StepPending)
            | (Recovering, StepRunning)
            | (Recovering, AwaitingHuman)
            | (Recovering, Failed)
    )
}

/// Validates and applies `from -> to`, appending the resulting event to
/// `hook.history` and bumping `updated_at`. Trims `history` to
/// `max_history_events` afterward.
pub fn transition(
    hook: &mut Hook,
    to: HookState,
    trigger: impl Into<String>,
    details: Details,
    now: DateTime<Utc>,
    max_history_events: usize,
) -> Result<()> {
    let from = hook.state;
    if from.is_terminal() {
        return Err(HookError::TerminalState(from));
    }
    if !is_valid_transition(from, to) {
        return Err(HookError::InvalidTransition { from, to });
    }
    let step_name = hook.current_step.as_ref().map(|s| s.step_name.clone());
    hook.history.push(HookEvent {
        timestamp: now,
        from_state: from,
        to_state: to,
        trigger: trigger.into(),
        step_name,
        details,
    });
    hook.state = to;
    hook.updated_at = now;
    trim_history(hook, max_history_events);
    Ok(())
}

/// Records a non-transitioning annotation (`from == to == hook.state`),
/// e.g. `checkpoint_created`.
pub fn append_event(
    hook: &mut Hook,
    trigger: impl Into<String>,
    details: Details,
    now: DateTime<Utc>,
    max_history_events: usize,
) {
    let state = hook.state;
    let step_name = hook.current_step.as_ref().map(|s| s.step_name.clone());
    hook.history.push(HookEvent {
        timestamp: now,
        from_state: state,
        to_state: state,
        trigger: trigger.into(),
        step_name,
        details,
    });
    hook.updated_at = now;
    trim_history(hook, max_history_events);
}

fn trim_history(hook: &mut Hook, max_history_events: usize) {
    if hook.history.len() > max_history_events {
        let excess = hook.history.len() - max_history_events;
        hook.history.drain(0..excess);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::empty_details;
    use chrono::Utc;

    fn hook() -> Hook {
        Hook::new("t1", "w1", Utc::now())
    }

    #[test]
    fn permits_the_documented_graph() {
        use HookState::*;
        let cases = [
            (Initializing, StepPending),
            (Initializing, Failed),
            (StepPending, StepRunning),
            (StepPending, Completed),
            (StepPending, Abandoned),
            (StepRunning, StepValidating),
            (StepRunning, StepPending),
            (StepRunning, AwaitingHuman),
            (StepRunning, Failed),
            (StepRunning, Abandoned),
            (StepValidating, StepPending),
            (StepValidating, AwaitingHuman),
            (StepValidating, Failed),
            (AwaitingHuman, StepPending),
            (AwaitingHuman, StepRunning),
            (AwaitingHuman, Abandoned),
            (Recovering, StepPending),
            (Recovering, StepRunning),
            (Recovering, AwaitingHuman),
            (Recovering, Failed),
        ];
        for (from, to) in cases {
            assert!(is_valid_transition(from, to), "{from:?} -> {to:?} should be valid");
        }
    }

    #[test]
    fn universal_transitions_apply_from_every_non_terminal_state() {
        use HookState::*;
        for state in [Initializing, StepPending, StepRunning, StepValidating, AwaitingHuman, Recovering] {
            assert!(is_valid_transition(state, Recovering));
            assert!(is_valid_transition(state, Abandoned));
        }
    }

    #[test]
    fn terminal_states_reject_everything() {
        use HookState::*;
        for terminal in [Completed, Failed, Abandoned] {
            for to in [Initializing, StepPending, StepRunning, StepValidating, AwaitingHuman, Recovering, Completed, Failed, Abandoned] {
                assert!(!is_valid_transition(terminal, to));
            }
        }
    }

    #[test]
    fn transition_appends_matching_event() {
        let mut hook = hook();
        let now = Utc::now();
        transition(&mut hook, HookState::StepPending, "hook_ready", empty_details(), now, 200).unwrap();
        assert_eq!(hook.state, HookState::StepPending);
        let event = hook.history.last().unwrap();
        assert_eq!(event.from_state, HookState::Initializing);
        assert_eq!(event.to_state, HookState::StepPending);
        assert_eq!(event.trigger, "hook_ready");
        assert_eq!(hook.updated_at, now);
    }

    #[test]
    fn transition_from_terminal_fails() {
        let mut hook = hook();
        hook.state = HookState::Completed;
        let err = transition(&mut hook, HookState::StepPending, "x", empty_details(), Utc::now(), 200).unwrap_err();
        assert!(matches!(err, HookError::TerminalState(HookState::Completed)));
    }

    #[test]
    fn invalid_pair_fails() {
        let mut hook = hook();
        let err = transition(&mut hook, HookState::Completed, "x", empty_details(), Utc::now(), 200).unwrap_err();
        assert!(matches!(err, HookError::InvalidTransition { .. }));
    }

    #[test]
    fn history_is_trimmed_to_the_cap() {
        let mut hook = hook();
        hook.state = HookState::StepPending;
        for _ in 0..5 {
            append_event(&mut hook, "tick", empty_details(), Utc::now(), 3);
        }
        assert_eq!(hook.history.len(), 3);
    }

    #[test]
    fn append_event_does_not_change_state() {
        let mut hook = hook();
        let before = hook.state;
        append_event(&mut hook, "checkpoint_created", empty_details(), Utc::now(), 200);
        assert_eq!(hook.state, before);
        let event = hook.history.last().unwrap();
        assert_eq!(event.from_state, event.to_state);
    }
}
