use std::path::PathBuf;

use crate::types::HookState;

/// The single tagged error value every public `Store`/`Manager` method
/// returns. Invalid-transition errors carry both states; I/O errors wrap
/// the underlying cause with the path that was being operated on.
#[derive(Debug, thiserror::Error)]
pub enum HookError {
    #[error("no hook exists at {0}")]
    HookNotFound(String),

    #[error("a hook already exists at {0}")]
    HookExists(String),

    #[error("hook document at {path} failed to parse: {source}")]
    InvalidHook {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("hook document at {path} has schema version {found}, below the minimum supported {minimum}")]
    UnsupportedSchema { path: PathBuf, found: String, minimum: String },

    #[error("invalid transition from {from:?} to {to:?}")]
    InvalidTransition { from: HookState, to: HookState },

    #[error("hook is in terminal state {0:?}; no further transitions are possible")]
    TerminalState(HookState),

    #[error("no current step is set")]
    NoCurrentStep,

    #[error("step mismatch: current step is {current:?}, but {expected} was completed")]
    StepMismatch { current: String, expected: String },

    #[error("step name must not be empty")]
    EmptyStepName,

    #[error("step index must not be negative")]
    NegativeStepIndex,

    #[error("timed out waiting for lock on {path} after {elapsed_ms}ms")]
    LockTimeout { path: PathBuf, elapsed_ms: u64 },

    #[error("operation canceled")]
    Canceled,

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("signature error: {0}")]
    Signature(#[from] hook_signer::SignerError),
}

impl HookError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        HookError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, HookError>;
