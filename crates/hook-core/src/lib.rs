//! # hook-core
//!
//! A crash-recovery persistence layer for long-running, multi-step tasks.
//!
//! Each task gets a single JSON "hook" document recording its state
//! machine position, step context, an append-only history log, periodic
//! checkpoints, and signed validation receipts. Every write goes through
//! a cross-process file lock and an atomic write-temp-then-rename
//! protocol, so a process crash or a competing writer can never leave
//! the document partially written or torn between two states.
//!
//! ## Features
//!
//! - **Durable state machine** — nine states, an exhaustive transition
//!   table, and two universal "escape hatch" transitions
//!   (`-> recovering`, `-> abandoned`) reachable from any non-terminal
//!   state.
//! - **Crash recovery** — a stale hook (quiet longer than a threshold)
//!   is diagnosed and given a first-match-wins recommendation: retry
//!   from the most recent checkpoint, retry the idempotent step, or
//!   fall back to manual intervention.
//! - **Periodic checkpointing** — a background worker snapshots step
//!   identity, file contents, and git state on an interval, without
//!   ever holding an in-memory copy of the hook across ticks.
//! - **Signed validation receipts** — pluggable [`hook_signer::ReceiptSigner`]
//!   backends (native Ed25519 or HD secp256k1) attest that a validation
//!   command ran, with a byte-stable canonical signing payload.
//!
//! ## Pipeline
//!
//! The core flow is **create → ready → (transition → complete)\* →
//! complete/fail**, with checkpoints and receipts layered on top:
//!
//! 1. [`manager::Manager::create_hook`] initializes a hook in
//!    `initializing`.
//! 2. [`manager::Manager::ready_hook`] moves it to `step_pending`.
//! 3. [`manager::Manager::transition_step`] /
//!    [`manager::Manager::complete_step`] drive the per-step loop,
//!    each completion creating a checkpoint.
//! 4. [`manager::Manager::complete_task`] / [`manager::Manager::fail_task`]
//!    reach a terminal state and stop any running interval checkpointer.
//! 5. On restart, [`recovery::RecoveryDetector::detect_recovery_needed`]
//!    and [`recovery::RecoveryDetector::diagnose_and_recommend`] decide
//!    how to resume a hook that went quiet mid-task.
//!
//! ## Key Types
//!
//! - [`types::Hook`] — the root persisted document.
//! - [`store::Store`] — locked read/modify/write access to hook documents.
//! - [`manager::Manager`] — orchestrates the store, state machine,
//!   checkpointer, interval worker, recovery detector, and signer.
//! - [`error::HookError`] — the single tagged error every public method
//!   returns.
//!
//! ## Modules
//!
//! - [`manager`] — task lifecycle orchestration.
//! - [`store`] — locked persistence for the hook document.
//! - [`state_machine`] — the transition table and history log.
//! - [`checkpoint`] — checkpoint creation and file snapshotting.
//! - [`interval`] — background periodic checkpointing.
//! - [`recovery`] — stale-hook diagnosis and recommendation.
//! - [`lock`] — cross-process advisory file locking.
//! - [`atomic`] — write-temp-then-rename-then-fsync file writes.
//! - [`git`] — git state probing behind a fake-able trait.
//! - [`markdown`] — the human-readable rendering contract.
//! - [`config`] — constructor-level tuning knobs.
//! - [`context`] — cooperative cancellation and deadlines.
//! - [`log`] — the structured logging sink trait.
//! - [`types`] — the persisted document model.
//! - [`error`] — [`error::HookError`].
//!
//! ## Stability
//!
//! Pre-1.0; the on-disk schema is versioned via [`types::CURRENT_SCHEMA_VERSION`],
//! read through [`store::migrate_hook_value`] against a
//! [`store::MINIMUM_SUPPORTED_SCHEMA`] floor to allow future migration.

pub mod atomic;
pub mod checkpoint;
pub mod config;
pub mod context;
pub mod error;
pub mod git;
pub mod interval;
pub mod lock;
pub mod log;
pub mod manager;
pub mod markdown;
pub mod recovery;
pub mod state_machine;
pub mod store;
pub mod types;

pub use error::{HookError, Result};
pub use manager::Manager;
pub use store::Store;
pub use types::{Hook, HookState};


/// Stress tests for concurrent operations.
#[cfg(test)]
mod stress_tests;
