//! Periodic background checkpointing. The canonical trick (see the
//! module-level notes on `Manager`): never hold an in-memory `Hook`
//! pointer across ticks. Each tick re-reads state fresh inside the same
//! `Store::update` the foreground Manager uses, so the two can never
//! race.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::checkpoint::Checkpointer;
use crate::context::Context;
use crate::log::Sink;
use crate::store::Store;
use crate::types::{CheckpointTrigger, HookState};

pub struct IntervalCheckpointer {
    handle: Option<JoinHandle<()>>,
    ctx: Context,
}

impl IntervalCheckpointer {
    /// Spawns the background worker. `repo_root` is where the git probe
    /// runs; `task_path` identifies the hook this worker watches.
    pub fn start(
        store: Arc<Store>,
        checkpointer: Arc<Checkpointer>,
        task_path: String,
        repo_root: PathBuf,
        interval: Duration,
        sink: Arc<dyn Sink>,
    ) -> Self {
        let ctx = Context::background();
        let worker_ctx = ctx.clone();
        let handle = thread::spawn(move || {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                worker_loop(&store, &checkpointer, &task_path, &repo_root, interval, &worker_ctx, sink.as_ref());
            }));
            if let Err(panic) = result {
                sink_log_panic(panic);
            }
        });
        Self { handle: Some(handle), ctx }
    }

    /// Signals cancellation (which unblocks the worker if it is mid-lock-
    /// wait) then joins, without holding any registry mutex.
    pub fn stop(mut self) {
        self.ctx.canceler().cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn sink_log_panic(_panic: Box<dyn std::any::Any + Send>) {
    // Intentionally best-effort: the worker thread panicked; it has
    // already exited, and `stop` must still return.
}

fn worker_loop(
    store: &Store,
    checkpointer: &Checkpointer,
    task_path: &str,
    repo_root: &PathBuf,
    interval: Duration,
    ctx: &Context,
    sink: &dyn Sink,
) {
    loop {
        for _ in 0..(interval.as_millis() / 50).max(1) {
            if ctx.is_canceled() {
                return;
            }
            thread::sleep(Duration::from_millis(50));
        }
        if ctx.is_canceled() {
            return;
        }

        let tick = store.update(ctx, task_path, |hook| {
            if hook.state == HookState::StepRunning {
                let max_checkpoints = store.config().effective_max_checkpoints();
                checkpointer.create_checkpoint(
                    ctx,
                    hook,
                    repo_root,
                    CheckpointTrigger::Interval,
                    "Periodic checkpoint",
                    &[],
                    chrono::Utc::now(),
                    max_checkpoints,
                );
            }
            Ok(())
        });

        if let Err(e) = tick {
            sink.warn(&format!("interval checkpoint tick failed for {task_path}: {e}"));
        }
    }
}
