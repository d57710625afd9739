//! Stress tests for concurrent access to the store, lock, and interval
//! checkpointer.
//!
//! These verify behavior under contention, not just the happy path:
//! - Many threads racing to create/update the same hook
//! - Rapid lock acquire/release cycles
//! - A large history/checkpoint volume surviving disk roundtrips

#[cfg(test)]
mod tests {
    use crate::config::StoreConfig;
    use crate::context::Context;
    use crate::lock::FileLock;
    use crate::log::NullSink;
    use crate::store::Store;
    use crate::types::HookState;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn stress_lock_acquire_release_cycle() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("hook.json");
        for i in 0..200 {
            let mut lock = FileLock::new(&target);
            lock.lock_with_context(&Context::background(), Duration::from_secs(1), Duration::from_millis(100), &NullSink)
                .unwrap_or_else(|_| panic!("failed to acquire lock on iteration {i}"));
            lock.unlock();
        }
    }

    #[test]
    fn stress_many_threads_updating_one_hook_preserve_history_length() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(Store::new(dir.path(), StoreConfig::default()));
        let ctx = Context::background();
        store.create(&ctx, "workspaces/w/tasks/t1", "w", "t1").unwrap();
        store
            .update(&ctx, "workspaces/w/tasks/t1", |h| {
                h.state = HookState::StepPending;
                Ok(())
            })
            .unwrap();

        let threads = 16;
        let per_thread = 10;
        let mut handles = Vec::new();
        for _ in 0..threads {
            let store = Arc::clone(&store);
            handles.push(thread::spawn(move || {
                let ctx = Context::background();
                for _ in 0..per_thread {
                    store
                        .update(&ctx, "workspaces/w/tasks/t1", |h| {
                            crate::state_machine::append_event(h, "tick", crate::types::empty_details(), chrono::Utc::now(), 200);
                            Ok(())
                        })
                        .unwrap();
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        let hook = store.get(&ctx, "workspaces/w/tasks/t1").unwrap();
        assert_eq!(hook.history.len(), (threads * per_thread).min(200));
    }

    #[test]
    fn stress_large_history_survives_disk_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = Store::new(dir.path(), StoreConfig::default());
        let ctx = Context::background();
        store.create(&ctx, "workspaces/w/tasks/t1", "w", "t1").unwrap();
        store
            .update(&ctx, "workspaces/w/tasks/t1", |h| {
                h.state = HookState::StepPending;
                for i in 0..1000 {
                    crate::state_machine::append_event(
                        h,
                        format!("tick-{i}"),
                        crate::types::empty_details(),
                        chrono::Utc::now(),
                        200,
                    );
                }
                Ok(())
            })
            .unwrap();

        let loaded = store.get(&ctx, "workspaces/w/tasks/t1").unwrap();
        assert_eq!(loaded.history.len(), 200);
        assert_eq!(loaded.history.last().unwrap().trigger, "tick-999");
    }

    #[test]
    fn stress_checkpoint_creation_under_concurrency() {
        use crate::checkpoint::Checkpointer;
        use crate::git::{FakeGitProbe, GitState};
        use crate::types::CheckpointTrigger;

        let dir = TempDir::new().unwrap();
        let store = Arc::new(Store::new(dir.path(), StoreConfig::default()));
        let ctx = Context::background();
        store.create(&ctx, "workspaces/w/tasks/t1", "w", "t1").unwrap();
        store
            .update(&ctx, "workspaces/w/tasks/t1", |h| {
                h.state = HookState::StepRunning;
                Ok(())
            })
            .unwrap();

        let checkpointer = Arc::new(Checkpointer::new(Arc::new(FakeGitProbe(GitState::default())), Duration::from_secs(5)));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            let checkpointer = Arc::clone(&checkpointer);
            handles.push(thread::spawn(move || {
                let ctx = Context::background();
                for _ in 0..5 {
                    store
                        .update(&ctx, "workspaces/w/tasks/t1", |h| {
                            checkpointer.create_checkpoint(
                                &ctx,
                                h,
                                std::path::Path::new("."),
                                CheckpointTrigger::Manual,
                                "stress",
                                &[],
                                chrono::Utc::now(),
                                50,
                            );
                            Ok(())
                        })
                        .unwrap();
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        let hook = store.get(&ctx, "workspaces/w/tasks/t1").unwrap();
        assert_eq!(hook.checkpoints.len(), 40);
    }

    #[test]
    fn stress_sequential_state_transitions_persist_every_step() {
        let dir = TempDir::new().unwrap();
        let store = Store::new(dir.path(), StoreConfig::default());
        let ctx = Context::background();
        store.create(&ctx, "workspaces/w/tasks/t1", "w", "t1").unwrap();
        store
            .update(&ctx, "workspaces/w/tasks/t1", |h| {
                h.state = HookState::StepPending;
                Ok(())
            })
            .unwrap();

        for i in 0..30 {
            store
                .update(&ctx, "workspaces/w/tasks/t1", |h| {
                    crate::state_machine::transition(h, HookState::StepRunning, "start", crate::types::empty_details(), chrono::Utc::now(), 200)?;
                    crate::state_machine::transition(h, HookState::StepPending, "done", crate::types::empty_details(), chrono::Utc::now(), 200)?;
                    let _ = i;
                    Ok(())
                })
                .unwrap();
        }

        let hook = store.get(&ctx, "workspaces/w/tasks/t1").unwrap();
        assert_eq!(hook.state, HookState::StepPending);
        assert_eq!(hook.history.len(), 60);
    }
}
