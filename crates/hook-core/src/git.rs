//! Git state probing for checkpoints. `git` itself is an external
//! collaborator; the core only depends on the [`GitProbe`] contract so a
//! fake implementation can stand in for tests.

use std::env;
use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use crate::context::Context;

/// Snapshot of repository state for a checkpoint. Each field is `None`/
/// `false` ("unknown") if its probing command failed; a probe failure is
/// never a fatal checkpoint error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GitState {
    pub branch: Option<String>,
    pub commit: Option<String>,
    pub dirty: bool,
}

pub trait GitProbe: Send + Sync {
    /// Runs the three required commands under a single derived deadline.
    /// Must respect the context's deadline; a context without one gets an
    /// implementation-chosen default.
    fn probe(&self, ctx: &Context, working_dir: &Path) -> GitState;
}

/// Reads `HOOK_GIT_BIN` for an override, falling back to `"git"` on the
/// `PATH`. Lets tests substitute a fake script without touching `PATH`.
fn git_program() -> String {
    env::var("HOOK_GIT_BIN").unwrap_or_else(|_| "git".to_string())
}

fn run(program: &str, args: &[&str], working_dir: &Path, deadline: Instant) -> Option<String> {
    let mut child = Command::new(program)
        .args(args)
        .current_dir(working_dir)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .ok()?;

    // Drained on its own thread so a command whose output exceeds the
    // pipe buffer can't stall the child (and this poll loop) until it
    // hits the deadline.
    let stdout_pipe = child.stdout.take();
    let reader = std::thread::spawn(move || {
        let mut buf = String::new();
        if let Some(mut out) = stdout_pipe {
            let _ = out.read_to_string(&mut buf);
        }
        buf
    });

    loop {
        if let Ok(Some(status)) = child.try_wait() {
            let stdout = reader.join().unwrap_or_default();
            return if status.success() {
                Some(stdout.trim().to_string())
            } else {
                None
            };
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            let _ = reader.join();
            return None;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
}

/// Shells out to the real `git` binary for `rev-parse --abbrev-ref HEAD`,
/// `rev-parse --short HEAD`, and `status --porcelain`, each independently
/// downgraded to "unknown" on failure, all under one 5s deadline derived
/// from `ctx`.
#[derive(Debug, Default, Clone, Copy)]
pub struct CommandGitProbe;

impl GitProbe for CommandGitProbe {
    fn probe(&self, ctx: &Context, working_dir: &Path) -> GitState {
        let timeout = Duration::from_secs(5);
        let deadline = ctx.deadline().map_or_else(|| Instant::now() + timeout, |d| d.min(Instant::now() + timeout));
        let program = git_program();

        let branch = run(&program, &["rev-parse", "--abbrev-ref", "HEAD"], working_dir, deadline);
        let commit = run(&program, &["rev-parse", "--short", "HEAD"], working_dir, deadline);
        let status = run(&program, &["status", "--porcelain"], working_dir, deadline);
        let dirty = status.map(|s| !s.trim().is_empty()).unwrap_or(false);

        GitState { branch, commit, dirty }
    }
}

/// A fake probe for tests, returning a fixed state without shelling out.
#[derive(Debug, Clone, Default)]
pub struct FakeGitProbe(pub GitState);

impl GitProbe for FakeGitProbe {
    fn probe(&self, _ctx: &Context, _working_dir: &Path) -> GitState {
        self.0.clone()
    }
}
