//! Cancellation and deadline propagation, threaded through every public
//! operation that may block (in practice, only [`crate::lock::FileLock`]
//! blocks; everything else accepts a context so cancellation composes
//! uniformly).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

#[derive(Clone)]
struct Inner {
    canceled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

/// A cooperative cancellation token with an optional deadline. Cloning a
/// `Context` shares the same cancellation flag; canceling any clone
/// cancels all of them.
#[derive(Clone)]
pub struct Context {
    inner: Inner,
}

impl Context {
    /// A context that never cancels and never times out.
    pub fn background() -> Self {
        Self {
            inner: Inner {
                canceled: Arc::new(AtomicBool::new(false)),
                deadline: None,
            },
        }
    }

    /// Derives a context that additionally expires after `timeout`.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        let deadline = match self.inner.deadline {
            Some(existing) if existing < candidate => Some(existing),
            _ => Some(candidate),
        };
        Self {
            inner: Inner {
                canceled: Arc::clone(&self.inner.canceled),
                deadline,
            },
        }
    }

    /// A handle that can cancel this context (and every clone derived
    /// from it) from another thread.
    pub fn canceler(&self) -> Canceler {
        Canceler {
            canceled: Arc::clone(&self.inner.canceled),
        }
    }

    pub fn is_canceled(&self) -> bool {
        self.inner.canceled.load(Ordering::SeqCst)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    pub fn is_expired(&self) -> bool {
        self.inner.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// True if the context is canceled or past its deadline.
    pub fn is_done(&self) -> bool {
        self.is_canceled() || self.is_expired()
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}

/// A handle that cancels the [`Context`] it was derived from.
#[derive(Clone)]
pub struct Canceler {
    canceled: Arc<AtomicBool>,
}

impl Canceler {
    pub fn cancel(&self) {
        self.canceled.store(true, Ordering::SeqCst);
    }
}
