//! Cancellation and concurrent-close guard.
//!
//! A [`CallGuard`] serializes the native calls made through one handle and remembers the token
//! of the call in flight, so another task can interrupt exactly that call. Closing a handle
//! interrupts its running call and then waits on the same lock before the native resource is
//! released; memory is never freed under a running call.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard};

use crate::engine::QueryToken;

#[derive(Debug, Default)]
pub struct CallGuard {
    in_call: AsyncMutex<()>,
    running: Mutex<Option<QueryToken>>,
    interrupt_requested: AtomicBool,
}

impl CallGuard {
    fn running(&self) -> MutexGuard<'_, Option<QueryToken>> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait for the handle to be free and claim it for the call identified by `token`.
    ///
    /// Callers check the handle's closed flag after this returns: a close that started earlier
    /// is then always visible, and a close that starts later sees `token` as running.
    pub async fn enter(&self, token: QueryToken) -> CallPermit<'_> {
        let permit = self.in_call.lock().await;
        self.interrupt_requested.store(false, Ordering::SeqCst);
        *self.running() = Some(token);
        CallPermit {
            guard: self,
            _permit: permit,
        }
    }

    /// Flag the running call as interrupted and return its token. Idle handles return `None`
    /// and keep no state, so a cancel after completion has no effect.
    pub fn request_interrupt(&self) -> Option<QueryToken> {
        let running = self.running();
        let token = (*running)?;
        self.interrupt_requested.store(true, Ordering::SeqCst);
        Some(token)
    }

    /// Whether the running call was asked to stop since it entered.
    #[must_use]
    pub fn interrupt_requested(&self) -> bool {
        self.interrupt_requested.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn running_token(&self) -> Option<QueryToken> {
        *self.running()
    }

    /// Wait until no call is in flight. If one is, `interrupt` is called with its token first.
    pub async fn quiesce(&self, interrupt: impl FnOnce(QueryToken)) {
        if self.in_call.try_lock().is_ok() {
            return;
        }
        if let Some(token) = self.request_interrupt() {
            interrupt(token);
        }
        drop(self.in_call.lock().await);
    }
}

/// Exclusive right to make one native call through a handle.
pub struct CallPermit<'a> {
    guard: &'a CallGuard,
    _permit: AsyncMutexGuard<'a, ()>,
}

impl CallPermit<'_> {
    /// Whether someone asked this call to stop before or while it ran.
    #[must_use]
    pub fn interrupted(&self) -> bool {
        self.guard.interrupt_requested()
    }
}

impl Drop for CallPermit<'_> {
    fn drop(&mut self) {
        *self.guard.running() = None;
    }
}
