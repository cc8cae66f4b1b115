use std::sync::{Mutex, PoisonError};

use rusqlite::InterruptHandle;

use crate::engine::QueryToken;
use crate::error::BridgeError;

#[derive(Default)]
struct Slots {
    running: Option<QueryToken>,
    requested: Option<QueryToken>,
}

/// Token-scoped interrupts for one worker connection.
///
/// An interrupt for the running token goes straight to SQLite. Every interrupt is also
/// remembered, so a command that starts later under the same token fails at once.
/// Tokens are never reused, so a stale request cannot hit a later call.
pub(super) struct InterruptState {
    handle: InterruptHandle,
    slots: Mutex<Slots>,
}

impl InterruptState {
    pub(super) fn new(handle: InterruptHandle) -> Self {
        Self {
            handle,
            slots: Mutex::new(Slots::default()),
        }
    }

    pub(super) fn interrupt(&self, token: QueryToken) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        // Remembered even while running: a call may run several commands under one token.
        slots.requested = Some(token);
        if slots.running == Some(token) {
            self.handle.interrupt();
        }
    }

    /// Mark `token` as running on the worker thread.
    pub(super) fn begin(&self, token: QueryToken) -> Result<RunningCall<'_>, BridgeError> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        if slots.requested == Some(token) {
            slots.requested = None;
            return Err(aborted());
        }
        slots.running = Some(token);
        Ok(RunningCall { state: self })
    }
}

/// Clears the running token when dropped. SQLite resets its interrupt flag once no statement
/// is active, so this must outlive every statement the call stepped.
pub(super) struct RunningCall<'a> {
    state: &'a InterruptState,
}

impl Drop for RunningCall<'_> {
    fn drop(&mut self) {
        let mut slots = self
            .state
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        slots.running = None;
    }
}

pub(super) fn aborted() -> BridgeError {
    BridgeError::Aborted("query was interrupted".into())
}
