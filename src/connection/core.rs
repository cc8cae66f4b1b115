use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::config::TransactionMode;
use crate::database::DatabaseInner;
use crate::engine::{NativeConnection, QueryToken};
use crate::error::BridgeError;
use crate::guard::{CallGuard, CallPermit};
use crate::registry::{ChildRegistry, NodeState};
use crate::statement::StatementInner;

use super::tx::TxState;

/// Shared state of one connection; statements hold it through an `Arc`.
pub(crate) struct ConnectionInner {
    id: u64,
    pub(crate) database: Arc<DatabaseInner>,
    pub(crate) native: Arc<dyn NativeConnection>,
    state: NodeState,
    guard: CallGuard,
    pub(crate) statements: ChildRegistry<StatementInner>,
    next_token: AtomicU64,
    pub(super) tx: Mutex<TxState>,
}

impl ConnectionInner {
    pub(super) fn new(
        id: u64,
        database: Arc<DatabaseInner>,
        native: Arc<dyn NativeConnection>,
        mode: TransactionMode,
    ) -> Self {
        Self {
            id,
            database,
            native,
            state: NodeState::default(),
            guard: CallGuard::default(),
            statements: ChildRegistry::default(),
            next_token: AtomicU64::new(1),
            tx: Mutex::new(TxState::new(mode)),
        }
    }

    pub(crate) fn next_token(&self) -> QueryToken {
        self.next_token.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.state.is_closed()
    }

    pub(crate) fn ensure_open(&self) -> Result<(), BridgeError> {
        self.state.ensure_open("Connection")
    }

    pub(super) fn tx(&self) -> MutexGuard<'_, TxState> {
        self.tx.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claim the native connection for the call `token`.
    ///
    /// # Errors
    /// Returns `BridgeError::Closed` if the connection closed before or while waiting.
    pub(crate) async fn enter(&self, token: QueryToken) -> Result<CallPermit<'_>, BridgeError> {
        let permit = self.guard.enter(token).await;
        self.ensure_open()?;
        Ok(permit)
    }

    /// Run text that returns no rows, such as the connection init fragment.
    pub(crate) async fn execute_script(&self, sql: &str) -> Result<(), BridgeError> {
        let token = self.next_token();
        let _permit = self.enter(token).await?;
        self.native.execute_script(sql, token).await
    }

    /// Close every statement, wait out the running call and release the native connection.
    pub(crate) async fn close(&self) -> Result<(), BridgeError> {
        if !self.state.mark_closed() {
            return Ok(());
        }
        if let Some(token) = self.guard.request_interrupt() {
            tracing::debug!(connection = self.id, token, "interrupting running call on close");
            self.native.interrupt(token);
        }

        let mut first_error = None;
        for statement in self.statements.begin_close() {
            if let Err(err) = statement.close().await {
                first_error.get_or_insert(err);
            }
        }
        self.guard.quiesce(|token| self.native.interrupt(token)).await;

        if let Err(err) = self.native.release() {
            first_error.get_or_insert(err);
        }
        self.database.connections.remove(self.id);
        tracing::debug!(connection = self.id, "connection closed");
        first_error.map_or(Ok(()), Err)
    }
}

impl Drop for ConnectionInner {
    fn drop(&mut self) {
        if !self.state.mark_closed() {
            return;
        }
        if let Err(err) = self.native.release() {
            tracing::warn!(
                connection = self.id,
                error = %err,
                "releasing dropped connection failed"
            );
        }
        self.database.connections.remove(self.id);
    }
}

impl fmt::Debug for ConnectionInner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionInner")
            .field("id", &self.id)
            .field("closed", &self.state.is_closed())
            .field("statements", &self.statements.live_count())
            .finish_non_exhaustive()
    }
}
