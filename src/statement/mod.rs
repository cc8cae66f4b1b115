//! Plain and prepared statements.
//!
//! Both kinds share one core: direct execution, the batch queue, cancel and close. A plain
//! statement queues SQL text; a prepared statement queues snapshots of its bound parameters.

mod batch;
mod core;
mod prepared;

use std::sync::Arc;

pub use self::batch::BatchState;
pub(crate) use self::core::StatementInner;
pub use self::prepared::PreparedStatement;

use self::core::{Executed, StatementKind};
use crate::connection::ConnectionInner;
use crate::error::BridgeError;
use crate::result_set::ResultSet;

/// Methods every statement kind offers, forwarded to the shared core.
macro_rules! statement_common {
    ($ty:ident) => {
        impl $ty {
            /// Run every queued entry as one engine call and return the per-entry update
            /// counts. The queue is empty afterwards whatever the outcome.
            ///
            /// # Errors
            /// Returns `BridgeError::Batch` with the failing entry's index for engine
            /// failures, `BridgeError::Aborted` if cancelled, or `BridgeError::Closed`.
            pub async fn execute_batch(&self) -> Result<Vec<u64>, BridgeError> {
                self.inner.execute_batch().await
            }

            /// Discard the queued entries without touching the engine.
            ///
            /// # Errors
            /// Returns `BridgeError::Closed` if the statement is closed.
            pub fn clear_batch(&self) -> Result<(), BridgeError> {
                self.inner.ensure_open()?;
                self.inner.batch().clear();
                Ok(())
            }

            #[must_use]
            pub fn batch_state(&self) -> BatchState {
                self.inner.batch().state()
            }

            /// Interrupt this statement's running query, if any. The connection stays usable;
            /// cancelling an idle or closed statement does nothing.
            pub fn cancel(&self) {
                self.inner.cancel();
            }

            /// Close the open result (if any) and release the statement. Closing twice is a
            /// no-op.
            ///
            /// # Errors
            /// Returns the engine's release error; the statement is closed regardless.
            pub async fn close(&self) -> Result<(), BridgeError> {
                self.inner.close().await
            }

            #[must_use]
            pub fn is_closed(&self) -> bool {
                self.inner.is_closed()
            }

            /// Close this statement as soon as its current result is exhausted or closed.
            ///
            /// # Errors
            /// Returns `BridgeError::Closed` if the statement is closed.
            pub fn close_on_completion(&self) -> Result<(), BridgeError> {
                self.inner.ensure_open()?;
                self.inner.set_close_on_completion();
                Ok(())
            }

            #[must_use]
            pub fn is_close_on_completion(&self) -> bool {
                self.inner.is_close_on_completion()
            }

            /// The result of the last `execute`, handed out once.
            ///
            /// # Errors
            /// Returns `BridgeError::Closed` if the statement is closed.
            pub fn get_result_set(&self) -> Result<Option<ResultSet>, BridgeError> {
                self.inner.ensure_open()?;
                Ok(self
                    .inner
                    .take_result()
                    .map(|result| ResultSet::from_inner(result, Arc::clone(&self.inner))))
            }

            /// Rows changed by the last `execute`; `None` when it produced a result set.
            #[must_use]
            pub fn update_count(&self) -> Option<u64> {
                self.inner.update_count()
            }
        }
    };
}

pub(crate) use statement_common;

/// Statement that runs SQL text given per call.
pub struct Statement {
    inner: Arc<StatementInner>,
}

impl Statement {
    pub(crate) fn create(connection: &Arc<ConnectionInner>) -> Result<Self, BridgeError> {
        Ok(Self {
            inner: StatementInner::create(connection, StatementKind::Plain)?,
        })
    }

    /// Run `sql`; `true` when it produced a result set, available through
    /// [`Statement::get_result_set`].
    ///
    /// # Errors
    /// Returns `BridgeError::PendingBatch` while a batch is queued, `BridgeError::Engine` for
    /// engine failures and `BridgeError::Aborted` if cancelled.
    pub async fn execute(&self, sql: &str) -> Result<bool, BridgeError> {
        let executed = self.inner.execute_native(Some(sql), Vec::new()).await?;
        Ok(matches!(executed, Executed::Rows(_)))
    }

    /// Run `sql` and return its rows.
    ///
    /// # Errors
    /// As [`Statement::execute`]; `BridgeError::Usage` if `sql` does not return rows.
    pub async fn execute_query(&self, sql: &str) -> Result<ResultSet, BridgeError> {
        match self.inner.execute_native(Some(sql), Vec::new()).await? {
            Executed::Rows(result) => {
                self.inner.take_result();
                Ok(ResultSet::from_inner(result, Arc::clone(&self.inner)))
            }
            Executed::Count(_) => Err(BridgeError::Usage(
                "execute_query can only be used with statements that return rows".into(),
            )),
        }
    }

    /// Run `sql` and return the number of changed rows (0 for DDL).
    ///
    /// # Errors
    /// As [`Statement::execute`]; `BridgeError::Usage` if `sql` returns rows.
    pub async fn execute_update(&self, sql: &str) -> Result<u64, BridgeError> {
        match self.inner.execute_native(Some(sql), Vec::new()).await? {
            Executed::Count(count) => Ok(count),
            Executed::Rows(result) => {
                self.inner.take_result();
                result.close_quietly().await?;
                Err(BridgeError::Usage(
                    "execute_update can only be used with statements that do not return rows"
                        .into(),
                ))
            }
        }
    }

    /// Queue `sql` for the next [`Statement::execute_batch`].
    ///
    /// # Errors
    /// Returns `BridgeError::Closed` if the statement is closed.
    pub fn add_batch(&self, sql: impl Into<String>) -> Result<(), BridgeError> {
        self.inner.ensure_open()?;
        self.inner.batch().push_sql(sql.into());
        Ok(())
    }
}

statement_common!(Statement);

impl std::fmt::Debug for Statement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Statement")
            .field("closed", &self.inner.is_closed())
            .field("batch", &self.inner.batch().state())
            .finish_non_exhaustive()
    }
}
