use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::connection::ConnectionInner;
use crate::engine::{NativePrepared, NativeResult, ResultKind};
use crate::error::BridgeError;
use crate::guard::CallGuard;
use crate::registry::{ChildRegistry, NodeState};
use crate::result_set::ResultSetInner;
use crate::types::Value;

use super::batch::{BatchQueue, BatchState};

pub(crate) enum StatementKind {
    Plain,
    Prepared(NativePrepared),
}

/// What the last direct execution left behind.
#[derive(Default)]
struct Outcome {
    result: Option<Arc<ResultSetInner>>,
    update_count: Option<u64>,
}

pub(crate) enum Executed {
    Rows(Arc<ResultSetInner>),
    Count(u64),
}

/// Shared state of a plain or prepared statement.
pub(crate) struct StatementInner {
    id: u64,
    pub(crate) connection: Arc<ConnectionInner>,
    pub(crate) kind: StatementKind,
    state: NodeState,
    guard: CallGuard,
    pub(crate) params: Mutex<Vec<Option<Value>>>,
    batch: Mutex<BatchQueue>,
    pub(crate) results: ChildRegistry<ResultSetInner>,
    outcome: Mutex<Outcome>,
    close_on_completion: AtomicBool,
}

impl StatementInner {
    pub(crate) fn create(
        connection: &Arc<ConnectionInner>,
        kind: StatementKind,
    ) -> Result<Arc<Self>, BridgeError> {
        connection.ensure_open()?;
        let params = match &kind {
            StatementKind::Plain => Vec::new(),
            StatementKind::Prepared(prepared) => vec![None; prepared.parameter_types.len()],
        };
        connection.statements.register("Connection", |id| {
            Arc::new(Self {
                id,
                connection: Arc::clone(connection),
                kind,
                state: NodeState::default(),
                guard: CallGuard::default(),
                params: Mutex::new(params),
                batch: Mutex::new(BatchQueue::default()),
                results: ChildRegistry::default(),
                outcome: Mutex::new(Outcome::default()),
                close_on_completion: AtomicBool::new(false),
            })
        })
    }

    pub(crate) fn kind_name(&self) -> &'static str {
        match self.kind {
            StatementKind::Plain => "Statement",
            StatementKind::Prepared(_) => "PreparedStatement",
        }
    }

    pub(crate) fn prepared(&self) -> Option<&NativePrepared> {
        match &self.kind {
            StatementKind::Plain => None,
            StatementKind::Prepared(prepared) => Some(prepared),
        }
    }

    pub(crate) fn ensure_open(&self) -> Result<(), BridgeError> {
        self.state.ensure_open(self.kind_name())
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.state.is_closed()
    }

    pub(crate) fn batch(&self) -> MutexGuard<'_, BatchQueue> {
        self.batch.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn params(&self) -> MutexGuard<'_, Vec<Option<Value>>> {
        self.params.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn outcome(&self) -> MutexGuard<'_, Outcome> {
        self.outcome.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn ensure_no_batch(&self) -> Result<(), BridgeError> {
        if self.batch().state() == BatchState::Empty {
            Ok(())
        } else {
            Err(BridgeError::PendingBatch)
        }
    }

    pub(crate) fn set_close_on_completion(&self) {
        self.close_on_completion.store(true, Ordering::Release);
    }

    pub(crate) fn is_close_on_completion(&self) -> bool {
        self.close_on_completion.load(Ordering::Acquire)
    }

    pub(crate) fn take_result(&self) -> Option<Arc<ResultSetInner>> {
        self.outcome().result.take()
    }

    pub(crate) fn update_count(&self) -> Option<u64> {
        self.outcome().update_count
    }

    /// Close results of earlier executions. Implicit closes never complete the statement.
    async fn close_results(&self) -> Result<(), BridgeError> {
        *self.outcome() = Outcome::default();
        let mut first_error = None;
        for result in self.results.live() {
            if let Err(err) = result.close_quietly().await {
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Run the statement once: `sql` for plain statements, the prepared statement otherwise.
    ///
    /// The batch guard is checked before anything else, so a pending batch means no engine
    /// interaction at all.
    pub(crate) async fn execute_native(
        self: &Arc<Self>,
        sql: Option<&str>,
        params: Vec<Value>,
    ) -> Result<Executed, BridgeError> {
        self.ensure_open()?;
        self.ensure_no_batch()?;
        self.close_results().await?;

        let conn = &self.connection;
        let token = conn.next_token();
        let stmt_permit = self.guard.enter(token).await;
        self.ensure_open()?;
        self.ensure_no_batch()?;
        let conn_permit = conn.enter(token).await?;
        let cancelled = || stmt_permit.interrupted() || conn_permit.interrupted();
        if cancelled() {
            return Err(cancelled_error());
        }
        conn.begin_if_manual(token).await?;
        if cancelled() {
            return Err(cancelled_error());
        }

        tracing::debug!(statement = self.id, token, "executing statement");
        let mut native: Box<dyn NativeResult> = match (&self.kind, sql) {
            (_, Some(sql)) => {
                let prepared = conn.native.prepare(sql).await?;
                let executed = conn.native.execute(prepared.id, params, token).await;
                if let Err(err) = conn.native.release_prepared(prepared.id) {
                    tracing::warn!(error = %err, "releasing one-shot statement failed");
                }
                executed?
            }
            (StatementKind::Prepared(prepared), None) => {
                conn.native.execute(prepared.id, params, token).await?
            }
            (StatementKind::Plain, None) => {
                return Err(BridgeError::Usage("no SQL given to execute".into()));
            }
        };

        match native.kind() {
            ResultKind::Rows => {
                let policy = conn.database.options.buffer_policy;
                let result = self.results.register(self.kind_name(), |id| {
                    Arc::new(ResultSetInner::new(id, Arc::downgrade(self), native, policy))
                })?;
                drop(conn_permit);
                drop(stmt_permit);
                self.outcome().result = Some(Arc::clone(&result));
                Ok(Executed::Rows(result))
            }
            kind => {
                native.release()?;
                let count = match kind {
                    ResultKind::ChangedRows(count) => count,
                    _ => 0,
                };
                self.outcome().update_count = Some(count);
                Ok(Executed::Count(count))
            }
        }
    }

    /// Submit the queued entries as one engine call and return per-entry update counts.
    pub(crate) async fn execute_batch(&self) -> Result<Vec<u64>, BridgeError> {
        self.ensure_open()?;
        let entries = self.batch().start(self.prepared().map(|p| p.id));
        let _executing = Executing(self);
        if entries.is_empty() {
            return Ok(Vec::new());
        }
        self.close_results().await?;

        let conn = &self.connection;
        let token = conn.next_token();
        let stmt_permit = self.guard.enter(token).await;
        self.ensure_open()?;
        let conn_permit = conn.enter(token).await?;
        let cancelled = || stmt_permit.interrupted() || conn_permit.interrupted();
        if cancelled() {
            return Err(cancelled_error());
        }
        conn.begin_if_manual(token).await?;
        if cancelled() {
            return Err(cancelled_error());
        }
        let unit = conn.batch_unit();

        let count = entries.len();
        tracing::debug!(statement = self.id, token, entries = count, ?unit, "executing batch");
        conn.native
            .execute_batch(entries, unit, token)
            .await
            .map_err(|failure| {
                tracing::debug!(statement = self.id, index = failure.index, "batch failed");
                BridgeError::from(failure)
            })
    }

    pub(crate) fn cancel(&self) {
        if let Some(token) = self.guard.request_interrupt() {
            tracing::debug!(statement = self.id, token, "cancelling statement");
            self.connection.native.interrupt(token);
        }
    }

    /// Close results, wait out the running call and drop the prepared statement.
    pub(crate) async fn close(&self) -> Result<(), BridgeError> {
        if !self.state.mark_closed() {
            return Ok(());
        }
        let native = &self.connection.native;
        if let Some(token) = self.guard.request_interrupt() {
            native.interrupt(token);
        }

        let mut first_error = None;
        for result in self.results.begin_close() {
            if let Err(err) = result.close_quietly().await {
                first_error.get_or_insert(err);
            }
        }
        *self.outcome() = Outcome::default();
        self.batch().clear();
        self.guard.quiesce(|token| native.interrupt(token)).await;

        // A closing connection drops every prepared statement with its native connection.
        if let Some(prepared) = self.prepared()
            && !self.connection.is_closed()
            && let Err(err) = native.release_prepared(prepared.id)
        {
            first_error.get_or_insert(err);
        }
        self.connection.statements.remove(self.id);
        tracing::debug!(statement = self.id, "statement closed");
        first_error.map_or(Ok(()), Err)
    }
}

impl Drop for StatementInner {
    fn drop(&mut self) {
        if !self.state.mark_closed() {
            return;
        }
        for result in self.results.begin_close() {
            result.release_now();
        }
        if let Some(prepared) = self.prepared()
            && !self.connection.is_closed()
            && let Err(err) = self.connection.native.release_prepared(prepared.id)
        {
            tracing::warn!(statement = self.id, error = %err, "releasing dropped statement failed");
        }
        self.connection.statements.remove(self.id);
    }
}

/// Marks the batch finished however `execute_batch` ends.
struct Executing<'a>(&'a StatementInner);

impl Drop for Executing<'_> {
    fn drop(&mut self) {
        self.0.batch().finish();
    }
}

fn cancelled_error() -> BridgeError {
    BridgeError::Aborted("statement was cancelled".into())
}
