use std::collections::HashMap;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;

use rusqlite::types::Value as SqliteValue;
use rusqlite::{Connection, ErrorCode};
use tokio::sync::oneshot;

use super::interrupt::{InterruptState, aborted};
use super::lift::{build_chunks, infer_column_type};
use super::params::{infer_parameter_types, to_sqlite};
use super::scanner::{leading_keyword, tokenize};
use crate::codec::DataChunk;
use crate::engine::{
    BatchEntries, BatchFailure, BatchUnit, ColumnInfo, NativePrepared, QueryToken, ResultKind,
};
use crate::error::{BridgeError, EnginePhase};
use crate::types::{LogicalType, Value};

/// Everything one execution produced, materialized on the worker thread.
pub(super) struct Executed {
    pub(super) kind: ResultKind,
    pub(super) columns: Vec<ColumnInfo>,
    pub(super) chunks: Vec<DataChunk>,
}

pub(super) enum Command {
    Script {
        sql: String,
        token: QueryToken,
        respond_to: oneshot::Sender<Result<(), BridgeError>>,
    },
    Prepare {
        sql: String,
        respond_to: oneshot::Sender<Result<NativePrepared, BridgeError>>,
    },
    Execute {
        prepared: u64,
        params: Vec<Value>,
        token: QueryToken,
        respond_to: oneshot::Sender<Result<Executed, BridgeError>>,
    },
    Batch {
        entries: BatchEntries,
        unit: BatchUnit,
        token: QueryToken,
        respond_to: oneshot::Sender<Result<Vec<u64>, BatchFailure>>,
    },
    Finalize {
        prepared: u64,
    },
    Shutdown,
}

pub(super) struct SqliteWorker {
    sender: Sender<Command>,
    interrupts: Arc<InterruptState>,
}

impl SqliteWorker {
    /// Open a connection on a fresh worker thread and wait until it is ready.
    pub(super) async fn spawn(
        name: String,
        open: impl FnOnce() -> Result<Connection, BridgeError> + Send + 'static,
    ) -> Result<Self, BridgeError> {
        let (sender, receiver) = mpsc::channel::<Command>();
        let (ready_tx, ready_rx) = oneshot::channel();
        thread::Builder::new()
            .name(name)
            .spawn(move || {
                let conn = match open() {
                    Ok(conn) => conn,
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };
                let interrupts = Arc::new(InterruptState::new(conn.get_interrupt_handle()));
                if ready_tx.send(Ok(Arc::clone(&interrupts))).is_err() {
                    return;
                }
                run_worker(conn, &interrupts, &receiver);
            })
            .map_err(|err| {
                BridgeError::ConnectionError(format!("failed to spawn SQLite worker thread: {err}"))
            })?;

        let interrupts = ready_rx
            .await
            .map_err(|_| connection_error("SQLite worker exited during startup"))??;
        Ok(Self { sender, interrupts })
    }

    pub(super) fn send_command(&self, command: Command) -> Result<(), BridgeError> {
        self.sender
            .send(command)
            .map_err(|_| connection_error("SQLite worker closed"))
    }

    pub(super) async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T, BridgeError>>) -> Command,
        drop_message: &'static str,
    ) -> Result<T, BridgeError> {
        let (tx, rx) = oneshot::channel();
        self.send_command(build(tx))?;
        rx.await.map_err(|_| connection_error(drop_message))?
    }

    pub(super) async fn execute_batch(
        &self,
        entries: BatchEntries,
        unit: BatchUnit,
        token: QueryToken,
    ) -> Result<Vec<u64>, BatchFailure> {
        let (tx, rx) = oneshot::channel();
        let command = Command::Batch {
            entries,
            unit,
            token,
            respond_to: tx,
        };
        let lost = |error| BatchFailure { index: 0, error };
        self.send_command(command).map_err(lost)?;
        rx.await
            .map_err(|_| lost(connection_error("SQLite worker dropped while executing batch")))?
    }

    pub(super) fn interrupt(&self, token: QueryToken) {
        self.interrupts.interrupt(token);
    }
}

impl Drop for SqliteWorker {
    fn drop(&mut self) {
        let _ = self.sender.send(Command::Shutdown);
    }
}

fn run_worker(mut conn: Connection, interrupts: &InterruptState, receiver: &Receiver<Command>) {
    let mut prepared: HashMap<u64, String> = HashMap::new();
    let mut next_id: u64 = 1;

    while let Ok(command) = receiver.recv() {
        match command {
            Command::Shutdown => break,
            Command::Script {
                sql,
                token,
                respond_to,
            } => {
                let result = interrupts.begin(token).and_then(|_running| {
                    conn.execute_batch(&sql)
                        .map_err(|err| engine_error(err, EnginePhase::Execute))
                });
                let _ = respond_to.send(result);
            }
            Command::Prepare { sql, respond_to } => {
                let result = prepare(&conn, &sql).map(|(parameter_types, columns)| {
                    let id = next_id;
                    next_id = next_id.saturating_add(1);
                    prepared.insert(id, sql);
                    NativePrepared {
                        id,
                        parameter_types,
                        columns,
                    }
                });
                let _ = respond_to.send(result);
            }
            Command::Execute {
                prepared: id,
                params,
                token,
                respond_to,
            } => {
                let result = match prepared.get(&id) {
                    Some(sql) => interrupts
                        .begin(token)
                        .and_then(|_running| execute(&conn, sql, &params)),
                    None => Err(unknown_statement(id)),
                };
                let _ = respond_to.send(result);
            }
            Command::Batch {
                entries,
                unit,
                token,
                respond_to,
            } => {
                let result = match interrupts.begin(token) {
                    Ok(_running) => run_batch(&mut conn, &prepared, entries, unit),
                    Err(error) => Err(BatchFailure { index: 0, error }),
                };
                let _ = respond_to.send(result);
            }
            Command::Finalize { prepared: id } => {
                prepared.remove(&id);
            }
        }
    }
    if let Err((_, err)) = conn.close() {
        tracing::warn!(error = %err, "closing SQLite connection failed");
    }
}

fn prepare(
    conn: &Connection,
    sql: &str,
) -> Result<(Vec<LogicalType>, Vec<ColumnInfo>), BridgeError> {
    let stmt = conn
        .prepare_cached(sql)
        .map_err(|err| engine_error(err, EnginePhase::Prepare))?;
    let columns = stmt
        .columns()
        .iter()
        .map(|col| {
            let ty = col
                .decl_type()
                .and_then(|decl| LogicalType::parse(decl).ok())
                .unwrap_or(LogicalType::Unknown);
            ColumnInfo::new(col.name(), ty)
        })
        .collect();
    let parameter_types = infer_parameter_types(conn, sql, stmt.parameter_count());
    Ok((parameter_types, columns))
}

fn bind(params: &[Value]) -> Result<Vec<SqliteValue>, BridgeError> {
    params.iter().map(to_sqlite).collect()
}

fn execute(conn: &Connection, sql: &str, params: &[Value]) -> Result<Executed, BridgeError> {
    let bound = bind(params)?;
    let mut stmt = conn
        .prepare_cached(sql)
        .map_err(|err| engine_error(err, EnginePhase::Prepare))?;
    if stmt.parameter_count() != bound.len() {
        return Err(BridgeError::Usage(format!(
            "statement expects {} parameters, {} bound",
            stmt.parameter_count(),
            bound.len()
        )));
    }

    if stmt.column_count() == 0 {
        let changed = stmt
            .execute(rusqlite::params_from_iter(bound.iter()))
            .map_err(|err| engine_error(err, EnginePhase::Execute))?;
        let kind = if changes_rows(sql) {
            ResultKind::ChangedRows(changed as u64)
        } else {
            ResultKind::Nothing
        };
        return Ok(Executed {
            kind,
            columns: Vec::new(),
            chunks: Vec::new(),
        });
    }

    let declared: Vec<(String, Option<LogicalType>)> = stmt
        .columns()
        .iter()
        .map(|col| {
            let ty = col.decl_type().and_then(|decl| LogicalType::parse(decl).ok());
            (col.name().to_string(), ty)
        })
        .collect();
    let column_count = declared.len();
    let mut rows: Vec<Vec<SqliteValue>> = Vec::new();
    let mut cursor = stmt
        .query(rusqlite::params_from_iter(bound.iter()))
        .map_err(|err| engine_error(err, EnginePhase::Execute))?;
    while let Some(row) = cursor
        .next()
        .map_err(|err| engine_error(err, EnginePhase::Execute))?
    {
        let mut values = Vec::with_capacity(column_count);
        for idx in 0..column_count {
            let value = row
                .get_ref(idx)
                .map_err(|err| engine_error(err, EnginePhase::Execute))?;
            values.push(SqliteValue::from(value));
        }
        rows.push(values);
    }
    drop(cursor);

    let columns: Vec<ColumnInfo> = declared
        .into_iter()
        .enumerate()
        .map(|(idx, (name, ty))| {
            let ty = ty.unwrap_or_else(|| infer_column_type(&rows, idx));
            ColumnInfo::new(name, ty)
        })
        .collect();
    let chunks = build_chunks(&columns, &rows)?;
    Ok(Executed {
        kind: ResultKind::Rows,
        columns,
        chunks,
    })
}

fn changes_rows(sql: &str) -> bool {
    matches!(
        leading_keyword(&tokenize(sql)).as_deref(),
        Some("INSERT" | "UPDATE" | "DELETE" | "REPLACE" | "WITH")
    )
}

/// Run all entries in order. Without a caller transaction the batch gets its own, which is
/// rolled back if any entry fails; inside a caller transaction applied entries are left as they
/// are.
fn run_batch(
    conn: &mut Connection,
    prepared: &HashMap<u64, String>,
    entries: BatchEntries,
    unit: BatchUnit,
) -> Result<Vec<u64>, BatchFailure> {
    let own_transaction = unit == BatchUnit::Autocommit && conn.is_autocommit();
    if own_transaction {
        conn.execute_batch("BEGIN")
            .map_err(|err| BatchFailure {
                index: 0,
                error: engine_error(err, EnginePhase::Execute),
            })?;
    }
    let outcome = run_entries(conn, prepared, entries);
    if !own_transaction {
        return outcome;
    }
    match outcome {
        Ok(counts) => match conn.execute_batch("COMMIT") {
            Ok(()) => Ok(counts),
            Err(err) => {
                rollback(conn);
                Err(BatchFailure {
                    index: counts.len().saturating_sub(1),
                    error: engine_error(err, EnginePhase::Execute),
                })
            }
        },
        Err(failure) => {
            rollback(conn);
            Err(failure)
        }
    }
}

fn rollback(conn: &Connection) {
    if !conn.is_autocommit()
        && let Err(err) = conn.execute_batch("ROLLBACK")
    {
        tracing::warn!(error = %err, "rolling back failed batch");
    }
}

fn run_entries(
    conn: &Connection,
    prepared: &HashMap<u64, String>,
    entries: BatchEntries,
) -> Result<Vec<u64>, BatchFailure> {
    let mut counts = Vec::with_capacity(entries.len());
    match entries {
        BatchEntries::Sql(statements) => {
            for (index, sql) in statements.iter().enumerate() {
                let fail = |error| BatchFailure { index, error };
                let mut stmt = conn
                    .prepare(sql)
                    .map_err(|err| fail(engine_error(err, EnginePhase::Prepare)))?;
                if stmt.column_count() > 0 {
                    return Err(fail(BridgeError::execute(
                        "batch entries must not return rows",
                    )));
                }
                let changed = stmt
                    .execute([])
                    .map_err(|err| fail(engine_error(err, EnginePhase::Execute)))?;
                // SQLite reports the last DML count for DDL; entries that change no rows count 0.
                counts.push(if changes_rows(sql) { changed as u64 } else { 0 });
            }
        }
        BatchEntries::Bound { prepared: id, rows } => {
            let sql = prepared.get(&id).ok_or_else(|| BatchFailure {
                index: 0,
                error: unknown_statement(id),
            })?;
            let mut stmt = conn.prepare_cached(sql).map_err(|err| BatchFailure {
                index: 0,
                error: engine_error(err, EnginePhase::Prepare),
            })?;
            for (index, row) in rows.iter().enumerate() {
                let fail = |error| BatchFailure { index, error };
                let bound = bind(row).map_err(fail)?;
                let changed = stmt
                    .execute(rusqlite::params_from_iter(bound.iter()))
                    .map_err(|err| fail(engine_error(err, EnginePhase::Execute)))?;
                counts.push(changed as u64);
            }
        }
    }
    Ok(counts)
}

/// Map a SQLite failure into the driver's taxonomy, keeping SQLite's own message.
fn engine_error(err: rusqlite::Error, phase: EnginePhase) -> BridgeError {
    if err.sqlite_error_code() == Some(ErrorCode::OperationInterrupted) {
        return aborted();
    }
    match err {
        rusqlite::Error::SqliteFailure(_, Some(message)) => BridgeError::Engine { phase, message },
        other => BridgeError::Engine {
            phase,
            message: other.to_string(),
        },
    }
}

fn unknown_statement(id: u64) -> BridgeError {
    tracing::debug!(prepared = id, "statement is not prepared on this connection");
    BridgeError::Closed("PreparedStatement")
}

fn connection_error(message: &str) -> BridgeError {
    BridgeError::ConnectionError(message.into())
}
