//! SQLite-backed engine.
//!
//! Each native connection owns a worker thread that holds the `rusqlite::Connection`; calls
//! reach it over a command channel and results come back already lifted into
//! [`DataChunk`]s. A keeper connection pins the database for as long as the instance lives,
//! which is what keeps a shared in-memory database alive between connections.

mod interrupt;
mod lift;
mod params;
mod scanner;
mod worker;

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use rusqlite::{Connection, OpenFlags};
use tokio::task::spawn_blocking;

use self::worker::{Command, SqliteWorker};
use crate::codec::DataChunk;
use crate::config::DatabaseOptions;
use crate::engine::{
    BatchEntries, BatchFailure, BatchUnit, ColumnInfo, NativeConnection, NativeDatabase,
    NativePrepared, NativeResult, QueryToken, ResultKind,
};
use crate::error::BridgeError;
use crate::types::Value;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

static PRAGMA_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());
static PRAGMA_VALUE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_.+-]+$").unwrap());

/// Distinguishes the shared-cache names of in-memory databases opened by this process.
static MEMORY_DATABASES: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone)]
struct OpenTarget {
    uri: String,
    flags: OpenFlags,
    pragmas: Vec<(String, String)>,
}

impl OpenTarget {
    fn open(&self) -> Result<Connection, BridgeError> {
        let conn = Connection::open_with_flags(&self.uri, self.flags)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        for (name, value) in &self.pragmas {
            conn.execute_batch(&format!("PRAGMA {name} = {value};"))?;
        }
        Ok(conn)
    }
}

/// One SQLite database, file-backed or in memory.
pub struct SqliteDatabase {
    target: OpenTarget,
    keeper: Mutex<Option<Connection>>,
    workers: AtomicU64,
}

impl SqliteDatabase {
    /// Open the database described by `options` and pin it with a keeper connection.
    ///
    /// # Errors
    /// Returns `BridgeError::Config` for unusable engine settings and `BridgeError::SqliteError`
    /// if SQLite cannot open the database.
    pub async fn open(options: &DatabaseOptions) -> Result<Self, BridgeError> {
        let target = open_target(options)?;
        let in_file = !options.is_in_memory() && !options.read_only;
        let keeper_target = target.clone();
        let keeper = spawn_blocking(move || -> Result<Connection, BridgeError> {
            let conn = keeper_target.open()?;
            if in_file {
                conn.execute_batch("PRAGMA journal_mode = WAL;")?;
            }
            Ok(conn)
        })
        .await
        .map_err(|e| {
            BridgeError::ConnectionError(format!("sqlite spawn_blocking join error: {e}"))
        })??;

        tracing::debug!(uri = %target.uri, "opened SQLite database");
        Ok(Self {
            target,
            keeper: Mutex::new(Some(keeper)),
            workers: AtomicU64::new(1),
        })
    }
}

fn open_target(options: &DatabaseOptions) -> Result<OpenTarget, BridgeError> {
    let pragmas = pragmas(&options.extra)?;
    let (uri, mut flags) = if options.is_in_memory() {
        let n = MEMORY_DATABASES.fetch_add(1, Ordering::Relaxed);
        (
            format!("file:sql-bridge-{}-{n}?mode=memory&cache=shared", std::process::id()),
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
        )
    } else if options.read_only {
        (options.path.clone(), OpenFlags::SQLITE_OPEN_READ_ONLY)
    } else {
        (
            options.path.clone(),
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
        )
    };
    flags |= OpenFlags::SQLITE_OPEN_URI | OpenFlags::SQLITE_OPEN_NO_MUTEX;
    Ok(OpenTarget {
        uri,
        flags,
        pragmas,
    })
}

fn pragmas(extra: &BTreeMap<String, String>) -> Result<Vec<(String, String)>, BridgeError> {
    extra
        .iter()
        .map(|(name, value)| {
            let value = value.trim();
            if !PRAGMA_NAME.is_match(name) || !PRAGMA_VALUE.is_match(value) {
                return Err(BridgeError::Config(format!(
                    "unsupported engine option {name}={value}"
                )));
            }
            Ok((name.clone(), value.to_string()))
        })
        .collect()
}

#[async_trait]
impl NativeDatabase for SqliteDatabase {
    async fn connect(&self) -> Result<Arc<dyn NativeConnection>, BridgeError> {
        let n = self.workers.fetch_add(1, Ordering::Relaxed);
        let target = self.target.clone();
        let worker = SqliteWorker::spawn(format!("sql-bridge-sqlite-{n}"), move || target.open())
            .await?;
        Ok(Arc::new(SqliteConnection { worker }))
    }

    fn release(&self) -> Result<(), BridgeError> {
        let keeper = self
            .keeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(conn) = keeper {
            conn.close().map_err(|(_, err)| BridgeError::SqliteError(err))?;
            tracing::debug!(uri = %self.target.uri, "released SQLite database");
        }
        Ok(())
    }
}

/// A connection served by its own worker thread.
pub struct SqliteConnection {
    worker: SqliteWorker,
}

#[async_trait]
impl NativeConnection for SqliteConnection {
    async fn execute_script(&self, sql: &str, token: QueryToken) -> Result<(), BridgeError> {
        let sql = sql.to_string();
        self.worker
            .request(
                |respond_to| Command::Script {
                    sql,
                    token,
                    respond_to,
                },
                "SQLite worker dropped while running script",
            )
            .await
    }

    async fn prepare(&self, sql: &str) -> Result<NativePrepared, BridgeError> {
        let sql = sql.to_string();
        self.worker
            .request(
                |respond_to| Command::Prepare { sql, respond_to },
                "SQLite worker dropped while preparing",
            )
            .await
    }

    async fn execute(
        &self,
        prepared: u64,
        params: Vec<Value>,
        token: QueryToken,
    ) -> Result<Box<dyn NativeResult>, BridgeError> {
        let executed = self
            .worker
            .request(
                |respond_to| Command::Execute {
                    prepared,
                    params,
                    token,
                    respond_to,
                },
                "SQLite worker dropped while executing",
            )
            .await?;
        Ok(Box::new(SqliteResult {
            kind: executed.kind,
            columns: executed.columns,
            chunks: executed.chunks.into(),
        }))
    }

    async fn execute_batch(
        &self,
        entries: BatchEntries,
        unit: BatchUnit,
        token: QueryToken,
    ) -> Result<Vec<u64>, BatchFailure> {
        self.worker.execute_batch(entries, unit, token).await
    }

    fn interrupt(&self, token: QueryToken) {
        self.worker.interrupt(token);
    }

    fn release_prepared(&self, prepared: u64) -> Result<(), BridgeError> {
        self.worker.send_command(Command::Finalize { prepared })
    }

    fn release(&self) -> Result<(), BridgeError> {
        self.worker.send_command(Command::Shutdown)
    }
}

/// Rows of one execution, already lifted into chunks.
pub struct SqliteResult {
    kind: ResultKind,
    columns: Vec<ColumnInfo>,
    chunks: VecDeque<DataChunk>,
}

#[async_trait]
impl NativeResult for SqliteResult {
    fn kind(&self) -> ResultKind {
        self.kind
    }

    fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }

    async fn fetch_next(&mut self) -> Result<Option<DataChunk>, BridgeError> {
        Ok(self.chunks.pop_front())
    }

    fn release(&mut self) -> Result<(), BridgeError> {
        self.chunks.clear();
        Ok(())
    }
}
