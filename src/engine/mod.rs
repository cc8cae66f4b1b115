//! Boundary between the driver and the native query engine.
//!
//! The driver never touches engine memory directly. It talks to an engine through these traits
//! and receives results as [`DataChunk`]s of typed vectors. The bundled [`sqlite`] engine is
//! the default implementation.

use std::sync::Arc;

use async_trait::async_trait;

use crate::codec::DataChunk;
use crate::error::BridgeError;
use crate::types::{LogicalType, Value};

#[cfg(feature = "sqlite")]
pub mod sqlite;

/// Identifies one native call on a connection; allocated by the driver, never reused.
pub type QueryToken = u64;

/// Declared shape of a result column.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnInfo {
    pub name: String,
    pub logical_type: LogicalType,
    /// `None` when the engine cannot tell.
    pub nullable: Option<bool>,
}

impl ColumnInfo {
    #[must_use]
    pub fn new(name: impl Into<String>, logical_type: LogicalType) -> Self {
        Self {
            name: name.into(),
            logical_type,
            nullable: None,
        }
    }
}

/// A statement the engine accepted.
#[derive(Debug, Clone, PartialEq)]
pub struct NativePrepared {
    pub id: u64,
    /// One entry per placeholder; `LogicalType::Unknown` where the engine cannot say.
    pub parameter_types: Vec<LogicalType>,
    /// Declared result columns, empty for statements that do not return rows.
    pub columns: Vec<ColumnInfo>,
}

/// What executing a statement produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultKind {
    Rows,
    ChangedRows(u64),
    Nothing,
}

/// Entries of a batch, in submission order.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchEntries {
    /// Independent SQL texts from a plain statement.
    Sql(Vec<String>),
    /// Parameter rows for one prepared statement.
    Bound { prepared: u64, rows: Vec<Vec<Value>> },
}

impl BatchEntries {
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            BatchEntries::Sql(sql) => sql.len(),
            BatchEntries::Bound { rows, .. } => rows.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Unit of work a batch runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchUnit {
    /// No caller transaction is open; the engine decides how atomic the batch is.
    Autocommit,
    /// The caller holds an open transaction; entries join it and nothing is rolled back.
    Transaction,
}

/// An engine-reported batch failure with the index of the entry that failed.
#[derive(Debug)]
pub struct BatchFailure {
    pub index: usize,
    pub error: BridgeError,
}

impl From<BatchFailure> for BridgeError {
    fn from(failure: BatchFailure) -> Self {
        match failure.error {
            // Not about any entry: the connection itself went away.
            err @ (BridgeError::Closed(_) | BridgeError::ConnectionError(_)) => err,
            err => BridgeError::Batch {
                index: failure.index,
                source: Box::new(err),
            },
        }
    }
}

/// One native engine instance.
#[async_trait]
pub trait NativeDatabase: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn NativeConnection>, BridgeError>;

    /// Tear down the instance. Called once, after every connection was released.
    fn release(&self) -> Result<(), BridgeError>;
}

/// One native connection. Calls are serialized by the driver.
#[async_trait]
pub trait NativeConnection: Send + Sync {
    /// Run multi-statement text that returns no rows.
    async fn execute_script(&self, sql: &str, token: QueryToken) -> Result<(), BridgeError>;

    async fn prepare(&self, sql: &str) -> Result<NativePrepared, BridgeError>;

    async fn execute(
        &self,
        prepared: u64,
        params: Vec<Value>,
        token: QueryToken,
    ) -> Result<Box<dyn NativeResult>, BridgeError>;

    async fn execute_batch(
        &self,
        entries: BatchEntries,
        unit: BatchUnit,
        token: QueryToken,
    ) -> Result<Vec<u64>, BatchFailure>;

    /// Ask the engine to abort the call running under `token`. A token that is not running
    /// (yet, or any more) must not disturb other calls.
    fn interrupt(&self, token: QueryToken);

    fn release_prepared(&self, prepared: u64) -> Result<(), BridgeError>;

    fn release(&self) -> Result<(), BridgeError>;
}

/// A native result cursor.
#[async_trait]
pub trait NativeResult: Send {
    fn kind(&self) -> ResultKind;

    fn columns(&self) -> &[ColumnInfo];

    /// Next chunk of rows, `None` at end of data.
    async fn fetch_next(&mut self) -> Result<Option<DataChunk>, BridgeError>;

    fn release(&mut self) -> Result<(), BridgeError>;
}
