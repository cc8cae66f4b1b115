//! Convenient imports for common functionality.
//!
//! This module re-exports the most commonly used types so callers can get started with a
//! single `use sql_bridge::prelude::*;`.

pub use crate::config::{
    BufferPolicy, DatabaseOptions, DatabaseOptionsBuilder, SessionInit, TransactionMode,
};
pub use crate::connection::{Connection, TransactionState};
pub use crate::database::Database;
pub use crate::error::{BridgeError, EnginePhase};
pub use crate::metadata::{Nullability, ParameterMetaData, ResultSetMetaData};
pub use crate::result_set::ResultSet;
pub use crate::statement::{BatchState, PreparedStatement, Statement};
pub use crate::types::{
    Decimal, Interval, LogicalType, MapValue, Sequence, StructValue, TimeTz, Value,
};
