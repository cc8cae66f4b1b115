//! Async row/cursor driver over an in-process query engine.
//!
//! A [`Database`] owns one native engine instance. Connections, statements and result sets
//! hang off it as a strict ownership tree: closing any node closes everything below it, and
//! close or cancel may race with a running query from another task.
//!
//! ```rust,no_run
//! use sql_bridge::prelude::*;
//!
//! # async fn demo() -> Result<(), BridgeError> {
//! let db = DatabaseOptionsBuilder::new(":memory:").build().await?;
//! let conn = db.connect().await?;
//! let stmt = conn.create_statement()?;
//! stmt.execute_update("CREATE TABLE t (id INTEGER, price DECIMAL(18,7))").await?;
//!
//! let insert = conn.prepare_statement("INSERT INTO t VALUES (?, ?)").await?;
//! for id in 0..3 {
//!     insert.set_i32(1, id)?;
//!     insert.set_decimal(2, "1.5".parse()?)?;
//!     insert.add_batch()?;
//! }
//! assert_eq!(insert.execute_batch().await?, vec![1, 1, 1]);
//!
//! let rs = stmt.execute_query("SELECT id, price FROM t ORDER BY id").await?;
//! while rs.next().await? {
//!     let _id = rs.get_i64(1)?;
//!     let _price = rs.get_decimal("price")?;
//! }
//! conn.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod config;
pub mod connection;
pub mod database;
pub mod engine;
pub mod error;
pub mod guard;
pub mod metadata;
pub mod prelude;
pub mod registry;
pub mod result_set;
pub mod statement;
pub mod types;

pub use config::{BufferPolicy, DatabaseOptions, DatabaseOptionsBuilder, TransactionMode};
pub use connection::{Connection, TransactionState};
pub use database::{Database, ReleaseWatch};
pub use error::{BridgeError, EnginePhase};
pub use metadata::{Nullability, ParameterMetaData, ResultSetMetaData};
pub use result_set::{ColumnIndex, ResultSet};
pub use statement::{BatchState, PreparedStatement, Statement};
pub use types::{Decimal, Interval, LogicalType, MapValue, Sequence, StructValue, TimeTz, Value};
