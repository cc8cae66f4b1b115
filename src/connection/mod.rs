//! Connections: statement factory, transaction mode and cascade close.

mod core;
mod tx;

use std::sync::Arc;

pub(crate) use self::core::ConnectionInner;
pub use self::tx::TransactionState;

use crate::database::{Database, DatabaseInner};
use crate::error::BridgeError;
use crate::statement::{PreparedStatement, Statement};

/// One session on a [`Database`].
///
/// Every method takes `&self`, so a connection can be shared between tasks; `close` may run
/// concurrently with a query and interrupts it.
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

impl Connection {
    pub(crate) async fn open(database: Arc<DatabaseInner>) -> Result<Self, BridgeError> {
        database.ensure_open()?;
        let native = database.native.connect().await?;
        let mode = database.options.transaction_mode;
        let registered = database.connections.register("Database", |id| {
            Arc::new(ConnectionInner::new(
                id,
                Arc::clone(&database),
                Arc::clone(&native),
                mode,
            ))
        });
        let inner = match registered {
            Ok(inner) => inner,
            Err(err) => {
                if let Err(release_err) = native.release() {
                    tracing::warn!(error = %release_err, "releasing refused connection failed");
                }
                return Err(err);
            }
        };

        let init = database
            .options
            .session_init
            .as_ref()
            .and_then(|init| init.connection_sql());
        if let Some(sql) = init
            && let Err(err) = inner.execute_script(sql).await
        {
            if let Err(close_err) = inner.close().await {
                tracing::warn!(error = %close_err, "closing connection after failed init");
            }
            return Err(err);
        }
        tracing::debug!("connection opened");
        Ok(Self { inner })
    }

    /// Create a plain statement for SQL text.
    ///
    /// # Errors
    /// Returns `BridgeError::Closed` if the connection is closed.
    pub fn create_statement(&self) -> Result<Statement, BridgeError> {
        Statement::create(&self.inner)
    }

    /// Prepare `sql` once for repeated execution with bound parameters.
    ///
    /// # Errors
    /// Returns `BridgeError::Closed` if the connection is closed, or the engine's prepare error.
    pub async fn prepare_statement(&self, sql: &str) -> Result<PreparedStatement, BridgeError> {
        PreparedStatement::prepare(&self.inner, sql).await
    }

    /// # Errors
    /// Returns `BridgeError::Closed` if the connection is closed, or the commit failure when
    /// switching to autocommit with a transaction running.
    pub async fn set_auto_commit(&self, auto_commit: bool) -> Result<(), BridgeError> {
        self.inner.set_auto_commit(auto_commit).await
    }

    /// # Errors
    /// Returns `BridgeError::Closed` if the connection is closed.
    pub fn auto_commit(&self) -> Result<bool, BridgeError> {
        self.inner.ensure_open()?;
        Ok(self.inner.tx().auto_commit())
    }

    #[must_use]
    pub fn transaction_state(&self) -> TransactionState {
        self.inner.tx().state()
    }

    /// Commit the running manual transaction, if any.
    ///
    /// # Errors
    /// Returns `BridgeError::Closed` if the connection is closed, or the engine's error.
    pub async fn commit(&self) -> Result<(), BridgeError> {
        self.inner.finish_transaction(true).await
    }

    /// Roll back the running manual transaction, if any.
    ///
    /// # Errors
    /// Returns `BridgeError::Closed` if the connection is closed, or the engine's error.
    pub async fn rollback(&self) -> Result<(), BridgeError> {
        self.inner.finish_transaction(false).await
    }

    /// A new connection on the same database.
    ///
    /// # Errors
    /// Returns `BridgeError::Closed` if this connection or the database is closed.
    pub async fn duplicate(&self) -> Result<Connection, BridgeError> {
        self.inner.ensure_open()?;
        Connection::open(Arc::clone(&self.inner.database)).await
    }

    /// Whether the connection is open and answers a trivial query.
    pub async fn is_valid(&self) -> bool {
        if self.inner.is_closed() {
            return false;
        }
        let probe = async {
            let stmt = self.create_statement()?;
            let rs = stmt.execute_query("SELECT 42").await?;
            let answer = if rs.next().await? { rs.get_i64(1)? } else { None };
            stmt.close().await?;
            Ok::<_, BridgeError>(answer == Some(42))
        };
        probe.await.unwrap_or(false)
    }

    #[must_use]
    pub fn database(&self) -> Database {
        Database::from_inner(Arc::clone(&self.inner.database))
    }

    /// Statements created on this connection that are still open.
    #[must_use]
    pub fn statement_count(&self) -> usize {
        self.inner.statements.live_count()
    }

    /// Close every statement and result of this connection, then the connection itself.
    /// Closing twice is a no-op.
    ///
    /// # Errors
    /// Returns the first error a child or the engine reported; the connection is closed
    /// regardless.
    pub async fn close(&self) -> Result<(), BridgeError> {
        self.inner.close().await
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Connection").field(&self.inner).finish()
    }
}
