use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::config::DatabaseOptions;
use crate::connection::{Connection, ConnectionInner};
use crate::engine::NativeDatabase;
use crate::error::BridgeError;
use crate::registry::{ChildRegistry, NodeState};

/// Token used for the database-scope init script; connections allocate from 1.
const INIT_TOKEN: u64 = 0;

/// Shared handle to one native engine instance.
///
/// Cloning is cheap. Every [`Connection`] keeps the instance alive; the native database is
/// released when the last handle and the last connection are gone.
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
}

pub(crate) struct DatabaseInner {
    pub(crate) native: Box<dyn NativeDatabase>,
    pub(crate) options: DatabaseOptions,
    state: NodeState,
    pub(crate) connections: ChildRegistry<ConnectionInner>,
    released: Arc<AtomicBool>,
}

impl Database {
    /// Open the bundled SQLite engine and run the database-scope part of the init script.
    ///
    /// # Errors
    /// Returns `BridgeError` if the engine cannot open the database or the init script fails.
    #[cfg(feature = "sqlite")]
    pub async fn open(options: DatabaseOptions) -> Result<Self, BridgeError> {
        let native = crate::engine::sqlite::SqliteDatabase::open(&options).await?;
        Self::with_engine(Box::new(native), options).await
    }

    /// Wrap an already opened engine instance.
    ///
    /// # Errors
    /// Returns `BridgeError` if the database-scope init script fails; the engine is released.
    pub async fn with_engine(
        native: Box<dyn NativeDatabase>,
        options: DatabaseOptions,
    ) -> Result<Self, BridgeError> {
        let inner = Arc::new(DatabaseInner {
            native,
            options,
            state: NodeState::default(),
            connections: ChildRegistry::default(),
            released: Arc::new(AtomicBool::new(false)),
        });
        if let Some(sql) = inner
            .options
            .session_init
            .as_ref()
            .and_then(|init| init.database_sql())
        {
            let conn = inner.native.connect().await?;
            let ran = conn.execute_script(sql, INIT_TOKEN).await;
            let released = conn.release();
            ran?;
            released?;
            tracing::debug!("ran database init script");
        }
        tracing::debug!(path = %inner.options.path, "database opened");
        Ok(Self { inner })
    }

    /// Open a new connection on this database.
    ///
    /// # Errors
    /// Returns `BridgeError::Closed` once the database was closed, or the engine's connect or
    /// connection init failure.
    pub async fn connect(&self) -> Result<Connection, BridgeError> {
        Connection::open(Arc::clone(&self.inner)).await
    }

    #[must_use]
    pub fn options(&self) -> &DatabaseOptions {
        &self.inner.options
    }

    /// Connections currently open on this database.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.inner.connections.live_count()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.state.is_closed()
    }

    /// Observe native teardown without keeping the database alive.
    #[must_use]
    pub fn release_watch(&self) -> ReleaseWatch {
        ReleaseWatch {
            released: Arc::clone(&self.inner.released),
        }
    }

    /// Close every connection and refuse new ones. Closing twice is a no-op.
    ///
    /// # Errors
    /// Returns the first error a connection reported while closing; every connection is
    /// closed regardless.
    pub async fn close(&self) -> Result<(), BridgeError> {
        self.inner.close().await
    }

    pub(crate) fn from_inner(inner: Arc<DatabaseInner>) -> Self {
        Self { inner }
    }
}

impl DatabaseInner {
    pub(crate) fn ensure_open(&self) -> Result<(), BridgeError> {
        self.state.ensure_open("Database")
    }

    async fn close(&self) -> Result<(), BridgeError> {
        if !self.state.mark_closed() {
            return Ok(());
        }
        let mut first_error = None;
        for conn in self.connections.begin_close() {
            if let Err(err) = conn.close().await {
                first_error.get_or_insert(err);
            }
        }
        tracing::debug!(path = %self.options.path, "database closed");
        first_error.map_or(Ok(()), Err)
    }
}

impl Drop for DatabaseInner {
    fn drop(&mut self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        match self.native.release() {
            Ok(()) => tracing::debug!(path = %self.options.path, "database released"),
            Err(err) => tracing::warn!(error = %err, "releasing database failed"),
        }
    }
}

/// Reports whether the native database behind a [`Database`] was released.
#[derive(Debug, Clone)]
pub struct ReleaseWatch {
    released: Arc<AtomicBool>,
}

impl ReleaseWatch {
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }
}
