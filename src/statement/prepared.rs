use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};

use super::core::{Executed, StatementInner, StatementKind};
use super::{BatchState, statement_common};
use crate::connection::ConnectionInner;
use crate::error::BridgeError;
use crate::metadata::{ParameterMetaData, ResultSetMetaData};
use crate::result_set::ResultSet;
use crate::types::{Decimal, Value};

/// Statement prepared once and executed with bound parameters.
///
/// Parameter indexes are 1-based.
pub struct PreparedStatement {
    inner: Arc<StatementInner>,
}

impl PreparedStatement {
    pub(crate) async fn prepare(
        connection: &Arc<ConnectionInner>,
        sql: &str,
    ) -> Result<Self, BridgeError> {
        connection.ensure_open()?;
        let prepared = {
            let token = connection.next_token();
            let _permit = connection.enter(token).await?;
            connection.native.prepare(sql).await?
        };
        let id = prepared.id;
        match StatementInner::create(connection, StatementKind::Prepared(prepared)) {
            Ok(inner) => {
                tracing::debug!(prepared = id, "prepared statement");
                Ok(Self { inner })
            }
            Err(err) => {
                if let Err(release_err) = connection.native.release_prepared(id) {
                    tracing::warn!(error = %release_err, "releasing refused statement failed");
                }
                Err(err)
            }
        }
    }

    fn bound_params(&self) -> Result<Vec<Value>, BridgeError> {
        self.inner
            .params()
            .iter()
            .enumerate()
            .map(|(idx, slot)| {
                slot.clone().ok_or_else(|| {
                    BridgeError::Usage(format!("parameter {} is not bound", idx + 1))
                })
            })
            .collect()
    }

    /// Execute with the bound parameters; `true` when a result set was produced.
    ///
    /// # Errors
    /// Returns `BridgeError::PendingBatch` while a batch is queued, `BridgeError::Usage` for
    /// unbound parameters, and the engine's error otherwise.
    pub async fn execute(&self) -> Result<bool, BridgeError> {
        self.inner.ensure_open()?;
        self.inner.ensure_no_batch()?;
        let params = self.bound_params()?;
        let executed = self.inner.execute_native(None, params).await?;
        Ok(matches!(executed, Executed::Rows(_)))
    }

    /// Execute and return the rows.
    ///
    /// # Errors
    /// As [`PreparedStatement::execute`]; `BridgeError::Usage` if the statement returns no rows.
    pub async fn execute_query(&self) -> Result<ResultSet, BridgeError> {
        self.inner.ensure_open()?;
        self.inner.ensure_no_batch()?;
        let params = self.bound_params()?;
        match self.inner.execute_native(None, params).await? {
            Executed::Rows(result) => {
                self.inner.take_result();
                Ok(ResultSet::from_inner(result, Arc::clone(&self.inner)))
            }
            Executed::Count(_) => Err(BridgeError::Usage(
                "execute_query can only be used with statements that return rows".into(),
            )),
        }
    }

    /// Execute and return the number of changed rows.
    ///
    /// # Errors
    /// As [`PreparedStatement::execute`]; `BridgeError::Usage` if the statement returns rows.
    pub async fn execute_update(&self) -> Result<u64, BridgeError> {
        self.inner.ensure_open()?;
        self.inner.ensure_no_batch()?;
        let params = self.bound_params()?;
        match self.inner.execute_native(None, params).await? {
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

    /// Bind `value` to parameter `index`.
    ///
    /// # Errors
    /// Returns `BridgeError::Usage` for an index outside `1..=parameter_count`.
    pub fn set(&self, index: usize, value: impl Into<Value>) -> Result<(), BridgeError> {
        self.inner.ensure_open()?;
        let mut params = self.inner.params();
        let count = params.len();
        let slot = index
            .checked_sub(1)
            .and_then(|i| params.get_mut(i))
            .ok_or_else(|| {
                BridgeError::Usage(format!("parameter index {index} out of range (1..={count})"))
            })?;
        *slot = Some(value.into());
        Ok(())
    }

    /// # Errors
    /// See [`PreparedStatement::set`].
    pub fn set_null(&self, index: usize) -> Result<(), BridgeError> {
        self.set(index, Value::Null)
    }

    /// # Errors
    /// See [`PreparedStatement::set`].
    pub fn set_bool(&self, index: usize, value: bool) -> Result<(), BridgeError> {
        self.set(index, value)
    }

    /// # Errors
    /// See [`PreparedStatement::set`].
    pub fn set_i32(&self, index: usize, value: i32) -> Result<(), BridgeError> {
        self.set(index, value)
    }

    /// # Errors
    /// See [`PreparedStatement::set`].
    pub fn set_i64(&self, index: usize, value: i64) -> Result<(), BridgeError> {
        self.set(index, value)
    }

    /// # Errors
    /// See [`PreparedStatement::set`].
    pub fn set_f64(&self, index: usize, value: f64) -> Result<(), BridgeError> {
        self.set(index, value)
    }

    /// # Errors
    /// See [`PreparedStatement::set`].
    pub fn set_string(&self, index: usize, value: impl Into<String>) -> Result<(), BridgeError> {
        self.set(index, value.into())
    }

    /// # Errors
    /// See [`PreparedStatement::set`].
    pub fn set_decimal(&self, index: usize, value: Decimal) -> Result<(), BridgeError> {
        self.set(index, value)
    }

    /// # Errors
    /// See [`PreparedStatement::set`].
    pub fn set_bytes(&self, index: usize, value: &[u8]) -> Result<(), BridgeError> {
        self.set(index, value)
    }

    /// # Errors
    /// See [`PreparedStatement::set`].
    pub fn set_date(&self, index: usize, value: NaiveDate) -> Result<(), BridgeError> {
        self.set(index, value)
    }

    /// # Errors
    /// See [`PreparedStatement::set`].
    pub fn set_timestamp(&self, index: usize, value: NaiveDateTime) -> Result<(), BridgeError> {
        self.set(index, value)
    }

    /// Unbind every parameter.
    ///
    /// # Errors
    /// Returns `BridgeError::Closed` if the statement is closed.
    pub fn clear_parameters(&self) -> Result<(), BridgeError> {
        self.inner.ensure_open()?;
        self.inner.params().iter_mut().for_each(|slot| *slot = None);
        Ok(())
    }

    /// Queue the currently bound parameters as one batch entry and unbind them.
    ///
    /// # Errors
    /// Returns `BridgeError::Usage` if a parameter is unbound.
    pub fn add_batch(&self) -> Result<(), BridgeError> {
        self.inner.ensure_open()?;
        let row = self.bound_params()?;
        self.inner.batch().push_row(row);
        self.inner.params().iter_mut().for_each(|slot| *slot = None);
        Ok(())
    }

    /// Prepared statements only batch parameter rows.
    ///
    /// # Errors
    /// Always returns `BridgeError::Usage` (or `Closed` once closed).
    pub fn add_batch_sql(&self, _sql: &str) -> Result<(), BridgeError> {
        self.inner.ensure_open()?;
        Err(BridgeError::Usage(
            "Cannot add batched SQL statement to PreparedStatement".into(),
        ))
    }

    /// Declared types of the placeholders, available before anything is bound.
    ///
    /// # Errors
    /// Returns `BridgeError::Closed` if the statement is closed.
    pub fn parameter_metadata(&self) -> Result<ParameterMetaData, BridgeError> {
        self.inner.ensure_open()?;
        let types = self
            .inner
            .prepared()
            .map(|p| p.parameter_types.clone())
            .unwrap_or_default();
        Ok(ParameterMetaData::new(types))
    }

    /// Declared result columns, as far as the engine knows them before execution.
    ///
    /// # Errors
    /// Returns `BridgeError::Closed` if the statement is closed.
    pub fn metadata(&self) -> Result<ResultSetMetaData, BridgeError> {
        self.inner.ensure_open()?;
        let columns = self
            .inner
            .prepared()
            .map(|p| p.columns.clone())
            .unwrap_or_default();
        Ok(ResultSetMetaData::new(columns))
    }

    #[must_use]
    pub fn parameter_count(&self) -> usize {
        self.inner.params().len()
    }
}

statement_common!(PreparedStatement);

impl std::fmt::Debug for PreparedStatement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreparedStatement")
            .field("closed", &self.inner.is_closed())
            .field("parameters", &self.parameter_count())
            .field("batch", &self.inner.batch().state())
            .finish_non_exhaustive()
    }
}
