use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::Mutex as AsyncMutex;

use crate::codec::{DataChunk, decode_value};
use crate::config::BufferPolicy;
use crate::engine::{ColumnInfo, NativeResult};
use crate::error::BridgeError;
use crate::metadata::ResultSetMetaData;
use crate::registry::NodeState;
use crate::statement::StatementInner;
use crate::types::{Decimal, Value};

/// Column selector for result getters: a 1-based index or a column label.
pub trait ColumnIndex {
    /// Zero-based position of the column.
    ///
    /// # Errors
    /// Returns `BridgeError::Usage` when no such column exists.
    fn position(&self, columns: &[ColumnInfo]) -> Result<usize, BridgeError>;
}

impl ColumnIndex for usize {
    fn position(&self, columns: &[ColumnInfo]) -> Result<usize, BridgeError> {
        if (1..=columns.len()).contains(self) {
            Ok(self - 1)
        } else {
            Err(BridgeError::Usage(format!(
                "column index {self} out of range (1..={})",
                columns.len()
            )))
        }
    }
}

impl ColumnIndex for i32 {
    fn position(&self, columns: &[ColumnInfo]) -> Result<usize, BridgeError> {
        usize::try_from(*self)
            .map_err(|_| BridgeError::Usage(format!("column index {self} out of range")))?
            .position(columns)
    }
}

impl ColumnIndex for &str {
    fn position(&self, columns: &[ColumnInfo]) -> Result<usize, BridgeError> {
        columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(self))
            .ok_or_else(|| BridgeError::Usage(format!("no column labelled '{self}'")))
    }
}

#[derive(Default)]
struct Cursor {
    chunk: Option<DataChunk>,
    /// Rows of `chunk`, decoded up front under `BufferPolicy::Eager`.
    decoded: Vec<Vec<Value>>,
    index: usize,
    row: u64,
    rows_seen: u64,
    finished: bool,
    was_null: bool,
}

impl Cursor {
    /// Move within the current chunk. `None` means a new chunk is needed.
    fn advance(&mut self) -> Option<bool> {
        if self.finished {
            return Some(false);
        }
        let len = self.chunk.as_ref().map_or(0, DataChunk::len);
        if self.chunk.is_some() && self.index + 1 < len {
            self.index += 1;
            self.rows_seen += 1;
            self.row = self.rows_seen;
            self.was_null = false;
            return Some(true);
        }
        None
    }

    fn load(&mut self, chunk: DataChunk, decoded: Vec<Vec<Value>>) {
        self.chunk = Some(chunk);
        self.decoded = decoded;
        self.index = 0;
        self.rows_seen += 1;
        self.row = self.rows_seen;
        self.was_null = false;
    }

    fn finish(&mut self) {
        self.chunk = None;
        self.decoded.clear();
        self.row = 0;
        self.finished = true;
    }
}

pub(crate) struct ResultSetInner {
    id: u64,
    statement: Weak<StatementInner>,
    state: NodeState,
    native: AsyncMutex<Option<Box<dyn NativeResult>>>,
    columns: Vec<ColumnInfo>,
    policy: BufferPolicy,
    cursor: Mutex<Cursor>,
}

impl ResultSetInner {
    pub(crate) fn new(
        id: u64,
        statement: Weak<StatementInner>,
        native: Box<dyn NativeResult>,
        policy: BufferPolicy,
    ) -> Self {
        Self {
            id,
            statement,
            state: NodeState::default(),
            columns: native.columns().to_vec(),
            native: AsyncMutex::new(Some(native)),
            policy,
            cursor: Mutex::new(Cursor::default()),
        }
    }

    fn cursor(&self) -> MutexGuard<'_, Cursor> {
        self.cursor.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_open(&self) -> Result<(), BridgeError> {
        self.state.ensure_open("ResultSet")
    }

    fn decode_chunk(&self, chunk: &DataChunk) -> Result<Vec<Vec<Value>>, BridgeError> {
        if self.policy == BufferPolicy::Lazy {
            return Ok(Vec::new());
        }
        (0..chunk.len())
            .map(|row| {
                (0..chunk.column_count())
                    .map(|col| match chunk.column(col) {
                        Some(vector) => decode_value(vector, row),
                        None => Ok(Value::Null),
                    })
                    .collect()
            })
            .collect()
    }

    async fn next(&self) -> Result<bool, BridgeError> {
        self.ensure_open()?;
        if let Some(moved) = self.cursor().advance() {
            return Ok(moved);
        }

        let mut native = self.native.lock().await;
        self.ensure_open()?;
        // Another caller may have fetched while this one waited.
        if let Some(moved) = self.cursor().advance() {
            return Ok(moved);
        }
        let Some(source) = native.as_mut() else {
            return Err(BridgeError::Closed("ResultSet"));
        };
        while let Some(chunk) = source.fetch_next().await? {
            if chunk.is_empty() {
                continue;
            }
            let decoded = self.decode_chunk(&chunk)?;
            self.cursor().load(chunk, decoded);
            return Ok(true);
        }
        self.cursor().finish();
        drop(native);

        self.complete().await?;
        Ok(false)
    }

    /// Close the owning statement when it asked to be closed on completion.
    async fn complete(&self) -> Result<(), BridgeError> {
        match self.statement.upgrade() {
            Some(statement) if statement.is_close_on_completion() => statement.close().await,
            _ => Ok(()),
        }
    }

    /// Close without completing the statement; used by cascades and re-execution.
    pub(crate) async fn close_quietly(&self) -> Result<(), BridgeError> {
        if !self.state.mark_closed() {
            return Ok(());
        }
        let native = self.native.lock().await.take();
        *self.cursor() = Cursor::default();
        if let Some(statement) = self.statement.upgrade() {
            statement.results.remove(self.id);
        }
        tracing::debug!(result = self.id, "result set closed");
        match native {
            Some(mut native) => native.release(),
            None => Ok(()),
        }
    }

    /// Best-effort synchronous close for teardown without a runtime.
    pub(crate) fn release_now(&self) {
        if !self.state.mark_closed() {
            return;
        }
        if let Ok(mut native) = self.native.try_lock()
            && let Some(mut native) = native.take()
            && let Err(err) = native.release()
        {
            tracing::warn!(result = self.id, error = %err, "releasing result set failed");
        }
    }

    fn cell(&self, column: usize) -> Result<Value, BridgeError> {
        self.ensure_open()?;
        let mut cursor = self.cursor();
        let value = match &cursor.chunk {
            None => return Err(BridgeError::Usage("result set is not on a row".into())),
            Some(_) if self.policy == BufferPolicy::Eager => cursor
                .decoded
                .get(cursor.index)
                .and_then(|row| row.get(column))
                .cloned()
                .unwrap_or(Value::Null),
            Some(chunk) => match chunk.column(column) {
                Some(vector) => decode_value(vector, cursor.index)?,
                None => Value::Null,
            },
        };
        cursor.was_null = value.is_null();
        Ok(value)
    }
}

impl Drop for ResultSetInner {
    fn drop(&mut self) {
        if !self.state.mark_closed() {
            return;
        }
        if let Some(mut native) = self.native.get_mut().take()
            && let Err(err) = native.release()
        {
            tracing::warn!(result = self.id, error = %err, "releasing dropped result set failed");
        }
        if let Some(statement) = self.statement.upgrade() {
            statement.results.remove(self.id);
        }
    }
}

/// Forward-only cursor over the rows of one execution.
///
/// Rows are addressed through typed getters; a getter returns `None` for SQL NULL and
/// [`ResultSet::was_null`] reports whether the last read cell was NULL.
pub struct ResultSet {
    inner: Arc<ResultSetInner>,
    // Keeps the statement alive while its result is in use; dropped after `inner`.
    _statement: Arc<StatementInner>,
}

impl ResultSet {
    pub(crate) fn from_inner(inner: Arc<ResultSetInner>, statement: Arc<StatementInner>) -> Self {
        Self {
            inner,
            _statement: statement,
        }
    }

    /// Advance to the next row. Past the last row this keeps returning `false`.
    ///
    /// # Errors
    /// Returns `BridgeError::Closed` once the result set is closed, or a decode failure.
    pub async fn next(&self) -> Result<bool, BridgeError> {
        self.inner.next().await
    }

    /// # Errors
    /// Returns `BridgeError::Closed` if closed, `BridgeError::Usage` for an unknown column or
    /// when the cursor is not on a row.
    pub fn get_value(&self, column: impl ColumnIndex) -> Result<Value, BridgeError> {
        let position = column.position(&self.inner.columns)?;
        self.inner.cell(position)
    }

    /// # Errors
    /// As [`ResultSet::get_value`]; `BridgeError::Conversion` for non-boolean cells.
    pub fn get_bool(&self, column: impl ColumnIndex) -> Result<Option<bool>, BridgeError> {
        self.read(column, "bool", |v| match v {
            Value::Boolean(b) => Some(*b),
            other => other.as_i64().map(|i| i != 0),
        })
    }

    /// # Errors
    /// As [`ResultSet::get_value`]; `BridgeError::Conversion` when the cell is not an integer
    /// that fits.
    pub fn get_i32(&self, column: impl ColumnIndex) -> Result<Option<i32>, BridgeError> {
        self.read(column, "i32", |v| v.as_i64().and_then(|i| i32::try_from(i).ok()))
    }

    /// # Errors
    /// As [`ResultSet::get_i32`].
    pub fn get_i64(&self, column: impl ColumnIndex) -> Result<Option<i64>, BridgeError> {
        self.read(column, "i64", |v| match v {
            Value::Varchar(s) => s.trim().parse().ok(),
            other => other.as_i64(),
        })
    }

    /// # Errors
    /// As [`ResultSet::get_value`]; `BridgeError::Conversion` for non-numeric cells.
    pub fn get_f64(&self, column: impl ColumnIndex) -> Result<Option<f64>, BridgeError> {
        self.read(column, "f64", Value::as_f64)
    }

    /// Text of a scalar cell; composite values do not convert.
    ///
    /// # Errors
    /// As [`ResultSet::get_value`]; `BridgeError::Conversion` for composite cells.
    pub fn get_string(&self, column: impl ColumnIndex) -> Result<Option<String>, BridgeError> {
        self.read(column, "string", render_text)
    }

    /// # Errors
    /// As [`ResultSet::get_value`]; `BridgeError::Conversion` for non-numeric cells.
    pub fn get_decimal(&self, column: impl ColumnIndex) -> Result<Option<Decimal>, BridgeError> {
        self.read(column, "decimal", |v| match v {
            Value::Decimal(d) => Some(d.clone()),
            Value::HugeInt(i) | Value::UHugeInt(i) => Some(Decimal::new(i.clone(), 0)),
            Value::Varchar(s) => s.trim().parse().ok(),
            other => other.as_i64().map(|i| Decimal::new(i, 0)),
        })
    }

    /// # Errors
    /// As [`ResultSet::get_value`]; `BridgeError::Conversion` for cells that are not blobs.
    pub fn get_bytes(&self, column: impl ColumnIndex) -> Result<Option<Vec<u8>>, BridgeError> {
        self.read(column, "bytes", |v| v.as_blob().map(<[u8]>::to_vec))
    }

    fn read<T>(
        &self,
        column: impl ColumnIndex,
        target: &str,
        convert: impl FnOnce(&Value) -> Option<T>,
    ) -> Result<Option<T>, BridgeError> {
        let value = self.get_value(column)?;
        if value.is_null() {
            return Ok(None);
        }
        convert(&value).map(Some).ok_or_else(|| {
            BridgeError::Conversion(format!(
                "cannot read {} value as {target}",
                value.host_class_name()
            ))
        })
    }

    /// Whether the last cell read was NULL.
    #[must_use]
    pub fn was_null(&self) -> bool {
        self.inner.cursor().was_null
    }

    /// 1-based position of the column labelled `label`.
    ///
    /// # Errors
    /// Returns `BridgeError::Closed` if closed, `BridgeError::Usage` for an unknown label.
    pub fn find_column(&self, label: &str) -> Result<usize, BridgeError> {
        self.inner.ensure_open()?;
        label.position(&self.inner.columns).map(|p| p + 1)
    }

    /// 1-based number of the current row; 0 before the first and after the last row.
    #[must_use]
    pub fn row_number(&self) -> u64 {
        self.inner.cursor().row
    }

    /// # Errors
    /// Returns `BridgeError::Closed` if closed.
    pub fn metadata(&self) -> Result<ResultSetMetaData, BridgeError> {
        self.inner.ensure_open()?;
        Ok(ResultSetMetaData::new(self.inner.columns.clone()))
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.state.is_closed()
    }

    /// Close the result set; a statement marked close-on-completion closes with it.
    ///
    /// # Errors
    /// Returns the engine's release error; the result set is closed regardless.
    pub async fn close(&self) -> Result<(), BridgeError> {
        let was_open = !self.inner.state.is_closed();
        self.inner.close_quietly().await?;
        if was_open {
            self.inner.complete().await?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for ResultSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultSet")
            .field("columns", &self.inner.columns.len())
            .field("row", &self.row_number())
            .field("closed", &self.is_closed())
            .finish()
    }
}

fn render_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::Varchar(s) => s.clone(),
        Value::Boolean(b) => b.to_string(),
        Value::TinyInt(v) => v.to_string(),
        Value::SmallInt(v) => v.to_string(),
        Value::Integer(v) => v.to_string(),
        Value::BigInt(v) => v.to_string(),
        Value::UTinyInt(v) => v.to_string(),
        Value::USmallInt(v) => v.to_string(),
        Value::UInteger(v) => v.to_string(),
        Value::UBigInt(v) => v.to_string(),
        Value::HugeInt(v) | Value::UHugeInt(v) => v.to_string(),
        Value::Float(v) => v.to_string(),
        Value::Double(v) => v.to_string(),
        Value::Decimal(d) => d.to_string(),
        Value::Date(d) => d.to_string(),
        Value::Time(t) => t.to_string(),
        Value::TimeTz(t) => t.to_string(),
        Value::Timestamp(ts) => ts.to_string(),
        Value::TimestampTz(ts) => ts.to_rfc3339(),
        Value::Interval(i) => i.to_string(),
        _ => return None,
    };
    Some(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::encode_values;
    use crate::types::LogicalType;

    fn columns() -> Vec<ColumnInfo> {
        vec![
            ColumnInfo::new("id", LogicalType::BigInt),
            ColumnInfo::new("Label", LogicalType::Varchar),
        ]
    }

    #[test]
    fn columns_resolve_by_position_and_label() {
        let cols = columns();
        assert_eq!(1usize.position(&cols).unwrap(), 0);
        assert_eq!(2i32.position(&cols).unwrap(), 1);
        assert_eq!("label".position(&cols).unwrap(), 1);
        assert!(0usize.position(&cols).unwrap_err().is_usage());
        assert!((-1i32).position(&cols).unwrap_err().is_usage());
        assert!("missing".position(&cols).unwrap_err().is_usage());
    }

    #[test]
    fn cursor_numbers_rows_across_chunks() {
        let chunk = |values: Vec<Value>| {
            DataChunk::new(vec![encode_values(&LogicalType::BigInt, &values).unwrap()]).unwrap()
        };
        let mut cursor = Cursor::default();
        assert_eq!(cursor.advance(), None);

        cursor.load(chunk(vec![Value::BigInt(1), Value::BigInt(2)]), Vec::new());
        assert_eq!(cursor.row, 1);
        assert_eq!(cursor.advance(), Some(true));
        assert_eq!(cursor.row, 2);
        assert_eq!(cursor.advance(), None);

        cursor.load(chunk(vec![Value::BigInt(3)]), Vec::new());
        assert_eq!(cursor.row, 3);
        cursor.finish();
        assert_eq!(cursor.row, 0);
        assert_eq!(cursor.advance(), Some(false));
    }

    #[test]
    fn scalars_render_as_text_and_composites_do_not() {
        assert_eq!(render_text(&Value::BigInt(-3)).as_deref(), Some("-3"));
        assert_eq!(
            render_text(&Value::Decimal(Decimal::new(12345, 2))).as_deref(),
            Some("123.45")
        );
        assert_eq!(render_text(&Value::List(crate::types::Sequence::list(Vec::new()))), None);
    }
}
