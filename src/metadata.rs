//! Column and parameter descriptions. Indexes are 1-based.

use crate::engine::ColumnInfo;
use crate::error::BridgeError;
use crate::types::LogicalType;

/// Whether a column or parameter may hold NULL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Nullability {
    NoNulls,
    Nullable,
    Unknown,
}

impl From<Option<bool>> for Nullability {
    fn from(nullable: Option<bool>) -> Self {
        match nullable {
            Some(true) => Nullability::Nullable,
            Some(false) => Nullability::NoNulls,
            None => Nullability::Unknown,
        }
    }
}

fn lookup<'a, T>(items: &'a [T], index: usize, what: &str) -> Result<&'a T, BridgeError> {
    index
        .checked_sub(1)
        .and_then(|i| items.get(i))
        .ok_or_else(|| {
            BridgeError::Usage(format!(
                "{what} index {index} out of range (1..={})",
                items.len()
            ))
        })
}

/// Shape of a result: one entry per column, in select order.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultSetMetaData {
    columns: Vec<ColumnInfo>,
}

impl ResultSetMetaData {
    pub(crate) fn new(columns: Vec<ColumnInfo>) -> Self {
        Self { columns }
    }

    #[must_use]
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    fn column(&self, index: usize) -> Result<&ColumnInfo, BridgeError> {
        lookup(&self.columns, index, "column")
    }

    /// # Errors
    /// Returns `BridgeError::Usage` for an index outside `1..=column_count`.
    pub fn column_name(&self, index: usize) -> Result<&str, BridgeError> {
        Ok(&self.column(index)?.name)
    }

    /// # Errors
    /// See [`ResultSetMetaData::column_name`].
    pub fn column_type(&self, index: usize) -> Result<&LogicalType, BridgeError> {
        Ok(&self.column(index)?.logical_type)
    }

    /// Engine spelling of the column type, e.g. `DECIMAL(18,7)` or `STRUCT(a INTEGER)`.
    ///
    /// # Errors
    /// See [`ResultSetMetaData::column_name`].
    pub fn column_type_name(&self, index: usize) -> Result<String, BridgeError> {
        Ok(self.column_type(index)?.type_name())
    }

    /// # Errors
    /// See [`ResultSetMetaData::column_name`].
    pub fn column_host_class_name(&self, index: usize) -> Result<&'static str, BridgeError> {
        Ok(self.column_type(index)?.host_class_name())
    }

    /// # Errors
    /// See [`ResultSetMetaData::column_name`].
    pub fn precision(&self, index: usize) -> Result<u8, BridgeError> {
        Ok(self.column_type(index)?.precision())
    }

    /// # Errors
    /// See [`ResultSetMetaData::column_name`].
    pub fn scale(&self, index: usize) -> Result<u8, BridgeError> {
        Ok(self.column_type(index)?.scale())
    }

    /// # Errors
    /// See [`ResultSetMetaData::column_name`].
    pub fn is_signed(&self, index: usize) -> Result<bool, BridgeError> {
        Ok(self.column_type(index)?.is_signed())
    }

    /// # Errors
    /// See [`ResultSetMetaData::column_name`].
    pub fn is_nullable(&self, index: usize) -> Result<Nullability, BridgeError> {
        Ok(self.column(index)?.nullable.into())
    }
}

/// Declared placeholder types of a prepared statement.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterMetaData {
    types: Vec<LogicalType>,
}

impl ParameterMetaData {
    pub(crate) fn new(types: Vec<LogicalType>) -> Self {
        Self { types }
    }

    #[must_use]
    pub fn parameter_count(&self) -> usize {
        self.types.len()
    }

    /// # Errors
    /// Returns `BridgeError::Usage` for an index outside `1..=parameter_count`.
    pub fn parameter_type(&self, index: usize) -> Result<&LogicalType, BridgeError> {
        lookup(&self.types, index, "parameter")
    }

    /// # Errors
    /// See [`ParameterMetaData::parameter_type`].
    pub fn parameter_type_name(&self, index: usize) -> Result<String, BridgeError> {
        Ok(self.parameter_type(index)?.type_name())
    }

    /// # Errors
    /// See [`ParameterMetaData::parameter_type`].
    pub fn parameter_host_class_name(&self, index: usize) -> Result<&'static str, BridgeError> {
        Ok(self.parameter_type(index)?.host_class_name())
    }

    /// # Errors
    /// See [`ParameterMetaData::parameter_type`].
    pub fn precision(&self, index: usize) -> Result<u8, BridgeError> {
        Ok(self.parameter_type(index)?.precision())
    }

    /// # Errors
    /// See [`ParameterMetaData::parameter_type`].
    pub fn scale(&self, index: usize) -> Result<u8, BridgeError> {
        Ok(self.parameter_type(index)?.scale())
    }

    /// # Errors
    /// See [`ParameterMetaData::parameter_type`].
    pub fn is_signed(&self, index: usize) -> Result<bool, BridgeError> {
        Ok(self.parameter_type(index)?.is_signed())
    }

    /// Engines do not report parameter nullability.
    ///
    /// # Errors
    /// See [`ParameterMetaData::parameter_type`].
    pub fn is_nullable(&self, index: usize) -> Result<Nullability, BridgeError> {
        self.parameter_type(index).map(|_| Nullability::Unknown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decimal_parameter_reports_declared_precision_and_scale() {
        let meta = ParameterMetaData::new(vec![
            LogicalType::BigInt,
            LogicalType::Decimal {
                precision: 18,
                scale: 7,
            },
        ]);
        assert_eq!(meta.parameter_count(), 2);
        assert_eq!(meta.precision(2).unwrap(), 18);
        assert_eq!(meta.scale(2).unwrap(), 7);
        assert_eq!(meta.parameter_type_name(2).unwrap(), "DECIMAL(18,7)");
        assert_eq!(meta.parameter_host_class_name(2).unwrap(), "sql_bridge::Decimal");
        assert!(meta.is_signed(1).unwrap());
        assert!(meta.parameter_type(3).unwrap_err().is_usage());
        assert!(meta.parameter_type(0).unwrap_err().is_usage());
    }

    #[test]
    fn struct_column_keeps_field_order_in_type_name() {
        let meta = ResultSetMetaData::new(vec![ColumnInfo {
            name: "s".into(),
            logical_type: LogicalType::Struct(vec![
                ("z".into(), LogicalType::Integer),
                ("a".into(), LogicalType::Varchar),
            ]),
            nullable: Some(false),
        }]);
        assert_eq!(meta.column_name(1).unwrap(), "s");
        assert_eq!(meta.column_type_name(1).unwrap(), "STRUCT(z INTEGER, a VARCHAR)");
        assert_eq!(meta.is_nullable(1).unwrap(), Nullability::NoNulls);
        assert!(!meta.is_signed(1).unwrap());
    }
}
