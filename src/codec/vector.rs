use crate::error::BridgeError;
use crate::types::{Interval, LogicalType};

/// Position of one list row inside the flattened child vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ListEntry {
    pub offset: usize,
    pub length: usize,
}

/// Physical storage of a native vector. Which variant backs which logical type:
///
/// - integers, floats and booleans use the matching fixed-width buffer
/// - `DECIMAL` uses `Int16`/`Int32`/`Int64`/`Int128` as the engine chose for the precision
/// - `DATE` is `Int32` days since 1970-01-01, `TIME` is `Int64` microseconds since midnight,
///   `TIMESTAMP`/`TIMESTAMP WITH TIME ZONE` are `Int64` microseconds since the epoch (UTC)
/// - `TIME WITH TIME ZONE` is `TimeTz` (microseconds, offset seconds)
/// - `VARCHAR`/`BLOB` are length-prefixed byte strings
/// - `ENUM` is `UInt8`/`UInt16`/`UInt32` ordinals into the type's dictionary
/// - `MAP` is a `List` whose child is a two-field `{key, value}` struct
/// - `VARIANT` is a dense union: a per-row tag selecting a child vector whose logical type is
///   the runtime type of that row, plus the row's offset inside it
#[derive(Debug, Clone, PartialEq)]
pub enum VectorData {
    Null,
    Boolean(Vec<bool>),
    Int8(Vec<i8>),
    Int16(Vec<i16>),
    Int32(Vec<i32>),
    Int64(Vec<i64>),
    Int128(Vec<i128>),
    UInt8(Vec<u8>),
    UInt16(Vec<u16>),
    UInt32(Vec<u32>),
    UInt64(Vec<u64>),
    UInt128(Vec<u128>),
    Float32(Vec<f32>),
    Float64(Vec<f64>),
    Bytes(Vec<Vec<u8>>),
    TimeTz(Vec<(i64, i32)>),
    Interval(Vec<Interval>),
    List {
        entries: Vec<ListEntry>,
        child: Box<Vector>,
    },
    Array {
        child: Box<Vector>,
    },
    Struct(Vec<Vector>),
    Union {
        tags: Vec<u8>,
        members: Vec<Vector>,
    },
    Variant {
        tags: Vec<u16>,
        offsets: Vec<u32>,
        children: Vec<Vector>,
    },
}

impl VectorData {
    /// Rows the per-row buffers cover. `None` for layouts whose rows live in child vectors,
    /// which check their own bounds.
    fn rows(&self) -> Option<usize> {
        Some(match self {
            VectorData::Null | VectorData::Array { .. } | VectorData::Struct(_) => return None,
            VectorData::Boolean(v) => v.len(),
            VectorData::Int8(v) => v.len(),
            VectorData::Int16(v) => v.len(),
            VectorData::Int32(v) => v.len(),
            VectorData::Int64(v) => v.len(),
            VectorData::Int128(v) => v.len(),
            VectorData::UInt8(v) => v.len(),
            VectorData::UInt16(v) => v.len(),
            VectorData::UInt32(v) => v.len(),
            VectorData::UInt64(v) => v.len(),
            VectorData::UInt128(v) => v.len(),
            VectorData::Float32(v) => v.len(),
            VectorData::Float64(v) => v.len(),
            VectorData::Bytes(v) => v.len(),
            VectorData::TimeTz(v) => v.len(),
            VectorData::Interval(v) => v.len(),
            VectorData::List { entries, .. } => entries.len(),
            VectorData::Union { tags, .. } => tags.len(),
            VectorData::Variant { tags, offsets, .. } => tags.len().min(offsets.len()),
        })
    }
}

/// One column of a native result chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct Vector {
    logical_type: LogicalType,
    len: usize,
    validity: Option<Vec<bool>>,
    data: VectorData,
}

impl Vector {
    /// Assemble a vector from its parts. `validity` of `None` means every row is valid.
    ///
    /// # Errors
    /// Returns `BridgeError::Conversion` if the validity mask or the data buffer does not
    /// cover `len` rows.
    pub fn new(
        logical_type: LogicalType,
        len: usize,
        validity: Option<Vec<bool>>,
        data: VectorData,
    ) -> Result<Self, BridgeError> {
        if let Some(mask) = &validity
            && mask.len() != len
        {
            return Err(BridgeError::Conversion(format!(
                "validity mask covers {} rows, vector has {len}",
                mask.len()
            )));
        }
        if let Some(rows) = data.rows()
            && rows < len
        {
            return Err(BridgeError::Conversion(format!(
                "data buffer covers {rows} rows, vector has {len}"
            )));
        }
        Ok(Self {
            logical_type,
            len,
            validity,
            data,
        })
    }

    /// A vector of `len` NULLs of the given type.
    #[must_use]
    pub fn all_null(logical_type: LogicalType, len: usize) -> Self {
        Self {
            logical_type,
            len,
            validity: Some(vec![false; len]),
            data: VectorData::Null,
        }
    }

    #[must_use]
    pub fn logical_type(&self) -> &LogicalType {
        &self.logical_type
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[must_use]
    pub fn data(&self) -> &VectorData {
        &self.data
    }

    #[must_use]
    pub fn is_valid(&self, row: usize) -> bool {
        match &self.validity {
            Some(mask) => mask.get(row).copied().unwrap_or(false),
            None => row < self.len,
        }
    }
}

/// A horizontal slice of a result: equal-length column vectors.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DataChunk {
    columns: Vec<Vector>,
    len: usize,
}

impl DataChunk {
    /// # Errors
    /// Returns `BridgeError::Conversion` if the columns disagree on row count.
    pub fn new(columns: Vec<Vector>) -> Result<Self, BridgeError> {
        let len = columns.first().map_or(0, Vector::len);
        if let Some(bad) = columns.iter().find(|c| c.len() != len) {
            return Err(BridgeError::Conversion(format!(
                "chunk column of type {} has {} rows, expected {len}",
                bad.logical_type(),
                bad.len()
            )));
        }
        Ok(Self { columns, len })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[must_use]
    pub fn column(&self, index: usize) -> Option<&Vector> {
        self.columns.get(index)
    }

    #[must_use]
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }
}
