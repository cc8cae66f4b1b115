use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use num_bigint::BigInt;

use super::{Decimal, Interval, LogicalType, MapValue, Sequence, StructValue, TimeTz};

/// Host representation of a decoded engine value, and of bound parameters.
///
/// Every integer width keeps its own variant so a `VARIANT` column can hand back a different
/// host type per row:
/// ```rust
/// use sql_bridge::Value;
///
/// let params = vec![Value::Integer(1), Value::from("alice"), Value::Boolean(true)];
/// assert_eq!(params[1].as_str(), Some("alice"));
/// assert_eq!(params[0].as_i64(), Some(1));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// SQL NULL; also what a NULL `VARIANT` decodes to.
    Null,
    /// A `VARIANT` whose runtime tag names a type but whose payload is NULL.
    TypedNull(LogicalType),
    Boolean(bool),
    TinyInt(i8),
    SmallInt(i16),
    Integer(i32),
    BigInt(i64),
    HugeInt(BigInt),
    UTinyInt(u8),
    USmallInt(u16),
    UInteger(u32),
    UBigInt(u64),
    UHugeInt(BigInt),
    Float(f32),
    Double(f64),
    Decimal(Decimal),
    Varchar(String),
    Blob(Vec<u8>),
    Date(NaiveDate),
    Time(NaiveTime),
    TimeTz(TimeTz),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<FixedOffset>),
    Interval(Interval),
    List(Sequence),
    Array(Sequence),
    Struct(StructValue),
    Map(MapValue),
}

impl Value {
    /// True for both plain NULL and typed NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null | Value::TypedNull(_))
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Any integer variant that fits in `i64`.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::TinyInt(v) => Some(i64::from(*v)),
            Value::SmallInt(v) => Some(i64::from(*v)),
            Value::Integer(v) => Some(i64::from(*v)),
            Value::BigInt(v) => Some(*v),
            Value::UTinyInt(v) => Some(i64::from(*v)),
            Value::USmallInt(v) => Some(i64::from(*v)),
            Value::UInteger(v) => Some(i64::from(*v)),
            Value::UBigInt(v) => i64::try_from(*v).ok(),
            Value::HugeInt(v) | Value::UHugeInt(v) => i64::try_from(v).ok(),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(f64::from(*v)),
            Value::Double(v) => Some(*v),
            Value::Decimal(d) => Some(d.to_f64()),
            _ => self.as_i64().map(|v| v as f64),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Varchar(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_blob(&self) -> Option<&[u8]> {
        match self {
            Value::Blob(b) => Some(b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_decimal(&self) -> Option<&Decimal> {
        match self {
            Value::Decimal(d) => Some(d),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_struct(&self) -> Option<&StructValue> {
        match self {
            Value::Struct(s) => Some(s),
            _ => None,
        }
    }

    /// LIST or ARRAY contents.
    #[must_use]
    pub fn as_sequence(&self) -> Option<&Sequence> {
        match self {
            Value::List(s) | Value::Array(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_map(&self) -> Option<&MapValue> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Name of the host type this value holds, comparable with
    /// [`LogicalType::host_class_name`].
    #[must_use]
    pub fn host_class_name(&self) -> &'static str {
        match self {
            Value::Null | Value::TypedNull(_) => "sql_bridge::Value",
            Value::Boolean(_) => LogicalType::Boolean.host_class_name(),
            Value::TinyInt(_) => LogicalType::TinyInt.host_class_name(),
            Value::SmallInt(_) => LogicalType::SmallInt.host_class_name(),
            Value::Integer(_) => LogicalType::Integer.host_class_name(),
            Value::BigInt(_) => LogicalType::BigInt.host_class_name(),
            Value::HugeInt(_) | Value::UHugeInt(_) => LogicalType::HugeInt.host_class_name(),
            Value::UTinyInt(_) => LogicalType::UTinyInt.host_class_name(),
            Value::USmallInt(_) => LogicalType::USmallInt.host_class_name(),
            Value::UInteger(_) => LogicalType::UInteger.host_class_name(),
            Value::UBigInt(_) => LogicalType::UBigInt.host_class_name(),
            Value::Float(_) => LogicalType::Float.host_class_name(),
            Value::Double(_) => LogicalType::Double.host_class_name(),
            Value::Decimal(_) => LogicalType::DEFAULT_DECIMAL.host_class_name(),
            Value::Varchar(_) => LogicalType::Varchar.host_class_name(),
            Value::Blob(_) => LogicalType::Blob.host_class_name(),
            Value::Date(_) => LogicalType::Date.host_class_name(),
            Value::Time(_) => LogicalType::Time.host_class_name(),
            Value::TimeTz(_) => LogicalType::TimeTz.host_class_name(),
            Value::Timestamp(_) => LogicalType::Timestamp.host_class_name(),
            Value::TimestampTz(_) => LogicalType::TimestampTz.host_class_name(),
            Value::Interval(_) => LogicalType::Interval.host_class_name(),
            Value::List(_) | Value::Array(_) => "sql_bridge::Sequence",
            Value::Struct(_) => "sql_bridge::StructValue",
            Value::Map(_) => "sql_bridge::MapValue",
        }
    }
}

macro_rules! value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v)
                }
            }
        )*
    };
}

value_from! {
    bool => Boolean,
    i8 => TinyInt,
    i16 => SmallInt,
    i32 => Integer,
    i64 => BigInt,
    u8 => UTinyInt,
    u16 => USmallInt,
    u32 => UInteger,
    u64 => UBigInt,
    f32 => Float,
    f64 => Double,
    Decimal => Decimal,
    String => Varchar,
    Vec<u8> => Blob,
    NaiveDate => Date,
    NaiveTime => Time,
    TimeTz => TimeTz,
    NaiveDateTime => Timestamp,
    DateTime<FixedOffset> => TimestampTz,
    Interval => Interval,
    StructValue => Struct,
    MapValue => Map,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Varchar(v.to_string())
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Blob(v.to_vec())
    }
}

impl From<i128> for Value {
    fn from(v: i128) -> Self {
        Value::HugeInt(BigInt::from(v))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}
