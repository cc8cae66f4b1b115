use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, TimeDelta};
use num_bigint::BigInt;

use super::vector::{Vector, VectorData};
use crate::error::BridgeError;
use crate::types::{Decimal, LogicalType, MapValue, Sequence, StructValue, TimeTz, Value};

const MICROS_PER_SECOND: i64 = 1_000_000;

/// Decode one cell of a native vector into a host value.
///
/// A row whose validity bit is clear yields `Value::Null` whatever the declared type. Composite
/// types recurse into their children, so a NULL field of a struct is a `Value::Null` at that
/// field's position and never drops the field.
///
/// # Errors
/// Returns `BridgeError::Conversion` if the physical layout does not match the declared type,
/// or if an encoded value is outside what the host type can hold.
pub fn decode_value(vector: &Vector, row: usize) -> Result<Value, BridgeError> {
    if row >= vector.len() {
        return Err(BridgeError::Conversion(format!(
            "row {row} out of range for vector of {} rows",
            vector.len()
        )));
    }
    if !vector.is_valid(row) {
        return Ok(Value::Null);
    }
    let ty = vector.logical_type();
    match (ty, vector.data()) {
        (LogicalType::Null, _) => Ok(Value::Null),
        (LogicalType::Boolean, VectorData::Boolean(v)) => Ok(Value::Boolean(v[row])),
        (LogicalType::TinyInt, VectorData::Int8(v)) => Ok(Value::TinyInt(v[row])),
        (LogicalType::SmallInt, VectorData::Int16(v)) => Ok(Value::SmallInt(v[row])),
        (LogicalType::Integer, VectorData::Int32(v)) => Ok(Value::Integer(v[row])),
        (LogicalType::BigInt, VectorData::Int64(v)) => Ok(Value::BigInt(v[row])),
        (LogicalType::HugeInt, VectorData::Int128(v)) => Ok(Value::HugeInt(BigInt::from(v[row]))),
        (LogicalType::UTinyInt, VectorData::UInt8(v)) => Ok(Value::UTinyInt(v[row])),
        (LogicalType::USmallInt, VectorData::UInt16(v)) => Ok(Value::USmallInt(v[row])),
        (LogicalType::UInteger, VectorData::UInt32(v)) => Ok(Value::UInteger(v[row])),
        (LogicalType::UBigInt, VectorData::UInt64(v)) => Ok(Value::UBigInt(v[row])),
        (LogicalType::UHugeInt, VectorData::UInt128(v)) => {
            Ok(Value::UHugeInt(BigInt::from(v[row])))
        }
        (LogicalType::Float, VectorData::Float32(v)) => Ok(Value::Float(v[row])),
        (LogicalType::Double, VectorData::Float64(v)) => Ok(Value::Double(v[row])),
        (LogicalType::Decimal { scale, .. }, data) => {
            let unscaled = backing_integer(data, row).ok_or_else(|| layout_error(ty, data))?;
            Ok(Value::Decimal(Decimal::new(unscaled, u32::from(*scale))))
        }
        (LogicalType::Varchar, VectorData::Bytes(v)) => String::from_utf8(v[row].clone())
            .map(Value::Varchar)
            .map_err(|e| BridgeError::Conversion(format!("VARCHAR is not valid UTF-8: {e}"))),
        (LogicalType::Blob, VectorData::Bytes(v)) => Ok(Value::Blob(v[row].clone())),
        (LogicalType::Date, VectorData::Int32(v)) => decode_date(v[row]).map(Value::Date),
        (LogicalType::Time, VectorData::Int64(v)) => decode_time(v[row]).map(Value::Time),
        (LogicalType::TimeTz, VectorData::TimeTz(v)) => {
            let (micros, offset_seconds) = v[row];
            let offset = FixedOffset::east_opt(offset_seconds).ok_or_else(|| {
                BridgeError::Conversion(format!("invalid UTC offset {offset_seconds}s"))
            })?;
            Ok(Value::TimeTz(TimeTz::new(decode_time(micros)?, offset)))
        }
        (LogicalType::Timestamp, VectorData::Int64(v)) => {
            decode_instant(v[row]).map(|ts| Value::Timestamp(ts.naive_utc()))
        }
        (LogicalType::TimestampTz, VectorData::Int64(v)) => {
            decode_instant(v[row]).map(|ts| Value::TimestampTz(ts.fixed_offset()))
        }
        (LogicalType::Interval, VectorData::Interval(v)) => Ok(Value::Interval(v[row])),
        (LogicalType::Enum(labels), data) => {
            let ordinal = enum_ordinal(data, row).ok_or_else(|| layout_error(ty, data))?;
            labels
                .get(ordinal)
                .map(|label| Value::Varchar(label.clone()))
                .ok_or_else(|| {
                    BridgeError::Conversion(format!(
                        "enum ordinal {ordinal} outside dictionary of {} labels",
                        labels.len()
                    ))
                })
        }
        (LogicalType::List(_), VectorData::List { entries, child }) => {
            let entry = entries[row];
            let items = decode_range(child, entry.offset, entry.length)?;
            Ok(Value::List(Sequence::list(items)))
        }
        (LogicalType::Array(_, size), VectorData::Array { child }) => {
            let start = row
                .checked_mul(*size)
                .ok_or_else(|| BridgeError::Conversion(format!("array row {row} overflows")))?;
            let items = decode_range(child, start, *size)?;
            Ok(Value::Array(Sequence::array(items, *size)))
        }
        (LogicalType::Map(..), VectorData::List { entries, child }) => {
            let entry = entries[row];
            let pairs = decode_map_entries(child, entry.offset, entry.length)?;
            Ok(Value::Map(MapValue::from_pairs(pairs)))
        }
        (LogicalType::Struct(fields), VectorData::Struct(children))
            if fields.len() == children.len() =>
        {
            let mut decoded = Vec::with_capacity(fields.len());
            for ((name, _), child) in fields.iter().zip(children) {
                decoded.push((name.clone(), decode_value(child, row)?));
            }
            Ok(Value::Struct(StructValue::new(decoded)))
        }
        (LogicalType::Union(members), VectorData::Union { tags, members: vectors })
            if members.len() == vectors.len() =>
        {
            let tag = usize::from(tags[row]);
            let member = vectors.get(tag).ok_or_else(|| {
                BridgeError::Conversion(format!("union tag {tag} has no member"))
            })?;
            decode_value(member, row)
        }
        (
            LogicalType::Variant,
            VectorData::Variant {
                tags,
                offsets,
                children,
            },
        ) => decode_variant(children, usize::from(tags[row]), offsets[row] as usize),
        (_, data) => Err(layout_error(ty, data)),
    }
}

/// Resolve one variant cell: the tag picks the child whose logical type is the runtime type,
/// and the payload is decoded by that type's own rule.
fn decode_variant(children: &[Vector], tag: usize, offset: usize) -> Result<Value, BridgeError> {
    let child = children
        .get(tag)
        .ok_or_else(|| BridgeError::Conversion(format!("variant tag {tag} has no child")))?;
    if !child.is_valid(offset) {
        return Ok(Value::TypedNull(child.logical_type().clone()));
    }
    decode_value(child, offset)
}

fn decode_range(child: &Vector, offset: usize, length: usize) -> Result<Vec<Value>, BridgeError> {
    (offset..range_end(offset, length)?)
        .map(|i| decode_value(child, i))
        .collect()
}

fn decode_map_entries(
    child: &Vector,
    offset: usize,
    length: usize,
) -> Result<Vec<(Value, Value)>, BridgeError> {
    let VectorData::Struct(parts) = child.data() else {
        return Err(layout_error(child.logical_type(), child.data()));
    };
    let [keys, values] = parts.as_slice() else {
        return Err(BridgeError::Conversion(format!(
            "map entries need 2 fields, found {}",
            parts.len()
        )));
    };
    (offset..range_end(offset, length)?)
        .map(|i| Ok((decode_value(keys, i)?, decode_value(values, i)?)))
        .collect()
}

fn range_end(offset: usize, length: usize) -> Result<usize, BridgeError> {
    offset.checked_add(length).ok_or_else(|| {
        BridgeError::Conversion(format!("child range {offset}+{length} overflows"))
    })
}

/// Decimal payloads may arrive in any integer width; the declared scale decides the meaning.
fn backing_integer(data: &VectorData, row: usize) -> Option<BigInt> {
    match data {
        VectorData::Int16(v) => Some(BigInt::from(v[row])),
        VectorData::Int32(v) => Some(BigInt::from(v[row])),
        VectorData::Int64(v) => Some(BigInt::from(v[row])),
        VectorData::Int128(v) => Some(BigInt::from(v[row])),
        _ => None,
    }
}

fn enum_ordinal(data: &VectorData, row: usize) -> Option<usize> {
    match data {
        VectorData::UInt8(v) => Some(usize::from(v[row])),
        VectorData::UInt16(v) => Some(usize::from(v[row])),
        VectorData::UInt32(v) => usize::try_from(v[row]).ok(),
        _ => None,
    }
}

fn decode_date(days: i32) -> Result<NaiveDate, BridgeError> {
    NaiveDate::from_ymd_opt(1970, 1, 1)
        .and_then(|epoch| epoch.checked_add_signed(TimeDelta::days(i64::from(days))))
        .ok_or_else(|| BridgeError::Conversion(format!("date {days} days from epoch out of range")))
}

fn decode_time(micros: i64) -> Result<NaiveTime, BridgeError> {
    let secs = u32::try_from(micros.div_euclid(MICROS_PER_SECOND)).ok();
    let nanos = u32::try_from(micros.rem_euclid(MICROS_PER_SECOND) * 1_000).ok();
    secs.zip(nanos)
        .and_then(|(s, n)| NaiveTime::from_num_seconds_from_midnight_opt(s, n))
        .ok_or_else(|| BridgeError::Conversion(format!("time of {micros}us out of range")))
}

fn decode_instant(micros: i64) -> Result<DateTime<chrono::Utc>, BridgeError> {
    DateTime::from_timestamp_micros(micros)
        .ok_or_else(|| BridgeError::Conversion(format!("timestamp {micros}us out of range")))
}

fn layout_error(ty: &LogicalType, data: &VectorData) -> BridgeError {
    BridgeError::Conversion(format!(
        "vector of type {ty} has unexpected physical layout {}",
        layout_name(data)
    ))
}

fn layout_name(data: &VectorData) -> &'static str {
    match data {
        VectorData::Null => "null",
        VectorData::Boolean(_) => "boolean",
        VectorData::Int8(_) => "int8",
        VectorData::Int16(_) => "int16",
        VectorData::Int32(_) => "int32",
        VectorData::Int64(_) => "int64",
        VectorData::Int128(_) => "int128",
        VectorData::UInt8(_) => "uint8",
        VectorData::UInt16(_) => "uint16",
        VectorData::UInt32(_) => "uint32",
        VectorData::UInt64(_) => "uint64",
        VectorData::UInt128(_) => "uint128",
        VectorData::Float32(_) => "float32",
        VectorData::Float64(_) => "float64",
        VectorData::Bytes(_) => "bytes",
        VectorData::TimeTz(_) => "timetz",
        VectorData::Interval(_) => "interval",
        VectorData::List { .. } => "list",
        VectorData::Array { .. } => "array",
        VectorData::Struct(_) => "struct",
        VectorData::Union { .. } => "union",
        VectorData::Variant { .. } => "variant",
    }
}
