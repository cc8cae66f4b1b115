use std::str::FromStr;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use num_bigint::BigInt;
use rusqlite::types::Value as SqliteValue;
use serde_json::Value as JsonValue;

use super::params::{DATE_FORMAT, TIME_FORMAT, TIMESTAMP_FORMAT};
use crate::codec::{DataChunk, encode_values};
use crate::engine::ColumnInfo;
use crate::error::BridgeError;
use crate::types::{
    Decimal, Interval, LogicalType, MapValue, Sequence, StructValue, TimeTz, Value,
};

/// Rows per chunk handed to the driver.
pub(super) const CHUNK_ROWS: usize = 2048;

/// Type of a column SQLite reported no usable declaration for, derived from what it holds.
pub(super) fn infer_column_type(rows: &[Vec<SqliteValue>], column: usize) -> LogicalType {
    let mut found: Option<LogicalType> = None;
    for value in rows.iter().filter_map(|row| row.get(column)) {
        let ty = match value {
            SqliteValue::Null => continue,
            SqliteValue::Integer(_) => LogicalType::BigInt,
            SqliteValue::Real(_) => LogicalType::Double,
            SqliteValue::Text(_) => LogicalType::Varchar,
            SqliteValue::Blob(_) => LogicalType::Blob,
        };
        match &found {
            None => found = Some(ty),
            Some(existing) if *existing == ty => {}
            Some(_) => return LogicalType::Variant,
        }
    }
    found.unwrap_or(LogicalType::Null)
}

/// Lift materialized rows into native chunks.
pub(super) fn build_chunks(
    columns: &[ColumnInfo],
    rows: &[Vec<SqliteValue>],
) -> Result<Vec<DataChunk>, BridgeError> {
    rows.chunks(CHUNK_ROWS)
        .map(|block| {
            let vectors = columns
                .iter()
                .enumerate()
                .map(|(col, info)| {
                    let values = block
                        .iter()
                        .map(|row| {
                            let cell = row.get(col).unwrap_or(&SqliteValue::Null);
                            lift(&info.logical_type, cell).map_err(|err| {
                                BridgeError::Conversion(format!("column {}: {err}", info.name))
                            })
                        })
                        .collect::<Result<Vec<_>, _>>()?;
                    encode_values(&info.logical_type, &values)
                })
                .collect::<Result<Vec<_>, _>>()?;
            DataChunk::new(vectors)
        })
        .collect()
}

/// Host value of one stored SQLite value, read as the declared type.
pub(super) fn lift(ty: &LogicalType, value: &SqliteValue) -> Result<Value, BridgeError> {
    match (ty, value) {
        (_, SqliteValue::Null) | (LogicalType::Null, _) => Ok(Value::Null),
        (LogicalType::Variant | LogicalType::Unknown, v) => Ok(storage_value(v)),
        (LogicalType::Blob, SqliteValue::Blob(b)) => Ok(Value::Blob(b.clone())),
        (LogicalType::Varchar, SqliteValue::Blob(b)) => String::from_utf8(b.clone())
            .map(Value::Varchar)
            .map_err(|e| conversion(ty, e)),
        (LogicalType::Decimal { .. }, SqliteValue::Blob(b)) => std::str::from_utf8(b)
            .map_err(|e| conversion(ty, e))
            .and_then(Decimal::from_str)
            .map(Value::Decimal),
        (_, SqliteValue::Integer(i)) => lift_integer(ty, *i),
        (_, SqliteValue::Real(f)) => lift_real(ty, *f),
        (_, SqliteValue::Text(s)) => lift_text(ty, s),
        (_, SqliteValue::Blob(_)) => Err(BridgeError::Conversion(format!(
            "BLOB cannot be read as {ty}"
        ))),
    }
}

fn storage_value(value: &SqliteValue) -> Value {
    match value {
        SqliteValue::Null => Value::Null,
        SqliteValue::Integer(i) => Value::BigInt(*i),
        SqliteValue::Real(f) => Value::Double(*f),
        SqliteValue::Text(s) => Value::Varchar(s.clone()),
        SqliteValue::Blob(b) => Value::Blob(b.clone()),
    }
}

fn lift_integer(ty: &LogicalType, i: i64) -> Result<Value, BridgeError> {
    Ok(match ty {
        LogicalType::Boolean => Value::Boolean(i != 0),
        LogicalType::HugeInt => Value::HugeInt(BigInt::from(i)),
        LogicalType::UHugeInt => Value::UHugeInt(BigInt::from(i)),
        LogicalType::Float => Value::Float(i as f32),
        LogicalType::Double => Value::Double(i as f64),
        LogicalType::Decimal { .. } => Value::Decimal(Decimal::new(i, 0)),
        LogicalType::Varchar => Value::Varchar(i.to_string()),
        LogicalType::Timestamp => Value::Timestamp(epoch_seconds(i, ty)?.naive_utc()),
        LogicalType::TimestampTz => Value::TimestampTz(epoch_seconds(i, ty)?.fixed_offset()),
        LogicalType::Interval => Value::Interval(Interval::new(0, 0, i)),
        // Width checks happen when the value is stored into its vector.
        _ if is_integer(ty) => integer_value(ty, BigInt::from(i))?,
        _ => return Err(BridgeError::Conversion(format!("INTEGER cannot be read as {ty}"))),
    })
}

fn lift_real(ty: &LogicalType, f: f64) -> Result<Value, BridgeError> {
    Ok(match ty {
        LogicalType::Float => Value::Float(f as f32),
        LogicalType::Double => Value::Double(f),
        LogicalType::Varchar => Value::Varchar(f.to_string()),
        LogicalType::Decimal { .. } => Value::Decimal(
            Decimal::from_str(&f.to_string()).map_err(|e| conversion(ty, e))?,
        ),
        _ if is_integer(ty) && f.fract() == 0.0 && f.is_finite() => {
            integer_value(ty, BigInt::from(f as i64))?
        }
        _ => return Err(BridgeError::Conversion(format!("REAL {f} cannot be read as {ty}"))),
    })
}

/// Parse text as the declared type. Also used for JSON object keys of maps.
pub(super) fn lift_text(ty: &LogicalType, s: &str) -> Result<Value, BridgeError> {
    Ok(match ty {
        LogicalType::Null => Value::Null,
        LogicalType::Variant
        | LogicalType::Unknown
        | LogicalType::Varchar
        | LogicalType::Enum(_) => Value::Varchar(s.to_string()),
        LogicalType::Blob => Value::Blob(s.as_bytes().to_vec()),
        LogicalType::Boolean => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "t" | "1" => Value::Boolean(true),
            "false" | "f" | "0" => Value::Boolean(false),
            _ => return Err(BridgeError::Conversion(format!("'{s}' is not a BOOLEAN"))),
        },
        LogicalType::Float => Value::Float(s.trim().parse().map_err(|e| conversion(ty, e))?),
        LogicalType::Double => Value::Double(s.trim().parse().map_err(|e| conversion(ty, e))?),
        LogicalType::Decimal { .. } => {
            Value::Decimal(Decimal::from_str(s.trim()).map_err(|e| conversion(ty, e))?)
        }
        LogicalType::Date => Value::Date(
            NaiveDate::parse_from_str(s.trim(), DATE_FORMAT).map_err(|e| conversion(ty, e))?,
        ),
        LogicalType::Time => Value::Time(
            NaiveTime::parse_from_str(s.trim(), TIME_FORMAT).map_err(|e| conversion(ty, e))?,
        ),
        LogicalType::TimeTz => {
            let stamped = format!("1970-01-01 {}", s.trim());
            let parsed = DateTime::parse_from_str(&stamped, "%Y-%m-%d %H:%M:%S%.f%:z")
                .map_err(|e| conversion(ty, e))?;
            Value::TimeTz(TimeTz::new(parsed.time(), *parsed.offset()))
        }
        LogicalType::Timestamp => {
            Value::Timestamp(parse_timestamp(s).map_err(|e| conversion(ty, e))?)
        }
        LogicalType::TimestampTz => {
            Value::TimestampTz(parse_timestamp_tz(s).map_err(|e| conversion(ty, e))?)
        }
        LogicalType::Interval => Value::Interval(parse_interval(s).ok_or_else(|| {
            BridgeError::Conversion(format!("'{s}' is not an INTERVAL"))
        })?),
        LogicalType::List(_)
        | LogicalType::Array(..)
        | LogicalType::Struct(_)
        | LogicalType::Map(..)
        | LogicalType::Union(_) => {
            let json: JsonValue = serde_json::from_str(s).map_err(|e| conversion(ty, e))?;
            from_json(ty, &json)?
        }
        _ if is_integer(ty) => {
            let parsed = BigInt::from_str(s.trim()).map_err(|e| conversion(ty, e))?;
            integer_value(ty, parsed)?
        }
        _ => return Err(BridgeError::Conversion(format!("TEXT cannot be read as {ty}"))),
    })
}

/// Host value of a JSON document read as the declared type.
pub(super) fn from_json(ty: &LogicalType, json: &JsonValue) -> Result<Value, BridgeError> {
    match (ty, json) {
        (_, JsonValue::Null) => Ok(Value::Null),
        (LogicalType::Variant | LogicalType::Unknown, _) => Ok(json_variant(json)),
        (LogicalType::Blob, JsonValue::String(s)) => hex::decode(s)
            .map(Value::Blob)
            .map_err(|e| conversion(ty, e)),
        (LogicalType::Varchar | LogicalType::Enum(_), JsonValue::String(s)) => {
            Ok(Value::Varchar(s.clone()))
        }
        (_, JsonValue::String(s)) => lift_text(ty, s),
        (LogicalType::Boolean, JsonValue::Bool(b)) => Ok(Value::Boolean(*b)),
        (_, JsonValue::Number(n)) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => lift_integer(ty, i),
            (None, _) if n.is_u64() => lift_text(ty, &n.to_string()),
            (None, Some(f)) => lift_real(ty, f),
            (None, None) => lift_text(ty, &n.to_string()),
        },
        (LogicalType::List(child), JsonValue::Array(items)) => Ok(Value::List(Sequence::list(
            items
                .iter()
                .map(|item| from_json(child, item))
                .collect::<Result<_, _>>()?,
        ))),
        (LogicalType::Array(child, size), JsonValue::Array(items)) => {
            let values = items
                .iter()
                .map(|item| from_json(child, item))
                .collect::<Result<_, _>>()?;
            Ok(Value::Array(Sequence::array(values, *size)))
        }
        (LogicalType::Struct(fields), JsonValue::Object(object)) => {
            let mut values = Vec::with_capacity(fields.len());
            for (name, field_ty) in fields {
                let field = object.get(name).unwrap_or(&JsonValue::Null);
                values.push((name.clone(), from_json(field_ty, field)?));
            }
            Ok(Value::Struct(StructValue::new(values)))
        }
        (LogicalType::Map(key_ty, value_ty), JsonValue::Array(entries)) => {
            let mut pairs = Vec::with_capacity(entries.len());
            for entry in entries {
                let JsonValue::Object(fields) = entry else {
                    return Err(BridgeError::Conversion(format!(
                        "{ty} entries must be {{\"key\", \"value\"}} objects"
                    )));
                };
                let key = fields.get(MapValue::KEY).unwrap_or(&JsonValue::Null);
                let val = fields.get(MapValue::VALUE).unwrap_or(&JsonValue::Null);
                pairs.push((from_json(key_ty, key)?, from_json(value_ty, val)?));
            }
            Ok(Value::Map(MapValue::from_pairs(pairs)))
        }
        (LogicalType::Map(key_ty, value_ty), JsonValue::Object(object)) => {
            let mut pairs = Vec::with_capacity(object.len());
            for (key, val) in object {
                pairs.push((lift_text(key_ty, key)?, from_json(value_ty, val)?));
            }
            Ok(Value::Map(MapValue::from_pairs(pairs)))
        }
        (LogicalType::Union(members), JsonValue::Object(object)) if object.len() == 1 => {
            let Some((name, payload)) = object.iter().next() else {
                return Err(BridgeError::Conversion(format!("empty {ty} value")));
            };
            let (_, member_ty) = members.iter().find(|(m, _)| m == name).ok_or_else(|| {
                BridgeError::Conversion(format!("{ty} has no member named {name}"))
            })?;
            Ok(Value::Struct(StructValue::new(vec![(
                name.clone(),
                from_json(member_ty, payload)?,
            )])))
        }
        _ => Err(BridgeError::Conversion(format!("JSON {json} cannot be read as {ty}"))),
    }
}

/// JSON without a declared type: each node keeps the kind it was written as.
fn json_variant(json: &JsonValue) -> Value {
    match json {
        JsonValue::Null => Value::Null,
        JsonValue::Bool(b) => Value::Boolean(*b),
        JsonValue::Number(n) => match (n.as_i64(), n.as_u64(), n.as_f64()) {
            (Some(i), _, _) => Value::BigInt(i),
            (None, Some(u), _) => Value::UBigInt(u),
            (None, None, Some(f)) => Value::Double(f),
            _ => Value::Varchar(n.to_string()),
        },
        JsonValue::String(s) => Value::Varchar(s.clone()),
        JsonValue::Array(items) => {
            Value::List(Sequence::list(items.iter().map(json_variant).collect()))
        }
        JsonValue::Object(object) => Value::Struct(StructValue::new(
            object
                .iter()
                .map(|(k, v)| (k.clone(), json_variant(v)))
                .collect(),
        )),
    }
}

fn is_integer(ty: &LogicalType) -> bool {
    matches!(
        ty,
        LogicalType::TinyInt
            | LogicalType::SmallInt
            | LogicalType::Integer
            | LogicalType::BigInt
            | LogicalType::HugeInt
            | LogicalType::UTinyInt
            | LogicalType::USmallInt
            | LogicalType::UInteger
            | LogicalType::UBigInt
            | LogicalType::UHugeInt
    )
}

/// Integer of the declared width, range-checked.
fn integer_value(ty: &LogicalType, v: BigInt) -> Result<Value, BridgeError> {
    let out_of_range = || BridgeError::Conversion(format!("{v} is out of range for {ty}"));
    Ok(match ty {
        LogicalType::TinyInt => Value::TinyInt(i8::try_from(&v).map_err(|_| out_of_range())?),
        LogicalType::SmallInt => Value::SmallInt(i16::try_from(&v).map_err(|_| out_of_range())?),
        LogicalType::Integer => Value::Integer(i32::try_from(&v).map_err(|_| out_of_range())?),
        LogicalType::BigInt => Value::BigInt(i64::try_from(&v).map_err(|_| out_of_range())?),
        LogicalType::UTinyInt => Value::UTinyInt(u8::try_from(&v).map_err(|_| out_of_range())?),
        LogicalType::USmallInt => Value::USmallInt(u16::try_from(&v).map_err(|_| out_of_range())?),
        LogicalType::UInteger => Value::UInteger(u32::try_from(&v).map_err(|_| out_of_range())?),
        LogicalType::UBigInt => Value::UBigInt(u64::try_from(&v).map_err(|_| out_of_range())?),
        LogicalType::HugeInt => {
            i128::try_from(&v).map_err(|_| out_of_range())?;
            Value::HugeInt(v)
        }
        LogicalType::UHugeInt => {
            u128::try_from(&v).map_err(|_| out_of_range())?;
            Value::UHugeInt(v)
        }
        _ => return Err(out_of_range()),
    })
}

fn epoch_seconds(secs: i64, ty: &LogicalType) -> Result<DateTime<Utc>, BridgeError> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| BridgeError::Conversion(format!("{secs} is out of range for {ty}")))
}

fn parse_timestamp(s: &str) -> Result<NaiveDateTime, chrono::ParseError> {
    let s = s.trim();
    NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
}

fn parse_timestamp_tz(s: &str) -> Result<DateTime<FixedOffset>, chrono::ParseError> {
    let s = s.trim();
    DateTime::parse_from_rfc3339(s)
        .or_else(|_| DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f%:z"))
        .or_else(|_| parse_timestamp(s).map(|naive| naive.and_utc().fixed_offset()))
}

/// Reads the `N months N days N microseconds` form intervals are stored in.
fn parse_interval(s: &str) -> Option<Interval> {
    let mut interval = Interval::default();
    let mut parts = s.split_whitespace();
    while let Some(amount) = parts.next() {
        let unit = parts.next()?;
        match unit.trim_end_matches('s') {
            "month" => interval.months = amount.parse().ok()?,
            "day" => interval.days = amount.parse().ok()?,
            "microsecond" => interval.micros = amount.parse().ok()?,
            _ => return None,
        }
    }
    Some(interval)
}

fn conversion(ty: &LogicalType, err: impl std::fmt::Display) -> BridgeError {
    BridgeError::Conversion(format!("cannot read value as {ty}: {err}"))
}
