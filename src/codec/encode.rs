use chrono::{NaiveDate, NaiveTime, Timelike};
use num_bigint::BigInt;

use super::vector::{ListEntry, Vector, VectorData};
use crate::error::BridgeError;
use crate::types::{Decimal, DecimalWidth, LogicalType, Value};

/// Build a native vector of type `ty` from host values, one row per value.
///
/// `Value::Null` (and `Value::TypedNull`) rows are marked invalid. For `VARIANT` each row's
/// runtime type is taken from [`infer_type`]; use [`encode_variant`] to pick the types
/// explicitly.
///
/// # Errors
/// Returns `BridgeError::Conversion` when a value does not fit the declared type.
pub fn encode_values(ty: &LogicalType, values: &[Value]) -> Result<Vector, BridgeError> {
    let validity: Vec<bool> = values.iter().map(|v| !v.is_null()).collect();
    let len = values.len();
    let data = match ty {
        LogicalType::Null | LogicalType::Unknown => return Ok(Vector::all_null(ty.clone(), len)),
        LogicalType::Boolean => VectorData::Boolean(fixed(values, ty, Value::as_bool)?),
        LogicalType::TinyInt => VectorData::Int8(fixed(values, ty, narrow)?),
        LogicalType::SmallInt => VectorData::Int16(fixed(values, ty, narrow)?),
        LogicalType::Integer => VectorData::Int32(fixed(values, ty, narrow)?),
        LogicalType::BigInt => VectorData::Int64(fixed(values, ty, narrow)?),
        LogicalType::HugeInt => VectorData::Int128(fixed(values, ty, narrow)?),
        LogicalType::UTinyInt => VectorData::UInt8(fixed(values, ty, narrow)?),
        LogicalType::USmallInt => VectorData::UInt16(fixed(values, ty, narrow)?),
        LogicalType::UInteger => VectorData::UInt32(fixed(values, ty, narrow)?),
        LogicalType::UBigInt => VectorData::UInt64(fixed(values, ty, narrow)?),
        LogicalType::UHugeInt => VectorData::UInt128(fixed(values, ty, narrow)?),
        LogicalType::Float => VectorData::Float32(fixed(values, ty, |v| match v {
            Value::Float(f) => Some(*f),
            _ => None,
        })?),
        LogicalType::Double => VectorData::Float64(fixed(values, ty, Value::as_f64)?),
        LogicalType::Decimal { precision, scale } => encode_decimals(values, *precision, *scale)?,
        LogicalType::Varchar => VectorData::Bytes(fixed(values, ty, |v| {
            v.as_str().map(|s| s.as_bytes().to_vec())
        })?),
        LogicalType::Blob => {
            VectorData::Bytes(fixed(values, ty, |v| v.as_blob().map(<[u8]>::to_vec))?)
        }
        LogicalType::Date => VectorData::Int32(fixed(values, ty, |v| match v {
            Value::Date(d) => epoch_days(*d),
            _ => None,
        })?),
        LogicalType::Time => VectorData::Int64(fixed(values, ty, |v| match v {
            Value::Time(t) => Some(time_micros(*t)),
            _ => None,
        })?),
        LogicalType::TimeTz => VectorData::TimeTz(fixed(values, ty, |v| match v {
            Value::TimeTz(t) => Some((time_micros(t.time), t.offset.local_minus_utc())),
            _ => None,
        })?),
        LogicalType::Timestamp => VectorData::Int64(fixed(values, ty, |v| match v {
            Value::Timestamp(ts) => Some(ts.and_utc().timestamp_micros()),
            _ => None,
        })?),
        LogicalType::TimestampTz => VectorData::Int64(fixed(values, ty, |v| match v {
            Value::TimestampTz(ts) => Some(ts.timestamp_micros()),
            _ => None,
        })?),
        LogicalType::Interval => VectorData::Interval(fixed(values, ty, |v| match v {
            Value::Interval(i) => Some(*i),
            _ => None,
        })?),
        LogicalType::Enum(labels) => encode_enum(values, labels)?,
        LogicalType::List(child_ty) => {
            let (entries, flat) = flatten(values, ty, |v| match v {
                Value::List(s) | Value::Array(s) => Some(s.iter().cloned().collect()),
                _ => None,
            })?;
            VectorData::List {
                entries,
                child: Box::new(encode_values(child_ty, &flat)?),
            }
        }
        LogicalType::Map(key_ty, value_ty) => {
            let (entries, flat) = flatten(values, ty, |v| match v {
                Value::Map(m) => Some(
                    m.entries()
                        .iter()
                        .map(|e| Value::Struct(e.clone()))
                        .collect(),
                ),
                _ => None,
            })?;
            let entry_ty = LogicalType::Struct(vec![
                ("key".to_string(), (**key_ty).clone()),
                ("value".to_string(), (**value_ty).clone()),
            ]);
            VectorData::List {
                entries,
                child: Box::new(encode_values(&entry_ty, &flat)?),
            }
        }
        LogicalType::Array(child_ty, size) => {
            let mut flat = Vec::with_capacity(len * size);
            for value in values {
                match value {
                    v if v.is_null() => flat.extend(std::iter::repeat_n(Value::Null, *size)),
                    Value::List(s) | Value::Array(s) if s.len() == *size => {
                        flat.extend(s.iter().cloned());
                    }
                    Value::List(s) | Value::Array(s) => {
                        return Err(BridgeError::Conversion(format!(
                            "{ty} needs {size} elements, got {}",
                            s.len()
                        )));
                    }
                    other => return Err(mismatch(ty, other)),
                }
            }
            VectorData::Array {
                child: Box::new(encode_values(child_ty, &flat)?),
            }
        }
        LogicalType::Struct(fields) => {
            let mut columns: Vec<Vec<Value>> = vec![Vec::with_capacity(len); fields.len()];
            for value in values {
                match value {
                    v if v.is_null() => columns.iter_mut().for_each(|c| c.push(Value::Null)),
                    Value::Struct(s) => {
                        for ((name, _), column) in fields.iter().zip(columns.iter_mut()) {
                            column.push(s.get(name).cloned().unwrap_or(Value::Null));
                        }
                    }
                    other => return Err(mismatch(ty, other)),
                }
            }
            let children = fields
                .iter()
                .zip(&columns)
                .map(|((_, field_ty), column)| encode_values(field_ty, column))
                .collect::<Result<Vec<_>, _>>()?;
            VectorData::Struct(children)
        }
        LogicalType::Union(members) => encode_union(values, ty, members)?,
        LogicalType::Variant => {
            let tagged = values
                .iter()
                .map(|v| match v {
                    Value::Null => None,
                    Value::TypedNull(t) => Some((t.clone(), Value::Null)),
                    other => Some((infer_type(other), other.clone())),
                })
                .collect();
            return encode_variant(tagged);
        }
    };
    Vector::new(ty.clone(), len, Some(validity), data)
}

/// Build a `VARIANT` vector from rows that carry their runtime type. `None` is a NULL variant;
/// `Some((ty, Value::Null))` is a variant tagged `ty` holding a NULL.
///
/// # Errors
/// Returns `BridgeError::Conversion` when a payload does not fit its tag.
pub fn encode_variant(rows: Vec<Option<(LogicalType, Value)>>) -> Result<Vector, BridgeError> {
    let len = rows.len();
    let mut kinds: Vec<LogicalType> = Vec::new();
    let mut payloads: Vec<Vec<Value>> = Vec::new();
    let mut tags = Vec::with_capacity(len);
    let mut offsets = Vec::with_capacity(len);
    let mut validity = Vec::with_capacity(len);
    for row in rows {
        let Some((kind, value)) = row else {
            tags.push(0);
            offsets.push(0);
            validity.push(false);
            continue;
        };
        let tag = match kinds.iter().position(|k| *k == kind) {
            Some(tag) => tag,
            None => {
                kinds.push(kind);
                payloads.push(Vec::new());
                kinds.len() - 1
            }
        };
        let tag_u16 = u16::try_from(tag)
            .map_err(|_| BridgeError::Conversion("too many variant kinds".into()))?;
        let offset = u32::try_from(payloads[tag].len())
            .map_err(|_| BridgeError::Conversion("variant child too long".into()))?;
        payloads[tag].push(value);
        tags.push(tag_u16);
        offsets.push(offset);
        validity.push(true);
    }
    let children = kinds
        .iter()
        .zip(&payloads)
        .map(|(kind, values)| encode_values(kind, values))
        .collect::<Result<Vec<_>, _>>()?;
    Vector::new(
        LogicalType::Variant,
        len,
        Some(validity),
        VectorData::Variant {
            tags,
            offsets,
            children,
        },
    )
}

/// Logical type a host value naturally carries, used to tag variant payloads.
///
/// Composite element types are unified when every non-null element agrees and fall back to
/// `VARIANT` otherwise.
#[must_use]
pub fn infer_type(value: &Value) -> LogicalType {
    match value {
        Value::Null => LogicalType::Null,
        Value::TypedNull(ty) => ty.clone(),
        Value::Boolean(_) => LogicalType::Boolean,
        Value::TinyInt(_) => LogicalType::TinyInt,
        Value::SmallInt(_) => LogicalType::SmallInt,
        Value::Integer(_) => LogicalType::Integer,
        Value::BigInt(_) => LogicalType::BigInt,
        Value::HugeInt(_) => LogicalType::HugeInt,
        Value::UTinyInt(_) => LogicalType::UTinyInt,
        Value::USmallInt(_) => LogicalType::USmallInt,
        Value::UInteger(_) => LogicalType::UInteger,
        Value::UBigInt(_) => LogicalType::UBigInt,
        Value::UHugeInt(_) => LogicalType::UHugeInt,
        Value::Float(_) => LogicalType::Float,
        Value::Double(_) => LogicalType::Double,
        Value::Decimal(d) => {
            let scale = u8::try_from(d.scale()).unwrap_or(38).min(38);
            let digits = u8::try_from(d.digits()).unwrap_or(38);
            LogicalType::Decimal {
                precision: digits.max(scale).clamp(1, 38),
                scale,
            }
        }
        Value::Varchar(_) => LogicalType::Varchar,
        Value::Blob(_) => LogicalType::Blob,
        Value::Date(_) => LogicalType::Date,
        Value::Time(_) => LogicalType::Time,
        Value::TimeTz(_) => LogicalType::TimeTz,
        Value::Timestamp(_) => LogicalType::Timestamp,
        Value::TimestampTz(_) => LogicalType::TimestampTz,
        Value::Interval(_) => LogicalType::Interval,
        Value::List(s) => LogicalType::List(Box::new(unify(s.iter()))),
        Value::Array(s) => LogicalType::Array(Box::new(unify(s.iter())), s.len()),
        Value::Struct(s) => LogicalType::Struct(
            s.iter()
                .map(|(name, v)| (name.to_string(), infer_type(v)))
                .collect(),
        ),
        Value::Map(m) => LogicalType::Map(
            Box::new(unify(m.iter().map(|(k, _)| k))),
            Box::new(unify(m.iter().map(|(_, v)| v))),
        ),
    }
}

fn unify<'a>(items: impl Iterator<Item = &'a Value>) -> LogicalType {
    let mut found: Option<LogicalType> = None;
    for item in items.filter(|v| !matches!(v, Value::Null)) {
        let ty = infer_type(item);
        match &found {
            None => found = Some(ty),
            Some(existing) if *existing == ty => {}
            Some(_) => return LogicalType::Variant,
        }
    }
    found.unwrap_or(LogicalType::Null)
}

/// One fixed-width slot per row; NULL rows get `T::default()` behind a clear validity bit.
fn fixed<T: Default>(
    values: &[Value],
    ty: &LogicalType,
    extract: impl Fn(&Value) -> Option<T>,
) -> Result<Vec<T>, BridgeError> {
    values
        .iter()
        .map(|v| {
            if v.is_null() {
                Ok(T::default())
            } else {
                extract(v).ok_or_else(|| mismatch(ty, v))
            }
        })
        .collect()
}

fn flatten(
    values: &[Value],
    ty: &LogicalType,
    items: impl Fn(&Value) -> Option<Vec<Value>>,
) -> Result<(Vec<ListEntry>, Vec<Value>), BridgeError> {
    let mut entries = Vec::with_capacity(values.len());
    let mut flat = Vec::new();
    for value in values {
        if value.is_null() {
            entries.push(ListEntry {
                offset: flat.len(),
                length: 0,
            });
            continue;
        }
        let children = items(value).ok_or_else(|| mismatch(ty, value))?;
        entries.push(ListEntry {
            offset: flat.len(),
            length: children.len(),
        });
        flat.extend(children);
    }
    Ok((entries, flat))
}

fn narrow<T: TryFrom<BigInt>>(value: &Value) -> Option<T> {
    let wide = match value {
        Value::HugeInt(v) | Value::UHugeInt(v) => v.clone(),
        Value::UBigInt(v) => BigInt::from(*v),
        other => BigInt::from(other.as_i64()?),
    };
    T::try_from(wide).ok()
}

fn encode_decimals(values: &[Value], precision: u8, scale: u8) -> Result<VectorData, BridgeError> {
    let ty = LogicalType::Decimal { precision, scale };
    let unscaled = fixed(values, &ty, |v| {
        let decimal = match v {
            Value::Decimal(d) => d.clone(),
            other => Decimal::new(BigInt::from(other.as_i64()?), 0),
        };
        let scaled = decimal.rescale(u32::from(scale))?;
        (scaled.digits() <= u32::from(precision)).then_some(())?;
        scaled.unscaled_i128()
    })?;
    // Each narrowing fits because the digit count was checked against the precision.
    Ok(match DecimalWidth::for_precision(precision) {
        DecimalWidth::Int16 => VectorData::Int16(unscaled.iter().map(|v| *v as i16).collect()),
        DecimalWidth::Int32 => VectorData::Int32(unscaled.iter().map(|v| *v as i32).collect()),
        DecimalWidth::Int64 => VectorData::Int64(unscaled.iter().map(|v| *v as i64).collect()),
        DecimalWidth::Int128 => VectorData::Int128(unscaled),
    })
}

fn encode_enum(values: &[Value], labels: &[String]) -> Result<VectorData, BridgeError> {
    let ty = LogicalType::Enum(labels.to_vec());
    let ordinals = fixed(values, &ty, |v| {
        let label = v.as_str()?;
        labels.iter().position(|l| l == label)
    })?;
    Ok(if labels.len() <= usize::from(u8::MAX) + 1 {
        VectorData::UInt8(ordinals.iter().map(|o| *o as u8).collect())
    } else if labels.len() <= usize::from(u16::MAX) + 1 {
        VectorData::UInt16(ordinals.iter().map(|o| *o as u16).collect())
    } else {
        VectorData::UInt32(ordinals.iter().map(|o| *o as u32).collect())
    })
}

/// Union rows are given as one-field structs naming the active member.
fn encode_union(
    values: &[Value],
    ty: &LogicalType,
    members: &[(String, LogicalType)],
) -> Result<VectorData, BridgeError> {
    let mut tags = Vec::with_capacity(values.len());
    let mut columns: Vec<Vec<Value>> = vec![Vec::with_capacity(values.len()); members.len()];
    for value in values {
        let active = match value {
            v if v.is_null() => None,
            Value::Struct(s) if s.len() == 1 => {
                let (name, payload) = s.iter().next().ok_or_else(|| mismatch(ty, value))?;
                let tag = members
                    .iter()
                    .position(|(member, _)| member == name)
                    .ok_or_else(|| {
                        BridgeError::Conversion(format!("{ty} has no member named {name}"))
                    })?;
                Some((tag, payload.clone()))
            }
            other => return Err(mismatch(ty, other)),
        };
        let tag = active.as_ref().map_or(0, |(tag, _)| *tag);
        tags.push(u8::try_from(tag).map_err(|_| mismatch(ty, value))?);
        for (i, column) in columns.iter_mut().enumerate() {
            column.push(match &active {
                Some((t, payload)) if *t == i => payload.clone(),
                _ => Value::Null,
            });
        }
    }
    let vectors = members
        .iter()
        .zip(&columns)
        .map(|((_, member_ty), column)| encode_values(member_ty, column))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(VectorData::Union {
        tags,
        members: vectors,
    })
}

fn epoch_days(date: NaiveDate) -> Option<i32> {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1)?;
    i32::try_from(date.signed_duration_since(epoch).num_days()).ok()
}

fn time_micros(time: NaiveTime) -> i64 {
    i64::from(time.num_seconds_from_midnight()) * 1_000_000 + i64::from(time.nanosecond() / 1_000)
}

fn mismatch(ty: &LogicalType, value: &Value) -> BridgeError {
    BridgeError::Conversion(format!(
        "cannot store {} as {ty}",
        value.host_class_name()
    ))
}
