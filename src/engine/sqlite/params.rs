use num_bigint::BigInt;
use rusqlite::types::Value as SqliteValue;
use serde_json::{Map, Number, Value as JsonValue};

use super::scanner::{Token, render, tokenize};
use crate::error::BridgeError;
use crate::types::{Decimal, LogicalType, Value};

pub(super) const DATE_FORMAT: &str = "%Y-%m-%d";
pub(super) const TIME_FORMAT: &str = "%H:%M:%S%.f";
pub(super) const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Significant digits SQLite keeps when NUMERIC affinity turns text into a REAL.
const REAL_DIGITS: u32 = 15;

/// Declared types for the `count` placeholders of `sql`.
///
/// `CAST(? AS T)` gives `T`. A placeholder that is a whole value of an
/// `INSERT INTO t [(cols)] VALUES (...)` row gives the declared type of its target column.
/// Everything else stays `UNKNOWN`.
pub(super) fn infer_parameter_types(
    conn: &rusqlite::Connection,
    sql: &str,
    count: usize,
) -> Vec<LogicalType> {
    let tokens = tokenize(sql);
    let mut types = vec![LogicalType::Unknown; count];
    for (param, ty) in cast_targets(&tokens) {
        if let Some(slot) = types.get_mut(param) {
            *slot = ty;
        }
    }
    if let Some(insert) = insert_target(&tokens) {
        let declared = table_columns(conn, insert.schema.as_deref(), &insert.table);
        let columns: Vec<(String, LogicalType)> = match insert.columns {
            Some(names) => names
                .into_iter()
                .map(|name| {
                    let ty = declared
                        .iter()
                        .find(|(col, _)| col.eq_ignore_ascii_case(&name))
                        .map_or(LogicalType::Unknown, |(_, ty)| ty.clone());
                    (name, ty)
                })
                .collect(),
            None => declared,
        };
        for (param, position) in insert.slots {
            if let (Some(slot), Some((_, ty))) = (types.get_mut(param), columns.get(position))
                && *slot == LogicalType::Unknown
            {
                *slot = ty.clone();
            }
        }
    }
    types
}

fn cast_targets(tokens: &[Token]) -> Vec<(usize, LogicalType)> {
    let mut found = Vec::new();
    for (i, token) in tokens.iter().enumerate() {
        if !token.is_keyword("CAST") {
            continue;
        }
        let (Some(Token::Symbol('(')), Some(Token::Param(param)), Some(as_kw)) =
            (tokens.get(i + 1), tokens.get(i + 2), tokens.get(i + 3))
        else {
            continue;
        };
        if !as_kw.is_keyword("AS") {
            continue;
        }
        let start = i + 4;
        if let Some(end) = closing_paren(tokens, start)
            && let Ok(ty) = LogicalType::parse(&render(&tokens[start..end]))
        {
            found.push((*param, ty));
        }
    }
    found
}

/// Index of the `)` that closes the group starting at `start` (already inside it).
fn closing_paren(tokens: &[Token], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (offset, token) in tokens[start..].iter().enumerate() {
        match token {
            Token::Symbol('(') => depth += 1,
            Token::Symbol(')') if depth == 0 => return Some(start + offset),
            Token::Symbol(')') => depth -= 1,
            _ => {}
        }
    }
    None
}

struct InsertTarget {
    schema: Option<String>,
    table: String,
    columns: Option<Vec<String>>,
    /// (placeholder, column position) pairs.
    slots: Vec<(usize, usize)>,
}

fn insert_target(tokens: &[Token]) -> Option<InsertTarget> {
    let first = tokens.first()?;
    if !(first.is_keyword("INSERT") || first.is_keyword("REPLACE")) {
        return None;
    }
    let into = tokens.iter().position(|t| t.is_keyword("INTO"))?;
    let mut idx = into + 1;
    let mut table = tokens.get(idx)?.name()?.to_string();
    let mut schema = None;
    idx += 1;
    if tokens.get(idx) == Some(&Token::Symbol('.')) {
        schema = Some(table);
        table = tokens.get(idx + 1)?.name()?.to_string();
        idx += 2;
    }
    if tokens.get(idx).is_some_and(|t| t.is_keyword("AS")) {
        idx += 2;
    }
    let mut columns = None;
    if tokens.get(idx) == Some(&Token::Symbol('(')) {
        let end = closing_paren(tokens, idx + 1)?;
        columns = Some(
            tokens[idx + 1..end]
                .iter()
                .filter_map(Token::name)
                .map(str::to_string)
                .collect(),
        );
        idx = end + 1;
    }
    if !tokens.get(idx)?.is_keyword("VALUES") {
        return None;
    }
    idx += 1;
    let mut slots = Vec::new();
    while tokens.get(idx) == Some(&Token::Symbol('(')) {
        let end = closing_paren(tokens, idx + 1)?;
        let mut position = 0;
        let mut depth = 0usize;
        let mut expr_start = idx + 1;
        for i in idx + 1..=end {
            match &tokens[i] {
                Token::Symbol('(') => depth += 1,
                Token::Symbol(')') if i != end => depth -= 1,
                Token::Symbol(',') | Token::Symbol(')') if depth == 0 => {
                    if let [Token::Param(param)] = &tokens[expr_start..i] {
                        slots.push((*param, position));
                    }
                    position += 1;
                    expr_start = i + 1;
                }
                _ => {}
            }
        }
        idx = end + 1;
        if tokens.get(idx) == Some(&Token::Symbol(',')) {
            idx += 1;
        }
    }
    Some(InsertTarget {
        schema,
        table,
        columns,
        slots,
    })
}

/// Declared column types of a table, in table order. Undeclared or unparsable types are
/// `UNKNOWN`.
pub(super) fn table_columns(
    conn: &rusqlite::Connection,
    schema: Option<&str>,
    table: &str,
) -> Vec<(String, LogicalType)> {
    let query = || -> rusqlite::Result<Vec<(String, String)>> {
        let mut stmt = conn.prepare("SELECT name, type FROM pragma_table_info(?1, ?2)")?;
        let rows = stmt.query_map(rusqlite::params![table, schema.unwrap_or("main")], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        rows.collect()
    };
    match query() {
        Ok(columns) => columns
            .into_iter()
            .map(|(name, decl)| {
                let ty = LogicalType::parse(&decl).unwrap_or(LogicalType::Unknown);
                (name, ty)
            })
            .collect(),
        Err(err) => {
            tracing::debug!(table, error = %err, "table_info lookup failed");
            Vec::new()
        }
    }
}

/// Storage value SQLite receives for a bound host value.
pub(super) fn to_sqlite(value: &Value) -> Result<SqliteValue, BridgeError> {
    Ok(match value {
        Value::Null | Value::TypedNull(_) => SqliteValue::Null,
        Value::Boolean(b) => SqliteValue::Integer(i64::from(*b)),
        Value::Float(f) => SqliteValue::Real(f64::from(*f)),
        Value::Double(f) => SqliteValue::Real(*f),
        Value::Decimal(d) => decimal_storage(d),
        Value::Varchar(s) => SqliteValue::Text(s.clone()),
        Value::Blob(b) => SqliteValue::Blob(b.clone()),
        Value::UBigInt(v) => match i64::try_from(*v) {
            Ok(v) => SqliteValue::Integer(v),
            Err(_) => SqliteValue::Text(v.to_string()),
        },
        Value::HugeInt(v) | Value::UHugeInt(v) => match i64::try_from(v) {
            Ok(v) => SqliteValue::Integer(v),
            Err(_) => SqliteValue::Text(v.to_string()),
        },
        Value::List(_) | Value::Array(_) | Value::Struct(_) | Value::Map(_) => {
            SqliteValue::Text(to_json(value)?.to_string())
        }
        other => match other.as_i64() {
            Some(v) => SqliteValue::Integer(v),
            None => SqliteValue::Text(temporal_text(other).ok_or_else(|| {
                BridgeError::Conversion(format!(
                    "cannot bind {} to SQLite",
                    other.host_class_name()
                ))
            })?),
        },
    })
}

/// Decimals NUMERIC affinity would round are stored as a whole INTEGER, or else as their text
/// in a BLOB, which no affinity converts.
fn decimal_storage(d: &Decimal) -> SqliteValue {
    if d.digits() <= REAL_DIGITS {
        return SqliteValue::Text(d.to_string());
    }
    if let Some(whole) = d.rescale(0)
        && let Ok(i) = i64::try_from(whole.unscaled())
    {
        return SqliteValue::Integer(i);
    }
    SqliteValue::Blob(d.to_string().into_bytes())
}

fn temporal_text(value: &Value) -> Option<String> {
    Some(match value {
        Value::Date(d) => d.format(DATE_FORMAT).to_string(),
        Value::Time(t) => t.format(TIME_FORMAT).to_string(),
        Value::TimeTz(t) => format!("{}{}", t.time.format(TIME_FORMAT), t.offset),
        Value::Timestamp(ts) => ts.format(TIMESTAMP_FORMAT).to_string(),
        Value::TimestampTz(ts) => ts.to_rfc3339(),
        Value::Interval(i) => i.to_string(),
        _ => return None,
    })
}

/// JSON text form used for composite values stored in SQLite.
pub(super) fn to_json(value: &Value) -> Result<JsonValue, BridgeError> {
    Ok(match value {
        Value::Null | Value::TypedNull(_) => JsonValue::Null,
        Value::Boolean(b) => JsonValue::Bool(*b),
        Value::Float(f) => float_json(f64::from(*f)),
        Value::Double(f) => float_json(*f),
        Value::Decimal(d) => JsonValue::String(d.to_string()),
        Value::Varchar(s) => JsonValue::String(s.clone()),
        Value::Blob(b) => JsonValue::String(hex::encode(b)),
        Value::UBigInt(v) => JsonValue::Number(Number::from(*v)),
        Value::HugeInt(v) | Value::UHugeInt(v) => big_json(v),
        Value::List(items) | Value::Array(items) => JsonValue::Array(
            items.iter().map(to_json).collect::<Result<Vec<_>, _>>()?,
        ),
        Value::Struct(fields) => {
            let mut object = Map::new();
            for (name, field) in fields.iter() {
                object.insert(name.to_string(), to_json(field)?);
            }
            JsonValue::Object(object)
        }
        Value::Map(map) => {
            let mut entries = Vec::with_capacity(map.len());
            for (key, val) in map.iter() {
                let mut entry = Map::new();
                entry.insert("key".into(), to_json(key)?);
                entry.insert("value".into(), to_json(val)?);
                entries.push(JsonValue::Object(entry));
            }
            JsonValue::Array(entries)
        }
        other => match other.as_i64() {
            Some(v) => JsonValue::Number(Number::from(v)),
            None => JsonValue::String(temporal_text(other).ok_or_else(|| {
                BridgeError::Conversion(format!(
                    "cannot render {} as JSON",
                    other.host_class_name()
                ))
            })?),
        },
    })
}

fn float_json(f: f64) -> JsonValue {
    Number::from_f64(f).map_or_else(|| JsonValue::String(f.to_string()), JsonValue::Number)
}

fn big_json(v: &BigInt) -> JsonValue {
    if let Ok(small) = i64::try_from(v) {
        JsonValue::Number(Number::from(small))
    } else if let Ok(small) = u64::try_from(v) {
        JsonValue::Number(Number::from(small))
    } else {
        JsonValue::String(v.to_string())
    }
}
