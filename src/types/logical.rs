use std::fmt;

use crate::error::BridgeError;

/// Physical integer width the engine uses to back a `DECIMAL` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecimalWidth {
    Int16,
    Int32,
    Int64,
    Int128,
}

impl DecimalWidth {
    /// Backing width the engine picks for a given declared precision.
    #[must_use]
    pub fn for_precision(precision: u8) -> Self {
        match precision {
            0..=4 => DecimalWidth::Int16,
            5..=9 => DecimalWidth::Int32,
            10..=18 => DecimalWidth::Int64,
            _ => DecimalWidth::Int128,
        }
    }
}

/// Declared logical type of a column, parameter, or runtime-tagged variant payload.
///
/// Type names render the way the engine spells them, so a column declared
/// `DECIMAL(18,7)` reports `DECIMAL(18,7)` and a struct reports its fields in declared order:
/// ```rust
/// use sql_bridge::LogicalType;
///
/// let ty = LogicalType::parse("STRUCT(v VARCHAR, i INTEGER)").unwrap();
/// assert_eq!(ty.type_name(), "STRUCT(v VARCHAR, i INTEGER)");
/// assert_eq!(LogicalType::parse("decimal(18, 7)").unwrap().precision(), 18);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LogicalType {
    Null,
    Boolean,
    TinyInt,
    SmallInt,
    Integer,
    BigInt,
    HugeInt,
    UTinyInt,
    USmallInt,
    UInteger,
    UBigInt,
    UHugeInt,
    Float,
    Double,
    Decimal { precision: u8, scale: u8 },
    Varchar,
    Blob,
    Date,
    Time,
    TimeTz,
    Timestamp,
    TimestampTz,
    Interval,
    /// Dictionary of labels; values are stored as ordinals into it.
    Enum(Vec<String>),
    List(Box<LogicalType>),
    /// Fixed-size array with its declared length.
    Array(Box<LogicalType>, usize),
    /// Fields in declared order.
    Struct(Vec<(String, LogicalType)>),
    Map(Box<LogicalType>, Box<LogicalType>),
    /// Members in declared order.
    Union(Vec<(String, LogicalType)>),
    Variant,
    Unknown,
}

impl LogicalType {
    /// DuckDB's default for a bare `DECIMAL`.
    pub const DEFAULT_DECIMAL: LogicalType = LogicalType::Decimal {
        precision: 18,
        scale: 3,
    };

    /// Engine spelling of the type.
    #[must_use]
    pub fn type_name(&self) -> String {
        match self {
            LogicalType::Null => "\"NULL\"".to_string(),
            LogicalType::Boolean => "BOOLEAN".to_string(),
            LogicalType::TinyInt => "TINYINT".to_string(),
            LogicalType::SmallInt => "SMALLINT".to_string(),
            LogicalType::Integer => "INTEGER".to_string(),
            LogicalType::BigInt => "BIGINT".to_string(),
            LogicalType::HugeInt => "HUGEINT".to_string(),
            LogicalType::UTinyInt => "UTINYINT".to_string(),
            LogicalType::USmallInt => "USMALLINT".to_string(),
            LogicalType::UInteger => "UINTEGER".to_string(),
            LogicalType::UBigInt => "UBIGINT".to_string(),
            LogicalType::UHugeInt => "UHUGEINT".to_string(),
            LogicalType::Float => "FLOAT".to_string(),
            LogicalType::Double => "DOUBLE".to_string(),
            LogicalType::Decimal { precision, scale } => format!("DECIMAL({precision},{scale})"),
            LogicalType::Varchar => "VARCHAR".to_string(),
            LogicalType::Blob => "BLOB".to_string(),
            LogicalType::Date => "DATE".to_string(),
            LogicalType::Time => "TIME".to_string(),
            LogicalType::TimeTz => "TIME WITH TIME ZONE".to_string(),
            LogicalType::Timestamp => "TIMESTAMP".to_string(),
            LogicalType::TimestampTz => "TIMESTAMP WITH TIME ZONE".to_string(),
            LogicalType::Interval => "INTERVAL".to_string(),
            LogicalType::Enum(_) => "ENUM".to_string(),
            LogicalType::List(child) => format!("{}[]", child.type_name()),
            LogicalType::Array(child, size) => format!("{}[{size}]", child.type_name()),
            LogicalType::Struct(fields) => format!("STRUCT({})", render_members(fields)),
            LogicalType::Map(key, value) => {
                format!("MAP({}, {})", key.type_name(), value.type_name())
            }
            LogicalType::Union(members) => format!("UNION({})", render_members(members)),
            LogicalType::Variant => "VARIANT".to_string(),
            LogicalType::Unknown => "UNKNOWN".to_string(),
        }
    }

    /// Declared precision for decimals, zero otherwise.
    #[must_use]
    pub fn precision(&self) -> u8 {
        match self {
            LogicalType::Decimal { precision, .. } => *precision,
            _ => 0,
        }
    }

    /// Declared scale for decimals, zero otherwise.
    #[must_use]
    pub fn scale(&self) -> u8 {
        match self {
            LogicalType::Decimal { scale, .. } => *scale,
            _ => 0,
        }
    }

    #[must_use]
    pub fn is_signed(&self) -> bool {
        matches!(
            self,
            LogicalType::TinyInt
                | LogicalType::SmallInt
                | LogicalType::Integer
                | LogicalType::BigInt
                | LogicalType::HugeInt
                | LogicalType::Float
                | LogicalType::Double
                | LogicalType::Decimal { .. }
        )
    }

    #[must_use]
    pub fn is_nested(&self) -> bool {
        matches!(
            self,
            LogicalType::List(_)
                | LogicalType::Array(..)
                | LogicalType::Struct(_)
                | LogicalType::Map(..)
                | LogicalType::Union(_)
        )
    }

    /// Backing width for decimals.
    #[must_use]
    pub fn decimal_width(&self) -> Option<DecimalWidth> {
        match self {
            LogicalType::Decimal { precision, .. } => Some(DecimalWidth::for_precision(*precision)),
            _ => None,
        }
    }

    /// Name of the host type a value of this logical type decodes into.
    #[must_use]
    pub fn host_class_name(&self) -> &'static str {
        match self {
            LogicalType::Boolean => "bool",
            LogicalType::TinyInt => "i8",
            LogicalType::SmallInt => "i16",
            LogicalType::Integer => "i32",
            LogicalType::BigInt => "i64",
            LogicalType::UTinyInt => "u8",
            LogicalType::USmallInt => "u16",
            LogicalType::UInteger => "u32",
            LogicalType::UBigInt => "u64",
            LogicalType::HugeInt | LogicalType::UHugeInt => "num_bigint::BigInt",
            LogicalType::Float => "f32",
            LogicalType::Double => "f64",
            LogicalType::Decimal { .. } => "sql_bridge::Decimal",
            LogicalType::Varchar | LogicalType::Enum(_) => "String",
            LogicalType::Blob => "Vec<u8>",
            LogicalType::Date => "chrono::NaiveDate",
            LogicalType::Time => "chrono::NaiveTime",
            LogicalType::TimeTz => "sql_bridge::TimeTz",
            LogicalType::Timestamp => "chrono::NaiveDateTime",
            LogicalType::TimestampTz => "chrono::DateTime<chrono::FixedOffset>",
            LogicalType::Interval => "sql_bridge::Interval",
            LogicalType::List(_) | LogicalType::Array(..) => "sql_bridge::Sequence",
            LogicalType::Struct(_) => "sql_bridge::StructValue",
            LogicalType::Map(..) => "sql_bridge::MapValue",
            LogicalType::Union(_)
            | LogicalType::Variant
            | LogicalType::Null
            | LogicalType::Unknown => "sql_bridge::Value",
        }
    }

    /// Parse an engine type name such as `INTEGER[]`, `MAP(VARCHAR, DOUBLE)` or
    /// `TIMESTAMP WITH TIME ZONE`. Surrounding quotes (as left by quoted type tokens) are
    /// ignored.
    ///
    /// # Errors
    /// Returns `BridgeError::Conversion` for names that do not describe a known type.
    pub fn parse(name: &str) -> Result<LogicalType, BridgeError> {
        let trimmed = strip_quotes(name.trim());
        let mut parser = TypeParser {
            src: trimmed,
            pos: 0,
        };
        let ty = parser.parse_type()?;
        parser.skip_ws();
        if parser.pos != parser.src.len() {
            return Err(parser.error("trailing input"));
        }
        Ok(ty)
    }
}

impl fmt::Display for LogicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.type_name())
    }
}

fn render_members(members: &[(String, LogicalType)]) -> String {
    members
        .iter()
        .map(|(name, ty)| format!("{} {}", quote_ident(name), ty.type_name()))
        .collect::<Vec<_>>()
        .join(", ")
}

fn quote_ident(name: &str) -> String {
    let plain = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !name.starts_with(|c: char| c.is_ascii_digit());
    if plain {
        name.to_string()
    } else {
        format!("\"{}\"", name.replace('"', "\"\""))
    }
}

fn strip_quotes(s: &str) -> &str {
    let bytes = s.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if (first == b'\'' && last == b'\'') || (first == b'`' && last == b'`') {
            return &s[1..s.len() - 1];
        }
    }
    s
}

struct TypeParser<'a> {
    src: &'a str,
    pos: usize,
}

impl TypeParser<'_> {
    fn error(&self, what: &str) -> BridgeError {
        BridgeError::Conversion(format!(
            "cannot parse type '{}' at offset {}: {what}",
            self.src, self.pos
        ))
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn skip_ws(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.pos += c.len_utf8();
            } else {
                break;
            }
        }
    }

    fn eat(&mut self, expected: char) -> bool {
        self.skip_ws();
        if self.peek() == Some(expected) {
            self.pos += expected.len_utf8();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: char) -> Result<(), BridgeError> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(self.error(&format!("expected '{expected}'")))
        }
    }

    fn word(&mut self) -> Option<String> {
        self.skip_ws();
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                self.pos += c.len_utf8();
            } else {
                break;
            }
        }
        (self.pos > start).then(|| self.src[start..self.pos].to_string())
    }

    fn number(&mut self) -> Result<usize, BridgeError> {
        self.skip_ws();
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            self.pos += 1;
        }
        self.src[start..self.pos]
            .parse::<usize>()
            .map_err(|_| self.error("expected a number"))
    }

    fn quoted(&mut self, quote: char) -> Result<String, BridgeError> {
        // opening quote already consumed
        let mut out = String::new();
        loop {
            let c = self.peek().ok_or_else(|| self.error("unterminated quote"))?;
            self.pos += c.len_utf8();
            if c == quote {
                if self.peek() == Some(quote) {
                    self.pos += c.len_utf8();
                    out.push(quote);
                } else {
                    return Ok(out);
                }
            } else {
                out.push(c);
            }
        }
    }

    fn ident(&mut self) -> Result<String, BridgeError> {
        if self.eat('"') {
            return self.quoted('"');
        }
        self.word().ok_or_else(|| self.error("expected identifier"))
    }

    fn parse_type(&mut self) -> Result<LogicalType, BridgeError> {
        let mut ty = self.parse_base()?;
        loop {
            self.skip_ws();
            if !self.eat('[') {
                break;
            }
            if self.eat(']') {
                ty = LogicalType::List(Box::new(ty));
            } else {
                let size = self.number()?;
                self.expect(']')?;
                ty = LogicalType::Array(Box::new(ty), size);
            }
        }
        Ok(ty)
    }

    fn parse_members(&mut self) -> Result<Vec<(String, LogicalType)>, BridgeError> {
        self.expect('(')?;
        let mut members = Vec::new();
        loop {
            let name = self.ident()?;
            let ty = self.parse_type()?;
            members.push((name, ty));
            if !self.eat(',') {
                break;
            }
        }
        self.expect(')')?;
        Ok(members)
    }

    fn parse_base(&mut self) -> Result<LogicalType, BridgeError> {
        self.skip_ws();
        if self.eat('"') {
            let quoted = self.quoted('"')?;
            if quoted.eq_ignore_ascii_case("NULL") {
                return Ok(LogicalType::Null);
            }
            return LogicalType::parse(&quoted);
        }
        let first = self
            .word()
            .ok_or_else(|| self.error("expected type name"))?
            .to_ascii_uppercase();
        match first.as_str() {
            "STRUCT" | "ROW" => return Ok(LogicalType::Struct(self.parse_members()?)),
            "UNION" => return Ok(LogicalType::Union(self.parse_members()?)),
            "MAP" => {
                self.expect('(')?;
                let key = self.parse_type()?;
                self.expect(',')?;
                let value = self.parse_type()?;
                self.expect(')')?;
                return Ok(LogicalType::Map(Box::new(key), Box::new(value)));
            }
            "ENUM" => {
                self.expect('(')?;
                let mut labels = Vec::new();
                loop {
                    self.expect('\'')?;
                    labels.push(self.quoted('\'')?);
                    if !self.eat(',') {
                        break;
                    }
                }
                self.expect(')')?;
                return Ok(LogicalType::Enum(labels));
            }
            "DECIMAL" | "NUMERIC" | "DEC" => return self.parse_decimal(),
            _ => {}
        }

        // Multi-word names such as TIMESTAMP WITH TIME ZONE or DOUBLE PRECISION.
        let mut words = vec![first];
        loop {
            let save = self.pos;
            match self.word() {
                Some(w) => words.push(w.to_ascii_uppercase()),
                None => {
                    self.pos = save;
                    break;
                }
            }
        }
        let name = words.join(" ");
        let ty = scalar_from_name(&name).ok_or_else(|| self.error("unknown type name"))?;
        // Length modifiers such as VARCHAR(255) carry no logical meaning.
        let save = self.pos;
        if self.eat('(') {
            if matches!(ty, LogicalType::Varchar | LogicalType::Blob) {
                self.number()?;
                self.expect(')')?;
            } else {
                self.pos = save;
            }
        }
        Ok(ty)
    }

    fn parse_decimal(&mut self) -> Result<LogicalType, BridgeError> {
        if !self.eat('(') {
            return Ok(LogicalType::DEFAULT_DECIMAL);
        }
        let precision = self.number()?;
        let scale = if self.eat(',') { self.number()? } else { 0 };
        self.expect(')')?;
        if precision == 0 || precision > 38 || scale > precision {
            return Err(self.error("decimal precision must be 1..=38 and scale <= precision"));
        }
        Ok(LogicalType::Decimal {
            precision: u8::try_from(precision).map_err(|_| self.error("precision"))?,
            scale: u8::try_from(scale).map_err(|_| self.error("scale"))?,
        })
    }
}

fn scalar_from_name(name: &str) -> Option<LogicalType> {
    let ty = match name {
        "NULL" => LogicalType::Null,
        "BOOLEAN" | "BOOL" | "LOGICAL" => LogicalType::Boolean,
        "TINYINT" | "INT1" => LogicalType::TinyInt,
        "SMALLINT" | "INT2" | "SHORT" => LogicalType::SmallInt,
        "INTEGER" | "INT" | "INT4" | "SIGNED" => LogicalType::Integer,
        "BIGINT" | "INT8" | "LONG" => LogicalType::BigInt,
        "HUGEINT" | "INT128" => LogicalType::HugeInt,
        "UTINYINT" | "UINT8" => LogicalType::UTinyInt,
        "USMALLINT" | "UINT16" => LogicalType::USmallInt,
        "UINTEGER" | "UINT32" => LogicalType::UInteger,
        "UBIGINT" | "UINT64" => LogicalType::UBigInt,
        "UHUGEINT" | "UINT128" => LogicalType::UHugeInt,
        "FLOAT" | "FLOAT4" | "REAL" => LogicalType::Float,
        "DOUBLE" | "FLOAT8" | "DOUBLE PRECISION" => LogicalType::Double,
        "VARCHAR" | "TEXT" | "STRING" | "CHAR" | "BPCHAR" | "NVARCHAR" => LogicalType::Varchar,
        "BLOB" | "BYTEA" | "BINARY" | "VARBINARY" => LogicalType::Blob,
        "DATE" => LogicalType::Date,
        "TIME" | "TIME WITHOUT TIME ZONE" => LogicalType::Time,
        "TIMETZ" | "TIME WITH TIME ZONE" => LogicalType::TimeTz,
        "TIMESTAMP" | "DATETIME" | "TIMESTAMP WITHOUT TIME ZONE" => LogicalType::Timestamp,
        "TIMESTAMPTZ" | "TIMESTAMP WITH TIME ZONE" => LogicalType::TimestampTz,
        "INTERVAL" => LogicalType::Interval,
        "VARIANT" => LogicalType::Variant,
        _ => return None,
    };
    Some(ty)
}
