//! Decoding column values by type OID.
//!
//! Dispatch is an exhaustive match over [`PgType`]. OIDs without a dedicated
//! arm land in [`PgType::Other`] and their text is passed through unmodified,
//! so decoding never fails just because a type is unfamiliar.

use crate::error::{Error, Result};
use crate::protocol::types::{FormatCode, Oid, oid};
use crate::row::Column;

/// Column types with a dedicated decode strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PgType {
    Bool,
    Bytea,
    Char,
    Name,
    Int8,
    Int2,
    Int4,
    Text,
    Oid,
    Json,
    Float4,
    Float8,
    Unknown,
    Bpchar,
    Varchar,
    Jsonb,
    /// Anything else; decoded as raw text
    Other(Oid),
}

impl PgType {
    pub fn from_oid(type_oid: Oid) -> Self {
        match type_oid {
            oid::BOOL => PgType::Bool,
            oid::BYTEA => PgType::Bytea,
            oid::CHAR => PgType::Char,
            oid::NAME => PgType::Name,
            oid::INT8 => PgType::Int8,
            oid::INT2 => PgType::Int2,
            oid::INT4 => PgType::Int4,
            oid::TEXT => PgType::Text,
            oid::OID => PgType::Oid,
            oid::JSON => PgType::Json,
            oid::FLOAT4 => PgType::Float4,
            oid::FLOAT8 => PgType::Float8,
            oid::UNKNOWN => PgType::Unknown,
            oid::BPCHAR => PgType::Bpchar,
            oid::VARCHAR => PgType::Varchar,
            oid::JSONB => PgType::Jsonb,
            other => PgType::Other(other),
        }
    }

    pub fn oid(self) -> Oid {
        match self {
            PgType::Bool => oid::BOOL,
            PgType::Bytea => oid::BYTEA,
            PgType::Char => oid::CHAR,
            PgType::Name => oid::NAME,
            PgType::Int8 => oid::INT8,
            PgType::Int2 => oid::INT2,
            PgType::Int4 => oid::INT4,
            PgType::Text => oid::TEXT,
            PgType::Oid => oid::OID,
            PgType::Json => oid::JSON,
            PgType::Float4 => oid::FLOAT4,
            PgType::Float8 => oid::FLOAT8,
            PgType::Unknown => oid::UNKNOWN,
            PgType::Bpchar => oid::BPCHAR,
            PgType::Varchar => oid::VARCHAR,
            PgType::Jsonb => oid::JSONB,
            PgType::Other(other) => other,
        }
    }
}

/// A decoded column value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int2(i16),
    Int4(i32),
    Int8(i64),
    Oid(Oid),
    Float4(f32),
    Float8(f64),
    Text(String),
    Bytea(Vec<u8>),
    /// JSON document text (json or jsonb)
    Json(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Any integer column widened to i64.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int2(v) => Some(i64::from(*v)),
            Value::Int4(v) => Some(i64::from(*v)),
            Value::Int8(v) => Some(*v),
            Value::Oid(v) => Some(i64::from(*v)),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float4(v) => Some(f64::from(*v)),
            Value::Float8(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) | Value::Json(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytea(b) => Some(b),
            Value::Text(s) | Value::Json(s) => Some(s.as_bytes()),
            _ => None,
        }
    }
}

/// Decode one field of a DataRow.
///
/// `None` is SQL NULL and never reaches a type-specific decoder.
pub fn decode(raw: Option<&[u8]>, column: &Column) -> Result<Value> {
    let Some(bytes) = raw else {
        return Ok(Value::Null);
    };
    match column.format {
        FormatCode::Text => decode_text(column.pg_type(), bytes),
        FormatCode::Binary => decode_binary(column.pg_type(), bytes),
    }
}

fn text(bytes: &[u8]) -> Result<&str> {
    simdutf8::compat::from_utf8(bytes).map_err(|e| Error::Decode(format!("invalid UTF-8: {}", e)))
}

fn parse<T: std::str::FromStr>(ty: PgType, bytes: &[u8]) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    let s = text(bytes)?;
    s.parse()
        .map_err(|e| Error::Decode(format!("invalid {:?} value {:?}: {}", ty, s, e)))
}

fn decode_text(ty: PgType, bytes: &[u8]) -> Result<Value> {
    match ty {
        PgType::Bool => match bytes {
            b"t" | b"true" => Ok(Value::Bool(true)),
            b"f" | b"false" => Ok(Value::Bool(false)),
            _ => Err(Error::Decode(format!(
                "invalid boolean: {:?}",
                String::from_utf8_lossy(bytes)
            ))),
        },
        PgType::Int2 => parse(ty, bytes).map(Value::Int2),
        PgType::Int4 => parse(ty, bytes).map(Value::Int4),
        PgType::Int8 => parse(ty, bytes).map(Value::Int8),
        PgType::Oid => parse(ty, bytes).map(Value::Oid),
        PgType::Float4 => parse_float(bytes).map(|v| Value::Float4(v as f32)),
        PgType::Float8 => parse_float(bytes).map(Value::Float8),
        PgType::Bytea => decode_bytea_hex(bytes).map(Value::Bytea),
        PgType::Json | PgType::Jsonb => Ok(Value::Json(text(bytes)?.to_owned())),
        PgType::Char
        | PgType::Name
        | PgType::Text
        | PgType::Unknown
        | PgType::Bpchar
        | PgType::Varchar
        | PgType::Other(_) => Ok(Value::Text(text(bytes)?.to_owned())),
    }
}

/// Float text, including the spellings PostgreSQL uses for special values.
fn parse_float(bytes: &[u8]) -> Result<f64> {
    match bytes {
        b"NaN" => Ok(f64::NAN),
        b"Infinity" => Ok(f64::INFINITY),
        b"-Infinity" => Ok(f64::NEG_INFINITY),
        _ => parse(PgType::Float8, bytes),
    }
}

/// Decode bytea in the default `\x` hex output format.
fn decode_bytea_hex(bytes: &[u8]) -> Result<Vec<u8>> {
    let hex = bytes
        .strip_prefix(b"\\x")
        .ok_or_else(|| Error::Decode("bytea: expected hex format".into()))?;
    if hex.len() % 2 != 0 {
        return Err(Error::Decode("bytea: odd number of hex digits".into()));
    }
    hex.chunks_exact(2)
        .map(|pair| Ok((hex_digit(pair[0])? << 4) | hex_digit(pair[1])?))
        .collect()
}

fn hex_digit(c: u8) -> Result<u8> {
    match c {
        b'0'..=b'9' => Ok(c - b'0'),
        b'a'..=b'f' => Ok(c - b'a' + 10),
        b'A'..=b'F' => Ok(c - b'A' + 10),
        _ => Err(Error::Decode(format!("bytea: invalid hex digit {:?}", c as char))),
    }
}

fn fixed<const N: usize>(ty: PgType, bytes: &[u8]) -> Result<[u8; N]> {
    bytes
        .try_into()
        .map_err(|_| Error::Decode(format!("invalid {:?} length: {}", ty, bytes.len())))
}

fn decode_binary(ty: PgType, bytes: &[u8]) -> Result<Value> {
    match ty {
        PgType::Bool => Ok(Value::Bool(fixed::<1>(ty, bytes)?[0] != 0)),
        PgType::Int2 => Ok(Value::Int2(i16::from_be_bytes(fixed(ty, bytes)?))),
        PgType::Int4 => Ok(Value::Int4(i32::from_be_bytes(fixed(ty, bytes)?))),
        PgType::Int8 => Ok(Value::Int8(i64::from_be_bytes(fixed(ty, bytes)?))),
        PgType::Oid => Ok(Value::Oid(u32::from_be_bytes(fixed(ty, bytes)?))),
        PgType::Float4 => Ok(Value::Float4(f32::from_be_bytes(fixed(ty, bytes)?))),
        PgType::Float8 => Ok(Value::Float8(f64::from_be_bytes(fixed(ty, bytes)?))),
        PgType::Json => Ok(Value::Json(text(bytes)?.to_owned())),
        // jsonb binary carries a one-byte version prefix
        PgType::Jsonb => match bytes.split_first() {
            Some((1, rest)) => Ok(Value::Json(text(rest)?.to_owned())),
            _ => Err(Error::Decode("unsupported jsonb binary version".into())),
        },
        PgType::Char
        | PgType::Name
        | PgType::Text
        | PgType::Unknown
        | PgType::Bpchar
        | PgType::Varchar => Ok(Value::Text(text(bytes)?.to_owned())),
        PgType::Bytea | PgType::Other(_) => Ok(Value::Bytea(bytes.to_vec())),
    }
}
