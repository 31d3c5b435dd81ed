//! PostgreSQL column kinds and value decoding.
//!
//! A record declares the kind of every column it maps. Decoding reads the
//! column as that kind and fails with the driver's type error when the
//! result set disagrees.

use crate::models::QueryParam;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::postgres::PgRow;
use sqlx::{Row, ValueRef};

/// Logical column type of a mapped field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnKind {
    Bool,
    Int2,
    Int4,
    Int8,
    Float4,
    Float8,
    Text,
    Bytea,
    /// JSON or JSONB
    Json,
    Uuid,
    /// TIMESTAMPTZ, or TIMESTAMP read as UTC
    Timestamptz,
}

impl ColumnKind {
    /// PostgreSQL type name for this kind.
    pub fn pg_type_name(&self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int2 => "int2",
            Self::Int4 => "int4",
            Self::Int8 => "int8",
            Self::Float4 => "float4",
            Self::Float8 => "float8",
            Self::Text => "text",
            Self::Bytea => "bytea",
            Self::Json => "jsonb",
            Self::Uuid => "uuid",
            Self::Timestamptz => "timestamptz",
        }
    }
}

impl std::fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.pg_type_name())
    }
}

/// Decode column `idx` of `row` as `kind`.
///
/// SQL NULL decodes to `QueryParam::TypedNull(kind)` regardless of kind.
pub fn decode_column(
    row: &PgRow,
    idx: usize,
    kind: ColumnKind,
) -> Result<QueryParam, sqlx::Error> {
    if row.try_get_raw(idx)?.is_null() {
        return Ok(QueryParam::TypedNull(kind));
    }

    match kind {
        ColumnKind::Bool => row.try_get::<bool, _>(idx).map(QueryParam::Bool),
        ColumnKind::Int2 | ColumnKind::Int4 | ColumnKind::Int8 => decode_integer(row, idx),
        ColumnKind::Float4 | ColumnKind::Float8 => decode_float(row, idx),
        ColumnKind::Text => row.try_get::<String, _>(idx).map(QueryParam::String),
        ColumnKind::Bytea => row.try_get::<Vec<u8>, _>(idx).map(QueryParam::Bytes),
        ColumnKind::Json => row.try_get::<JsonValue, _>(idx).map(QueryParam::Json),
        ColumnKind::Uuid => row.try_get::<uuid::Uuid, _>(idx).map(QueryParam::Uuid),
        ColumnKind::Timestamptz => decode_timestamp(row, idx),
    }
}

/// Integer columns decode at the width the server sent; the field
/// conversion widens or range-checks.
fn decode_integer(row: &PgRow, idx: usize) -> Result<QueryParam, sqlx::Error> {
    if let Ok(v) = row.try_get::<i64, _>(idx) {
        return Ok(QueryParam::Int(v));
    }
    if let Ok(v) = row.try_get::<i32, _>(idx) {
        return Ok(QueryParam::Int4(v));
    }
    row.try_get::<i16, _>(idx).map(QueryParam::Int2)
}

fn decode_float(row: &PgRow, idx: usize) -> Result<QueryParam, sqlx::Error> {
    if let Ok(v) = row.try_get::<f64, _>(idx) {
        return Ok(QueryParam::Float(v));
    }
    row.try_get::<f32, _>(idx).map(QueryParam::Float4)
}

fn decode_timestamp(row: &PgRow, idx: usize) -> Result<QueryParam, sqlx::Error> {
    if let Ok(v) = row.try_get::<DateTime<Utc>, _>(idx) {
        return Ok(QueryParam::Timestamp(v));
    }
    row.try_get::<NaiveDateTime, _>(idx)
        .map(|v| QueryParam::Timestamp(v.and_utc()))
}
