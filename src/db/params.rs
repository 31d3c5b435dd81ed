//! Parameter binding utilities for database queries.
//!
//! Binds `QueryParam` values to sqlx PostgreSQL queries. Typed NULLs are
//! bound with their column type so the server never has to coerce a text
//! NULL into a non-text column.

use crate::db::types::ColumnKind;
use crate::models::QueryParam;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::Postgres;
use sqlx::postgres::PgArguments;
use sqlx::types::Json;

pub(crate) type PgQuery<'q> = sqlx::query::Query<'q, Postgres, PgArguments>;

/// Bind a parameter to a PostgreSQL query.
pub(crate) fn bind_postgres_param<'q>(query: PgQuery<'q>, param: &'q QueryParam) -> PgQuery<'q> {
    match param {
        QueryParam::Null => query.bind(None::<String>),
        QueryParam::TypedNull(kind) => bind_typed_null(query, *kind),
        QueryParam::Bool(v) => query.bind(*v),
        QueryParam::Int2(v) => query.bind(*v),
        QueryParam::Int4(v) => query.bind(*v),
        QueryParam::Int(v) => query.bind(*v),
        QueryParam::Float4(v) => query.bind(*v),
        QueryParam::Float(v) => query.bind(*v),
        QueryParam::String(v) => query.bind(v.as_str()),
        QueryParam::Bytes(v) => query.bind(v.as_slice()),
        QueryParam::Json(v) => query.bind(Json(v)),
        QueryParam::Uuid(v) => query.bind(*v),
        QueryParam::Timestamp(v) => query.bind(*v),
    }
}

/// Bind every value in order.
pub(crate) fn bind_all<'q>(
    mut query: PgQuery<'q>,
    values: impl IntoIterator<Item = &'q QueryParam>,
) -> PgQuery<'q> {
    for value in values {
        query = bind_postgres_param(query, value);
    }
    query
}

fn bind_typed_null(query: PgQuery<'_>, kind: ColumnKind) -> PgQuery<'_> {
    match kind {
        ColumnKind::Bool => query.bind(None::<bool>),
        ColumnKind::Int2 => query.bind(None::<i16>),
        ColumnKind::Int4 => query.bind(None::<i32>),
        ColumnKind::Int8 => query.bind(None::<i64>),
        ColumnKind::Float4 => query.bind(None::<f32>),
        ColumnKind::Float8 => query.bind(None::<f64>),
        ColumnKind::Text => query.bind(None::<String>),
        ColumnKind::Bytea => query.bind(None::<Vec<u8>>),
        ColumnKind::Json => query.bind(None::<Json<JsonValue>>),
        ColumnKind::Uuid => query.bind(None::<uuid::Uuid>),
        ColumnKind::Timestamptz => query.bind(None::<DateTime<Utc>>),
    }
}
