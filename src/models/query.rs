//! Query parameter models.
//!
//! `QueryParam` is the typed scalar used on both sides of the mapper: as a
//! bound statement argument and as a decoded column value.

use crate::db::types::ColumnKind;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use uuid::Uuid;

/// A typed scalar value, or an explicit SQL NULL.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryParam {
    /// NULL with no type information (bound as text)
    Null,
    /// NULL of a known column type
    TypedNull(ColumnKind),
    Bool(bool),
    Int2(i16),
    Int4(i32),
    /// INT8
    Int(i64),
    Float4(f32),
    /// FLOAT8
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
    Json(JsonValue),
    Uuid(Uuid),
    Timestamp(DateTime<Utc>),
}

impl QueryParam {
    /// Check if this parameter is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null | Self::TypedNull(_))
    }

    /// Get the type name of this parameter for debugging.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null | Self::TypedNull(_) => "null",
            Self::Bool(_) => "bool",
            Self::Int2(_) => "int2",
            Self::Int4(_) => "int4",
            Self::Int(_) => "int",
            Self::Float4(_) => "float4",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Bytes(_) => "bytes",
            Self::Json(_) => "json",
            Self::Uuid(_) => "uuid",
            Self::Timestamp(_) => "timestamp",
        }
    }
}

/// Rust types with a fixed SQL column kind.
///
/// Used to type the NULL produced by a `None`.
pub trait SqlKind {
    const KIND: ColumnKind;
}

macro_rules! scalar_param {
    ($($ty:ty => $variant:ident($conv:expr), $kind:ident;)+) => {
        $(
            impl From<$ty> for QueryParam {
                fn from(v: $ty) -> Self {
                    QueryParam::$variant($conv(v))
                }
            }

            impl SqlKind for $ty {
                const KIND: ColumnKind = ColumnKind::$kind;
            }
        )+
    };
}

scalar_param! {
    bool => Bool(std::convert::identity), Bool;
    i16 => Int2(std::convert::identity), Int2;
    i32 => Int4(std::convert::identity), Int4;
    i64 => Int(std::convert::identity), Int8;
    f32 => Float4(std::convert::identity), Float4;
    f64 => Float(std::convert::identity), Float8;
    String => String(std::convert::identity), Text;
    &str => String(String::from), Text;
    Vec<u8> => Bytes(std::convert::identity), Bytea;
    JsonValue => Json(std::convert::identity), Json;
    Uuid => Uuid(std::convert::identity), Uuid;
    DateTime<Utc> => Timestamp(std::convert::identity), Timestamptz;
}

impl<T> From<Option<T>> for QueryParam
where
    T: Into<QueryParam> + SqlKind,
{
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => QueryParam::TypedNull(T::KIND),
        }
    }
}

/// Conversion from a decoded column value into a record field.
pub trait FromParam: Sized {
    fn from_param(param: QueryParam) -> Result<Self, String>;
}

fn mismatch(expected: &str, got: &QueryParam) -> String {
    format!("expected {}, got {}", expected, got.type_name())
}

impl FromParam for bool {
    fn from_param(param: QueryParam) -> Result<Self, String> {
        match param {
            QueryParam::Bool(v) => Ok(v),
            other => Err(mismatch("bool", &other)),
        }
    }
}

/// Integers of any width widen into i64.
impl FromParam for i64 {
    fn from_param(param: QueryParam) -> Result<Self, String> {
        match param {
            QueryParam::Int2(v) => Ok(v.into()),
            QueryParam::Int4(v) => Ok(v.into()),
            QueryParam::Int(v) => Ok(v),
            other => Err(mismatch("int", &other)),
        }
    }
}

impl FromParam for i32 {
    fn from_param(param: QueryParam) -> Result<Self, String> {
        match param {
            QueryParam::Int4(v) => Ok(v),
            other => {
                let v = i64::from_param(other)?;
                i32::try_from(v).map_err(|_| format!("value {} out of range for i32", v))
            }
        }
    }
}

impl FromParam for i16 {
    fn from_param(param: QueryParam) -> Result<Self, String> {
        match param {
            QueryParam::Int2(v) => Ok(v),
            other => {
                let v = i64::from_param(other)?;
                i16::try_from(v).map_err(|_| format!("value {} out of range for i16", v))
            }
        }
    }
}

impl FromParam for f64 {
    fn from_param(param: QueryParam) -> Result<Self, String> {
        match param {
            QueryParam::Float4(v) => Ok(v.into()),
            QueryParam::Float(v) => Ok(v),
            other => Err(mismatch("float", &other)),
        }
    }
}

impl FromParam for f32 {
    fn from_param(param: QueryParam) -> Result<Self, String> {
        match param {
            QueryParam::Float4(v) => Ok(v),
            other => f64::from_param(other).map(|v| v as f32),
        }
    }
}

impl FromParam for String {
    fn from_param(param: QueryParam) -> Result<Self, String> {
        match param {
            QueryParam::String(v) => Ok(v),
            other => Err(mismatch("string", &other)),
        }
    }
}

impl FromParam for Vec<u8> {
    fn from_param(param: QueryParam) -> Result<Self, String> {
        match param {
            QueryParam::Bytes(v) => Ok(v),
            other => Err(mismatch("bytes", &other)),
        }
    }
}

impl FromParam for JsonValue {
    fn from_param(param: QueryParam) -> Result<Self, String> {
        match param {
            QueryParam::Json(v) => Ok(v),
            other => Err(mismatch("json", &other)),
        }
    }
}

impl FromParam for Uuid {
    fn from_param(param: QueryParam) -> Result<Self, String> {
        match param {
            QueryParam::Uuid(v) => Ok(v),
            other => Err(mismatch("uuid", &other)),
        }
    }
}

impl FromParam for DateTime<Utc> {
    fn from_param(param: QueryParam) -> Result<Self, String> {
        match param {
            QueryParam::Timestamp(v) => Ok(v),
            other => Err(mismatch("timestamp", &other)),
        }
    }
}

impl<T: FromParam> FromParam for Option<T> {
    fn from_param(param: QueryParam) -> Result<Self, String> {
        if param.is_null() {
            return Ok(None);
        }
        T::from_param(param).map(Some)
    }
}

/// Named parameter set for `@name` placeholders.
///
/// Names are stored without the leading `@`. Entries the statement does not
/// reference are ignored at bind time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NamedParams {
    values: HashMap<String, QueryParam>,
}

impl NamedParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a parameter, builder style.
    pub fn with(mut self, name: impl AsRef<str>, value: impl Into<QueryParam>) -> Self {
        self.insert(name, value);
        self
    }

    /// Insert or replace a parameter. Returns the previous value.
    pub fn insert(
        &mut self,
        name: impl AsRef<str>,
        value: impl Into<QueryParam>,
    ) -> Option<QueryParam> {
        self.values
            .insert(normalize_name(name.as_ref()).to_string(), value.into())
    }

    pub fn get(&self, name: &str) -> Option<&QueryParam> {
        self.values.get(normalize_name(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(normalize_name(name))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

impl<K: AsRef<str>, V: Into<QueryParam>> FromIterator<(K, V)> for NamedParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = NamedParams::new();
        for (k, v) in iter {
            params.insert(k, v);
        }
        params
    }
}

fn normalize_name(name: &str) -> &str {
    name.strip_prefix('@').unwrap_or(name)
}
