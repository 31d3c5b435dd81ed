//! Record <-> row mapping.
//!
//! A record type declares a static table of `FieldSpec`s: which field maps
//! to which column, the column kind, nullability and whether the server
//! generates the value. Both directions go through that table. Columns are
//! matched by exact, case-sensitive name, never by position.

use crate::db::types::{self, ColumnKind};
use crate::error::{DbError, DbResult};
use crate::models::{NamedParams, QueryParam};
use sqlx::Column;
use sqlx::Row;
use sqlx::postgres::PgRow;

/// Declared correspondence between one record field and one column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub field: &'static str,
    pub column: &'static str,
    pub kind: ColumnKind,
    pub nullable: bool,
    /// Value produced by the server (identity, default); omitted from writes
    /// unless a column list names it explicitly.
    pub generated: bool,
}

impl FieldSpec {
    pub const fn new(field: &'static str, column: &'static str, kind: ColumnKind) -> Self {
        Self {
            field,
            column,
            kind,
            nullable: false,
            generated: false,
        }
    }

    pub const fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub const fn generated(mut self) -> Self {
        self.generated = true;
        self
    }
}

/// A row shape with a declared field/column table.
///
/// Implement with [`impl_record!`](crate::impl_record) rather than by hand.
pub trait Record: Default + Send + Sync + Sized {
    /// Default target table for bulk loads.
    const TABLE: &'static str;
    const FIELDS: &'static [FieldSpec];

    /// Read a field as a typed value. `None` for an unknown field.
    fn get(&self, field: &str) -> Option<QueryParam>;

    /// Assign a decoded value to a field.
    fn set(&mut self, field: &str, value: QueryParam) -> Result<(), String>;
}

/// Read-side tolerance for columns missing from a result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strictness {
    /// Every declared field needs a column.
    #[default]
    Strict,
    /// Missing columns leave the field at its default.
    Lax,
}

/// Source of column values for the read direction.
pub trait RowSource {
    fn column_index(&self, column: &str) -> Option<usize>;
    fn decode(&self, idx: usize, kind: ColumnKind) -> Result<QueryParam, String>;
}

impl RowSource for PgRow {
    fn column_index(&self, column: &str) -> Option<usize> {
        self.columns().iter().position(|c| c.name() == column)
    }

    fn decode(&self, idx: usize, kind: ColumnKind) -> Result<QueryParam, String> {
        types::decode_column(self, idx, kind).map_err(|e| e.to_string())
    }
}

/// Find the declared field for a column name.
pub fn field_for_column<R: Record>(column: &str) -> Option<&'static FieldSpec> {
    R::FIELDS.iter().find(|spec| spec.column == column)
}

/// Non-generated columns in declaration order.
pub fn writable_columns<R: Record>() -> Vec<&'static str> {
    R::FIELDS
        .iter()
        .filter(|spec| !spec.generated)
        .map(|spec| spec.column)
        .collect()
}

/// Check the record declaration itself: no duplicate fields or columns.
pub fn validate_shape<R: Record>() -> DbResult<()> {
    for (i, spec) in R::FIELDS.iter().enumerate() {
        for other in &R::FIELDS[i + 1..] {
            if other.field == spec.field {
                return Err(DbError::mapping(
                    spec.field,
                    spec.column,
                    "field declared more than once",
                ));
            }
            if other.column == spec.column {
                return Err(DbError::mapping(
                    other.field,
                    spec.column,
                    "column mapped by more than one field",
                ));
            }
        }
    }
    Ok(())
}

/// Check a caller-supplied column list against the record declaration.
pub fn validate_columns<R: Record>(columns: &[&str]) -> DbResult<()> {
    if columns.is_empty() {
        return Err(DbError::mapping("", "", "column list is empty"));
    }
    for (i, column) in columns.iter().enumerate() {
        if columns[..i].contains(column) {
            return Err(DbError::mapping("", *column, "column listed more than once"));
        }
        if field_for_column::<R>(column).is_none() {
            return Err(DbError::mapping(
                "",
                *column,
                "column is not declared by the record",
            ));
        }
    }
    Ok(())
}

/// Write direction: values of `record` in `columns` order.
///
/// An absent nullable field becomes a NULL typed with the column kind,
/// so "unset" never turns into an empty string or zero.
pub fn to_values<R: Record>(record: &R, columns: &[&str]) -> DbResult<Vec<QueryParam>> {
    columns
        .iter()
        .map(|column| {
            let spec = field_for_column::<R>(column).ok_or_else(|| {
                DbError::mapping("", *column, "column is not declared by the record")
            })?;
            let value = record.get(spec.field).ok_or_else(|| {
                DbError::mapping(spec.field, spec.column, "record has no such field")
            })?;
            normalize(spec, value)
        })
        .collect()
}

/// Write direction keyed by column name, for `@column` placeholders.
pub fn to_named_params<R: Record>(record: &R, columns: &[&str]) -> DbResult<NamedParams> {
    let values = to_values(record, columns)?;
    Ok(columns.iter().copied().zip(values).collect())
}

fn normalize(spec: &FieldSpec, value: QueryParam) -> DbResult<QueryParam> {
    match value {
        QueryParam::Null | QueryParam::TypedNull(_) if !spec.nullable => Err(DbError::mapping(
            spec.field,
            spec.column,
            "NULL value for a non-nullable field",
        )),
        QueryParam::Null => Ok(QueryParam::TypedNull(spec.kind)),
        other => Ok(other),
    }
}

/// Read direction: decode one row into `R`.
pub fn from_row<R, S>(row: &S, strictness: Strictness) -> DbResult<R>
where
    R: Record,
    S: RowSource + ?Sized,
{
    let mut record = R::default();

    for spec in R::FIELDS {
        let Some(idx) = row.column_index(spec.column) else {
            match strictness {
                Strictness::Strict => {
                    return Err(DbError::mapping(
                        spec.field,
                        spec.column,
                        "column missing from result set",
                    ));
                }
                Strictness::Lax => continue,
            }
        };

        let value = row
            .decode(idx, spec.kind)
            .map_err(|e| DbError::mapping(spec.field, spec.column, e))?;

        if value.is_null() && !spec.nullable {
            return Err(DbError::mapping(
                spec.field,
                spec.column,
                "NULL in a non-nullable field",
            ));
        }

        record
            .set(spec.field, value)
            .map_err(|e| DbError::mapping(spec.field, spec.column, e))?;
    }

    Ok(record)
}
