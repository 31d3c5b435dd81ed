//! Typed statements over the authors catalog.
//!
//! The statement set is closed: each entry of `sql/query.sql` has one
//! method on [`Queries`] with fixed argument and result types. Arguments are
//! bound positionally exactly as declared and rows are mapped strictly into
//! [`Author`].

mod authors;
mod models;

pub use models::{Author, CreateAuthorParams, UpdateAuthorParams};

use crate::db::cancel::Cancel;
use crate::db::mapping::{self, Record, Strictness};
use crate::db::params::PgQuery;
use crate::db::pool::Database;
use crate::db::types::ColumnKind;
use crate::error::{DbError, DbResult};
use tracing::debug;

/// Result cardinality of a typed statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultShape {
    /// Exactly one row
    One,
    /// Zero or more rows
    Many,
    /// No rows, executed for effect
    Exec,
}

/// One positional argument of a typed statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ColumnKind,
    pub nullable: bool,
}

/// A declared statement of the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypedStatement {
    pub name: &'static str,
    pub sql: &'static str,
    /// Arguments in `$n` order
    pub params: &'static [ParamSpec],
    pub result: ResultShape,
}

/// Typed accessors bound to one database.
#[derive(Debug, Clone)]
pub struct Queries {
    db: Database,
}

impl Queries {
    pub fn new(db: &Database) -> Self {
        Self { db: db.clone() }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Every declared statement, in catalog order.
    pub fn catalog() -> &'static [TypedStatement] {
        authors::CATALOG
    }

    /// Look up a declared statement by name.
    pub fn statement(name: &str) -> Option<&'static TypedStatement> {
        Self::catalog().iter().find(|stmt| stmt.name == name)
    }

    async fn query_one<R: Record>(
        &self,
        stmt: &TypedStatement,
        query: PgQuery<'_>,
        cancel: &Cancel,
    ) -> DbResult<R> {
        debug!(statement = stmt.name, "Executing typed statement");
        cancel
            .or_timeout(self.db.statement_timeout())
            .run(stmt.name, async {
                let row = query
                    .fetch_optional(self.db.pool())
                    .await?
                    .ok_or_else(|| DbError::cardinality(stmt.name, 1, "0"))?;
                mapping::from_row(&row, Strictness::Strict)
            })
            .await
            .map_err(|e| e.with_statement(stmt.name))
    }

    async fn query_many<R: Record>(
        &self,
        stmt: &TypedStatement,
        query: PgQuery<'_>,
        cancel: &Cancel,
    ) -> DbResult<Vec<R>> {
        debug!(statement = stmt.name, "Executing typed statement");
        cancel
            .or_timeout(self.db.statement_timeout())
            .run(stmt.name, async {
                query
                    .fetch_all(self.db.pool())
                    .await?
                    .iter()
                    .map(|row| mapping::from_row(row, Strictness::Strict))
                    .collect()
            })
            .await
            .map_err(|e| e.with_statement(stmt.name))
    }

    async fn exec(
        &self,
        stmt: &TypedStatement,
        query: PgQuery<'_>,
        cancel: &Cancel,
    ) -> DbResult<u64> {
        debug!(statement = stmt.name, "Executing typed statement");
        cancel
            .or_timeout(self.db.statement_timeout())
            .run(stmt.name, async {
                Ok(query.execute(self.db.pool()).await?.rows_affected())
            })
            .await
            .map_err(|e| e.with_statement(stmt.name))
    }
}
