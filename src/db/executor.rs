//! Query execution engine.
//!
//! Executes dynamic statements written with `@name` placeholders:
//! - binding is resolved before anything is sent to the server
//! - results come back as a lazy `RowStream` holding the borrowed connection
//! - every call runs under a deadline (caller's, or the statement timeout)

use crate::db::cancel::Cancel;
use crate::db::mapping::{self, Record, Strictness};
use crate::db::named::NamedStatement;
use crate::db::params::bind_all;
use crate::db::pool::Database;
use crate::error::{DbError, DbResult, statement_context};
use crate::models::NamedParams;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use sqlx::Executor;
use sqlx::postgres::PgRow;
use std::time::Duration;
use tracing::debug;

/// Forward-only sequence of result rows.
///
/// Rows are fetched on demand. The pooled connection is held until the
/// stream is drained or dropped; dropping early is the way to stop.
pub struct RowStream<'a> {
    inner: BoxStream<'a, Result<PgRow, sqlx::Error>>,
    statement: String,
    cancel: Cancel,
    finished: bool,
}

impl std::fmt::Debug for RowStream<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowStream")
            .field("statement", &self.statement)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

impl<'a> RowStream<'a> {
    /// Next row, or `None` once the result set is exhausted.
    ///
    /// After an error the stream is finished.
    pub async fn next(&mut self) -> Option<DbResult<PgRow>> {
        if self.finished {
            return None;
        }

        let inner = &mut self.inner;
        let result = self
            .cancel
            .run("fetch row", async move {
                inner.next().await.transpose().map_err(DbError::from)
            })
            .await
            .map_err(|e| e.with_statement(&self.statement))
            .transpose();

        if !matches!(result, Some(Ok(_))) {
            self.finished = true;
        }
        result
    }

    /// Drain every remaining row.
    pub async fn collect_all(mut self) -> DbResult<Vec<PgRow>> {
        let mut rows = Vec::new();
        while let Some(row) = self.next().await {
            rows.push(row?);
        }
        Ok(rows)
    }

    /// Drain every remaining row through `f`, stopping at the first error.
    pub async fn try_map<T, F>(mut self, mut f: F) -> DbResult<Vec<T>>
    where
        F: FnMut(&PgRow) -> DbResult<T>,
    {
        let mut out = Vec::new();
        while let Some(row) = self.next().await {
            out.push(f(&row?)?);
        }
        Ok(out)
    }
}

/// Query executor that handles named-parameter statements.
#[derive(Debug, Clone, Default)]
pub struct QueryExecutor {
    default_timeout: Option<Duration>,
}

impl QueryExecutor {
    /// Executor using the database's statement timeout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Executor with its own default deadline per call.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            default_timeout: Some(timeout),
        }
    }

    fn bounded(&self, db: &Database, cancel: &Cancel) -> Cancel {
        cancel.or_timeout(self.default_timeout.unwrap_or(db.statement_timeout()))
    }

    /// Bind `params` to `stmt` and return its rows lazily.
    ///
    /// A missing parameter is reported here, before the statement is sent.
    pub fn execute<'a>(
        &self,
        db: &'a Database,
        stmt: &'a NamedStatement,
        params: &'a NamedParams,
        cancel: &Cancel,
    ) -> DbResult<RowStream<'a>> {
        let values = stmt.bind_values(params)?;

        debug!(
            sql = %stmt.sql(),
            params = values.len(),
            "Executing query"
        );

        let inner = if stmt.has_placeholders() {
            bind_all(sqlx::query(stmt.sql()), values).fetch(db.pool())
        } else {
            db.pool().fetch(stmt.sql())
        };

        Ok(RowStream {
            inner,
            statement: statement_context(stmt.original()),
            cancel: self.bounded(db, cancel),
            finished: false,
        })
    }

    /// Execute and require exactly one row.
    pub async fn execute_one(
        &self,
        db: &Database,
        stmt: &NamedStatement,
        params: &NamedParams,
        cancel: &Cancel,
    ) -> DbResult<PgRow> {
        let mut rows = self.execute(db, stmt, params, cancel)?;
        let first = match rows.next().await {
            Some(row) => row?,
            None => return Err(DbError::cardinality(statement_context(stmt.original()), 1, "0")),
        };
        if let Some(extra) = rows.next().await {
            extra?;
            return Err(DbError::cardinality(
                statement_context(stmt.original()),
                1,
                "more than 1",
            ));
        }
        Ok(first)
    }

    /// Execute a statement for its effect and return the affected row count.
    pub async fn execute_write(
        &self,
        db: &Database,
        stmt: &NamedStatement,
        params: &NamedParams,
        cancel: &Cancel,
    ) -> DbResult<u64> {
        let values = stmt.bind_values(params)?;

        debug!(
            sql = %stmt.sql(),
            params = values.len(),
            "Executing write operation"
        );

        self.bounded(db, cancel)
            .run("write operation", async {
                // no placeholders: simple protocol, so multi-statement scripts work
                let done = if stmt.has_placeholders() {
                    bind_all(sqlx::query(stmt.sql()), values)
                        .execute(db.pool())
                        .await?
                } else {
                    db.pool().execute(stmt.sql()).await?
                };
                Ok(done.rows_affected())
            })
            .await
            .map_err(|e| e.with_statement(stmt.original()))
    }

    /// Execute and map every row into `R`.
    pub async fn fetch_records<R: Record>(
        &self,
        db: &Database,
        stmt: &NamedStatement,
        params: &NamedParams,
        strictness: Strictness,
        cancel: &Cancel,
    ) -> DbResult<Vec<R>> {
        self.execute(db, stmt, params, cancel)?
            .try_map(|row| mapping::from_row(row, strictness))
            .await
    }

    /// Execute, require exactly one row and map it into `R`.
    pub async fn fetch_one_record<R: Record>(
        &self,
        db: &Database,
        stmt: &NamedStatement,
        params: &NamedParams,
        strictness: Strictness,
        cancel: &Cancel,
    ) -> DbResult<R> {
        let row = self.execute_one(db, stmt, params, cancel).await?;
        mapping::from_row(&row, strictness)
    }
}
