//! Bulk loading with `COPY ... FROM STDIN`.
//!
//! Rows are serialized through the record's declared mapping into COPY text
//! format and streamed to the server in fixed-size chunks. A batch either
//! lands completely or not at all: any failure aborts the copy.
//!
//! The copy runs on a connection held for its whole duration. A deadline or
//! token is checked between chunks and answered with an explicit abort. If
//! the exchange ends any other way before the server confirms, the
//! connection is detached from the pool and closed rather than reused.

use crate::db::cancel::Cancel;
use crate::db::mapping::{self, Record};
use crate::db::pool::Database;
use crate::error::{DbError, DbResult};
use crate::models::QueryParam;
use chrono::SecondsFormat;
use sqlx::Postgres;
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgConnection, PgCopyIn};
use std::fmt::Write as _;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Bytes buffered before a chunk is sent.
pub const COPY_CHUNK_SIZE: usize = 64 * 1024;

/// How long an abort may take before the connection is given up.
const ABORT_GRACE: Duration = Duration::from_secs(5);

/// Streams record batches into a table.
///
/// Bulk loads run without a deadline unless the caller passes one or the
/// loader is built with [`BulkLoader::with_timeout`]. The pool's
/// per-statement timeout does not apply.
#[derive(Debug, Clone)]
pub struct BulkLoader {
    chunk_size: usize,
    default_timeout: Option<Duration>,
}

impl Default for BulkLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl BulkLoader {
    pub fn new() -> Self {
        Self {
            chunk_size: COPY_CHUNK_SIZE,
            default_timeout: None,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Deadline applied when the caller's `Cancel` carries none.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = Some(timeout);
        self
    }

    /// Copy `batch` into `table`, writing `columns` of each record.
    ///
    /// Returns the number of rows the server reports as copied, which is
    /// always `batch.len()` on success. An empty batch returns 0 without
    /// borrowing a connection.
    pub async fn copy_insert<R: Record>(
        &self,
        db: &Database,
        table: &str,
        columns: &[&str],
        batch: &[R],
        cancel: &Cancel,
    ) -> DbResult<u64> {
        mapping::validate_shape::<R>()
            .and_then(|_| mapping::validate_columns::<R>(columns))
            .map_err(|e| DbError::bulk_copy(table, e.to_string()))?;
        let statement = copy_statement(table, columns)?;

        if batch.is_empty() {
            debug!(table = %table, "Empty batch, nothing to copy");
            return Ok(0);
        }

        debug!(
            statement = %statement,
            rows = batch.len(),
            "Starting bulk copy"
        );

        let cancel = match self.default_timeout {
            Some(timeout) => cancel.or_timeout(timeout),
            None => cancel.clone(),
        };
        let expected = batch.len() as u64;
        let copied = self
            .stream_batch(db, table, &statement, columns, batch, &cancel)
            .await
            .map_err(|e| match e {
                DbError::BulkCopy { .. } => e,
                other => DbError::bulk_copy(table, other.to_string()),
            })?;

        if copied != expected {
            return Err(DbError::bulk_copy(
                table,
                format!("server copied {} rows, expected {}", copied, expected),
            ));
        }

        info!(table = %table, rows = copied, "Bulk copy complete");
        Ok(copied)
    }

    /// Copy into the record's own table using every writable column.
    pub async fn copy_insert_records<R: Record>(
        &self,
        db: &Database,
        batch: &[R],
        cancel: &Cancel,
    ) -> DbResult<u64> {
        let columns = mapping::writable_columns::<R>();
        self.copy_insert(db, R::TABLE, &columns, batch, cancel)
            .await
    }

    async fn stream_batch<R: Record>(
        &self,
        db: &Database,
        table: &str,
        statement: &str,
        columns: &[&str],
        batch: &[R],
        cancel: &Cancel,
    ) -> DbResult<u64> {
        let conn = cancel
            .run("bulk copy", async {
                db.pool().acquire().await.map_err(DbError::from)
            })
            .await?;
        let mut held = CopyConnection {
            conn: Some(conn),
            clean: false,
        };
        let Some(pg) = held.conn.as_deref_mut() else {
            return Err(DbError::internal("bulk copy connection missing"));
        };

        let mut copy = cancel
            .run("bulk copy", async move {
                pg.copy_in_raw(statement)
                    .await
                    .map_err(|e| copy_failure(table, e))
            })
            .await?;

        let mut buf: Vec<u8> = Vec::with_capacity(self.chunk_size + 1024);
        let mut chunks = 0usize;

        for (i, record) in batch.iter().enumerate() {
            let values = match mapping::to_values(record, columns) {
                Ok(values) => values,
                Err(e) => {
                    let message = format!("row {}: {}", i + 1, e);
                    held.clean = abort_copy(copy, table, &message).await;
                    return Err(DbError::bulk_copy(table, message));
                }
            };
            encode_row(&mut buf, &values);

            if buf.len() >= self.chunk_size {
                if let Err(e) = cancel.check("bulk copy") {
                    held.clean = abort_copy(copy, table, &e.to_string()).await;
                    return Err(e);
                }
                send_chunk(&mut copy, table, &buf, cancel).await?;
                chunks += 1;
                buf.clear();
            }
        }

        if let Err(e) = cancel.check("bulk copy") {
            held.clean = abort_copy(copy, table, &e.to_string()).await;
            return Err(e);
        }
        if !buf.is_empty() {
            send_chunk(&mut copy, table, &buf, cancel).await?;
            chunks += 1;
        }

        debug!(table = %table, chunks, "Sent bulk copy data");
        let copied = cancel
            .run("bulk copy", async move {
                copy.finish().await.map_err(|e| copy_failure(table, e))
            })
            .await?;
        held.clean = true;
        Ok(copied)
    }
}

/// Connection owned by one copy.
///
/// Unless the copy reached a confirmed end the server may still be in COPY
/// mode, so the connection is detached and closed instead of pooled.
struct CopyConnection {
    conn: Option<PoolConnection<Postgres>>,
    clean: bool,
}

impl Drop for CopyConnection {
    fn drop(&mut self) {
        if self.clean {
            return;
        }
        if let Some(conn) = self.conn.take() {
            warn!("Bulk copy did not complete, closing its connection");
            drop(conn.detach());
        }
    }
}

async fn send_chunk(
    copy: &mut PgCopyIn<&mut PgConnection>,
    table: &str,
    chunk: &[u8],
    cancel: &Cancel,
) -> DbResult<()> {
    cancel
        .run("bulk copy", async {
            copy.send(chunk)
                .await
                .map(|_| ())
                .map_err(|e| copy_failure(table, e))
        })
        .await
}

/// Send CopyFail and wait for the server to leave COPY mode.
///
/// Returns whether the connection is back in a usable state.
async fn abort_copy(copy: PgCopyIn<&mut PgConnection>, table: &str, message: &str) -> bool {
    match tokio::time::timeout(ABORT_GRACE, copy.abort(message)).await {
        Ok(Ok(())) => {
            debug!(table = %table, reason = %message, "Bulk copy aborted");
            true
        }
        Ok(Err(e)) => {
            warn!(table = %table, error = %e, "Abort of bulk copy failed");
            false
        }
        Err(_) => {
            warn!(table = %table, "Abort of bulk copy timed out");
            false
        }
    }
}

fn copy_failure(table: &str, err: sqlx::Error) -> DbError {
    match err {
        sqlx::Error::Database(db_err) => {
            let message = match db_err.code() {
                Some(code) => format!("{} (SQLSTATE {})", db_err.message(), code),
                None => db_err.message().to_string(),
            };
            DbError::bulk_copy(table, message)
        }
        other => DbError::bulk_copy(table, DbError::from(other).to_string()),
    }
}

/// Build `COPY "table" ("c1", ...) FROM STDIN`.
pub(crate) fn copy_statement(table: &str, columns: &[&str]) -> DbResult<String> {
    let target = quote_table(table)?;
    let columns = columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");
    Ok(format!("COPY {} ({}) FROM STDIN", target, columns))
}

/// Double-quote an identifier, doubling embedded quotes.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Quote `table` or `schema.table`.
pub fn quote_table(table: &str) -> DbResult<String> {
    let parts: Vec<&str> = table.split('.').collect();
    if parts.len() > 2 || parts.iter().any(|p| p.is_empty()) {
        return Err(DbError::bulk_copy(
            table,
            "table must be 'name' or 'schema.name'",
        ));
    }
    Ok(parts
        .iter()
        .map(|p| quote_ident(p))
        .collect::<Vec<_>>()
        .join("."))
}

/// Append one row in COPY text format.
pub(crate) fn encode_row(out: &mut Vec<u8>, values: &[QueryParam]) {
    for (i, value) in values.iter().enumerate() {
        if i > 0 {
            out.push(b'\t');
        }
        encode_value(out, value);
    }
    out.push(b'\n');
}

fn encode_value(out: &mut Vec<u8>, value: &QueryParam) {
    match value {
        QueryParam::Null | QueryParam::TypedNull(_) => out.extend_from_slice(b"\\N"),
        QueryParam::Bool(v) => out.push(if *v { b't' } else { b'f' }),
        QueryParam::Int2(v) => out.extend_from_slice(v.to_string().as_bytes()),
        QueryParam::Int4(v) => out.extend_from_slice(v.to_string().as_bytes()),
        QueryParam::Int(v) => out.extend_from_slice(v.to_string().as_bytes()),
        QueryParam::Float4(v) => out.extend_from_slice(format_float(*v).as_bytes()),
        QueryParam::Float(v) => out.extend_from_slice(format_float(*v).as_bytes()),
        QueryParam::String(s) => escape_text(out, s),
        QueryParam::Bytes(bytes) => {
            // `\\x` so the server sees bytea hex input `\x...`
            let mut hex = String::with_capacity(3 + bytes.len() * 2);
            hex.push_str("\\\\x");
            for b in bytes {
                let _ = write!(hex, "{:02x}", b);
            }
            out.extend_from_slice(hex.as_bytes());
        }
        QueryParam::Json(v) => escape_text(out, &v.to_string()),
        QueryParam::Uuid(v) => out.extend_from_slice(v.hyphenated().to_string().as_bytes()),
        QueryParam::Timestamp(v) => out.extend_from_slice(
            v.to_rfc3339_opts(SecondsFormat::AutoSi, true).as_bytes(),
        ),
    }
}

fn format_float<F: Into<f64> + ToString + Copy>(v: F) -> String {
    let wide: f64 = v.into();
    if wide.is_nan() {
        "NaN".to_string()
    } else if wide == f64::INFINITY {
        "Infinity".to_string()
    } else if wide == f64::NEG_INFINITY {
        "-Infinity".to_string()
    } else {
        v.to_string()
    }
}

fn escape_text(out: &mut Vec<u8>, s: &str) {
    for b in s.bytes() {
        match b {
            b'\\' => out.extend_from_slice(b"\\\\"),
            b'\t' => out.extend_from_slice(b"\\t"),
            b'\n' => out.extend_from_slice(b"\\n"),
            b'\r' => out.extend_from_slice(b"\\r"),
            _ => out.push(b),
        }
    }
}
