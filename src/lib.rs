//! PostgreSQL data-access layer.
//!
//! Two ways to talk to the server share one pooled [`Database`]:
//! typed accessors over a fixed statement catalog ([`Queries`]), and dynamic
//! `@name` statements with record mapping and COPY bulk loading
//! ([`QueryExecutor`], [`BulkLoader`]).

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod queries;

pub use config::{Config, DatabaseConfig, PoolOptions};
pub use db::{
    BulkLoader, Cancel, Database, NamedStatement, QueryExecutor, Record, RowStream, Strictness,
};
pub use error::{DbError, DbResult};
pub use models::{NamedParams, QueryParam};
pub use queries::Queries;
