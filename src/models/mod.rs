//! Data models shared by the executor, mapper and bulk loader.

pub mod query;

pub use query::{FromParam, NamedParams, QueryParam, SqlKind};
