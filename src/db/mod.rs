//! Database access layer.
//!
//! This module provides:
//! - Connection pool management
//! - Named-parameter query execution
//! - Record mapping in both directions
//! - COPY bulk loading
//! - Deadlines and cancellation for network-bound calls

pub mod cancel;
pub mod copy;
pub mod executor;
#[macro_use]
pub mod macros;
pub mod mapping;
pub mod named;
pub mod params;
pub mod pool;
pub mod types;

pub use cancel::Cancel;
pub use copy::BulkLoader;
pub use executor::{QueryExecutor, RowStream};
pub use mapping::{FieldSpec, Record, RowSource, Strictness};
pub use named::NamedStatement;
pub use pool::{Database, PoolHealth, PoolStatus};
pub use types::ColumnKind;
