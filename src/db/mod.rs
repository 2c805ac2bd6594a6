//! Database access layer.
//!
//! - Read-only session factory with connect retry
//! - Query execution with statement timeouts
//! - Schema discovery and relevance scoring
//! - PostgreSQL value decoding

pub mod connection;
pub mod executor;
pub mod schema;
pub mod types;

pub use connection::{ConnectionFactory, DatabaseSettings, RetryPolicy, ScopedConnection};
pub use executor::QueryExecutor;
pub use schema::SchemaIndex;
