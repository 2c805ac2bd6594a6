//! Data models for the ERP query agent.
//!
//! This module re-exports all model types used throughout the application.

pub mod query;
pub mod schema;

// Re-export commonly used types
pub use query::{QueryResult, Row, ValidatedQuery};
pub use schema::{ColumnDescriptor, RelevanceScore, SchemaCatalog, TableDescriptor};
