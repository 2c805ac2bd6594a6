//! Optional parser-based check layered on top of the lexical gate.
//!
//! Uses [sqlparser](https://docs.rs/sqlparser/) with the PostgreSQL dialect to
//! require that the bounded text is a single query statement. This only adds
//! rejections; text that fails the lexical checks never reaches it.

use crate::error::{AgentError, AgentResult};
use sqlparser::ast::Statement;
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;

const PARSE_ERROR: &str = "Failed to parse SQL statement.";

/// Require `sql` to parse as exactly one query (SELECT / WITH ... SELECT).
pub fn ensure_single_query(sql: &str) -> AgentResult<()> {
    let statements = Parser::parse_sql(&PostgreSqlDialect {}, sql)
        .map_err(|e| AgentError::invalid_input(format!("{} Error: {}", PARSE_ERROR, e)))?;

    match statements.as_slice() {
        [Statement::Query(_)] => Ok(()),
        [] => Err(AgentError::invalid_input("Empty SQL statement")),
        _ => Err(AgentError::NotReadOnly),
    }
}
