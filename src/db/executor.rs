//! Query execution engine.
//!
//! Each call opens its own read-only session, sets `statement_timeout`, runs
//! the validated text as a simple query and closes the session on every path.
//! A client-side guard slightly longer than the server timeout covers a
//! server that never answers the cancellation.

use crate::db::connection::ConnectionFactory;
use crate::db::types::{column_names, row_to_map};
use crate::error::{AgentError, AgentResult};
use crate::models::{QueryResult, ValidatedQuery};
use futures_util::TryStreamExt;
use sqlx::Executor;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, warn};

/// Extra time granted past `statement_timeout` before the client gives up.
pub const CLIENT_TIMEOUT_GRACE: Duration = Duration::from_secs(5);

/// Runs validated queries against fresh read-only sessions.
#[derive(Debug, Clone)]
pub struct QueryExecutor {
    factory: ConnectionFactory,
}

impl QueryExecutor {
    pub fn new(factory: ConnectionFactory) -> Self {
        Self { factory }
    }

    pub fn factory(&self) -> &ConnectionFactory {
        &self.factory
    }

    /// Execute `query` with a server-side timeout of `timeout_secs`.
    ///
    /// Rows keep the server's order and each row keeps the column order.
    pub async fn execute(&self, query: &ValidatedQuery, timeout_secs: u64) -> AgentResult<QueryResult> {
        let sql = query.as_str();
        let mut conn = self.factory.connect().await?;

        let timeout_ms = timeout_secs.saturating_mul(1000);
        if let Err(e) = (&mut *conn)
            .execute(format!("SET statement_timeout = {}", timeout_ms).as_str())
            .await
        {
            conn.close().await;
            return Err(AgentError::from(e));
        }

        debug!(sql = %sql, timeout_secs, "Executing query");

        let guard = Duration::from_secs(timeout_secs) + CLIENT_TIMEOUT_GRACE;
        let start = Instant::now();
        let outcome = timeout(guard, (&mut *conn).fetch(sql).try_collect::<Vec<_>>()).await;
        let duration = start.elapsed();

        let rows = match outcome {
            Ok(Ok(rows)) => rows,
            Ok(Err(e)) => {
                conn.close().await;
                let err = AgentError::from_statement(e, sql, timeout_secs);
                warn!(error = %err, "Query failed");
                return Err(err);
            }
            Err(_) => {
                // The session may still be busy with the statement; drop it unclosed
                drop(conn);
                warn!(timeout_secs, "Query exceeded client-side guard");
                return Err(AgentError::timeout(timeout_secs, sql));
            }
        };
        conn.close().await;

        let columns = rows.first().map(column_names).unwrap_or_default();
        let rows: Vec<_> = rows.iter().map(row_to_map).collect();

        debug!(
            rows = rows.len(),
            elapsed_ms = duration.as_millis() as u64,
            "Query completed"
        );

        Ok(QueryResult {
            columns,
            rows,
            duration,
        })
    }
}
