//! The question pipeline.
//!
//! [`Agent`] owns one tunnel, one schema index and the safety gate, and runs
//! each question through context selection, generation, the gate and the
//! executor in that order.

use crate::config::Config;
use crate::db::{ConnectionFactory, DatabaseSettings, QueryExecutor, RetryPolicy, SchemaIndex};
use crate::error::{AgentError, AgentResult};
use crate::generator::SqlGenerator;
use crate::models::{QueryResult, ValidatedQuery};
use crate::safety::QueryGate;
use crate::tunnel::TunnelManager;
use tracing::{info, warn};

/// The SQL that ran and what it returned.
#[derive(Debug, Clone)]
pub struct Answer {
    pub sql: String,
    pub result: QueryResult,
}

pub struct Agent {
    tunnel: TunnelManager,
    database: DatabaseSettings,
    retry: RetryPolicy,
    gate: QueryGate,
    schema: SchemaIndex,
    executor: Option<QueryExecutor>,
    query_timeout_secs: u64,
    context_tables: usize,
}

impl Agent {
    pub fn new(config: &Config) -> Self {
        Self {
            tunnel: TunnelManager::new(config.ssh_settings()),
            database: config.database_settings(),
            retry: config.retry_policy(),
            gate: config.query_gate(),
            schema: SchemaIndex::new(),
            executor: None,
            query_timeout_secs: config.query_timeout,
            context_tables: config.context_tables,
        }
    }

    pub fn gate(&self) -> &QueryGate {
        &self.gate
    }

    pub fn schema(&self) -> &SchemaIndex {
        &self.schema
    }

    pub fn query_timeout_secs(&self) -> u64 {
        self.query_timeout_secs
    }

    /// Start the SSH tunnel and point the executor at its local port.
    pub async fn start_tunnel(&mut self) -> AgentResult<u16> {
        let port = self.tunnel.start().await?;
        let factory = ConnectionFactory::for_tunnel(port, &self.database, self.retry);
        self.executor = Some(QueryExecutor::new(factory));
        Ok(port)
    }

    /// Stop the tunnel. A no-op when it was never started.
    pub async fn stop_tunnel(&mut self) {
        self.executor = None;
        self.tunnel.stop().await;
    }

    pub async fn is_tunnel_running(&self) -> bool {
        self.tunnel.is_running().await
    }

    fn executor(&self) -> AgentResult<&QueryExecutor> {
        self.executor.as_ref().ok_or_else(|| {
            AgentError::connectivity("SSH tunnel is not running", "Start the tunnel first")
        })
    }

    pub async fn discover_schema(&mut self) -> AgentResult<usize> {
        let factory = self.executor()?.factory().clone();
        self.schema.discover(&factory).await
    }

    /// Schema context for `question`, limited to the configured table count.
    pub fn relevant_context(&self, question: &str) -> String {
        self.schema.relevant_context(question, self.context_tables)
    }

    pub fn validate_and_bound(&self, sql: &str) -> AgentResult<ValidatedQuery> {
        self.gate.validate_and_bound(sql)
    }

    pub async fn execute(&self, query: &ValidatedQuery, timeout_secs: u64) -> AgentResult<QueryResult> {
        self.executor()?.execute(query, timeout_secs).await
    }

    /// Ask the generator for SQL, discovering the schema first if needed.
    pub async fn generate_sql<G: SqlGenerator>(
        &mut self,
        question: &str,
        generator: &G,
    ) -> AgentResult<String> {
        if !self.schema.is_discovered() {
            self.discover_schema().await?;
        }

        let context = self.relevant_context(question);
        if context.is_empty() {
            warn!(question = %question, "No tables matched the question");
        }
        generator.generate(question, &context).await
    }

    /// Gate and run `sql` with the configured statement timeout.
    pub async fn run_sql(&self, sql: &str) -> AgentResult<Answer> {
        let query = self.validate_and_bound(sql)?;
        let result = self.execute(&query, self.query_timeout_secs).await?;
        info!(
            rows = result.row_count(),
            elapsed_ms = result.duration.as_millis() as u64,
            "Question answered"
        );
        Ok(Answer {
            sql: query.into_inner(),
            result,
        })
    }

    /// The full pipeline: context, generation, gate, execution.
    pub async fn ask<G: SqlGenerator>(&mut self, question: &str, generator: &G) -> AgentResult<Answer> {
        let sql = self.generate_sql(question, generator).await?;
        self.run_sql(&sql).await
    }

    /// Report the server version through the tunnel.
    pub async fn test_connection(&self) -> AgentResult<String> {
        self.executor()?.factory().server_version().await
    }
}
