//! Natural-language to SQL generation.
//!
//! The agent only needs `(question, schema context) -> SQL text`. The shipped
//! [`CommandGenerator`] delegates to an operator-provided program, so any
//! model client can be plugged in without linking it into this crate.
//! Whatever comes back still goes through the safety gate.

use crate::error::{AgentError, AgentResult};
use regex::Regex;
use serde::Serialize;
use std::future::Future;
use std::process::Stdio;
use std::sync::LazyLock;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

static OPENING_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```(?:sql)?\s*").expect("constant pattern"));
static CLOSING_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```\s*$").expect("constant pattern"));

/// Produces candidate SQL for a question.
pub trait SqlGenerator: Send + Sync {
    fn generate(
        &self,
        question: &str,
        schema_context: &str,
    ) -> impl Future<Output = AgentResult<String>> + Send;
}

/// Plain functions and closures work as generators, which keeps tests and
/// fixed-answer setups short.
impl<F> SqlGenerator for F
where
    F: Fn(&str, &str) -> AgentResult<String> + Send + Sync,
{
    async fn generate(&self, question: &str, schema_context: &str) -> AgentResult<String> {
        self(question, schema_context)
    }
}

/// Strip surrounding whitespace and markdown code fences from model output.
pub fn clean_generated_sql(raw: &str) -> String {
    let sql = raw.trim();
    if !sql.starts_with("```") {
        return sql.to_string();
    }
    let sql = OPENING_FENCE.replace_all(sql, "");
    let sql = CLOSING_FENCE.replace(&sql, "");
    sql.trim().to_string()
}

#[derive(Debug, Serialize)]
struct GenerationRequest<'a> {
    question: &'a str,
    schema_context: &'a str,
}

/// Runs an external command per question.
///
/// The command receives `{"question": ..., "schema_context": ...}` as JSON on
/// stdin and must print the SQL on stdout.
#[derive(Debug, Clone)]
pub struct CommandGenerator {
    program: String,
    args: Vec<String>,
}

impl CommandGenerator {
    /// Parse a whitespace-separated command line (no shell quoting).
    pub fn from_command_line(command_line: &str) -> AgentResult<Self> {
        let mut parts = command_line.split_whitespace().map(String::from);
        let program = parts
            .next()
            .ok_or_else(|| AgentError::invalid_input("Generator command is empty"))?;
        Ok(Self {
            program,
            args: parts.collect(),
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl SqlGenerator for CommandGenerator {
    async fn generate(&self, question: &str, schema_context: &str) -> AgentResult<String> {
        let request = serde_json::to_vec(&GenerationRequest {
            question,
            schema_context,
        })
        .map_err(|e| AgentError::internal(format!("Failed to encode generator request: {}", e)))?;

        debug!(program = %self.program, question = %question, "Requesting SQL from generator");

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                AgentError::generation(format!("Failed to start '{}': {}", self.program, e))
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(&request).await.map_err(|e| {
                AgentError::generation(format!("Failed to write generator request: {}", e))
            })?;
            // closing stdin signals end of request
            drop(stdin);
        }

        let output = child.wait_with_output().await.map_err(|e| {
            AgentError::generation(format!("Generator '{}' failed: {}", self.program, e))
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AgentError::generation(format!(
                "Generator '{}' exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        let sql = clean_generated_sql(&String::from_utf8_lossy(&output.stdout));
        if sql.is_empty() {
            return Err(AgentError::generation(format!(
                "Generator '{}' returned no SQL",
                self.program
            )));
        }

        debug!(sql = %sql, "Generator returned SQL");
        Ok(sql)
    }
}
