//! Lexical read-only enforcement and row bounding.
//!
//! The checks work on the uppercased text and never parse it. A forbidden
//! keyword anywhere (identifiers and string literals included) rejects the
//! statement, so a column such as `create_date` is blocked too.

use crate::error::{AgentError, AgentResult};
use crate::models::ValidatedQuery;
use crate::safety::parse;
use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

/// Keywords that reject a statement wherever they appear.
pub const FORBIDDEN_KEYWORDS: &[&str] = &[
    "DROP", "DELETE", "TRUNCATE", "UPDATE", "INSERT", "ALTER", "CREATE", "GRANT", "REVOKE",
    "EXECUTE",
];

/// Statement prefixes accepted as read-only.
pub const READ_ONLY_PREFIXES: &[&str] = &["SELECT", "WITH"];

const LIMIT_KEYWORD: &str = "LIMIT";
const TERMINATOR: char = ';';

static LIMIT_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bLIMIT\b").expect("constant pattern"));

/// Validate that `sql` is a read-only statement.
///
/// # Examples
///
/// ```
/// use erp_query_agent::safety::validate;
///
/// assert!(validate("SELECT name FROM res_partner").is_ok());
/// assert!(validate("delete from res_partner").is_err());
/// ```
pub fn validate(sql: &str) -> AgentResult<()> {
    let upper = sql.to_uppercase();

    if let Some(keyword) = FORBIDDEN_KEYWORDS.iter().find(|kw| upper.contains(*kw)) {
        return Err(AgentError::forbidden(*keyword));
    }

    let trimmed = upper.trim();
    if !READ_ONLY_PREFIXES
        .iter()
        .any(|prefix| trimmed.starts_with(prefix))
    {
        return Err(AgentError::NotReadOnly);
    }

    Ok(())
}

/// Append `LIMIT default_limit` unless the text already has a limit.
///
/// Text that already has `LIMIT` as a word is returned unchanged, so a
/// column such as `credit_limit` does not count. Otherwise all trailing
/// terminators are dropped and the output ends with exactly one `;`.
pub fn bound(sql: &str, default_limit: u32) -> String {
    if LIMIT_WORD.is_match(sql) {
        return sql.to_string();
    }

    let body = sql.trim_end_matches(|c: char| c == TERMINATOR || c.is_whitespace());

    format!("{}\n{} {}{}", body, LIMIT_KEYWORD, default_limit, TERMINATOR)
}

/// Validates and bounds candidate SQL before it may run.
#[derive(Debug, Clone)]
pub struct QueryGate {
    default_limit: u32,
    strict: bool,
}

impl QueryGate {
    pub fn new(default_limit: u32) -> Self {
        Self {
            default_limit,
            strict: false,
        }
    }

    /// Also require the bounded text to parse as exactly one query.
    pub fn with_strict_parsing(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// Run the full gate: validate, bound, then (in strict mode) parse.
    pub fn validate_and_bound(&self, sql: &str) -> AgentResult<ValidatedQuery> {
        validate(sql)?;
        let bounded = bound(sql, self.default_limit);

        if self.strict {
            parse::ensure_single_query(&bounded)?;
        }

        debug!(sql = %bounded, strict = self.strict, "Query passed safety gate");
        Ok(ValidatedQuery::new(bounded))
    }
}
