//! Schema discovery and question-driven context selection.
//!
//! The index is built once from `information_schema.columns` and then only
//! read. Relevance is a plain substring score between the question's words
//! and table/column names.

use crate::db::connection::ConnectionFactory;
use crate::error::{AgentError, AgentResult};
use crate::models::{ColumnDescriptor, RelevanceScore, SchemaCatalog};
use regex::Regex;
use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::sync::LazyLock;
use tracing::{debug, info};

/// Score added when a question word appears in the table key.
pub const TABLE_MATCH_WEIGHT: u32 = 2;
/// Score added for each column name containing a question word.
pub const COLUMN_MATCH_WEIGHT: u32 = 1;

const DISCOVER_COLUMNS: &str = r#"
    SELECT
        table_schema::text,
        table_name::text,
        column_name::text,
        data_type::text,
        is_nullable::text
    FROM information_schema.columns
    WHERE table_schema NOT IN ('pg_catalog', 'information_schema')
    ORDER BY table_name, ordinal_position
    "#;

static WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\w+\b").expect("constant pattern"));

/// Lowercased word tokens of `text`, without duplicates.
pub fn tokenize(text: &str) -> BTreeSet<String> {
    let lower = text.to_lowercase();
    WORD.find_iter(&lower)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Holds the discovered catalog, if any.
#[derive(Debug, Default)]
pub struct SchemaIndex {
    catalog: Option<SchemaCatalog>,
}

impl SchemaIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an index over an already assembled catalog.
    pub fn with_catalog(catalog: SchemaCatalog) -> Self {
        Self {
            catalog: Some(catalog),
        }
    }

    /// Read all user table columns and replace the catalog.
    ///
    /// Returns the number of tables discovered.
    pub async fn discover(&mut self, factory: &ConnectionFactory) -> AgentResult<usize> {
        info!("Discovering database schema");

        let mut conn = factory.connect().await?;
        let rows = sqlx::query_as::<_, (String, String, String, String, String)>(DISCOVER_COLUMNS)
            .fetch_all(&mut *conn)
            .await;
        conn.close().await;
        let rows = rows.map_err(|e| AgentError::from_statement(e, DISCOVER_COLUMNS, 0))?;

        let mut catalog = SchemaCatalog::new();
        for (schema, table, column, data_type, nullable) in rows {
            catalog.push_column(
                &schema,
                &table,
                ColumnDescriptor::new(column, data_type, nullable == "YES"),
            );
        }

        let tables = catalog.len();
        info!(tables, columns = catalog.column_count(), "Schema discovered");
        self.catalog = Some(catalog);
        Ok(tables)
    }

    pub fn is_discovered(&self) -> bool {
        self.catalog.is_some()
    }

    pub fn catalog(&self) -> AgentResult<&SchemaCatalog> {
        self.catalog.as_ref().ok_or(AgentError::SchemaNotDiscovered)
    }

    /// Score every table against `question`, highest first.
    ///
    /// Tables scoring zero are left out. Equal scores keep discovery order.
    pub fn score_tables(&self, question: &str) -> Vec<RelevanceScore> {
        let Some(catalog) = &self.catalog else {
            return Vec::new();
        };
        let tokens = tokenize(question);

        let mut scores: Vec<RelevanceScore> = catalog
            .iter()
            .filter_map(|(key, table)| {
                let key_lower = key.to_lowercase();
                let mut score = 0;
                for token in &tokens {
                    if key_lower.contains(token.as_str()) {
                        score += TABLE_MATCH_WEIGHT;
                    }
                    score += table
                        .columns
                        .iter()
                        .filter(|c| c.name.to_lowercase().contains(token.as_str()))
                        .count() as u32
                        * COLUMN_MATCH_WEIGHT;
                }
                (score > 0).then(|| RelevanceScore {
                    table: key.to_string(),
                    score,
                })
            })
            .collect();

        // stable: ties stay in discovery order
        scores.sort_by(|a, b| b.score.cmp(&a.score));
        scores
    }

    /// Describe the `max_tables` most relevant tables for a prompt.
    ///
    /// Returns an empty string when nothing matches or the schema has not
    /// been discovered.
    pub fn relevant_context(&self, question: &str, max_tables: usize) -> String {
        let Some(catalog) = &self.catalog else {
            return String::new();
        };

        let scores = self.score_tables(question);
        debug!(
            candidates = scores.len(),
            max_tables,
            "Selected tables for question"
        );

        let mut context = String::new();
        for RelevanceScore { table, .. } in scores.into_iter().take(max_tables) {
            let Some(descriptor) = catalog.get(&table) else {
                continue;
            };
            let _ = write!(context, "\nTable: {}\nColumns:\n", table);
            for column in &descriptor.columns {
                let _ = writeln!(context, "  - {} ({})", column.name, column.data_type);
            }
        }
        context
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn odoo_catalog() -> SchemaCatalog {
        let mut catalog = SchemaCatalog::new();
        for (table, column, data_type) in [
            ("res_partner", "id", "integer"),
            ("res_partner", "name", "character varying"),
            ("sale_order", "id", "integer"),
            ("sale_order", "amount_total", "numeric"),
            ("sale_order", "date_order", "timestamp without time zone"),
            ("sale_order_line", "price_subtotal", "numeric"),
            ("stock_move", "product_qty", "numeric"),
        ] {
            catalog.push_column("public", table, ColumnDescriptor::new(column, data_type, true));
        }
        catalog
    }

    #[test]
    fn test_tokenize_lowercases_and_dedupes() {
        let tokens = tokenize("Total SALES, total amount?");
        let expected: BTreeSet<String> = ["total", "sales", "amount"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(tokens, expected);
    }

    #[test]
    fn test_undiscovered_index() {
        let index = SchemaIndex::new();
        assert!(!index.is_discovered());
        assert!(matches!(index.catalog(), Err(AgentError::SchemaNotDiscovered)));
        assert_eq!(index.relevant_context("anything", 5), "");
        assert!(index.score_tables("anything").is_empty());
    }

    #[test]
    fn test_scores_table_and_column_matches() {
        let index = SchemaIndex::with_catalog(odoo_catalog());
        let scores = index.score_tables("sale amount");

        // sale_order: "sale" in key (+2), "amount" in amount_total (+1)
        assert_eq!(scores[0], RelevanceScore { table: "sale_order".into(), score: 3 });
        // sale_order_line: "sale" in key (+2)
        assert_eq!(scores[1], RelevanceScore { table: "sale_order_line".into(), score: 2 });
        assert_eq!(scores.len(), 2);
    }

    #[test]
    fn test_ties_keep_discovery_order() {
        let index = SchemaIndex::with_catalog(odoo_catalog());
        let scores = index.score_tables("id");
        let tables: Vec<&str> = scores.iter().map(|s| s.table.as_str()).collect();
        assert_eq!(tables, vec!["res_partner", "sale_order"]);
    }

    #[test]
    fn test_relevant_context_format() {
        let index = SchemaIndex::with_catalog(odoo_catalog());
        let context = index.relevant_context("partner name", 1);
        assert_eq!(
            context,
            "\nTable: res_partner\nColumns:\n  - id (integer)\n  - name (character varying)\n"
        );
    }

    #[test]
    fn test_relevant_context_respects_max_tables() {
        let index = SchemaIndex::with_catalog(odoo_catalog());
        let context = index.relevant_context("sale", 1);
        assert!(context.contains("Table: sale_order\n"));
        assert!(!context.contains("sale_order_line"));
    }

    #[test]
    fn test_no_match_gives_empty_context() {
        let index = SchemaIndex::with_catalog(odoo_catalog());
        assert_eq!(index.relevant_context("weather forecast", 5), "");
    }
}
