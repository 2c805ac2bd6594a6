//! Schema-related data models.
//!
//! This module defines the catalog built by schema discovery.

use serde::Serialize;
use std::collections::HashMap;

/// Schemas that never enter the catalog.
pub const RESERVED_SCHEMAS: &[&str] = &["pg_catalog", "information_schema"];

/// Schema whose tables are keyed without a qualifier.
pub const DEFAULT_SCHEMA: &str = "public";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnDescriptor {
    pub name: String,
    /// Declared type as reported by `information_schema` (e.g. "numeric")
    pub data_type: String,
    pub nullable: bool,
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>, nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableDescriptor {
    pub table_name: String,
    pub schema_name: String,
    /// Ordered by ordinal position
    pub columns: Vec<ColumnDescriptor>,
}

/// A table's heuristic relevance to a question. Only positive scores are kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelevanceScore {
    pub table: String,
    pub score: u32,
}

/// Discovered tables keyed by qualified name, in discovery order.
#[derive(Debug, Clone, Default)]
pub struct SchemaCatalog {
    tables: Vec<(String, TableDescriptor)>,
    index: HashMap<String, usize>,
}

impl SchemaCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog key for a table: bare name in `public`, `schema.table` elsewhere.
    pub fn qualified_name(schema: &str, table: &str) -> String {
        if schema == DEFAULT_SCHEMA {
            table.to_string()
        } else {
            format!("{}.{}", schema, table)
        }
    }

    /// Whether the schema is excluded from discovery.
    pub fn is_reserved_schema(schema: &str) -> bool {
        RESERVED_SCHEMAS.contains(&schema)
    }

    /// Append a column to its table, creating the table on first sight.
    ///
    /// Columns in reserved schemas are ignored.
    pub fn push_column(&mut self, schema: &str, table: &str, column: ColumnDescriptor) {
        if Self::is_reserved_schema(schema) {
            return;
        }

        let key = Self::qualified_name(schema, table);
        let idx = match self.index.get(&key) {
            Some(idx) => *idx,
            None => {
                self.tables.push((
                    key.clone(),
                    TableDescriptor {
                        table_name: table.to_string(),
                        schema_name: schema.to_string(),
                        columns: Vec::new(),
                    },
                ));
                let idx = self.tables.len() - 1;
                self.index.insert(key, idx);
                idx
            }
        };
        self.tables[idx].1.columns.push(column);
    }

    pub fn get(&self, key: &str) -> Option<&TableDescriptor> {
        self.index.get(key).map(|idx| &self.tables[*idx].1)
    }

    /// Tables with their keys, in discovery order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &TableDescriptor)> {
        self.tables.iter().map(|(key, table)| (key.as_str(), table))
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn column_count(&self) -> usize {
        self.tables.iter().map(|(_, t)| t.columns.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qualified_name() {
        assert_eq!(SchemaCatalog::qualified_name("public", "sale_order"), "sale_order");
        assert_eq!(
            SchemaCatalog::qualified_name("audit", "log_entry"),
            "audit.log_entry"
        );
    }

    #[test]
    fn test_push_column_groups_by_table_in_discovery_order() {
        let mut catalog = SchemaCatalog::new();
        catalog.push_column("public", "sale_order", ColumnDescriptor::new("id", "integer", false));
        catalog.push_column("public", "res_partner", ColumnDescriptor::new("id", "integer", false));
        catalog.push_column(
            "public",
            "sale_order",
            ColumnDescriptor::new("amount_total", "numeric", true),
        );

        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.column_count(), 3);

        let keys: Vec<&str> = catalog.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["sale_order", "res_partner"]);

        let order = catalog.get("sale_order").unwrap();
        let names: Vec<&str> = order.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["id", "amount_total"]);
        assert_eq!(order.schema_name, "public");
    }

    #[test]
    fn test_same_table_name_in_two_schemas_stays_separate() {
        let mut catalog = SchemaCatalog::new();
        catalog.push_column("public", "log", ColumnDescriptor::new("id", "integer", false));
        catalog.push_column("audit", "log", ColumnDescriptor::new("id", "integer", false));

        assert_eq!(catalog.len(), 2);
        assert!(catalog.get("log").is_some());
        assert_eq!(catalog.get("audit.log").unwrap().table_name, "log");
    }

    #[test]
    fn test_reserved_schemas_are_skipped() {
        let mut catalog = SchemaCatalog::new();
        catalog.push_column("pg_catalog", "pg_class", ColumnDescriptor::new("oid", "oid", false));
        catalog.push_column(
            "information_schema",
            "columns",
            ColumnDescriptor::new("column_name", "name", true),
        );
        assert!(catalog.is_empty());
    }
}
