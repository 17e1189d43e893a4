//! Database schema types for db-gate.
//!
//! Represents the allowlisted tables, their columns and foreign keys, and
//! renders them as the grounding text handed to the agent.

use serde::Serialize;

use super::QueryResult;

/// Represents the described part of a database.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Schema {
    /// Allowlisted tables, in allowlist order.
    pub tables: Vec<Table>,

    /// Foreign key relationships between allowlisted tables.
    pub foreign_keys: Vec<ForeignKey>,
}

impl Schema {
    /// Creates a new empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the table with the given name.
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Formats the schema for inclusion in an LLM system prompt.
    ///
    /// Produces a human-readable representation that helps the LLM
    /// understand the database structure.
    pub fn format_for_llm(&self) -> String {
        let tables_text = self
            .tables
            .iter()
            .map(|table| self.format_table_for_llm(table))
            .collect::<Vec<_>>()
            .join("");

        let foreign_keys_text = if self.foreign_keys.is_empty() {
            String::new()
        } else {
            let fk_lines = self
                .foreign_keys
                .iter()
                .map(|fk| {
                    format!(
                        "  - {}.{} -> {}.{}\n",
                        fk.from_table,
                        fk.from_columns.join(", "),
                        fk.to_table,
                        fk.to_columns.join(", ")
                    )
                })
                .collect::<Vec<_>>()
                .join("");
            format!("Foreign Keys:\n{}", fk_lines)
        };

        format!("Database Schema:\n\n{}{}", tables_text, foreign_keys_text)
    }

    fn format_table_for_llm(&self, table: &Table) -> String {
        let column_lines = table
            .columns
            .iter()
            .map(|column| Self::format_column_line(table, column))
            .collect::<Vec<_>>()
            .join("");

        let sample_text = table
            .sample
            .as_ref()
            .filter(|sample| !sample.is_empty())
            .map(|sample| Self::format_sample(&table.name, sample))
            .unwrap_or_default();

        format!("Table: {}\n{}{}\n", table.name, column_lines, sample_text)
    }

    fn format_column_line(table: &Table, column: &Column) -> String {
        let annotations = [
            table.primary_key.contains(&column.name).then_some("PK".to_string()),
            (!column.is_nullable).then_some("NOT NULL".to_string()),
            column.default.as_ref().map(|d| format!("DEFAULT {d}")),
        ]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>();

        if annotations.is_empty() {
            format!("  - {}: {}\n", column.name, column.data_type)
        } else {
            format!(
                "  - {}: {} ({})\n",
                column.name,
                column.data_type,
                annotations.join(", ")
            )
        }
    }

    fn format_sample(table_name: &str, sample: &QueryResult) -> String {
        let header = sample.columns().join(" | ");
        let rows = sample
            .rows()
            .iter()
            .map(|row| {
                let cells = row
                    .iter()
                    .map(|v| v.to_display_string())
                    .collect::<Vec<_>>()
                    .join(" | ");
                format!("    {cells}\n")
            })
            .collect::<Vec<_>>()
            .join("");

        format!(
            "  {} rows from {}:\n    {}\n{}",
            sample.row_count(),
            table_name,
            header,
            rows
        )
    }
}

/// Represents a database table.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Table {
    /// Table name.
    pub name: String,

    /// Columns in the table.
    pub columns: Vec<Column>,

    /// Column names that form the primary key.
    pub primary_key: Vec<String>,

    /// Example rows, if sampling is enabled.
    pub sample: Option<QueryResult>,
}

impl Table {
    /// Creates a new table with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Represents a column in a table.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Column {
    /// Column name.
    pub name: String,

    /// Declared data type.
    pub data_type: String,

    /// Whether the column accepts NULL.
    pub is_nullable: bool,

    /// Default value expression, if any.
    pub default: Option<String>,
}

impl Column {
    /// Creates a nullable column without a default.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            is_nullable: true,
            default: None,
        }
    }
}

/// Represents a foreign key relationship.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct ForeignKey {
    /// Referencing table.
    pub from_table: String,

    /// Referencing columns.
    pub from_columns: Vec<String>,

    /// Referenced table.
    pub to_table: String,

    /// Referenced columns.
    pub to_columns: Vec<String>,
}

/// Quotes a table name for interpolation, part by part for qualified names.
///
/// Callers only pass allowlisted names, which are validated as plain
/// identifiers at startup.
pub fn quote_table_name(name: &str) -> String {
    name.split('.')
        .map(|part| format!("\"{}\"", part.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(".")
}
