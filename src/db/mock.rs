//! Mock database clients for testing.
//!
//! Provide in-memory implementations that record what reached them, so
//! tests can assert that a denied statement never touched the database.

use super::{DatabaseBackend, DatabaseClient, QueryResult, Schema, Value};
use crate::error::{GateError, Result};
use async_trait::async_trait;
use std::sync::Mutex;

/// A mock database client that returns predefined results.
///
/// Without a configured result, every statement yields a single `result`
/// column echoing the executed SQL.
#[derive(Debug, Default)]
pub struct MockDatabaseClient {
    schema: Schema,
    result: Option<QueryResult>,
    executed: Mutex<Vec<String>>,
}

impl MockDatabaseClient {
    /// Creates a new mock database client with an empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new mock database client with the given schema.
    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.schema = schema;
        self
    }

    /// Returns the given result for every statement.
    pub fn with_result(mut self, result: QueryResult) -> Self {
        self.result = Some(result);
        self
    }

    /// Statements executed so far, in order.
    pub fn executed(&self) -> Vec<String> {
        self.executed
            .lock()
            .map(|log| log.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl DatabaseClient for MockDatabaseClient {
    fn backend(&self) -> DatabaseBackend {
        DatabaseBackend::Sqlite
    }

    async fn introspect_schema(&self, tables: &[String]) -> Result<Schema> {
        let missing: Vec<&String> = tables
            .iter()
            .filter(|t| self.schema.table(t).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(super::missing_tables_error(&missing));
        }

        let mut schema = Schema::new();
        for name in tables {
            if let Some(table) = self.schema.table(name) {
                schema.tables.push(table.clone());
            }
        }
        schema.foreign_keys = self
            .schema
            .foreign_keys
            .iter()
            .filter(|fk| tables.contains(&fk.from_table) && tables.contains(&fk.to_table))
            .cloned()
            .collect();
        Ok(schema)
    }

    async fn execute_query(&self, sql: &str) -> Result<QueryResult> {
        self.executed
            .lock()
            .map_err(|_| GateError::internal("mock execution log poisoned"))?
            .push(sql.to_string());

        match &self.result {
            Some(result) => Ok(result.clone()),
            None => QueryResult::new(
                vec!["result".to_string()],
                vec![vec![Value::String(format!("Mock result for: {}", sql))]],
            ),
        }
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// A mock client whose every statement fails with the given message.
#[derive(Debug)]
pub struct FailingDatabaseClient {
    message: String,
    attempts: Mutex<usize>,
}

impl FailingDatabaseClient {
    /// Creates a client that fails with `message`.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            attempts: Mutex::new(0),
        }
    }

    /// Number of statements that reached this client.
    pub fn attempts(&self) -> usize {
        self.attempts.lock().map(|n| *n).unwrap_or_default()
    }
}

#[async_trait]
impl DatabaseClient for FailingDatabaseClient {
    fn backend(&self) -> DatabaseBackend {
        DatabaseBackend::Sqlite
    }

    async fn introspect_schema(&self, _tables: &[String]) -> Result<Schema> {
        Err(GateError::schema(self.message.clone()))
    }

    async fn execute_query(&self, _sql: &str) -> Result<QueryResult> {
        if let Ok(mut attempts) = self.attempts.lock() {
            *attempts += 1;
        }
        Err(GateError::query(self.message.clone()))
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
