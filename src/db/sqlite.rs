//! SQLite database client implementation.
//!
//! Provides the `SqliteClient` struct that implements the `DatabaseClient`
//! trait for SQLite databases using sqlx. The pool is opened read-only so
//! the engine itself refuses writes that slip past the statement gate.

use crate::config::DatabaseConfig;
use crate::db::{
    missing_tables_error, Column, DatabaseBackend, DatabaseClient, ForeignKey, QueryResult, Row,
    Schema, Table, Value,
};
use crate::error::{GateError, Result};
use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column as SqlxColumn, Executor, Row as SqlxRow, Statement, TypeInfo, ValueRef};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::{Duration, Instant};
use tracing::debug;

/// SQLite database client.
#[derive(Debug)]
pub struct SqliteClient {
    pool: SqlitePool,
    query_timeout: Duration,
}

impl SqliteClient {
    /// Opens a read-only pool for the configured SQLite URL.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let url = config.url()?;
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| GateError::config(format!("Invalid SQLite URL: {e}")))?
            .read_only(true)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect_with(options)
            .await
            .map_err(|e| {
                GateError::connection(format!(
                    "Cannot open {}: {e}",
                    config.display_string()
                ))
            })?;

        debug!("Opened SQLite pool for {}", config.display_string());
        Ok(Self::from_pool(
            pool,
            Duration::from_secs(config.query_timeout_secs),
        ))
    }

    /// Creates a client from an existing connection pool.
    pub fn from_pool(pool: SqlitePool, query_timeout: Duration) -> Self {
        Self {
            pool,
            query_timeout,
        }
    }

    /// Runs a statement on one pooled connection.
    ///
    /// The statement is prepared first so the column names are known even
    /// when no row comes back.
    async fn run(&self, sql: &str, max_rows: Option<usize>) -> Result<QueryResult> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| GateError::connection(format!("Failed to acquire connection: {e}")))?;

        let statement = (&mut *conn)
            .prepare(sql)
            .await
            .map_err(|e| GateError::query(format_query_error(e)))?;
        let columns: Vec<String> = statement
            .columns()
            .iter()
            .map(|col| col.name().to_string())
            .collect();

        let rows: Vec<SqliteRow> = match max_rows {
            // Stop reading once the cap is reached
            Some(n) => {
                sqlx::query(sql)
                    .fetch(&mut *conn)
                    .take(n)
                    .try_collect()
                    .await
            }
            None => sqlx::query(sql).fetch_all(&mut *conn).await,
        }
        .map_err(|e| GateError::query(format_query_error(e)))?;

        let rows: Vec<Row> = rows.iter().map(convert_row).collect();
        QueryResult::new(columns, rows)
    }

    async fn run_with_timeout(&self, sql: &str, max_rows: Option<usize>) -> Result<QueryResult> {
        let start = Instant::now();

        let result = tokio::time::timeout(self.query_timeout, self.run(sql, max_rows))
            .await
            .map_err(|_| {
                GateError::query(format!(
                    "Query timed out after {} seconds",
                    self.query_timeout.as_secs()
                ))
            })??;

        debug!(
            rows = result.row_count(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "SQLite query finished"
        );
        Ok(result)
    }

    async fn table_names(&self) -> Result<Vec<String>> {
        let names: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type IN ('table', 'view')",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| GateError::schema(format!("Failed to list tables: {e}")))?;

        Ok(names)
    }

    async fn fetch_table(&self, table_name: &str) -> Result<Table> {
        let rows: Vec<(String, String, i64, Option<String>, i64)> = sqlx::query_as(
            r#"
            SELECT name, type, "notnull", dflt_value, pk
            FROM pragma_table_info(?)
            ORDER BY cid
            "#,
        )
        .bind(table_name)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            GateError::schema(format!("Failed to fetch columns for {table_name}: {e}"))
        })?;

        let mut primary_key: Vec<(i64, String)> = rows
            .iter()
            .filter(|(_, _, _, _, pk)| *pk > 0)
            .map(|(name, _, _, _, pk)| (*pk, name.clone()))
            .collect();
        primary_key.sort();

        let columns = rows
            .into_iter()
            .map(|(name, data_type, not_null, default, pk)| Column {
                name,
                data_type,
                // SQLite reports INTEGER PRIMARY KEY as nullable
                is_nullable: not_null == 0 && pk == 0,
                default,
            })
            .collect();

        Ok(Table {
            name: table_name.to_string(),
            columns,
            primary_key: primary_key.into_iter().map(|(_, name)| name).collect(),
            sample: None,
        })
    }

    async fn fetch_foreign_keys(&self, table_name: &str) -> Result<Vec<ForeignKey>> {
        let rows: Vec<(i64, String, String, Option<String>)> = sqlx::query_as(
            r#"
            SELECT id, "table", "from", "to"
            FROM pragma_foreign_key_list(?)
            ORDER BY id, seq
            "#,
        )
        .bind(table_name)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            GateError::schema(format!(
                "Failed to fetch foreign keys for {table_name}: {e}"
            ))
        })?;

        // Group multi-column keys by constraint id
        let mut fk_map: BTreeMap<i64, ForeignKey> = BTreeMap::new();
        for (id, to_table, from_column, to_column) in rows {
            let entry = fk_map.entry(id).or_insert_with(|| ForeignKey {
                from_table: table_name.to_string(),
                from_columns: Vec::new(),
                to_table,
                to_columns: Vec::new(),
            });
            entry.from_columns.push(from_column);
            // A NULL target column means the referenced primary key
            if let Some(to_column) = to_column {
                entry.to_columns.push(to_column);
            }
        }

        Ok(fk_map.into_values().collect())
    }
}

#[async_trait]
impl DatabaseClient for SqliteClient {
    fn backend(&self) -> DatabaseBackend {
        DatabaseBackend::Sqlite
    }

    async fn introspect_schema(&self, tables: &[String]) -> Result<Schema> {
        let existing = self.table_names().await?;
        let missing: Vec<&String> = tables
            .iter()
            .filter(|t| !existing.iter().any(|name| name.eq_ignore_ascii_case(t)))
            .collect();
        if !missing.is_empty() {
            return Err(missing_tables_error(&missing));
        }

        let mut schema = Schema::new();
        for table_name in tables {
            schema.tables.push(self.fetch_table(table_name).await?);
            for fk in self.fetch_foreign_keys(table_name).await? {
                // SQLite identifiers are case-insensitive
                if tables.iter().any(|t| t.eq_ignore_ascii_case(&fk.to_table)) {
                    schema.foreign_keys.push(fk);
                }
            }
        }

        Ok(schema)
    }

    async fn execute_query(&self, sql: &str) -> Result<QueryResult> {
        self.run_with_timeout(sql, None).await
    }

    async fn execute_query_capped(&self, sql: &str, max_rows: usize) -> Result<QueryResult> {
        self.run_with_timeout(sql, Some(max_rows)).await
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}

/// Converts a sqlx SqliteRow to our Row type.
fn convert_row(row: &SqliteRow) -> Row {
    (0..row.columns().len())
        .map(|i| convert_value(row, i))
        .collect()
}

/// Converts a single value by its runtime storage class.
///
/// SQLite is dynamically typed, so the declared column type says little
/// about what a given cell holds.
fn convert_value(row: &SqliteRow, index: usize) -> Value {
    let storage_class = match row.try_get_raw(index) {
        Ok(raw) if !raw.is_null() => raw.type_info().name().to_uppercase(),
        _ => return Value::Null,
    };

    match storage_class.as_str() {
        "INTEGER" => row
            .try_get::<i64, _>(index)
            .map(Value::Int)
            .unwrap_or(Value::Null),

        "REAL" => row
            .try_get::<f64, _>(index)
            .map(Value::Float)
            .unwrap_or(Value::Null),

        "BLOB" => row
            .try_get::<Vec<u8>, _>(index)
            .map(Value::Bytes)
            .unwrap_or(Value::Null),

        "BOOLEAN" => row
            .try_get::<bool, _>(index)
            .map(Value::Bool)
            .unwrap_or(Value::Null),

        // TEXT and anything else
        _ => row
            .try_get::<String, _>(index)
            .map(Value::String)
            .unwrap_or(Value::Null),
    }
}

/// Formats a query error, keeping the engine's own message.
fn format_query_error(error: sqlx::Error) -> String {
    match error.as_database_error() {
        Some(db_error) => db_error.message().to_string(),
        None => error.to_string(),
    }
}
