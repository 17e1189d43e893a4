//! PostgreSQL database client implementation.
//!
//! Provides the `PostgresClient` struct that implements the `DatabaseClient` trait
//! for PostgreSQL databases using sqlx. Every pooled session is switched to
//! read-only transactions right after connecting.

use crate::config::DatabaseConfig;
use crate::db::{
    missing_tables_error, Column, DatabaseBackend, DatabaseClient, ForeignKey, QueryResult, Row,
    Schema, Table, Value,
};
use crate::error::{GateError, Result};
use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Column as SqlxColumn, Executor, Row as SqlxRow, Statement, TypeInfo};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Maximum number of connection retry attempts.
const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Base delay between retry attempts (doubles each retry).
const RETRY_BASE_DELAY_MS: u64 = 500;

/// PostgreSQL database client.
#[derive(Debug)]
pub struct PostgresClient {
    pool: PgPool,
    query_timeout: Duration,
}

impl PostgresClient {
    /// Connects to the configured server, retrying transient failures.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let conn_str = config.url()?;

        let mut last_error = None;
        let mut delay = Duration::from_millis(RETRY_BASE_DELAY_MS);

        for attempt in 1..=MAX_RETRY_ATTEMPTS {
            debug!("Connection attempt {} of {}", attempt, MAX_RETRY_ATTEMPTS);

            let result = PgPoolOptions::new()
                .max_connections(config.max_connections)
                .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
                .after_connect(|conn, _meta| {
                    Box::pin(async move {
                        conn.execute("SET SESSION CHARACTERISTICS AS TRANSACTION READ ONLY")
                            .await?;
                        Ok(())
                    })
                })
                .connect(conn_str)
                .await;

            match result {
                Ok(pool) => {
                    debug!("Successfully connected to database");
                    return Ok(Self::from_pool(
                        pool,
                        Duration::from_secs(config.query_timeout_secs),
                    ));
                }
                Err(e) => {
                    let is_transient = is_transient_error(&e);
                    last_error = Some(e);

                    if attempt < MAX_RETRY_ATTEMPTS && is_transient {
                        warn!(
                            "Connection attempt {} failed (transient error), retrying in {:?}",
                            attempt, delay
                        );
                        tokio::time::sleep(delay).await;
                        delay *= 2; // Exponential backoff
                    } else {
                        break;
                    }
                }
            }
        }

        Err(match last_error {
            Some(e) => map_connection_error(e, config),
            None => GateError::connection("No connection attempt was made"),
        })
    }

    /// Creates a new PostgresClient from an existing connection pool.
    pub fn from_pool(pool: PgPool, query_timeout: Duration) -> Self {
        Self {
            pool,
            query_timeout,
        }
    }

    /// Runs a statement on one pooled connection.
    async fn run(&self, sql: &str, max_rows: Option<usize>) -> Result<QueryResult> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| GateError::connection(format!("Failed to acquire connection: {e}")))?;

        // Preparing yields column metadata even for empty results
        let statement = (&mut *conn)
            .prepare(sql)
            .await
            .map_err(|e| GateError::query(format_query_error(e)))?;
        let columns: Vec<String> = statement
            .columns()
            .iter()
            .map(|col| col.name().to_string())
            .collect();

        let rows: Vec<PgRow> = match max_rows {
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

    /// Returns which of the given tables exist.
    async fn existing_tables(&self, tables: &[String]) -> Result<Vec<String>> {
        let mut existing = Vec::new();
        for table in tables {
            let (schema, name) = split_qualified(table);
            let found: Option<i32> = sqlx::query_scalar(
                r#"
                SELECT 1
                FROM information_schema.tables
                WHERE table_schema = COALESCE($1, current_schema())
                    AND table_name = $2
                "#,
            )
            .bind(schema)
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| GateError::schema(format!("Failed to look up {table}: {e}")))?;

            if found.is_some() {
                existing.push(table.clone());
            }
        }
        Ok(existing)
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
            "PostgreSQL query finished"
        );
        Ok(result)
    }

    /// Fetches columns for a specific table.
    async fn fetch_columns(&self, table_name: &str) -> Result<Vec<Column>> {
        let (schema, name) = split_qualified(table_name);
        let rows: Vec<(String, String, String, Option<String>)> = sqlx::query_as(
            r#"
            SELECT
                column_name::text,
                data_type::text,
                is_nullable::text,
                column_default::text
            FROM information_schema.columns
            WHERE table_schema = COALESCE($1, current_schema()) AND table_name = $2
            ORDER BY ordinal_position
            "#,
        )
        .bind(schema)
        .bind(name)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            GateError::schema(format!("Failed to fetch columns for {table_name}: {e}"))
        })?;

        Ok(rows
            .into_iter()
            .map(|(name, data_type, is_nullable, default)| Column {
                name,
                data_type,
                is_nullable: is_nullable == "YES",
                default,
            })
            .collect())
    }

    /// Fetches primary key columns for a specific table.
    async fn fetch_primary_key(&self, table_name: &str) -> Result<Vec<String>> {
        let (schema, name) = split_qualified(table_name);
        let columns: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT kcu.column_name::text
            FROM information_schema.table_constraints tc
            JOIN information_schema.key_column_usage kcu
                ON tc.constraint_name = kcu.constraint_name
                AND tc.table_schema = kcu.table_schema
            WHERE tc.table_schema = COALESCE($1, current_schema())
                AND tc.table_name = $2
                AND tc.constraint_type = 'PRIMARY KEY'
            ORDER BY kcu.ordinal_position
            "#,
        )
        .bind(schema)
        .bind(name)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            GateError::schema(format!("Failed to fetch primary key for {table_name}: {e}"))
        })?;

        Ok(columns)
    }

    /// Fetches foreign keys declared on a specific table.
    async fn fetch_foreign_keys(&self, table_name: &str) -> Result<Vec<ForeignKey>> {
        let (schema, name) = split_qualified(table_name);
        let rows: Vec<(String, String, String, String)> = sqlx::query_as(
            r#"
            SELECT
                tc.constraint_name::text,
                kcu.column_name::text AS from_column,
                ccu.table_name::text AS to_table,
                ccu.column_name::text AS to_column
            FROM information_schema.table_constraints tc
            JOIN information_schema.key_column_usage kcu
                ON tc.constraint_name = kcu.constraint_name
                AND tc.table_schema = kcu.table_schema
            JOIN information_schema.constraint_column_usage ccu
                ON tc.constraint_name = ccu.constraint_name
                AND tc.table_schema = ccu.table_schema
            WHERE tc.table_schema = COALESCE($1, current_schema())
                AND tc.table_name = $2
                AND tc.constraint_type = 'FOREIGN KEY'
            ORDER BY tc.constraint_name, kcu.ordinal_position
            "#,
        )
        .bind(schema)
        .bind(name)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            GateError::schema(format!("Failed to fetch foreign keys for {table_name}: {e}"))
        })?;

        let mut order: Vec<String> = Vec::new();
        let mut fk_map: HashMap<String, ForeignKey> = HashMap::new();

        for (constraint, from_column, to_table, to_column) in rows {
            let entry = fk_map.entry(constraint.clone()).or_insert_with(|| {
                order.push(constraint);
                ForeignKey {
                    from_table: table_name.to_string(),
                    from_columns: Vec::new(),
                    to_table,
                    to_columns: Vec::new(),
                }
            });
            entry.from_columns.push(from_column);
            entry.to_columns.push(to_column);
        }

        Ok(order
            .into_iter()
            .filter_map(|name| fk_map.remove(&name))
            .collect())
    }
}

#[async_trait]
impl DatabaseClient for PostgresClient {
    fn backend(&self) -> DatabaseBackend {
        DatabaseBackend::Postgres
    }

    async fn introspect_schema(&self, tables: &[String]) -> Result<Schema> {
        // Names are matched exactly, as quoted PostgreSQL identifiers are
        let existing = self.existing_tables(tables).await?;
        let missing: Vec<&String> = tables.iter().filter(|t| !existing.contains(t)).collect();
        if !missing.is_empty() {
            return Err(missing_tables_error(&missing));
        }

        // Foreign keys report unqualified target names
        let allowed_targets: Vec<&str> = tables.iter().map(|t| split_qualified(t).1).collect();

        let mut schema = Schema::new();
        for table_name in tables {
            schema.tables.push(Table {
                name: table_name.clone(),
                columns: self.fetch_columns(table_name).await?,
                primary_key: self.fetch_primary_key(table_name).await?,
                sample: None,
            });
            for fk in self.fetch_foreign_keys(table_name).await? {
                if allowed_targets.contains(&fk.to_table.as_str()) {
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

/// Splits `schema.table` into its parts; unqualified names use the
/// connection's current schema.
fn split_qualified(name: &str) -> (Option<&str>, &str) {
    match name.split_once('.') {
        Some((schema, table)) => (Some(schema), table),
        None => (None, name),
    }
}

/// Converts a sqlx PgRow to our Row type.
fn convert_row(row: &PgRow) -> Row {
    row.columns()
        .iter()
        .enumerate()
        .map(|(i, col)| convert_value(row, i, col.type_info().name()))
        .collect()
}

/// Converts a single column value from a PgRow to our Value type.
fn convert_value(row: &PgRow, index: usize, type_name: &str) -> Value {
    match type_name.to_uppercase().as_str() {
        "BOOL" | "BOOLEAN" => row
            .try_get::<Option<bool>, _>(index)
            .ok()
            .flatten()
            .map(Value::Bool)
            .unwrap_or(Value::Null),

        "INT2" | "SMALLINT" => row
            .try_get::<Option<i16>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::Int(v as i64))
            .unwrap_or(Value::Null),

        "INT4" | "INT" | "INTEGER" => row
            .try_get::<Option<i32>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::Int(v as i64))
            .unwrap_or(Value::Null),

        "INT8" | "BIGINT" => row
            .try_get::<Option<i64>, _>(index)
            .ok()
            .flatten()
            .map(Value::Int)
            .unwrap_or(Value::Null),

        "FLOAT4" | "REAL" => row
            .try_get::<Option<f32>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::Float(v as f64))
            .unwrap_or(Value::Null),

        "FLOAT8" | "DOUBLE PRECISION" => row
            .try_get::<Option<f64>, _>(index)
            .ok()
            .flatten()
            .map(Value::Float)
            .unwrap_or(Value::Null),

        "BYTEA" => row
            .try_get::<Option<Vec<u8>>, _>(index)
            .ok()
            .flatten()
            .map(Value::Bytes)
            .unwrap_or(Value::Null),

        // For all other types, try to get as string
        _ => row
            .try_get::<Option<String>, _>(index)
            .ok()
            .flatten()
            .map(Value::String)
            .unwrap_or(Value::Null),
    }
}

/// Determines if an error is transient and worth retrying.
fn is_transient_error(error: &sqlx::Error) -> bool {
    let error_str = error.to_string().to_lowercase();

    // Authentication and database-not-found errors are never transient
    if error_str.contains("authentication failed")
        || error_str.contains("does not exist")
        || error_str.contains("ssl")
        || error_str.contains("tls")
    {
        return false;
    }

    error_str.contains("connection refused")
        || error_str.contains("timed out")
        || error_str.contains("timeout")
        || error_str.contains("temporarily unavailable")
        || error_str.contains("connection reset")
        || error_str.contains("broken pipe")
}

/// Maps sqlx connection errors to user-friendly messages.
fn map_connection_error(error: sqlx::Error, config: &DatabaseConfig) -> GateError {
    let target = config.display_string();
    let error_str = error.to_string().to_lowercase();

    if error_str.contains("connection refused") || error_str.contains("could not connect") {
        GateError::connection(format!(
            "Cannot connect to {target}. Check that the server is running."
        ))
    } else if error_str.contains("authentication failed") {
        GateError::connection(format!(
            "Authentication failed for {target}. Check your credentials."
        ))
    } else if error_str.contains("does not exist") && error_str.contains("database") {
        GateError::connection(format!("Database in {target} does not exist."))
    } else if error_str.contains("ssl") || error_str.contains("tls") {
        GateError::connection(
            "Server requires SSL. Add '?sslmode=require' to connection string.".to_string(),
        )
    } else if error_str.contains("timed out") || error_str.contains("timeout") {
        GateError::connection(format!(
            "Connection to {target} timed out. The server may be overloaded or unreachable."
        ))
    } else {
        GateError::connection(error.to_string())
    }
}

/// Formats a query error with the server's detail and hint if available.
fn format_query_error(error: sqlx::Error) -> String {
    let Some(db_error) = error.as_database_error() else {
        return error.to_string();
    };

    let mut result = db_error.message().to_string();

    if let Some(pg_error) = db_error.try_downcast_ref::<sqlx::postgres::PgDatabaseError>() {
        if let Some(detail) = pg_error.detail() {
            result.push_str("\n  DETAIL: ");
            result.push_str(detail);
        }

        if let Some(hint) = pg_error.hint() {
            result.push_str("\n  HINT: ");
            result.push_str(hint);
        }
    }

    result
}
