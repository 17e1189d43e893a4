//! Database abstraction layer for db-gate.
//!
//! Provides a trait-based interface for database operations, allowing
//! different database backends to be used interchangeably. Each client owns
//! its connection pool; callers never share a single connection.

mod mock;
mod postgres;
mod schema;
mod sqlite;
mod types;

pub use mock::{FailingDatabaseClient, MockDatabaseClient};
pub use postgres::PostgresClient;
pub use schema::{quote_table_name, Column, ForeignKey, Schema, Table};
pub use sqlite::SqliteClient;
pub use types::{QueryResult, Row, Value};

use crate::config::DatabaseConfig;
use crate::error::Result;
use async_trait::async_trait;
use std::fmt;

/// Supported database backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    Sqlite,
    Postgres,
}

impl DatabaseBackend {
    /// Returns the backend as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Postgres => "postgres",
        }
    }

    /// Returns the human-facing product name, used in agent prompts.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Sqlite => "SQLite",
            Self::Postgres => "PostgreSQL",
        }
    }

    /// Determines the backend from a connection URL scheme.
    pub fn from_url(url: &str) -> Option<Self> {
        let scheme = url.split(':').next()?.to_lowercase();
        match scheme.as_str() {
            "sqlite" => Some(Self::Sqlite),
            "postgres" | "postgresql" => Some(Self::Postgres),
            _ => None,
        }
    }
}

impl fmt::Display for DatabaseBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Creates a database client for the configured URL.
///
/// This is the central factory function for database connections.
pub async fn connect(config: &DatabaseConfig) -> Result<Box<dyn DatabaseClient>> {
    match config.backend()? {
        DatabaseBackend::Sqlite => {
            let client = SqliteClient::connect(config).await?;
            Ok(Box::new(client))
        }
        DatabaseBackend::Postgres => {
            let client = PostgresClient::connect(config).await?;
            Ok(Box::new(client))
        }
    }
}

/// Trait defining the interface for database clients.
///
/// All database operations are async and return Results with GateError.
/// Implementations acquire a pooled connection per call and release it on
/// every exit path.
#[async_trait]
pub trait DatabaseClient: Send + Sync {
    /// The backend this client talks to.
    fn backend(&self) -> DatabaseBackend;

    /// Describes the given tables, in the given order.
    ///
    /// Fails with a schema error naming any table that does not exist.
    async fn introspect_schema(&self, tables: &[String]) -> Result<Schema>;

    /// Executes a single SQL statement and returns its rows.
    async fn execute_query(&self, sql: &str) -> Result<QueryResult>;

    /// Executes a single SQL statement, keeping at most `max_rows` rows.
    ///
    /// The default runs the statement in full and drops the excess; the
    /// pooled clients stop reading from the cursor instead.
    async fn execute_query_capped(&self, sql: &str, max_rows: usize) -> Result<QueryResult> {
        Ok(self.execute_query(sql).await?.truncated(max_rows))
    }

    /// Closes the connection pool.
    async fn close(&self) -> Result<()>;
}

/// Builds the schema error for allowlisted tables missing from the database.
pub(crate) fn missing_tables_error(missing: &[&String]) -> crate::error::GateError {
    let names = missing
        .iter()
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    crate::error::GateError::schema(format!("Tables not found in database: {names}"))
}
