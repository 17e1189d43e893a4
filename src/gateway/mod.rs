//! The safe SQL execution gateway.
//!
//! `SqlGateway` is the only surface an agent talks to: it gates a candidate
//! statement, executes what survives on a pooled connection, and hands back
//! either rows or an `ExecutionError` value. Nothing raised while talking to
//! the database escapes as a panic or a raw driver error.

pub mod tool;

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::config::{Config, GatewayConfig};
use crate::db::{self, quote_table_name, DatabaseBackend, DatabaseClient, QueryResult};
use crate::error::Result;
use crate::safety::{DenialReason, PolicyVerdict, StatementGate};

/// Raw text submitted for execution, plus an opaque caller tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateStatement {
    pub text: String,
    /// Only logged, never interpreted.
    pub origin: Option<String>,
}

impl CandidateStatement {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            origin: None,
        }
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }
}

impl From<&str> for CandidateStatement {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl From<String> for CandidateStatement {
    fn from(text: String) -> Self {
        Self::new(text)
    }
}

/// Error categories reported back to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    WriteOperationForbidden,
    MultipleStatementsForbidden,
    NonSelectForbidden,
    ExecutionFailure,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WriteOperationForbidden => "WriteOperationForbidden",
            Self::MultipleStatementsForbidden => "MultipleStatementsForbidden",
            Self::NonSelectForbidden => "NonSelectForbidden",
            Self::ExecutionFailure => "ExecutionFailure",
        }
    }
}

/// A recoverable failure returned from `SqlGateway::execute`.
///
/// Denials never reached the database; failures carry the driver's text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("{0}")]
    Denied(#[from] DenialReason),

    #[error("{message}")]
    Failure { message: String },
}

impl ExecutionError {
    /// Creates an execution failure with the given message.
    pub fn failure(message: impl Into<String>) -> Self {
        Self::Failure {
            message: message.into(),
        }
    }

    /// Returns the error category.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Denied(DenialReason::WriteOperationForbidden) => {
                ErrorKind::WriteOperationForbidden
            }
            Self::Denied(DenialReason::MultipleStatementsForbidden) => {
                ErrorKind::MultipleStatementsForbidden
            }
            Self::Denied(DenialReason::NonSelectForbidden) => ErrorKind::NonSelectForbidden,
            Self::Failure { .. } => ErrorKind::ExecutionFailure,
        }
    }

    /// Returns true for policy denials.
    pub fn is_denial(&self) -> bool {
        matches!(self, Self::Denied(_))
    }
}

/// What `SqlGateway::execute` hands back.
pub type ExecutionOutcome = std::result::Result<QueryResult, ExecutionError>;

/// Gates and executes agent-generated SQL against one database.
pub struct SqlGateway {
    client: Arc<dyn DatabaseClient>,
    gate: StatementGate,
    tables: Vec<String>,
    sample_rows: u32,
    schema_description: OnceCell<String>,
}

impl SqlGateway {
    /// Creates a gateway over an already connected client.
    ///
    /// Validates the gateway settings and compiles the classifier patterns.
    pub fn new(client: Arc<dyn DatabaseClient>, config: &GatewayConfig) -> Result<Self> {
        config.validate()?;
        let gate = StatementGate::from_config(config)?;
        Ok(Self::with_gate(client, gate, config))
    }

    /// Connects to the configured database and builds a gateway over it.
    ///
    /// Gateway settings and patterns are checked before any connection is
    /// opened.
    pub async fn connect(config: &Config) -> Result<Self> {
        config.gateway.validate()?;
        let gate = StatementGate::from_config(&config.gateway)?;

        let client: Arc<dyn DatabaseClient> = Arc::from(db::connect(&config.database).await?);
        info!(
            "Connected to {} ({})",
            config.database.display_string(),
            client.backend()
        );
        Ok(Self::with_gate(client, gate, &config.gateway))
    }

    fn with_gate(
        client: Arc<dyn DatabaseClient>,
        gate: StatementGate,
        config: &GatewayConfig,
    ) -> Self {
        Self {
            client,
            gate,
            tables: config.tables.clone(),
            sample_rows: config.sample_rows,
            schema_description: OnceCell::new(),
        }
    }

    /// The fixed table allowlist, in description order.
    pub fn allowlist(&self) -> &[String] {
        &self.tables
    }

    /// The backend behind this gateway.
    pub fn backend(&self) -> DatabaseBackend {
        self.client.backend()
    }

    /// Gates raw text without executing anything.
    pub fn evaluate(&self, text: &str) -> PolicyVerdict {
        self.gate.evaluate(text)
    }

    /// Gates and, if allowed, executes a candidate statement.
    ///
    /// A denied statement never opens a connection.
    pub async fn execute(&self, candidate: impl Into<CandidateStatement>) -> ExecutionOutcome {
        let candidate = candidate.into();
        let origin = candidate.origin.as_deref().unwrap_or("-");

        let statement = match self.gate.evaluate(&candidate.text) {
            PolicyVerdict::Denied(reason) => {
                warn!(origin, denial = reason.as_str(), "Statement denied");
                return Err(ExecutionError::Denied(reason));
            }
            PolicyVerdict::Allowed(statement) => statement,
        };

        info!(
            origin,
            bound_applied = statement.bound_applied,
            "Statement allowed"
        );
        debug!(origin, sql = %statement.sql, "Executing statement");

        let start = Instant::now();
        // The appended LIMIT is only text; the row cap also holds at fetch time
        let query = if statement.bound_applied {
            let max_rows = self.gate.row_bound().limit() as usize;
            self.client.execute_query_capped(&statement.sql, max_rows)
        } else {
            self.client.execute_query(&statement.sql)
        };
        let outcome = AssertUnwindSafe(query).catch_unwind().await;

        match outcome {
            Ok(Ok(result)) => {
                info!(
                    origin,
                    rows = result.row_count(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Statement succeeded"
                );
                Ok(result)
            }
            Ok(Err(e)) => {
                warn!(origin, error = %e, "Statement failed");
                Err(ExecutionError::failure(e.message()))
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                warn!(origin, error = %message, "Database client panicked");
                Err(ExecutionError::failure(format!(
                    "database client fault: {message}"
                )))
            }
        }
    }

    /// Renders the allowlisted tables for grounding the agent.
    ///
    /// Computed once on first use; the allowlist never changes.
    pub async fn describe_schema(&self) -> Result<String> {
        self.schema_description
            .get_or_try_init(|| self.load_schema_description())
            .await
            .cloned()
    }

    async fn load_schema_description(&self) -> Result<String> {
        let mut schema = self.client.introspect_schema(&self.tables).await?;

        if self.sample_rows > 0 {
            for table in &mut schema.tables {
                let sql = format!(
                    "SELECT * FROM {} LIMIT {}",
                    quote_table_name(&table.name),
                    self.sample_rows
                );
                match self.client.execute_query(&sql).await {
                    Ok(sample) => table.sample = Some(sample),
                    Err(e) => warn!("Could not sample rows from {}: {}", table.name, e),
                }
            }
        }

        info!("Described {} allowlisted tables", schema.tables.len());
        Ok(schema.format_for_llm())
    }

    /// Closes the underlying connection pool.
    pub async fn close(&self) -> Result<()> {
        self.client.close().await
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
