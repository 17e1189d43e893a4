//! Agent-facing tool definition for function calling.
//!
//! Exposes the gateway as a single `execute_sql` tool. Results are returned
//! as a JSON object, failures as a plain `ERROR: ...` string the agent can
//! read and recover from.

use serde::{Deserialize, Serialize};

use super::{ExecutionError, ExecutionOutcome, SqlGateway};
use crate::db::{DatabaseBackend, QueryResult};

/// Name of the only tool the gateway exposes.
pub const EXECUTE_SQL_TOOL: &str = "execute_sql";

/// Tool definition for LLM function calling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Input parameters for the execute_sql tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteSqlInput {
    pub sql: String,
}

/// What the agent sees after a tool call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ToolOutput {
    Rows(QueryResult),
    Error(String),
}

impl ToolOutput {
    /// Wraps a message in the agent-facing error form.
    pub fn error(message: impl std::fmt::Display) -> Self {
        Self::Error(format!("ERROR: {message}"))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    /// Renders the output as a JSON document.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Rows(result) => serde_json::to_value(result)
                .unwrap_or_else(|e| serde_json::Value::String(format!("ERROR: {e}"))),
            Self::Error(message) => serde_json::Value::String(message.clone()),
        }
    }
}

impl From<ExecutionOutcome> for ToolOutput {
    fn from(outcome: ExecutionOutcome) -> Self {
        match outcome {
            Ok(result) => Self::Rows(result),
            Err(e) => Self::from(e),
        }
    }
}

impl From<ExecutionError> for ToolOutput {
    fn from(error: ExecutionError) -> Self {
        Self::error(error)
    }
}

/// Returns the tool definitions available to the agent.
pub fn get_tool_definitions() -> Vec<ToolDefinition> {
    vec![ToolDefinition {
        name: EXECUTE_SQL_TOOL.to_string(),
        description: "Execute exactly one SELECT statement; DML/DDL is forbidden.".to_string(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "sql": {
                    "type": "string",
                    "description": "A single read-only SELECT statement, bounded with LIMIT when returning many rows."
                }
            },
            "required": ["sql"]
        }),
    }]
}

/// Dispatches a tool call by name with raw JSON arguments.
///
/// Unknown tools and malformed arguments come back as error output rather
/// than failing the caller.
pub async fn invoke(gateway: &SqlGateway, name: &str, arguments: &serde_json::Value) -> ToolOutput {
    if name != EXECUTE_SQL_TOOL {
        return ToolOutput::error(format!("unknown tool '{name}'"));
    }

    match serde_json::from_value::<ExecuteSqlInput>(arguments.clone()) {
        Ok(input) => gateway.execute(input.sql).await.into(),
        Err(e) => ToolOutput::error(format!("invalid arguments: {e}")),
    }
}

/// Builds the system prompt grounding the agent in the allowlisted schema.
pub fn system_prompt(backend: DatabaseBackend, schema_description: &str) -> String {
    format!(
        "You are a careful analytics engineer for {backend}. Use only these tables.\n\n{schema_description}"
    )
}
