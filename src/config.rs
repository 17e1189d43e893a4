//! Configuration management for db-gate.
//!
//! Handles loading configuration from TOML files and environment variables.
//! The `[database]` section describes the connection target and pool, the
//! `[gateway]` section the table allowlist and gating rules.

use crate::db::DatabaseBackend;
use crate::error::{GateError, Result};
use crate::safety::{DEFAULT_AGGREGATE_PATTERNS, DEFAULT_ROW_LIMIT, DEFAULT_WRITE_KEYWORDS};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

/// Main configuration structure for db-gate.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Database connection settings.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Gateway policy settings.
    #[serde(default)]
    pub gateway: GatewayConfig,
}

/// Database connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Connection URL, e.g. `sqlite:shop.db` or `postgres://user@host/db`.
    pub url: Option<String>,

    /// Upper bound on pooled connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Seconds to wait for a free pooled connection.
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_secs: u64,

    /// Seconds a single statement may run before it fails.
    #[serde(default = "default_query_timeout")]
    pub query_timeout_secs: u64,
}

fn default_max_connections() -> u32 {
    5
}

fn default_acquire_timeout() -> u64 {
    10
}

fn default_query_timeout() -> u64 {
    30
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: default_max_connections(),
            acquire_timeout_secs: default_acquire_timeout(),
            query_timeout_secs: default_query_timeout(),
        }
    }
}

impl DatabaseConfig {
    /// Creates a config for the given URL with default pool settings.
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::default()
        }
    }

    /// Returns the configured URL or a config error if none is set.
    pub fn url(&self) -> Result<&str> {
        self.url.as_deref().ok_or_else(|| {
            GateError::config("No database URL configured. Pass one or set DATABASE_URL.")
        })
    }

    /// Determines the backend from the URL scheme.
    pub fn backend(&self) -> Result<DatabaseBackend> {
        let url = self.url()?;
        DatabaseBackend::from_url(url).ok_or_else(|| {
            GateError::config(format!(
                "Unsupported database URL '{}'. Expected sqlite: or postgres://",
                redact(url)
            ))
        })
    }

    /// Uses `DATABASE_URL` when no URL was configured.
    pub fn apply_env_defaults(&mut self) {
        if self.url.is_none() {
            self.url = std::env::var("DATABASE_URL").ok();
        }
    }

    /// Returns a display-safe string (no password) for logs.
    pub fn display_string(&self) -> String {
        self.url
            .as_deref()
            .map(redact)
            .unwrap_or_else(|| "<unset>".to_string())
    }
}

/// Strips any password from a connection URL.
fn redact(url: &str) -> String {
    match Url::parse(url) {
        Ok(mut parsed) if parsed.password().is_some() => {
            let _ = parsed.set_password(Some("***"));
            parsed.to_string()
        }
        _ => url.to_string(),
    }
}

/// Gateway policy configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Tables the agent is told about, in description order.
    #[serde(default = "default_tables")]
    pub tables: Vec<String>,

    /// Bound appended to SELECTs without LIMIT or aggregate.
    #[serde(default = "default_row_limit")]
    pub default_row_limit: u32,

    /// Example rows included per table in the schema description.
    #[serde(default = "default_sample_rows")]
    pub sample_rows: u32,

    /// Keywords (regex fragments) that mark a statement as a write.
    #[serde(default = "default_write_keywords")]
    pub write_keywords: Vec<String>,

    /// Regexes that mark a statement as an aggregate query.
    #[serde(default = "default_aggregate_patterns")]
    pub aggregate_patterns: Vec<String>,
}

/// The analytics tables of the sample shop database.
pub const DEFAULT_TABLES: &[&str] = &[
    "customers",
    "orders",
    "order_items",
    "products",
    "refunds",
    "payments",
];

fn default_tables() -> Vec<String> {
    DEFAULT_TABLES.iter().map(|s| s.to_string()).collect()
}

fn default_row_limit() -> u32 {
    DEFAULT_ROW_LIMIT
}

fn default_sample_rows() -> u32 {
    3
}

fn default_write_keywords() -> Vec<String> {
    DEFAULT_WRITE_KEYWORDS.iter().map(|s| s.to_string()).collect()
}

fn default_aggregate_patterns() -> Vec<String> {
    DEFAULT_AGGREGATE_PATTERNS
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            tables: default_tables(),
            default_row_limit: default_row_limit(),
            sample_rows: default_sample_rows(),
            write_keywords: default_write_keywords(),
            aggregate_patterns: default_aggregate_patterns(),
        }
    }
}

impl GatewayConfig {
    /// Creates a gateway config for the given allowlist with default rules.
    pub fn with_tables<I, S>(tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tables: tables.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Checks the settings that cannot be expressed in the type.
    ///
    /// Pattern syntax is checked when the classifier is built.
    pub fn validate(&self) -> Result<()> {
        if self.tables.is_empty() {
            return Err(GateError::config(
                "gateway.tables must list at least one table",
            ));
        }
        if let Some(bad) = self.tables.iter().find(|t| !is_plain_identifier(t)) {
            return Err(GateError::config(format!(
                "Invalid table name '{bad}' in gateway.tables"
            )));
        }
        if self.default_row_limit == 0 {
            return Err(GateError::config(
                "gateway.default_row_limit must be greater than zero",
            ));
        }
        Ok(())
    }
}

/// Table names are interpolated into introspection queries, so only plain
/// identifiers (optionally schema-qualified) are accepted.
fn is_plain_identifier(name: &str) -> bool {
    !name.is_empty()
        && name.split('.').all(|part| {
            let mut chars = part.chars();
            matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        })
}

impl Config {
    /// Returns the default config file path for the current platform.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("db-gate")
            .join("config.toml")
    }

    /// Loads configuration from a TOML file.
    ///
    /// A missing file yields the default configuration.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| GateError::config(format!("Failed to read config file: {e}")))?;

        Self::parse_toml(&content, path)
    }

    /// Parses configuration from a TOML string.
    fn parse_toml(content: &str, path: &Path) -> Result<Self> {
        toml::from_str(content).map_err(|e| {
            GateError::config(format!(
                "Configuration error in {}:\n  {}",
                path.display(),
                e
            ))
        })
    }
}
