//! Statement gating for agent-generated SQL.
//!
//! Normalizes, classifies and gates a candidate statement so that only a
//! single, read-only, row-bounded SELECT ever reaches the database. All of
//! this is pure text inspection; nothing here touches a connection.
//!
//! The checks are lexical, not a SQL parser. A write keyword inside a string
//! literal is rejected (over-rejection is accepted), and dialect features
//! that mutate without one of the configured keywords would slip through.
//! Database grants remain the last line of defence.

mod bound;
mod classifier;
mod normalizer;
mod policy;

pub use bound::{RowBound, DEFAULT_ROW_LIMIT};
pub use classifier::{
    StatementClassifier, DEFAULT_AGGREGATE_PATTERNS, DEFAULT_WRITE_KEYWORDS,
};
pub use normalizer::normalize;
pub use policy::enforce;

use std::fmt;

use thiserror::Error;

use crate::config::GatewayConfig;
use crate::error::Result;

/// Structural facts about a normalized statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationResult {
    /// No `;` remains inside the normalized text.
    pub is_single_statement: bool,
    /// The first token is `select` (case-insensitive).
    pub leading_verb_is_select: bool,
    /// A write keyword occurs as a standalone word.
    pub contains_write_keyword: bool,
    /// A `LIMIT <n>` clause or an aggregate indicator is present.
    pub has_explicit_bound_or_aggregate: bool,
    /// The first write keyword found, for audit logging.
    pub write_keyword: Option<String>,
}

/// Why a statement was refused before reaching the database.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DenialReason {
    #[error("write operations are not allowed.")]
    WriteOperationForbidden,
    #[error("multiple statements are not allowed.")]
    MultipleStatementsForbidden,
    #[error("only SELECT statements are allowed.")]
    NonSelectForbidden,
}

impl DenialReason {
    /// Returns the stable identifier used in logs and tool output.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WriteOperationForbidden => "WriteOperationForbidden",
            Self::MultipleStatementsForbidden => "MultipleStatementsForbidden",
            Self::NonSelectForbidden => "NonSelectForbidden",
        }
    }
}

/// A statement that passed policy, ready for execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowedStatement {
    /// The text that will be executed.
    pub sql: String,
    /// Whether the default row bound was appended.
    pub bound_applied: bool,
}

impl AllowedStatement {
    /// Wraps statement text that has not been bounded yet.
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            bound_applied: false,
        }
    }
}

/// Outcome of gating a single candidate statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyVerdict {
    Allowed(AllowedStatement),
    Denied(DenialReason),
}

impl PolicyVerdict {
    /// Returns true if the statement may be executed.
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed(_))
    }

    /// Returns the denial reason, if any.
    pub fn denial(&self) -> Option<DenialReason> {
        match self {
            Self::Denied(reason) => Some(*reason),
            Self::Allowed(_) => None,
        }
    }
}

impl fmt::Display for PolicyVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allowed(stmt) => write!(f, "Allowed({})", stmt.sql),
            Self::Denied(reason) => write!(f, "Denied({})", reason.as_str()),
        }
    }
}

/// The pure gating pipeline: normalize, classify, enforce, bound.
#[derive(Debug, Clone)]
pub struct StatementGate {
    classifier: StatementClassifier,
    row_bound: RowBound,
}

impl Default for StatementGate {
    fn default() -> Self {
        Self {
            classifier: StatementClassifier::default(),
            row_bound: RowBound::default(),
        }
    }
}

impl StatementGate {
    /// Creates a gate from explicit parts.
    pub fn new(classifier: StatementClassifier, row_bound: RowBound) -> Self {
        Self {
            classifier,
            row_bound,
        }
    }

    /// Builds a gate from the `[gateway]` configuration section.
    ///
    /// Fails if a keyword or aggregate pattern is not a valid regex.
    pub fn from_config(config: &GatewayConfig) -> Result<Self> {
        let classifier =
            StatementClassifier::new(&config.write_keywords, &config.aggregate_patterns)?;
        Ok(Self::new(classifier, RowBound::new(config.default_row_limit)))
    }

    /// Returns the classifier used by this gate.
    pub fn classifier(&self) -> &StatementClassifier {
        &self.classifier
    }

    /// Returns the row bound appended to unbounded statements.
    pub fn row_bound(&self) -> &RowBound {
        &self.row_bound
    }

    /// Runs the raw candidate text through the whole pipeline.
    pub fn evaluate(&self, raw: &str) -> PolicyVerdict {
        let normalized = normalize(raw);
        let classification = self.classifier.classify(normalized);
        match enforce(&classification, normalized) {
            PolicyVerdict::Allowed(stmt) => {
                PolicyVerdict::Allowed(self.row_bound.apply(stmt, &classification))
            }
            denied => denied,
        }
    }
}
