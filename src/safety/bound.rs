//! Default row bound for unbounded, non-aggregate SELECTs.

use super::{AllowedStatement, ClassificationResult};

/// Rows returned by a SELECT that states no LIMIT and no aggregate.
pub const DEFAULT_ROW_LIMIT: u32 = 200;

/// Appends ` LIMIT <n>` to statements that would otherwise be unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowBound {
    limit: u32,
}

impl Default for RowBound {
    fn default() -> Self {
        Self::new(DEFAULT_ROW_LIMIT)
    }
}

impl RowBound {
    /// Creates a row bound with the given limit.
    pub fn new(limit: u32) -> Self {
        Self { limit }
    }

    /// Returns the configured limit.
    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Bounds an allowed statement unless it already has a LIMIT or is an
    /// aggregate query.
    pub fn apply(
        &self,
        statement: AllowedStatement,
        classification: &ClassificationResult,
    ) -> AllowedStatement {
        if classification.has_explicit_bound_or_aggregate {
            return statement;
        }
        AllowedStatement {
            sql: format!("{} LIMIT {}", statement.sql, self.limit),
            bound_applied: true,
        }
    }
}
