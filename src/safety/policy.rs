//! Accept/reject rules applied to a classified statement.

use super::{AllowedStatement, ClassificationResult, DenialReason, PolicyVerdict};

/// Applies the gating rules in order; the first match wins.
///
/// Write detection runs before the multiplicity check, so
/// `SELECT 1; DROP TABLE t` is reported as a write.
pub fn enforce(classification: &ClassificationResult, normalized: &str) -> PolicyVerdict {
    if classification.contains_write_keyword {
        return PolicyVerdict::Denied(DenialReason::WriteOperationForbidden);
    }
    if !classification.is_single_statement {
        return PolicyVerdict::Denied(DenialReason::MultipleStatementsForbidden);
    }
    if !classification.leading_verb_is_select {
        return PolicyVerdict::Denied(DenialReason::NonSelectForbidden);
    }
    PolicyVerdict::Allowed(AllowedStatement::new(normalized))
}
