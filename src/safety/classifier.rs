//! Lexical statement classification.
//!
//! Uses case-insensitive regular expressions with word boundaries to derive
//! the facts the policy needs. Patterns are compiled once per classifier.
//!
//! Write keywords and `;` are searched in the raw text, so literals can only
//! cause over-rejection. LIMIT and aggregate indicators are searched with
//! literals and comments blanked out, so they cannot fake a bound.

use regex::{Regex, RegexBuilder};

use crate::error::{GateError, Result};

use super::ClassificationResult;

/// Keywords whose standalone presence marks a statement as a write.
pub const DEFAULT_WRITE_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "DROP", "TRUNCATE", "ALTER", "CREATE", "REPLACE",
];

/// Patterns that mark a statement as an aggregate query.
pub const DEFAULT_AGGREGATE_PATTERNS: &[&str] = &[
    r"\bcount\(",
    r"\bgroup\s+by\b",
    r"\bsum\(",
    r"\bavg\(",
    r"\bmax\(",
    r"\bmin\(",
];

const LEADING_SELECT_PATTERN: &str = r"^\s*select\b";
const LIMIT_PATTERN: &str = r"\blimit\s+\d+\b";

/// Classifies normalized statement text. Pure and deterministic.
#[derive(Debug, Clone)]
pub struct StatementClassifier {
    write_keywords: Regex,
    leading_select: Regex,
    limit_clause: Regex,
    aggregate: Option<Regex>,
}

impl Default for StatementClassifier {
    fn default() -> Self {
        let keywords: Vec<String> = DEFAULT_WRITE_KEYWORDS.iter().map(|s| s.to_string()).collect();
        let aggregates: Vec<String> = DEFAULT_AGGREGATE_PATTERNS
            .iter()
            .map(|s| s.to_string())
            .collect();
        Self::new(&keywords, &aggregates).expect("built-in patterns compile")
    }
}

impl StatementClassifier {
    /// Compiles a classifier from keyword and aggregate pattern sets.
    ///
    /// Each write keyword is a regex fragment matched as a standalone word.
    /// An empty keyword set is rejected since it would disable write
    /// detection entirely.
    pub fn new(write_keywords: &[String], aggregate_patterns: &[String]) -> Result<Self> {
        if write_keywords.iter().all(|k| k.trim().is_empty()) {
            return Err(GateError::config(
                "gateway.write_keywords must contain at least one keyword",
            ));
        }

        let alternation = write_keywords
            .iter()
            .map(|k| k.trim())
            .filter(|k| !k.is_empty())
            .collect::<Vec<_>>()
            .join("|");
        let write_keywords = compile(&format!(r"\b(?:{alternation})\b"), "write_keywords")?;

        let aggregate = if aggregate_patterns.is_empty() {
            None
        } else {
            // Validate each pattern on its own so errors name the culprit
            for pattern in aggregate_patterns {
                compile(pattern, "aggregate_patterns")?;
            }
            let joined = aggregate_patterns
                .iter()
                .map(|p| format!("(?:{p})"))
                .collect::<Vec<_>>()
                .join("|");
            Some(compile(&joined, "aggregate_patterns")?)
        };

        Ok(Self {
            write_keywords,
            leading_select: compile(LEADING_SELECT_PATTERN, "leading select")?,
            limit_clause: compile(LIMIT_PATTERN, "limit clause")?,
            aggregate,
        })
    }

    /// Computes the classification facts for normalized text.
    pub fn classify(&self, normalized: &str) -> ClassificationResult {
        let write_keyword = self
            .write_keywords
            .find(normalized)
            .map(|m| m.as_str().to_uppercase());

        let code = mask_literals_and_comments(normalized);

        ClassificationResult {
            is_single_statement: !normalized.contains(';'),
            leading_verb_is_select: self.leading_select.is_match(normalized),
            contains_write_keyword: write_keyword.is_some(),
            has_explicit_bound_or_aggregate: self.limit_clause.is_match(&code)
                || self.matches_aggregate(&code),
            write_keyword,
        }
    }

    /// Returns true if the text carries a `LIMIT <integer>` clause outside
    /// literals and comments.
    pub fn has_limit(&self, normalized: &str) -> bool {
        self.limit_clause
            .is_match(&mask_literals_and_comments(normalized))
    }

    /// Returns true if any aggregate indicator is present outside literals
    /// and comments.
    pub fn is_aggregate(&self, normalized: &str) -> bool {
        self.matches_aggregate(&mask_literals_and_comments(normalized))
    }

    fn matches_aggregate(&self, code: &str) -> bool {
        self.aggregate.as_ref().is_some_and(|re| re.is_match(code))
    }
}

/// Blanks out quoted text and comments, keeping the quotes and line breaks.
///
/// Covers `'...'`, `"..."` and backtick quoting (a doubled quote reads as a
/// close followed by a reopen), `--` line comments and `/* */` block
/// comments. Unterminated quotes and comments run to the end of the text.
fn mask_literals_and_comments(sql: &str) -> String {
    let mut masked = String::with_capacity(sql.len());
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\'' | '"' | '`' => {
                masked.push(c);
                for inner in chars.by_ref() {
                    if inner == c {
                        masked.push(c);
                        break;
                    }
                    masked.push(blank(inner));
                }
            }
            '-' if chars.peek() == Some(&'-') => {
                masked.push(' ');
                while let Some(&next) = chars.peek() {
                    if next == '\n' {
                        break;
                    }
                    masked.push(' ');
                    chars.next();
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                masked.push_str("  ");
                let mut prev = '\0';
                for inner in chars.by_ref() {
                    masked.push(blank(inner));
                    if prev == '*' && inner == '/' {
                        break;
                    }
                    prev = inner;
                }
            }
            _ => masked.push(c),
        }
    }
    masked
}

fn blank(c: char) -> char {
    if c == '\n' {
        '\n'
    } else {
        ' '
    }
}

fn compile(pattern: &str, what: &str) -> Result<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .dot_matches_new_line(true)
        .build()
        .map_err(|e| GateError::config(format!("Invalid {what} pattern '{pattern}': {e}")))
}
