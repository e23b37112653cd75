//! Text patterns that steer reconciliation.
//!
//! Two kinds of string matching drive decisions in this crate:
//! - display-name markers (`[Deprecated]`, `[Preview]`) read by the classifier
//! - remote rejection messages that mean "this content cannot run in this
//!   workspace" (missing tables or columns, invalid expressions), which the
//!   orchestrators record as expected skips rather than failures
//!
//! Both live here so the lists can grow without touching orchestration code.

use std::sync::OnceLock;

use regex::Regex;
use sentinel_catalog::CatalogError;
use serde::{Deserialize, Serialize};

fn deprecated_marker() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(?:[\[(]\s*deprecated\s*[\])]|^\s*deprecated\b)")
            .expect("deprecated marker pattern is valid")
    })
}

fn preview_marker() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)[\[(]\s*preview\s*[\])]").expect("preview marker pattern is valid")
    })
}

/// `[Deprecated]`, `(Deprecated)` or a leading `Deprecated` word.
pub fn is_deprecated(display_name: &str) -> bool {
    deprecated_marker().is_match(display_name)
}

/// `[Preview]` or `(Preview)`.
pub fn is_preview(display_name: &str) -> bool {
    preview_marker().is_match(display_name)
}

/// Why a rejected write is considered expected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpectedFailure {
    /// The query references a table the workspace does not have.
    MissingTable,
    /// The query references a column the workspace does not have.
    MissingColumn,
    /// The query engine rejected an expression.
    InvalidExpression,
}

impl std::fmt::Display for ExpectedFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ExpectedFailure::MissingTable => "missing table",
            ExpectedFailure::MissingColumn => "missing column",
            ExpectedFailure::InvalidExpression => "invalid expression",
        };
        f.write_str(s)
    }
}

/// How an orchestrator should account for a failed write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureDisposition {
    Expected(ExpectedFailure),
    Unexpected,
}

/// Ordered list of rejection-message patterns.
#[derive(Debug, Clone)]
pub struct ErrorPatterns {
    patterns: Vec<(ExpectedFailure, Regex)>,
}

impl ErrorPatterns {
    /// Patterns for the query-engine rejections seen on rule and workbook
    /// writes.
    pub fn builtin() -> &'static ErrorPatterns {
        static PATTERNS: OnceLock<ErrorPatterns> = OnceLock::new();
        PATTERNS.get_or_init(|| {
            let raw = [
                (
                    ExpectedFailure::MissingTable,
                    r"(?i)one of the tables does not exist|failed to resolve table|table\b.*\b(does not exist|could not be found|was not found)",
                ),
                (
                    ExpectedFailure::MissingColumn,
                    r"(?i)failed to resolve (column|scalar expression)|column\b.*\b(does not exist|could not be found|was not found|is missing)",
                ),
                (ExpectedFailure::InvalidExpression, r"(?i)invalid expression"),
            ];
            ErrorPatterns {
                patterns: raw
                    .into_iter()
                    .map(|(kind, pat)| {
                        (kind, Regex::new(pat).expect("builtin error pattern is valid"))
                    })
                    .collect(),
            }
        })
    }

    /// Extend the list with another pattern. Later patterns are tried last.
    pub fn with_pattern(mut self, kind: ExpectedFailure, pattern: &str) -> Result<Self, regex::Error> {
        self.patterns.push((kind, Regex::new(pattern)?));
        Ok(self)
    }

    /// Match a bare message against the list.
    pub fn match_message(&self, message: &str) -> Option<ExpectedFailure> {
        self.patterns
            .iter()
            .find(|(_, re)| re.is_match(message))
            .map(|(kind, _)| *kind)
    }

    /// Only application errors can be expected; transport problems and
    /// missing resources are always reported.
    pub fn classify(&self, error: &CatalogError) -> FailureDisposition {
        error
            .application_message()
            .and_then(|msg| self.match_message(msg))
            .map(FailureDisposition::Expected)
            .unwrap_or(FailureDisposition::Unexpected)
    }
}

impl Default for ErrorPatterns {
    fn default() -> Self {
        Self::builtin().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deprecated_markers() {
        assert!(is_deprecated("[Deprecated] - Known IRIDIUM IP"));
        assert!(is_deprecated("Office 365 (deprecated)"));
        assert!(is_deprecated("Deprecated - Cisco ASA"));
        assert!(!is_deprecated("Detect undeprecated usage"));
        assert!(!is_deprecated("Azure Activity"));
    }

    #[test]
    fn test_preview_markers() {
        assert!(is_preview("Threat Intelligence [Preview]"));
        assert!(is_preview("(Preview) Insider risk"));
        assert!(!is_preview("Previewer sign-ins"));
    }

    #[test]
    fn test_expected_failures_from_application_errors() {
        let patterns = ErrorPatterns::builtin();

        let table = CatalogError::application(
            400,
            "BadRequest",
            "Failed to run the analytics rule query. One of the tables does not exist.",
        );
        assert_eq!(
            patterns.classify(&table),
            FailureDisposition::Expected(ExpectedFailure::MissingTable)
        );

        let column = CatalogError::application(
            400,
            "BadRequest",
            "Semantic error: 'where' operator: Failed to resolve column or scalar expression named 'ActionType'",
        );
        assert_eq!(
            patterns.classify(&column),
            FailureDisposition::Expected(ExpectedFailure::MissingColumn)
        );

        let expr = CatalogError::application(400, "BadRequest", "Invalid expression in entity mapping");
        assert_eq!(
            patterns.classify(&expr),
            FailureDisposition::Expected(ExpectedFailure::InvalidExpression)
        );
    }

    #[test]
    fn test_transport_and_unknown_errors_are_unexpected() {
        let patterns = ErrorPatterns::builtin();
        assert_eq!(
            patterns.classify(&CatalogError::Transport("table does not exist".to_string())),
            FailureDisposition::Unexpected
        );
        assert_eq!(
            patterns.classify(&CatalogError::application(409, "Conflict", "Resource busy")),
            FailureDisposition::Unexpected
        );
    }

    #[test]
    fn test_pattern_list_is_extensible() {
        let patterns = ErrorPatterns::default()
            .with_pattern(ExpectedFailure::MissingTable, r"(?i)workspace is not onboarded")
            .unwrap();
        assert_eq!(
            patterns.match_message("Workspace is not onboarded to UEBA"),
            Some(ExpectedFailure::MissingTable)
        );
        assert!(ErrorPatterns::default()
            .with_pattern(ExpectedFailure::MissingTable, "(")
            .is_err());
    }
}
