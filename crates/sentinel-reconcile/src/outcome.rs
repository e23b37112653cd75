//! Per-kind deployment outcomes.

use serde::{Deserialize, Serialize};

use crate::classify::ResourceKind;
use crate::patterns::ExpectedFailure;
use crate::policy::SkipReason;

/// An entry left alone, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedEntry {
    pub name: String,
    pub reason: SkipReason,
}

/// A write rejected for a reason the workspace explains.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectedSkip {
    pub name: String,
    pub cause: ExpectedFailure,
    pub message: String,
}

/// A write that failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedEntry {
    pub name: String,
    pub error: String,
}

/// What one orchestrator run did for its resource kind.
///
/// In a dry run `installed` and `updated` list what would have been
/// written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentOutcome {
    pub kind: ResourceKind,
    pub installed: Vec<String>,
    pub updated: Vec<String>,
    pub skipped: Vec<SkippedEntry>,
    /// Deprecated rules and workbooks, preview and deprecated solutions.
    pub deprecated: Vec<String>,
    pub expected_failures: Vec<ExpectedSkip>,
    pub failed: Vec<FailedEntry>,
    /// Requested solution names the catalog does not offer.
    pub not_found: Vec<String>,
    /// Set when the kind's catalog could not be read.
    pub aborted: Option<String>,
    pub dry_run: bool,
}

impl DeploymentOutcome {
    pub fn new(kind: ResourceKind) -> Self {
        Self {
            kind,
            installed: Vec::new(),
            updated: Vec::new(),
            skipped: Vec::new(),
            deprecated: Vec::new(),
            expected_failures: Vec::new(),
            failed: Vec::new(),
            not_found: Vec::new(),
            aborted: None,
            dry_run: false,
        }
    }

    /// Outcome of a pass that never got past reading the catalog.
    pub fn aborted(kind: ResourceKind, reason: impl Into<String>) -> Self {
        Self {
            aborted: Some(reason.into()),
            ..Self::new(kind)
        }
    }

    pub fn record_installed(&mut self, name: &str) {
        self.installed.push(name.to_string());
    }

    pub fn record_updated(&mut self, name: &str) {
        self.updated.push(name.to_string());
    }

    /// Deprecated and special skips are counted apart from ordinary skips.
    pub fn record_skip(&mut self, name: &str, reason: SkipReason) {
        match reason {
            SkipReason::Deprecated | SkipReason::Special => {
                self.deprecated.push(name.to_string())
            }
            _ => self.skipped.push(SkippedEntry {
                name: name.to_string(),
                reason,
            }),
        }
    }

    pub fn record_expected(&mut self, name: &str, cause: ExpectedFailure, message: &str) {
        self.expected_failures.push(ExpectedSkip {
            name: name.to_string(),
            cause,
            message: message.to_string(),
        });
    }

    pub fn record_failure(&mut self, name: &str, error: impl std::fmt::Display) {
        self.failed.push(FailedEntry {
            name: name.to_string(),
            error: error.to_string(),
        });
    }

    /// Failed entries plus one for an aborted pass.
    pub fn failure_count(&self) -> usize {
        self.failed.len() + usize::from(self.aborted.is_some())
    }

    pub fn has_failures(&self) -> bool {
        self.failure_count() > 0
    }

    /// Display names installed or updated in this pass.
    pub fn changed(&self) -> impl Iterator<Item = &str> {
        self.installed
            .iter()
            .chain(self.updated.iter())
            .map(String::as_str)
    }

    pub fn write_count(&self) -> usize {
        self.installed.len() + self.updated.len()
    }

    /// Sort every list by name so reports are stable across runs.
    pub(crate) fn sort(&mut self) {
        self.installed.sort();
        self.updated.sort();
        self.skipped.sort_by(|a, b| a.name.cmp(&b.name));
        self.deprecated.sort();
        self.expected_failures.sort_by(|a, b| a.name.cmp(&b.name));
        self.failed.sort_by(|a, b| a.name.cmp(&b.name));
        self.not_found.sort();
    }
}
