//! Per-kind reconciliation orchestrators.
//!
//! Each orchestrator reads its kind's catalog and installed snapshot once,
//! classifies, applies policy and executes the resulting plan through the
//! [`CatalogClient`](sentinel_catalog::CatalogClient). Per-entry failures
//! are recorded in the [`DeploymentOutcome`] and never stop the pass; only
//! an unreadable catalog does.

mod rules;
mod scope;
mod solutions;
mod workbooks;

pub use rules::RulesOrchestrator;
pub use scope::{dependent_names, PackageScope};
pub use solutions::{SolutionAssessment, SolutionsOrchestrator};
pub use workbooks::WorkbooksOrchestrator;

use std::cmp::Ordering;
use std::collections::HashMap;

use sentinel_catalog::CatalogError;
use tracing::warn;

use crate::classify::{Classifiable, ResourceKind, ResourceStatus};
use crate::error::ReconcileError;
use crate::metrics::METRICS;
use crate::obs;
use crate::outcome::DeploymentOutcome;
use crate::patterns::{ErrorPatterns, FailureDisposition};
use crate::policy::{Action, PlannedAction, SkipReason};
use crate::version::compare_versions;

/// Map a catalog read failure onto an aborted pass of `kind`.
pub(crate) fn unavailable(kind: ResourceKind) -> impl FnOnce(CatalogError) -> ReconcileError {
    move |source| ReconcileError::CatalogUnavailable { kind, source }
}

/// Collapse entries sharing a matching key to the one with the highest
/// version, keeping first-seen order.
pub(crate) fn keep_latest<E: Classifiable>(entries: Vec<E>) -> Vec<E> {
    let mut kept: Vec<E> = Vec::with_capacity(entries.len());
    let mut index: HashMap<String, usize> = HashMap::new();

    for entry in entries {
        let key = entry.matching_key().to_lowercase();
        match index.get(&key) {
            Some(&i) => {
                let newer = compare_versions(
                    entry.available_version().unwrap_or("0"),
                    kept[i].available_version().unwrap_or("0"),
                ) == Ordering::Greater;
                if newer {
                    kept[i] = entry;
                }
            }
            None => {
                index.insert(key, kept.len());
                kept.push(entry);
            }
        }
    }
    kept
}

/// Log the plan and warn about downgrades.
pub(crate) fn log_plan<E>(planned: &[PlannedAction<E>]) {
    for p in planned {
        obs::emit_action_planned(p.status.kind, &p.status.display_name, p.status.status, &p.action);
        if let Some(delta) = p.status.delta.as_ref().filter(|d| d.is_downgrade()) {
            warn!(
                kind = %p.status.kind,
                name = %p.status.display_name,
                delta = %delta,
                "installed version is newer than the catalog version"
            );
        }
    }
}

pub(crate) fn record_skip(outcome: &mut DeploymentOutcome, status: &ResourceStatus, reason: SkipReason) {
    if reason == SkipReason::NameMatch {
        warn!(
            kind = %status.kind,
            name = %status.display_name,
            "installed resource shares the display name but is not linked; resolve manually"
        );
    }
    outcome.record_skip(&status.display_name, reason);
    METRICS.inc_skips();
}

/// Count a completed install or update.
pub(crate) fn record_applied(outcome: &mut DeploymentOutcome, kind: ResourceKind, name: &str, action: Action) {
    match action {
        Action::Install => {
            outcome.record_installed(name);
            if !outcome.dry_run {
                METRICS.inc_installs();
            }
        }
        Action::Update => {
            outcome.record_updated(name);
            if !outcome.dry_run {
                METRICS.inc_updates();
            }
        }
        Action::Skip(_) => return,
    }
    obs::emit_action_applied(kind, name, &action, outcome.dry_run);
}

/// Record a rejected write as expected or failed.
pub(crate) fn record_write_error(
    outcome: &mut DeploymentOutcome,
    patterns: &ErrorPatterns,
    kind: ResourceKind,
    name: &str,
    error: &CatalogError,
) {
    match patterns.classify(error) {
        FailureDisposition::Expected(cause) => {
            obs::emit_expected_skip(kind, name, &cause);
            outcome.record_expected(name, cause, &error.to_string());
            METRICS.inc_skips();
        }
        FailureDisposition::Unexpected => {
            obs::emit_action_failed(kind, name, error);
            outcome.record_failure(name, error);
            METRICS.inc_failures();
        }
    }
}
