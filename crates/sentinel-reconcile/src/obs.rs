//! Structured observability hooks for reconciliation passes.
//!
//! This module provides:
//! - Pass-scoped tracing spans via [`pass_span`]
//! - Emission functions for lifecycle events: pass start and finish, each
//!   executed action, expected skips, failures and stage transitions
//!
//! Events are emitted at `info!` level except failures and warnings.

use tracing::{info, warn};

use crate::classify::{ResourceKind, Status};
use crate::outcome::DeploymentOutcome;
use crate::policy::Action;

/// Span tagged with the run id and resource kind.
///
/// Attach it with `tracing::Instrument` so it follows the pass across
/// await points.
///
/// ```ignore
/// orchestrator.run(&scope).instrument(pass_span(&run_id, ResourceKind::Rule)).await;
/// ```
pub fn pass_span(run_id: &str, kind: ResourceKind) -> tracing::Span {
    tracing::info_span!("sentinel.pass", run_id = %run_id, kind = %kind)
}

/// Emit event: a coordinator run started.
pub fn emit_run_started(run_id: &str, solutions: usize, dry_run: bool) {
    info!(event = "run.started", run_id = %run_id, solutions = solutions, dry_run = dry_run);
}

/// Emit event: a coordinator run finished.
pub fn emit_run_finished(run_id: &str, duration_ms: u64, failures: usize) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        duration_ms = duration_ms,
        failures = failures,
        success = failures == 0,
    );
}

/// Emit event: a kind's pass started with this many candidate entries.
pub fn emit_pass_started(kind: ResourceKind, candidates: usize) {
    info!(event = "pass.started", kind = %kind, candidates = candidates);
}

/// Emit event: a kind's pass finished.
pub fn emit_pass_finished(outcome: &DeploymentOutcome) {
    info!(
        event = "pass.finished",
        kind = %outcome.kind,
        installed = outcome.installed.len(),
        updated = outcome.updated.len(),
        skipped = outcome.skipped.len(),
        deprecated = outcome.deprecated.len(),
        expected_failures = outcome.expected_failures.len(),
        failed = outcome.failed.len(),
        dry_run = outcome.dry_run,
    );
}

/// Emit event: a kind's pass aborted before any action ran.
pub fn emit_pass_aborted(kind: ResourceKind, error: &dyn std::fmt::Display) {
    warn!(event = "pass.aborted", kind = %kind, error = %error);
}

/// Emit event: a stage was not run.
pub fn emit_stage_skipped(kind: ResourceKind, reason: &str) {
    info!(event = "stage.skipped", kind = %kind, reason = %reason);
}

/// Emit event: an action was decided for an entry.
pub fn emit_action_planned(kind: ResourceKind, name: &str, status: Status, action: &Action) {
    tracing::debug!(
        event = "action.planned",
        kind = %kind,
        name = %name,
        status = %status,
        action = ?action,
    );
}

/// Emit event: an install or update completed.
pub fn emit_action_applied(kind: ResourceKind, name: &str, action: &Action, dry_run: bool) {
    info!(
        event = "action.applied",
        kind = %kind,
        name = %name,
        action = ?action,
        dry_run = dry_run,
    );
}

/// Emit event: a write was rejected for an expected reason.
pub fn emit_expected_skip(kind: ResourceKind, name: &str, cause: &dyn std::fmt::Display) {
    info!(event = "action.expected_skip", kind = %kind, name = %name, cause = %cause);
}

/// Emit event: a write failed.
pub fn emit_action_failed(kind: ResourceKind, name: &str, error: &dyn std::fmt::Display) {
    warn!(event = "action.failed", kind = %kind, name = %name, error = %error);
}

/// Emit event: the companion metadata write failed after a content write.
pub fn emit_metadata_failed(kind: ResourceKind, name: &str, error: &dyn std::fmt::Display) {
    warn!(event = "metadata.failed", kind = %kind, name = %name, error = %error);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pass_span_create() {
        let _entered = pass_span("run-1", ResourceKind::Solution).entered();
        emit_pass_started(ResourceKind::Solution, 0);
        emit_pass_finished(&DeploymentOutcome::new(ResourceKind::Solution));
    }
}
