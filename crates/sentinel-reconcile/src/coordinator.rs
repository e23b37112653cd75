//! Deployment coordinator.
//!
//! Sequences the three orchestrators: solutions run to completion, then a
//! settle delay, then rules, then workbooks. Rules and workbooks are scoped
//! to the solutions that changed (plus those already installed when the
//! stage is forced). Each kind is reconciled independently; there is no
//! rollback across kinds.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use sentinel_catalog::{CatalogClient, WorkspaceParams};
use serde::{Deserialize, Serialize};
use tracing::{info, Instrument};
use uuid::Uuid;

use crate::classify::{ResourceKind, ResourceStatus};
use crate::config::ReconcileConfig;
use crate::error::Result;
use crate::metrics::METRICS;
use crate::obs;
use crate::outcome::DeploymentOutcome;
use crate::patterns::ErrorPatterns;
use crate::policy::{Action, PlannedAction};
use crate::reconcile::{
    dependent_names, PackageScope, RulesOrchestrator, SolutionsOrchestrator, WorkbooksOrchestrator,
};

/// A stage that did not run, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageSkip {
    pub kind: ResourceKind,
    pub reason: String,
}

/// Result of one coordinator run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub dry_run: bool,
    /// `None` when the stage did not run.
    pub solutions: Option<DeploymentOutcome>,
    pub rules: Option<DeploymentOutcome>,
    pub workbooks: Option<DeploymentOutcome>,
    pub skipped_stages: Vec<StageSkip>,
}

impl RunReport {
    pub fn outcomes(&self) -> impl Iterator<Item = &DeploymentOutcome> {
        [&self.solutions, &self.rules, &self.workbooks]
            .into_iter()
            .flatten()
    }

    /// Failed entries plus aborted passes, across every kind.
    pub fn failure_count(&self) -> usize {
        self.outcomes().map(DeploymentOutcome::failure_count).sum()
    }

    pub fn has_failures(&self) -> bool {
        self.failure_count() > 0
    }

    pub fn write_count(&self) -> usize {
        self.outcomes().map(DeploymentOutcome::write_count).sum()
    }
}

/// One classified entry and the action a run would take.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusEntry {
    #[serde(flatten)]
    pub status: ResourceStatus,
    pub planned: Action,
}

impl<E> From<PlannedAction<E>> for StatusEntry {
    fn from(p: PlannedAction<E>) -> Self {
        StatusEntry {
            status: p.status,
            planned: p.action,
        }
    }
}

/// Classification of everything in scope, without writes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusReport {
    pub generated_at: DateTime<Utc>,
    pub solutions: Vec<StatusEntry>,
    pub not_found: Vec<String>,
    pub rules: Vec<StatusEntry>,
    pub workbooks: Vec<StatusEntry>,
}

/// Drives a full reconciliation against one workspace.
pub struct Coordinator {
    client: Arc<dyn CatalogClient>,
    params: WorkspaceParams,
    config: ReconcileConfig,
    patterns: ErrorPatterns,
}

impl Coordinator {
    /// Validates `config` up front.
    pub fn new(client: Arc<dyn CatalogClient>, params: WorkspaceParams, config: ReconcileConfig) -> Result<Self> {
        config.validate()?;
        let patterns = config.error_patterns()?;
        Ok(Self {
            client,
            params,
            config,
            patterns,
        })
    }

    pub fn config(&self) -> &ReconcileConfig {
        &self.config
    }

    fn solutions(&self) -> SolutionsOrchestrator {
        SolutionsOrchestrator::new(
            Arc::clone(&self.client),
            self.params.clone(),
            self.config.policy.solutions,
        )
        .with_patterns(self.patterns.clone())
        .with_max_concurrent(self.config.max_concurrent_installs)
        .with_pacing(self.config.pacing_delay())
        .with_dry_run(self.config.dry_run)
    }

    fn rules(&self) -> RulesOrchestrator {
        RulesOrchestrator::new(
            Arc::clone(&self.client),
            self.config.policy.rules,
            self.config.severities.clone(),
        )
        .with_patterns(self.patterns.clone())
        .with_dry_run(self.config.dry_run)
    }

    fn workbooks(&self) -> WorkbooksOrchestrator {
        WorkbooksOrchestrator::new(
            Arc::clone(&self.client),
            self.params.clone(),
            self.config.policy.workbooks,
        )
        .with_patterns(self.patterns.clone())
        .with_dry_run(self.config.dry_run)
    }

    /// Run every stage. Never fails as a whole; per-kind problems are in
    /// the report.
    pub async fn run(&self) -> RunReport {
        let run_id = Uuid::new_v4().to_string();
        let started_at = Utc::now();
        let clock = Instant::now();
        let policy = &self.config.policy;
        obs::emit_run_started(&run_id, self.config.solutions.len(), self.config.dry_run);

        let mut skipped_stages = Vec::new();
        let mut skip = |kind: ResourceKind, reason: &str| {
            obs::emit_stage_skipped(kind, reason);
            skipped_stages.push(StageSkip {
                kind,
                reason: reason.to_string(),
            });
        };

        // Solutions. With skip_deployment the catalog is still read so the
        // dependent stages know what is already installed.
        let solutions_span = obs::pass_span(&run_id, ResourceKind::Solution);
        let orchestrator = self.solutions();
        let (assessment, solutions) = if policy.solutions.skip_deployment {
            skip(ResourceKind::Solution, "skip_deployment is set");
            let assessment = orchestrator
                .assess(&self.config.solutions)
                .instrument(solutions_span)
                .await
                .map_err(|e| obs::emit_pass_aborted(ResourceKind::Solution, &e))
                .ok();
            (assessment, None)
        } else {
            let (assessment, outcome) = orchestrator
                .run(&self.config.solutions)
                .instrument(solutions_span)
                .await;
            (assessment, Some(outcome))
        };

        let changed: Vec<String> = solutions
            .as_ref()
            .map(|o| o.changed().map(str::to_string).collect())
            .unwrap_or_default();
        let already_installed = assessment
            .as_ref()
            .map(|a| a.already_installed())
            .unwrap_or_default();
        let unscoped = if assessment.is_none() {
            "solutions catalog unavailable"
        } else {
            "no solutions in scope"
        };
        let catalog = assessment.map(|a| a.catalog).unwrap_or_default();

        if !changed.is_empty() && !self.config.dry_run && !self.config.settle_delay().is_zero() {
            info!(
                delay_secs = self.config.settle_delay_secs,
                changed = changed.len(),
                "waiting for installed solutions to settle"
            );
            tokio::time::sleep(self.config.settle_delay()).await;
        }

        // Rules.
        let rules = if policy.rules.skip_deployment {
            skip(ResourceKind::Rule, "skip_deployment is set");
            None
        } else {
            let names = dependent_names(&changed, &already_installed, policy.rules.force_deployment);
            if names.is_empty() {
                skip(ResourceKind::Rule, unscoped);
                None
            } else {
                let scope = PackageScope::for_solutions(&catalog, &names);
                Some(
                    self.rules()
                        .run(&scope)
                        .instrument(obs::pass_span(&run_id, ResourceKind::Rule))
                        .await,
                )
            }
        };

        // Workbooks.
        let workbooks = if policy.workbooks.skip_deployment {
            skip(ResourceKind::Workbook, "skip_deployment is set");
            None
        } else {
            let names =
                dependent_names(&changed, &already_installed, policy.workbooks.force_deployment);
            if names.is_empty() {
                skip(ResourceKind::Workbook, unscoped);
                None
            } else {
                let scope = PackageScope::for_solutions(&catalog, &names);
                Some(
                    self.workbooks()
                        .run(&scope)
                        .instrument(obs::pass_span(&run_id, ResourceKind::Workbook))
                        .await,
                )
            }
        };

        let report = RunReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            dry_run: self.config.dry_run,
            solutions,
            rules,
            workbooks,
            skipped_stages,
        };

        METRICS.flush();
        obs::emit_run_finished(
            &report.run_id,
            clock.elapsed().as_millis() as u64,
            report.failure_count(),
        );
        report
    }

    /// Classify the requested solutions and the rules and workbooks of all
    /// of them, without writing anything.
    pub async fn status(&self) -> Result<StatusReport> {
        let assessment = self.solutions().assess(&self.config.solutions).await?;
        let scope = PackageScope::for_solutions(&assessment.catalog, &self.config.solutions);
        let rules = self.rules().assess(&scope).await?;
        let workbooks = self.workbooks().assess(&scope).await?;

        Ok(StatusReport {
            generated_at: Utc::now(),
            solutions: assessment.planned.into_iter().map(StatusEntry::from).collect(),
            not_found: assessment.not_found,
            rules: rules.into_iter().map(StatusEntry::from).collect(),
            workbooks: workbooks.into_iter().map(StatusEntry::from).collect(),
        })
    }
}
