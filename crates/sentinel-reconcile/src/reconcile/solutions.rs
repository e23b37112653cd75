//! Solutions orchestrator.
//!
//! Installs run as independent tasks in a [`JoinSet`], bounded by a
//! semaphore and paced at dispatch. A failed or panicked task is recorded
//! against its solution and never cancels its siblings.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use sentinel_catalog::{
    CatalogClient, CatalogError, InstalledSolution, SolutionEntry, WorkspaceParams,
};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::classify::{classify, ResourceKind};
use crate::config::SolutionPolicy;
use crate::error::Result;
use crate::normalize::strip_post_deployment;
use crate::obs;
use crate::outcome::DeploymentOutcome;
use crate::patterns::ErrorPatterns;
use crate::policy::{plan, Action, PlannedAction};
use crate::version::compare_versions;

use super::{log_plan, record_applied, record_skip, record_write_error, unavailable};

/// Classified and planned solutions, before execution.
#[derive(Debug, Clone, Serialize)]
pub struct SolutionAssessment {
    /// The full solutions catalog, used to scope dependent stages.
    #[serde(skip)]
    pub catalog: Vec<SolutionEntry>,
    pub planned: Vec<PlannedAction<SolutionEntry>>,
    /// Requested names the catalog does not offer.
    pub not_found: Vec<String>,
}

impl SolutionAssessment {
    /// Requested solutions present in the workspace, current or not.
    pub fn already_installed(&self) -> Vec<String> {
        self.planned
            .iter()
            .filter(|p| p.status.matched.is_some())
            .map(|p| p.entry.display_name.clone())
            .collect()
    }
}

/// Reconciles the requested solutions.
pub struct SolutionsOrchestrator {
    client: Arc<dyn CatalogClient>,
    params: WorkspaceParams,
    policy: SolutionPolicy,
    patterns: ErrorPatterns,
    max_concurrent: usize,
    pacing: Duration,
    dry_run: bool,
}

impl SolutionsOrchestrator {
    pub fn new(client: Arc<dyn CatalogClient>, params: WorkspaceParams, policy: SolutionPolicy) -> Self {
        Self {
            client,
            params,
            policy,
            patterns: ErrorPatterns::default(),
            max_concurrent: 4,
            pacing: Duration::ZERO,
            dry_run: false,
        }
    }

    pub fn with_patterns(mut self, patterns: ErrorPatterns) -> Self {
        self.patterns = patterns;
        self
    }

    /// Bound on concurrently running installs. Zero is treated as one.
    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Read both snapshots, resolve the requested names and plan.
    pub async fn assess(&self, requested: &[String]) -> Result<SolutionAssessment> {
        let kind = ResourceKind::Solution;
        let catalog = self
            .client
            .list_catalog_solutions()
            .await
            .map_err(unavailable(kind))?;
        let installed: Vec<InstalledSolution> = self
            .client
            .list_installed_solution_packages()
            .await
            .map_err(unavailable(kind))?;

        let mut seen = HashSet::new();
        let mut selected = Vec::new();
        let mut not_found = Vec::new();
        for name in requested {
            let wanted = name.trim();
            if !seen.insert(wanted.to_lowercase()) {
                continue;
            }
            let latest = catalog
                .iter()
                .filter(|e| e.display_name.trim().eq_ignore_ascii_case(wanted))
                .max_by(|a, b| {
                    compare_versions(
                        a.version.as_deref().unwrap_or("0"),
                        b.version.as_deref().unwrap_or("0"),
                    )
                });
            match latest {
                Some(entry) => selected.push(entry.clone()),
                None => {
                    warn!(solution = %wanted, "solution not found in catalog");
                    not_found.push(wanted.to_string());
                }
            }
        }

        let classified = selected
            .into_iter()
            .map(|entry| {
                let status = classify(&entry, &installed);
                (entry, status)
            })
            .collect();
        let planned = plan(classified, &self.policy.flags());
        log_plan(&planned);

        Ok(SolutionAssessment {
            catalog,
            planned,
            not_found,
        })
    }

    /// Execute an assessment.
    pub async fn execute(&self, assessment: &SolutionAssessment) -> DeploymentOutcome {
        let kind = ResourceKind::Solution;
        let mut outcome = DeploymentOutcome::new(kind);
        outcome.dry_run = self.dry_run;
        outcome.not_found = assessment.not_found.clone();
        obs::emit_pass_started(kind, assessment.planned.len());

        let sem = Arc::new(Semaphore::new(self.max_concurrent));
        let mut join_set = JoinSet::new();
        let mut pending: HashSet<String> = HashSet::new();

        for planned in &assessment.planned {
            let name = planned.entry.display_name.clone();
            let action = match planned.action {
                Action::Skip(reason) => {
                    record_skip(&mut outcome, &planned.status, reason);
                    continue;
                }
                write => write,
            };
            if self.dry_run {
                record_applied(&mut outcome, kind, &name, action);
                continue;
            }

            if !pending.is_empty() && !self.pacing.is_zero() {
                tokio::time::sleep(self.pacing).await;
            }

            let client = Arc::clone(&self.client);
            let params = self.params.clone();
            let entry = planned.entry.clone();
            let sem = Arc::clone(&sem);
            pending.insert(name.clone());
            debug!(solution = %name, action = ?action, "dispatching solution install");

            join_set.spawn(async move {
                let _permit = sem.acquire_owned().await.ok();
                let result = install_one(client.as_ref(), &entry, &params).await;
                (name, action, result)
            });
        }

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((name, action, result)) => {
                    pending.remove(&name);
                    match result {
                        Ok(()) => record_applied(&mut outcome, kind, &name, action),
                        Err(e) => record_write_error(&mut outcome, &self.patterns, kind, &name, &e),
                    }
                }
                Err(e) => warn!(error = %e, "solution install task did not complete"),
            }
        }

        // Tasks that panicked never reported back.
        for name in pending {
            let error = CatalogError::Transport("install task panicked".to_string());
            record_write_error(&mut outcome, &self.patterns, kind, &name, &error);
        }

        outcome.sort();
        obs::emit_pass_finished(&outcome);
        outcome
    }

    /// Assess and execute in one go. An unreadable catalog aborts the pass.
    pub async fn run(&self, requested: &[String]) -> (Option<SolutionAssessment>, DeploymentOutcome) {
        match self.assess(requested).await {
            Ok(assessment) => {
                let outcome = self.execute(&assessment).await;
                (Some(assessment), outcome)
            }
            Err(e) => {
                obs::emit_pass_aborted(ResourceKind::Solution, &e);
                (None, DeploymentOutcome::aborted(ResourceKind::Solution, e.to_string()))
            }
        }
    }
}

/// Fetch packaged content when the list response lacked it, strip
/// post-deployment hooks and deploy.
async fn install_one(
    client: &dyn CatalogClient,
    entry: &SolutionEntry,
    params: &WorkspaceParams,
) -> sentinel_catalog::CatalogResult<()> {
    let mut content = match &entry.packaged_content {
        Some(content) => content.clone(),
        None => client.get_solution_detail(&entry.id).await?,
    };
    strip_post_deployment(&mut content);
    client
        .install_or_update_solution(&entry.id, &content, params)
        .await
}
