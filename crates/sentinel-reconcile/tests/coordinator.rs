//! End-to-end coordinator runs against the in-memory catalog.

mod common;

use std::time::Duration;

use common::*;
use sentinel_catalog::fakes::Operation;
use sentinel_catalog::CatalogError;
use sentinel_reconcile::{Action, Coordinator, ResourceKind, SkipReason, Status};

fn coordinator(catalog: &std::sync::Arc<sentinel_catalog::fakes::MemoryCatalog>, config: sentinel_reconcile::ReconcileConfig) -> Coordinator {
    Coordinator::new(client(catalog), params(), config).expect("valid config")
}

#[tokio::test]
async fn full_run_installs_then_second_run_writes_nothing() {
    let catalog = seeded_catalog();

    let first = coordinator(&catalog, config(&["Azure Activity"])).run().await;
    assert!(!first.has_failures(), "{first:?}");

    let solutions = first.solutions.as_ref().unwrap();
    assert_eq!(solutions.installed, vec!["Azure Activity"]);

    let rules = first.rules.as_ref().unwrap();
    assert_eq!(
        rules.installed,
        vec!["Mass resource deletion", "Suspicious resource operations"]
    );
    let workbooks = first.workbooks.as_ref().unwrap();
    assert_eq!(workbooks.installed, vec!["Azure Activity"]);

    assert_eq!(catalog.writes_for(Operation::PutRuleMetadata).len(), 2);
    assert_eq!(catalog.writes_for(Operation::PutWorkbookMetadata).len(), 1);
    // DNS was not requested, so its rule is out of scope.
    assert!(catalog
        .installed_rules()
        .iter()
        .all(|r| r.display_name != "DNS tunneling"));

    catalog.clear_writes();

    // Force dependent stages so the second run re-examines every rule and
    // workbook instead of skipping them for lack of changed solutions.
    let mut again = config(&["Azure Activity"]);
    again.policy.rules.force_deployment = true;
    again.policy.workbooks.force_deployment = true;
    let second = coordinator(&catalog, again).run().await;

    assert_eq!(second.write_count(), 0);
    assert!(catalog.writes().is_empty(), "{:?}", catalog.writes());
    let rules = second.rules.as_ref().unwrap();
    assert_eq!(rules.skipped.len(), 2);
    assert!(rules.skipped.iter().all(|s| s.reason == SkipReason::Current));
    assert_eq!(second.workbooks.as_ref().unwrap().skipped.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn rules_wait_for_changed_solutions_to_settle() {
    let catalog = seeded_catalog();
    let mut settled = config(&["Azure Activity"]);
    settled.settle_delay_secs = 30;

    let start = tokio::time::Instant::now();
    let report = coordinator(&catalog, settled).run().await;
    assert_eq!(report.solutions.as_ref().unwrap().installed, vec!["Azure Activity"]);

    let installed_at = catalog.writes_for(Operation::InstallSolution)[0].at;
    let first_rule = catalog
        .writes_for(Operation::PutRule)
        .iter()
        .map(|w| w.at)
        .min()
        .unwrap();
    assert!(installed_at - start < Duration::from_secs(30));
    assert!(first_rule - installed_at >= Duration::from_secs(30));
}

#[tokio::test(start_paused = true)]
async fn no_settle_wait_when_no_solution_changed() {
    let catalog = seeded_catalog();
    catalog.add_installed_solution(installed_solution("Azure Activity", "2.0.0"));
    let mut forced = config(&["Azure Activity"]);
    forced.settle_delay_secs = 30;
    forced.policy.rules.force_deployment = true;

    let start = tokio::time::Instant::now();
    let report = coordinator(&catalog, forced).run().await;

    assert!(report.solutions.as_ref().unwrap().changed().next().is_none());
    assert_eq!(report.rules.as_ref().unwrap().installed.len(), 2);
    let first_rule = catalog.writes_for(Operation::PutRule)[0].at;
    assert!(first_rule - start < Duration::from_secs(30));
}

#[tokio::test]
async fn stale_solution_is_updated_unless_updates_are_skipped() {
    let catalog = seeded_catalog();
    catalog.add_installed_solution(installed_solution("Azure Activity", "1.0.0"));

    let mut suppressed = config(&["Azure Activity"]);
    suppressed.policy.solutions.skip_update = true;
    let report = coordinator(&catalog, suppressed).run().await;

    let solutions = report.solutions.as_ref().unwrap();
    assert!(solutions.updated.is_empty());
    assert_eq!(solutions.skipped[0].reason, SkipReason::UpdateSuppressed);
    assert!(catalog.writes_for(Operation::InstallSolution).is_empty());
    assert!(report.rules.is_none());
    assert!(report.workbooks.is_none());

    let report = coordinator(&catalog, config(&["Azure Activity"])).run().await;
    assert_eq!(report.solutions.as_ref().unwrap().updated, vec!["Azure Activity"]);
    assert_eq!(catalog.installed_solutions()[0].version.as_deref(), Some("2.0.0"));
    // An updated solution puts its rules in scope.
    assert_eq!(report.rules.as_ref().unwrap().installed.len(), 2);
}

#[tokio::test]
async fn current_solutions_leave_dependent_stages_empty() {
    let catalog = seeded_catalog();
    catalog.add_installed_solution(installed_solution("Azure Activity", "2.0.0"));

    let report = coordinator(&catalog, config(&["Azure Activity"])).run().await;

    assert!(report.rules.is_none());
    assert!(report.workbooks.is_none());
    let kinds: Vec<ResourceKind> = report.skipped_stages.iter().map(|s| s.kind).collect();
    assert_eq!(kinds, vec![ResourceKind::Rule, ResourceKind::Workbook]);
    assert!(!report.has_failures());
    assert!(catalog.writes().is_empty());
}

#[tokio::test]
async fn unavailable_rule_catalog_aborts_only_rules() {
    let catalog = seeded_catalog();
    catalog.fail(
        Operation::ListRuleTemplates,
        CatalogError::Transport("connection reset".to_string()),
    );

    let report = coordinator(&catalog, config(&["Azure Activity"])).run().await;

    let rules = report.rules.as_ref().unwrap();
    assert!(rules.aborted.as_deref().unwrap().contains("connection reset"));
    assert_eq!(rules.write_count(), 0);
    assert!(catalog.writes_for(Operation::PutRule).is_empty());

    assert_eq!(report.workbooks.as_ref().unwrap().installed, vec!["Azure Activity"]);
    assert_eq!(report.solutions.as_ref().unwrap().installed, vec!["Azure Activity"]);
    assert_eq!(report.failure_count(), 1);
    assert!(report.has_failures());
}

#[tokio::test]
async fn unavailable_solution_catalog_skips_dependents() {
    let catalog = seeded_catalog();
    catalog.fail(
        Operation::ListInstalledSolutions,
        CatalogError::application(503, "ServiceUnavailable", "try later"),
    );

    let report = coordinator(&catalog, config(&["Azure Activity"])).run().await;

    assert!(report.solutions.as_ref().unwrap().aborted.is_some());
    assert!(report.rules.is_none());
    assert!(report.workbooks.is_none());
    assert_eq!(report.failure_count(), 1);
    assert_eq!(report.skipped_stages.len(), 2);
    assert!(report
        .skipped_stages
        .iter()
        .all(|s| s.reason == "solutions catalog unavailable"));
}

#[tokio::test]
async fn unknown_solutions_are_reported_not_failed() {
    let catalog = seeded_catalog();

    let report = coordinator(&catalog, config(&["Azure Activity", "No Such Solution"]))
        .run()
        .await;

    let solutions = report.solutions.as_ref().unwrap();
    assert_eq!(solutions.not_found, vec!["No Such Solution"]);
    assert_eq!(solutions.installed, vec!["Azure Activity"]);
    assert!(!report.has_failures());
}

#[tokio::test]
async fn dry_run_plans_every_stage_without_writing() {
    let catalog = seeded_catalog();
    let mut dry = config(&["Azure Activity", "DNS"]);
    dry.dry_run = true;
    dry.settle_delay_secs = 3600;

    let report = coordinator(&catalog, dry).run().await;

    assert!(report.dry_run);
    assert!(catalog.writes().is_empty());
    assert_eq!(
        report.solutions.as_ref().unwrap().installed,
        vec!["Azure Activity", "DNS"]
    );
    let rules = report.rules.as_ref().unwrap();
    assert!(rules.dry_run);
    assert_eq!(rules.installed.len(), 3);
    assert_eq!(report.workbooks.as_ref().unwrap().installed.len(), 1);
}

#[tokio::test]
async fn skipped_solution_stage_still_scopes_forced_rules() {
    let catalog = seeded_catalog();
    catalog.add_installed_solution(installed_solution("DNS", "0.9.0"));

    let mut cfg = config(&["DNS"]);
    cfg.policy.solutions.skip_deployment = true;
    cfg.policy.rules.force_deployment = true;
    cfg.policy.workbooks.skip_deployment = true;

    let report = coordinator(&catalog, cfg).run().await;

    assert!(report.solutions.is_none());
    assert!(catalog.writes_for(Operation::InstallSolution).is_empty());
    assert_eq!(report.rules.as_ref().unwrap().installed, vec!["DNS tunneling"]);
    assert!(report.workbooks.is_none());
    assert_eq!(report.skipped_stages.len(), 2);
}

#[tokio::test]
async fn status_classifies_without_writing() {
    let catalog = seeded_catalog();
    catalog.add_installed_solution(installed_solution("Azure Activity", "1.0.0"));
    catalog.add_installed_rule(installed_rule(
        "rule-1",
        "Suspicious resource operations",
        Some("tmpl-suspicious-ops"),
        "1.1.0",
    ));

    let status = coordinator(&catalog, config(&["Azure Activity"]))
        .status()
        .await
        .unwrap();

    assert_eq!(status.solutions.len(), 1);
    assert_eq!(status.solutions[0].status.status, Status::NeedsUpdate);
    assert_eq!(status.solutions[0].planned, Action::Update);

    let current = status
        .rules
        .iter()
        .find(|e| e.status.key == "tmpl-suspicious-ops")
        .unwrap();
    assert_eq!(current.status.status, Status::Current);
    let missing = status
        .rules
        .iter()
        .find(|e| e.status.key == "tmpl-mass-delete")
        .unwrap();
    assert_eq!(missing.planned, Action::Install);
    assert_eq!(status.workbooks.len(), 1);
    assert!(catalog.writes().is_empty());

    let json = serde_json::to_value(&status).unwrap();
    assert_eq!(json["solutions"][0]["status"], "needs_update");
}

#[tokio::test]
async fn invalid_config_is_rejected_up_front() {
    let catalog = seeded_catalog();
    let mut bad = config(&["Azure Activity"]);
    bad.max_concurrent_installs = 0;
    assert!(Coordinator::new(client(&catalog), params(), bad).is_err());
}
