//! Shared fixtures for reconciliation integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use sentinel_catalog::fakes::MemoryCatalog;
use sentinel_catalog::{
    CatalogClient, InstalledRule, InstalledSolution, InstalledWorkbookMetadata, RuleTemplateEntry,
    Severity, SolutionEntry, WorkbookTemplateDetail, WorkbookTemplateEntry, WorkspaceParams,
};
use sentinel_reconcile::ReconcileConfig;
use serde_json::{json, Value};

pub const WORKSPACE_ID: &str =
    "/subscriptions/sub/resourceGroups/rg/providers/Microsoft.OperationalInsights/workspaces/law";

pub fn params() -> WorkspaceParams {
    WorkspaceParams {
        workspace_name: "law".to_string(),
        location: "westeurope".to_string(),
        workspace_resource_id: WORKSPACE_ID.to_string(),
    }
}

pub fn slug(name: &str) -> String {
    name.to_lowercase().replace(' ', "-")
}

/// Package id that templates of solution `name` reference.
pub fn package_of(name: &str) -> String {
    format!("azuresentinel.{}", slug(name))
}

pub fn solution(name: &str, version: &str) -> SolutionEntry {
    SolutionEntry {
        id: format!("sol-{}", slug(name)),
        content_id: package_of(name),
        display_name: name.to_string(),
        version: Some(version.to_string()),
        packaged_content: None,
    }
}

pub fn solution_content() -> Value {
    json!({
        "$schema": "https://schema.management.azure.com/schemas/2019-04-01/deploymentTemplate.json#",
        "resources": [
            { "type": "Microsoft.OperationalInsights/workspaces/providers/metadata", "name": "meta" }
        ]
    })
}

pub fn installed_solution(name: &str, version: &str) -> InstalledSolution {
    InstalledSolution {
        display_name: name.to_string(),
        version: Some(version.to_string()),
    }
}

pub fn rule_template(id: &str, name: &str, version: &str, solution: &str) -> RuleTemplateEntry {
    RuleTemplateEntry {
        id: id.to_string(),
        package_id: Some(package_of(solution)),
        package_name: Some(solution.to_string()),
        package_version: Some("3.0.0".to_string()),
        display_name: name.to_string(),
        severity: Some(Severity::High),
        template_version: Some(version.to_string()),
        rule_kind: "Scheduled".to_string(),
        rule_properties: json!({
            "query": "SigninLogs | where ResultType != 0",
            "queryFrequency": "1h",
            "queryPeriod": "1d",
            "severity": "High",
            "tactics": "CredentialAccess"
        }),
    }
}

pub fn installed_rule(id: &str, name: &str, template: Option<&str>, version: &str) -> InstalledRule {
    InstalledRule {
        id: id.to_string(),
        display_name: name.to_string(),
        alert_rule_template_name: template.map(str::to_string),
        template_version: Some(version.to_string()),
        kind: "Scheduled".to_string(),
        properties: json!({ "displayName": name }),
    }
}

pub fn workbook_template(
    content_id: &str,
    name: &str,
    version: &str,
    solution: &str,
) -> (WorkbookTemplateEntry, WorkbookTemplateDetail) {
    let entry = WorkbookTemplateEntry {
        id: format!("tmpl-{content_id}"),
        content_id: content_id.to_string(),
        package_id: Some(package_of(solution)),
        package_name: Some(solution.to_string()),
        package_version: Some("3.0.0".to_string()),
        display_name: name.to_string(),
        version: Some(version.to_string()),
    };
    let detail = WorkbookTemplateDetail {
        workbook: json!({
            "type": "Microsoft.Insights/workbooks",
            "name": "[parameters('workbook-id')]",
            "properties": {
                "displayName": "[parameters('workbook-name')]",
                "serializedData": { "version": "Notebook/1.0", "items": [] },
                "version": "1.0"
            }
        }),
        metadata: Some(json!({
            "properties": { "author": { "name": "Microsoft" }, "support": { "tier": "Microsoft" } }
        })),
    };
    (entry, detail)
}

pub fn workbook_parent(name: &str) -> String {
    format!("/subscriptions/sub/resourceGroups/rg/providers/Microsoft.Insights/workbooks/{name}")
}

pub fn installed_workbook(content_id: &str, name: &str, version: &str, workbook: &str) -> InstalledWorkbookMetadata {
    InstalledWorkbookMetadata {
        id: format!("workbook-{workbook}"),
        content_id: Some(content_id.to_string()),
        display_name: Some(name.to_string()),
        version: Some(version.to_string()),
        parent_id: Some(workbook_parent(workbook)),
    }
}

/// Configuration with no delays, reconciling `solutions`.
pub fn config(solutions: &[&str]) -> ReconcileConfig {
    ReconcileConfig {
        solutions: solutions.iter().map(|s| s.to_string()).collect(),
        settle_delay_secs: 0,
        pacing_delay_ms: 0,
        ..ReconcileConfig::default()
    }
}

pub fn client(catalog: &Arc<MemoryCatalog>) -> Arc<dyn CatalogClient> {
    catalog.clone()
}

/// Catalog offering "Azure Activity" 2.0.0 with two rules and one workbook,
/// and "DNS" 1.0.0 with one rule. Nothing is installed.
pub fn seeded_catalog() -> Arc<MemoryCatalog> {
    let catalog = Arc::new(MemoryCatalog::new());
    catalog.add_catalog_solution(solution("Azure Activity", "2.0.0"), solution_content());
    catalog.add_catalog_solution(solution("DNS", "1.0.0"), solution_content());

    catalog.add_rule_template(rule_template(
        "tmpl-suspicious-ops",
        "Suspicious resource operations",
        "1.1.0",
        "Azure Activity",
    ));
    catalog.add_rule_template(rule_template(
        "tmpl-mass-delete",
        "Mass resource deletion",
        "2.0.0",
        "Azure Activity",
    ));
    catalog.add_rule_template(rule_template("tmpl-dns-tunnel", "DNS tunneling", "1.0.0", "DNS"));

    let (entry, detail) = workbook_template("wb-activity", "Azure Activity", "2.0.0", "Azure Activity");
    catalog.add_workbook_template(entry, detail);
    catalog
}
