//! Workbooks orchestrator.
//!
//! A workbook lives as two resources: the `Microsoft.Insights/workbooks`
//! resource and a Sentinel metadata record pointing at it through
//! `parentId`. Installed state is read from the metadata records.
//!
//! Writes are sequential. When an update moves a workbook to a new
//! resource name, the old workbook and its metadata are deleted first.

use std::sync::Arc;

use sentinel_catalog::{
    CatalogClient, CatalogResult, InstalledWorkbookMetadata, WorkbookTemplateDetail,
    WorkbookTemplateEntry, WorkspaceParams,
};
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use crate::classify::{classify, ResourceKind};
use crate::config::WorkbookPolicy;
use crate::error::Result;
use crate::normalize::{normalize_workbook_properties, strip_post_deployment};
use crate::obs;
use crate::outcome::DeploymentOutcome;
use crate::patterns::ErrorPatterns;
use crate::policy::{plan, Action, PlannedAction};

use super::{keep_latest, log_plan, record_applied, record_skip, record_write_error, unavailable, PackageScope};

const WORKBOOK_CATEGORY: &str = "sentinel";

/// Reconciles workbooks from templates.
pub struct WorkbooksOrchestrator {
    client: Arc<dyn CatalogClient>,
    params: WorkspaceParams,
    policy: WorkbookPolicy,
    patterns: ErrorPatterns,
    dry_run: bool,
}

impl WorkbooksOrchestrator {
    pub fn new(client: Arc<dyn CatalogClient>, params: WorkspaceParams, policy: WorkbookPolicy) -> Self {
        Self {
            client,
            params,
            policy,
            patterns: ErrorPatterns::default(),
            dry_run: false,
        }
    }

    pub fn with_patterns(mut self, patterns: ErrorPatterns) -> Self {
        self.patterns = patterns;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Read templates and installed metadata, filter by scope and plan.
    pub async fn assess(&self, scope: &PackageScope) -> Result<Vec<PlannedAction<WorkbookTemplateEntry>>> {
        let kind = ResourceKind::Workbook;
        let templates = self
            .client
            .list_workbook_templates()
            .await
            .map_err(unavailable(kind))?;
        let installed: Vec<InstalledWorkbookMetadata> = self
            .client
            .list_installed_workbook_metadata()
            .await
            .map_err(unavailable(kind))?;

        let candidates: Vec<WorkbookTemplateEntry> = templates
            .into_iter()
            .filter(|t| scope.contains(t.package_id.as_deref()))
            .collect();

        let classified = keep_latest(candidates)
            .into_iter()
            .map(|t| {
                let status = classify(&t, &installed);
                (t, status)
            })
            .collect();
        let planned = plan(classified, &self.policy.flags());
        log_plan(&planned);
        Ok(planned)
    }

    /// Execute a plan, one workbook at a time.
    pub async fn execute(&self, planned: &[PlannedAction<WorkbookTemplateEntry>]) -> DeploymentOutcome {
        let kind = ResourceKind::Workbook;
        let mut outcome = DeploymentOutcome::new(kind);
        outcome.dry_run = self.dry_run;
        obs::emit_pass_started(kind, planned.len());

        for p in planned {
            let name = p.entry.display_name.as_str();
            if let Action::Skip(reason) = p.action {
                record_skip(&mut outcome, &p.status, reason);
                continue;
            }
            if self.dry_run {
                record_applied(&mut outcome, kind, name, p.action);
                continue;
            }

            let previous = match p.action {
                Action::Update => p.status.matched.as_ref().and_then(|m| m.as_workbook()),
                _ => None,
            };
            match self.deploy(&p.entry, previous).await {
                Ok(()) => record_applied(&mut outcome, kind, name, p.action),
                Err(e) => record_write_error(&mut outcome, &self.patterns, kind, name, &e),
            }
        }

        outcome.sort();
        obs::emit_pass_finished(&outcome);
        outcome
    }

    /// Assess and execute. An unreadable catalog aborts the pass.
    pub async fn run(&self, scope: &PackageScope) -> DeploymentOutcome {
        match self.assess(scope).await {
            Ok(planned) => self.execute(&planned).await,
            Err(e) => {
                obs::emit_pass_aborted(ResourceKind::Workbook, &e);
                DeploymentOutcome::aborted(ResourceKind::Workbook, e.to_string())
            }
        }
    }

    /// Write one workbook and its metadata record.
    ///
    /// Errors are content-write failures. A failed metadata write is only
    /// logged.
    async fn deploy(
        &self,
        template: &WorkbookTemplateEntry,
        previous: Option<&InstalledWorkbookMetadata>,
    ) -> CatalogResult<()> {
        let detail = self.client.get_workbook_template_detail(&template.id).await?;
        let workbook_id = resolve_workbook_id(&detail, previous);

        let mut metadata_id = format!("workbook-{workbook_id}");
        if let Some(prev) = previous {
            let moved = prev
                .workbook_name()
                .filter(|old| !old.eq_ignore_ascii_case(&workbook_id));
            match moved {
                Some(old) => {
                    debug!(workbook = %template.display_name, from = %old, to = %workbook_id, "workbook identity changed");
                    tolerate_not_found(self.client.delete_workbook(old).await)?;
                    tolerate_not_found(self.client.delete_workbook_metadata(&prev.id).await)?;
                }
                None => metadata_id = prev.id.clone(),
            }
        }

        let payload = build_workbook_payload(&detail, template, &self.params);
        self.client
            .put_workbook(&workbook_id, &payload, &self.params.location)
            .await?;

        let parent_id = format!(
            "{}/providers/Microsoft.Insights/workbooks/{}",
            resource_group_of(&self.params.workspace_resource_id),
            workbook_id
        );
        let metadata = build_workbook_metadata(&detail, template, &parent_id);
        if let Err(e) = self
            .client
            .put_workbook_metadata(&metadata_id, &metadata)
            .await
        {
            obs::emit_metadata_failed(ResourceKind::Workbook, &template.display_name, &e);
        }
        Ok(())
    }
}

/// A delete of something already gone is a success.
fn tolerate_not_found(result: CatalogResult<()>) -> CatalogResult<()> {
    match result {
        Err(e) if e.is_not_found() => Ok(()),
        other => other,
    }
}

/// Resource name for the workbook.
///
/// A literal GUID in the template wins; template names are otherwise ARM
/// expressions, so an existing workbook keeps its name and a new one gets a
/// fresh GUID.
pub(crate) fn resolve_workbook_id(detail: &WorkbookTemplateDetail, previous: Option<&InstalledWorkbookMetadata>) -> String {
    let literal = detail
        .workbook
        .get("name")
        .and_then(Value::as_str)
        .and_then(|name| Uuid::parse_str(name.trim()).ok());
    if let Some(id) = literal {
        return id.to_string();
    }
    previous
        .and_then(|p| p.workbook_name())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

/// `/subscriptions/…/resourceGroups/…` prefix of a workspace resource id.
pub(crate) fn resource_group_of(workspace_resource_id: &str) -> &str {
    workspace_resource_id
        .to_ascii_lowercase()
        .find("/providers/")
        .map(|i| &workspace_resource_id[..i])
        .unwrap_or(workspace_resource_id)
}

pub(crate) fn build_workbook_payload(
    detail: &WorkbookTemplateDetail,
    template: &WorkbookTemplateEntry,
    params: &WorkspaceParams,
) -> Value {
    let mut properties = detail
        .workbook
        .get("properties")
        .filter(|p| p.is_object())
        .cloned()
        .unwrap_or_else(|| json!({}));
    properties = normalize_workbook_properties(properties);
    if let Some(map) = properties.as_object_mut() {
        map.insert("displayName".to_string(), json!(template.display_name));
        map.insert("sourceId".to_string(), json!(params.workspace_resource_id));
        map.insert("category".to_string(), json!(WORKBOOK_CATEGORY));
    }
    json!({ "kind": "shared", "properties": properties })
}

pub(crate) fn build_workbook_metadata(
    detail: &WorkbookTemplateDetail,
    template: &WorkbookTemplateEntry,
    parent_id: &str,
) -> Value {
    let mut properties = detail
        .metadata
        .as_ref()
        .and_then(|m| m.get("properties"))
        .filter(|p| p.is_object())
        .cloned()
        .unwrap_or_else(|| json!({}));
    strip_post_deployment(&mut properties);
    if let Some(map) = properties.as_object_mut() {
        map.insert("parentId".to_string(), json!(parent_id));
        map.insert("contentId".to_string(), json!(template.content_id));
        map.insert("kind".to_string(), json!("Workbook"));
        if let Some(version) = &template.version {
            map.insert("version".to_string(), json!(version));
        }
        if let Some(package_id) = &template.package_id {
            map.insert(
                "source".to_string(),
                json!({
                    "kind": "Solution",
                    "name": template.package_name.as_deref().unwrap_or(package_id),
                    "sourceId": package_id,
                }),
            );
        }
    }
    json!({ "properties": properties })
}

#[cfg(test)]
mod tests {
    use super::*;

    const WORKSPACE: &str =
        "/subscriptions/s/resourceGroups/rg/providers/Microsoft.OperationalInsights/workspaces/ws";

    fn params() -> WorkspaceParams {
        WorkspaceParams {
            workspace_name: "ws".to_string(),
            location: "westeurope".to_string(),
            workspace_resource_id: WORKSPACE.to_string(),
        }
    }

    fn template() -> WorkbookTemplateEntry {
        WorkbookTemplateEntry {
            id: "tmpl-wb".to_string(),
            content_id: "content-wb".to_string(),
            package_id: Some("pkg".to_string()),
            package_name: Some("Solution".to_string()),
            package_version: Some("2.0.0".to_string()),
            display_name: "Overview".to_string(),
            version: Some("1.1.0".to_string()),
        }
    }

    fn previous(name: &str) -> InstalledWorkbookMetadata {
        InstalledWorkbookMetadata {
            id: "workbook-meta".to_string(),
            content_id: Some("content-wb".to_string()),
            display_name: Some("Overview".to_string()),
            version: Some("1.0.0".to_string()),
            parent_id: Some(format!("/subscriptions/s/resourceGroups/rg/providers/Microsoft.Insights/workbooks/{name}")),
        }
    }

    #[test]
    fn test_resource_group_prefix() {
        assert_eq!(resource_group_of(WORKSPACE), "/subscriptions/s/resourceGroups/rg");
        assert_eq!(resource_group_of("plain"), "plain");
    }

    #[test]
    fn test_literal_guid_name_wins() {
        let guid = "6f0e2a55-6c0e-4b47-9d21-2c0f3f6a1b10";
        let detail = WorkbookTemplateDetail {
            workbook: json!({ "name": guid }),
            metadata: None,
        };
        assert_eq!(resolve_workbook_id(&detail, Some(&previous("old"))), guid);
    }

    #[test]
    fn test_expression_name_reuses_previous_identity() {
        let detail = WorkbookTemplateDetail {
            workbook: json!({ "name": "[parameters('workbook1-id')]" }),
            metadata: None,
        };
        assert_eq!(resolve_workbook_id(&detail, Some(&previous("existing"))), "existing");

        let fresh = resolve_workbook_id(&detail, None);
        assert!(Uuid::parse_str(&fresh).is_ok());
    }

    #[test]
    fn test_payload_shape() {
        let detail = WorkbookTemplateDetail {
            workbook: json!({ "properties": { "serializedData": { "items": [] }, "version": "1.0" } }),
            metadata: None,
        };
        let payload = build_workbook_payload(&detail, &template(), &params());
        assert_eq!(payload["kind"], "shared");
        assert_eq!(payload["properties"]["displayName"], "Overview");
        assert_eq!(payload["properties"]["sourceId"], WORKSPACE);
        assert!(payload["properties"]["serializedData"].is_string());
    }

    #[test]
    fn test_metadata_links_parent_and_strips_hooks() {
        let detail = WorkbookTemplateDetail {
            workbook: json!({}),
            metadata: Some(json!({
                "properties": { "author": { "name": "x" }, "postDeployment": ["script"] }
            })),
        };
        let meta = build_workbook_metadata(&detail, &template(), "/rg/providers/Microsoft.Insights/workbooks/abc");
        let props = &meta["properties"];
        assert_eq!(props["parentId"], "/rg/providers/Microsoft.Insights/workbooks/abc");
        assert_eq!(props["contentId"], "content-wb");
        assert_eq!(props["version"], "1.1.0");
        assert_eq!(props["source"]["sourceId"], "pkg");
        assert_eq!(props["author"]["name"], "x");
        assert!(props.get("postDeployment").is_none());
    }
}
