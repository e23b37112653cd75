//! Azure Resource Manager catalog client
//!
//! Talks to the Sentinel content endpoints of one workspace:
//! `contentProductPackages` (catalog solutions), `contentPackages`
//! (installed solutions), `contentTemplates` (rule and workbook templates),
//! `alertRules` and `metadata`. Workbooks are written under
//! `Microsoft.Insights/workbooks`; solutions are installed as incremental
//! template deployments.
//!
//! Raw JSON is decoded into the typed entries of [`crate::types`] here and
//! nowhere else.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, StatusCode, Url};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::client::{CatalogClient, CatalogResult};
use crate::error::CatalogError;
use crate::session::Session;
use crate::types::*;

/// API version for `Microsoft.SecurityInsights` endpoints.
pub const SECURITY_INSIGHTS_API_VERSION: &str = "2024-09-01";
/// API version for `Microsoft.Insights/workbooks`.
pub const WORKBOOKS_API_VERSION: &str = "2022-04-01";
/// API version for `Microsoft.Resources/deployments`.
pub const DEPLOYMENTS_API_VERSION: &str = "2021-04-01";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
const MAX_DEPLOYMENT_NAME: usize = 64;

/// HTTP implementation of [`CatalogClient`].
pub struct ArmCatalogClient {
    session: Session,
    http: reqwest::Client,
}

impl ArmCatalogClient {
    /// Create a client bound to `session`.
    pub fn new(session: Session) -> CatalogResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("sentinel-sync/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(ArmCatalogClient { session, http })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// URL of a resource below the workspace's SecurityInsights scope.
    fn sentinel_url(&self, path: &str, query: &[(&str, &str)]) -> CatalogResult<Url> {
        let base = format!(
            "{}{}/{}",
            self.session.arm_endpoint,
            self.session.security_insights_scope(),
            path
        );
        build_url(&base, SECURITY_INSIGHTS_API_VERSION, query)
    }

    fn workbook_url(&self, id: &str) -> CatalogResult<Url> {
        let base = format!(
            "{}{}/providers/Microsoft.Insights/workbooks/{}",
            self.session.arm_endpoint,
            self.session.resource_group_id(),
            id
        );
        build_url(&base, WORKBOOKS_API_VERSION, &[])
    }

    /// Sentinel workbooks in the workspace's resource group.
    fn workbooks_url(&self) -> CatalogResult<Url> {
        let base = format!(
            "{}{}/providers/Microsoft.Insights/workbooks",
            self.session.arm_endpoint,
            self.session.resource_group_id()
        );
        build_url(
            &base,
            WORKBOOKS_API_VERSION,
            &[("category", "sentinel"), ("canFetchContent", "false")],
        )
    }

    fn deployment_url(&self, name: &str) -> CatalogResult<Url> {
        let base = format!(
            "{}{}/providers/Microsoft.Resources/deployments/{}",
            self.session.arm_endpoint,
            self.session.resource_group_id(),
            name
        );
        build_url(&base, DEPLOYMENTS_API_VERSION, &[])
    }

    /// Send one request and return the decoded body, if any.
    async fn send(&self, method: Method, url: Url, body: Option<&Value>) -> CatalogResult<Option<Value>> {
        debug!(method = %method, url = %url, "arm request");

        let mut request = self
            .http
            .request(method, url.clone())
            .bearer_auth(&self.session.access_token);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(error_from_response(status, url.path(), &text));
        }
        if text.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(&text)?))
    }

    async fn get_json(&self, url: Url) -> CatalogResult<Value> {
        self.send(Method::GET, url.clone(), None)
            .await?
            .ok_or_else(|| CatalogError::Decode {
                what: url.path().to_string(),
                detail: "empty response body".to_string(),
            })
    }

    /// GET a collection, following `nextLink` until exhausted.
    async fn get_paged(&self, url: Url) -> CatalogResult<Vec<Value>> {
        let mut items = Vec::new();
        let mut next = Some(url);

        while let Some(url) = next.take() {
            let page = self.get_json(url).await?;
            if let Some(values) = page.get("value").and_then(Value::as_array) {
                items.extend(values.iter().cloned());
            }
            next = match page.get("nextLink").and_then(Value::as_str) {
                Some(link) if !link.is_empty() => Some(parse_url(link)?),
                _ => None,
            };
        }

        Ok(items)
    }

    async fn delete(&self, url: Url) -> CatalogResult<()> {
        self.send(Method::DELETE, url, None).await.map(|_| ())
    }
}

#[async_trait]
impl CatalogClient for ArmCatalogClient {
    async fn list_catalog_solutions(&self) -> CatalogResult<Vec<SolutionEntry>> {
        let url = self.sentinel_url(
            "contentProductPackages",
            &[("$filter", "properties/contentKind eq 'Solution'")],
        )?;
        let items = self.get_paged(url).await?;
        Ok(items.iter().filter_map(decode_solution).collect())
    }

    async fn get_solution_detail(&self, id: &str) -> CatalogResult<Value> {
        let url = self.sentinel_url(&format!("contentProductPackages/{id}"), &[])?;
        let item = self.get_json(url).await?;
        item.pointer("/properties/packagedContent")
            .cloned()
            .ok_or_else(|| CatalogError::Decode {
                what: format!("solution {id}"),
                detail: "missing properties.packagedContent".to_string(),
            })
    }

    async fn list_installed_solution_packages(&self) -> CatalogResult<Vec<InstalledSolution>> {
        let url = self.sentinel_url("contentPackages", &[])?;
        let items = self.get_paged(url).await?;
        Ok(items.iter().filter_map(decode_installed_solution).collect())
    }

    async fn install_or_update_solution(
        &self,
        id: &str,
        packaged_content: &Value,
        params: &WorkspaceParams,
    ) -> CatalogResult<()> {
        let url = self.deployment_url(&deployment_name(id))?;
        let body = json!({
            "properties": {
                "mode": "Incremental",
                "template": packaged_content,
                "parameters": {
                    "workspace": { "value": params.workspace_name },
                    "workspace-location": { "value": params.location },
                },
            }
        });
        self.send(Method::PUT, url, Some(&body)).await.map(|_| ())
    }

    async fn list_rule_templates(
        &self,
        severity_filter: Option<&[Severity]>,
    ) -> CatalogResult<Vec<RuleTemplateEntry>> {
        let url = self.sentinel_url(
            "contentTemplates",
            &[
                ("$filter", "properties/contentKind eq 'AnalyticsRule'"),
                ("$expand", "properties/mainTemplate"),
            ],
        )?;
        let items = self.get_paged(url).await?;
        let templates = items
            .iter()
            .filter_map(decode_rule_template)
            .filter(|t| match (severity_filter, t.severity) {
                (Some(wanted), Some(sev)) => wanted.contains(&sev),
                (Some(_), None) => false,
                (None, _) => true,
            })
            .collect();
        Ok(templates)
    }

    async fn list_installed_rules(&self) -> CatalogResult<Vec<InstalledRule>> {
        let url = self.sentinel_url("alertRules", &[])?;
        let items = self.get_paged(url).await?;
        Ok(items.iter().filter_map(decode_installed_rule).collect())
    }

    async fn put_rule(
        &self,
        id: &str,
        kind: &str,
        properties: &Value,
    ) -> CatalogResult<InstalledRuleRef> {
        let url = self.sentinel_url(&format!("alertRules/{id}"), &[])?;
        let body = json!({ "kind": kind, "properties": properties });
        let response = self.send(Method::PUT, url, Some(&body)).await?;

        let fallback_id = format!("{}/alertRules/{}", self.session.security_insights_scope(), id);
        let resource_id = response
            .as_ref()
            .and_then(|v| str_field(v, "id"))
            .unwrap_or(fallback_id);
        let name = response
            .as_ref()
            .and_then(|v| str_field(v, "name"))
            .unwrap_or_else(|| id.to_string());
        Ok(InstalledRuleRef { name, resource_id })
    }

    async fn put_rule_metadata(
        &self,
        rule_name: &str,
        source: &SourceRef,
        template_version: Option<&str>,
    ) -> CatalogResult<()> {
        let url = self.sentinel_url(&format!("metadata/analyticsrule-{rule_name}"), &[])?;
        let parent_id = format!(
            "{}/alertRules/{}",
            self.session.security_insights_scope(),
            rule_name
        );
        let body = json!({
            "properties": {
                "contentId": source.content_id,
                "parentId": parent_id,
                "kind": "AnalyticsRule",
                "version": template_version,
                "source": source_json(source),
            }
        });
        self.send(Method::PUT, url, Some(&body)).await.map(|_| ())
    }

    async fn list_workbook_templates(&self) -> CatalogResult<Vec<WorkbookTemplateEntry>> {
        let url = self.sentinel_url(
            "contentTemplates",
            &[("$filter", "properties/contentKind eq 'Workbook'")],
        )?;
        let items = self.get_paged(url).await?;
        Ok(items.iter().filter_map(decode_workbook_template).collect())
    }

    async fn list_installed_workbook_metadata(
        &self,
    ) -> CatalogResult<Vec<InstalledWorkbookMetadata>> {
        let url = self.sentinel_url("metadata", &[("$filter", "properties/kind eq 'Workbook'")])?;
        let items = self.get_paged(url).await?;
        let mut metadata: Vec<_> = items.iter().filter_map(decode_installed_workbook).collect();

        // Metadata records carry no display name; it lives on the workbook.
        let workbooks = self.get_paged(self.workbooks_url()?).await?;
        attach_workbook_names(&mut metadata, &decode_workbook_names(&workbooks));
        Ok(metadata)
    }

    async fn get_workbook_template_detail(
        &self,
        id: &str,
    ) -> CatalogResult<WorkbookTemplateDetail> {
        let url = self.sentinel_url(&format!("contentTemplates/{id}"), &[])?;
        let item = self.get_json(url).await?;
        decode_workbook_detail(&item).ok_or_else(|| CatalogError::Decode {
            what: format!("workbook template {id}"),
            detail: "no Microsoft.Insights/workbooks resource in mainTemplate".to_string(),
        })
    }

    async fn put_workbook(&self, id: &str, payload: &Value, location: &str) -> CatalogResult<()> {
        let url = self.workbook_url(id)?;
        let mut body = payload.clone();
        if let Some(obj) = body.as_object_mut() {
            obj.insert("location".to_string(), json!(location));
        }
        self.send(Method::PUT, url, Some(&body)).await.map(|_| ())
    }

    async fn delete_workbook(&self, id: &str) -> CatalogResult<()> {
        self.delete(self.workbook_url(id)?).await
    }

    async fn delete_workbook_metadata(&self, id: &str) -> CatalogResult<()> {
        self.delete(self.sentinel_url(&format!("metadata/{id}"), &[])?)
            .await
    }

    async fn put_workbook_metadata(&self, id: &str, payload: &Value) -> CatalogResult<()> {
        let url = self.sentinel_url(&format!("metadata/{id}"), &[])?;
        self.send(Method::PUT, url, Some(payload)).await.map(|_| ())
    }
}

// ---------------------------------------------------------------------------
// URL and error helpers
// ---------------------------------------------------------------------------

fn parse_url(raw: &str) -> CatalogResult<Url> {
    Url::parse(raw).map_err(|e| CatalogError::Transport(format!("invalid url {raw}: {e}")))
}

fn build_url(base: &str, api_version: &str, query: &[(&str, &str)]) -> CatalogResult<Url> {
    let mut url = parse_url(base)?;
    {
        let mut pairs = url.query_pairs_mut();
        pairs.append_pair("api-version", api_version);
        for (k, v) in query {
            pairs.append_pair(k, v);
        }
    }
    Ok(url)
}

/// Map a non-success response onto the error taxonomy.
fn error_from_response(status: StatusCode, path: &str, body: &str) -> CatalogError {
    if status == StatusCode::NOT_FOUND {
        return CatalogError::NotFound(path.to_string());
    }
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return CatalogError::Transport(format!("authentication failed ({status}) for {path}"));
    }

    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let error = parsed.as_ref().and_then(|v| v.get("error"));
    let code = error
        .and_then(|e| str_field(e, "code"))
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("Unknown").to_string());
    let message = error
        .and_then(|e| str_field(e, "message"))
        .unwrap_or_else(|| body.trim().to_string());

    if status.is_server_error() && error.is_none() {
        warn!(status = %status, path = %path, "server error without structured body");
        return CatalogError::Transport(format!("server error ({status}) for {path}: {message}"));
    }

    CatalogError::Application {
        status: status.as_u16(),
        code,
        message,
    }
}

/// Deployment names are limited to 64 characters of `[-\w._()]`.
fn deployment_name(id: &str) -> String {
    let cleaned: String = id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '(' | ')') {
                c
            } else {
                '-'
            }
        })
        .collect();
    let mut name = format!("sentinel-sync-{cleaned}");
    name.truncate(MAX_DEPLOYMENT_NAME);
    name
}

fn source_json(source: &SourceRef) -> Value {
    json!({
        "kind": "Solution",
        "name": source.solution_name,
        "sourceId": source.package_id,
    })
}

// ---------------------------------------------------------------------------
// Decoders
// ---------------------------------------------------------------------------

/// Read a string field, accepting numbers as well (versions are sometimes
/// published as JSON numbers).
fn str_field(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn properties(item: &Value) -> Option<&Value> {
    item.get("properties").filter(|p| p.is_object())
}

fn type_ends_with(resource: &Value, suffix: &str) -> bool {
    resource
        .get("type")
        .and_then(Value::as_str)
        .map(|t| t.to_ascii_lowercase().ends_with(&suffix.to_ascii_lowercase()))
        .unwrap_or(false)
}

fn main_template_resources(props: &Value) -> Vec<Value> {
    props
        .pointer("/mainTemplate/resources")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

pub(crate) fn decode_solution(item: &Value) -> Option<SolutionEntry> {
    let props = properties(item)?;
    if let Some(kind) = props.get("contentKind").and_then(Value::as_str) {
        if kind != "Solution" {
            return None;
        }
    }
    let id = str_field(item, "name")?;
    Some(SolutionEntry {
        content_id: str_field(props, "contentId").unwrap_or_else(|| id.clone()),
        display_name: str_field(props, "displayName")?,
        version: str_field(props, "version"),
        packaged_content: props.get("packagedContent").cloned(),
        id,
    })
}

pub(crate) fn decode_installed_solution(item: &Value) -> Option<InstalledSolution> {
    let props = properties(item)?;
    Some(InstalledSolution {
        display_name: str_field(props, "displayName")?,
        version: str_field(props, "version"),
    })
}

pub(crate) fn decode_rule_template(item: &Value) -> Option<RuleTemplateEntry> {
    let props = properties(item)?;
    let rule = main_template_resources(props)
        .into_iter()
        .find(|r| type_ends_with(r, "alertRules"))?;
    let rule_properties = rule.get("properties").cloned().unwrap_or_else(|| json!({}));

    let display_name = str_field(props, "displayName")
        .or_else(|| str_field(&rule_properties, "displayName"))?;
    let severity = rule_properties
        .get("severity")
        .and_then(Value::as_str)
        .and_then(|s| s.parse().ok());

    Some(RuleTemplateEntry {
        id: str_field(props, "contentId").or_else(|| str_field(item, "name"))?,
        package_id: str_field(props, "packageId"),
        package_name: str_field(props, "packageName"),
        package_version: str_field(props, "packageVersion"),
        display_name,
        severity,
        template_version: str_field(props, "version"),
        rule_kind: str_field(&rule, "kind").unwrap_or_else(|| "Scheduled".to_string()),
        rule_properties,
    })
}

pub(crate) fn decode_installed_rule(item: &Value) -> Option<InstalledRule> {
    let props = properties(item)?;
    Some(InstalledRule {
        id: str_field(item, "name")?,
        display_name: str_field(props, "displayName").unwrap_or_default(),
        alert_rule_template_name: str_field(props, "alertRuleTemplateName"),
        template_version: str_field(props, "templateVersion"),
        kind: str_field(item, "kind").unwrap_or_else(|| "Scheduled".to_string()),
        properties: props.clone(),
    })
}

pub(crate) fn decode_workbook_template(item: &Value) -> Option<WorkbookTemplateEntry> {
    let props = properties(item)?;
    let id = str_field(item, "name")?;
    Some(WorkbookTemplateEntry {
        content_id: str_field(props, "contentId").unwrap_or_else(|| id.clone()),
        package_id: str_field(props, "packageId"),
        package_name: str_field(props, "packageName"),
        package_version: str_field(props, "packageVersion"),
        display_name: str_field(props, "displayName")?,
        version: str_field(props, "version"),
        id,
    })
}

pub(crate) fn decode_installed_workbook(item: &Value) -> Option<InstalledWorkbookMetadata> {
    let props = properties(item)?;
    Some(InstalledWorkbookMetadata {
        id: str_field(item, "name")?,
        content_id: str_field(props, "contentId"),
        display_name: None,
        version: str_field(props, "version"),
        parent_id: str_field(props, "parentId"),
    })
}

/// Workbook resource name (lowercased) to its display name.
pub(crate) fn decode_workbook_names(items: &[Value]) -> HashMap<String, String> {
    items
        .iter()
        .filter_map(|item| {
            let name = str_field(item, "name")?;
            let display_name = str_field(properties(item)?, "displayName")?;
            Some((name.to_ascii_lowercase(), display_name))
        })
        .collect()
}

/// Fill each record's display name from the workbook its `parentId` points
/// at. Records whose workbook is gone keep no name.
pub(crate) fn attach_workbook_names(
    metadata: &mut [InstalledWorkbookMetadata],
    names: &HashMap<String, String>,
) {
    for record in metadata.iter_mut() {
        record.display_name = record
            .workbook_name()
            .and_then(|name| names.get(&name.to_ascii_lowercase()))
            .cloned();
    }
}

pub(crate) fn decode_workbook_detail(item: &Value) -> Option<WorkbookTemplateDetail> {
    let props = properties(item)?;
    let resources = main_template_resources(props);
    let workbook = resources
        .iter()
        .find(|r| type_ends_with(r, "Microsoft.Insights/workbooks"))?
        .clone();
    let metadata = resources
        .iter()
        .find(|r| type_ends_with(r, "/metadata"))
        .cloned();
    Some(WorkbookTemplateDetail { workbook, metadata })
}
