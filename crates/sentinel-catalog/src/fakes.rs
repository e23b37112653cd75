//! In-memory fake catalog (testing only)
//!
//! `MemoryCatalog` satisfies the [`CatalogClient`] contract without any
//! network access. Writes are applied to the fake's installed state so a
//! second reconciliation run sees the result of the first, every write is
//! recorded for assertions, and failures can be injected per operation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::time::Instant;

use crate::arm::attach_workbook_names;
use crate::client::{CatalogClient, CatalogResult};
use crate::error::CatalogError;
use crate::types::*;

/// Catalog operations, used to target injected failures and to label the
/// write log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    ListCatalogSolutions,
    GetSolutionDetail,
    ListInstalledSolutions,
    InstallSolution,
    ListRuleTemplates,
    ListInstalledRules,
    PutRule,
    PutRuleMetadata,
    ListWorkbookTemplates,
    ListInstalledWorkbookMetadata,
    GetWorkbookTemplateDetail,
    PutWorkbook,
    DeleteWorkbook,
    DeleteWorkbookMetadata,
    PutWorkbookMetadata,
}

/// One recorded write.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteRecord {
    pub op: Operation,
    /// Resource id or name the write targeted.
    pub target: String,
    pub payload: Value,
    /// When the write was applied, on the tokio clock.
    pub at: Instant,
}

#[derive(Debug, Default)]
struct State {
    solutions: Vec<SolutionEntry>,
    solution_details: HashMap<String, Value>,
    installed_solutions: Vec<InstalledSolution>,
    rule_templates: Vec<RuleTemplateEntry>,
    installed_rules: Vec<InstalledRule>,
    workbook_templates: Vec<WorkbookTemplateEntry>,
    workbook_details: HashMap<String, WorkbookTemplateDetail>,
    installed_workbook_metadata: Vec<InstalledWorkbookMetadata>,
    workbooks: HashMap<String, Value>,
    failures: HashMap<(Operation, Option<String>), CatalogError>,
    writes: Vec<WriteRecord>,
}

/// In-memory catalog and workspace.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    state: Mutex<State>,
    install_delay: Mutex<Option<Duration>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    // -- seeding -----------------------------------------------------------

    /// Offer a solution in the catalog, with the packaged content returned
    /// by `get_solution_detail`.
    pub fn add_catalog_solution(&self, entry: SolutionEntry, packaged_content: Value) {
        let mut state = self.state.lock().unwrap();
        state
            .solution_details
            .insert(entry.id.clone(), packaged_content);
        state.solutions.push(entry);
    }

    pub fn add_installed_solution(&self, installed: InstalledSolution) {
        self.state
            .lock()
            .unwrap()
            .installed_solutions
            .push(installed);
    }

    pub fn add_rule_template(&self, template: RuleTemplateEntry) {
        self.state.lock().unwrap().rule_templates.push(template);
    }

    pub fn add_installed_rule(&self, rule: InstalledRule) {
        self.state.lock().unwrap().installed_rules.push(rule);
    }

    pub fn add_workbook_template(&self, template: WorkbookTemplateEntry, detail: WorkbookTemplateDetail) {
        let mut state = self.state.lock().unwrap();
        state.workbook_details.insert(template.id.clone(), detail);
        state.workbook_templates.push(template);
    }

    pub fn add_installed_workbook(&self, metadata: InstalledWorkbookMetadata, workbook: Value) {
        let mut state = self.state.lock().unwrap();
        if let Some(name) = metadata.workbook_name() {
            state.workbooks.insert(name.to_string(), workbook);
        }
        state.installed_workbook_metadata.push(InstalledWorkbookMetadata {
            display_name: None,
            ..metadata
        });
    }

    // -- failure injection -------------------------------------------------

    /// Fail every call of `op`.
    pub fn fail(&self, op: Operation, error: CatalogError) {
        self.state
            .lock()
            .unwrap()
            .failures
            .insert((op, None), error);
    }

    /// Fail calls of `op` that target `key` (resource id, name or solution id).
    pub fn fail_for(&self, op: Operation, key: &str, error: CatalogError) {
        self.state
            .lock()
            .unwrap()
            .failures
            .insert((op, Some(key.to_string())), error);
    }

    /// Make every solution install take `delay`, to observe concurrency.
    pub fn set_install_delay(&self, delay: Duration) {
        *self.install_delay.lock().unwrap() = Some(delay);
    }

    // -- inspection --------------------------------------------------------

    pub fn writes(&self) -> Vec<WriteRecord> {
        self.state.lock().unwrap().writes.clone()
    }

    pub fn writes_for(&self, op: Operation) -> Vec<WriteRecord> {
        self.writes().into_iter().filter(|w| w.op == op).collect()
    }

    pub fn clear_writes(&self) {
        self.state.lock().unwrap().writes.clear();
    }

    pub fn installed_solutions(&self) -> Vec<InstalledSolution> {
        self.state.lock().unwrap().installed_solutions.clone()
    }

    pub fn installed_rules(&self) -> Vec<InstalledRule> {
        self.state.lock().unwrap().installed_rules.clone()
    }

    /// Workbook metadata as listed, with names joined from the workbooks.
    pub fn installed_workbook_metadata(&self) -> Vec<InstalledWorkbookMetadata> {
        Self::listed_workbook_metadata(&self.state.lock().unwrap())
    }

    pub fn workbook(&self, id: &str) -> Option<Value> {
        self.state.lock().unwrap().workbooks.get(id).cloned()
    }

    /// Highest number of solution installs observed running at once.
    pub fn max_concurrent_installs(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn check(state: &State, op: Operation, key: Option<&str>) -> CatalogResult<()> {
        if let Some(err) = state.failures.get(&(op, None)) {
            return Err(err.clone());
        }
        if let Some(key) = key {
            if let Some(err) = state.failures.get(&(op, Some(key.to_string()))) {
                return Err(err.clone());
            }
        }
        Ok(())
    }

    /// Stored records hold no display name, like the remote metadata
    /// schema; it is joined from the workbook resources on every listing.
    fn listed_workbook_metadata(state: &State) -> Vec<InstalledWorkbookMetadata> {
        let names: HashMap<String, String> = state
            .workbooks
            .iter()
            .filter_map(|(id, wb)| Some((id.to_ascii_lowercase(), prop_str(wb, "displayName")?)))
            .collect();
        let mut metadata = state.installed_workbook_metadata.clone();
        attach_workbook_names(&mut metadata, &names);
        metadata
    }

    fn record(state: &mut State, op: Operation, target: &str, payload: Value) {
        state.writes.push(WriteRecord {
            op,
            target: target.to_string(),
            payload,
            at: Instant::now(),
        });
    }
}

fn prop_str(value: &Value, key: &str) -> Option<String> {
    value
        .pointer(&format!("/properties/{key}"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[async_trait]
impl CatalogClient for MemoryCatalog {
    async fn list_catalog_solutions(&self) -> CatalogResult<Vec<SolutionEntry>> {
        let state = self.state.lock().unwrap();
        Self::check(&state, Operation::ListCatalogSolutions, None)?;
        // List responses never carry packaged content.
        Ok(state
            .solutions
            .iter()
            .cloned()
            .map(|mut s| {
                s.packaged_content = None;
                s
            })
            .collect())
    }

    async fn get_solution_detail(&self, id: &str) -> CatalogResult<Value> {
        let state = self.state.lock().unwrap();
        Self::check(&state, Operation::GetSolutionDetail, Some(id))?;
        state
            .solution_details
            .get(id)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(id.to_string()))
    }

    async fn list_installed_solution_packages(&self) -> CatalogResult<Vec<InstalledSolution>> {
        let state = self.state.lock().unwrap();
        Self::check(&state, Operation::ListInstalledSolutions, None)?;
        Ok(state.installed_solutions.clone())
    }

    async fn install_or_update_solution(
        &self,
        id: &str,
        packaged_content: &Value,
        params: &WorkspaceParams,
    ) -> CatalogResult<()> {
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);

        let delay = *self.install_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let result = {
            let mut state = self.state.lock().unwrap();
            Self::check(&state, Operation::InstallSolution, Some(id)).map(|_| {
                let entry = state.solutions.iter().find(|s| s.id == id).cloned();
                if let Some(entry) = entry {
                    state
                        .installed_solutions
                        .retain(|s| s.display_name != entry.display_name);
                    state.installed_solutions.push(InstalledSolution {
                        display_name: entry.display_name,
                        version: entry.version,
                    });
                }
                Self::record(
                    &mut state,
                    Operation::InstallSolution,
                    id,
                    json!({ "template": packaged_content, "workspace": params.workspace_name }),
                );
            })
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn list_rule_templates(
        &self,
        severity_filter: Option<&[Severity]>,
    ) -> CatalogResult<Vec<RuleTemplateEntry>> {
        let state = self.state.lock().unwrap();
        Self::check(&state, Operation::ListRuleTemplates, None)?;
        Ok(state
            .rule_templates
            .iter()
            .filter(|t| match (severity_filter, t.severity) {
                (Some(wanted), Some(sev)) => wanted.contains(&sev),
                (Some(_), None) => false,
                (None, _) => true,
            })
            .cloned()
            .collect())
    }

    async fn list_installed_rules(&self) -> CatalogResult<Vec<InstalledRule>> {
        let state = self.state.lock().unwrap();
        Self::check(&state, Operation::ListInstalledRules, None)?;
        Ok(state.installed_rules.clone())
    }

    async fn put_rule(
        &self,
        id: &str,
        kind: &str,
        properties: &Value,
    ) -> CatalogResult<InstalledRuleRef> {
        let mut state = self.state.lock().unwrap();
        let display_name = properties
            .get("displayName")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        Self::check(&state, Operation::PutRule, Some(id))?;
        Self::check(&state, Operation::PutRule, Some(display_name.as_str()))?;

        let rule = InstalledRule {
            id: id.to_string(),
            display_name,
            alert_rule_template_name: properties
                .get("alertRuleTemplateName")
                .and_then(Value::as_str)
                .map(str::to_string),
            template_version: properties
                .get("templateVersion")
                .and_then(Value::as_str)
                .map(str::to_string),
            kind: kind.to_string(),
            properties: properties.clone(),
        };
        state.installed_rules.retain(|r| r.id != id);
        state.installed_rules.push(rule);
        Self::record(
            &mut state,
            Operation::PutRule,
            id,
            json!({ "kind": kind, "properties": properties }),
        );

        Ok(InstalledRuleRef {
            name: id.to_string(),
            resource_id: format!("/fake/alertRules/{id}"),
        })
    }

    async fn put_rule_metadata(
        &self,
        rule_name: &str,
        source: &SourceRef,
        template_version: Option<&str>,
    ) -> CatalogResult<()> {
        let mut state = self.state.lock().unwrap();
        Self::check(&state, Operation::PutRuleMetadata, Some(rule_name))?;
        Self::record(
            &mut state,
            Operation::PutRuleMetadata,
            rule_name,
            json!({
                "contentId": source.content_id,
                "solutionName": source.solution_name,
                "packageId": source.package_id,
                "version": template_version,
            }),
        );
        Ok(())
    }

    async fn list_workbook_templates(&self) -> CatalogResult<Vec<WorkbookTemplateEntry>> {
        let state = self.state.lock().unwrap();
        Self::check(&state, Operation::ListWorkbookTemplates, None)?;
        Ok(state.workbook_templates.clone())
    }

    async fn list_installed_workbook_metadata(
        &self,
    ) -> CatalogResult<Vec<InstalledWorkbookMetadata>> {
        let state = self.state.lock().unwrap();
        Self::check(&state, Operation::ListInstalledWorkbookMetadata, None)?;
        Ok(Self::listed_workbook_metadata(&state))
    }

    async fn get_workbook_template_detail(
        &self,
        id: &str,
    ) -> CatalogResult<WorkbookTemplateDetail> {
        let state = self.state.lock().unwrap();
        Self::check(&state, Operation::GetWorkbookTemplateDetail, Some(id))?;
        state
            .workbook_details
            .get(id)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(id.to_string()))
    }

    async fn put_workbook(&self, id: &str, payload: &Value, location: &str) -> CatalogResult<()> {
        let mut state = self.state.lock().unwrap();
        Self::check(&state, Operation::PutWorkbook, Some(id))?;
        if let Some(name) = prop_str(payload, "displayName") {
            Self::check(&state, Operation::PutWorkbook, Some(name.as_str()))?;
        }
        let mut stored = payload.clone();
        if let Some(obj) = stored.as_object_mut() {
            obj.insert("location".to_string(), json!(location));
        }
        state.workbooks.insert(id.to_string(), stored.clone());
        Self::record(&mut state, Operation::PutWorkbook, id, stored);
        Ok(())
    }

    async fn delete_workbook(&self, id: &str) -> CatalogResult<()> {
        let mut state = self.state.lock().unwrap();
        Self::check(&state, Operation::DeleteWorkbook, Some(id))?;
        if state.workbooks.remove(id).is_none() {
            return Err(CatalogError::NotFound(id.to_string()));
        }
        Self::record(&mut state, Operation::DeleteWorkbook, id, Value::Null);
        Ok(())
    }

    async fn delete_workbook_metadata(&self, id: &str) -> CatalogResult<()> {
        let mut state = self.state.lock().unwrap();
        Self::check(&state, Operation::DeleteWorkbookMetadata, Some(id))?;
        let before = state.installed_workbook_metadata.len();
        state.installed_workbook_metadata.retain(|m| m.id != id);
        if state.installed_workbook_metadata.len() == before {
            return Err(CatalogError::NotFound(id.to_string()));
        }
        Self::record(&mut state, Operation::DeleteWorkbookMetadata, id, Value::Null);
        Ok(())
    }

    async fn put_workbook_metadata(&self, id: &str, payload: &Value) -> CatalogResult<()> {
        let mut state = self.state.lock().unwrap();
        Self::check(&state, Operation::PutWorkbookMetadata, Some(id))?;

        let record = InstalledWorkbookMetadata {
            id: id.to_string(),
            content_id: prop_str(payload, "contentId"),
            display_name: None,
            version: prop_str(payload, "version"),
            parent_id: prop_str(payload, "parentId"),
        };
        state.installed_workbook_metadata.retain(|m| m.id != id);
        state.installed_workbook_metadata.push(record);
        Self::record(&mut state, Operation::PutWorkbookMetadata, id, payload.clone());
        Ok(())
    }
}
