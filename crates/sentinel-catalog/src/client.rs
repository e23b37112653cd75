//! The catalog client contract
//!
//! [`CatalogClient`] is the only way the reconciliation core talks to the
//! outside world. It performs reads and writes and nothing else: no
//! filtering beyond what the endpoint offers, no classification, no retries.
//!
//! An HTTP implementation lives in [`crate::arm`]; an in-memory fake for
//! tests lives in [`crate::fakes`].

use async_trait::async_trait;
use serde_json::Value;

use crate::error::CatalogError;
use crate::types::*;

/// Result type for catalog operations
pub type CatalogResult<T> = std::result::Result<T, CatalogError>;

/// Reads and writes against the content catalog and the target workspace.
#[async_trait]
pub trait CatalogClient: Send + Sync {
    // -- solutions ---------------------------------------------------------

    /// List solution packages available in the catalog.
    async fn list_catalog_solutions(&self) -> CatalogResult<Vec<SolutionEntry>>;

    /// Fetch the packaged ARM template of a catalog solution.
    async fn get_solution_detail(&self, id: &str) -> CatalogResult<Value>;

    /// List solution packages installed in the workspace.
    async fn list_installed_solution_packages(&self) -> CatalogResult<Vec<InstalledSolution>>;

    /// Deploy a solution's packaged content into the workspace.
    async fn install_or_update_solution(
        &self,
        id: &str,
        packaged_content: &Value,
        params: &WorkspaceParams,
    ) -> CatalogResult<()>;

    // -- analytics rules ---------------------------------------------------

    /// List analytics rule templates, optionally restricted to severities.
    async fn list_rule_templates(
        &self,
        severity_filter: Option<&[Severity]>,
    ) -> CatalogResult<Vec<RuleTemplateEntry>>;

    /// List analytics rules present in the workspace.
    async fn list_installed_rules(&self) -> CatalogResult<Vec<InstalledRule>>;

    /// Create or replace the rule `id`.
    async fn put_rule(&self, id: &str, kind: &str, properties: &Value)
        -> CatalogResult<InstalledRuleRef>;

    /// Write the metadata record linking rule `rule_name` to its source.
    async fn put_rule_metadata(
        &self,
        rule_name: &str,
        source: &SourceRef,
        template_version: Option<&str>,
    ) -> CatalogResult<()>;

    // -- workbooks ---------------------------------------------------------

    /// List workbook templates available in the catalog.
    async fn list_workbook_templates(&self) -> CatalogResult<Vec<WorkbookTemplateEntry>>;

    /// List workbook metadata records present in the workspace.
    async fn list_installed_workbook_metadata(
        &self,
    ) -> CatalogResult<Vec<InstalledWorkbookMetadata>>;

    /// Fetch the deployable resources of a workbook template.
    async fn get_workbook_template_detail(&self, id: &str)
        -> CatalogResult<WorkbookTemplateDetail>;

    /// Create or replace workbook `id` in `location`.
    async fn put_workbook(&self, id: &str, payload: &Value, location: &str) -> CatalogResult<()>;

    /// Delete workbook `id`. Returns [`CatalogError::NotFound`] if absent.
    async fn delete_workbook(&self, id: &str) -> CatalogResult<()>;

    /// Delete metadata record `id`. Returns [`CatalogError::NotFound`] if absent.
    async fn delete_workbook_metadata(&self, id: &str) -> CatalogResult<()>;

    /// Create or replace workbook metadata record `id`.
    async fn put_workbook_metadata(&self, id: &str, payload: &Value) -> CatalogResult<()>;
}
