//! Catalog entry and installed-resource types
//!
//! Every shape the remote API returns is resolved into one of these structs
//! at the client boundary. Optional fields are explicit; nothing downstream
//! probes raw JSON to find out what kind of entry it is holding.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Solutions
// ---------------------------------------------------------------------------

/// A solution package offered by the content catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolutionEntry {
    /// Catalog resource name used to fetch detail and install.
    pub id: String,
    /// Package identifier referenced by rule and workbook templates.
    pub content_id: String,
    pub display_name: String,
    pub version: Option<String>,
    /// ARM template for the package. Usually absent from list responses.
    pub packaged_content: Option<Value>,
}

/// A solution package already installed in the workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledSolution {
    pub display_name: String,
    pub version: Option<String>,
}

// ---------------------------------------------------------------------------
// Analytics rules
// ---------------------------------------------------------------------------

/// Alert severity of an analytics rule template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Informational,
    Low,
    Medium,
    High,
}

impl Severity {
    pub const ALL: [Severity; 4] = [
        Severity::Informational,
        Severity::Low,
        Severity::Medium,
        Severity::High,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Informational => "Informational",
            Severity::Low => "Low",
            Severity::Medium => "Medium",
            Severity::High => "High",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Severity::ALL
            .into_iter()
            .find(|sev| sev.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown severity: {s}"))
    }
}

/// An analytics rule template shipped inside a solution package.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleTemplateEntry {
    /// Template content id; installed rules point at it through
    /// `alertRuleTemplateName`.
    pub id: String,
    pub package_id: Option<String>,
    pub package_name: Option<String>,
    pub package_version: Option<String>,
    pub display_name: String,
    pub severity: Option<Severity>,
    pub template_version: Option<String>,
    /// Rule kind as the write API expects it (`Scheduled`, `NRT`, ...).
    pub rule_kind: String,
    /// Rule `properties` object taken from the template's main resource.
    pub rule_properties: Value,
}

/// An analytics rule already present in the workspace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstalledRule {
    /// Rule resource name.
    pub id: String,
    pub display_name: String,
    pub alert_rule_template_name: Option<String>,
    pub template_version: Option<String>,
    pub kind: String,
    pub properties: Value,
}

/// Reference to a rule written by [`put_rule`](crate::CatalogClient::put_rule).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledRuleRef {
    /// Rule resource name.
    pub name: String,
    /// Full resource id of the rule.
    pub resource_id: String,
}

/// Where a piece of installed content came from.
///
/// Written into the companion metadata record so the content hub can link the
/// installed resource back to its solution and template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    /// Content id of the template the resource was built from.
    pub content_id: String,
    pub solution_name: Option<String>,
    pub package_id: Option<String>,
    pub package_version: Option<String>,
}

// ---------------------------------------------------------------------------
// Workbooks
// ---------------------------------------------------------------------------

/// A workbook template shipped inside a solution package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkbookTemplateEntry {
    /// Template resource name used to fetch detail.
    pub id: String,
    /// Content id; installed metadata records point at it.
    pub content_id: String,
    pub package_id: Option<String>,
    pub package_name: Option<String>,
    pub package_version: Option<String>,
    pub display_name: String,
    pub version: Option<String>,
}

/// A workbook metadata record already present in the workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledWorkbookMetadata {
    /// Metadata resource name.
    pub id: String,
    pub content_id: Option<String>,
    pub display_name: Option<String>,
    pub version: Option<String>,
    /// Resource id of the workbook this record describes.
    pub parent_id: Option<String>,
}

impl InstalledWorkbookMetadata {
    /// Name of the linked workbook resource, taken from `parent_id`.
    pub fn workbook_name(&self) -> Option<&str> {
        self.parent_id
            .as_deref()
            .and_then(|id| id.rsplit('/').next())
            .filter(|name| !name.is_empty())
    }
}

/// Deployable resources extracted from a workbook template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkbookTemplateDetail {
    /// The `Microsoft.Insights/workbooks` resource.
    pub workbook: Value,
    /// The companion metadata resource, when the template carries one.
    pub metadata: Option<Value>,
}

// ---------------------------------------------------------------------------
// Target workspace
// ---------------------------------------------------------------------------

/// Workspace parameters handed to solution installs and workbook writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceParams {
    pub workspace_name: String,
    pub location: String,
    /// Full resource id of the Log Analytics workspace.
    pub workspace_resource_id: String,
}
