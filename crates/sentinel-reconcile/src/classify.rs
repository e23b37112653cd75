//! Resource classification
//!
//! One algorithm, three resource kinds. Each catalog entry type implements
//! [`Classifiable`] to say how its display name, matching key and version are
//! read and how its installed counterpart exposes the same fields;
//! [`classify`] does the rest.
//!
//! Classification is pure: the same entry and installed snapshot always yield
//! the same [`ResourceStatus`]. Policy flags are not visible here.

use sentinel_catalog::{
    InstalledRule, InstalledSolution, InstalledWorkbookMetadata, RuleTemplateEntry, SolutionEntry,
    WorkbookTemplateEntry,
};
use serde::{Deserialize, Serialize};

use crate::patterns::{is_deprecated, is_preview};
use crate::version::{versions_differ, VersionDelta};

/// The three kinds of content this crate reconciles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Solution,
    Rule,
    Workbook,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ResourceKind::Solution => "solution",
            ResourceKind::Rule => "rule",
            ResourceKind::Workbook => "workbook",
        };
        f.write_str(s)
    }
}

/// Classification result.
///
/// Solutions use `NotInstalled`, `Installed`, `NeedsUpdate` and `Special`.
/// Rules use `Missing`, `Current`, `NeedsUpdate`, `NameMatch` and
/// `Deprecated`. Workbooks use the rule states plus the two preview states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    NotInstalled,
    Installed,
    NeedsUpdate,
    /// Preview or deprecated solution; installed only when forced.
    Special,
    Missing,
    Current,
    /// Something with the same display name exists but is not linked to
    /// this template.
    NameMatch,
    Deprecated,
    PreviewMissing,
    PreviewCurrent,
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Status::NotInstalled => "not installed",
            Status::Installed => "installed",
            Status::NeedsUpdate => "needs update",
            Status::Special => "special",
            Status::Missing => "missing",
            Status::Current => "current",
            Status::NameMatch => "name match",
            Status::Deprecated => "deprecated",
            Status::PreviewMissing => "preview missing",
            Status::PreviewCurrent => "preview current",
        };
        f.write_str(s)
    }
}

/// The installed resource an entry was matched to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InstalledResource {
    Solution(InstalledSolution),
    Rule(InstalledRule),
    Workbook(InstalledWorkbookMetadata),
}

impl InstalledResource {
    pub fn as_rule(&self) -> Option<&InstalledRule> {
        match self {
            InstalledResource::Rule(rule) => Some(rule),
            _ => None,
        }
    }

    pub fn as_workbook(&self) -> Option<&InstalledWorkbookMetadata> {
        match self {
            InstalledResource::Workbook(meta) => Some(meta),
            _ => None,
        }
    }
}

/// Classification of one catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceStatus {
    pub kind: ResourceKind,
    pub display_name: String,
    /// Stable matching key of the entry.
    pub key: String,
    pub status: Status,
    /// Human-readable diagnostic.
    pub reason: String,
    pub matched: Option<InstalledResource>,
    pub delta: Option<VersionDelta>,
}

/// Accessors the classifier needs from a catalog entry kind.
pub trait Classifiable {
    type Installed;

    const KIND: ResourceKind;

    fn display_name(&self) -> &str;

    /// Stable identifier matched against [`Self::installed_key`].
    fn matching_key(&self) -> &str;

    fn available_version(&self) -> Option<&str>;

    fn installed_key(installed: &Self::Installed) -> Option<&str>;

    fn installed_name(installed: &Self::Installed) -> Option<&str>;

    fn installed_version(installed: &Self::Installed) -> Option<&str>;

    fn wrap(installed: &Self::Installed) -> InstalledResource;
}

impl Classifiable for SolutionEntry {
    type Installed = InstalledSolution;

    const KIND: ResourceKind = ResourceKind::Solution;

    fn display_name(&self) -> &str {
        &self.display_name
    }

    fn matching_key(&self) -> &str {
        &self.display_name
    }

    fn available_version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    fn installed_key(installed: &InstalledSolution) -> Option<&str> {
        Some(&installed.display_name)
    }

    fn installed_name(installed: &InstalledSolution) -> Option<&str> {
        Some(&installed.display_name)
    }

    fn installed_version(installed: &InstalledSolution) -> Option<&str> {
        installed.version.as_deref()
    }

    fn wrap(installed: &InstalledSolution) -> InstalledResource {
        InstalledResource::Solution(installed.clone())
    }
}

impl Classifiable for RuleTemplateEntry {
    type Installed = InstalledRule;

    const KIND: ResourceKind = ResourceKind::Rule;

    fn display_name(&self) -> &str {
        &self.display_name
    }

    fn matching_key(&self) -> &str {
        &self.id
    }

    fn available_version(&self) -> Option<&str> {
        self.template_version.as_deref()
    }

    fn installed_key(installed: &InstalledRule) -> Option<&str> {
        installed.alert_rule_template_name.as_deref()
    }

    fn installed_name(installed: &InstalledRule) -> Option<&str> {
        Some(&installed.display_name)
    }

    fn installed_version(installed: &InstalledRule) -> Option<&str> {
        installed.template_version.as_deref()
    }

    fn wrap(installed: &InstalledRule) -> InstalledResource {
        InstalledResource::Rule(installed.clone())
    }
}

impl Classifiable for WorkbookTemplateEntry {
    type Installed = InstalledWorkbookMetadata;

    const KIND: ResourceKind = ResourceKind::Workbook;

    fn display_name(&self) -> &str {
        &self.display_name
    }

    fn matching_key(&self) -> &str {
        &self.content_id
    }

    fn available_version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    fn installed_key(installed: &InstalledWorkbookMetadata) -> Option<&str> {
        installed.content_id.as_deref()
    }

    fn installed_name(installed: &InstalledWorkbookMetadata) -> Option<&str> {
        installed.display_name.as_deref()
    }

    fn installed_version(installed: &InstalledWorkbookMetadata) -> Option<&str> {
        installed.version.as_deref()
    }

    fn wrap(installed: &InstalledWorkbookMetadata) -> InstalledResource {
        InstalledResource::Workbook(installed.clone())
    }
}

/// Classify one catalog entry against the installed snapshot.
pub fn classify<E: Classifiable>(entry: &E, installed: &[E::Installed]) -> ResourceStatus {
    let kind = E::KIND;
    let name = entry.display_name();
    let key = entry.matching_key();
    let preview = kind == ResourceKind::Workbook && is_preview(name);

    let status = |status: Status, reason: String| ResourceStatus {
        kind,
        display_name: name.to_string(),
        key: key.to_string(),
        status,
        reason,
        matched: None,
        delta: None,
    };

    if kind == ResourceKind::Solution {
        if is_deprecated(name) {
            return status(Status::Special, "solution is marked deprecated".to_string());
        }
        if is_preview(name) {
            return status(Status::Special, "solution is marked preview".to_string());
        }
    } else if is_deprecated(name) {
        return status(Status::Deprecated, format!("{kind} is marked deprecated"));
    }

    let by_key = installed.iter().find(|i| {
        E::installed_key(i)
            .map(|k| k.eq_ignore_ascii_case(key))
            .unwrap_or(false)
    });

    let Some(found) = by_key else {
        if kind != ResourceKind::Solution {
            if let Some(same_name) = installed.iter().find(|i| E::installed_name(i) == Some(name)) {
                let mut result = status(
                    Status::NameMatch,
                    format!("an installed {kind} has the same display name but is not linked to {key}"),
                );
                result.matched = Some(E::wrap(same_name));
                return result;
            }
        }
        let absent = match kind {
            ResourceKind::Solution => Status::NotInstalled,
            _ if preview => Status::PreviewMissing,
            _ => Status::Missing,
        };
        return status(absent, format!("no installed {kind} matches {key}"));
    };

    let present = match kind {
        ResourceKind::Solution => Status::Installed,
        _ if preview => Status::PreviewCurrent,
        _ => Status::Current,
    };

    let mut result = match (E::installed_version(found), entry.available_version()) {
        (Some(installed_v), Some(available_v)) if versions_differ(installed_v, available_v) => {
            let mut r = status(
                Status::NeedsUpdate,
                format!("installed version {installed_v} differs from catalog version {available_v}"),
            );
            r.delta = Some(VersionDelta::new(installed_v, available_v));
            r
        }
        (Some(_), Some(available_v)) => {
            status(present, format!("installed version matches catalog version {available_v}"))
        }
        _ => status(present, "version unknown on one side; treated as current".to_string()),
    };
    result.matched = Some(E::wrap(found));
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn solution(name: &str, version: Option<&str>) -> SolutionEntry {
        SolutionEntry {
            id: format!("id-{name}"),
            content_id: format!("pkg-{name}"),
            display_name: name.to_string(),
            version: version.map(str::to_string),
            packaged_content: None,
        }
    }

    fn installed_solution(name: &str, version: Option<&str>) -> InstalledSolution {
        InstalledSolution {
            display_name: name.to_string(),
            version: version.map(str::to_string),
        }
    }

    fn rule_template(id: &str, name: &str, version: &str) -> RuleTemplateEntry {
        RuleTemplateEntry {
            id: id.to_string(),
            package_id: Some("pkg".to_string()),
            package_name: None,
            package_version: None,
            display_name: name.to_string(),
            severity: None,
            template_version: Some(version.to_string()),
            rule_kind: "Scheduled".to_string(),
            rule_properties: json!({}),
        }
    }

    fn installed_rule(id: &str, name: &str, template: Option<&str>, version: &str) -> InstalledRule {
        InstalledRule {
            id: id.to_string(),
            display_name: name.to_string(),
            alert_rule_template_name: template.map(str::to_string),
            template_version: Some(version.to_string()),
            kind: "Scheduled".to_string(),
            properties: json!({}),
        }
    }

    fn workbook(name: &str, version: &str) -> WorkbookTemplateEntry {
        WorkbookTemplateEntry {
            id: format!("tmpl-{name}"),
            content_id: format!("content-{name}"),
            package_id: Some("pkg".to_string()),
            package_name: None,
            package_version: None,
            display_name: name.to_string(),
            version: Some(version.to_string()),
        }
    }

    #[test]
    fn test_solution_version_inequality_needs_update() {
        let result = classify(
            &solution("Solution A", Some("2.0.0")),
            &[installed_solution("Solution A", Some("1.0.0"))],
        );
        assert_eq!(result.status, Status::NeedsUpdate);
        assert_eq!(result.delta, Some(VersionDelta::new("1.0.0", "2.0.0")));
        assert!(matches!(result.matched, Some(InstalledResource::Solution(_))));
    }

    #[test]
    fn test_solution_states() {
        assert_eq!(
            classify(&solution("A", Some("1.0")), &[installed_solution("A", Some("1.0.0"))]).status,
            Status::Installed
        );
        assert_eq!(classify(&solution("A", Some("1.0")), &[]).status, Status::NotInstalled);
        assert_eq!(
            classify(&solution("A [Preview]", Some("1.0")), &[]).status,
            Status::Special
        );
        assert_eq!(
            classify(
                &solution("[Deprecated] A", Some("9.0")),
                &[installed_solution("[Deprecated] A", Some("1.0"))]
            )
            .status,
            Status::Special
        );
    }

    #[test]
    fn test_missing_version_defaults_to_current() {
        let result = classify(
            &solution("A", None),
            &[installed_solution("A", Some("1.0.0"))],
        );
        assert_eq!(result.status, Status::Installed);

        let rule = RuleTemplateEntry {
            template_version: None,
            ..rule_template("t1", "Rule", "1")
        };
        let result = classify(&rule, &[installed_rule("r1", "Rule", Some("t1"), "7")]);
        assert_eq!(result.status, Status::Current);
    }

    #[test]
    fn test_rule_missing_when_nothing_matches() {
        let result = classify(
            &rule_template("T", "Brute force", "3"),
            &[installed_rule("r1", "Other rule", Some("U"), "1")],
        );
        assert_eq!(result.status, Status::Missing);
        assert!(result.matched.is_none());
    }

    #[test]
    fn test_template_match_takes_precedence_over_name_match() {
        let installed = [
            installed_rule("r-unrelated", "Brute force", Some("OTHER"), "1"),
            installed_rule("r-linked", "Brute force (renamed)", Some("T"), "2"),
        ];
        let result = classify(&rule_template("T", "Brute force", "3"), &installed);
        assert_eq!(result.status, Status::NeedsUpdate);
        assert_eq!(
            result.matched.as_ref().and_then(InstalledResource::as_rule).map(|r| r.id.as_str()),
            Some("r-linked")
        );
    }

    #[test]
    fn test_rule_name_match_without_link() {
        let result = classify(
            &rule_template("T", "Brute force", "3"),
            &[installed_rule("r1", "Brute force", None, "3")],
        );
        assert_eq!(result.status, Status::NameMatch);
        assert!(result.matched.is_some());
    }

    #[test]
    fn test_template_key_match_ignores_case() {
        let result = classify(
            &rule_template("ABCDEF", "Rule", "1.0.0"),
            &[installed_rule("r1", "Rule", Some("abcdef"), "1.0.0")],
        );
        assert_eq!(result.status, Status::Current);
    }

    #[test]
    fn test_deprecated_rule_pre_empts_everything() {
        let result = classify(
            &rule_template("T", "[Deprecated] Old detection", "9"),
            &[installed_rule("r1", "[Deprecated] Old detection", Some("T"), "1")],
        );
        assert_eq!(result.status, Status::Deprecated);
        assert!(result.matched.is_none());
    }

    #[test]
    fn test_workbook_preview_states() {
        let preview = workbook("Insights [Preview]", "1.0");
        assert_eq!(classify(&preview, &[]).status, Status::PreviewMissing);

        let meta = InstalledWorkbookMetadata {
            id: "workbook-x".to_string(),
            content_id: Some(preview.content_id.clone()),
            display_name: None,
            version: Some("1.0".to_string()),
            parent_id: None,
        };
        assert_eq!(
            classify(&preview, std::slice::from_ref(&meta)).status,
            Status::PreviewCurrent
        );

        let newer = WorkbookTemplateEntry {
            version: Some("2.0".to_string()),
            ..preview
        };
        assert_eq!(classify(&newer, &[meta]).status, Status::NeedsUpdate);
    }

    #[test]
    fn test_workbook_name_match() {
        let meta = InstalledWorkbookMetadata {
            id: "workbook-x".to_string(),
            content_id: Some("something-else".to_string()),
            display_name: Some("Overview".to_string()),
            version: Some("1.0".to_string()),
            parent_id: None,
        };
        assert_eq!(
            classify(&workbook("Overview", "1.0"), &[meta]).status,
            Status::NameMatch
        );
    }

    #[test]
    fn test_classification_is_deterministic() {
        let installed = [installed_rule("r1", "Rule", Some("T"), "1")];
        let entry = rule_template("T", "Rule", "2");
        let first = classify(&entry, &installed);
        for _ in 0..5 {
            assert_eq!(classify(&entry, &installed), first);
        }
    }
}
