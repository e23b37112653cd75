//! Analytics rules orchestrator.
//!
//! Writes are sequential. Each successful rule write is followed by the
//! metadata write that links the rule to its source solution; a failed
//! metadata write is logged and does not undo the rule.

use std::sync::Arc;

use sentinel_catalog::{CatalogClient, InstalledRule, RuleTemplateEntry, Severity, SourceRef};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::classify::{classify, ResourceKind};
use crate::config::RulePolicy;
use crate::error::Result;
use crate::normalize::normalize_rule_properties;
use crate::obs;
use crate::outcome::DeploymentOutcome;
use crate::patterns::ErrorPatterns;
use crate::policy::{plan, Action, PlannedAction};

use super::{keep_latest, log_plan, record_applied, record_skip, record_write_error, unavailable, PackageScope};

/// Installed fields preserved across rule updates.
const CARRIED_FIELDS: &[&str] = &["entityMappings", "customDetails"];

/// Reconciles analytics rules from templates.
pub struct RulesOrchestrator {
    client: Arc<dyn CatalogClient>,
    policy: RulePolicy,
    severities: Vec<Severity>,
    patterns: ErrorPatterns,
    dry_run: bool,
}

impl RulesOrchestrator {
    pub fn new(client: Arc<dyn CatalogClient>, policy: RulePolicy, severities: Vec<Severity>) -> Self {
        Self {
            client,
            policy,
            severities,
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

    /// Read templates and installed rules, filter and plan.
    ///
    /// Templates outside `scope` or the configured severities are dropped
    /// before classification and never counted.
    pub async fn assess(&self, scope: &PackageScope) -> Result<Vec<PlannedAction<RuleTemplateEntry>>> {
        let kind = ResourceKind::Rule;
        let templates = self
            .client
            .list_rule_templates(Some(self.severities.as_slice()))
            .await
            .map_err(unavailable(kind))?;
        let installed: Vec<InstalledRule> = self
            .client
            .list_installed_rules()
            .await
            .map_err(unavailable(kind))?;

        let candidates: Vec<RuleTemplateEntry> = templates
            .into_iter()
            .filter(|t| scope.contains(t.package_id.as_deref()))
            .filter(|t| t.severity.is_some_and(|s| self.severities.contains(&s)))
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

    /// Execute a plan, one rule at a time.
    pub async fn execute(&self, planned: &[PlannedAction<RuleTemplateEntry>]) -> DeploymentOutcome {
        let kind = ResourceKind::Rule;
        let mut outcome = DeploymentOutcome::new(kind);
        outcome.dry_run = self.dry_run;
        obs::emit_pass_started(kind, planned.len());

        for p in planned {
            let template = &p.entry;
            let name = template.display_name.as_str();
            let (rule_id, previous) = match p.action {
                Action::Skip(reason) => {
                    record_skip(&mut outcome, &p.status, reason);
                    continue;
                }
                Action::Install => (Uuid::new_v4().to_string(), None),
                Action::Update => {
                    let previous = p.status.matched.as_ref().and_then(|m| m.as_rule());
                    let id = previous
                        .map(|r| r.id.clone())
                        .unwrap_or_else(|| Uuid::new_v4().to_string());
                    (id, previous)
                }
            };

            if self.dry_run {
                record_applied(&mut outcome, kind, name, p.action);
                continue;
            }

            let properties = build_rule_properties(template, previous);
            let rule = match self
                .client
                .put_rule(&rule_id, &template.rule_kind, &properties)
                .await
            {
                Ok(rule) => rule,
                Err(e) => {
                    record_write_error(&mut outcome, &self.patterns, kind, name, &e);
                    continue;
                }
            };
            record_applied(&mut outcome, kind, name, p.action);

            let source = source_ref(template);
            if let Err(e) = self
                .client
                .put_rule_metadata(&rule.name, &source, template.template_version.as_deref())
                .await
            {
                obs::emit_metadata_failed(kind, name, &e);
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
                obs::emit_pass_aborted(ResourceKind::Rule, &e);
                DeploymentOutcome::aborted(ResourceKind::Rule, e.to_string())
            }
        }
    }
}

/// Rule properties to write for `template`.
///
/// The template link, version and display name always come from the
/// template. On update the installed rule's entity mappings and custom
/// details replace the template's.
pub(crate) fn build_rule_properties(template: &RuleTemplateEntry, installed: Option<&InstalledRule>) -> Value {
    let mut properties = normalize_rule_properties(&template.rule_kind, template.rule_properties.clone());
    if !properties.is_object() {
        properties = json!({});
    }
    if let Some(map) = properties.as_object_mut() {
        map.insert("alertRuleTemplateName".to_string(), json!(template.id));
        map.insert("displayName".to_string(), json!(template.display_name));
        if let Some(version) = &template.template_version {
            map.insert("templateVersion".to_string(), json!(version));
        }
        map.entry("enabled").or_insert(Value::Bool(true));

        if let Some(rule) = installed {
            for field in CARRIED_FIELDS {
                if let Some(value) = rule.properties.get(*field).filter(|v| !v.is_null()) {
                    map.insert(field.to_string(), value.clone());
                }
            }
        }
    }
    properties
}

fn source_ref(template: &RuleTemplateEntry) -> SourceRef {
    SourceRef {
        content_id: template.id.clone(),
        solution_name: template.package_name.clone(),
        package_id: template.package_id.clone(),
        package_version: template.package_version.clone(),
    }
}
