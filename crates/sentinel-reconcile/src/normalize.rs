//! Template normalization
//!
//! Catalog templates are authored by many hands and the write API is
//! stricter than the catalog. The functions here coerce payloads into the
//! shapes the write API accepts. Every rule is idempotent and none of them
//! can fail: a shape that does not match is left untouched and, if the API
//! rejects it, shows up later as a write failure.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{json, Map, Value};

/// Fields that must be lists.
const LIST_FIELDS: &[&str] = &[
    "tactics",
    "techniques",
    "subTechniques",
    "entityMappings",
    "requiredDataConnectors",
];

/// Fields that must be single objects.
const OBJECT_FIELDS: &[&str] = &[
    "incidentConfiguration",
    "eventGroupingSettings",
    "alertDetailsOverride",
];

/// ISO-8601 duration fields at the top level of rule properties.
const DURATION_FIELDS: &[&str] = &["queryFrequency", "queryPeriod", "suppressionDuration"];

/// Rule kinds whose write schema carries incident configuration.
const INCIDENT_RULE_KINDS: &[&str] = &["Scheduled", "NRT"];

const DEPLOYMENT_SCRIPT_TYPE: &str = "Microsoft.Resources/deploymentScripts";

fn shorthand_duration() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^(\d+)([hdm])$").expect("duration pattern is valid"))
}

/// Rewrite `4h`, `2d`, `30m` as `PT4H`, `P2D`, `PT30M`.
///
/// Anything else, including values already in ISO-8601 form, is returned
/// unchanged.
pub fn normalize_duration(value: &str) -> String {
    let trimmed = value.trim();
    let Some(caps) = shorthand_duration().captures(trimmed) else {
        return value.to_string();
    };
    let amount = &caps[1];
    match caps[2].to_ascii_lowercase().as_str() {
        "h" => format!("PT{amount}H"),
        "d" => format!("P{amount}D"),
        "m" => format!("PT{amount}M"),
        _ => value.to_string(),
    }
}

/// Wrap a scalar or object in a one-element list.
fn ensure_list(map: &mut Map<String, Value>, field: &str) {
    if let Some(value) = map.get_mut(field) {
        if !value.is_array() && !value.is_null() {
            let inner = value.take();
            *value = Value::Array(vec![inner]);
        }
    }
}

/// Unwrap a one-element list holding an object.
fn ensure_object(map: &mut Map<String, Value>, field: &str) {
    if let Some(value) = map.get_mut(field) {
        let single = match value.as_array() {
            Some(items) if items.len() == 1 && items[0].is_object() => Some(items[0].clone()),
            _ => None,
        };
        if let Some(single) = single {
            *value = single;
        }
    }
}

fn normalize_duration_field(map: &mut Map<String, Value>, field: &str) {
    if let Some(Value::String(s)) = map.get_mut(field) {
        *s = normalize_duration(s);
    }
}

fn is_empty_object(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::Object(map)) => map.is_empty(),
        _ => false,
    }
}

/// Conservative incident grouping: disabled, match on all entities, one
/// hour lookback.
pub fn default_grouping_configuration() -> Value {
    json!({
        "enabled": false,
        "reopenClosedIncident": false,
        "lookbackDuration": "PT1H",
        "matchingMethod": "AllEntities",
        "groupByEntities": [],
        "groupByAlertDetails": [],
        "groupByCustomDetails": []
    })
}

/// Bring analytics rule `properties` of the given kind into write shape.
pub fn normalize_rule_properties(kind: &str, mut properties: Value) -> Value {
    let Some(map) = properties.as_object_mut() else {
        return properties;
    };

    for field in LIST_FIELDS {
        ensure_list(map, field);
    }
    for field in OBJECT_FIELDS {
        ensure_object(map, field);
    }
    for field in DURATION_FIELDS {
        normalize_duration_field(map, field);
    }

    if let Some(Value::Array(mappings)) = map.get_mut("entityMappings") {
        for mapping in mappings.iter_mut().filter_map(Value::as_object_mut) {
            ensure_list(mapping, "fieldMappings");
        }
    }
    if let Some(Value::Array(connectors)) = map.get_mut("requiredDataConnectors") {
        for connector in connectors.iter_mut().filter_map(Value::as_object_mut) {
            ensure_list(connector, "dataTypes");
        }
    }

    if INCIDENT_RULE_KINDS.iter().any(|k| k.eq_ignore_ascii_case(kind)) {
        let incident = map
            .entry("incidentConfiguration")
            .or_insert_with(|| json!({ "createIncident": true }));
        if incident.is_null() {
            *incident = json!({ "createIncident": true });
        }
        if let Some(incident) = incident.as_object_mut() {
            ensure_object(incident, "groupingConfiguration");
            if is_empty_object(incident.get("groupingConfiguration")) {
                incident.insert(
                    "groupingConfiguration".to_string(),
                    default_grouping_configuration(),
                );
            }
            if let Some(grouping) = incident
                .get_mut("groupingConfiguration")
                .and_then(Value::as_object_mut)
            {
                normalize_duration_field(grouping, "lookbackDuration");
            }
        }
    }

    properties
}

/// Remove post-deployment hooks from packaged content, in place.
///
/// Drops every `postDeployment` key and every deployment-script resource,
/// at any depth.
pub fn strip_post_deployment(content: &mut Value) {
    match content {
        Value::Object(map) => {
            map.remove("postDeployment");
            if let Some(Value::Array(resources)) = map.get_mut("resources") {
                resources.retain(|r| {
                    !r.get("type")
                        .and_then(Value::as_str)
                        .map(|t| t.eq_ignore_ascii_case(DEPLOYMENT_SCRIPT_TYPE))
                        .unwrap_or(false)
                });
            }
            for value in map.values_mut() {
                strip_post_deployment(value);
            }
        }
        Value::Array(items) => {
            for item in items {
                strip_post_deployment(item);
            }
        }
        _ => {}
    }
}

/// Bring workbook resource `properties` into write shape.
///
/// `serializedData` must be a JSON string; templates sometimes inline it as
/// an object.
pub fn normalize_workbook_properties(mut properties: Value) -> Value {
    if let Some(map) = properties.as_object_mut() {
        if let Some(data) = map.get_mut("serializedData") {
            if data.is_object() || data.is_array() {
                *data = Value::String(data.to_string());
            }
        }
    }
    properties
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shorthand_durations() {
        assert_eq!(normalize_duration("4h"), "PT4H");
        assert_eq!(normalize_duration("2d"), "P2D");
        assert_eq!(normalize_duration("30m"), "PT30M");
        assert_eq!(normalize_duration("5H"), "PT5H");
    }

    #[test]
    fn test_unrecognized_durations_pass_through() {
        assert_eq!(normalize_duration("PT1H"), "PT1H");
        assert_eq!(normalize_duration("1w"), "1w");
        assert_eq!(normalize_duration(""), "");
        assert_eq!(normalize_duration("h"), "h");
    }

    #[test]
    fn test_rule_shapes_are_coerced() {
        let props = json!({
            "tactics": "InitialAccess",
            "queryFrequency": "1h",
            "queryPeriod": "14d",
            "incidentConfiguration": [{ "createIncident": true }],
            "entityMappings": { "entityType": "Account", "fieldMappings": { "identifier": "Name", "columnName": "User" } }
        });

        let out = normalize_rule_properties("Scheduled", props);
        assert_eq!(out["tactics"], json!(["InitialAccess"]));
        assert_eq!(out["queryFrequency"], "PT1H");
        assert_eq!(out["queryPeriod"], "P14D");
        assert!(out["incidentConfiguration"].is_object());
        assert!(out["entityMappings"].is_array());
        assert!(out["entityMappings"][0]["fieldMappings"].is_array());
    }

    #[test]
    fn test_missing_grouping_gets_conservative_default() {
        let out = normalize_rule_properties("NRT", json!({ "query": "T" }));
        let grouping = &out["incidentConfiguration"]["groupingConfiguration"];
        assert_eq!(grouping["matchingMethod"], "AllEntities");
        assert_eq!(grouping["lookbackDuration"], "PT1H");
        assert_eq!(out["incidentConfiguration"]["createIncident"], true);

        let empty = normalize_rule_properties(
            "Scheduled",
            json!({ "incidentConfiguration": { "createIncident": false, "groupingConfiguration": {} } }),
        );
        assert_eq!(
            empty["incidentConfiguration"]["groupingConfiguration"]["matchingMethod"],
            "AllEntities"
        );
        assert_eq!(empty["incidentConfiguration"]["createIncident"], false);
    }

    #[test]
    fn test_existing_grouping_is_kept_and_normalized() {
        let out = normalize_rule_properties(
            "Scheduled",
            json!({
                "incidentConfiguration": {
                    "createIncident": true,
                    "groupingConfiguration": [{ "enabled": true, "lookbackDuration": "5h", "matchingMethod": "Selected" }]
                }
            }),
        );
        let grouping = &out["incidentConfiguration"]["groupingConfiguration"];
        assert_eq!(grouping["matchingMethod"], "Selected");
        assert_eq!(grouping["lookbackDuration"], "PT5H");
    }

    #[test]
    fn test_other_rule_kinds_get_no_incident_defaults() {
        let out = normalize_rule_properties("Fusion", json!({ "alertRuleTemplateName": "x" }));
        assert!(out.get("incidentConfiguration").is_none());
    }

    #[test]
    fn test_rule_normalization_is_idempotent() {
        let props = json!({
            "tactics": "Persistence",
            "suppressionDuration": "5h",
            "alertDetailsOverride": [{ "alertDisplayNameFormat": "x" }]
        });
        let once = normalize_rule_properties("Scheduled", props);
        let twice = normalize_rule_properties("Scheduled", once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_post_deployment_hooks_are_stripped() {
        let mut content = json!({
            "resources": [
                { "type": "Microsoft.Resources/deploymentScripts", "name": "hook" },
                {
                    "type": "Microsoft.OperationalInsights/workspaces/providers/metadata",
                    "properties": { "postDeployment": ["run.ps1"], "version": "1.0" }
                }
            ]
        });
        strip_post_deployment(&mut content);

        let resources = content["resources"].as_array().unwrap();
        assert_eq!(resources.len(), 1);
        assert!(resources[0]["properties"].get("postDeployment").is_none());
        assert_eq!(resources[0]["properties"]["version"], "1.0");
    }

    #[test]
    fn test_workbook_serialized_data_becomes_string() {
        let out = normalize_workbook_properties(json!({
            "displayName": "Overview",
            "serializedData": { "version": "Notebook/1.0", "items": [] }
        }));
        assert!(out["serializedData"].is_string());
        let again = normalize_workbook_properties(out.clone());
        assert_eq!(out, again);
    }
}
