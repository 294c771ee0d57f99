//! Attribute extraction shared by every GCP parser

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use cloudshift_types::{is_sensitive_key, redact_sensitive, REDACTED};

use crate::location::region_from_location;

/// Keys holding environment-variable maps
const ENV_MAP_KEYS: &[&str] = &[
    "environment_variables",
    "environmentVariables",
    "build_environment_variables",
    "buildEnvironmentVariables",
    "env_vars",
];

const LABEL_KEYS: &[&str] = &["labels", "userLabels", "user_labels", "resourceLabels", "resource_labels"];

const TIMESTAMP_KEYS: &[&str] = &[
    "creationTimestamp",
    "creation_timestamp",
    "createTime",
    "create_time",
    "timeCreated",
];

const REGION_KEYS: &[&str] = &["region", "zone", "location", "locationId", "location_id"];

/// Redact secret payloads unless the caller asked for them
///
/// Covers sensitive attribute names, environment variable values (both
/// `[{name, value}]` lists and plain maps) and `{key, value}` metadata items
/// with a sensitive key. Names and keys are always kept.
pub fn redact_payloads(value: &mut Value, include_sensitive: bool) -> usize {
    if include_sensitive {
        return 0;
    }
    redact_sensitive(value) + redact_environment(value)
}

fn redact_environment(value: &mut Value) -> usize {
    match value {
        Value::Object(map) => {
            let mut redacted = 0;

            let is_env_item = map.get("name").is_some_and(Value::is_string)
                && map.contains_key("value")
                && map.len() <= 3;
            let is_sensitive_item = map
                .get("key")
                .and_then(Value::as_str)
                .is_some_and(is_sensitive_key);

            for (key, entry) in map.iter_mut() {
                if ENV_MAP_KEYS.contains(&key.as_str()) {
                    if let Value::Object(vars) = entry {
                        for var in vars.values_mut() {
                            redacted += replace(var);
                        }
                    }
                } else if key == "env" {
                    if let Value::Array(items) = entry {
                        for item in items.iter_mut() {
                            if let Some(var) = item.get_mut("value") {
                                redacted += replace(var);
                            }
                        }
                    }
                } else if key == "value" && is_sensitive_item && !is_env_item {
                    redacted += replace(entry);
                } else {
                    redacted += redact_environment(entry);
                }
            }
            redacted
        }
        Value::Array(items) => items.iter_mut().map(redact_environment).sum(),
        _ => 0,
    }
}

fn replace(value: &mut Value) -> usize {
    if value.is_null() || value.as_str() == Some(REDACTED) {
        return 0;
    }
    *value = Value::String(REDACTED.to_string());
    1
}

/// Literal (non-interpolated) string attribute
pub fn literal_str<'a>(attributes: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    attributes
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty() && !s.contains("${") && !s.contains("$(ref."))
}

/// Region from the first populated location-like attribute
pub fn region_of(attributes: &Map<String, Value>, default_region: Option<&str>) -> String {
    REGION_KEYS
        .iter()
        .find_map(|key| literal_str(attributes, key))
        .map(region_from_location)
        .or_else(|| default_region.map(str::to_string))
        .unwrap_or_else(|| "global".to_string())
}

/// String labels from the first label map present
pub fn labels_of(attributes: &Map<String, Value>) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    for key in LABEL_KEYS {
        if let Some(Value::Object(map)) = attributes.get(*key) {
            for (name, value) in map {
                if let Some(value) = value.as_str() {
                    labels.insert(name.clone(), value.to_string());
                }
            }
            if !labels.is_empty() {
                break;
            }
        }
    }
    labels
}

/// Creation timestamp, when the provider recorded one
pub fn created_at_of(attributes: &Map<String, Value>) -> Option<DateTime<Utc>> {
    TIMESTAMP_KEYS
        .iter()
        .filter_map(|key| attributes.get(*key).and_then(Value::as_str))
        .find_map(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|ts| ts.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_env_values_are_redacted_but_names_kept() {
        let mut value = json!({
            "template": { "containers": [{
                "image": "gcr.io/demo/api",
                "env": [{ "name": "DATABASE_URL", "value": "postgres://u:p@db/app" }]
            }]},
            "environment_variables": { "API_MODE": "prod" },
            "metadata": { "items": [
                { "key": "startup-script", "value": "#!/bin/bash\necho hi" },
                { "key": "enable-oslogin", "value": "TRUE" }
            ]}
        });

        redact_payloads(&mut value, false);

        let env = &value["template"]["containers"][0]["env"][0];
        assert_eq!(env["name"], "DATABASE_URL");
        assert_eq!(env["value"], REDACTED);
        assert_eq!(value["environment_variables"]["API_MODE"], REDACTED);
        assert_eq!(value["metadata"]["items"][0]["value"], REDACTED);
        assert_eq!(value["metadata"]["items"][1]["value"], "TRUE");
        assert_eq!(value["template"]["containers"][0]["image"], "gcr.io/demo/api");
    }

    #[test]
    fn test_include_sensitive_keeps_values() {
        let mut value = json!({ "password": "hunter2" });
        assert_eq!(redact_payloads(&mut value, true), 0);
        assert_eq!(value["password"], "hunter2");
    }

    #[test]
    fn test_region_precedence_and_default() {
        let zoned = json!({ "zone": "us-central1-f" });
        assert_eq!(region_of(zoned.as_object().unwrap(), None), "us-central1");

        let interpolated = json!({ "region": "${var.region}" });
        assert_eq!(
            region_of(interpolated.as_object().unwrap(), Some("europe-west1")),
            "europe-west1"
        );
        assert_eq!(region_of(&Map::new(), None), "global");
    }

    #[test]
    fn test_labels_and_timestamp() {
        let attrs = json!({
            "labels": { "env": "prod", "tier": 3 },
            "creationTimestamp": "2024-03-01T10:00:00.000-08:00"
        });
        let attrs = attrs.as_object().unwrap();

        let labels = labels_of(attrs);
        assert_eq!(labels.len(), 1);
        assert_eq!(labels["env"], "prod");
        assert!(created_at_of(attrs).is_some());
    }
}
