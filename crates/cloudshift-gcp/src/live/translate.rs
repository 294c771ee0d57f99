//! API item to `Resource` translation for each scan

use serde_json::{Map, Value};

use cloudshift_types::{ParseOptions, Resource};

use crate::api::Scan;
use crate::attributes::{created_at_of, labels_of, redact_payloads, region_of};
use crate::location::{last_segment, normalize_self_link, path_component, region_from_location};

/// Convert one raw API item; `None` when it lacks an identity or is filtered out
pub fn translate(
    scan: Scan,
    project: &str,
    item: Value,
    options: &ParseOptions,
) -> Option<Resource> {
    let resource_type = scan.resource_type();
    if !options.admits(&resource_type) {
        return None;
    }

    let Value::Object(attributes) = item else {
        return None;
    };

    let full_name = attributes
        .get("name")
        .and_then(Value::as_str)
        .filter(|name| !name.is_empty())?
        .to_string();
    let self_link = attributes.get("selfLink").and_then(Value::as_str);

    let id = match self_link {
        Some(link) => normalize_self_link(link),
        None if full_name.contains('/') => full_name.trim_matches('/').to_string(),
        None => format!("projects/{}/{}/{}", project, collection(scan), full_name),
    };

    let display_name = match scan {
        Scan::ServiceAccounts => attributes
            .get("email")
            .and_then(Value::as_str)
            .unwrap_or_else(|| last_segment(&full_name))
            .to_string(),
        _ => last_segment(&full_name).to_string(),
    };

    let region = region_for(scan, &attributes, &full_name);
    let dependencies = dependencies_of(scan, project, &attributes, &region);

    let tags = match scan {
        Scan::SqlInstances => attributes
            .get("settings")
            .and_then(Value::as_object)
            .map(labels_of)
            .unwrap_or_default(),
        _ => labels_of(&attributes),
    };
    let created_at = created_at_of(&attributes);
    let external_ref = self_link.map(str::to_string).unwrap_or(full_name);

    let mut config = Value::Object(attributes);
    redact_payloads(&mut config, options.include_sensitive);
    let Value::Object(config) = config else {
        return None;
    };

    let mut resource = Resource::new(id, display_name, resource_type, region);
    resource.external_ref = Some(external_ref);
    resource.tags = tags;
    resource.created_at = created_at;
    resource.config = config;
    for dependency in dependencies {
        resource.add_dependency(dependency);
    }
    Some(resource)
}

fn collection(scan: Scan) -> &'static str {
    scan.name().split_once('.').map(|(_, c)| c).unwrap_or("resources")
}

fn region_for(scan: Scan, attributes: &Map<String, Value>, full_name: &str) -> String {
    match scan {
        Scan::Networks
        | Scan::Firewalls
        | Scan::Topics
        | Scan::Subscriptions
        | Scan::Secrets
        | Scan::ServiceAccounts => "global".to_string(),
        _ => {
            let from_attributes = region_of(attributes, None);
            if from_attributes != "global" {
                return from_attributes;
            }
            path_component(full_name, "locations")
                .filter(|location| *location != "-")
                .map(region_from_location)
                .unwrap_or(from_attributes)
        }
    }
}

fn link(attributes: &Map<String, Value>, key: &str) -> Option<String> {
    attributes
        .get(key)
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
        .map(normalize_self_link)
}

fn nested<'a>(attributes: &'a Map<String, Value>, path: &[&str]) -> Option<&'a Value> {
    let (first, rest) = path.split_first()?;
    rest.iter()
        .try_fold(attributes.get(*first)?, |value, key| value.get(key))
}

fn service_account(project: &str, email: &str) -> String {
    format!("projects/{}/serviceAccounts/{}", project, email)
}

/// IDs of resources this item points at; unresolved targets stay dangling
fn dependencies_of(
    scan: Scan,
    project: &str,
    attributes: &Map<String, Value>,
    region: &str,
) -> Vec<String> {
    let mut found = Vec::new();
    match scan {
        Scan::Instances => {
            if let Some(interfaces) = attributes.get("networkInterfaces").and_then(Value::as_array) {
                for interface in interfaces.iter().filter_map(Value::as_object) {
                    found.extend(link(interface, "network"));
                    found.extend(link(interface, "subnetwork"));
                }
            }
            if let Some(disks) = attributes.get("disks").and_then(Value::as_array) {
                for disk in disks.iter().filter_map(Value::as_object) {
                    found.extend(link(disk, "source"));
                }
            }
            if let Some(accounts) = attributes.get("serviceAccounts").and_then(Value::as_array) {
                for email in accounts
                    .iter()
                    .filter_map(|account| account.get("email").and_then(Value::as_str))
                {
                    found.push(service_account(project, email));
                }
            }
        }
        Scan::Subnetworks | Scan::Firewalls => {
            found.extend(link(attributes, "network"));
        }
        Scan::ForwardingRules => {
            found.extend(link(attributes, "network"));
            found.extend(link(attributes, "subnetwork"));
            found.extend(link(attributes, "target"));
        }
        Scan::Subscriptions => {
            found.extend(link(attributes, "topic"));
        }
        Scan::SqlInstances => {
            if let Some(network) =
                nested(attributes, &["settings", "ipConfiguration", "privateNetwork"])
                    .and_then(Value::as_str)
            {
                found.push(normalize_self_link(network));
            }
        }
        Scan::RedisInstances => {
            found.extend(link(attributes, "authorizedNetwork"));
        }
        Scan::GkeClusters => {
            if let Some(network) = attributes.get("network").and_then(Value::as_str) {
                found.push(format!("projects/{}/global/networks/{}", project, network));
            }
            if let Some(subnetwork) = attributes.get("subnetwork").and_then(Value::as_str) {
                found.push(format!(
                    "projects/{}/regions/{}/subnetworks/{}",
                    project, region, subnetwork
                ));
            }
        }
        Scan::Functions => {
            if let Some(topic) =
                nested(attributes, &["eventTrigger", "pubsubTopic"]).and_then(Value::as_str)
            {
                found.push(normalize_self_link(topic));
            }
            if let Some(email) = nested(attributes, &["serviceConfig", "serviceAccountEmail"])
                .and_then(Value::as_str)
            {
                found.push(service_account(project, email));
            }
        }
        Scan::RunServices => {
            if let Some(email) =
                nested(attributes, &["template", "serviceAccount"]).and_then(Value::as_str)
            {
                found.push(service_account(project, email));
            }
        }
        Scan::SchedulerJobs => {
            if let Some(topic) =
                nested(attributes, &["pubsubTarget", "topicName"]).and_then(Value::as_str)
            {
                found.push(normalize_self_link(topic));
            }
        }
        Scan::Disks
        | Scan::Networks
        | Scan::Buckets
        | Scan::Topics
        | Scan::Secrets
        | Scan::ServiceAccounts => {}
    }
    found
}
