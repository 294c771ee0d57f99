//! Helpers shared by every mapper
//!
//! Generated files are returned in memory; the compose document expects each
//! one at `./<service>/<file name>` next to it.

use cloudshift_types::{MapContext, Resource, ResourceLimits, ServiceDefinition, VolumeMount};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// Label carrying the ID of the resource a service was generated from
pub const SOURCE_ID_LABEL: &str = "cloudshift.source-id";

/// Label carrying the canonical resource type name
pub const RESOURCE_TYPE_LABEL: &str = "cloudshift.resource-type";

/// Prefix for cloud labels copied onto the service
pub const CLOUD_LABEL_PREFIX: &str = "cloudshift.label.";

/// Sizing used when a provider size string is missing or unknown
pub const DEFAULT_LIMITS: ResourceLimits = ResourceLimits {
    cpus: Some(1.0),
    memory_mb: Some(2048),
};

/// Directory generated scripts are mounted into
pub const ARTIFACT_MOUNT_DIR: &str = "/opt/cloudshift";

const MIB: f64 = 1024.0 * 1024.0;

static INVALID_NAME_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-z0-9_-]+").expect("service name pattern is valid"));

static MEMORY_QUANTITY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d+(?:\.\d+)?)\s*([KMGT]i?)?[Bb]?$").expect("memory quantity pattern is valid")
});

/// Compose-safe service name derived from a resource name
pub fn service_name(name: &str) -> String {
    let lowered = name.to_ascii_lowercase();
    let cleaned = INVALID_NAME_CHARS.replace_all(&lowered, "-");
    let trimmed = cleaned.trim_matches(|c| c == '-' || c == '_');
    if trimmed.is_empty() {
        "service".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Host path a generated file is expected at, relative to the compose file
pub fn artifact_path(service: &str, file: &str) -> String {
    format!("./{}/{}", service, file)
}

/// Service skeleton with the provenance labels and the shared network
pub(crate) fn base_service(
    ctx: &MapContext,
    resource: &Resource,
    image: impl Into<String>,
) -> ServiceDefinition {
    let mut service = ServiceDefinition::new(service_name(&resource.name), image);
    service
        .labels
        .insert(SOURCE_ID_LABEL.to_string(), resource.id.clone());
    service.labels.insert(
        RESOURCE_TYPE_LABEL.to_string(),
        resource.resource_type.name().to_string(),
    );
    for (key, value) in &resource.tags {
        service
            .labels
            .insert(format!("{}{}", CLOUD_LABEL_PREFIX, key), value.clone());
    }
    service.networks.push(ctx.network.clone());
    service
}

/// Mount a generated file read-only into the container
pub(crate) fn mount_artifact(
    service: &mut ServiceDefinition,
    file: &str,
    destination: impl Into<String>,
) {
    let source = artifact_path(&service.name, file);
    service.volumes.push(VolumeMount {
        source,
        destination: destination.into(),
        read_only: true,
    });
}

/// Named data volume owned by the service
pub(crate) fn data_volume(service: &mut ServiceDefinition, destination: &str) {
    let source = format!("{}-data", service.name);
    service.add_volume(source, destination);
}

/// First non-empty string found under any of the config paths
pub(crate) fn first_str<'a>(resource: &'a Resource, paths: &[&str]) -> Option<&'a str> {
    paths
        .iter()
        .filter_map(|path| resource.config_str(path))
        .find(|value| !value.is_empty())
}

pub(crate) fn first_value<'a>(resource: &'a Resource, paths: &[&str]) -> Option<&'a Value> {
    paths
        .iter()
        .filter_map(|path| resource.config_value(path))
        .find(|value| !value.is_null())
}

pub(crate) fn first_f64(resource: &Resource, paths: &[&str]) -> Option<f64> {
    paths.iter().find_map(|path| resource.config_f64(path))
}

pub(crate) fn first_bool(resource: &Resource, paths: &[&str]) -> Option<bool> {
    paths.iter().find_map(|path| resource.config_bool(path))
}

/// Last path segment of a URL or resource path
pub(crate) fn last_segment(value: &str) -> &str {
    value.rsplit('/').next().unwrap_or(value)
}

/// String fields of a JSON object under either spelling
pub(crate) fn field_str<'a>(object: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|key| object.get(*key).and_then(Value::as_str))
        .find(|value| !value.is_empty())
}

/// Parse a CPU quantity: `"1000m"`, `"2"`, `"0.5"`
pub fn parse_cpu(value: &str) -> Option<f64> {
    let value = value.trim();
    let cpus = match value.strip_suffix('m') {
        Some(millis) => millis.parse::<f64>().ok()? / 1000.0,
        None => value.parse::<f64>().ok()?,
    };
    (cpus > 0.0).then_some(cpus)
}

/// Parse a memory quantity into MB: `"512Mi"`, `"1Gi"`, `"256M"`, `"2G"`
///
/// Decimal units are converted, so `"256M"` is 244 MB.
pub fn parse_memory_mb(value: &str) -> Option<u64> {
    let caps = MEMORY_QUANTITY.captures(value.trim())?;
    let amount: f64 = caps[1].parse().ok()?;
    let unit = match caps.get(2).map(|m| m.as_str()) {
        None => 1.0,
        Some("K") => 1e3,
        Some("Ki") => 1024.0,
        Some("M") => 1e6,
        Some("Mi") => MIB,
        Some("G") => 1e9,
        Some("Gi") => 1024.0 * MIB,
        Some("T") => 1e12,
        Some("Ti") => 1024.0 * 1024.0 * MIB,
        Some(_) => return None,
    };
    let mb = (amount * unit / MIB).round() as u64;
    (mb > 0).then_some(mb)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloudshift_types::{Category, Provider, ResourceType};

    const TEST_TYPE: ResourceType =
        ResourceType::new(Provider::Gcp, "gcp:test:thing", Category::Compute);

    #[test]
    fn test_service_name_is_compose_safe() {
        assert_eq!(service_name("Orders DB (prod)"), "orders-db-prod");
        assert_eq!(service_name("web_1"), "web_1");
        assert_eq!(service_name("---"), "service");
    }

    #[test]
    fn test_base_service_labels_and_network() {
        let resource = Resource::new("projects/p/things/a", "Thing-A", TEST_TYPE, "us")
            .with_tag("env", "prod");
        let ctx = MapContext::default().with_network("local");

        let service = base_service(&ctx, &resource, "busybox");

        assert_eq!(service.name, "thing-a");
        assert_eq!(
            service.labels.get(SOURCE_ID_LABEL).map(String::as_str),
            Some("projects/p/things/a")
        );
        assert_eq!(
            service.labels.get(RESOURCE_TYPE_LABEL).map(String::as_str),
            Some("gcp:test:thing")
        );
        assert_eq!(
            service.labels.get("cloudshift.label.env").map(String::as_str),
            Some("prod")
        );
        assert_eq!(service.networks, vec!["local".to_string()]);
    }

    #[test]
    fn test_parse_cpu() {
        assert_eq!(parse_cpu("1000m"), Some(1.0));
        assert_eq!(parse_cpu("2"), Some(2.0));
        assert_eq!(parse_cpu("0.5"), Some(0.5));
        assert_eq!(parse_cpu("0"), None);
        assert_eq!(parse_cpu("lots"), None);
    }

    #[test]
    fn test_parse_memory() {
        assert_eq!(parse_memory_mb("512Mi"), Some(512));
        assert_eq!(parse_memory_mb("1Gi"), Some(1024));
        assert_eq!(parse_memory_mb("256M"), Some(244));
        assert_eq!(parse_memory_mb("2G"), Some(1907));
        assert_eq!(parse_memory_mb("512MB"), Some(488));
        assert_eq!(parse_memory_mb("12"), None);
        assert_eq!(parse_memory_mb("big"), None);
    }
}
