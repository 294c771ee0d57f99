//! Cloud Run service mapper
//!
//! Reads the first container of the revision template. Terraform v1
//! (`template.0.spec.0.containers`), Terraform v2 (`template.0.containers`)
//! and the Admin API v2 (`template.containers`) shapes are all accepted.

use cloudshift_gcp::catalog;
use cloudshift_types::{
    HealthCheck, MapContext, MapperResult, MappingResult, Protocol, Resource, ResourceLimits,
    ResourceMapper, ResourceType,
};
use serde_json::Value;
use tracing::debug;

use crate::common::{
    base_service, field_str, first_value, parse_cpu, parse_memory_mb, service_name,
};

/// Port Cloud Run sends requests to unless the container declares one
pub const DEFAULT_PORT: u16 = 8080;

/// Cloud Run's default container limits
const DEFAULT_CPUS: f64 = 1.0;
const DEFAULT_MEMORY_MB: u64 = 512;

const CONTAINER_PATHS: &[&str] = &[
    "template.0.spec.0.containers.0",
    "template.0.containers.0",
    "template.containers.0",
    "spec.template.spec.containers.0",
];

/// Registries that need `gcloud auth configure-docker` before pulling
const GOOGLE_REGISTRIES: &[&str] = &["gcr.io/", "pkg.dev/"];

/// First element of a block that Terraform encodes as a one-item list
fn block(value: Option<&Value>) -> Option<&Value> {
    match value? {
        Value::Array(items) => items.first(),
        other => Some(other),
    }
}

fn container_port(container: &Value) -> Option<u16> {
    let port = block(container.get("ports"))?;
    ["container_port", "containerPort"]
        .iter()
        .find_map(|key| port.get(*key).and_then(Value::as_u64))
        .and_then(|port| u16::try_from(port).ok())
}

fn limits(container: &Value) -> Option<&Value> {
    block(container.get("resources"))?.get("limits")
}

fn health_check_path(container: &Value) -> Option<&str> {
    ["liveness_probe", "livenessProbe", "startup_probe", "startupProbe"]
        .iter()
        .filter_map(|key| block(container.get(*key)))
        .filter_map(|check| block(check.get("http_get").or_else(|| check.get("httpGet"))))
        .find_map(|http| field_str(http, &["path"]))
}

fn string_list(value: Option<&Value>) -> Option<Vec<String>> {
    let items = value?.as_array()?;
    let list: Vec<String> = items
        .iter()
        .filter_map(Value::as_str)
        .map(str::to_string)
        .collect();
    (!list.is_empty()).then_some(list)
}

/// Maps `gcp:run:service`
#[derive(Debug, Clone, Copy, Default)]
pub struct CloudRunMapper;

impl CloudRunMapper {
    pub fn new() -> Self {
        Self
    }
}

impl ResourceMapper for CloudRunMapper {
    fn resource_type(&self) -> ResourceType {
        catalog::CLOUD_RUN_SERVICE
    }

    fn map(&self, ctx: &MapContext, resource: &Resource) -> MapperResult<MappingResult> {
        self.validate(Some(resource))?;
        let container = first_value(resource, CONTAINER_PATHS);
        let image = container.and_then(|c| field_str(c, &["image"]));

        let placeholder = format!("cloudshift/{}:latest", service_name(&resource.name));
        let mut result = MappingResult::new(
            resource.id.clone(),
            base_service(ctx, resource, image.unwrap_or(&placeholder)),
        );

        match image {
            Some(image) if GOOGLE_REGISTRIES.iter().any(|registry| image.contains(registry)) => {
                result.manual_step(format!(
                    "Authenticate Docker against the registry of {} (gcloud auth configure-docker)",
                    image
                ));
            }
            Some(_) => {}
            None => {
                result.warn(format!(
                    "No container image found for {}; using placeholder {}",
                    resource.name, placeholder
                ));
                result.manual_step(format!(
                    "Build the service image and tag it as {}",
                    placeholder
                ));
            }
        }

        let port = container.and_then(container_port).unwrap_or(DEFAULT_PORT);
        let cpus = container
            .and_then(limits)
            .and_then(|l| field_str(l, &["cpu"]))
            .and_then(parse_cpu)
            .unwrap_or(DEFAULT_CPUS);
        let memory_mb = container
            .and_then(limits)
            .and_then(|l| field_str(l, &["memory"]))
            .and_then(parse_memory_mb)
            .unwrap_or(DEFAULT_MEMORY_MB);
        let path = container.and_then(health_check_path).unwrap_or("/");

        let mut secret_refs = Vec::new();
        if let Some(entries) = container.and_then(|c| c.get("env")).and_then(Value::as_array) {
            for entry in entries {
                let Some(name) = field_str(entry, &["name"]) else {
                    continue;
                };
                match entry.get("value").and_then(Value::as_str) {
                    Some(value) => {
                        result
                            .service
                            .environment
                            .insert(name.to_string(), value.to_string());
                    }
                    None => secret_refs.push(name.to_string()),
                }
            }
        }
        for name in secret_refs {
            result.manual_step(format!(
                "Provide a value for environment variable {} (sourced from Secret Manager)",
                name
            ));
        }

        let service = &mut result.service;
        service.environment.insert("PORT".to_string(), port.to_string());
        service.add_port(port, Protocol::Tcp);
        service.resources = ResourceLimits::new(cpus, memory_mb);
        service.health_check = Some(HealthCheck::shell(format!(
            "wget -q -O /dev/null http://127.0.0.1:{}{} || exit 1",
            port, path
        )));
        if let Some(container) = container {
            service.entrypoint = string_list(container.get("command"));
            service.command = string_list(container.get("args"));
        }

        debug!(
            "Mapped Cloud Run service {} to {} on port {}",
            resource.id, service.image, port
        );
        Ok(result)
    }
}
