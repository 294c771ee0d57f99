//! Docker Compose rendering of mapping results
//!
//! Services keep the order of the input results. Values taken from cloud
//! configuration are escaped so Compose does not interpolate `$`.

use cloudshift_types::{
    HealthCheck, MapperResult, MappingError, MappingResult, PortMapping, Protocol,
    ResourceLimits, ServiceDefinition, VolumeMount,
};
use indexmap::IndexMap;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

#[derive(Debug, Serialize)]
struct ComposeFile {
    services: IndexMap<String, ComposeService>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    volumes: IndexMap<String, ComposeVolume>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    networks: IndexMap<String, ComposeNetwork>,
}

#[derive(Debug, Serialize)]
struct ComposeService {
    image: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    entrypoint: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    command: Option<Vec<String>>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    environment: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    ports: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    volumes: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    networks: Vec<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    labels: BTreeMap<String, String>,
    restart: &'static str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    depends_on: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    healthcheck: Option<ComposeHealthcheck>,
    #[serde(skip_serializing_if = "Option::is_none")]
    deploy: Option<ComposeDeploy>,
}

#[derive(Debug, Serialize)]
struct ComposeHealthcheck {
    test: Vec<String>,
    interval: String,
    timeout: String,
    retries: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    start_period: Option<String>,
}

#[derive(Debug, Serialize)]
struct ComposeDeploy {
    resources: ComposeResources,
}

#[derive(Debug, Serialize)]
struct ComposeResources {
    limits: ComposeLimits,
}

#[derive(Debug, Serialize)]
struct ComposeLimits {
    #[serde(skip_serializing_if = "Option::is_none")]
    cpus: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    memory: Option<String>,
}

#[derive(Debug, Default, Serialize)]
struct ComposeVolume {}

#[derive(Debug, Serialize)]
struct ComposeNetwork {
    driver: &'static str,
}

fn escape(value: &str) -> String {
    value.replace('$', "$$")
}

fn escape_all(values: &[String]) -> Vec<String> {
    values.iter().map(|v| escape(v)).collect()
}

fn port_spec(port: &PortMapping) -> String {
    let base = match port.host_port {
        Some(host) => format!("{}:{}", host, port.container_port),
        None => port.container_port.to_string(),
    };
    match port.protocol {
        Protocol::Tcp => base,
        Protocol::Udp => format!("{}/udp", base),
    }
}

fn volume_spec(volume: &VolumeMount) -> String {
    let mut spec = format!("{}:{}", volume.source, volume.destination);
    if volume.read_only {
        spec.push_str(":ro");
    }
    spec
}

/// Named volumes are the sources that are not host paths
fn is_named_volume(source: &str) -> bool {
    !(source.starts_with('.') || source.starts_with('/') || source.starts_with('~'))
}

fn healthcheck(check: &HealthCheck) -> ComposeHealthcheck {
    ComposeHealthcheck {
        test: escape_all(&check.test),
        interval: format!("{}s", check.interval_secs),
        timeout: format!("{}s", check.timeout_secs),
        retries: check.retries,
        start_period: check.start_period_secs.map(|secs| format!("{}s", secs)),
    }
}

fn deploy(limits: &ResourceLimits) -> Option<ComposeDeploy> {
    if limits.cpus.is_none() && limits.memory_mb.is_none() {
        return None;
    }
    Some(ComposeDeploy {
        resources: ComposeResources {
            limits: ComposeLimits {
                cpus: limits.cpus.map(|cpus| cpus.to_string()),
                memory: limits.memory_mb.map(|mb| format!("{}M", mb)),
            },
        },
    })
}

fn compose_service(service: &ServiceDefinition) -> ComposeService {
    ComposeService {
        image: service.image.clone(),
        entrypoint: service.entrypoint.as_deref().map(escape_all),
        command: service.command.as_deref().map(escape_all),
        environment: service
            .environment
            .iter()
            .map(|(key, value)| (key.clone(), escape(value)))
            .collect(),
        ports: service.ports.iter().map(port_spec).collect(),
        volumes: service.volumes.iter().map(volume_spec).collect(),
        networks: service.networks.clone(),
        labels: service
            .labels
            .iter()
            .map(|(key, value)| (key.clone(), escape(value)))
            .collect(),
        restart: service.restart.as_str(),
        depends_on: service.depends_on.clone(),
        healthcheck: service.health_check.as_ref().map(healthcheck),
        deploy: deploy(&service.resources),
    }
}

/// Render mapping results as one docker-compose YAML document
///
/// Fails with `MappingError::Render` when two results share a service name.
pub fn render_compose(results: &[MappingResult]) -> MapperResult<String> {
    let mut file = ComposeFile {
        services: IndexMap::new(),
        volumes: IndexMap::new(),
        networks: IndexMap::new(),
    };

    for result in results {
        let service = &result.service;
        if file.services.contains_key(&service.name) {
            return Err(MappingError::Render(format!(
                "Duplicate service name {} (from {})",
                service.name, result.source_id
            )));
        }
        for volume in &service.volumes {
            if is_named_volume(&volume.source) {
                file.volumes
                    .entry(volume.source.clone())
                    .or_insert_with(ComposeVolume::default);
            }
        }
        for network in &service.networks {
            file.networks
                .entry(network.clone())
                .or_insert(ComposeNetwork { driver: "bridge" });
        }
        file.services
            .insert(service.name.clone(), compose_service(service));
    }

    debug!("Rendering compose file with {} services", file.services.len());
    serde_yaml::to_string(&file)
        .map_err(|e| MappingError::Render(format!("Failed to serialize compose file: {}", e)))
}
