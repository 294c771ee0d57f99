//! Compute Engine instance mapper
//!
//! An instance becomes a long-running container built from the closest base
//! image of its boot disk. Sizing comes from the machine type, published
//! ports from the instance's network tags.

use cloudshift_gcp::catalog;
use cloudshift_types::{
    MapContext, MapperResult, MappingResult, Protocol, Resource, ResourceLimits, ResourceMapper,
    ResourceType, REDACTED,
};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

use crate::common::{
    artifact_path, base_service, first_str, first_value, last_segment, mount_artifact,
    ARTIFACT_MOUNT_DIR, DEFAULT_LIMITS,
};

/// Base image used when the boot image is unknown
pub const DEFAULT_BASE_IMAGE: &str = "debian:12-slim";

const STARTUP_SCRIPT: &str = "startup.sh";

/// Machine type to (CPUs, memory MB)
const MACHINE_TYPES: &[(&str, f64, u64)] = &[
    ("f1-micro", 0.2, 614),
    ("g1-small", 0.5, 1740),
    ("e2-micro", 0.25, 1024),
    ("e2-small", 0.5, 2048),
    ("e2-medium", 1.0, 4096),
    ("e2-standard-2", 2.0, 8192),
    ("e2-standard-4", 4.0, 16384),
    ("e2-standard-8", 8.0, 32768),
    ("e2-highmem-2", 2.0, 16384),
    ("e2-highcpu-2", 2.0, 2048),
    ("n1-standard-1", 1.0, 3840),
    ("n1-standard-2", 2.0, 7680),
    ("n1-standard-4", 4.0, 15360),
    ("n1-standard-8", 8.0, 30720),
    ("n2-standard-2", 2.0, 8192),
    ("n2-standard-4", 4.0, 16384),
    ("n2-standard-8", 8.0, 32768),
    ("n2d-standard-2", 2.0, 8192),
    ("c2-standard-4", 4.0, 16384),
    ("t2d-standard-1", 1.0, 4096),
];

/// Ordered substring rules from boot image to container base image
const BASE_IMAGES: &[(&str, &str)] = &[
    ("ubuntu-2404", "ubuntu:24.04"),
    ("ubuntu-2204", "ubuntu:22.04"),
    ("ubuntu-2004", "ubuntu:20.04"),
    ("ubuntu", "ubuntu:22.04"),
    ("debian-12", "debian:12-slim"),
    ("debian-11", "debian:11-slim"),
    ("debian", "debian:12-slim"),
    ("rocky-linux-9", "rockylinux:9"),
    ("rocky-linux-8", "rockylinux:8"),
    ("centos-stream-9", "quay.io/centos/centos:stream9"),
    ("rhel-9", "redhat/ubi9"),
    ("rhel-8", "redhat/ubi8"),
    ("sles", "opensuse/leap:15"),
    ("cos-", "alpine:3.20"),
];

/// Network tag to published TCP port
const TAG_PORTS: &[(&str, u16)] = &[
    ("http-server", 80),
    ("https-server", 443),
    ("http", 80),
    ("https", 443),
    ("web", 80),
    ("api", 8080),
    ("grpc", 50051),
];

const MACHINE_TYPE_PATHS: &[&str] = &["machine_type", "machineType"];

const BOOT_IMAGE_PATHS: &[&str] = &[
    "boot_disk.0.initialize_params.0.image",
    "disks.0.initializeParams.sourceImage",
    "source_instance_template_image",
];

const ACCELERATOR_PATHS: &[&str] = &["guest_accelerator.0", "guestAccelerators.0"];

static CUSTOM_MACHINE_TYPE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:[a-z0-9]+-)?custom-(\d+)-(\d+)(?:-ext)?$")
        .expect("custom machine type pattern is valid")
});

/// Sizing for a machine type, including `custom-<cpus>-<mb>` shapes
pub fn machine_limits(machine_type: &str) -> Option<ResourceLimits> {
    let machine_type = machine_type.to_ascii_lowercase();
    if let Some((_, cpus, memory_mb)) = MACHINE_TYPES.iter().find(|(name, _, _)| *name == machine_type)
    {
        return Some(ResourceLimits::new(*cpus, *memory_mb));
    }
    let caps = CUSTOM_MACHINE_TYPE.captures(&machine_type)?;
    let cpus: f64 = caps[1].parse().ok()?;
    let memory_mb: u64 = caps[2].parse().ok()?;
    Some(ResourceLimits::new(cpus, memory_mb))
}

/// Container base image for a boot image path or family
pub fn base_image(source_image: &str) -> Option<&'static str> {
    let source_image = source_image.to_ascii_lowercase();
    BASE_IMAGES
        .iter()
        .find(|(needle, _)| source_image.contains(needle))
        .map(|(_, image)| *image)
}

fn tag_port(tag: &str) -> Option<u16> {
    TAG_PORTS
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(tag))
        .map(|(_, port)| *port)
}

/// Network tags as a plain list (`tags`) or wrapped in `tags.items`
fn network_tags(resource: &Resource) -> Vec<&str> {
    let tags = match resource.config.get("tags") {
        Some(Value::Array(items)) => items,
        Some(Value::Object(object)) => match object.get("items") {
            Some(Value::Array(items)) => items,
            _ => return Vec::new(),
        },
        _ => return Vec::new(),
    };
    tags.iter().filter_map(Value::as_str).collect()
}

/// Startup script from the dedicated attribute or the metadata entries
fn startup_script(resource: &Resource) -> Option<&str> {
    if let Some(script) = first_str(
        resource,
        &["metadata_startup_script", "metadata.startup-script"],
    ) {
        return Some(script);
    }
    resource
        .config_value("metadata.items")
        .and_then(Value::as_array)?
        .iter()
        .find(|item| item.get("key").and_then(Value::as_str) == Some("startup-script"))
        .and_then(|item| item.get("value"))
        .and_then(Value::as_str)
}

/// Maps `gcp:compute:instance`
#[derive(Debug, Clone, Copy, Default)]
pub struct ComputeInstanceMapper;

impl ComputeInstanceMapper {
    pub fn new() -> Self {
        Self
    }
}

impl ResourceMapper for ComputeInstanceMapper {
    fn resource_type(&self) -> ResourceType {
        catalog::COMPUTE_INSTANCE
    }

    fn map(&self, ctx: &MapContext, resource: &Resource) -> MapperResult<MappingResult> {
        self.validate(Some(resource))?;
        let mut result = MappingResult::new(
            resource.id.clone(),
            base_service(ctx, resource, DEFAULT_BASE_IMAGE),
        );

        if let Some(source) = first_str(resource, BOOT_IMAGE_PATHS) {
            match base_image(source) {
                Some(image) => result.service.image = image.to_string(),
                None if source.to_ascii_lowercase().contains("windows") => {
                    result.warn(format!(
                        "Windows boot image {} cannot run as a Linux container",
                        source
                    ));
                    result.manual_step(format!(
                        "Provide a Windows host or rewrite the workload of {} for Linux",
                        resource.name
                    ));
                }
                None => result.warn(format!(
                    "No base image known for boot image {}; using {}",
                    source, DEFAULT_BASE_IMAGE
                )),
            }
        }

        let machine_type = first_str(resource, MACHINE_TYPE_PATHS).map(last_segment);
        let limits = match machine_type.map(|name| (name, machine_limits(name))) {
            Some((_, Some(limits))) => limits,
            Some((name, None)) => {
                result.warn(format!(
                    "Unknown machine type {}; using default 1 CPU / 2048 MB",
                    name
                ));
                DEFAULT_LIMITS
            }
            None => DEFAULT_LIMITS,
        };
        result.service.resources = limits;

        for tag in network_tags(resource) {
            if let Some(port) = tag_port(tag) {
                result.service.add_port(port, Protocol::Tcp);
            }
        }

        let mount_point = format!("{}/{}", ARTIFACT_MOUNT_DIR, STARTUP_SCRIPT);
        match startup_script(resource) {
            Some(REDACTED) => {
                result.manual_step(format!(
                    "The startup script of {} was redacted during discovery; restore it to {} and mount it at {}",
                    resource.name,
                    artifact_path(&result.service.name, STARTUP_SCRIPT),
                    mount_point
                ));
                result.service.command = Some(vec!["sleep".to_string(), "infinity".to_string()]);
            }
            Some(script) => {
                let body = if script.starts_with("#!") {
                    script.to_string()
                } else {
                    format!("#!/bin/sh\n{}", script)
                };
                result.add_script(STARTUP_SCRIPT, body);
                mount_artifact(&mut result.service, STARTUP_SCRIPT, mount_point.clone());
                result.service.command = Some(vec![
                    "/bin/sh".to_string(),
                    "-c".to_string(),
                    format!("sh {} && exec sleep infinity", mount_point),
                ]);
            }
            None => {
                result.service.command = Some(vec!["sleep".to_string(), "infinity".to_string()]);
            }
        }

        if first_value(resource, ACCELERATOR_PATHS).is_some() {
            result.warn("GPU accelerators are not attached to the local container");
        }

        debug!(
            "Mapped compute instance {} to image {}",
            resource.id, result.service.image
        );
        Ok(result)
    }
}
