//! Mapper trait and mapping result types
//!
//! A mapper turns one canonical `Resource` into a locally runnable service
//! definition plus generated scripts and configuration files.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{MapperResult, MappingError};
use crate::resource::{Resource, ResourceType};
use crate::secrets::{OsSecretGenerator, SecretGenerator};

/// Shared network every generated service joins
pub const DEFAULT_NETWORK: &str = "cloudshift";

/// Execution context for `ResourceMapper::map`
///
/// Carries the injected random source; nothing else in a mapping is random.
#[derive(Clone)]
pub struct MapContext {
    pub secrets: Arc<dyn SecretGenerator>,
    /// Network name the generated services join
    pub network: String,
}

impl MapContext {
    pub fn new(secrets: Arc<dyn SecretGenerator>) -> Self {
        Self {
            secrets,
            network: DEFAULT_NETWORK.to_string(),
        }
    }

    pub fn with_network(mut self, network: impl Into<String>) -> Self {
        self.network = network.into();
        self
    }
}

impl Default for MapContext {
    fn default() -> Self {
        Self::new(Arc::new(OsSecretGenerator))
    }
}

impl std::fmt::Debug for MapContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapContext")
            .field("network", &self.network)
            .finish_non_exhaustive()
    }
}

/// Output of a mapper for one resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingResult {
    /// ID of the resource this result was generated from
    pub source_id: String,
    pub service: ServiceDefinition,
    /// Generated scripts keyed by file name
    #[serde(default)]
    pub scripts: BTreeMap<String, String>,
    /// Generated configuration file bodies keyed by file name
    #[serde(default)]
    pub configs: BTreeMap<String, String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    /// Steps the mapping cannot automate
    #[serde(default)]
    pub manual_steps: Vec<String>,
}

impl MappingResult {
    pub fn new(source_id: impl Into<String>, service: ServiceDefinition) -> Self {
        Self {
            source_id: source_id.into(),
            service,
            scripts: BTreeMap::new(),
            configs: BTreeMap::new(),
            warnings: Vec::new(),
            manual_steps: Vec::new(),
        }
    }

    pub fn add_script(&mut self, name: impl Into<String>, content: impl Into<String>) {
        self.scripts.insert(name.into(), content.into());
    }

    pub fn add_config(&mut self, name: impl Into<String>, content: impl Into<String>) {
        self.configs.insert(name.into(), content.into());
    }

    pub fn warn(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    pub fn manual_step(&mut self, step: impl Into<String>) {
        self.manual_steps.push(step.into());
    }
}

/// Target container service definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceDefinition {
    pub name: String,
    pub image: String,
    #[serde(default)]
    pub ports: Vec<PortMapping>,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
    pub command: Option<Vec<String>>,
    pub entrypoint: Option<Vec<String>>,
    pub resources: ResourceLimits,
    pub health_check: Option<HealthCheck>,
    #[serde(default)]
    pub volumes: Vec<VolumeMount>,
    #[serde(default)]
    pub networks: Vec<String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    pub restart: RestartPolicy,
    /// Names of services that must start first
    #[serde(default)]
    pub depends_on: Vec<String>,
}

impl ServiceDefinition {
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            ports: Vec::new(),
            environment: BTreeMap::new(),
            command: None,
            entrypoint: None,
            resources: ResourceLimits::default(),
            health_check: None,
            volumes: Vec::new(),
            networks: Vec::new(),
            labels: BTreeMap::new(),
            restart: RestartPolicy::UnlessStopped,
            depends_on: Vec::new(),
        }
    }

    pub fn add_port(&mut self, container_port: u16, protocol: Protocol) {
        if self.ports.iter().any(|p| p.container_port == container_port) {
            return;
        }
        self.ports.push(PortMapping {
            container_port,
            host_port: Some(container_port),
            protocol,
        });
    }

    pub fn add_volume(&mut self, source: impl Into<String>, destination: impl Into<String>) {
        self.volumes.push(VolumeMount {
            source: source.into(),
            destination: destination.into(),
            read_only: false,
        });
    }
}

/// Port mapping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortMapping {
    pub container_port: u16,
    pub host_port: Option<u16>,
    pub protocol: Protocol,
}

/// Network protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
}

/// Named volume or bind mount
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeMount {
    pub source: String,
    pub destination: String,
    pub read_only: bool,
}

/// CPU and memory limits
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// Number of CPUs (1.0 = one core)
    pub cpus: Option<f64>,
    /// Memory limit in MB
    pub memory_mb: Option<u64>,
}

impl ResourceLimits {
    pub fn new(cpus: f64, memory_mb: u64) -> Self {
        Self {
            cpus: Some(cpus),
            memory_mb: Some(memory_mb),
        }
    }
}

/// Container health check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheck {
    /// Test command, e.g. `["CMD-SHELL", "pg_isready -U postgres"]`
    pub test: Vec<String>,
    pub interval_secs: u32,
    pub timeout_secs: u32,
    pub retries: u32,
    pub start_period_secs: Option<u32>,
}

impl HealthCheck {
    /// Shell health check with the default timings
    pub fn shell(command: impl Into<String>) -> Self {
        Self {
            test: vec!["CMD-SHELL".to_string(), command.into()],
            interval_secs: 10,
            timeout_secs: 5,
            retries: 5,
            start_period_secs: Some(30),
        }
    }
}

/// Restart policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RestartPolicy {
    No,
    Always,
    OnFailure,
    UnlessStopped,
}

impl RestartPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RestartPolicy::No => "no",
            RestartPolicy::Always => "always",
            RestartPolicy::OnFailure => "on-failure",
            RestartPolicy::UnlessStopped => "unless-stopped",
        }
    }
}

/// Translates one resource type into a target service definition
///
/// `map` performs no I/O and never blocks; it is safe to call concurrently
/// for independent resources.
pub trait ResourceMapper: Send + Sync {
    /// The single resource type this mapper accepts
    fn resource_type(&self) -> ResourceType;

    /// Reject missing resources and resources of another type
    fn validate(&self, resource: Option<&Resource>) -> MapperResult<()> {
        let resource = resource.ok_or(MappingError::NilResource)?;
        let expected = self.resource_type();
        if resource.resource_type != expected {
            return Err(MappingError::WrongResourceType {
                expected,
                actual: resource.resource_type.clone(),
            });
        }
        Ok(())
    }

    /// Produce the mapping; deterministic for a given config and secret source
    fn map(&self, ctx: &MapContext, resource: &Resource) -> MapperResult<MappingResult>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{Category, Provider};

    const CACHE: ResourceType =
        ResourceType::new(Provider::Gcp, "gcp:redis:instance", Category::Database);
    const BUCKET: ResourceType =
        ResourceType::new(Provider::Gcp, "gcp:storage:bucket", Category::Storage);

    struct EchoMapper;

    impl ResourceMapper for EchoMapper {
        fn resource_type(&self) -> ResourceType {
            CACHE
        }

        fn map(&self, _ctx: &MapContext, resource: &Resource) -> MapperResult<MappingResult> {
            self.validate(Some(resource))?;
            Ok(MappingResult::new(
                resource.id.clone(),
                ServiceDefinition::new(resource.name.clone(), "redis:7-alpine"),
            ))
        }
    }

    #[test]
    fn test_default_validate_rejects_nil_and_wrong_type() {
        let mapper = EchoMapper;
        assert_eq!(mapper.validate(None), Err(MappingError::NilResource));

        let bucket = Resource::new("b", "b", BUCKET, "us");
        assert_eq!(
            mapper.validate(Some(&bucket)),
            Err(MappingError::WrongResourceType {
                expected: CACHE,
                actual: BUCKET
            })
        );

        let cache = Resource::new("c", "c", CACHE, "us-central1");
        assert!(mapper.validate(Some(&cache)).is_ok());
        assert!(mapper.map(&MapContext::default(), &bucket).is_err());
    }

    #[test]
    fn test_add_port_is_idempotent() {
        let mut service = ServiceDefinition::new("svc", "nginx");
        service.add_port(80, Protocol::Tcp);
        service.add_port(80, Protocol::Tcp);
        assert_eq!(service.ports.len(), 1);
        assert_eq!(service.ports[0].host_port, Some(80));
    }
}
