//! Memorystore for Redis mapper

use cloudshift_gcp::catalog;
use cloudshift_types::{
    HealthCheck, MapContext, MapperResult, MappingResult, Protocol, Resource, ResourceLimits,
    ResourceMapper, ResourceType,
};
use serde_json::Value;
use tracing::debug;

use crate::common::{base_service, data_volume, first_bool, first_f64, first_str, first_value};

pub const DEFAULT_REDIS_VERSION: &str = "7.2";
pub const REDIS_PORT: u16 = 6379;

/// Memorystore's default eviction policy
const DEFAULT_EVICTION_POLICY: &str = "volatile-lru";

/// Smallest Memorystore instance
const DEFAULT_MEMORY_GB: f64 = 1.0;

const VERSION_PATHS: &[&str] = &["redis_version", "redisVersion"];
const MEMORY_PATHS: &[&str] = &["memory_size_gb", "memorySizeGb"];
const AUTH_PATHS: &[&str] = &["auth_enabled", "authEnabled"];
const CONFIG_PATHS: &[&str] = &["redis_configs", "redisConfigs"];
const TIER_PATHS: &[&str] = &["tier"];
const TRANSIT_ENCRYPTION_PATHS: &[&str] = &["transit_encryption_mode", "transitEncryptionMode"];

/// Image tag for `REDIS_7_2`, `REDIS_6_X`, ...
pub fn redis_version_tag(value: &str) -> Option<String> {
    let upper = value.trim().to_ascii_uppercase();
    let rest = upper.strip_prefix("REDIS_")?;
    let parts: Vec<&str> = rest
        .split('_')
        .take_while(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit()))
        .collect();
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("."))
}

/// Container memory for a given `maxmemory`, leaving room for overhead
fn container_memory_mb(maxmemory_mb: u64) -> u64 {
    maxmemory_mb + maxmemory_mb / 4
}

/// Maps `gcp:redis:instance`
#[derive(Debug, Clone, Copy, Default)]
pub struct RedisMapper;

impl RedisMapper {
    pub fn new() -> Self {
        Self
    }
}

impl ResourceMapper for RedisMapper {
    fn resource_type(&self) -> ResourceType {
        catalog::REDIS_INSTANCE
    }

    fn map(&self, ctx: &MapContext, resource: &Resource) -> MapperResult<MappingResult> {
        self.validate(Some(resource))?;

        let mut warnings = Vec::new();
        let version = match first_str(resource, VERSION_PATHS) {
            Some(raw) => redis_version_tag(raw).unwrap_or_else(|| {
                warnings.push(format!(
                    "Unrecognized Redis version {}; using {}",
                    raw, DEFAULT_REDIS_VERSION
                ));
                DEFAULT_REDIS_VERSION.to_string()
            }),
            None => DEFAULT_REDIS_VERSION.to_string(),
        };

        let mut result = MappingResult::new(
            resource.id.clone(),
            base_service(ctx, resource, format!("redis:{}-alpine", version)),
        );
        result.warnings.extend(warnings);

        let memory_gb = first_f64(resource, MEMORY_PATHS)
            .filter(|gb| *gb > 0.0)
            .unwrap_or(DEFAULT_MEMORY_GB);
        let maxmemory_mb = (memory_gb * 1024.0).round() as u64;
        let eviction_policy = first_value(resource, CONFIG_PATHS)
            .and_then(|configs| configs.get("maxmemory-policy"))
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_EVICTION_POLICY);

        let mut command = vec![
            "redis-server".to_string(),
            "--maxmemory".to_string(),
            format!("{}mb", maxmemory_mb),
            "--maxmemory-policy".to_string(),
            eviction_policy.to_string(),
            "--appendonly".to_string(),
            "yes".to_string(),
        ];

        let health = if first_bool(resource, AUTH_PATHS).unwrap_or(false) {
            let password = ctx.secrets.password();
            command.push("--requirepass".to_string());
            command.push(password.clone());
            result
                .service
                .environment
                .insert("REDIS_PASSWORD".to_string(), password.clone());
            format!("redis-cli -a {} --no-auth-warning ping | grep PONG", password)
        } else {
            "redis-cli ping | grep PONG".to_string()
        };

        let service = &mut result.service;
        service.command = Some(command);
        service.add_port(REDIS_PORT, Protocol::Tcp);
        service.health_check = Some(HealthCheck::shell(health));
        service.resources = ResourceLimits::new(1.0, container_memory_mb(maxmemory_mb));
        data_volume(service, "/data");

        if first_str(resource, TIER_PATHS) == Some("STANDARD_HA") {
            result.warn("STANDARD_HA replication is not emulated; running a single node");
        }
        if first_str(resource, TRANSIT_ENCRYPTION_PATHS) == Some("SERVER_AUTHENTICATION") {
            result.warn("In-transit encryption is not configured locally; clients must connect without TLS");
        }

        debug!(
            "Mapped Redis instance {} to redis {} with maxmemory {}mb",
            resource.id, version, maxmemory_mb
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloudshift_types::SeededSecretGenerator;
    use serde_json::json;
    use std::sync::Arc;

    fn redis(config: Value) -> Resource {
        let config = match config {
            Value::Object(map) => map,
            _ => Default::default(),
        };
        Resource::new(
            "projects/p/locations/us-central1/instances/cache",
            "cache",
            catalog::REDIS_INSTANCE,
            "us-central1",
        )
        .with_config(config)
    }

    #[test]
    fn test_version_tags() {
        assert_eq!(redis_version_tag("REDIS_7_2").as_deref(), Some("7.2"));
        assert_eq!(redis_version_tag("REDIS_6_X").as_deref(), Some("6"));
        assert_eq!(redis_version_tag("redis_5_0").as_deref(), Some("5.0"));
        assert_eq!(redis_version_tag("VALKEY_8_0"), None);
        assert_eq!(redis_version_tag("REDIS_X"), None);
    }

    #[test]
    fn test_memory_sizing_and_auth() {
        let resource = redis(json!({
            "redis_version": "REDIS_6_X",
            "memory_size_gb": 4,
            "auth_enabled": true,
            "tier": "STANDARD_HA",
            "redis_configs": { "maxmemory-policy": "allkeys-lru" }
        }));
        let ctx = MapContext::new(Arc::new(SeededSecretGenerator::new(1)));

        let result = RedisMapper::new().map(&ctx, &resource).unwrap();
        let service = &result.service;

        assert_eq!(service.image, "redis:6-alpine");
        let command = service.command.as_ref().unwrap();
        assert_eq!(command[2], "4096mb");
        assert_eq!(command[4], "allkeys-lru");
        assert!(command.contains(&"--requirepass".to_string()));
        let password = service.environment.get("REDIS_PASSWORD").unwrap();
        assert!(service.health_check.as_ref().unwrap().test[1].contains(password.as_str()));
        assert_eq!(service.resources, ResourceLimits::new(1.0, 5120));
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn test_defaults_without_config() {
        let result = RedisMapper::new()
            .map(
                &MapContext::default(),
                &redis(json!({ "memorySizeGb": 1, "redisVersion": "REDIS_7_0" })),
            )
            .unwrap();

        assert_eq!(result.service.image, "redis:7.0-alpine");
        let command = result.service.command.as_ref().unwrap();
        assert_eq!(command[2], "1024mb");
        assert_eq!(command[4], DEFAULT_EVICTION_POLICY);
        assert!(!command.contains(&"--requirepass".to_string()));
        assert!(result.service.environment.is_empty());
        assert_eq!(result.service.ports[0].container_port, 6379);
    }

    #[test]
    fn test_unrecognized_version_warns() {
        let result = RedisMapper::new()
            .map(&MapContext::default(), &redis(json!({ "redis_version": "VALKEY_8_0" })))
            .unwrap();

        assert_eq!(result.service.image, "redis:7.2-alpine");
        assert_eq!(result.warnings.len(), 1);
    }
}
