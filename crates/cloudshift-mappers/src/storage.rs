//! Cloud Storage bucket mapper
//!
//! Each bucket gets a MinIO server; `setup.sh` creates the bucket inside it
//! and mirrors the versioning setting.

use cloudshift_gcp::catalog;
use cloudshift_types::{
    HealthCheck, MapContext, MapperResult, MappingResult, Protocol, Resource, ResourceLimits,
    ResourceMapper, ResourceType,
};
use tracing::debug;

use crate::common::{
    base_service, data_volume, first_bool, first_str, first_value, mount_artifact,
    ARTIFACT_MOUNT_DIR,
};

pub const MINIO_IMAGE: &str = "minio/minio:RELEASE.2024-11-07T00-52-20Z";
pub const MINIO_API_PORT: u16 = 9000;
pub const MINIO_CONSOLE_PORT: u16 = 9001;

const SETUP_SCRIPT: &str = "setup.sh";

const VERSIONING_PATHS: &[&str] = &["versioning.0.enabled", "versioning.enabled"];
const LIFECYCLE_PATHS: &[&str] = &["lifecycle_rule.0", "lifecycle.rule.0"];
const CORS_PATHS: &[&str] = &["cors.0"];
const RETENTION_PATHS: &[&str] = &["retention_policy.0", "retentionPolicy"];

fn setup_script(bucket: &str, versioning: bool) -> String {
    let mut script = format!(
        "#!/bin/sh\n\
         # Create bucket {bucket} in the local MinIO server.\n\
         set -eu\n\
         mc alias set local http://127.0.0.1:{port} \"$MINIO_ROOT_USER\" \"$MINIO_ROOT_PASSWORD\"\n\
         mc mb --ignore-existing local/{bucket}\n",
        bucket = bucket,
        port = MINIO_API_PORT
    );
    if versioning {
        script.push_str(&format!("mc version enable local/{}\n", bucket));
    }
    script
}

/// Maps `gcp:storage:bucket`
#[derive(Debug, Clone, Copy, Default)]
pub struct StorageBucketMapper;

impl StorageBucketMapper {
    pub fn new() -> Self {
        Self
    }
}

impl ResourceMapper for StorageBucketMapper {
    fn resource_type(&self) -> ResourceType {
        catalog::STORAGE_BUCKET
    }

    fn map(&self, ctx: &MapContext, resource: &Resource) -> MapperResult<MappingResult> {
        self.validate(Some(resource))?;
        let mut result = MappingResult::new(
            resource.id.clone(),
            base_service(ctx, resource, MINIO_IMAGE),
        );

        let bucket = first_str(resource, &["name"])
            .unwrap_or(&resource.name)
            .to_ascii_lowercase();
        let versioning = first_bool(resource, VERSIONING_PATHS).unwrap_or(false);

        let user = format!("minio_{}", ctx.secrets.alphanumeric(8).to_ascii_lowercase());
        let password = ctx.secrets.password();

        let service = &mut result.service;
        service.command = Some(vec![
            "server".to_string(),
            "/data".to_string(),
            "--console-address".to_string(),
            format!(":{}", MINIO_CONSOLE_PORT),
        ]);
        service.environment.insert("MINIO_ROOT_USER".to_string(), user.clone());
        service
            .environment
            .insert("MINIO_ROOT_PASSWORD".to_string(), password.clone());
        // Lets `mc ready local` reach the server without a configured alias
        service.environment.insert(
            "MC_HOST_local".to_string(),
            format!("http://{}:{}@127.0.0.1:{}", user, password, MINIO_API_PORT),
        );
        service.add_port(MINIO_API_PORT, Protocol::Tcp);
        service.add_port(MINIO_CONSOLE_PORT, Protocol::Tcp);
        service.health_check = Some(HealthCheck::shell("mc ready local"));
        service.resources = ResourceLimits::new(1.0, 1024);
        data_volume(service, "/data");

        let mount_point = format!("{}/{}", ARTIFACT_MOUNT_DIR, SETUP_SCRIPT);
        mount_artifact(service, SETUP_SCRIPT, mount_point.clone());
        let service_name = service.name.clone();

        result.add_script(SETUP_SCRIPT, setup_script(&bucket, versioning));
        result.manual_step(format!(
            "Create bucket {} once {} is healthy: docker compose exec {} sh {}",
            bucket, service_name, service_name, mount_point
        ));
        result.manual_step(format!(
            "Copy objects with: gcloud storage cp -r gs://{} . and mc cp -r into local/{}",
            bucket, bucket
        ));

        if first_value(resource, LIFECYCLE_PATHS).is_some() {
            result.warn("Lifecycle rules are not applied to the local bucket");
        }
        if first_value(resource, CORS_PATHS).is_some() {
            result.warn("CORS configuration is not applied to the local bucket");
        }
        if first_value(resource, RETENTION_PATHS).is_some() {
            result.warn("Retention policy is not enforced locally");
        }

        debug!(
            "Mapped storage bucket {} to MinIO (versioning: {})",
            resource.id, versioning
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn bucket(config: Value) -> Resource {
        let config = match config {
            Value::Object(map) => map,
            _ => Default::default(),
        };
        Resource::new("b/acme-assets", "acme-assets", catalog::STORAGE_BUCKET, "us")
            .with_config(config)
    }

    #[test]
    fn test_maps_bucket_to_minio() {
        let resource = bucket(json!({
            "name": "Acme-Assets",
            "versioning": [{ "enabled": true }],
            "lifecycle_rule": [{ "action": [{ "type": "Delete" }] }]
        }));

        let result = StorageBucketMapper::new()
            .map(&MapContext::default(), &resource)
            .unwrap();

        let service = &result.service;
        assert_eq!(service.image, MINIO_IMAGE);
        assert_eq!(
            service.ports.iter().map(|p| p.container_port).collect::<Vec<_>>(),
            vec![9000, 9001]
        );
        assert!(service.environment.contains_key("MINIO_ROOT_PASSWORD"));
        let setup = &result.scripts["setup.sh"];
        assert!(setup.contains("mc mb --ignore-existing local/acme-assets"));
        assert!(setup.contains("mc version enable local/acme-assets"));
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(service.volumes[0].source, "acme-assets-data");
    }

    #[test]
    fn test_live_versioning_flag_and_defaults() {
        let resource = bucket(json!({ "versioning": { "enabled": false } }));

        let result = StorageBucketMapper::new()
            .map(&MapContext::default(), &resource)
            .unwrap();

        let setup = &result.scripts["setup.sh"];
        assert!(setup.contains("local/acme-assets"));
        assert!(!setup.contains("mc version enable"));
        assert!(result.warnings.is_empty());
    }
}
