use std::sync::Arc;

use cloudshift_gcp::catalog;
use cloudshift_mappers::{
    gcp_mappers, render_compose, MapperRegistry, RESOURCE_TYPE_LABEL, SOURCE_ID_LABEL,
};
use cloudshift_types::{
    MapContext, MappingError, Resource, ResourceMapper, SeededSecretGenerator,
};
use serde_json::{json, Value};

fn resource(id: &str, name: &str, resource_type: cloudshift_types::ResourceType, config: Value) -> Resource {
    let config = match config {
        Value::Object(map) => map,
        _ => Default::default(),
    };
    Resource::new(id, name, resource_type, "us-central1").with_config(config)
}

fn sample_resources() -> Vec<Resource> {
    vec![
        resource(
            "google_compute_instance.web",
            "web",
            catalog::COMPUTE_INSTANCE,
            json!({ "machine_type": "e2-small", "tags": ["http-server"] }),
        ),
        resource(
            "google_sql_database_instance.db",
            "db",
            catalog::SQL_INSTANCE,
            json!({ "database_version": "POSTGRES_15", "settings": [{ "tier": "db-g1-small" }] }),
        ),
        resource(
            "google_storage_bucket.assets",
            "assets",
            catalog::STORAGE_BUCKET,
            json!({ "name": "acme-assets" }),
        ),
        resource(
            "google_redis_instance.cache",
            "cache",
            catalog::REDIS_INSTANCE,
            json!({ "memory_size_gb": 2, "auth_enabled": true }),
        ),
        resource(
            "google_pubsub_topic.events",
            "events",
            catalog::PUBSUB_TOPIC,
            json!({ "name": "events" }),
        ),
        resource(
            "google_cloud_run_service.api",
            "api",
            catalog::CLOUD_RUN_SERVICE,
            json!({ "template": [{ "spec": [{ "containers": [{ "image": "nginx:1.27" }] }] }] }),
        ),
        resource(
            "google_cloudfunctions_function.hook",
            "hook",
            catalog::CLOUD_FUNCTION,
            json!({ "runtime": "go122", "entry_point": "Hook" }),
        ),
    ]
}

fn registry() -> MapperRegistry {
    let mut registry = MapperRegistry::new();
    for mapper in gcp_mappers() {
        registry.register(mapper);
    }
    registry
}

fn seeded_context() -> MapContext {
    MapContext::new(Arc::new(SeededSecretGenerator::new(2024)))
}

#[test]
fn test_every_mapper_labels_and_networks_its_service() {
    let registry = registry();
    let ctx = seeded_context();

    for resource in sample_resources() {
        let result = registry.map(&ctx, &resource).unwrap();
        let service = &result.service;

        assert_eq!(result.source_id, resource.id);
        assert_eq!(
            service.labels.get(SOURCE_ID_LABEL),
            Some(&resource.id),
            "{}",
            resource.id
        );
        assert_eq!(
            service.labels.get(RESOURCE_TYPE_LABEL).map(String::as_str),
            Some(resource.resource_type.name())
        );
        assert_eq!(service.networks, vec!["cloudshift".to_string()]);
        assert_eq!(service.name, resource.name);
        assert!(service.resources.cpus.is_some());
        assert!(service.resources.memory_mb.is_some());
    }
}

#[test]
fn test_mapping_is_deterministic_with_a_seeded_generator() {
    let registry = registry();

    let first: Vec<_> = sample_resources()
        .iter()
        .map(|r| registry.map(&seeded_context(), r).unwrap())
        .collect();
    let second: Vec<_> = sample_resources()
        .iter()
        .map(|r| registry.map(&seeded_context(), r).unwrap())
        .collect();

    assert_eq!(first, second);
    assert_eq!(render_compose(&first).unwrap(), render_compose(&second).unwrap());
}

#[test]
fn test_mappers_reject_missing_and_foreign_resources() {
    let bucket = resource("b", "b", catalog::STORAGE_BUCKET, json!({}));

    for mapper in gcp_mappers() {
        assert_eq!(mapper.validate(None), Err(MappingError::NilResource));
        if mapper.resource_type() == catalog::STORAGE_BUCKET {
            continue;
        }
        let err = mapper.map(&MapContext::default(), &bucket).unwrap_err();
        assert!(matches!(err, MappingError::WrongResourceType { .. }));
    }
}

#[test]
fn test_rendered_compose_contains_every_service() {
    let registry = registry();
    let ctx = seeded_context();
    let results: Vec<_> = sample_resources()
        .iter()
        .map(|r| registry.map(&ctx, r).unwrap())
        .collect();

    let yaml = render_compose(&results).unwrap();
    let doc: serde_yaml::Value = serde_yaml::from_str(&yaml).unwrap();

    for name in ["web", "db", "assets", "cache", "events", "api", "hook"] {
        assert!(doc["services"].get(name).is_some(), "missing service {}", name);
    }
    assert!(doc["volumes"].get("db-data").is_some());
    assert!(doc["networks"].get("cloudshift").is_some());
}

#[test]
fn test_unsupported_type_is_reported() {
    let registry = registry();
    let subnet = resource("subnet", "subnet", catalog::SUBNETWORK, json!({}));

    let err = registry.map(&MapContext::default(), &subnet).unwrap_err();
    assert_eq!(err, MappingError::UnsupportedResourceType(catalog::SUBNETWORK));
}
