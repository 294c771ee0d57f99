use std::path::PathBuf;

use cloudshift_gcp::{catalog, DeploymentManagerParser};
use cloudshift_types::{DiscoveryError, ParseOptions, ResourceParser, REDACTED};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn fixture_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/deployment")
}

#[tokio::test]
async fn test_parse_deployment_config() {
    let parser = DeploymentManagerParser::new();

    let infra = parser
        .parse(&CancellationToken::new(), &fixture_dir(), &ParseOptions::default())
        .await
        .unwrap();

    assert_eq!(infra.len(), 5);

    let vm = infra.get_resource("app-vm").unwrap();
    assert_eq!(vm.resource_type, catalog::COMPUTE_INSTANCE);
    assert_eq!(vm.region, "us-east1");
    assert_eq!(vm.dependencies(), &["app-network".to_string()]);
    assert_eq!(vm.tags.get("app").map(String::as_str), Some("storefront"));
    assert_eq!(
        vm.config["metadata"]["items"][0]["value"].as_str(),
        Some(REDACTED)
    );

    let bucket = infra.get_resource("app-assets").unwrap();
    assert_eq!(bucket.resource_type, catalog::STORAGE_BUCKET);
    assert_eq!(bucket.region, "us");
    assert_eq!(bucket.dependencies(), &["app-vm".to_string()]);

    assert_eq!(
        infra.get_resource("app-network").unwrap().resource_type,
        catalog::NETWORK
    );
    assert_eq!(
        infra.get_resource("app-events").unwrap().resource_type,
        catalog::PUBSUB_TOPIC
    );

    let worker = infra.get_resource("worker").unwrap();
    assert!(worker.resource_type.is_opaque());
    assert_eq!(worker.dependencies(), &["app-events".to_string()]);

    assert!(infra.metadata.contains_key("import.templates/worker.jinja"));
    assert_eq!(
        infra.metadata.get("output.vmAddress").map(String::as_str),
        Some("$(ref.app-vm.networkInterfaces[0].networkIP)")
    );
    assert!(infra.validate().unwrap().is_clean());
}

#[tokio::test]
async fn test_entry_without_type_respects_ignore_errors() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("config.yaml"),
        "resources:\n  - name: orphan\n  - name: topic\n    type: pubsub.v1.topic\n",
    )
    .unwrap();
    let parser = DeploymentManagerParser::new();

    let err = parser
        .parse(&CancellationToken::new(), dir.path(), &ParseOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, DiscoveryError::MalformedInput { .. }));

    let infra = parser
        .parse(
            &CancellationToken::new(),
            dir.path(),
            &ParseOptions::default().with_ignore_errors(true),
        )
        .await
        .unwrap();
    assert_eq!(infra.len(), 1);
    assert!(infra.contains("topic"));
}

#[tokio::test]
async fn test_references_follow_document_order_not_key_order() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("config.yaml"),
        r#"
resources:
  - name: zvpc
    type: compute.v1.network
  - name: adisk
    type: compute.v1.disk
  - name: vm
    type: compute.v1.instance
    properties:
      zeta: $(ref.zvpc.selfLink)
      alpha: $(ref.adisk.selfLink)
      middle:
        later: $(ref.zvpc.name)
"#,
    )
    .unwrap();

    let infra = DeploymentManagerParser::new()
        .parse(&CancellationToken::new(), dir.path(), &ParseOptions::default())
        .await
        .unwrap();

    let vm = infra.get_resource("vm").unwrap();
    assert_eq!(
        vm.dependencies(),
        &["zvpc".to_string(), "adisk".to_string()]
    );
}

#[tokio::test]
async fn test_yaml_without_resources_is_not_a_config() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("values.yaml"), "replicas: 3\n").unwrap();

    let err = DeploymentManagerParser::new()
        .parse(&CancellationToken::new(), dir.path(), &ParseOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, DiscoveryError::NoFilesFound(_)));
}

#[test]
fn test_detection() {
    let parser = DeploymentManagerParser::new();

    let detection = parser.auto_detect(&fixture_dir());
    assert!(detection.can_handle);
    assert!((detection.confidence - 0.9).abs() < 1e-9);

    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("compose.yaml"),
        "services:\n  web:\n    image: nginx\n",
    )
    .unwrap();
    assert!(!parser.auto_detect(dir.path()).can_handle);
    assert!(parser.validate(dir.path()).is_ok());
    assert!(parser.validate(&dir.path().join("absent")).is_err());
}
