use std::path::PathBuf;

use cloudshift_gcp::{catalog, TerraformSourceParser};
use cloudshift_types::{DiscoveryError, ParseOptions, ResourceParser, REDACTED};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn fixture_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/terraform")
}

#[tokio::test]
async fn test_parse_terraform_sources() {
    let parser = TerraformSourceParser::new();

    let infra = parser
        .parse(&CancellationToken::new(), &fixture_dir(), &ParseOptions::default())
        .await
        .unwrap();

    assert_eq!(infra.len(), 4);
    assert!(!infra.resource_ids().any(|id| id.starts_with("random_")));

    let api = infra.get_resource("google_compute_instance.api").unwrap();
    assert_eq!(api.resource_type, catalog::COMPUTE_INSTANCE);
    assert_eq!(api.name, "staging-api");
    assert_eq!(api.region, "europe-west1");
    assert_eq!(api.tags.get("env").map(String::as_str), Some("staging"));
    assert_eq!(
        api.dependencies(),
        &[
            "google_compute_network.vpc".to_string(),
            "google_compute_subnetwork.app".to_string()
        ]
    );
    assert_eq!(api.config_str("metadata_startup_script"), Some(REDACTED));

    let vpc = infra.get_resource("google_compute_network.vpc").unwrap();
    assert_eq!(vpc.region, "europe-west1");
    assert!(vpc.dependencies().is_empty());

    let subnet = infra.get_resource("google_compute_subnetwork.app").unwrap();
    assert_eq!(subnet.dependencies(), &["google_compute_network.vpc".to_string()]);

    let db = infra.get_resource("google_sql_database_instance.db").unwrap();
    assert_eq!(db.resource_type, catalog::SQL_INSTANCE);
    assert_eq!(db.config_str("root_password"), Some(REDACTED));
    assert_eq!(db.config_str("database_version"), Some("MYSQL_8_0"));

    assert_eq!(
        infra.metadata.get("project_id").map(String::as_str),
        Some("acme-staging")
    );
    assert_eq!(
        infra.metadata.get("module.cache.source").map(String::as_str),
        Some("./modules/cache")
    );
    assert!(infra.validate().unwrap().is_clean());
}

#[tokio::test]
async fn test_region_option_overrides_provider_default() {
    let options = ParseOptions::default().with_region("us-west1");

    let infra = TerraformSourceParser::new()
        .parse(&CancellationToken::new(), &fixture_dir(), &options)
        .await
        .unwrap();

    let vpc = infra.get_resource("google_compute_network.vpc").unwrap();
    assert_eq!(vpc.region, "us-west1");
    let api = infra.get_resource("google_compute_instance.api").unwrap();
    assert_eq!(api.region, "europe-west1");
}

#[tokio::test]
async fn test_unparseable_file() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("broken.tf"), "resource \"google_pubsub_topic\" {\n").unwrap();
    std::fs::write(
        dir.path().join("ok.tf"),
        "resource \"google_pubsub_topic\" \"events\" {\n  name = \"events\"\n}\n",
    )
    .unwrap();
    let parser = TerraformSourceParser::new();

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
    assert!(infra.contains("google_pubsub_topic.events"));
}

#[test]
fn test_detection_scales_with_google_share() {
    let parser = TerraformSourceParser::new();

    let detection = parser.auto_detect(&fixture_dir());
    assert!(detection.can_handle);
    assert!((detection.confidence - 0.8 * 0.85).abs() < 1e-9);

    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("main.tf"),
        "resource \"aws_s3_bucket\" \"logs\" {\n  bucket = \"logs\"\n}\n",
    )
    .unwrap();
    assert!(!parser.auto_detect(dir.path()).can_handle);
}
