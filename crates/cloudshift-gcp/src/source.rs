//! Terraform source (HCL) parser
//!
//! Reads `.tf` files directly without evaluating them. Only `resource`
//! blocks whose type belongs to the Google providers are converted; other
//! providers' resources and data sources are skipped silently so mixed
//! directories parse cleanly.

use async_trait::async_trait;
use hcl::{Body, Value as HclValue};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use cloudshift_discovery::collect_files;
use cloudshift_types::{
    Detection, DiscoveryError, DiscoveryResult, Infrastructure, ParseOptions, ProgressEvent,
    Provider, Resource, ResourceParser, SourceFormat,
};

use crate::attributes::{labels_of, literal_str, redact_payloads, region_of};
use crate::catalog::{from_terraform_type, is_terraform_gcp_type};

const SOURCE_EXTENSIONS: &[&str] = &["tf"];
const CONFIDENCE_CEILING: f64 = 0.85;
const DETECT_FILE_LIMIT: usize = 128;

static RESOURCE_DECLARATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"resource\s+"([^"]+)"\s+"([^"]+)""#).expect("declaration pattern is valid")
});

static RESOURCE_REFERENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|[^.\w])(google_[a-z0-9_]+)\.([a-zA-Z_][a-zA-Z0-9_-]*)")
        .expect("reference pattern is valid")
});

/// `type.name` addresses of Google resources referenced anywhere in `value`
pub fn extract_references(value: &Value) -> Vec<String> {
    let mut found = Vec::new();
    collect_references(value, &mut found);
    found
}

fn collect_references(value: &Value, found: &mut Vec<String>) {
    match value {
        Value::String(s) => {
            for capture in RESOURCE_REFERENCE.captures_iter(s) {
                let address = format!("{}.{}", &capture[1], &capture[2]);
                if !found.contains(&address) {
                    found.push(address);
                }
            }
        }
        Value::Array(items) => items.iter().for_each(|item| collect_references(item, found)),
        Value::Object(map) => map.values().for_each(|item| collect_references(item, found)),
        _ => {}
    }
}

/// Attributes and nested blocks of an HCL body as JSON
///
/// Expressions that are not literals become `${...}` strings; nested blocks
/// are collected into arrays keyed by block identifier.
fn body_to_json(body: &Body) -> Map<String, Value> {
    let mut map = Map::new();
    for attribute in body.attributes() {
        let value = serde_json::to_value(HclValue::from(attribute.expr().clone()))
            .unwrap_or(Value::Null);
        map.insert(attribute.key().to_string(), value);
    }
    for block in body.blocks() {
        let nested = Value::Object(body_to_json(block.body()));
        match map
            .entry(block.identifier().to_string())
            .or_insert_with(|| Value::Array(Vec::new()))
        {
            Value::Array(items) => items.push(nested),
            other => *other = Value::Array(vec![other.take(), nested]),
        }
    }
    map
}

/// A parsed `.tf` file
struct SourceFile {
    path: String,
    body: Body,
}

/// IaC-source parser for Terraform configurations
#[derive(Debug, Default, Clone)]
pub struct TerraformSourceParser;

impl TerraformSourceParser {
    pub fn new() -> Self {
        Self
    }

    /// Read provider defaults and module sources into metadata
    fn read_settings(infra: &mut Infrastructure, files: &[SourceFile]) -> Option<String> {
        let mut provider_region = None;
        for file in files {
            for block in file.body.blocks() {
                let labels = block.labels();
                match block.identifier() {
                    "provider" if labels.first().is_some_and(|l| l.as_str().starts_with("google")) => {
                        let settings = body_to_json(block.body());
                        if let Some(project) = literal_str(&settings, "project") {
                            infra.set_metadata("project_id", project);
                        }
                        if provider_region.is_none() {
                            provider_region = literal_str(&settings, "region").map(str::to_string);
                        }
                    }
                    "module" if !labels.is_empty() => {
                        let settings = body_to_json(block.body());
                        if let Some(module_source) = literal_str(&settings, "source") {
                            infra.set_metadata(
                                format!("module.{}.source", labels[0].as_str()),
                                module_source,
                            );
                        }
                    }
                    _ => {}
                }
            }
        }
        provider_region
    }

    fn add_resources(
        infra: &mut Infrastructure,
        file: &SourceFile,
        default_region: Option<&str>,
        options: &ParseOptions,
    ) -> DiscoveryResult<usize> {
        let mut added = 0usize;
        for block in file.body.blocks() {
            if block.identifier() != "resource" {
                continue;
            }
            let labels = block.labels();
            if labels.len() < 2 {
                continue;
            }
            let native_type = labels[0].as_str();
            let block_name = labels[1].as_str();
            if !is_terraform_gcp_type(native_type) {
                debug!("Skipping non-Google resource {}.{}", native_type, block_name);
                continue;
            }

            let resource_type = from_terraform_type(native_type);
            if !options.admits(&resource_type) {
                continue;
            }

            let id = format!("{}.{}", native_type, block_name);
            let mut config = Value::Object(body_to_json(block.body()));
            let references = extract_references(&config);
            redact_payloads(&mut config, options.include_sensitive);
            let Value::Object(config) = config else {
                continue;
            };

            let name = literal_str(&config, "name").unwrap_or(block_name).to_string();
            let region = region_of(&config, default_region);

            let mut resource = Resource::new(id, name, resource_type, region);
            resource.tags = labels_of(&config);
            resource.config = config;
            for reference in references {
                resource.add_dependency(reference);
            }

            infra.add_resource(resource)?;
            added += 1;
        }
        Ok(added)
    }
}

#[async_trait]
impl ResourceParser for TerraformSourceParser {
    fn name(&self) -> &str {
        "gcp-terraform-source"
    }

    fn provider(&self) -> Provider {
        Provider::Gcp
    }

    fn supported_formats(&self) -> Vec<SourceFormat> {
        vec![SourceFormat::IacSource]
    }

    fn validate(&self, path: &Path) -> DiscoveryResult<()> {
        if collect_files(path, SOURCE_EXTENSIONS)?.is_empty() {
            return Err(DiscoveryError::NoFilesFound(path.display().to_string()));
        }
        Ok(())
    }

    fn auto_detect(&self, path: &Path) -> Detection {
        let Ok(files) = collect_files(path, SOURCE_EXTENSIONS) else {
            return Detection::NONE;
        };

        let mut total = 0usize;
        let mut recognized = 0usize;
        for file in files.iter().take(DETECT_FILE_LIMIT) {
            let Ok(contents) = std::fs::read_to_string(file) else {
                continue;
            };
            for capture in RESOURCE_DECLARATION.captures_iter(&contents) {
                total += 1;
                if is_terraform_gcp_type(&capture[1]) {
                    recognized += 1;
                }
            }
        }

        Detection::from_ratio(recognized, total, CONFIDENCE_CEILING)
    }

    #[instrument(skip_all, fields(path = %path.display()))]
    async fn parse(
        &self,
        cancel: &CancellationToken,
        path: &Path,
        options: &ParseOptions,
    ) -> DiscoveryResult<Infrastructure> {
        let paths = collect_files(path, SOURCE_EXTENSIONS)?;
        if paths.is_empty() {
            return Err(DiscoveryError::NoFilesFound(path.display().to_string()));
        }

        let mut files = Vec::with_capacity(paths.len());
        for file in &paths {
            let source = file.display().to_string();
            let contents = tokio::select! {
                _ = cancel.cancelled() => return Err(DiscoveryError::Cancelled),
                read = tokio::fs::read_to_string(file) => read?,
            };
            match hcl::from_str::<Body>(&contents) {
                Ok(body) => files.push(SourceFile { path: source, body }),
                Err(e) if options.ignore_errors => {
                    warn!("Skipping unparseable {}: {}", source, e);
                    options.report(ProgressEvent::EntrySkipped {
                        source,
                        reason: e.to_string(),
                    });
                }
                Err(e) => {
                    return Err(DiscoveryError::MalformedInput {
                        path: source,
                        reason: e.to_string(),
                    })
                }
            }
        }

        let mut infra = Infrastructure::new(Provider::Gcp);
        infra.set_metadata("source.format", SourceFormat::IacSource.as_str());
        infra.set_metadata("source.path", path.display().to_string());

        let provider_region = Self::read_settings(&mut infra, &files);
        let default_region = options
            .default_region()
            .map(str::to_string)
            .or(provider_region);

        for file in &files {
            if cancel.is_cancelled() {
                return Err(DiscoveryError::Cancelled);
            }
            let added = Self::add_resources(&mut infra, file, default_region.as_deref(), options)?;
            options.report(ProgressEvent::FileParsed {
                path: file.path.clone(),
                resources: added,
            });
        }

        info!(
            "Parsed {} resources from {} Terraform files",
            infra.len(),
            files.len()
        );
        Ok(infra)
    }
}
