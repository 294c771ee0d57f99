//! Deployment Manager template parser
//!
//! Enumerates the `resources:` list of every YAML config under a path. Nothing
//! is evaluated: `.jinja`/`.py` imports stay opaque and references are read
//! from `$(ref.<name>.<field>)` expressions and `metadata.dependsOn`.

use async_trait::async_trait;
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
use crate::catalog::{from_template_type, is_template_gcp_type, is_template_import};

const TEMPLATE_EXTENSIONS: &[&str] = &["yaml", "yml"];
const CONFIDENCE_CEILING: f64 = 0.9;
/// Upper bound on files read while probing
const DETECT_FILE_LIMIT: usize = 64;

static REF_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\(ref\.([A-Za-z0-9_\-]+)(?:\.[^)]*)?\)").expect("reference pattern is valid")
});

/// Logical names referenced through `$(ref.<name>...)`, in order of first appearance
pub fn extract_references(value: &Value) -> Vec<String> {
    let mut found = Vec::new();
    collect_references(value, &mut found);
    found
}

fn collect_references(value: &Value, found: &mut Vec<String>) {
    match value {
        Value::String(s) => {
            for capture in REF_PATTERN.captures_iter(s) {
                let name = capture[1].to_string();
                if !found.contains(&name) {
                    found.push(name);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_references(item, found);
            }
        }
        Value::Object(map) => {
            for item in map.values() {
                collect_references(item, found);
            }
        }
        _ => {}
    }
}

/// Declarative-template parser for Deployment Manager configs
#[derive(Debug, Default, Clone)]
pub struct DeploymentManagerParser;

impl DeploymentManagerParser {
    pub fn new() -> Self {
        Self
    }

    fn skip_or_fail(
        options: &ParseOptions,
        source: &str,
        reason: String,
    ) -> DiscoveryResult<()> {
        if options.ignore_errors {
            warn!("Skipping entry in {}: {}", source, reason);
            options.report(ProgressEvent::EntrySkipped {
                source: source.to_string(),
                reason,
            });
            Ok(())
        } else {
            Err(DiscoveryError::MalformedInput {
                path: source.to_string(),
                reason,
            })
        }
    }

    /// Convert one config document; returns false when it has no `resources:` list
    fn add_document(
        infra: &mut Infrastructure,
        document: &Value,
        source: &str,
        options: &ParseOptions,
    ) -> DiscoveryResult<bool> {
        let Some(entries) = document.get("resources").and_then(Value::as_array) else {
            return Ok(false);
        };

        if let Some(imports) = document.get("imports").and_then(Value::as_array) {
            for import in imports {
                if let Some(import_path) = import.get("path").and_then(Value::as_str) {
                    let key = format!("import.{}", import_path);
                    infra.set_metadata(key, source);
                }
            }
        }
        if let Some(outputs) = document.get("outputs").and_then(Value::as_array) {
            for output in outputs {
                if let (Some(name), Some(value)) =
                    (output.get("name").and_then(Value::as_str), output.get("value"))
                {
                    let value = match value {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    infra.set_metadata(format!("output.{}", name), value);
                }
            }
        }

        let mut added = 0usize;
        for entry in entries {
            let name = entry.get("name").and_then(Value::as_str).filter(|n| !n.is_empty());
            let native_type = entry.get("type").and_then(Value::as_str).filter(|t| !t.is_empty());
            let (Some(name), Some(native_type)) = (name, native_type) else {
                Self::skip_or_fail(
                    options,
                    source,
                    "resource entry is missing name or type".to_string(),
                )?;
                continue;
            };

            let resource_type = from_template_type(native_type);
            if is_template_import(native_type) {
                warn!(
                    "Resource {} uses template {}; its expansion is not discovered",
                    name, native_type
                );
                options.report(ProgressEvent::EntrySkipped {
                    source: source.to_string(),
                    reason: format!("{} is a template import kept as an opaque resource", name),
                });
            }
            if !options.admits(&resource_type) {
                continue;
            }

            let properties = match entry.get("properties") {
                Some(Value::Object(map)) => Value::Object(map.clone()),
                _ => Value::Object(Map::new()),
            };

            let mut references = extract_references(&properties);
            if let Some(depends_on) = entry
                .get("metadata")
                .and_then(|m| m.get("dependsOn"))
                .and_then(Value::as_array)
            {
                references.extend(
                    depends_on
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string),
                );
            }

            let mut properties = properties;
            redact_payloads(&mut properties, options.include_sensitive);
            let Value::Object(config) = properties else {
                continue;
            };

            let display_name = literal_str(&config, "name").unwrap_or(name).to_string();
            let region = region_of(&config, options.default_region());

            let mut resource = Resource::new(name, display_name, resource_type, region);
            resource.tags = labels_of(&config);
            resource.config = config;
            for reference in references {
                resource.add_dependency(reference);
            }

            infra.add_resource(resource)?;
            added += 1;
        }

        debug!("Read {} resources from {}", added, source);
        Ok(true)
    }
}

#[async_trait]
impl ResourceParser for DeploymentManagerParser {
    fn name(&self) -> &str {
        "gcp-deployment-manager"
    }

    fn provider(&self) -> Provider {
        Provider::Gcp
    }

    fn supported_formats(&self) -> Vec<SourceFormat> {
        vec![SourceFormat::DeclarativeTemplate]
    }

    fn validate(&self, path: &Path) -> DiscoveryResult<()> {
        let files = collect_files(path, TEMPLATE_EXTENSIONS)?;
        if files.is_empty() {
            return Err(DiscoveryError::NoFilesFound(path.display().to_string()));
        }
        Ok(())
    }

    fn auto_detect(&self, path: &Path) -> Detection {
        let Ok(files) = collect_files(path, TEMPLATE_EXTENSIONS) else {
            return Detection::NONE;
        };

        let mut total = 0usize;
        let mut recognized = 0usize;
        for file in files.iter().take(DETECT_FILE_LIMIT) {
            let Ok(contents) = std::fs::read_to_string(file) else {
                continue;
            };
            let Ok(document) = serde_yaml::from_str::<Value>(&contents) else {
                continue;
            };
            let Some(entries) = document.get("resources").and_then(Value::as_array) else {
                continue;
            };
            for native_type in entries
                .iter()
                .filter_map(|e| e.get("type").and_then(Value::as_str))
            {
                total += 1;
                if is_template_gcp_type(native_type) {
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
        let files = collect_files(path, TEMPLATE_EXTENSIONS)?;
        if files.is_empty() {
            return Err(DiscoveryError::NoFilesFound(path.display().to_string()));
        }

        let mut infra = Infrastructure::new(Provider::Gcp);
        infra.set_metadata("source.format", SourceFormat::DeclarativeTemplate.as_str());
        infra.set_metadata("source.path", path.display().to_string());

        let mut configs = 0usize;
        for file in &files {
            let source = file.display().to_string();
            let contents = tokio::select! {
                _ = cancel.cancelled() => return Err(DiscoveryError::Cancelled),
                read = tokio::fs::read_to_string(file) => read?,
            };

            let document: Value = match serde_yaml::from_str(&contents) {
                Ok(document) => document,
                Err(e) => {
                    Self::skip_or_fail(options, &source, e.to_string())?;
                    continue;
                }
            };

            let before = infra.len();
            if Self::add_document(&mut infra, &document, &source, options)? {
                configs += 1;
                options.report(ProgressEvent::FileParsed {
                    path: source,
                    resources: infra.len() - before,
                });
            } else {
                debug!("{} has no resources list, skipping", source);
            }
        }

        if configs == 0 {
            return Err(DiscoveryError::NoFilesFound(format!(
                "no Deployment Manager config under {}",
                path.display()
            )));
        }

        info!(
            "Parsed {} resources from {} Deployment Manager configs",
            infra.len(),
            configs
        );
        Ok(infra)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_references_are_deduplicated_in_first_appearance_order() {
        let properties = json!({
            "zone": "$(ref.vpc.selfLink)",
            "disks": [
                { "source": "$(ref.boot-disk.selfLink)" },
                { "source": "$(ref.vpc.selfLink)" }
            ],
            "plain": "no refs here",
            "annotation": "prefix-$(ref.bucket.name)-$(ref.boot-disk.id)"
        });

        assert_eq!(
            extract_references(&properties),
            vec!["vpc", "boot-disk", "bucket"]
        );
    }

    #[test]
    fn test_reference_without_field() {
        assert_eq!(extract_references(&json!("$(ref.topic)")), vec!["topic"]);
        assert!(extract_references(&json!("$(env.project)")).is_empty());
    }
}
