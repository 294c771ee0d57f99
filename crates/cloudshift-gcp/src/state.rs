//! Terraform state (v4) parser
//!
//! Reads one `terraform.tfstate` snapshot. Only `managed` entries become
//! resources; data sources are skipped. Resource IDs are Terraform addresses
//! with the module prefix stripped, falling back to the module-qualified
//! address when two modules declare the same address.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use cloudshift_discovery::has_extension;
use cloudshift_types::{
    Detection, DiscoveryError, DiscoveryResult, Infrastructure, ParseOptions, ProgressEvent,
    Provider, Resource, ResourceParser, SourceFormat, REDACTED,
};

use crate::attributes::{created_at_of, labels_of, redact_payloads, region_of};
use crate::catalog::{from_terraform_type, is_terraform_gcp_type};
use crate::location::normalize_self_link;

pub const STATE_FILE_NAME: &str = "terraform.tfstate";
const STATE_EXTENSIONS: &[&str] = &["tfstate", "json", "backup"];
const CONFIDENCE_CEILING: f64 = 0.9;
const MANAGED_MODE: &str = "managed";

#[derive(Debug, Deserialize)]
struct StateFile {
    version: Option<u64>,
    terraform_version: Option<String>,
    serial: Option<u64>,
    lineage: Option<String>,
    #[serde(default)]
    outputs: BTreeMap<String, StateOutput>,
    /// Decoded entry by entry so a single bad entry can be skipped
    #[serde(default)]
    resources: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct StateOutput {
    #[serde(default)]
    value: Value,
    #[serde(default)]
    sensitive: bool,
}

#[derive(Debug, Deserialize)]
struct StateResource {
    module: Option<String>,
    #[serde(default = "default_mode")]
    mode: String,
    #[serde(rename = "type")]
    resource_type: String,
    name: String,
    #[serde(default)]
    provider: String,
    #[serde(default)]
    instances: Vec<StateInstance>,
}

#[derive(Debug, Deserialize)]
struct StateInstance {
    index_key: Option<Value>,
    #[serde(default)]
    attributes: Value,
    #[serde(default)]
    sensitive_attributes: Value,
    #[serde(default)]
    dependencies: Vec<String>,
}

fn default_mode() -> String {
    MANAGED_MODE.to_string()
}

/// One managed instance with its resolved addresses
struct Entry<'a> {
    resource: &'a StateResource,
    instance: &'a StateInstance,
    /// Module-qualified address without instance key
    full_base: String,
    /// Address without module prefix or instance key
    stripped_base: String,
    /// `[0]` / `["key"]`, empty for single-instance resources
    index: String,
}

/// Exported-state parser for Terraform state files
#[derive(Debug, Default, Clone)]
pub struct TerraformStateParser;

impl TerraformStateParser {
    pub fn new() -> Self {
        Self
    }

    /// Resolve a state file from a file path or a directory containing one
    fn locate(path: &Path) -> Option<PathBuf> {
        if path.is_file() && has_extension(path, STATE_EXTENSIONS) {
            return Some(path.to_path_buf());
        }
        if path.is_dir() {
            let candidate = path.join(STATE_FILE_NAME);
            if candidate.is_file() {
                return Some(candidate);
            }
        }
        None
    }

    fn build(
        &self,
        cancel: &CancellationToken,
        state: &StateFile,
        resources: &[StateResource],
        source: &str,
        options: &ParseOptions,
    ) -> DiscoveryResult<Infrastructure> {
        let mut infra = Infrastructure::new(Provider::Gcp);
        infra.set_metadata("source.format", SourceFormat::ExportedState.as_str());
        infra.set_metadata("source.path", source);
        if let Some(version) = state.version {
            infra.set_metadata("terraform.state_version", version.to_string());
        }
        if let Some(version) = &state.terraform_version {
            infra.set_metadata("terraform.version", version.clone());
        }
        if let Some(serial) = state.serial {
            infra.set_metadata("terraform.serial", serial.to_string());
        }
        if let Some(lineage) = &state.lineage {
            infra.set_metadata("terraform.lineage", lineage.clone());
        }
        for (name, output) in &state.outputs {
            let value = if output.sensitive && !options.include_sensitive {
                REDACTED.to_string()
            } else {
                match &output.value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                }
            };
            infra.set_metadata(format!("output.{}", name), value);
        }

        let mut providers: Vec<&str> = resources
            .iter()
            .map(|r| r.provider.as_str())
            .filter(|p| !p.is_empty())
            .collect();
        providers.sort_unstable();
        providers.dedup();
        if !providers.is_empty() {
            infra.set_metadata("terraform.providers", providers.join(","));
        }

        let entries = collect_entries(resources, source, options);
        let ids = assign_ids(&entries);

        let mut by_full: HashMap<&str, Vec<&str>> = HashMap::new();
        let mut by_stripped: HashMap<&str, Vec<&str>> = HashMap::new();
        for (entry, id) in entries.iter().zip(&ids) {
            by_full
                .entry(entry.full_base.as_str())
                .or_default()
                .push(id.as_str());
            by_stripped
                .entry(entry.stripped_base.as_str())
                .or_default()
                .push(id.as_str());
        }

        for (entry, id) in entries.iter().zip(&ids) {
            if cancel.is_cancelled() {
                return Err(DiscoveryError::Cancelled);
            }

            let resource_type = from_terraform_type(&entry.resource.resource_type);
            if !options.admits(&resource_type) {
                continue;
            }

            let mut attributes = match &entry.instance.attributes {
                Value::Object(map) => Value::Object(map.clone()),
                Value::Null => Value::Object(Map::new()),
                _ => {
                    let reason = format!("attributes of {} are not an object", id);
                    if options.ignore_errors {
                        warn!("Skipping {} in {}: {}", id, source, reason);
                        options.report(ProgressEvent::EntrySkipped {
                            source: source.to_string(),
                            reason,
                        });
                        continue;
                    }
                    return Err(DiscoveryError::MalformedInput {
                        path: source.to_string(),
                        reason,
                    });
                }
            };

            if !options.include_sensitive {
                redact_sensitive_paths(&mut attributes, &entry.instance.sensitive_attributes);
            }
            redact_payloads(&mut attributes, options.include_sensitive);

            let Value::Object(config) = attributes else {
                continue;
            };

            if !infra.metadata.contains_key("project_id") {
                if let Some(project) = config.get("project").and_then(Value::as_str) {
                    infra.set_metadata("project_id", project);
                }
            }

            let name = config
                .get("name")
                .and_then(Value::as_str)
                .filter(|n| !n.is_empty())
                .unwrap_or(&entry.resource.name)
                .to_string();
            let region = region_of(&config, options.default_region());
            let external_ref = config
                .get("self_link")
                .and_then(Value::as_str)
                .map(normalize_self_link)
                .or_else(|| config.get("id").and_then(Value::as_str).map(str::to_string));

            let mut resource = Resource::new(id.clone(), name, resource_type, region);
            resource.external_ref = external_ref;
            resource.tags = labels_of(&config);
            resource.created_at = created_at_of(&config);
            resource.config = config;

            for dependency in &entry.instance.dependencies {
                for target in resolve_dependency(dependency, &by_full, &by_stripped) {
                    resource.add_dependency(target);
                }
            }

            infra.add_resource(resource)?;
        }

        Ok(infra)
    }
}

#[async_trait]
impl ResourceParser for TerraformStateParser {
    fn name(&self) -> &str {
        "gcp-terraform-state"
    }

    fn provider(&self) -> Provider {
        Provider::Gcp
    }

    fn supported_formats(&self) -> Vec<SourceFormat> {
        vec![SourceFormat::ExportedState]
    }

    fn validate(&self, path: &Path) -> DiscoveryResult<()> {
        if !path.exists() {
            return Err(DiscoveryError::InvalidPath(path.display().to_string()));
        }
        match Self::locate(path) {
            Some(_) => Ok(()),
            None if path.is_dir() => Err(DiscoveryError::NoFilesFound(format!(
                "{} has no {}",
                path.display(),
                STATE_FILE_NAME
            ))),
            None => Err(DiscoveryError::UnsupportedFormat(path.display().to_string())),
        }
    }

    fn auto_detect(&self, path: &Path) -> Detection {
        let Some(state_path) = Self::locate(path) else {
            return Detection::NONE;
        };
        let Ok(contents) = std::fs::read_to_string(&state_path) else {
            return Detection::NONE;
        };
        let Ok(value) = serde_json::from_str::<Value>(&contents) else {
            return Detection::NONE;
        };

        let looks_like_state =
            value.get("terraform_version").is_some() || value.get("lineage").is_some();
        let Some(resources) = value.get("resources").and_then(Value::as_array) else {
            return Detection::NONE;
        };
        if !looks_like_state {
            return Detection::NONE;
        }

        let managed: Vec<&Value> = resources
            .iter()
            .filter(|r| r.get("mode").and_then(Value::as_str).unwrap_or(MANAGED_MODE) == MANAGED_MODE)
            .collect();
        let recognized = managed
            .iter()
            .filter(|r| {
                let type_is_gcp = r
                    .get("type")
                    .and_then(Value::as_str)
                    .is_some_and(is_terraform_gcp_type);
                let provider_is_gcp = r
                    .get("provider")
                    .and_then(Value::as_str)
                    .is_some_and(|p| p.contains("hashicorp/google"));
                type_is_gcp || provider_is_gcp
            })
            .count();

        Detection::from_ratio(recognized, managed.len(), CONFIDENCE_CEILING)
    }

    #[instrument(skip_all, fields(path = %path.display()))]
    async fn parse(
        &self,
        cancel: &CancellationToken,
        path: &Path,
        options: &ParseOptions,
    ) -> DiscoveryResult<Infrastructure> {
        let state_path = Self::locate(path)
            .ok_or_else(|| DiscoveryError::InvalidPath(path.display().to_string()))?;
        let source = state_path.display().to_string();

        let contents = tokio::select! {
            _ = cancel.cancelled() => return Err(DiscoveryError::Cancelled),
            read = tokio::fs::read_to_string(&state_path) => read?,
        };

        let state: StateFile =
            serde_json::from_str(&contents).map_err(|e| DiscoveryError::MalformedInput {
                path: source.clone(),
                reason: e.to_string(),
            })?;

        if let Some(version) = state.version {
            if version < 4 {
                return Err(DiscoveryError::UnsupportedFormat(format!(
                    "{}: state format version {} (expected 4)",
                    source, version
                )));
            }
        }

        let resources = decode_resources(&state.resources, &source, options)?;
        let infra = self.build(cancel, &state, &resources, &source, options)?;

        info!(
            "Parsed {} resources from Terraform state {}",
            infra.len(),
            source
        );
        options.report(ProgressEvent::FileParsed {
            path: source,
            resources: infra.len(),
        });
        Ok(infra)
    }
}

/// Decode resource entries one at a time; failures follow `ignore_errors`
fn decode_resources(
    raw: &[Value],
    source: &str,
    options: &ParseOptions,
) -> DiscoveryResult<Vec<StateResource>> {
    let mut resources = Vec::with_capacity(raw.len());
    for (position, entry) in raw.iter().enumerate() {
        match StateResource::deserialize(entry) {
            Ok(resource) => resources.push(resource),
            Err(e) => {
                let reason = format!("resource entry {}: {}", position, e);
                if !options.ignore_errors {
                    return Err(DiscoveryError::MalformedInput {
                        path: source.to_string(),
                        reason,
                    });
                }
                warn!("Skipping entry in {}: {}", source, reason);
                options.report(ProgressEvent::EntrySkipped {
                    source: source.to_string(),
                    reason,
                });
            }
        }
    }
    Ok(resources)
}

fn collect_entries<'a>(
    resources: &'a [StateResource],
    source: &str,
    options: &ParseOptions,
) -> Vec<Entry<'a>> {
    let mut entries = Vec::new();
    for resource in resources {
        if resource.mode != MANAGED_MODE {
            debug!(
                "Skipping {} entry {}.{}",
                resource.mode, resource.resource_type, resource.name
            );
            options.report(ProgressEvent::EntrySkipped {
                source: source.to_string(),
                reason: format!(
                    "{}.{} has mode {}",
                    resource.resource_type, resource.name, resource.mode
                ),
            });
            continue;
        }

        let stripped_base = format!("{}.{}", resource.resource_type, resource.name);
        let full_base = match &resource.module {
            Some(module) if !module.is_empty() => format!("{}.{}", module, stripped_base),
            _ => stripped_base.clone(),
        };

        for instance in &resource.instances {
            entries.push(Entry {
                resource,
                instance,
                full_base: full_base.clone(),
                stripped_base: stripped_base.clone(),
                index: index_suffix(instance.index_key.as_ref()),
            });
        }
    }
    entries
}

/// Stripped address unless another module declares the same one
fn assign_ids(entries: &[Entry<'_>]) -> Vec<String> {
    let mut owners: HashMap<String, Vec<&str>> = HashMap::new();
    for entry in entries {
        let stripped = format!("{}{}", entry.stripped_base, entry.index);
        let modules = owners.entry(stripped).or_default();
        if !modules.contains(&entry.full_base.as_str()) {
            modules.push(&entry.full_base);
        }
    }

    entries
        .iter()
        .map(|entry| {
            let stripped = format!("{}{}", entry.stripped_base, entry.index);
            let collides = owners.get(&stripped).is_some_and(|m| m.len() > 1);
            if collides {
                format!("{}{}", entry.full_base, entry.index)
            } else {
                stripped
            }
        })
        .collect()
}

fn index_suffix(index_key: Option<&Value>) -> String {
    match index_key {
        Some(Value::Number(n)) => format!("[{}]", n),
        Some(Value::String(s)) => format!("[\"{}\"]", s),
        _ => String::new(),
    }
}

/// Drop every leading `module.<name>.` segment
pub fn strip_module_prefix(address: &str) -> &str {
    let mut rest = address;
    while let Some(after) = rest.strip_prefix("module.") {
        let mut depth = 0usize;
        let mut cut = None;
        for (i, c) in after.char_indices() {
            match c {
                '[' => depth += 1,
                ']' => depth = depth.saturating_sub(1),
                '.' if depth == 0 => {
                    cut = Some(i + 1);
                    break;
                }
                _ => {}
            }
        }
        match cut {
            Some(i) => rest = &after[i..],
            None => break,
        }
    }
    rest
}

/// Expand a declared dependency into resource IDs
///
/// Data sources are dropped; unresolved addresses are kept (module prefix
/// stripped) as dangling references.
fn resolve_dependency(
    dependency: &str,
    by_full: &HashMap<&str, Vec<&str>>,
    by_stripped: &HashMap<&str, Vec<&str>>,
) -> Vec<String> {
    let stripped = strip_module_prefix(dependency);
    if stripped.starts_with("data.") {
        return Vec::new();
    }
    if let Some(ids) = by_full.get(dependency) {
        return ids.iter().map(|id| id.to_string()).collect();
    }
    if let Some(ids) = by_stripped.get(stripped) {
        return ids.iter().map(|id| id.to_string()).collect();
    }
    vec![stripped.to_string()]
}

/// Redact values addressed by Terraform `sensitive_attributes` paths
fn redact_sensitive_paths(attributes: &mut Value, sensitive: &Value) {
    let Some(paths) = sensitive.as_array() else {
        return;
    };
    for path in paths {
        if let Some(steps) = path.as_array() {
            redact_path(attributes, steps);
        }
    }
}

fn redact_path(value: &mut Value, steps: &[Value]) {
    let Some((step, rest)) = steps.split_first() else {
        if !value.is_null() {
            *value = Value::String(REDACTED.to_string());
        }
        return;
    };

    let key = step.get("value");
    let next = match (step.get("type").and_then(Value::as_str), key) {
        (Some("get_attr"), Some(Value::String(name))) => value.get_mut(name.as_str()),
        (Some("index"), Some(index)) => {
            let inner = index.get("value").unwrap_or(index);
            match inner {
                Value::Number(n) => n
                    .as_u64()
                    .and_then(|i| value.get_mut(i as usize)),
                Value::String(s) => value.get_mut(s.as_str()),
                _ => None,
            }
        }
        _ => None,
    };

    if let Some(next) = next {
        redact_path(next, rest);
    }
}
