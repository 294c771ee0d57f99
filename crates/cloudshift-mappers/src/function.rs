//! Cloud Functions mapper
//!
//! Functions run from their source tree inside the language image of their
//! runtime, served by the matching Functions Framework. Both 1st gen
//! (`runtime`, `entry_point`) and 2nd gen (`build_config`, `service_config`)
//! shapes are read.

use cloudshift_gcp::catalog;
use cloudshift_types::{
    MapContext, MapperResult, MappingResult, Protocol, Resource, ResourceLimits, ResourceMapper,
    ResourceType,
};
use serde_json::Value;
use tracing::debug;

use crate::common::{
    artifact_path, base_service, field_str, first_str, first_value, parse_cpu, parse_memory_mb,
};

pub const FUNCTION_PORT: u16 = 8080;

/// Image used when the runtime is not in the table
pub const FALLBACK_IMAGE: &str = "alpine:3.20";

const SOURCE_DIR: &str = "source";
const WORKSPACE: &str = "/workspace";
const DEFAULT_MEMORY_MB: u64 = 256;
const DEFAULT_CPUS: f64 = 1.0;

const RUNTIME_PATHS: &[&str] = &["runtime", "build_config.0.runtime", "buildConfig.runtime"];
const ENTRY_POINT_PATHS: &[&str] = &[
    "entry_point",
    "entryPoint",
    "build_config.0.entry_point",
    "buildConfig.entryPoint",
];
const MEMORY_MB_PATHS: &[&str] = &["available_memory_mb", "availableMemoryMb"];
const MEMORY_QUANTITY_PATHS: &[&str] = &[
    "service_config.0.available_memory",
    "serviceConfig.availableMemory",
];
const CPU_PATHS: &[&str] = &["service_config.0.available_cpu", "serviceConfig.availableCpu"];
const ENV_PATHS: &[&str] = &[
    "environment_variables",
    "environmentVariables",
    "service_config.0.environment_variables",
    "serviceConfig.environmentVariables",
];
const SECRET_ENV_PATHS: &[&str] = &[
    "secret_environment_variables",
    "secretEnvironmentVariables",
    "service_config.0.secret_environment_variables",
    "serviceConfig.secretEnvironmentVariables",
];
const TRIGGER_PATHS: &[&str] = &["event_trigger.0", "eventTrigger"];
const SECOND_GEN_PATHS: &[&str] = &["build_config", "buildConfig"];

/// Functions runtime language
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    NodeJs,
    Python,
    Go,
    Java,
    Ruby,
    Php,
    DotNet,
}

const LANGUAGES: &[(&str, Language)] = &[
    ("nodejs", Language::NodeJs),
    ("python", Language::Python),
    ("go", Language::Go),
    ("java", Language::Java),
    ("ruby", Language::Ruby),
    ("php", Language::Php),
    ("dotnet", Language::DotNet),
];

/// Parsed `runtime` string such as `python312` or `nodejs20`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionRuntime {
    pub language: Language,
    /// Language version in image-tag form (`3.12`, `20`, `1.22`)
    pub version: String,
}

impl FunctionRuntime {
    pub fn image(&self) -> String {
        let v = &self.version;
        match self.language {
            Language::NodeJs => format!("node:{}-alpine", v),
            Language::Python => format!("python:{}-slim", v),
            Language::Go => format!("golang:{}-alpine", v),
            Language::Java => format!("maven:3.9-eclipse-temurin-{}", v),
            Language::Ruby => format!("ruby:{}-slim", v),
            Language::Php => format!("php:{}-cli", v),
            Language::DotNet => format!("mcr.microsoft.com/dotnet/sdk:{}", v),
        }
    }

    /// Shell command serving the function from the workspace
    fn serve_command(&self, entry_point: &str) -> String {
        match self.language {
            Language::NodeJs => "npm install && npx @google-cloud/functions-framework".to_string(),
            Language::Python => {
                "pip install --no-cache-dir -r requirements.txt functions-framework && functions-framework"
                    .to_string()
            }
            Language::Go => "go run .".to_string(),
            Language::Java => format!(
                "mvn -q function:run -Drun.functionTarget={} -Drun.port={}",
                entry_point, FUNCTION_PORT
            ),
            Language::Ruby => {
                "bundle install && bundle exec functions-framework-ruby".to_string()
            }
            Language::Php => format!(
                "php -S 0.0.0.0:{} vendor/google/cloud-functions-framework/router.php",
                FUNCTION_PORT
            ),
            Language::DotNet => "dotnet run".to_string(),
        }
    }

    /// Setup the serve command cannot do itself
    fn manual_setup(&self) -> Option<&'static str> {
        match self.language {
            Language::Go => Some("Add a main package that calls funcframework.Start"),
            Language::Php => Some("Run composer install in the function source"),
            _ => None,
        }
    }
}

/// Parse a Cloud Functions runtime identifier
pub fn parse_runtime(runtime: &str) -> Option<FunctionRuntime> {
    let runtime = runtime.trim().to_ascii_lowercase();
    let (prefix, language) = LANGUAGES
        .iter()
        .find(|(prefix, _)| runtime.starts_with(prefix))?;
    let digits = &runtime[prefix.len()..];
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    let version = match language {
        Language::NodeJs | Language::Java => digits.to_string(),
        Language::DotNet => format!("{}.0", digits),
        _ if digits.len() > 1 => format!("{}.{}", &digits[..1], &digits[1..]),
        _ => digits.to_string(),
    };
    Some(FunctionRuntime {
        language: *language,
        version,
    })
}

fn string_map(value: Option<&Value>) -> Vec<(String, String)> {
    match value {
        Some(Value::Object(map)) => map
            .iter()
            .filter_map(|(key, value)| value.as_str().map(|v| (key.clone(), v.to_string())))
            .collect(),
        _ => Vec::new(),
    }
}

/// Maps `gcp:cloudfunctions:function`
#[derive(Debug, Clone, Copy, Default)]
pub struct CloudFunctionMapper;

impl CloudFunctionMapper {
    pub fn new() -> Self {
        Self
    }
}

impl ResourceMapper for CloudFunctionMapper {
    fn resource_type(&self) -> ResourceType {
        catalog::CLOUD_FUNCTION
    }

    fn map(&self, ctx: &MapContext, resource: &Resource) -> MapperResult<MappingResult> {
        self.validate(Some(resource))?;

        let raw_runtime = first_str(resource, RUNTIME_PATHS);
        let runtime = raw_runtime.and_then(parse_runtime);
        let image = runtime
            .as_ref()
            .map(FunctionRuntime::image)
            .unwrap_or_else(|| FALLBACK_IMAGE.to_string());
        let mut result = MappingResult::new(resource.id.clone(), base_service(ctx, resource, image));

        let entry_point = first_str(resource, ENTRY_POINT_PATHS).unwrap_or(&resource.name);
        let service_name = result.service.name.clone();
        let source = artifact_path(&service_name, SOURCE_DIR);

        let trigger = first_value(resource, TRIGGER_PATHS);
        let signature = match trigger {
            None => "http",
            Some(_) if first_value(resource, SECOND_GEN_PATHS).is_some() => "cloudevent",
            Some(_) => "event",
        };

        let environment = &mut result.service.environment;
        for (key, value) in ENV_PATHS
            .iter()
            .flat_map(|path| string_map(resource.config_value(path)))
        {
            environment.insert(key, value);
        }
        environment.insert("FUNCTION_TARGET".to_string(), entry_point.to_string());
        environment.insert("FUNCTION_SIGNATURE_TYPE".to_string(), signature.to_string());
        environment.insert("PORT".to_string(), FUNCTION_PORT.to_string());

        match &runtime {
            Some(runtime) => {
                result.service.command = Some(vec![
                    "sh".to_string(),
                    "-c".to_string(),
                    format!("cd {} && {}", WORKSPACE, runtime.serve_command(entry_point)),
                ]);
                if let Some(step) = runtime.manual_setup() {
                    result.manual_step(format!("{} ({})", step, source));
                }
            }
            None => {
                result.warn(format!(
                    "Unsupported runtime {}; using {}",
                    raw_runtime.unwrap_or("(unspecified)"),
                    FALLBACK_IMAGE
                ));
                result.manual_step(format!(
                    "Choose an image and start command for function {}",
                    resource.name
                ));
            }
        }

        let memory_mb = first_value(resource, MEMORY_MB_PATHS)
            .and_then(Value::as_u64)
            .or_else(|| first_str(resource, MEMORY_QUANTITY_PATHS).and_then(parse_memory_mb))
            .unwrap_or(DEFAULT_MEMORY_MB);
        let cpus = first_str(resource, CPU_PATHS)
            .and_then(parse_cpu)
            .unwrap_or(DEFAULT_CPUS);
        result.service.resources = ResourceLimits::new(cpus, memory_mb);
        result.service.add_port(FUNCTION_PORT, Protocol::Tcp);
        result.service.add_volume(source.clone(), WORKSPACE);

        result.manual_step(format!("Copy the function source into {}", source));
        if let Some(trigger) = trigger {
            let event_type = field_str(trigger, &["event_type", "eventType"]).unwrap_or("event");
            result.warn(format!(
                "Trigger {} is not wired locally; deliver events over HTTP",
                event_type
            ));
        }
        let secret_env = first_value(resource, SECRET_ENV_PATHS)
            .and_then(Value::as_array)
            .map(Vec::len)
            .unwrap_or(0);
        if secret_env > 0 {
            result.manual_step(format!(
                "Provide {} secret environment variable(s) sourced from Secret Manager",
                secret_env
            ));
        }

        debug!(
            "Mapped Cloud Function {} to {} (target {})",
            resource.id, result.service.image, entry_point
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn function(config: Value) -> Resource {
        let config = match config {
            Value::Object(map) => map,
            _ => Default::default(),
        };
        Resource::new(
            "google_cloudfunctions2_function.thumbnail",
            "thumbnail",
            catalog::CLOUD_FUNCTION,
            "us-central1",
        )
        .with_config(config)
    }

    #[test]
    fn test_runtime_table() {
        let cases = [
            ("nodejs20", "node:20-alpine"),
            ("python312", "python:3.12-slim"),
            ("go122", "golang:1.22-alpine"),
            ("java17", "maven:3.9-eclipse-temurin-17"),
            ("ruby32", "ruby:3.2-slim"),
            ("php82", "php:8.2-cli"),
            ("dotnet8", "mcr.microsoft.com/dotnet/sdk:8.0"),
        ];
        for (runtime, image) in cases {
            assert_eq!(parse_runtime(runtime).unwrap().image(), image, "{}", runtime);
        }
        assert!(parse_runtime("cobol85").is_none());
        assert!(parse_runtime("nodejs").is_none());
    }

    #[test]
    fn test_maps_second_gen_function() {
        let resource = function(json!({
            "build_config": [{ "runtime": "python311", "entry_point": "make_thumbnail" }],
            "service_config": [{
                "available_memory": "512M",
                "available_cpu": "1",
                "environment_variables": { "BUCKET": "thumbs" }
            }],
            "event_trigger": [{ "event_type": "google.cloud.storage.object.v1.finalized" }]
        }));

        let result = CloudFunctionMapper::new()
            .map(&MapContext::default(), &resource)
            .unwrap();
        let service = &result.service;

        assert_eq!(service.image, "python:3.11-slim");
        let env = &service.environment;
        assert_eq!(env.get("FUNCTION_TARGET").map(String::as_str), Some("make_thumbnail"));
        assert_eq!(env.get("FUNCTION_SIGNATURE_TYPE").map(String::as_str), Some("cloudevent"));
        assert_eq!(env.get("BUCKET").map(String::as_str), Some("thumbs"));
        assert_eq!(service.resources, ResourceLimits::new(1.0, 488));
        assert!(service.command.as_ref().unwrap()[2].ends_with("functions-framework"));
        assert_eq!(service.volumes[0].source, "./thumbnail/source");
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn test_first_gen_http_function() {
        let resource = function(json!({
            "runtime": "nodejs18",
            "available_memory_mb": 1024,
            "trigger_http": true
        }));

        let result = CloudFunctionMapper::new()
            .map(&MapContext::default(), &resource)
            .unwrap();

        assert_eq!(result.service.image, "node:18-alpine");
        assert_eq!(
            result.service.environment.get("FUNCTION_TARGET").map(String::as_str),
            Some("thumbnail")
        );
        assert_eq!(
            result.service.environment.get("FUNCTION_SIGNATURE_TYPE").map(String::as_str),
            Some("http")
        );
        assert_eq!(result.service.resources, ResourceLimits::new(1.0, 1024));
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_unknown_runtime_degrades() {
        let result = CloudFunctionMapper::new()
            .map(&MapContext::default(), &function(json!({ "runtime": "cobol85" })))
            .unwrap();

        assert_eq!(result.service.image, FALLBACK_IMAGE);
        assert!(result.service.command.is_none());
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(result.manual_steps.len(), 2);
    }
}
