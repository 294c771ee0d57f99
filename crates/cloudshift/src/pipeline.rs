//! Discovery and planning pipeline
//!
//! Coordinates parser selection, parsing and mapping across the registries

use std::collections::{HashMap, HashSet};
use std::path::Path;

use cloudshift_discovery::ParserRegistry;
use cloudshift_mappers::{service_name, MapperRegistry};
use cloudshift_types::{
    DiscoveryError, Infrastructure, MapContext, MappingResult, ParseOptions, Resource,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{PipelineError, PipelineResult};
use crate::plan::{MigrationPlan, UnmappedResource};
use crate::{default_mapper_registry, default_parser_registry};

/// Pipeline coordinating discovery and mapping
pub struct Pipeline {
    parsers: ParserRegistry,
    mappers: MapperRegistry,
}

impl Pipeline {
    pub fn new(parsers: ParserRegistry, mappers: MapperRegistry) -> Self {
        Self { parsers, mappers }
    }

    /// Pipeline with every built-in parser and mapper registered
    pub fn with_defaults() -> Self {
        Self::new(default_parser_registry(), default_mapper_registry())
    }

    pub fn parsers(&self) -> &ParserRegistry {
        &self.parsers
    }

    pub fn mappers(&self) -> &MapperRegistry {
        &self.mappers
    }

    /// Select the best parser for `path` and parse it
    pub async fn discover(
        &self,
        cancel: &CancellationToken,
        path: &Path,
        options: &ParseOptions,
    ) -> PipelineResult<Infrastructure> {
        debug!("Selecting parser for {}", path.display());

        let parser = self.parsers.select_best(path)?;
        info!("Parsing {} with {}", path.display(), parser.name());

        let infra = parser.parse(cancel, path, options).await?;
        info!(
            "Discovered {} resources from {}",
            infra.len(),
            path.display()
        );
        Ok(infra)
    }

    /// Parse `path` with the parser registered under `parser_name`, skipping
    /// auto-detection
    pub async fn discover_with(
        &self,
        parser_name: &str,
        cancel: &CancellationToken,
        path: &Path,
        options: &ParseOptions,
    ) -> PipelineResult<Infrastructure> {
        let parser = self.parsers.get_by_name(parser_name).ok_or_else(|| {
            DiscoveryError::UnsupportedFormat(format!("no parser named {}", parser_name))
        })?;
        parser.validate(path)?;

        info!("Parsing {} with {}", path.display(), parser.name());
        let infra = parser.parse(cancel, path, options).await?;
        info!(
            "Discovered {} resources from {}",
            infra.len(),
            path.display()
        );
        Ok(infra)
    }

    /// Map every resource that has a registered mapper
    ///
    /// Validation is lenient: dangling references become plan warnings, a
    /// dependency cycle fails the plan. Resources without a mapper are listed
    /// in `unmapped`. Dependencies between mapped resources, including those
    /// reached through unmapped ones, become `depends_on` entries.
    pub fn plan(&self, infra: &Infrastructure, ctx: &MapContext) -> PipelineResult<MigrationPlan> {
        let report = infra.validate()?;
        let mut warnings = Vec::new();
        for dangling in &report.dangling {
            warn!(
                "Resource {} depends on unknown resource {}",
                dangling.resource_id, dangling.missing_id
            );
            warnings.push(format!(
                "{} depends on {}, which was not discovered",
                dangling.resource_id, dangling.missing_id
            ));
        }

        let mut results = Vec::new();
        let mut unmapped = Vec::new();
        let mut services: HashMap<&str, String> = HashMap::new();
        let mut taken: HashSet<String> = HashSet::new();

        for resource in infra.resources() {
            if !self.mappers.supports(&resource.resource_type) {
                debug!(
                    "No mapper for {} ({})",
                    resource.resource_type, resource.id
                );
                warnings.push(format!(
                    "{} ({}) has no local equivalent",
                    resource.id, resource.resource_type
                ));
                unmapped.push(UnmappedResource {
                    id: resource.id.clone(),
                    resource_type: resource.resource_type.clone(),
                });
                continue;
            }

            let result = self.map_unique(ctx, resource, &taken, &mut warnings)?;
            taken.insert(result.service.name.clone());
            services.insert(resource.id.as_str(), result.service.name.clone());
            results.push(result);
        }

        link_dependencies(infra, &services, &mut results);

        info!(
            "Planned {} services from {} resources ({} unmapped)",
            results.len(),
            infra.len(),
            unmapped.len()
        );

        Ok(MigrationPlan {
            results,
            unmapped,
            warnings,
            report,
        })
    }

    /// Discover `path` and plan the result
    pub async fn run(
        &self,
        cancel: &CancellationToken,
        path: &Path,
        options: &ParseOptions,
        ctx: &MapContext,
    ) -> PipelineResult<MigrationPlan> {
        let infra = self.discover(cancel, path, options).await?;
        self.plan(&infra, ctx)
    }

    /// Map a resource, renaming it first when its service name is taken
    fn map_unique(
        &self,
        ctx: &MapContext,
        resource: &Resource,
        taken: &HashSet<String>,
        warnings: &mut Vec<String>,
    ) -> PipelineResult<MappingResult> {
        let base = service_name(&resource.name);
        let mapped = if taken.contains(&base) {
            let unique = unique_name(&base, taken);
            warn!(
                "Service name {} is taken, mapping {} as {}",
                base, resource.id, unique
            );
            warnings.push(format!(
                "{} was renamed to {} to avoid a service name collision",
                resource.id, unique
            ));
            let mut renamed = resource.clone();
            renamed.name = unique;
            self.mappers.map(ctx, &renamed)
        } else {
            self.mappers.map(ctx, resource)
        };

        mapped.map_err(|source| PipelineError::Mapping {
            resource_id: resource.id.clone(),
            source,
        })
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("parsers", &self.parsers.len())
            .field("mappers", &self.mappers)
            .finish()
    }
}

fn unique_name(base: &str, taken: &HashSet<String>) -> String {
    (2..)
        .map(|n| format!("{}-{}", base, n))
        .find(|candidate| !taken.contains(candidate))
        .unwrap_or_else(|| base.to_string())
}

/// Fill `depends_on` from the resource graph
///
/// Unmapped resources are walked through so that `web -> subnet -> db`
/// still yields `web` depending on `db`.
fn link_dependencies(
    infra: &Infrastructure,
    services: &HashMap<&str, String>,
    results: &mut [MappingResult],
) {
    for result in results.iter_mut() {
        let Ok(resource) = infra.get_resource(&result.source_id) else {
            continue;
        };

        let mut visited: HashSet<&str> = HashSet::new();
        visited.insert(resource.id.as_str());
        let mut pending: Vec<&str> = resource
            .dependencies()
            .iter()
            .rev()
            .map(String::as_str)
            .collect();

        while let Some(id) = pending.pop() {
            if !visited.insert(id) {
                continue;
            }
            if let Some(service) = services.get(id) {
                if *service != result.service.name && !result.service.depends_on.contains(service)
                {
                    result.service.depends_on.push(service.clone());
                }
                continue;
            }
            if let Ok(intermediate) = infra.get_resource(id) {
                pending.extend(intermediate.dependencies().iter().rev().map(String::as_str));
            }
        }

        if !result.service.depends_on.is_empty() {
            debug!(
                "Service {} depends on {:?}",
                result.service.name, result.service.depends_on
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloudshift_gcp::catalog;
    use cloudshift_types::{GraphError, SeededSecretGenerator};
    use std::sync::Arc;

    fn ctx() -> MapContext {
        MapContext::new(Arc::new(SeededSecretGenerator::new(7)))
    }

    fn resource(id: &str, name: &str, resource_type: cloudshift_types::ResourceType) -> Resource {
        Resource::new(id, name, resource_type, "us-central1")
    }

    #[test]
    fn test_unique_name_skips_taken_suffixes() {
        let taken: HashSet<String> = ["web", "web-2"].iter().map(|s| s.to_string()).collect();
        assert_eq!(unique_name("web", &taken), "web-3");
    }

    #[test]
    fn test_plan_links_dependencies_through_unmapped_resources() {
        let mut infra = Infrastructure::new(cloudshift_types::Provider::Gcp);

        let db = resource("db", "db", catalog::SQL_INSTANCE);
        let mut subnet = resource("subnet", "subnet", catalog::SUBNETWORK);
        subnet.add_dependency("db");
        let mut web = resource("web", "web", catalog::COMPUTE_INSTANCE);
        web.add_dependency("subnet");
        web.add_dependency("db");

        infra.add_resource(db).unwrap();
        infra.add_resource(subnet).unwrap();
        infra.add_resource(web).unwrap();

        let plan = Pipeline::with_defaults().plan(&infra, &ctx()).unwrap();

        assert_eq!(plan.service_names(), vec!["db", "web"]);
        assert_eq!(plan.unmapped_ids(), vec!["subnet"]);
        let web = plan.result_for("web").unwrap();
        assert_eq!(web.service.depends_on, vec!["db".to_string()]);
        assert!(plan.result_for("db").unwrap().service.depends_on.is_empty());
    }

    #[test]
    fn test_plan_renames_colliding_services() {
        let mut infra = Infrastructure::new(cloudshift_types::Provider::Gcp);
        infra
            .add_resource(resource("cache", "main", catalog::REDIS_INSTANCE))
            .unwrap();
        infra
            .add_resource(resource("topic", "main", catalog::PUBSUB_TOPIC))
            .unwrap();

        let plan = Pipeline::with_defaults().plan(&infra, &ctx()).unwrap();

        assert_eq!(plan.service_names(), vec!["main", "main-2"]);
        assert!(plan.warnings.iter().any(|w| w.contains("main-2")));
        assert!(plan.render_compose().is_ok());
    }

    #[test]
    fn test_plan_reports_dangling_references_as_warnings() {
        let mut infra = Infrastructure::new(cloudshift_types::Provider::Gcp);
        let mut web = resource("web", "web", catalog::COMPUTE_INSTANCE);
        web.add_dependency("google_compute_network.gone");
        infra.add_resource(web).unwrap();

        let plan = Pipeline::with_defaults().plan(&infra, &ctx()).unwrap();

        assert_eq!(plan.report.dangling.len(), 1);
        assert!(plan
            .warnings
            .iter()
            .any(|w| w.contains("google_compute_network.gone")));
        assert!(plan.result_for("web").unwrap().service.depends_on.is_empty());
    }

    #[test]
    fn test_plan_fails_on_cycles() {
        let mut infra = Infrastructure::new(cloudshift_types::Provider::Gcp);
        let mut a = resource("a", "a", catalog::REDIS_INSTANCE);
        a.add_dependency("b");
        let mut b = resource("b", "b", catalog::REDIS_INSTANCE);
        b.add_dependency("a");
        infra.add_resource(a).unwrap();
        infra.add_resource(b).unwrap();

        let err = Pipeline::with_defaults().plan(&infra, &ctx()).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Graph(GraphError::DependencyCycle { .. })
        ));
    }
}
