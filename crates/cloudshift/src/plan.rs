//! Migration plan produced by `Pipeline::plan`

use cloudshift_mappers::{artifact_path, render_compose};
use cloudshift_types::{GraphReport, MapperResult, MappingResult, ResourceType};
use serde::Serialize;

/// A resource no registered mapper accepts
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnmappedResource {
    pub id: String,
    pub resource_type: ResourceType,
}

/// Everything needed to run the discovered resources locally
///
/// Results follow the insertion order of the source graph. Nothing here has
/// been written anywhere; persisting the artifacts is up to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationPlan {
    pub results: Vec<MappingResult>,
    pub unmapped: Vec<UnmappedResource>,
    /// Plan-level warnings (graph problems, renamed services, unmapped types)
    pub warnings: Vec<String>,
    pub report: GraphReport,
}

impl MigrationPlan {
    pub fn unmapped_ids(&self) -> Vec<&str> {
        self.unmapped.iter().map(|u| u.id.as_str()).collect()
    }

    pub fn result_for(&self, resource_id: &str) -> Option<&MappingResult> {
        self.results.iter().find(|r| r.source_id == resource_id)
    }

    /// Service names in plan order
    pub fn service_names(&self) -> Vec<&str> {
        self.results
            .iter()
            .map(|r| r.service.name.as_str())
            .collect()
    }

    /// Generated scripts and configs keyed by the host path their service
    /// mounts them from
    pub fn artifacts(&self) -> Vec<(String, &str)> {
        let mut artifacts = Vec::new();
        for result in &self.results {
            let files = result.scripts.iter().chain(result.configs.iter());
            for (name, content) in files {
                artifacts.push((
                    artifact_path(&result.service.name, name),
                    content.as_str(),
                ));
            }
        }
        artifacts
    }

    /// Every manual step, prefixed with the service it belongs to
    pub fn manual_steps(&self) -> Vec<String> {
        self.results
            .iter()
            .flat_map(|r| {
                r.manual_steps
                    .iter()
                    .map(move |step| format!("[{}] {}", r.service.name, step))
            })
            .collect()
    }

    pub fn render_compose(&self) -> MapperResult<String> {
        render_compose(&self.results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloudshift_types::ServiceDefinition;

    fn plan() -> MigrationPlan {
        let mut db = MappingResult::new("db", ServiceDefinition::new("db", "postgres:16-alpine"));
        db.add_script("migrate.sh", "#!/bin/sh\n");
        db.add_config("init.sql", "SELECT 1;\n");
        db.manual_step("Export the database");

        let web = MappingResult::new("web", ServiceDefinition::new("web", "nginx:1.27"));

        MigrationPlan {
            results: vec![db, web],
            unmapped: Vec::new(),
            warnings: Vec::new(),
            report: GraphReport::default(),
        }
    }

    #[test]
    fn test_artifacts_use_service_directories() {
        let plan = plan();
        let paths: Vec<String> = plan.artifacts().into_iter().map(|(p, _)| p).collect();
        assert_eq!(paths, vec!["./db/migrate.sh", "./db/init.sql"]);
    }

    #[test]
    fn test_manual_steps_are_prefixed() {
        assert_eq!(plan().manual_steps(), vec!["[db] Export the database"]);
    }

    #[test]
    fn test_lookup_by_source_id() {
        let plan = plan();
        assert_eq!(plan.service_names(), vec!["db", "web"]);
        assert_eq!(plan.result_for("web").map(|r| r.service.image.as_str()), Some("nginx:1.27"));
        assert!(plan.result_for("missing").is_none());
    }
}
