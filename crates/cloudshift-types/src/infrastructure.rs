//! The `Infrastructure` aggregate and dependency graph validation

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;
use tracing::debug;

use crate::error::{GraphError, GraphResult, ModelError, ModelResult};
use crate::options::ParseOptions;
use crate::resource::{Provider, Resource, ResourceType};

/// How `validate_with` treats dependencies on unknown IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationMode {
    /// Dangling references fail validation
    Strict,
    /// Dangling references are reported in the `GraphReport` only
    #[default]
    Lenient,
}

/// A dependency that does not resolve to a resource in the same graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DanglingDependency {
    pub resource_id: String,
    pub missing_id: String,
}

/// Outcome of a successful validation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphReport {
    pub resource_count: usize,
    pub edge_count: usize,
    /// Unresolved references, in resource then dependency order
    pub dangling: Vec<DanglingDependency>,
}

impl GraphReport {
    pub fn is_clean(&self) -> bool {
        self.dangling.is_empty()
    }
}

/// Aggregate root: every resource discovered from one input
///
/// Resources are kept in insertion order, so iteration and every derived
/// listing are deterministic. Parsers mutate it through `add_resource` only;
/// filtering produces a new instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Infrastructure {
    pub provider: Provider,
    resources: IndexMap<String, Resource>,
    /// Discovery context (project/account ID, tool versions, outputs)
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    #[serde(skip)]
    type_index: OnceLock<HashMap<ResourceType, Vec<usize>>>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Visit {
    White,
    Gray,
    Black,
}

impl Infrastructure {
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            resources: IndexMap::new(),
            metadata: BTreeMap::new(),
            type_index: OnceLock::new(),
        }
    }

    /// Add a resource, rejecting duplicate IDs
    pub fn add_resource(&mut self, resource: Resource) -> ModelResult<()> {
        if self.resources.contains_key(&resource.id) {
            return Err(ModelError::DuplicateResourceId(resource.id));
        }
        self.resources.insert(resource.id.clone(), resource);
        self.type_index = OnceLock::new();
        Ok(())
    }

    pub fn get_resource(&self, id: &str) -> ModelResult<&Resource> {
        self.resources
            .get(id)
            .ok_or_else(|| ModelError::ResourceNotFound(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.resources.contains_key(id)
    }

    /// Resources of one type, in insertion order
    ///
    /// The per-type index is built on first use and dropped by the next
    /// `add_resource`.
    pub fn get_resources_by_type(&self, resource_type: &ResourceType) -> Vec<&Resource> {
        let index = self.type_index.get_or_init(|| {
            let mut index: HashMap<ResourceType, Vec<usize>> = HashMap::new();
            for (position, resource) in self.resources.values().enumerate() {
                index
                    .entry(resource.resource_type.clone())
                    .or_default()
                    .push(position);
            }
            index
        });

        index
            .get(resource_type)
            .map(|positions| {
                positions
                    .iter()
                    .filter_map(|&position| self.resources.get_index(position).map(|(_, r)| r))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// All resources in insertion order
    pub fn resources(&self) -> impl Iterator<Item = &Resource> {
        self.resources.values()
    }

    pub fn resource_ids(&self) -> impl Iterator<Item = &str> {
        self.resources.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn set_metadata(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.metadata.insert(key.into(), value.into());
    }

    /// New infrastructure holding only the resources the options admit
    ///
    /// Dependency lists are copied unchanged, so references to filtered-out
    /// resources become dangling in the result. The original is untouched.
    pub fn filtered(&self, options: &ParseOptions) -> Infrastructure {
        let mut filtered = Infrastructure::new(self.provider);
        filtered.metadata = self.metadata.clone();
        for resource in self.resources.values() {
            if options.admits(&resource.resource_type) {
                filtered
                    .resources
                    .insert(resource.id.clone(), resource.clone());
            }
        }
        filtered
    }

    /// Lenient validation: dangling references are reported, cycles fail
    pub fn validate(&self) -> GraphResult<GraphReport> {
        self.validate_with(ValidationMode::Lenient)
    }

    /// Check dangling references and dependency cycles without mutating anything
    pub fn validate_with(&self, mode: ValidationMode) -> GraphResult<GraphReport> {
        let mut report = GraphReport {
            resource_count: self.resources.len(),
            ..Default::default()
        };

        for resource in self.resources.values() {
            for dependency in resource.dependencies() {
                report.edge_count += 1;
                if self.resources.contains_key(dependency) {
                    continue;
                }
                if mode == ValidationMode::Strict {
                    return Err(GraphError::DanglingDependency {
                        resource_id: resource.id.clone(),
                        missing_id: dependency.clone(),
                    });
                }
                report.dangling.push(DanglingDependency {
                    resource_id: resource.id.clone(),
                    missing_id: dependency.clone(),
                });
            }
        }

        if let Some(cycle) = self.find_cycle() {
            return Err(GraphError::DependencyCycle { cycle });
        }

        debug!(
            "Validated {} resources and {} edges ({} dangling)",
            report.resource_count,
            report.edge_count,
            report.dangling.len()
        );
        Ok(report)
    }

    /// Three-color DFS over `id -> dependencies`, returning the first back-edge cycle
    fn find_cycle(&self) -> Option<Vec<String>> {
        let mut color: HashMap<&str, Visit> = self
            .resources
            .keys()
            .map(|id| (id.as_str(), Visit::White))
            .collect();

        for root in self.resources.keys() {
            if color.get(root.as_str()) != Some(&Visit::White) {
                continue;
            }

            // (node, index of the next dependency to explore)
            let mut stack: Vec<(&str, usize)> = vec![(root.as_str(), 0)];
            color.insert(root.as_str(), Visit::Gray);

            while let Some(&(node, next)) = stack.last() {
                let dependencies = self
                    .resources
                    .get(node)
                    .map(|r| r.dependencies())
                    .unwrap_or_default();

                if next >= dependencies.len() {
                    color.insert(node, Visit::Black);
                    stack.pop();
                    continue;
                }

                if let Some(top) = stack.last_mut() {
                    top.1 += 1;
                }

                let dependency = dependencies[next].as_str();
                match color.get(dependency) {
                    // dangling, handled separately
                    None => {}
                    Some(Visit::Black) => {}
                    Some(Visit::Gray) => {
                        let start = stack
                            .iter()
                            .position(|(id, _)| *id == dependency)
                            .unwrap_or(0);
                        return Some(
                            stack[start..]
                                .iter()
                                .map(|(id, _)| id.to_string())
                                .collect(),
                        );
                    }
                    Some(Visit::White) => {
                        color.insert(dependency, Visit::Gray);
                        stack.push((dependency, 0));
                    }
                }
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GraphError;
    use crate::resource::Category;
    use std::collections::HashSet;

    const INSTANCE: ResourceType =
        ResourceType::new(Provider::Gcp, "gcp:compute:instance", Category::Compute);
    const NETWORK: ResourceType =
        ResourceType::new(Provider::Gcp, "gcp:compute:network", Category::Networking);

    fn resource(id: &str, deps: &[&str]) -> Resource {
        let mut r = Resource::new(id, id, INSTANCE, "us-central1");
        r.set_dependencies(deps.iter().copied());
        r
    }

    fn graph(resources: Vec<Resource>) -> Infrastructure {
        let mut infra = Infrastructure::new(Provider::Gcp);
        for r in resources {
            infra.add_resource(r).unwrap();
        }
        infra
    }

    #[test]
    fn test_add_and_get_resource() {
        let infra = graph(vec![resource("a", &[]), resource("b", &["a"])]);
        assert_eq!(infra.get_resource("a").unwrap().id, "a");
        assert_eq!(infra.get_resource("b").unwrap().dependencies(), &["a"]);
        assert_eq!(
            infra.get_resource("zzz"),
            Err(ModelError::ResourceNotFound("zzz".to_string()))
        );
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let mut infra = graph(vec![resource("a", &[])]);
        let err = infra.add_resource(resource("a", &[])).unwrap_err();
        assert_eq!(err, ModelError::DuplicateResourceId("a".to_string()));
        assert_eq!(infra.len(), 1);
    }

    #[test]
    fn test_resources_by_type_is_order_stable_and_refreshes() {
        let mut infra = graph(vec![
            resource("vm-2", &[]),
            Resource::new("net", "net", NETWORK, "global"),
            resource("vm-1", &[]),
        ]);

        let ids: Vec<&str> = infra
            .get_resources_by_type(&INSTANCE)
            .iter()
            .map(|r| r.id.as_str())
            .collect();
        assert_eq!(ids, vec!["vm-2", "vm-1"]);

        infra.add_resource(resource("vm-0", &[])).unwrap();
        assert_eq!(infra.get_resources_by_type(&INSTANCE).len(), 3);
        assert_eq!(infra.get_resources_by_type(&NETWORK).len(), 1);
    }

    #[test]
    fn test_validate_chain_without_cycle() {
        let infra = graph(vec![
            resource("a", &["b"]),
            resource("b", &["c"]),
            resource("c", &[]),
        ]);
        let report = infra.validate().unwrap();
        assert!(report.is_clean());
        assert_eq!(report.edge_count, 2);
    }

    #[test]
    fn test_validate_detects_two_node_cycle() {
        let infra = graph(vec![resource("a", &["b"]), resource("b", &["a"])]);
        match infra.validate() {
            Err(GraphError::DependencyCycle { cycle }) => {
                let ids: HashSet<&str> = cycle.iter().map(String::as_str).collect();
                assert_eq!(ids, HashSet::from(["a", "b"]));
                assert_eq!(cycle, vec!["a".to_string(), "b".to_string()]);
            }
            other => panic!("expected cycle, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_cycle_excludes_lead_in_nodes() {
        let infra = graph(vec![
            resource("entry", &["x"]),
            resource("x", &["y"]),
            resource("y", &["z"]),
            resource("z", &["x"]),
        ]);
        let err = infra.validate().unwrap_err();
        assert_eq!(
            err,
            GraphError::DependencyCycle {
                cycle: vec!["x".to_string(), "y".to_string(), "z".to_string()]
            }
        );
    }

    #[test]
    fn test_dangling_lenient_vs_strict() {
        let infra = graph(vec![resource("a", &["ghost"])]);

        let report = infra.validate().unwrap();
        assert_eq!(
            report.dangling,
            vec![DanglingDependency {
                resource_id: "a".to_string(),
                missing_id: "ghost".to_string()
            }]
        );

        assert_eq!(
            infra.validate_with(ValidationMode::Strict),
            Err(GraphError::DanglingDependency {
                resource_id: "a".to_string(),
                missing_id: "ghost".to_string()
            })
        );
    }

    #[test]
    fn test_validate_is_idempotent() {
        let infra = graph(vec![resource("a", &["b", "ghost"]), resource("b", &[])]);
        let first = infra.validate();
        let second = infra.validate();
        assert_eq!(first, second);
        assert_eq!(infra.get_resource("a").unwrap().dependencies().len(), 2);
    }

    #[test]
    fn test_filtered_is_non_destructive() {
        let infra = graph(vec![
            resource("vm", &["net"]),
            Resource::new("net", "net", NETWORK, "global"),
        ]);
        let options = ParseOptions::default().with_filter_type(NETWORK);

        let filtered = infra.filtered(&options);
        assert_eq!(filtered.len(), 1);
        assert!(filtered.contains("net"));
        assert_eq!(infra.len(), 2);
    }

    #[test]
    fn test_serialization_round_trip_keeps_order() {
        let infra = graph(vec![resource("b", &[]), resource("a", &["b"])]);
        let json = serde_json::to_string(&infra).unwrap();
        let decoded: Infrastructure = serde_json::from_str(&json).unwrap();
        let ids: Vec<&str> = decoded.resource_ids().collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert_eq!(decoded.get_resources_by_type(&INSTANCE).len(), 2);
    }
}
