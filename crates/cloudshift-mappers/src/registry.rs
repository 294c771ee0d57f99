//! Mapper registry
//!
//! Like the parser registry, mappers are registered explicitly. Lookup is by
//! exact resource type; registering a second mapper for a type replaces the
//! first.

use cloudshift_types::{
    MapContext, MapperResult, MappingError, MappingResult, Resource, ResourceMapper, ResourceType,
};
use tracing::{debug, warn};

/// Registry of target mappers keyed by resource type
#[derive(Default)]
pub struct MapperRegistry {
    mappers: Vec<Box<dyn ResourceMapper>>,
}

impl MapperRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, mapper: Box<dyn ResourceMapper>) {
        let resource_type = mapper.resource_type();
        if let Some(existing) = self
            .mappers
            .iter_mut()
            .find(|m| m.resource_type() == resource_type)
        {
            warn!("Replacing mapper registered for {}", resource_type);
            *existing = mapper;
            return;
        }
        debug!("Registering mapper for {}", resource_type);
        self.mappers.push(mapper);
    }

    pub fn get(&self, resource_type: &ResourceType) -> Option<&dyn ResourceMapper> {
        self.mappers
            .iter()
            .map(|m| m.as_ref())
            .find(|m| &m.resource_type() == resource_type)
    }

    pub fn supports(&self, resource_type: &ResourceType) -> bool {
        self.get(resource_type).is_some()
    }

    /// Registered types in registration order
    pub fn resource_types(&self) -> Vec<ResourceType> {
        self.mappers.iter().map(|m| m.resource_type()).collect()
    }

    pub fn len(&self) -> usize {
        self.mappers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappers.is_empty()
    }

    /// Dispatch a resource to the mapper registered for its type
    pub fn map(&self, ctx: &MapContext, resource: &Resource) -> MapperResult<MappingResult> {
        let mapper = self
            .get(&resource.resource_type)
            .ok_or_else(|| MappingError::UnsupportedResourceType(resource.resource_type.clone()))?;
        mapper.map(ctx, resource)
    }
}

impl std::fmt::Debug for MapperRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapperRegistry")
            .field("resource_types", &self.resource_types())
            .finish()
    }
}
