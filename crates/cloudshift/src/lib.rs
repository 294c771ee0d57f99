//! Cloudshift pipeline
//!
//! This crate wires the parser and mapper registries into one discovery and
//! planning pipeline for Google Cloud inputs.
//!
//! # Architecture
//!
//! - **Registries**: `default_parser_registry` and `default_mapper_registry`
//!   register every built-in plugin explicitly, in a fixed order
//! - **Pipeline**: `discover` selects the best parser for a path and parses
//!   it; `plan` maps every supported resource and links their services
//!
//! # Usage
//!
//! ```no_run
//! use std::path::Path;
//!
//! use cloudshift::{MapContext, ParseOptions, Pipeline};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> cloudshift::PipelineResult<()> {
//! let pipeline = Pipeline::with_defaults();
//! let cancel = CancellationToken::new();
//! let infra = pipeline
//!     .discover(&cancel, Path::new("infra/terraform.tfstate"), &ParseOptions::default())
//!     .await?;
//! let plan = pipeline.plan(&infra, &MapContext::default())?;
//! let compose = plan.render_compose()?;
//! # let _ = compose;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod pipeline;
pub mod plan;

pub use error::{PipelineError, PipelineResult};
pub use pipeline::Pipeline;
pub use plan::{MigrationPlan, UnmappedResource};

pub use cloudshift_discovery::{DiscoveryConfig, ParserRegistry};
pub use cloudshift_mappers::MapperRegistry;
pub use cloudshift_types::{
    Infrastructure, MapContext, MappingResult, ParseOptions, Resource, ResourceType,
};

/// Parser registry with every built-in parser
///
/// Registration order is the tie-break order for auto-detection: exported
/// state, Deployment Manager templates, Terraform source, then the live API.
pub fn default_parser_registry() -> ParserRegistry {
    let mut registry = ParserRegistry::new();
    for parser in cloudshift_gcp::parsers() {
        registry.register(parser);
    }
    registry
}

/// Mapper registry with every built-in Google Cloud mapper
pub fn default_mapper_registry() -> MapperRegistry {
    let mut registry = MapperRegistry::new();
    for mapper in cloudshift_mappers::gcp_mappers() {
        registry.register(mapper);
    }
    registry
}
