use cloudshift_types::{DiscoveryError, GraphError, MappingError};
use thiserror::Error;

/// Pipeline errors
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Discovery error: {0}")]
    Discovery(#[from] DiscoveryError),

    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("Mapping of {resource_id} failed: {source}")]
    Mapping {
        resource_id: String,
        #[source]
        source: MappingError,
    },

    #[error("Render error: {0}")]
    Render(#[from] MappingError),
}

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;
