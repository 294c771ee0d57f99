//! Error types for the discovery and mapping pipeline

use thiserror::Error;

use crate::resource::ResourceType;

/// Result type for model operations
pub type ModelResult<T> = Result<T, ModelError>;

/// Result type for graph validation
pub type GraphResult<T> = Result<T, GraphError>;

/// Result type for parser selection and parsing
pub type DiscoveryResult<T> = Result<T, DiscoveryError>;

/// Result type for mapper operations
pub type MapperResult<T> = Result<T, MappingError>;

/// Model invariant violations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// A resource with the same ID is already part of the infrastructure
    #[error("Duplicate resource ID: {0}")]
    DuplicateResourceId(String),

    /// No resource with the given ID exists
    #[error("Resource not found: {0}")]
    ResourceNotFound(String),
}

/// Dependency graph validation failures
///
/// Only ever returned by `Infrastructure::validate`, never by a parser.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// A dependency references an ID that is not part of the graph (strict mode only)
    #[error("Resource {resource_id} depends on unknown resource {missing_id}")]
    DanglingDependency {
        resource_id: String,
        missing_id: String,
    },

    /// The dependency graph contains a cycle; IDs are listed in traversal order
    #[error("Dependency cycle detected: {}", .cycle.join(" -> "))]
    DependencyCycle { cycle: Vec<String> },
}

/// Errors raised while selecting a parser or parsing an input
#[derive(Error, Debug)]
pub enum DiscoveryError {
    /// The path does not exist or cannot be used by this parser
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// A directory was given but it contains no file this parser understands
    #[error("No files found: {0}")]
    NoFilesFound(String),

    /// The input exists but is not in a format this parser handles
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Every registered parser reported zero confidence for the input
    #[error("No parser found for: {0}")]
    NoParserFound(String),

    /// Credentials could not be resolved (always fatal)
    #[error("Credential resolution failed: {0}")]
    CredentialResolutionFailed(String),

    /// A single category scan failed
    #[error("Scan of {scan} failed: {reason}")]
    CategoryScanFailed { scan: String, reason: String },

    /// An input file or entry could not be decoded
    #[error("Malformed input in {path}: {reason}")]
    MalformedInput { path: String, reason: String },

    /// Remote API call failed
    #[error("API error: {0}")]
    Api(String),

    /// The caller cancelled the operation
    #[error("Operation cancelled")]
    Cancelled,

    /// Model invariant violated while building the graph
    #[error(transparent)]
    Model(#[from] ModelError),

    /// Filesystem error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DiscoveryError {
    /// Whether this error may be tolerated under `ignore_errors`
    ///
    /// Cancellation and credential failures are never tolerated.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            DiscoveryError::Cancelled | DiscoveryError::CredentialResolutionFailed(_)
        )
    }
}

/// Mapper misuse and mapping failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MappingError {
    /// The mapper was handed a resource of a different type
    #[error("Mapper for {expected} cannot map resource of type {actual}")]
    WrongResourceType {
        expected: ResourceType,
        actual: ResourceType,
    },

    /// No resource was supplied
    #[error("No resource supplied to mapper")]
    NilResource,

    /// No mapper is registered for the resource type
    #[error("No mapper registered for resource type {0}")]
    UnsupportedResourceType(ResourceType),

    /// Generated artifact could not be rendered
    #[error("Rendering failed: {0}")]
    Render(String),
}
