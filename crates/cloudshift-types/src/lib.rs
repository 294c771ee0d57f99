//! Core types and traits for the cloudshift discovery pipeline
//!
//! This crate provides the provider-agnostic resource graph and the plugin
//! contracts that format parsers and target mappers implement.
//!
//! # Architecture
//!
//! - **Model**: `Resource`, `ResourceType` and the `Infrastructure` aggregate
//! - **Traits**: `ResourceParser` turns an input (file tree, state file, live
//!   project) into an `Infrastructure`; `ResourceMapper` turns one `Resource`
//!   into a locally runnable `MappingResult`
//! - **Errors**: one error enum per concern, shared by every provider crate
//!
//! # Usage
//!
//! Provider crates (e.g. `cloudshift-gcp`) depend on this crate and implement
//! `ResourceParser`; `cloudshift-mappers` implements `ResourceMapper`.

pub mod error;
pub mod infrastructure;
pub mod mapper;
pub mod options;
pub mod parser;
pub mod redact;
pub mod resource;
pub mod secrets;

pub use error::{
    DiscoveryError, DiscoveryResult, GraphError, GraphResult, MapperResult, MappingError,
    ModelError, ModelResult,
};
pub use infrastructure::{DanglingDependency, GraphReport, Infrastructure, ValidationMode};
pub use mapper::{
    HealthCheck, MapContext, MappingResult, PortMapping, Protocol, ResourceLimits,
    ResourceMapper, RestartPolicy, ServiceDefinition, VolumeMount,
};
pub use options::{ParseOptions, ProgressCallback, ProgressEvent};
pub use parser::{Detection, ResourceParser, SourceFormat};
pub use redact::{is_sensitive_key, redact_sensitive, REDACTED};
pub use resource::{Category, Provider, Resource, ResourceType};
pub use secrets::{OsSecretGenerator, SecretGenerator, SeededSecretGenerator};
