//! Parser selection and discovery plumbing
//!
//! Holds the explicitly populated `ParserRegistry`, the source-tree walker
//! shared by file-based parsers, environment/YAML configuration and the
//! tracing bootstrap used by embedding binaries.

pub mod config;
pub mod registry;
pub mod source_tree;
pub mod telemetry;

pub use config::DiscoveryConfig;
pub use registry::{DetectionResult, ParserRegistry};
pub use source_tree::{collect_files, has_extension};
pub use telemetry::init_tracing;
