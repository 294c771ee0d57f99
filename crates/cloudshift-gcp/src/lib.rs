//! Google Cloud discovery for cloudshift
//!
//! Four parsers cover the source formats a GCP project can be read from:
//!
//! - [`TerraformStateParser`]: exported Terraform state (`terraform.tfstate`)
//! - [`DeploymentManagerParser`]: Deployment Manager YAML configs
//! - [`TerraformSourceParser`]: Terraform `.tf` sources
//! - [`LiveApiParser`]: the Google Cloud REST APIs (`gcp://<project>`)
//!
//! All of them produce the provider-neutral `Infrastructure` model with
//! resource types from [`catalog`].

mod attributes;
pub mod api;
pub mod catalog;
pub mod client;
pub mod credentials;
pub mod live;
pub mod location;
pub mod source;
pub mod state;
pub mod template;

pub use api::{GcpApi, GcpConnector, Scan};
pub use client::{GcpRestClient, RestConnector};
pub use credentials::{
    resolve_credentials, CredentialError, CredentialSource, GcpCredentials, ResolvedCredentials,
};
pub use live::LiveApiParser;
pub use location::{normalize_self_link, region_from_location};
pub use source::TerraformSourceParser;
pub use state::TerraformStateParser;
pub use template::DeploymentManagerParser;

use cloudshift_types::ResourceParser;

/// Every GCP parser, file formats first
pub fn parsers() -> Vec<Box<dyn ResourceParser>> {
    vec![
        Box::new(TerraformStateParser::new()),
        Box::new(DeploymentManagerParser::new()),
        Box::new(TerraformSourceParser::new()),
        Box::new(LiveApiParser::new()),
    ]
}
