//! Credential resolution for live discovery
//!
//! Priority: explicit settings in `ParseOptions::credentials`
//! (`access_token`, `credentials_json`, `credentials_file`), then the
//! `GOOGLE_APPLICATION_CREDENTIALS` pointer, then the gcloud
//! application-default credentials file, then the metadata server.

use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use cloudshift_types::DiscoveryError;

pub const ENV_APPLICATION_CREDENTIALS: &str = "GOOGLE_APPLICATION_CREDENTIALS";

pub const KEY_ACCESS_TOKEN: &str = "access_token";
pub const KEY_CREDENTIALS_JSON: &str = "credentials_json";
pub const KEY_CREDENTIALS_FILE: &str = "credentials_file";
pub const KEY_PROJECT_ID: &str = "project_id";

#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("Failed to read credentials file {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("Invalid credentials: {0}")]
    Invalid(String),

    #[error("Unsupported credential type: {0}")]
    UnsupportedType(String),

    #[error("Token request failed: {0}")]
    Token(String),
}

impl From<CredentialError> for DiscoveryError {
    fn from(error: CredentialError) -> Self {
        DiscoveryError::CredentialResolutionFailed(error.to_string())
    }
}

/// Service account key file contents
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub token_uri: Option<String>,
}

/// `gcloud auth application-default login` credentials
#[derive(Clone, Deserialize)]
pub struct AuthorizedUser {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
    #[serde(default)]
    pub quota_project_id: Option<String>,
}

#[derive(Clone)]
pub enum GcpCredentials {
    /// Pre-issued OAuth access token
    AccessToken(String),
    /// Service account key (JWT bearer grant)
    ServiceAccount(ServiceAccountKey),
    /// Refresh-token credentials of a user
    AuthorizedUser(AuthorizedUser),
    /// Token from the instance metadata server
    MetadataServer,
}

impl GcpCredentials {
    pub fn kind(&self) -> &'static str {
        match self {
            GcpCredentials::AccessToken(_) => "access_token",
            GcpCredentials::ServiceAccount(_) => "service_account",
            GcpCredentials::AuthorizedUser(_) => "authorized_user",
            GcpCredentials::MetadataServer => "metadata_server",
        }
    }

    /// Parse a credentials JSON document, returning the project it names
    pub fn from_json(json: &str) -> Result<(Self, Option<String>), CredentialError> {
        let value: Value =
            serde_json::from_str(json).map_err(|e| CredentialError::Invalid(e.to_string()))?;
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        match kind.as_str() {
            "service_account" => {
                let key: ServiceAccountKey = serde_json::from_value(value)
                    .map_err(|e| CredentialError::Invalid(e.to_string()))?;
                let project = key.project_id.clone();
                Ok((GcpCredentials::ServiceAccount(key), project))
            }
            "authorized_user" => {
                let user: AuthorizedUser = serde_json::from_value(value)
                    .map_err(|e| CredentialError::Invalid(e.to_string()))?;
                let project = user.quota_project_id.clone();
                Ok((GcpCredentials::AuthorizedUser(user), project))
            }
            "" => Err(CredentialError::Invalid(
                "credentials JSON has no type field".to_string(),
            )),
            other => Err(CredentialError::UnsupportedType(other.to_string())),
        }
    }

    pub fn from_file(path: &Path) -> Result<(Self, Option<String>), CredentialError> {
        let contents = std::fs::read_to_string(path).map_err(|e| CredentialError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_json(&contents)
    }
}

impl std::fmt::Debug for GcpCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GcpCredentials::ServiceAccount(key) => f
                .debug_struct("ServiceAccount")
                .field("client_email", &key.client_email)
                .field("private_key", &"***")
                .finish(),
            other => write!(f, "{}", other.kind()),
        }
    }
}

/// Where the credentials were found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    Explicit,
    Environment,
    WellKnownFile,
    MetadataServer,
}

#[derive(Debug, Clone)]
pub struct ResolvedCredentials {
    pub credentials: GcpCredentials,
    pub project_id: Option<String>,
    pub source: CredentialSource,
}

/// gcloud application-default credentials location
pub fn well_known_file() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| {
        dir.join("gcloud")
            .join("application_default_credentials.json")
    })
}

/// Resolve credentials from explicit settings and the process environment
pub fn resolve_credentials(
    explicit: &HashMap<String, String>,
) -> Result<ResolvedCredentials, CredentialError> {
    resolve_with(
        explicit,
        |key| std::env::var(key).ok(),
        well_known_file().as_deref(),
    )
}

/// Resolve credentials with injectable environment and well-known file
pub fn resolve_with<F>(
    explicit: &HashMap<String, String>,
    env: F,
    well_known: Option<&Path>,
) -> Result<ResolvedCredentials, CredentialError>
where
    F: Fn(&str) -> Option<String>,
{
    let explicit_project = explicit
        .get(KEY_PROJECT_ID)
        .filter(|p| !p.is_empty())
        .cloned();

    let resolved = |credentials, project: Option<String>, source| ResolvedCredentials {
        credentials,
        project_id: explicit_project.clone().or(project),
        source,
    };

    if let Some(token) = explicit.get(KEY_ACCESS_TOKEN).filter(|t| !t.is_empty()) {
        return Ok(resolved(
            GcpCredentials::AccessToken(token.clone()),
            None,
            CredentialSource::Explicit,
        ));
    }
    if let Some(json) = explicit.get(KEY_CREDENTIALS_JSON).filter(|j| !j.is_empty()) {
        let (credentials, project) = GcpCredentials::from_json(json)?;
        return Ok(resolved(credentials, project, CredentialSource::Explicit));
    }
    if let Some(file) = explicit.get(KEY_CREDENTIALS_FILE).filter(|f| !f.is_empty()) {
        let (credentials, project) = GcpCredentials::from_file(Path::new(file))?;
        return Ok(resolved(credentials, project, CredentialSource::Explicit));
    }

    if let Some(file) = env(ENV_APPLICATION_CREDENTIALS).filter(|f| !f.is_empty()) {
        let (credentials, project) = GcpCredentials::from_file(Path::new(&file))?;
        return Ok(resolved(credentials, project, CredentialSource::Environment));
    }

    if let Some(file) = well_known.filter(|path| path.is_file()) {
        let (credentials, project) = GcpCredentials::from_file(file)?;
        return Ok(resolved(credentials, project, CredentialSource::WellKnownFile));
    }

    Ok(resolved(
        GcpCredentials::MetadataServer,
        None,
        CredentialSource::MetadataServer,
    ))
}
