//! REST implementation of the cloud API seam
//!
//! Lists resources through the public `*.googleapis.com` JSON APIs with a
//! read-only OAuth token. Aggregated compute lists are flattened across
//! scopes and `nextPageToken` pages are followed until exhausted.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use cloudshift_types::{DiscoveryError, DiscoveryResult};

use crate::api::{GcpApi, GcpConnector, Scan};
use crate::credentials::{
    resolve_credentials, AuthorizedUser, CredentialError, GcpCredentials, ResolvedCredentials,
    ServiceAccountKey,
};

const GCP_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const METADATA_URL: &str = "http://metadata.google.internal";
const ENV_METADATA_HOST: &str = "GCE_METADATA_HOST";
const READ_ONLY_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform.read-only";
/// Refresh tokens this long before they expire
const TOKEN_EXPIRY_MARGIN_SECS: i64 = 60;

/// Where a scan's items live in the response body
#[derive(Debug, Clone, Copy)]
enum Items {
    /// Top-level array under the given key
    List(&'static str),
    /// `items.<scope>.<key>` arrays of an aggregated list
    Aggregated(&'static str),
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

/// Authenticated Google Cloud REST session
pub struct GcpRestClient {
    client: Client,
    credentials: GcpCredentials,
    project_id: Option<String>,
    /// Replaces `https://<service>.googleapis.com` when set
    base_url: Option<String>,
    token_url: String,
    metadata_url: String,
    access_token: RwLock<Option<CachedToken>>,
}

fn http_client() -> DiscoveryResult<Client> {
    Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .build()
        .map_err(|e| DiscoveryError::Api(format!("Failed to create HTTP client: {}", e)))
}

impl GcpRestClient {
    pub fn new(resolved: ResolvedCredentials) -> DiscoveryResult<Self> {
        let token_url = match &resolved.credentials {
            GcpCredentials::ServiceAccount(key) => key
                .token_uri
                .clone()
                .unwrap_or_else(|| GCP_TOKEN_URL.to_string()),
            _ => GCP_TOKEN_URL.to_string(),
        };
        let metadata_url = std::env::var(ENV_METADATA_HOST)
            .ok()
            .filter(|host| !host.is_empty())
            .map(|host| format!("http://{}", host))
            .unwrap_or_else(|| METADATA_URL.to_string());

        Ok(Self {
            client: http_client()?,
            credentials: resolved.credentials,
            project_id: resolved.project_id,
            base_url: None,
            token_url,
            metadata_url,
            access_token: RwLock::new(None),
        })
    }

    /// Route every API call to `{base_url}/{service}/...`
    pub fn with_base_url(resolved: ResolvedCredentials, base_url: String) -> DiscoveryResult<Self> {
        let mut client = Self::new(resolved)?;
        client.base_url = Some(base_url.trim_end_matches('/').to_string());
        Ok(client)
    }

    /// Client with a fixed access token
    pub fn with_test_token(
        base_url: String,
        token: String,
        project_id: Option<String>,
    ) -> DiscoveryResult<Self> {
        Self::with_base_url(
            ResolvedCredentials {
                credentials: GcpCredentials::AccessToken(token),
                project_id,
                source: crate::credentials::CredentialSource::Explicit,
            },
            base_url,
        )
    }

    pub fn with_token_url(mut self, token_url: impl Into<String>) -> Self {
        self.token_url = token_url.into();
        self
    }

    pub fn with_metadata_url(mut self, metadata_url: impl Into<String>) -> Self {
        self.metadata_url = metadata_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn credentials(&self) -> &GcpCredentials {
        &self.credentials
    }

    /// Get an access token, reusing the cached one until it nears expiry
    pub async fn access_token(&self) -> DiscoveryResult<String> {
        {
            let cached = self.access_token.read().await;
            if let Some(token) = cached.as_ref() {
                if token.expires_at > Utc::now() + Duration::seconds(TOKEN_EXPIRY_MARGIN_SECS) {
                    return Ok(token.value.clone());
                }
            }
        }

        let response = match &self.credentials {
            GcpCredentials::AccessToken(token) => return Ok(token.clone()),
            GcpCredentials::ServiceAccount(key) => self.service_account_token(key).await?,
            GcpCredentials::AuthorizedUser(user) => self.refresh_token(user).await?,
            GcpCredentials::MetadataServer => self.metadata_token().await?,
        };

        let expires_in = response.expires_in.unwrap_or(3600);
        let token = CachedToken {
            value: response.access_token,
            expires_at: Utc::now() + Duration::seconds(expires_in),
        };
        debug!("Obtained {} access token", self.credentials.kind());

        let value = token.value.clone();
        *self.access_token.write().await = Some(token);
        Ok(value)
    }

    async fn service_account_token(
        &self,
        key: &ServiceAccountKey,
    ) -> Result<TokenResponse, CredentialError> {
        let jwt = self.create_jwt(key)?;
        let request = self.client.post(&self.token_url).form(&[
            ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
            ("assertion", &jwt),
        ]);
        Self::token_response(request).await
    }

    async fn refresh_token(&self, user: &AuthorizedUser) -> Result<TokenResponse, CredentialError> {
        let request = self.client.post(&self.token_url).form(&[
            ("grant_type", "refresh_token"),
            ("client_id", user.client_id.as_str()),
            ("client_secret", user.client_secret.as_str()),
            ("refresh_token", user.refresh_token.as_str()),
        ]);
        Self::token_response(request).await
    }

    async fn metadata_token(&self) -> Result<TokenResponse, CredentialError> {
        let url = format!(
            "{}/computeMetadata/v1/instance/service-accounts/default/token",
            self.metadata_url
        );
        let request = self.client.get(url).header("Metadata-Flavor", "Google");
        Self::token_response(request).await
    }

    async fn token_response(
        request: reqwest::RequestBuilder,
    ) -> Result<TokenResponse, CredentialError> {
        let response = request
            .send()
            .await
            .map_err(|e| CredentialError::Token(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error = response.text().await.unwrap_or_default();
            return Err(CredentialError::Token(format!(
                "token endpoint returned status {}: {}",
                status, error
            )));
        }

        response
            .json()
            .await
            .map_err(|e| CredentialError::Token(format!("Failed to parse token response: {}", e)))
    }

    /// Project of the metadata server's instance
    pub async fn metadata_project(&self) -> DiscoveryResult<String> {
        let url = format!("{}/computeMetadata/v1/project/project-id", self.metadata_url);
        let response = self
            .client
            .get(url)
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .map_err(|e| CredentialError::Token(e.to_string()))?;
        if !response.status().is_success() {
            return Err(CredentialError::Token(format!(
                "metadata server returned status {}",
                response.status()
            ))
            .into());
        }
        let project = response
            .text()
            .await
            .map_err(|e| CredentialError::Token(e.to_string()))?;
        Ok(project.trim().to_string())
    }

    /// Create JWT for the service account bearer grant
    fn create_jwt(&self, key: &ServiceAccountKey) -> Result<String, CredentialError> {
        use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};

        let now = Utc::now().timestamp();
        let exp = now + 3600;

        let mut header = serde_json::json!({
            "alg": "RS256",
            "typ": "JWT"
        });
        if let Some(kid) = &key.private_key_id {
            header["kid"] = Value::String(kid.clone());
        }

        let claims = serde_json::json!({
            "iss": key.client_email,
            "scope": READ_ONLY_SCOPE,
            "aud": self.token_url,
            "iat": now,
            "exp": exp
        });

        let header_b64 = URL_SAFE_NO_PAD.encode(header.to_string().as_bytes());
        let claims_b64 = URL_SAFE_NO_PAD.encode(claims.to_string().as_bytes());
        let message = format!("{}.{}", header_b64, claims_b64);

        let signature = sign_rs256(&message, &key.private_key)?;
        Ok(format!("{}.{}", message, URL_SAFE_NO_PAD.encode(signature)))
    }

    fn endpoint(&self, project: &str, scan: Scan, region: Option<&str>) -> (String, Items) {
        let project = urlencoding::encode(project);
        let (service, path, items) = match scan {
            Scan::Instances => (
                ("compute", "compute/v1"),
                format!("projects/{}/aggregated/instances", project),
                Items::Aggregated("instances"),
            ),
            Scan::Disks => (
                ("compute", "compute/v1"),
                format!("projects/{}/aggregated/disks", project),
                Items::Aggregated("disks"),
            ),
            Scan::Networks => (
                ("compute", "compute/v1"),
                format!("projects/{}/global/networks", project),
                Items::List("items"),
            ),
            Scan::Subnetworks => (
                ("compute", "compute/v1"),
                format!("projects/{}/aggregated/subnetworks", project),
                Items::Aggregated("subnetworks"),
            ),
            Scan::Firewalls => (
                ("compute", "compute/v1"),
                format!("projects/{}/global/firewalls", project),
                Items::List("items"),
            ),
            Scan::ForwardingRules => (
                ("compute", "compute/v1"),
                format!("projects/{}/aggregated/forwardingRules", project),
                Items::Aggregated("forwardingRules"),
            ),
            Scan::Buckets => (
                ("storage", "storage/v1"),
                format!("b?project={}", project),
                Items::List("items"),
            ),
            Scan::SqlInstances => (
                ("sqladmin", "v1"),
                format!("projects/{}/instances", project),
                Items::List("items"),
            ),
            Scan::RedisInstances => (
                ("redis", "v1"),
                format!("projects/{}/locations/-/instances", project),
                Items::List("instances"),
            ),
            Scan::Topics => (
                ("pubsub", "v1"),
                format!("projects/{}/topics", project),
                Items::List("topics"),
            ),
            Scan::Subscriptions => (
                ("pubsub", "v1"),
                format!("projects/{}/subscriptions", project),
                Items::List("subscriptions"),
            ),
            Scan::RunServices => (
                ("run", "v2"),
                format!("projects/{}/locations/-/services", project),
                Items::List("services"),
            ),
            Scan::Functions => (
                ("cloudfunctions", "v2"),
                format!("projects/{}/locations/-/functions", project),
                Items::List("functions"),
            ),
            Scan::GkeClusters => (
                ("container", "v1"),
                format!("projects/{}/locations/-/clusters", project),
                Items::List("clusters"),
            ),
            Scan::SchedulerJobs => (
                ("cloudscheduler", "v1"),
                format!(
                    "projects/{}/locations/{}/jobs",
                    project,
                    urlencoding::encode(region.unwrap_or("-"))
                ),
                Items::List("jobs"),
            ),
            Scan::Secrets => (
                ("secretmanager", "v1"),
                format!("projects/{}/secrets", project),
                Items::List("secrets"),
            ),
            Scan::ServiceAccounts => (
                ("iam", "v1"),
                format!("projects/{}/serviceAccounts", project),
                Items::List("accounts"),
            ),
        };

        let (host, version) = service;
        let url = match &self.base_url {
            Some(base) => format!("{}/{}/{}/{}", base, host, version, path),
            None => format!("https://{}.googleapis.com/{}/{}", host, version, path),
        };
        (url, items)
    }

    async fn get_json(&self, cancel: &CancellationToken, url: &str) -> DiscoveryResult<Value> {
        let token = tokio::select! {
            _ = cancel.cancelled() => return Err(DiscoveryError::Cancelled),
            token = self.access_token() => token?,
        };
        debug!("GCP API request: GET {}", url);

        let request = self
            .client
            .get(url)
            .header("Authorization", format!("Bearer {}", token))
            .send();
        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(DiscoveryError::Cancelled),
            response = request => response
                .map_err(|e| DiscoveryError::Api(format!("API request failed: {}", e)))?,
        };

        let status = response.status();
        let body = tokio::select! {
            _ = cancel.cancelled() => return Err(DiscoveryError::Cancelled),
            body = response.text() => body,
        };
        if !status.is_success() {
            return Err(DiscoveryError::Api(format!(
                "GCP API returned status {}: {}",
                status,
                body.unwrap_or_default()
            )));
        }

        let response_text =
            body.map_err(|e| DiscoveryError::Api(format!("Failed to read response: {}", e)))?;
        if response_text.trim().is_empty() {
            return Ok(Value::Object(Default::default()));
        }
        serde_json::from_str(&response_text)
            .map_err(|e| DiscoveryError::Api(format!("Failed to parse response: {}", e)))
    }
}

/// Sign message with RS256 (RSA-SHA256)
fn sign_rs256(message: &str, private_key_pem: &str) -> Result<Vec<u8>, CredentialError> {
    use rsa::pkcs1v15::SigningKey;
    use rsa::pkcs8::DecodePrivateKey;
    use rsa::signature::{SignatureEncoding, Signer};
    use rsa::RsaPrivateKey;
    use sha2::Sha256;

    let private_key = RsaPrivateKey::from_pkcs8_pem(private_key_pem)
        .map_err(|e| CredentialError::Invalid(format!("Invalid private key: {}", e)))?;

    let signing_key = SigningKey::<Sha256>::new(private_key);
    Ok(signing_key.sign(message.as_bytes()).to_vec())
}

fn extract_items(body: &Value, items: Items, into: &mut Vec<Value>) {
    match items {
        Items::List(key) => {
            if let Some(list) = body.get(key).and_then(Value::as_array) {
                into.extend(list.iter().cloned());
            }
        }
        Items::Aggregated(key) => {
            if let Some(scopes) = body.get("items").and_then(Value::as_object) {
                for scope in scopes.values() {
                    if let Some(list) = scope.get(key).and_then(Value::as_array) {
                        into.extend(list.iter().cloned());
                    }
                }
            }
        }
    }
}

#[async_trait]
impl GcpApi for GcpRestClient {
    fn default_project(&self) -> Option<String> {
        self.project_id.clone()
    }

    async fn list(
        &self,
        cancel: &CancellationToken,
        project: &str,
        scan: Scan,
        region: Option<&str>,
    ) -> DiscoveryResult<Vec<Value>> {
        let (url, shape) = self.endpoint(project, scan, region);
        let mut items = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let page_url = match &page_token {
                Some(token) => {
                    let separator = if url.contains('?') { '&' } else { '?' };
                    format!("{}{}pageToken={}", url, separator, urlencoding::encode(token))
                }
                None => url.clone(),
            };
            let body = self.get_json(cancel, &page_url).await?;
            extract_items(&body, shape, &mut items);

            match body
                .get("nextPageToken")
                .and_then(Value::as_str)
                .filter(|token| !token.is_empty())
            {
                Some(token) => page_token = Some(token.to_string()),
                None => break,
            }
        }

        debug!("{} returned {} items", scan, items.len());
        Ok(items)
    }
}

/// Connector that resolves credentials and authenticates eagerly
#[derive(Debug, Default, Clone)]
pub struct RestConnector {
    base_url: Option<String>,
}

impl RestConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: Some(base_url.into()),
        }
    }
}

#[async_trait]
impl GcpConnector for RestConnector {
    #[instrument(skip_all)]
    async fn connect(
        &self,
        cancel: &CancellationToken,
        credentials: &HashMap<String, String>,
    ) -> DiscoveryResult<Arc<dyn GcpApi>> {
        let resolved = resolve_credentials(credentials)?;
        info!(
            "Using {} credentials from {:?}",
            resolved.credentials.kind(),
            resolved.source
        );

        let mut client = match &self.base_url {
            Some(base) => GcpRestClient::with_base_url(resolved, base.clone())?,
            None => GcpRestClient::new(resolved)?,
        };

        tokio::select! {
            _ = cancel.cancelled() => return Err(DiscoveryError::Cancelled),
            token = client.access_token() => { token?; }
        }

        if client.project_id.is_none() && matches!(client.credentials, GcpCredentials::MetadataServer) {
            let project = tokio::select! {
                _ = cancel.cancelled() => return Err(DiscoveryError::Cancelled),
                project = client.metadata_project() => project?,
            };
            client.project_id = Some(project);
        }

        Ok(Arc::new(client))
    }
}
