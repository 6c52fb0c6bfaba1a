//! Azure Authentication
//!
//! Resolves credentials from the environment or an `~/.azure/credentials`
//! profile and exchanges them for ARM bearer tokens.

use crate::config::CloudEnvironment;
use anyhow::{anyhow, Context, Result};
use reqwest::Client;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Token expiry buffer - refresh tokens this much before they actually expire
const TOKEN_EXPIRY_BUFFER: Duration = Duration::from_secs(60);

/// Default token TTL if the token endpoint omits `expires_in`
const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(30 * 60);

pub const DEFAULT_PROFILE: &str = "default";

/// A service principal for the client-credentials flow
#[derive(Clone, PartialEq, Eq)]
pub struct ServicePrincipal {
    pub tenant: String,
    pub client_id: String,
    pub secret: String,
}

impl std::fmt::Debug for ServicePrincipal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServicePrincipal")
            .field("tenant", &self.tenant)
            .field("client_id", &self.client_id)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Where an access token comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialSource {
    /// Pre-issued bearer token (`AZURE_ACCESS_TOKEN`)
    StaticToken(String),
    ServicePrincipal(ServicePrincipal),
}

/// One section of `~/.azure/credentials`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialsProfile {
    pub values: HashMap<String, String>,
}

impl CredentialsProfile {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    pub fn subscription_id(&self) -> Option<String> {
        self.get("subscription_id").map(str::to_string)
    }

    fn service_principal(&self) -> Option<ServicePrincipal> {
        Some(ServicePrincipal {
            tenant: self.get("tenant")?.to_string(),
            client_id: self.get("client_id")?.to_string(),
            secret: self.get("secret")?.to_string(),
        })
    }
}

/// Get the Azure CLI configuration directory
pub fn get_azure_config_dir() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("AZURE_CONFIG_DIR") {
        return Some(PathBuf::from(path));
    }

    dirs::home_dir().map(|p| p.join(".azure"))
}

/// Parse one `[section]` of an INI-style credentials file
pub fn parse_credentials_profile(content: &str, profile: &str) -> Option<CredentialsProfile> {
    let mut in_section = false;
    let mut found = false;
    let mut values = HashMap::new();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if let Some(section) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            in_section = section.trim() == profile;
            found |= in_section;
        } else if in_section {
            if let Some((key, value)) = line.split_once('=') {
                values.insert(key.trim().to_string(), value.trim().to_string());
            }
        }
    }

    found.then_some(CredentialsProfile { values })
}

/// Load a profile from `~/.azure/credentials`
pub fn load_credentials_profile(profile: &str) -> Option<CredentialsProfile> {
    let path = get_azure_config_dir()?.join("credentials");
    load_credentials_profile_from(&path, profile)
}

pub fn load_credentials_profile_from(path: &Path, profile: &str) -> Option<CredentialsProfile> {
    let content = std::fs::read_to_string(path).ok()?;
    let parsed = parse_credentials_profile(&content, profile);
    if parsed.is_none() {
        tracing::warn!("Profile [{}] not found in {:?}", profile, path);
    }
    parsed
}

/// Resolve a credential source from environment variables, then the profile
pub fn resolve_source(
    env: impl Fn(&str) -> Option<String>,
    profile: Option<&CredentialsProfile>,
) -> Result<CredentialSource> {
    if let Some(token) = env("AZURE_ACCESS_TOKEN").filter(|t| !t.is_empty()) {
        tracing::debug!("Using pre-issued token from AZURE_ACCESS_TOKEN");
        return Ok(CredentialSource::StaticToken(token));
    }

    if let (Some(client_id), Some(secret), Some(tenant)) = (
        env("AZURE_CLIENT_ID"),
        env("AZURE_SECRET"),
        env("AZURE_TENANT"),
    ) {
        tracing::debug!("Using service principal from environment");
        return Ok(CredentialSource::ServicePrincipal(ServicePrincipal {
            tenant,
            client_id,
            secret,
        }));
    }

    if let Some(principal) = profile.and_then(CredentialsProfile::service_principal) {
        tracing::debug!("Using service principal from credentials profile");
        return Ok(CredentialSource::ServicePrincipal(principal));
    }

    Err(anyhow!(
        "No Azure credentials found. Set AZURE_CLIENT_ID, AZURE_SECRET and AZURE_TENANT, \
         AZURE_ACCESS_TOKEN, or add a profile to ~/.azure/credentials"
    ))
}

/// Azure credentials holder with token caching
#[derive(Clone)]
pub struct AzureCredentials {
    source: CredentialSource,
    http: Client,
    authority: String,
    scope: String,
    token_cache: Arc<RwLock<Option<CachedToken>>>,
}

#[derive(Clone)]
struct CachedToken {
    token: String,
    /// When this token expires (with buffer applied)
    expires_at: Instant,
}

impl CachedToken {
    fn is_valid(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

impl AzureCredentials {
    /// Create credentials for the given cloud
    pub fn new(source: CredentialSource, cloud: CloudEnvironment, http: Client) -> Self {
        Self::with_endpoints(
            source,
            cloud.authority_host(),
            cloud.resource_manager(),
            http,
        )
    }

    /// Create credentials against explicit authority / resource endpoints
    pub fn with_endpoints(
        source: CredentialSource,
        authority: &str,
        resource_manager: &str,
        http: Client,
    ) -> Self {
        Self {
            source,
            http,
            authority: authority.trim_end_matches('/').to_string(),
            scope: format!("{}/.default", resource_manager.trim_end_matches('/')),
            token_cache: Arc::new(RwLock::new(None)),
        }
    }

    /// Credentials wrapping a fixed bearer token
    pub fn static_token(token: &str) -> Self {
        let cloud = CloudEnvironment::default();
        Self::new(
            CredentialSource::StaticToken(token.to_string()),
            cloud,
            Client::new(),
        )
    }

    /// Get an access token for API calls
    pub async fn get_token(&self) -> Result<String> {
        let principal = match &self.source {
            CredentialSource::StaticToken(token) => return Ok(token.clone()),
            CredentialSource::ServicePrincipal(principal) => principal,
        };

        {
            let cache = self.token_cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.is_valid() {
                    return Ok(cached.token.clone());
                }
                tracing::debug!("Cached token expired, fetching new token");
            }
        }

        let (token, ttl) = self.request_token(principal).await?;
        let expires_at = Instant::now() + ttl.saturating_sub(TOKEN_EXPIRY_BUFFER);

        {
            let mut cache = self.token_cache.write().await;
            *cache = Some(CachedToken {
                token: token.clone(),
                expires_at,
            });
        }

        tracing::debug!(
            "New token cached, expires in ~{} minutes",
            ttl.saturating_sub(TOKEN_EXPIRY_BUFFER).as_secs() / 60
        );

        Ok(token)
    }

    async fn request_token(&self, principal: &ServicePrincipal) -> Result<(String, Duration)> {
        let url = format!(
            "{}/{}/oauth2/v2.0/token",
            self.authority,
            urlencoding::encode(&principal.tenant)
        );
        tracing::debug!("POST {}", url);

        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", principal.client_id.as_str()),
            ("client_secret", principal.secret.as_str()),
            ("scope", self.scope.as_str()),
        ];

        let response = self
            .http
            .post(&url)
            .form(&form)
            .send()
            .await
            .context("Failed to reach the Azure token endpoint")?;

        let status = response.status();
        let body: Value = response
            .json()
            .await
            .context("Failed to parse token response")?;

        if !status.is_success() {
            let description = body
                .get("error_description")
                .or_else(|| body.get("error"))
                .and_then(|v| v.as_str())
                .unwrap_or("no description");
            // The description often spans several lines with trace ids
            let first_line = description.lines().next().unwrap_or(description);
            return Err(anyhow!(
                "Failed to get access token: {} ({})",
                status,
                first_line
            ));
        }

        let token = body
            .get("access_token")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow!("Token response has no access_token"))?
            .to_string();

        // v1 endpoints send expires_in as a string
        let ttl = body
            .get("expires_in")
            .and_then(|v| v.as_u64().or_else(|| v.as_str()?.parse().ok()))
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TOKEN_TTL);

        Ok((token, ttl))
    }
}
