//! ARM Client
//!
//! Main client for Azure Resource Manager, combining authentication, HTTP
//! functionality and long-running-operation polling.

use super::auth::AzureCredentials;
use super::http::{ArmHttpClient, ArmResponse};
use anyhow::{anyhow, Context, Result};
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;
use url::Url;

pub const RESOURCE_GROUPS_API_VERSION: &str = "2021-04-01";
pub const KEY_VAULT_API_VERSION: &str = "2022-07-01";

/// Terminal and non-terminal states of an `Azure-AsyncOperation` monitor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationStatus {
    Succeeded,
    Failed(String),
    Running,
}

impl OperationStatus {
    /// Read the status monitor body
    pub fn from_body(body: &Value) -> Self {
        let Some(status) = body.get("status").and_then(|v| v.as_str()) else {
            return OperationStatus::Failed("operation monitor returned no status".to_string());
        };

        match status {
            "Succeeded" => OperationStatus::Succeeded,
            "Failed" | "Canceled" => {
                let message = body
                    .get("error")
                    .and_then(|e| e.get("message"))
                    .and_then(|v| v.as_str())
                    .unwrap_or("no error details");
                OperationStatus::Failed(format!("operation {}: {}", status.to_lowercase(), message))
            }
            "InProgress" | "Accepted" | "NotStarted" | "Running" | "Creating" | "Updating"
            | "Deleting" => OperationStatus::Running,
            other => OperationStatus::Failed(format!("unrecognized operation status: {other}")),
        }
    }
}

/// Main ARM client
#[derive(Clone)]
pub struct ArmClient {
    pub credentials: AzureCredentials,
    pub http: ArmHttpClient,
    pub subscription_id: String,
    endpoint: String,
    poll_interval: Duration,
}

impl ArmClient {
    /// Create a new ARM client against a management endpoint
    pub fn new(
        credentials: AzureCredentials,
        http: ArmHttpClient,
        subscription_id: &str,
        endpoint: &str,
    ) -> Result<Self> {
        let parsed = Url::parse(endpoint)
            .with_context(|| format!("Invalid resource manager endpoint: {endpoint}"))?;
        if !matches!(parsed.scheme(), "https" | "http") {
            return Err(anyhow!("Unsupported endpoint scheme: {}", parsed.scheme()));
        }

        Ok(Self {
            credentials,
            http,
            subscription_id: subscription_id.to_string(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            poll_interval: Duration::from_secs(crate::config::DEFAULT_OPERATION_POLL_SECS),
        })
    }

    /// Interval used when ARM sends no `Retry-After`
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Get the current access token
    pub async fn get_token(&self) -> Result<String> {
        self.credentials.get_token().await
    }

    /// Make a GET request to ARM
    pub async fn get(&self, url: &str) -> Result<Value> {
        let token = self.get_token().await?;
        self.http.get(url, &token).await
    }

    /// Make a GET request to ARM, mapping 404 to `None`
    pub async fn get_optional(&self, url: &str) -> Result<Option<Value>> {
        let token = self.get_token().await?;
        self.http.get_optional(url, &token).await
    }

    /// Make a PUT request to ARM
    pub async fn put(&self, url: &str, body: &Value) -> Result<ArmResponse> {
        let token = self.get_token().await?;
        self.http.put(url, &token, body).await
    }

    /// Make a DELETE request to ARM
    pub async fn delete(&self, url: &str) -> Result<ArmResponse> {
        let token = self.get_token().await?;
        self.http.delete(url, &token).await
    }

    /// Block until a mutating call's long-running operation completes
    ///
    /// `resource_url` is re-read once the operation finishes, since neither the
    /// monitor body nor the final `Location` answer carries the resource.
    pub async fn wait_for_operation(&self, response: ArmResponse, resource_url: &str) -> Result<Value> {
        if !response.is_pending() {
            return Ok(response.body);
        }

        if let Some(monitor) = response.async_operation.as_deref() {
            let mut delay = response.retry_after.unwrap_or(self.poll_interval);
            loop {
                tokio::time::sleep(delay).await;
                let token = self.get_token().await?;
                let status = self.http.get_response(monitor, &token).await?;

                match OperationStatus::from_body(&status.body) {
                    OperationStatus::Succeeded => {
                        tracing::debug!("Operation succeeded: {}", monitor);
                        return self.get(resource_url).await;
                    }
                    OperationStatus::Failed(message) => return Err(anyhow!(message)),
                    OperationStatus::Running => {
                        tracing::debug!("Operation still running: {}", monitor);
                        delay = status.retry_after.unwrap_or(self.poll_interval);
                    }
                }
            }
        }

        let Some(location) = response.location.clone() else {
            return Ok(response.body);
        };

        let mut delay = response.retry_after.unwrap_or(self.poll_interval);
        loop {
            tokio::time::sleep(delay).await;
            let token = self.get_token().await?;
            let polled = self.http.get_response(&location, &token).await?;

            if polled.status != StatusCode::ACCEPTED {
                tracing::debug!("Operation completed: {}", location);
                return self.get(resource_url).await;
            }
            delay = polled.retry_after.unwrap_or(self.poll_interval);
        }
    }

    // =========================================================================
    // Resource Manager URL helpers
    // =========================================================================

    /// Build a subscription-scoped ARM URL
    pub fn subscription_url(&self, path: &str) -> String {
        format!(
            "{}/subscriptions/{}/{}",
            self.endpoint,
            urlencoding::encode(&self.subscription_id),
            path
        )
    }

    /// Build a resource group URL
    pub fn resource_group_url(&self, resource_group: &str) -> String {
        format!(
            "{}?api-version={}",
            self.subscription_url(&format!(
                "resourceGroups/{}",
                urlencoding::encode(resource_group)
            )),
            RESOURCE_GROUPS_API_VERSION
        )
    }

    /// Build the URL of the vault collection in a resource group
    pub fn vaults_url(&self, resource_group: &str) -> String {
        format!(
            "{}?api-version={}",
            self.subscription_url(&format!(
                "resourceGroups/{}/providers/Microsoft.KeyVault/vaults",
                urlencoding::encode(resource_group)
            )),
            KEY_VAULT_API_VERSION
        )
    }

    /// Build the URL of a single vault
    pub fn vault_url(&self, resource_group: &str, vault_name: &str) -> String {
        format!(
            "{}?api-version={}",
            self.subscription_url(&format!(
                "resourceGroups/{}/providers/Microsoft.KeyVault/vaults/{}",
                urlencoding::encode(resource_group),
                urlencoding::encode(vault_name)
            )),
            KEY_VAULT_API_VERSION
        )
    }
}
