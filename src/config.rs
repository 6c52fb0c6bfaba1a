//! Configuration Management
//!
//! Handles persistent configuration for azkv.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default interval between existence checks after a delete
pub const DEFAULT_DELETE_POLL_SECS: u64 = 20;

/// Default interval between long-running-operation polls without `Retry-After`
pub const DEFAULT_OPERATION_POLL_SECS: u64 = 5;

/// Azure sovereign cloud the subscription lives in
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
pub enum CloudEnvironment {
    #[default]
    #[serde(rename = "AzureCloud")]
    #[value(name = "AzureCloud")]
    AzureCloud,
    #[serde(rename = "AzureChinaCloud")]
    #[value(name = "AzureChinaCloud")]
    AzureChinaCloud,
    #[serde(rename = "AzureUSGovernment")]
    #[value(name = "AzureUSGovernment")]
    AzureUsGovernment,
}

impl CloudEnvironment {
    /// ARM endpoint
    pub fn resource_manager(self) -> &'static str {
        match self {
            CloudEnvironment::AzureCloud => "https://management.azure.com",
            CloudEnvironment::AzureChinaCloud => "https://management.chinacloudapi.cn",
            CloudEnvironment::AzureUsGovernment => "https://management.usgovcloudapi.net",
        }
    }

    /// Entra ID authority host
    pub fn authority_host(self) -> &'static str {
        match self {
            CloudEnvironment::AzureCloud => "https://login.microsoftonline.com",
            CloudEnvironment::AzureChinaCloud => "https://login.chinacloudapi.cn",
            CloudEnvironment::AzureUsGovernment => "https://login.microsoftonline.us",
        }
    }
}

/// User configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Default subscription
    #[serde(default)]
    pub subscription_id: Option<String>,
    /// Section of ~/.azure/credentials to read
    #[serde(default)]
    pub profile: Option<String>,
    #[serde(default)]
    pub cloud: Option<CloudEnvironment>,
    /// Seconds between long-running-operation polls
    #[serde(default)]
    pub operation_poll_interval_secs: Option<u64>,
    /// Seconds between existence checks after a delete
    #[serde(default)]
    pub delete_poll_interval_secs: Option<u64>,
}

impl Config {
    /// Get the config file path
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("azkv").join("config.json"))
    }

    /// Load configuration from disk
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };

        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("Ignoring malformed config {:?}: {}", path, e);
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Get effective profile (CLI > config > AZURE_PROFILE > "default")
    pub fn effective_profile(&self, cli: Option<&str>) -> String {
        cli.map(str::to_string)
            .or_else(|| self.profile.clone())
            .or_else(|| std::env::var("AZURE_PROFILE").ok())
            .unwrap_or_else(|| crate::azure::auth::DEFAULT_PROFILE.to_string())
    }

    /// Get effective cloud (CLI > config > AZURE_CLOUD_ENVIRONMENT > AzureCloud)
    pub fn effective_cloud(&self, cli: Option<CloudEnvironment>) -> CloudEnvironment {
        cli.or(self.cloud)
            .or_else(|| {
                std::env::var("AZURE_CLOUD_ENVIRONMENT")
                    .ok()
                    .and_then(|v| CloudEnvironment::from_str(&v, true).ok())
            })
            .unwrap_or_default()
    }

    /// Get effective subscription (CLI > config > AZURE_SUBSCRIPTION_ID > profile)
    pub fn effective_subscription(
        &self,
        cli: Option<&str>,
        profile: Option<&crate::azure::auth::CredentialsProfile>,
    ) -> Option<String> {
        cli.map(str::to_string)
            .or_else(|| self.subscription_id.clone())
            .or_else(|| std::env::var("AZURE_SUBSCRIPTION_ID").ok())
            .or_else(|| profile.and_then(|p| p.subscription_id()))
            .filter(|s| !s.is_empty())
    }

    pub fn operation_poll_interval(&self) -> Duration {
        Duration::from_secs(
            self.operation_poll_interval_secs
                .unwrap_or(DEFAULT_OPERATION_POLL_SECS),
        )
    }

    pub fn delete_poll_interval(&self) -> Duration {
        Duration::from_secs(
            self.delete_poll_interval_secs
                .unwrap_or(DEFAULT_DELETE_POLL_SECS),
        )
    }
}
