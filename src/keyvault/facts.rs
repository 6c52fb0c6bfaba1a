//! Vault facts
//!
//! Read-only queries backing the `show` command.

use super::api::VaultApi;
use crate::azure::client::ArmClient;
use anyhow::Result;
use serde::Serialize;
use serde_json::Value;

/// Summary of one vault
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VaultFacts {
    pub id: String,
    pub name: String,
    pub location: String,
    pub sku: Option<String>,
    pub tenant_id: Option<String>,
    pub vault_uri: Option<String>,
    pub enable_soft_delete: Option<bool>,
    pub access_policy_count: usize,
}

impl From<&Value> for VaultFacts {
    fn from(value: &Value) -> Self {
        let text = |pointer: &str| {
            value
                .pointer(pointer)
                .and_then(|v| v.as_str())
                .map(str::to_string)
        };

        Self {
            id: text("/id").unwrap_or_else(|| "-".to_string()),
            name: text("/name").unwrap_or_else(|| "-".to_string()),
            location: text("/location").unwrap_or_else(|| "-".to_string()),
            sku: text("/properties/sku/name"),
            tenant_id: text("/properties/tenantId"),
            vault_uri: text("/properties/vaultUri"),
            enable_soft_delete: value
                .pointer("/properties/enableSoftDelete")
                .and_then(|v| v.as_bool()),
            access_policy_count: value
                .pointer("/properties/accessPolicies")
                .and_then(|v| v.as_array())
                .map_or(0, Vec::len),
        }
    }
}

/// Command output for `show`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VaultFactsReport {
    pub vaults: Vec<VaultFacts>,
}

/// Facts for a single vault, empty when it does not exist
pub async fn get_vault_facts(
    client: &ArmClient,
    resource_group: &str,
    vault_name: &str,
) -> Result<VaultFactsReport> {
    let vault = client.get_vault(resource_group, vault_name).await?;

    Ok(VaultFactsReport {
        vaults: vault.iter().map(VaultFacts::from).collect(),
    })
}

/// Facts for every vault in a resource group (auto-paginate)
pub async fn list_vault_facts(client: &ArmClient, resource_group: &str) -> Result<VaultFactsReport> {
    let mut vaults = Vec::new();
    let mut url = Some(client.vaults_url(resource_group));

    while let Some(page_url) = url {
        let page = client.get(&page_url).await?;

        if let Some(items) = page.get("value").and_then(|v| v.as_array()) {
            vaults.extend(items.iter().map(VaultFacts::from));
        }

        url = page
            .get("nextLink")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(str::to_string);
    }

    tracing::info!("Loaded {} vaults from {}", vaults.len(), resource_group);
    Ok(VaultFactsReport { vaults })
}
