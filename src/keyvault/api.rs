//! Vault management operations
//!
//! [`VaultApi`] is everything the reconciler needs from the management plane.
//! [`ArmClient`] implements it over REST.

use super::normalize::RequestPayload;
use crate::azure::client::ArmClient;
use crate::azure::resource_groups::get_resource_group;
use anyhow::{Context, Result};
use serde_json::Value;

#[allow(async_fn_in_trait)]
pub trait VaultApi {
    /// Current vault representation, `None` when it does not exist
    async fn get_vault(&self, resource_group: &str, vault_name: &str) -> Result<Option<Value>>;

    /// Create or update a vault, waiting out any long-running operation
    async fn create_or_update_vault(
        &self,
        resource_group: &str,
        vault_name: &str,
        payload: &RequestPayload,
    ) -> Result<Value>;

    async fn delete_vault(&self, resource_group: &str, vault_name: &str) -> Result<()>;

    /// Location of a resource group
    async fn resource_group_location(&self, resource_group: &str) -> Result<String>;
}

impl VaultApi for ArmClient {
    async fn get_vault(&self, resource_group: &str, vault_name: &str) -> Result<Option<Value>> {
        let vault = self
            .get_optional(&self.vault_url(resource_group, vault_name))
            .await?;

        match &vault {
            Some(v) => tracing::debug!(
                "Key Vault instance {} found",
                v.get("name").and_then(|n| n.as_str()).unwrap_or(vault_name)
            ),
            None => tracing::debug!("Did not find the Key Vault instance {}", vault_name),
        }

        Ok(vault)
    }

    async fn create_or_update_vault(
        &self,
        resource_group: &str,
        vault_name: &str,
        payload: &RequestPayload,
    ) -> Result<Value> {
        let url = self.vault_url(resource_group, vault_name);
        let body = serde_json::to_value(payload).context("Failed to serialize vault payload")?;

        let response = self.put(&url, &body).await?;
        if response.is_pending() {
            tracing::info!("Waiting for Key Vault {} operation to complete", vault_name);
        }

        self.wait_for_operation(response, &url).await
    }

    async fn delete_vault(&self, resource_group: &str, vault_name: &str) -> Result<()> {
        self.delete(&self.vault_url(resource_group, vault_name))
            .await?;
        Ok(())
    }

    async fn resource_group_location(&self, resource_group: &str) -> Result<String> {
        Ok(get_resource_group(self, resource_group).await?.location)
    }
}
