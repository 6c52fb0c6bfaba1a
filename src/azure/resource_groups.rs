//! Azure Resource Groups
//!
//! Resource group lookup, used to default a vault's location.

use super::client::ArmClient;
use anyhow::{anyhow, Result};
use serde_json::Value;

/// Resource group information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceGroup {
    pub id: String,
    pub name: String,
    pub location: String,
    pub provisioning_state: String,
}

impl From<&Value> for ResourceGroup {
    fn from(value: &Value) -> Self {
        let field = |name: &str| {
            value
                .get(name)
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string()
        };

        Self {
            id: field("id"),
            name: field("name"),
            location: field("location"),
            provisioning_state: value
                .pointer("/properties/provisioningState")
                .and_then(|v| v.as_str())
                .unwrap_or("Unknown")
                .to_string(),
        }
    }
}

/// Fetch a resource group
pub async fn get_resource_group(client: &ArmClient, name: &str) -> Result<ResourceGroup> {
    let response = client.get(&client.resource_group_url(name)).await?;
    let group = ResourceGroup::from(&response);

    if group.location.is_empty() {
        return Err(anyhow!("Resource group {} reported no location", name));
    }

    tracing::debug!("Resource group {} is in {}", group.name, group.location);
    Ok(group)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_value() {
        let group = ResourceGroup::from(&json!({
            "id": "/subscriptions/sub-1/resourceGroups/rg1",
            "name": "rg1",
            "location": "westeurope",
            "properties": {"provisioningState": "Succeeded"}
        }));

        assert_eq!(group.location, "westeurope");
        assert_eq!(group.provisioning_state, "Succeeded");
    }

    #[test]
    fn test_from_sparse_value() {
        let group = ResourceGroup::from(&json!({"name": "rg1"}));
        assert!(group.location.is_empty());
        assert_eq!(group.provisioning_state, "Unknown");
    }
}
