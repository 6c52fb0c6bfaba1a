//! Parameter normalization
//!
//! Turns the flat [`DesiredConfig`] into the nested body ARM expects for a
//! vault PUT.

use super::params::{AccessPolicyEntry, CreateMode, DesiredConfig, Permissions, Sku};
use serde::Serialize;

/// Body of a vault create-or-update call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RequestPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<VaultProperties>,
}

impl RequestPayload {
    /// Same payload with `location` set
    pub fn with_location(self, location: impl Into<String>) -> Self {
        Self {
            location: Some(location.into()),
            ..self
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultProperties {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sku: Option<Sku>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_policies: Option<Vec<AccessPolicy>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vault_uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled_for_deployment: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled_for_disk_encryption: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled_for_template_deployment: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_soft_delete: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub create_mode: Option<CreateMode>,
}

/// Access policy in wire shape, permissions grouped under one container
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessPolicy {
    pub tenant_id: String,
    pub object_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub application_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permissions: Option<Permissions>,
}

/// Build the request payload for a desired state
pub fn normalize(config: &DesiredConfig) -> RequestPayload {
    let mut properties: Option<VaultProperties> = None;

    // Every property lands in a container that only exists once something is set
    fn put<T>(
        properties: &mut Option<VaultProperties>,
        value: Option<T>,
        slot: fn(&mut VaultProperties) -> &mut Option<T>,
    ) {
        if value.is_some() {
            *slot(properties.get_or_insert_with(VaultProperties::default)) = value;
        }
    }

    put(&mut properties, config.tenant_id.clone(), |p| &mut p.tenant_id);
    put(&mut properties, config.sku.clone(), |p| &mut p.sku);
    put(
        &mut properties,
        config
            .access_policies
            .as_ref()
            .map(|policies| policies.iter().map(normalize_access_policy).collect()),
        |p| &mut p.access_policies,
    );
    put(&mut properties, config.vault_uri.clone(), |p| &mut p.vault_uri);
    put(&mut properties, config.enabled_for_deployment, |p| {
        &mut p.enabled_for_deployment
    });
    put(&mut properties, config.enabled_for_disk_encryption, |p| {
        &mut p.enabled_for_disk_encryption
    });
    put(&mut properties, config.enabled_for_template_deployment, |p| {
        &mut p.enabled_for_template_deployment
    });
    put(&mut properties, config.enable_soft_delete, |p| &mut p.enable_soft_delete);
    put(&mut properties, config.create_mode, |p| &mut p.create_mode);

    RequestPayload {
        location: config.location.clone(),
        properties,
    }
}

/// Move a flat permission list under `permissions`, if it is set
fn move_under_permissions(
    permissions: &mut Option<Permissions>,
    value: &Option<Vec<String>>,
    slot: fn(&mut Permissions) -> &mut Option<Vec<String>>,
) {
    if let Some(list) = value {
        *slot(permissions.get_or_insert_with(Permissions::default)) = Some(list.clone());
    }
}

fn normalize_access_policy(entry: &AccessPolicyEntry) -> AccessPolicy {
    let mut permissions = entry.permissions.clone().filter(|p| !p.is_empty());

    move_under_permissions(&mut permissions, &entry.keys, |p| &mut p.keys);
    move_under_permissions(&mut permissions, &entry.secrets, |p| &mut p.secrets);
    move_under_permissions(&mut permissions, &entry.certificates, |p| &mut p.certificates);
    move_under_permissions(&mut permissions, &entry.storage, |p| &mut p.storage);

    AccessPolicy {
        tenant_id: entry.tenant_id.clone(),
        object_id: entry.object_id.clone(),
        application_id: entry.application_id.clone(),
        permissions,
    }
}
