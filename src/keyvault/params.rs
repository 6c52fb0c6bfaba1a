//! Desired-state parameters
//!
//! The caller-facing shape of a vault, as read from an `apply` file.

use anyhow::{anyhow, Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Maximum number of access policies ARM accepts on one vault
pub const MAX_ACCESS_POLICIES: usize = 16;

/// Target lifecycle state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum State {
    #[default]
    Present,
    Absent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SkuName {
    Standard,
    Premium,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CreateMode {
    Recover,
    Default,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Sku {
    pub family: String,
    pub name: SkuName,
}

/// Permission lists, either given flat on an access policy or nested
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Permissions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keys: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secrets: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificates: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<Vec<String>>,
}

impl Permissions {
    pub fn is_empty(&self) -> bool {
        self.keys.is_none()
            && self.secrets.is_none()
            && self.certificates.is_none()
            && self.storage.is_none()
    }
}

/// One access policy entry as the caller writes it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AccessPolicyEntry {
    pub tenant_id: String,
    pub object_id: String,
    #[serde(default)]
    pub application_id: Option<String>,
    #[serde(default)]
    pub permissions: Option<Permissions>,
    #[serde(default)]
    pub keys: Option<Vec<String>>,
    #[serde(default)]
    pub secrets: Option<Vec<String>>,
    #[serde(default)]
    pub certificates: Option<Vec<String>>,
    #[serde(default)]
    pub storage: Option<Vec<String>>,
}

impl AccessPolicyEntry {
    pub fn new(tenant_id: &str, object_id: &str) -> Self {
        Self {
            tenant_id: tenant_id.to_string(),
            object_id: object_id.to_string(),
            application_id: None,
            permissions: None,
            keys: None,
            secrets: None,
            certificates: None,
            storage: None,
        }
    }
}

/// Everything the caller asks for in one `apply`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DesiredConfig {
    pub resource_group: String,
    pub vault_name: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub sku: Option<Sku>,
    #[serde(default)]
    pub access_policies: Option<Vec<AccessPolicyEntry>>,
    #[serde(default)]
    pub vault_uri: Option<String>,
    #[serde(default)]
    pub enabled_for_deployment: Option<bool>,
    #[serde(default)]
    pub enabled_for_disk_encryption: Option<bool>,
    #[serde(default)]
    pub enabled_for_template_deployment: Option<bool>,
    #[serde(default)]
    pub enable_soft_delete: Option<bool>,
    #[serde(default)]
    pub create_mode: Option<CreateMode>,
    #[serde(default)]
    pub state: State,
}

impl DesiredConfig {
    pub fn new(resource_group: &str, vault_name: &str) -> Self {
        Self {
            resource_group: resource_group.to_string(),
            vault_name: vault_name.to_string(),
            ..Self::default()
        }
    }

    /// Parse a YAML (or JSON) document
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self =
            serde_yaml::from_str(content).context("Invalid desired-state document")?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a desired-state file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_yaml(&content).with_context(|| format!("In {}", path.display()))
    }

    /// Required-field checks; everything else is left to ARM
    pub fn validate(&self) -> Result<()> {
        if self.resource_group.trim().is_empty() {
            return Err(anyhow!("resource_group must not be empty"));
        }
        if self.vault_name.trim().is_empty() {
            return Err(anyhow!("vault_name must not be empty"));
        }

        let policies = self.access_policies.as_deref().unwrap_or_default();
        if policies.len() > MAX_ACCESS_POLICIES {
            tracing::warn!(
                "{} access policies given, ARM accepts at most {}",
                policies.len(),
                MAX_ACCESS_POLICIES
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_document() {
        let config = DesiredConfig::from_yaml(
            r#"
resource_group: rg1
vault_name: kv1
location: eastus
tenant_id: 72f988bf-0000-0000-0000-000000000000
sku:
  family: A
  name: premium
access_policies:
  - tenant_id: 72f988bf-0000-0000-0000-000000000000
    object_id: 99999999-0000-0000-0000-000000000000
    keys: [get, list]
    secrets: [get]
enabled_for_deployment: true
enable_soft_delete: true
create_mode: recover
state: absent
"#,
        )
        .unwrap();

        assert_eq!(config.sku.as_ref().unwrap().name, SkuName::Premium);
        assert_eq!(config.create_mode, Some(CreateMode::Recover));
        assert_eq!(config.state, State::Absent);

        let policy = &config.access_policies.as_ref().unwrap()[0];
        assert_eq!(policy.keys.as_deref(), Some(&["get".to_string(), "list".to_string()][..]));
        assert!(policy.certificates.is_none());
    }

    #[test]
    fn test_state_defaults_to_present() {
        let config = DesiredConfig::from_yaml("resource_group: rg1\nvault_name: kv1\n").unwrap();
        assert_eq!(config.state, State::Present);
        assert!(config.location.is_none());
    }

    #[test]
    fn test_rejects_out_of_set_choices() {
        let bad_sku = "resource_group: rg1\nvault_name: kv1\nsku: {family: A, name: basic}\n";
        assert!(DesiredConfig::from_yaml(bad_sku).is_err());

        let bad_mode = "resource_group: rg1\nvault_name: kv1\ncreate_mode: restore\n";
        assert!(DesiredConfig::from_yaml(bad_mode).is_err());
    }

    #[test]
    fn test_rejects_missing_or_empty_names() {
        assert!(DesiredConfig::from_yaml("vault_name: kv1\n").is_err());
        assert!(DesiredConfig::from_yaml("resource_group: ''\nvault_name: kv1\n").is_err());
    }

    #[test]
    fn test_rejects_unknown_fields() {
        let typo = "resource_group: rg1\nvault_name: kv1\nenable_softdelete: true\n";
        assert!(DesiredConfig::from_yaml(typo).is_err());
    }

    #[test]
    fn test_json_documents_are_accepted() {
        let config =
            DesiredConfig::from_yaml(r#"{"resource_group": "rg1", "vault_name": "kv1"}"#).unwrap();
        assert_eq!(config, DesiredConfig::new("rg1", "kv1"));
    }
}
