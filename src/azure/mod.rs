//! Azure Resource Manager interaction module
//!
//! This module provides the plumbing for talking to the Azure management
//! plane: authentication, the HTTP layer and resource group lookups.
//!
//! # Module Structure
//!
//! - [`auth`] - Credential resolution and bearer token caching
//! - [`client`] - Main ARM client, URL builders and long-running-operation polling
//! - [`http`] - HTTP utilities and ARM error decoding
//! - [`resource_groups`] - Resource group lookup
//!
//! # Example
//!
//! ```ignore
//! use azkv::azure::auth::AzureCredentials;
//! use azkv::azure::client::ArmClient;
//! use azkv::azure::http::ArmHttpClient;
//!
//! async fn example() -> anyhow::Result<()> {
//!     let client = ArmClient::new(
//!         AzureCredentials::static_token("..."),
//!         ArmHttpClient::new()?,
//!         "00000000-0000-0000-0000-000000000000",
//!         "https://management.azure.com",
//!     )?;
//!     let vault = client.get_optional(&client.vault_url("rg1", "kv1")).await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod client;
pub mod http;
pub mod resource_groups;
