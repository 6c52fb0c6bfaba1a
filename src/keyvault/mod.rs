//! Key Vault reconciliation
//!
//! # Architecture
//!
//! - [`params`] - The caller-facing desired state, parsed from YAML or JSON
//! - [`normalize`] - Pure mapping from desired state to the ARM request body
//! - [`api`] - The [`VaultApi`] seam and its ARM implementation
//! - [`reconcile`] - Action decision and dispatch
//! - [`facts`] - Read-only vault queries
//!
//! # Example
//!
//! ```ignore
//! use azkv::keyvault::{DesiredConfig, Reconciler};
//!
//! async fn converge(client: &azkv::azure::client::ArmClient) -> anyhow::Result<()> {
//!     let config = DesiredConfig::from_yaml("resource_group: rg1\nvault_name: kv1\n")?;
//!     let outcome = Reconciler::new(client).run(&config).await?;
//!     println!("changed: {}", outcome.changed);
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod facts;
pub mod normalize;
pub mod params;
pub mod reconcile;

pub use api::VaultApi;
pub use normalize::{normalize, RequestPayload};
pub use params::{DesiredConfig, State};
pub use reconcile::{Action, Outcome, Reconciler};
