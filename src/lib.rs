//! azkv - converge an Azure Key Vault to a declared state

pub mod azure;
pub mod config;
pub mod keyvault;

/// Version injected at compile time via AZKV_VERSION env var (set by CI/CD),
/// or "dev" for local builds.
pub const VERSION: &str = match option_env!("AZKV_VERSION") {
    Some(v) => v,
    None => "dev",
};
