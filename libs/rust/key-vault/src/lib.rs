//! Remote secret vault client for the credential trust layer.
//!
//! Speaks the Key Vault style REST protocol: an unauthenticated probe yields a
//! bearer challenge naming the token authority, client credentials are
//! exchanged for an access token, and secrets are listed page by page before
//! each value is fetched individually.

pub mod client;
pub mod config;
pub mod error;
pub mod provider;
pub mod secrets;

pub use client::KeyVaultClient;
pub use config::KeyVaultConfig;
pub use error::{VaultError, VaultResult};
pub use provider::SecretVault;
