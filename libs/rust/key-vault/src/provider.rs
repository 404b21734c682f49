//! Secret source abstraction.

use crate::error::VaultResult;
use async_trait::async_trait;
use std::collections::HashMap;

/// A remote source of named secrets.
///
/// Names are returned exactly as the vault stores them. Callers map them onto
/// their own key namespace.
#[async_trait]
pub trait SecretVault: Send + Sync {
    /// Fetch every secret the caller is permitted to read, keyed by name.
    async fn fetch_all_secrets(&self) -> VaultResult<HashMap<String, String>>;
}
