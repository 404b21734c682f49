//! Secret store: local settings merged with the remote vault.

use super::local::LocalSettings;
use super::snapshot::{ConfigurationSnapshot, SnapshotSource};
use crate::config::{DEFAULT_VAULT_TIMEOUT_SECS, vault};
use crate::metrics;
use key_vault_client::{KeyVaultClient, KeyVaultConfig, SecretVault, VaultError};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument, warn};

enum VaultSource {
    /// Build a key vault client from the `KeyVault.*` local settings.
    FromLocalSettings,
    /// Injected vault implementation.
    Provided(Arc<dyn SecretVault>),
    /// Never contact a vault.
    Disabled,
}

/// Resolves and caches the process configuration snapshot.
///
/// The first [`resolve`](Self::resolve) builds the snapshot; concurrent
/// callers wait on the same build and then share its result. A failed or
/// absent vault degrades to local settings without surfacing an error.
pub struct SecretStore {
    local: LocalSettings,
    vault: VaultSource,
    timeout: Option<Duration>,
    current: RwLock<Option<Arc<ConfigurationSnapshot>>>,
    init: Mutex<()>,
}

impl SecretStore {
    /// Store that reads vault credentials from the local settings.
    #[must_use]
    pub fn new(local: LocalSettings) -> Self {
        Self::with_source(local, VaultSource::FromLocalSettings)
    }

    /// Store using an injected vault.
    #[must_use]
    pub fn with_vault(local: LocalSettings, vault: Arc<dyn SecretVault>) -> Self {
        Self::with_source(local, VaultSource::Provided(vault))
    }

    /// Store that never contacts a vault.
    #[must_use]
    pub fn local_only(local: LocalSettings) -> Self {
        Self::with_source(local, VaultSource::Disabled)
    }

    fn with_source(local: LocalSettings, vault: VaultSource) -> Self {
        Self {
            local,
            vault,
            timeout: None,
            current: RwLock::new(None),
            init: Mutex::new(()),
        }
    }

    /// Override the vault fetch timeout otherwise read from
    /// `KeyVault.TimeoutSeconds`.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Current snapshot, building it on first use.
    #[instrument(skip(self))]
    pub async fn resolve(&self) -> Arc<ConfigurationSnapshot> {
        if let Some(snapshot) = self.current.read().await.as_ref() {
            return Arc::clone(snapshot);
        }

        let _gate = self.init.lock().await;
        if let Some(snapshot) = self.current.read().await.as_ref() {
            return Arc::clone(snapshot);
        }

        let snapshot = Arc::new(self.build().await);
        *self.current.write().await = Some(Arc::clone(&snapshot));
        snapshot
    }

    /// Rebuild the snapshot and swap it in. Holders of the previous snapshot
    /// keep it unchanged.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> Arc<ConfigurationSnapshot> {
        let _gate = self.init.lock().await;
        let snapshot = Arc::new(self.build().await);
        *self.current.write().await = Some(Arc::clone(&snapshot));
        info!("Configuration snapshot refreshed");
        snapshot
    }

    /// Snapshot if already resolved.
    pub async fn cached(&self) -> Option<Arc<ConfigurationSnapshot>> {
        self.current.read().await.clone()
    }

    async fn build(&self) -> ConfigurationSnapshot {
        let mut values = self.local.to_map();

        let Some(vault) = self.vault() else {
            debug!("No key vault configured; using local settings");
            return ConfigurationSnapshot::new(values, SnapshotSource::LocalOnly);
        };

        let timeout = self.fetch_timeout();
        let fetched = match tokio::time::timeout(timeout, vault.fetch_all_secrets()).await {
            Ok(result) => result,
            Err(_) => Err(VaultError::unavailable(format!(
                "timed out after {}s",
                timeout.as_secs_f64()
            ))),
        };

        match fetched {
            Ok(secrets) => {
                let count = secrets.len();
                merge_vault_secrets(&mut values, secrets);
                metrics::record_vault_fetch("success");
                info!(vault_secrets = count, "Merged key vault secrets into configuration");
                ConfigurationSnapshot::new(values, SnapshotSource::Merged { vault_secrets: count })
            }
            Err(e) => {
                metrics::record_vault_fetch("fallback");
                warn!(error = %e, "Key vault unavailable; falling back to local settings");
                ConfigurationSnapshot::new(values, SnapshotSource::LocalOnly)
            }
        }
    }

    fn vault(&self) -> Option<Arc<dyn SecretVault>> {
        match &self.vault {
            VaultSource::Disabled => None,
            VaultSource::Provided(vault) => Some(Arc::clone(vault)),
            VaultSource::FromLocalSettings => {
                let url = self.local.get(vault::URL)?;
                let client_id = self.local.get(vault::CLIENT_ID)?;
                let client_secret = self.local.get(vault::CLIENT_SECRET)?;

                let config = KeyVaultConfig::new(url, client_id, client_secret)
                    .with_timeout(self.fetch_timeout());
                match KeyVaultClient::new(config) {
                    Ok(client) => Some(Arc::new(client)),
                    Err(e) => {
                        metrics::record_vault_fetch("fallback");
                        warn!(error = %e, "Key vault settings unusable; using local settings");
                        None
                    }
                }
            }
        }
    }

    fn fetch_timeout(&self) -> Duration {
        self.timeout.unwrap_or_else(|| {
            let secs = self
                .local
                .get(vault::TIMEOUT_SECONDS)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .filter(|s| *s > 0)
                .unwrap_or(DEFAULT_VAULT_TIMEOUT_SECS);
            Duration::from_secs(secs)
        })
    }
}

impl std::fmt::Debug for SecretStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let vault = match self.vault {
            VaultSource::FromLocalSettings => "from-local-settings",
            VaultSource::Provided(_) => "provided",
            VaultSource::Disabled => "disabled",
        };
        f.debug_struct("SecretStore")
            .field("local", &self.local)
            .field("vault", &vault)
            .finish_non_exhaustive()
    }
}

/// Overlay vault secrets on local values. Vault names use dashes where
/// setting names use dots.
pub fn merge_vault_secrets(values: &mut HashMap<String, String>, secrets: HashMap<String, String>) {
    for (name, value) in secrets {
        values.insert(vault_name_to_key(&name), value);
    }
}

/// Setting name for a vault secret name.
#[must_use]
pub fn vault_name_to_key(name: &str) -> String {
    name.replace('-', ".")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vault_name_to_key() {
        assert_eq!(
            vault_name_to_key("EastFive-Security-Token-Key"),
            "EastFive.Security.Token.Key"
        );
        assert_eq!(vault_name_to_key("Plain"), "Plain");
    }

    #[test]
    fn test_merge_vault_wins() {
        let mut values = HashMap::from([
            ("K".to_string(), "a".to_string()),
            ("Local.Only".to_string(), "l".to_string()),
        ]);
        merge_vault_secrets(
            &mut values,
            HashMap::from([
                ("K".to_string(), "b".to_string()),
                ("Vault-Only".to_string(), "v".to_string()),
            ]),
        );
        assert_eq!(values["K"], "b");
        assert_eq!(values["Local.Only"], "l");
        assert_eq!(values["Vault.Only"], "v");
    }

    #[test]
    fn test_timeout_from_settings() {
        let store = SecretStore::new(LocalSettings::from_map([(vault::TIMEOUT_SECONDS, "5")]));
        assert_eq!(store.fetch_timeout(), Duration::from_secs(5));

        let store = SecretStore::new(LocalSettings::from_map([(vault::TIMEOUT_SECONDS, "x")]));
        assert_eq!(
            store.fetch_timeout(),
            Duration::from_secs(DEFAULT_VAULT_TIMEOUT_SECS)
        );

        let store = SecretStore::new(LocalSettings::default()).with_timeout(Duration::from_millis(10));
        assert_eq!(store.fetch_timeout(), Duration::from_millis(10));
    }

    #[tokio::test]
    async fn test_no_vault_settings_is_local_only() {
        let store = SecretStore::new(LocalSettings::from_map([
            ("KeyVault.Url", "https://vault.example.test"),
            ("K", "a"),
        ]));
        let snapshot = store.resolve().await;
        assert_eq!(snapshot.source(), SnapshotSource::LocalOnly);
        assert_eq!(snapshot.get("K"), Some("a"));
    }

    #[tokio::test]
    async fn test_resolve_is_cached() {
        let store = SecretStore::local_only(LocalSettings::from_map([("K", "a")]));
        assert!(store.cached().await.is_none());
        let first = store.resolve().await;
        let second = store.resolve().await;
        assert!(Arc::ptr_eq(&first, &second));

        let refreshed = store.refresh().await;
        assert!(!Arc::ptr_eq(&first, &refreshed));
        assert_eq!(refreshed.get("K"), Some("a"));
    }
}
