//! Key vault client configuration.

use secrecy::SecretString;
use std::time::Duration;

/// Default REST API version sent with every vault request.
pub const DEFAULT_API_VERSION: &str = "7.4";

/// Key vault client configuration.
#[derive(Debug, Clone)]
pub struct KeyVaultConfig {
    /// Vault base URL, e.g. `https://my-vault.vault.azure.net`
    pub vault_url: String,
    /// Client (application) id used for the client-credentials grant
    pub client_id: String,
    /// Client secret used for the client-credentials grant
    pub client_secret: SecretString,
    /// REST API version query parameter
    pub api_version: String,
    /// Per-request timeout
    pub timeout: Duration,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Maximum secret values fetched concurrently
    pub max_concurrent_fetches: usize,
    /// User agent string
    pub user_agent: String,
}

impl KeyVaultConfig {
    /// Create a new configuration from the three credentials every vault needs.
    #[must_use]
    pub fn new(
        vault_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        let vault_url: String = vault_url.into();
        Self {
            vault_url: vault_url.trim_end_matches('/').to_string(),
            client_id: client_id.into(),
            client_secret: SecretString::from(client_secret.into()),
            api_version: DEFAULT_API_VERSION.to_string(),
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            max_concurrent_fetches: 8,
            user_agent: "credential-trust/1.0".to_string(),
        }
    }

    /// Set request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the REST API version.
    #[must_use]
    pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = api_version.into();
        self
    }

    /// Set the number of secret values fetched concurrently (at least one).
    #[must_use]
    pub fn with_max_concurrent_fetches(mut self, max: usize) -> Self {
        self.max_concurrent_fetches = max.max(1);
        self
    }

    /// URL of the secret listing endpoint.
    #[must_use]
    pub fn secrets_url(&self) -> String {
        format!("{}/secrets?api-version={}", self.vault_url, self.api_version)
    }

    /// URL of a single secret.
    #[must_use]
    pub fn secret_url(&self, name: &str) -> String {
        format!(
            "{}/secrets/{}?api-version={}",
            self.vault_url, name, self.api_version
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn test_new_trims_trailing_slash() {
        let config = KeyVaultConfig::new("https://vault.example.test/", "client", "secret");
        assert_eq!(config.vault_url, "https://vault.example.test");
        assert_eq!(config.client_secret.expose_secret(), "secret");
        assert_eq!(config.api_version, DEFAULT_API_VERSION);
    }

    #[test]
    fn test_urls() {
        let config = KeyVaultConfig::new("https://vault.example.test", "client", "secret")
            .with_api_version("2016-10-01");
        assert_eq!(
            config.secrets_url(),
            "https://vault.example.test/secrets?api-version=2016-10-01"
        );
        assert_eq!(
            config.secret_url("Token-Key"),
            "https://vault.example.test/secrets/Token-Key?api-version=2016-10-01"
        );
    }

    #[test]
    fn test_concurrency_floor() {
        let config =
            KeyVaultConfig::new("https://v", "c", "s").with_max_concurrent_fetches(0);
        assert_eq!(config.max_concurrent_fetches, 1);
    }

    #[test]
    fn test_debug_redacts_secret() {
        let config = KeyVaultConfig::new("https://v", "client", "super-secret-value");
        let debug = format!("{config:?}");
        assert!(!debug.contains("super-secret-value"));
    }
}
