//! Key vault HTTP client with challenge authentication and token caching.

use crate::{
    config::KeyVaultConfig,
    error::{VaultError, VaultResult},
    provider::SecretVault,
    secrets::{AuthChallenge, SecretBundle, SecretListPage, TokenResponse},
};
use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt, stream};
use reqwest::{Client, Response, StatusCode, header::WWW_AUTHENTICATE};
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use std::{
    collections::HashMap,
    time::{Duration, Instant},
};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Tokens are renewed this long before the authority says they expire.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

struct CachedToken {
    access_token: String,
    renew_at: Instant,
}

/// Key vault client with cached bearer token.
pub struct KeyVaultClient {
    config: KeyVaultConfig,
    http: Client,
    token: RwLock<Option<CachedToken>>,
}

impl KeyVaultClient {
    /// Create a new key vault client.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::InvalidConfig`] when the vault URL does not parse
    /// or a credential is blank.
    pub fn new(config: KeyVaultConfig) -> VaultResult<Self> {
        Url::parse(&config.vault_url)
            .map_err(|e| VaultError::InvalidConfig(format!("vault url: {e}")))?;
        if config.client_id.trim().is_empty() {
            return Err(VaultError::InvalidConfig("client id is empty".to_string()));
        }
        if config.client_secret.expose_secret().trim().is_empty() {
            return Err(VaultError::InvalidConfig(
                "client secret is empty".to_string(),
            ));
        }

        let http = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(VaultError::Http)?;

        Ok(Self {
            config,
            http,
            token: RwLock::new(None),
        })
    }

    /// Client configuration.
    #[must_use]
    pub const fn config(&self) -> &KeyVaultConfig {
        &self.config
    }

    /// Probe the vault without credentials and read the bearer challenge.
    #[instrument(skip(self), fields(vault = %self.config.vault_url))]
    pub async fn discover_challenge(&self) -> VaultResult<AuthChallenge> {
        let response = self
            .http
            .get(self.config.secrets_url())
            .send()
            .await
            .map_err(|e| VaultError::unavailable(e.to_string()))?;

        if response.status() != StatusCode::UNAUTHORIZED {
            return Err(VaultError::invalid_challenge(format!(
                "expected 401 from unauthenticated probe, got {}",
                response.status()
            )));
        }

        let header = response
            .headers()
            .get(WWW_AUTHENTICATE)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| VaultError::invalid_challenge("missing WWW-Authenticate header"))?;

        AuthChallenge::parse(header)
    }

    /// Exchange the client credentials for an access token.
    #[instrument(skip(self, challenge), fields(authority = %challenge.authority))]
    pub async fn authenticate(&self, challenge: &AuthChallenge) -> VaultResult<String> {
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.expose_secret()),
            ("resource", challenge.resource.as_str()),
        ];

        let response = self
            .http
            .post(challenge.token_url())
            .form(&form)
            .send()
            .await
            .map_err(|e| VaultError::unavailable(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(VaultError::auth_failed(format!("Status {status}: {text}")));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| VaultError::malformed(format!("token response: {e}")))?;
        let lifetime = token.lifetime();
        let renew_at = Instant::now() + lifetime.saturating_sub(TOKEN_EXPIRY_MARGIN);

        *self.token.write().await = Some(CachedToken {
            access_token: token.access_token.clone(),
            renew_at,
        });

        info!(ttl_secs = lifetime.as_secs(), "Authenticated with key vault");
        Ok(token.access_token)
    }

    async fn get_token(&self) -> VaultResult<String> {
        {
            let cached = self.token.read().await;
            if let Some(token) = cached.as_ref().filter(|t| Instant::now() < t.renew_at) {
                return Ok(token.access_token.clone());
            }
        }

        let challenge = self.discover_challenge().await?;
        self.authenticate(&challenge).await
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, token: &str) -> VaultResult<T> {
        let response = self
            .http
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| VaultError::unavailable(e.to_string()))?;

        Self::check_status(response, url)
            .await?
            .json()
            .await
            .map_err(|e| VaultError::malformed(format!("{url}: {e}")))
    }

    async fn check_status(response: Response, url: &str) -> VaultResult<Response> {
        let status = response.status();
        match status.as_u16() {
            401 => Err(VaultError::auth_failed(format!("token rejected for {url}"))),
            403 => Err(VaultError::PermissionDenied(url.to_string())),
            404 => Err(VaultError::not_found(url)),
            429 => Err(VaultError::RateLimited),
            _ if !status.is_success() => {
                let text = response.text().await.unwrap_or_default();
                Err(VaultError::unavailable(format!("Status {status}: {text}")))
            }
            _ => Ok(response),
        }
    }

    /// List every secret name, following `nextLink` until the last page.
    #[instrument(skip(self))]
    pub async fn list_secret_names(&self) -> VaultResult<Vec<String>> {
        let token = self.get_token().await?;
        let mut names = Vec::new();
        let mut next = Some(self.config.secrets_url());
        let mut pages = 0usize;

        while let Some(url) = next.take() {
            let page: SecretListPage = self.get_json(&url, &token).await?;
            pages += 1;
            names.extend(page.value.iter().map(|item| item.name().to_string()));
            next = page.next_link.filter(|link| !link.is_empty());
        }

        debug!(pages, count = names.len(), "Listed key vault secrets");
        Ok(names)
    }

    /// Fetch one secret value. A secret without a value reads as empty.
    #[instrument(skip(self))]
    pub async fn get_secret(&self, name: &str) -> VaultResult<String> {
        let token = self.get_token().await?;
        self.get_secret_with(name, &token).await
    }

    async fn get_secret_with(&self, name: &str, token: &str) -> VaultResult<String> {
        let bundle: SecretBundle = self
            .get_json(&self.config.secret_url(name), token)
            .await
            .map_err(|e| match e {
                VaultError::SecretNotFound(_) => VaultError::not_found(name),
                other => other,
            })?;
        Ok(bundle.value.unwrap_or_default())
    }
}

#[async_trait]
impl SecretVault for KeyVaultClient {
    #[instrument(skip(self), fields(vault = %self.config.vault_url))]
    async fn fetch_all_secrets(&self) -> VaultResult<HashMap<String, String>> {
        let names = self.list_secret_names().await?;
        let token = self.get_token().await?;

        let secrets: HashMap<String, String> = stream::iter(names)
            .map(|name| {
                let token = token.as_str();
                async move {
                    let value = self.get_secret_with(&name, token).await.inspect_err(|e| {
                        warn!(secret = %name, error = %e, "Failed to fetch secret value");
                    })?;
                    Ok::<_, VaultError>((name, value))
                }
            })
            .buffer_unordered(self.config.max_concurrent_fetches)
            .try_collect()
            .await?;

        info!(count = secrets.len(), "Fetched key vault secrets");
        Ok(secrets)
    }
}
