//! Token issuance.

use super::{ClaimSet, configured_algorithm, encode_segment};
use crate::config::{SigningAlgorithm, token};
use crate::error::{CredentialError, CredentialResult};
use crate::keys::{KeyMaterial, KeyMaterialProvider, SigningKey};
use crate::metrics;
use crate::settings::ConfigurationSnapshot;
use chrono::{DateTime, Duration, Utc};
use serde_json::{Map, Value, json};
use std::sync::Arc;
use tracing::{debug, instrument};
use url::Url;

/// Issues signed tokens with the configured key and issuer.
#[derive(Debug, Clone)]
pub struct TokenIssuer {
    keys: KeyMaterialProvider,
    key_setting: String,
    issuer_setting: String,
}

impl TokenIssuer {
    /// Issuer reading `EastFive.Security.Token.Key` and
    /// `EastFive.Security.Token.Issuer`.
    #[must_use]
    pub fn new(settings: Arc<ConfigurationSnapshot>) -> Self {
        Self {
            keys: KeyMaterialProvider::new(settings),
            key_setting: token::KEY.to_string(),
            issuer_setting: token::ISSUER.to_string(),
        }
    }

    /// Read the signing key from another setting.
    #[must_use]
    pub fn with_key_setting(mut self, key: impl Into<String>) -> Self {
        self.key_setting = key.into();
        self
    }

    /// Read the issuer from another setting.
    #[must_use]
    pub fn with_issuer_setting(mut self, key: impl Into<String>) -> Self {
        self.issuer_setting = key.into();
        self
    }

    /// Audience configured under `EastFive.Security.Token.Scope`.
    ///
    /// # Errors
    ///
    /// `ConfigMissing` or `ConfigInvalid` for the scope setting.
    pub fn default_scope(&self) -> CredentialResult<Url> {
        self.keys.settings().url(token::SCOPE)
    }

    /// Issue a token for `scope` valid from `issued_at` for `duration`.
    ///
    /// # Errors
    ///
    /// Configuration errors for the key, issuer or algorithm settings, and
    /// `TokenInvalid` when a claim uses a registered member name.
    pub fn issue(
        &self,
        scope: &Url,
        issued_at: DateTime<Utc>,
        duration: Duration,
        claims: &ClaimSet,
    ) -> CredentialResult<String> {
        self.issue_with_headers(scope, issued_at, duration, claims, &Map::new())
    }

    /// As [`issue`](Self::issue), merging `headers` into the JOSE header.
    /// `alg` always reflects the signing key.
    ///
    /// # Errors
    ///
    /// As [`issue`](Self::issue).
    #[instrument(skip(self, scope, claims, headers), fields(scope = %scope, claims = claims.len()))]
    pub fn issue_with_headers(
        &self,
        scope: &Url,
        issued_at: DateTime<Utc>,
        duration: Duration,
        claims: &ClaimSet,
        headers: &Map<String, Value>,
    ) -> CredentialResult<String> {
        let settings = self.keys.settings();
        let issuer = settings.string(&self.issuer_setting)?;
        let algorithm = configured_algorithm(settings)?;
        let key = self.keys.signing_key(&self.key_setting, algorithm)?;

        sign_token(
            &key,
            &self.key_setting,
            issuer,
            scope,
            issued_at,
            duration,
            claims,
            headers,
        )
    }

    /// Issue an `RS256` token with an inline base64 RSA secret and explicit
    /// issuer, bypassing configuration.
    ///
    /// # Errors
    ///
    /// `ConfigInvalid` when the secret is not a private RSA key.
    pub fn issue_with_rsa_secret(
        secret_base64: &str,
        issuer: &str,
        scope: &Url,
        issued_at: DateTime<Utc>,
        duration: Duration,
        claims: &ClaimSet,
    ) -> CredentialResult<String> {
        const LABEL: &str = "inline RSA secret";
        if issuer.trim().is_empty() {
            return Err(CredentialError::missing("issuer"));
        }
        let rsa = KeyMaterialProvider::inline_rsa(LABEL, secret_base64)?;
        let key = SigningKey::new(LABEL, SigningAlgorithm::RS256, KeyMaterial::Rsa(rsa))?;
        sign_token(
            &key,
            LABEL,
            issuer,
            scope,
            issued_at,
            duration,
            claims,
            &Map::new(),
        )
    }
}

#[allow(clippy::too_many_arguments)]
fn sign_token(
    key: &SigningKey,
    key_label: &str,
    issuer: &str,
    scope: &Url,
    issued_at: DateTime<Utc>,
    duration: Duration,
    claims: &ClaimSet,
    extra_headers: &Map<String, Value>,
) -> CredentialResult<String> {
    let algorithm = key.algorithm();
    let issued = issued_at.timestamp();
    let expires = (issued_at + duration).timestamp();

    let mut header = Map::new();
    header.insert("alg".to_string(), json!(algorithm.as_str()));
    header.insert("typ".to_string(), json!("JWT"));
    for (name, value) in extra_headers {
        if name != "alg" {
            header.insert(name.clone(), value.clone());
        }
    }

    let mut payload = Map::new();
    payload.insert("iss".to_string(), json!(issuer));
    payload.insert("aud".to_string(), json!(scope.as_str()));
    payload.insert("iat".to_string(), json!(issued));
    payload.insert("nbf".to_string(), json!(issued));
    payload.insert("exp".to_string(), json!(expires));
    payload.extend(claims.to_payload()?);

    let message = format!("{}.{}", encode_segment(&header)?, encode_segment(&payload)?);
    let encoding_key = key.encoding_key(key_label)?;
    let signature = jsonwebtoken::crypto::sign(message.as_bytes(), &encoding_key, algorithm.to_jwt())
        .map_err(|e| CredentialError::invalid_config(key_label, format!("signing failed: {e}")))?;

    metrics::record_token_issued(algorithm.as_str());
    debug!(%algorithm, exp = expires, "Issued token");
    Ok(format!("{message}.{signature}"))
}
