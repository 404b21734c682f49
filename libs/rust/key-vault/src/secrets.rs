//! Wire types for the key vault REST protocol.

use crate::error::{VaultError, VaultResult};
use serde::{Deserialize, Deserializer};
use std::time::Duration;

/// One page of the secret listing.
#[derive(Debug, Deserialize)]
pub struct SecretListPage {
    /// Secret items on this page
    #[serde(default)]
    pub value: Vec<SecretItem>,
    /// Absolute URL of the next page, absent or null on the last page
    #[serde(rename = "nextLink", default)]
    pub next_link: Option<String>,
}

/// Listing entry. Only the identifier is used.
#[derive(Debug, Deserialize)]
pub struct SecretItem {
    /// Secret identifier URL, e.g. `https://v.vault.azure.net/secrets/Token-Key`
    pub id: String,
}

impl SecretItem {
    /// Secret name: the final path segment of the identifier.
    #[must_use]
    pub fn name(&self) -> &str {
        self.id
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or(self.id.as_str())
    }
}

/// Single secret response. A missing value is read as empty.
#[derive(Debug, Deserialize)]
pub struct SecretBundle {
    /// Secret value
    #[serde(default)]
    pub value: Option<String>,
}

/// OAuth2 token endpoint response.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    /// Bearer access token
    pub access_token: String,
    /// Lifetime in seconds. Some authorities send it as a string.
    #[serde(default, deserialize_with = "seconds_from_number_or_string")]
    pub expires_in: Option<u64>,
}

impl TokenResponse {
    /// Token lifetime, one hour when the authority omits it.
    #[must_use]
    pub fn lifetime(&self) -> Duration {
        Duration::from_secs(self.expires_in.unwrap_or(3600))
    }
}

fn seconds_from_number_or_string<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Seconds {
        Number(u64),
        Text(String),
    }

    match Option::<Seconds>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Seconds::Number(n)) => Ok(Some(n)),
        Some(Seconds::Text(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

/// Bearer challenge returned by the vault on an unauthenticated request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthChallenge {
    /// Token authority, e.g. `https://login.microsoftonline.com/{tenant}`
    pub authority: String,
    /// Resource the token must be issued for
    pub resource: String,
}

impl AuthChallenge {
    /// Parse a `WWW-Authenticate: Bearer key="value", ...` header.
    ///
    /// `authorization` (or `authorization_uri`) names the authority. `resource`
    /// names the audience; a `scope` parameter is accepted in its place with
    /// any `/.default` suffix removed.
    pub fn parse(header: &str) -> VaultResult<Self> {
        let header = header.trim();
        let params = header
            .strip_prefix("Bearer")
            .or_else(|| header.strip_prefix("bearer"))
            .ok_or_else(|| VaultError::invalid_challenge("not a bearer challenge"))?;

        let mut authority = None;
        let mut resource = None;
        let mut scope = None;

        for part in params.split(',') {
            let Some((key, value)) = part.split_once('=') else {
                continue;
            };
            let value = value.trim().trim_matches('"').to_string();
            match key.trim().to_ascii_lowercase().as_str() {
                "authorization" | "authorization_uri" => authority = Some(value),
                "resource" => resource = Some(value),
                "scope" => scope = Some(value),
                _ => {}
            }
        }

        let authority = authority
            .filter(|a| !a.is_empty())
            .ok_or_else(|| VaultError::invalid_challenge("missing authorization"))?;
        let resource = resource
            .or_else(|| scope.map(|s| s.trim_end_matches("/.default").to_string()))
            .filter(|r| !r.is_empty())
            .ok_or_else(|| VaultError::invalid_challenge("missing resource"))?;

        Ok(Self {
            authority: authority.trim_end_matches('/').to_string(),
            resource,
        })
    }

    /// Token endpoint of the authority.
    #[must_use]
    pub fn token_url(&self) -> String {
        format!("{}/oauth2/token", self.authority)
    }
}
