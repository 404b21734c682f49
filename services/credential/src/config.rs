//! Well-known setting names and the signing algorithm type.
//!
//! Names must match existing deployments exactly.

use crate::error::{CredentialError, CredentialResult};
use std::fmt;
use std::str::FromStr;

/// Remote vault settings.
pub mod vault {
    /// Vault base URL.
    pub const URL: &str = "KeyVault.Url";
    /// Client id for the client-credentials grant.
    pub const CLIENT_ID: &str = "KeyVault.ClientId";
    /// Client secret for the client-credentials grant.
    pub const CLIENT_SECRET: &str = "KeyVault.ClientSecret";
    /// Network timeout for the whole vault fetch, in seconds.
    pub const TIMEOUT_SECONDS: &str = "KeyVault.TimeoutSeconds";
}

/// Signed token settings.
pub mod token {
    /// Default audience URI for issued tokens.
    pub const SCOPE: &str = "EastFive.Security.Token.Scope";
    /// Trusted issuer.
    pub const ISSUER: &str = "EastFive.Security.Token.Issuer";
    /// Base64 signing key.
    pub const KEY: &str = "EastFive.Security.Token.Key";
    /// Signing algorithm name.
    pub const ALGORITHM: &str = "EastFive.Security.Token.Algorithm";
    /// Debug flag that accepts every token without verification.
    pub const ALL_VALID: &str = "EastFive.Security.Token.AllValid";
    /// Tokens issued before this instant are refused.
    pub const FORCE_REFRESH_TIME: &str = "EastFive.Web.TokenForceRefreshTime";
    /// Rejection message for the forced-refresh cutoff.
    pub const FORCE_REFRESH_MESSAGE: &str = "EastFive.Web.TokenForceRefreshMessage";
}

/// Voucher settings.
pub mod voucher {
    /// Base64 RSA key used to sign vouchers.
    pub const KEY: &str = "EastFive.Security.CredentialProvider.Voucher.Key";
    /// Provider id registered for voucher credentials.
    pub const PROVIDER: &str = "EastFive.Security.CredentialProvider.Voucher.Provider";
}

/// Message used when the forced-refresh message setting is absent.
pub const DEFAULT_FORCE_REFRESH_MESSAGE: &str = "Please sign in again.";

/// Default vault fetch timeout in seconds.
pub const DEFAULT_VAULT_TIMEOUT_SECS: u64 = 30;

/// Default clock skew tolerated on `exp` and `nbf`, in seconds.
pub const DEFAULT_LEEWAY_SECS: i64 = 300;

/// Key family implied by a signing algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyFamily {
    /// RSA
    Rsa,
    /// Elliptic curve
    Ecdsa,
    /// Symmetric AES
    Aes,
}

impl fmt::Display for KeyFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Rsa => "RSA",
            Self::Ecdsa => "ECDSA",
            Self::Aes => "AES",
        })
    }
}

/// JWT signing algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SigningAlgorithm {
    /// RSA PKCS#1 v1.5 with SHA-256
    #[default]
    RS256,
    /// RSA PKCS#1 v1.5 with SHA-384
    RS384,
    /// RSA PKCS#1 v1.5 with SHA-512
    RS512,
    /// ECDSA with P-256 and SHA-256
    ES256,
    /// ECDSA with P-384 and SHA-384
    ES384,
}

impl SigningAlgorithm {
    /// Algorithm name for the JWT header.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::RS256 => "RS256",
            Self::RS384 => "RS384",
            Self::RS512 => "RS512",
            Self::ES256 => "ES256",
            Self::ES384 => "ES384",
        }
    }

    /// Key family the algorithm signs with.
    #[must_use]
    pub const fn family(&self) -> KeyFamily {
        match self {
            Self::RS256 | Self::RS384 | Self::RS512 => KeyFamily::Rsa,
            Self::ES256 | Self::ES384 => KeyFamily::Ecdsa,
        }
    }

    /// Matching `jsonwebtoken` algorithm.
    #[must_use]
    pub const fn to_jwt(self) -> jsonwebtoken::Algorithm {
        match self {
            Self::RS256 => jsonwebtoken::Algorithm::RS256,
            Self::RS384 => jsonwebtoken::Algorithm::RS384,
            Self::RS512 => jsonwebtoken::Algorithm::RS512,
            Self::ES256 => jsonwebtoken::Algorithm::ES256,
            Self::ES384 => jsonwebtoken::Algorithm::ES384,
        }
    }
}

impl FromStr for SigningAlgorithm {
    type Err = CredentialError;

    fn from_str(s: &str) -> CredentialResult<Self> {
        match s.trim().to_uppercase().as_str() {
            "RS256" => Ok(Self::RS256),
            "RS384" => Ok(Self::RS384),
            "RS512" => Ok(Self::RS512),
            "ES256" => Ok(Self::ES256),
            "ES384" => Ok(Self::ES384),
            _ => Err(CredentialError::invalid_config(
                token::ALGORITHM,
                format!("unsupported signing algorithm '{s}'"),
            )),
        }
    }
}

impl fmt::Display for SigningAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
