//! Credential error types.
//!
//! Configuration faults and token rejections are distinct variants so callers
//! can map the former to server misconfiguration and the latter to
//! unauthorized responses.

use thiserror::Error;

/// Errors raised by key resolution, token issuance and token validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CredentialError {
    /// A required configuration key has no value.
    #[error("Configuration key '{key}' is missing")]
    ConfigMissing {
        /// Setting name
        key: String,
    },

    /// A configuration value is present but cannot be used.
    #[error("Configuration key '{key}' is invalid: {reason}")]
    ConfigInvalid {
        /// Setting name
        key: String,
        /// Diagnostic
        reason: String,
    },

    /// Structural, issuer or algorithm fault in a presented token.
    #[error("Invalid token: {0}")]
    TokenInvalid(String),

    /// The presented token is past its expiry.
    #[error("Token expired: {0}")]
    TokenExpired(String),

    /// The signature is well formed but does not verify.
    #[error("Invalid signature: {0}")]
    SignatureInvalid(String),

    /// Local cipher or key generation failure.
    #[error("Cryptographic error: {0}")]
    Crypto(String),
}

/// Result alias used throughout the crate.
pub type CredentialResult<T> = Result<T, CredentialError>;

impl CredentialError {
    /// Missing configuration key.
    #[must_use]
    pub fn missing(key: impl Into<String>) -> Self {
        Self::ConfigMissing { key: key.into() }
    }

    /// Unusable configuration value.
    #[must_use]
    pub fn invalid_config(key: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::ConfigInvalid {
            key: key.into(),
            reason: reason.to_string(),
        }
    }

    /// Invalid token.
    #[must_use]
    pub fn invalid_token(reason: impl Into<String>) -> Self {
        Self::TokenInvalid(reason.into())
    }

    /// Expired token.
    #[must_use]
    pub fn expired(reason: impl Into<String>) -> Self {
        Self::TokenExpired(reason.into())
    }

    /// Signature mismatch.
    #[must_use]
    pub fn bad_signature(reason: impl Into<String>) -> Self {
        Self::SignatureInvalid(reason.into())
    }

    /// Cipher failure.
    #[must_use]
    pub fn crypto(reason: impl std::fmt::Display) -> Self {
        Self::Crypto(reason.to_string())
    }

    /// Stable label for logs and metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::ConfigMissing { .. } => "config_missing",
            Self::ConfigInvalid { .. } => "config_invalid",
            Self::TokenInvalid(_) => "token_invalid",
            Self::TokenExpired(_) => "token_expired",
            Self::SignatureInvalid(_) => "signature_invalid",
            Self::Crypto(_) => "crypto",
        }
    }

    /// True for server-side misconfiguration.
    #[must_use]
    pub const fn is_configuration_error(&self) -> bool {
        matches!(self, Self::ConfigMissing { .. } | Self::ConfigInvalid { .. })
    }

    /// True when a presented credential was refused.
    #[must_use]
    pub const fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::TokenInvalid(_) | Self::TokenExpired(_) | Self::SignatureInvalid(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_carries_key() {
        let err = CredentialError::missing("EastFive.Security.Token.Key");
        assert_eq!(
            err.to_string(),
            "Configuration key 'EastFive.Security.Token.Key' is missing"
        );

        let err = CredentialError::invalid_config("KeyVault.Url", "relative URL without a base");
        assert!(err.to_string().contains("relative URL without a base"));
    }

    #[test]
    fn test_classification() {
        assert!(CredentialError::missing("k").is_configuration_error());
        assert!(CredentialError::invalid_config("k", "r").is_configuration_error());
        assert!(!CredentialError::missing("k").is_rejection());

        for err in [
            CredentialError::invalid_token("x"),
            CredentialError::expired("x"),
            CredentialError::bad_signature("x"),
        ] {
            assert!(err.is_rejection());
            assert!(!err.is_configuration_error());
        }

        let crypto = CredentialError::crypto("bad padding");
        assert!(!crypto.is_rejection());
        assert!(!crypto.is_configuration_error());
    }

    #[test]
    fn test_kind_labels_unique() {
        let kinds = [
            CredentialError::missing("k").kind(),
            CredentialError::invalid_config("k", "r").kind(),
            CredentialError::invalid_token("x").kind(),
            CredentialError::expired("x").kind(),
            CredentialError::bad_signature("x").kind(),
            CredentialError::crypto("x").kind(),
        ];
        let unique: std::collections::HashSet<_> = kinds.iter().collect();
        assert_eq!(unique.len(), kinds.len());
    }
}
