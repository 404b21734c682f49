//! Token validation.
//!
//! Order of checks: algorithm, key and issuer configuration; the all-valid
//! debug flag; header algorithm; signature and issuer; expiry and not-before
//! against the injected clock; the forced-refresh cutoff.

use super::{ClaimSet, configured_algorithm, decode_unverified, numeric_date};
use crate::clock::{SystemTimeService, TimeService};
use crate::config::{DEFAULT_FORCE_REFRESH_MESSAGE, DEFAULT_LEEWAY_SECS, SigningAlgorithm, token};
use crate::error::{CredentialError, CredentialResult};
use crate::keys::KeyMaterialProvider;
use crate::metrics;
use crate::settings::ConfigurationSnapshot;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Validation, decode, decode_header};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Claims and registered members of an accepted token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedToken {
    /// `iss`
    pub issuer: String,
    /// `aud`, when a single string
    pub audience: Option<String>,
    /// `iat`, falling back to `nbf`
    pub issued_at: Option<DateTime<Utc>>,
    /// `exp`
    pub expires_at: Option<DateTime<Utc>>,
    /// Every non-registered claim
    pub claims: ClaimSet,
    /// False only when the all-valid flag skipped verification
    pub verified: bool,
}

/// Validates signed tokens against the configured key and issuer.
#[derive(Clone)]
pub struct TokenValidator {
    keys: KeyMaterialProvider,
    clock: Arc<dyn TimeService>,
    leeway: Duration,
    key_setting: String,
    issuer_setting: String,
}

impl TokenValidator {
    /// Validator using the system clock and default leeway.
    #[must_use]
    pub fn new(settings: Arc<ConfigurationSnapshot>) -> Self {
        Self {
            keys: KeyMaterialProvider::new(settings),
            clock: Arc::new(SystemTimeService),
            leeway: Duration::seconds(DEFAULT_LEEWAY_SECS),
            key_setting: token::KEY.to_string(),
            issuer_setting: token::ISSUER.to_string(),
        }
    }

    /// Use `clock` for expiry checks.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn TimeService>) -> Self {
        self.clock = clock;
        self
    }

    /// Tolerated skew on `exp` and `nbf`.
    #[must_use]
    pub fn with_leeway(mut self, leeway: Duration) -> Self {
        self.leeway = leeway;
        self
    }

    /// Read the verification key from another setting.
    #[must_use]
    pub fn with_key_setting(mut self, key: impl Into<String>) -> Self {
        self.key_setting = key.into();
        self
    }

    /// Read the trusted issuer from another setting.
    #[must_use]
    pub fn with_issuer_setting(mut self, key: impl Into<String>) -> Self {
        self.issuer_setting = key.into();
        self
    }

    /// Validate a compact token.
    ///
    /// # Errors
    ///
    /// Configuration errors for the key, issuer, algorithm, debug flag or
    /// cutoff settings; `SignatureInvalid`, `TokenExpired` or `TokenInvalid`
    /// for a refused token.
    #[instrument(skip_all)]
    pub fn validate(&self, token: &str) -> CredentialResult<ValidatedToken> {
        let result = self.validate_inner(token);
        let outcome = match &result {
            Ok(t) if t.verified => "valid",
            Ok(_) => "unverified",
            Err(e) => e.kind(),
        };
        metrics::record_token_validation(outcome);
        if let Err(e) = &result {
            debug!(kind = e.kind(), error = %e, "Token rejected");
        }
        result
    }

    fn validate_inner(&self, token: &str) -> CredentialResult<ValidatedToken> {
        let settings = self.keys.settings();
        let algorithm = configured_algorithm(settings)?;
        let key = self.keys.signing_key(&self.key_setting, algorithm)?;
        let issuer = settings.string(&self.issuer_setting)?;

        if settings.boolean(token::ALL_VALID)?.unwrap_or(false) {
            warn!(
                setting = token::ALL_VALID,
                "Token verification is disabled; accepting token without checks"
            );
            let (_, payload) = decode_unverified(token)?;
            return Ok(validated(&payload, false));
        }

        let header = decode_header(token).map_err(map_jwt_error)?;
        if header.alg != algorithm.to_jwt() {
            return Err(CredentialError::invalid_token(format!(
                "token algorithm {:?} does not match configured {algorithm}",
                header.alg
            )));
        }

        let decoding_key = key.decoding_key(&self.key_setting)?;
        let data = decode::<Map<String, Value>>(token, &decoding_key, &validation(algorithm, issuer))
            .map_err(map_jwt_error)?;
        let payload = data.claims;

        self.check_lifetime(&payload)?;
        self.check_forced_refresh(settings, &payload)?;

        Ok(validated(&payload, true))
    }

    fn check_lifetime(&self, payload: &Map<String, Value>) -> CredentialResult<()> {
        let now = self.clock.utc_now().timestamp();
        let leeway = self.leeway.num_seconds();

        let exp = numeric_date(payload, "exp")
            .ok_or_else(|| CredentialError::invalid_token("exp claim missing or not a number"))?;
        if now > exp.saturating_add(leeway) {
            return Err(CredentialError::expired(format!(
                "token expired at {exp}, now {now}"
            )));
        }
        if let Some(nbf) = numeric_date(payload, "nbf") {
            if now.saturating_add(leeway) < nbf {
                return Err(CredentialError::invalid_token(format!(
                    "token not valid before {nbf}, now {now}"
                )));
            }
        }
        Ok(())
    }

    fn check_forced_refresh(
        &self,
        settings: &ConfigurationSnapshot,
        payload: &Map<String, Value>,
    ) -> CredentialResult<()> {
        let Some(cutoff) = settings.datetime(token::FORCE_REFRESH_TIME)? else {
            return Ok(());
        };
        let message = settings
            .get(token::FORCE_REFRESH_MESSAGE)
            .unwrap_or(DEFAULT_FORCE_REFRESH_MESSAGE);

        // iat carries whole seconds only
        let cutoff = DateTime::from_timestamp(cutoff.timestamp(), 0).unwrap_or(cutoff);
        let issued = issued_at(payload);
        match issued {
            Some(issued) if issued >= cutoff => Ok(()),
            _ => {
                debug!(%cutoff, issued = ?issued, "Token predates forced refresh cutoff");
                Err(CredentialError::invalid_token(message))
            }
        }
    }
}

impl std::fmt::Debug for TokenValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenValidator")
            .field("leeway", &self.leeway)
            .field("key_setting", &self.key_setting)
            .field("issuer_setting", &self.issuer_setting)
            .finish_non_exhaustive()
    }
}

fn validation(algorithm: SigningAlgorithm, issuer: &str) -> Validation {
    let mut validation = Validation::new(algorithm.to_jwt());
    validation.set_issuer(&[issuer]);
    validation.validate_aud = false;
    // lifetime is checked against the injected clock instead
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.required_spec_claims = HashSet::from(["exp".to_string()]);
    validation
}

fn map_jwt_error(err: jsonwebtoken::errors::Error) -> CredentialError {
    match err.kind() {
        ErrorKind::InvalidSignature => CredentialError::bad_signature(err.to_string()),
        ErrorKind::ExpiredSignature => CredentialError::expired(err.to_string()),
        _ => CredentialError::invalid_token(err.to_string()),
    }
}

fn issued_at(payload: &Map<String, Value>) -> Option<DateTime<Utc>> {
    numeric_date(payload, "iat")
        .or_else(|| numeric_date(payload, "nbf"))
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
}

fn validated(payload: &Map<String, Value>, verified: bool) -> ValidatedToken {
    ValidatedToken {
        issuer: payload
            .get("iss")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        audience: payload.get("aud").and_then(Value::as_str).map(str::to_string),
        issued_at: issued_at(payload),
        expires_at: numeric_date(payload, "exp").and_then(|s| DateTime::from_timestamp(s, 0)),
        claims: ClaimSet::from_payload(payload),
        verified,
    }
}
