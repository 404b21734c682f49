//! Signed tokens in JWS compact form.

pub mod claims;
pub mod issuer;
pub mod validator;

pub use claims::{Claim, ClaimSet, REGISTERED_CLAIMS, claim_ids};
pub use issuer::TokenIssuer;
pub use validator::{TokenValidator, ValidatedToken};

use crate::config::{SigningAlgorithm, token};
use crate::error::{CredentialError, CredentialResult};
use crate::settings::ConfigurationSnapshot;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde_json::{Map, Value};

/// Configured signing algorithm, `RS256` when unset.
pub(crate) fn configured_algorithm(
    settings: &ConfigurationSnapshot,
) -> CredentialResult<SigningAlgorithm> {
    settings
        .get(token::ALGORITHM)
        .map_or(Ok(SigningAlgorithm::default()), str::parse)
}

/// Header and payload of a compact token, without any verification.
pub(crate) fn decode_unverified(
    token: &str,
) -> CredentialResult<(Map<String, Value>, Map<String, Value>)> {
    let mut segments = token.split('.');
    let (Some(header), Some(payload), Some(_), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return Err(CredentialError::invalid_token(
            "token must have three dot-separated segments",
        ));
    };
    Ok((decode_segment(header, "header")?, decode_segment(payload, "payload")?))
}

fn decode_segment(segment: &str, name: &str) -> CredentialResult<Map<String, Value>> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| CredentialError::invalid_token(format!("{name} is not base64url: {e}")))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| CredentialError::invalid_token(format!("{name} is not a JSON object: {e}")))
}

pub(crate) fn encode_segment(value: &Map<String, Value>) -> CredentialResult<String> {
    let json = serde_json::to_vec(value).map_err(CredentialError::crypto)?;
    Ok(URL_SAFE_NO_PAD.encode(json))
}

/// Numeric date member as whole seconds.
pub(crate) fn numeric_date(payload: &Map<String, Value>, name: &str) -> Option<i64> {
    match payload.get(name)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        _ => None,
    }
}
