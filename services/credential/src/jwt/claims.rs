//! Claim types and the ordered claim sets carried by tokens.

use crate::error::{CredentialError, CredentialResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Well-known claim types.
pub mod claim_ids {
    /// Session identifier (GUID).
    pub const SESSION: &str = "session";
    /// Authorization identifier (GUID).
    pub const AUTHORIZATION: &str = "authorization";
    /// Numeric role.
    pub const ROLE: &str = "role";
}

/// Payload members written by the issuer. Caller claims may not use them.
pub const REGISTERED_CLAIMS: [&str; 5] = ["iss", "aud", "iat", "nbf", "exp"];

/// A typed string fact asserted by a token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Claim {
    /// Claim type
    #[serde(rename = "type")]
    pub claim_type: String,
    /// Claim value
    pub value: String,
}

impl Claim {
    /// Claim of `claim_type` with `value`.
    #[must_use]
    pub fn new(claim_type: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            claim_type: claim_type.into(),
            value: value.into(),
        }
    }
}

/// Ordered claims. A type may repeat.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClaimSet {
    claims: Vec<Claim>,
}

impl ClaimSet {
    /// Empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Session claims: session and authorization ids, plus an optional role.
    pub fn for_session(session_id: Uuid, authorization_id: Uuid, role: Option<i32>) -> Self {
        let mut claims = Self::new()
            .with(claim_ids::SESSION, session_id.to_string())
            .with(claim_ids::AUTHORIZATION, authorization_id.to_string());
        if let Some(role) = role {
            claims.push(claim_ids::ROLE, role.to_string());
        }
        claims
    }

    /// Builder form of [`ClaimSet::push`].
    #[must_use]
    pub fn with(mut self, claim_type: impl Into<String>, value: impl Into<String>) -> Self {
        self.push(claim_type, value);
        self
    }

    /// Append a claim.
    pub fn push(&mut self, claim_type: impl Into<String>, value: impl Into<String>) {
        self.claims.push(Claim::new(claim_type, value));
    }

    /// Claims in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, Claim> {
        self.claims.iter()
    }

    /// Number of claims.
    #[must_use]
    pub fn len(&self) -> usize {
        self.claims.len()
    }

    /// True when no claims are present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.claims.is_empty()
    }

    /// First value of `claim_type`.
    pub fn first(&self, claim_type: &str) -> Option<&str> {
        self.claims
            .iter()
            .find(|c| c.claim_type == claim_type)
            .map(|c| c.value.as_str())
    }

    /// Every value of `claim_type`, in order.
    pub fn values<'a>(&'a self, claim_type: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.claims
            .iter()
            .filter(move |c| c.claim_type == claim_type)
            .map(|c| c.value.as_str())
    }

    /// True when `claim_type` carries `value`.
    #[must_use]
    pub fn contains(&self, claim_type: &str, value: &str) -> bool {
        self.values(claim_type).any(|v| v == value)
    }

    /// First value of `claim_type` as a GUID; `None` when absent or not a GUID.
    pub fn guid_value(&self, claim_type: &str) -> Option<Uuid> {
        self.first(claim_type)
            .and_then(|v| Uuid::parse_str(v.trim()).ok())
    }

    /// `(session id, authorization id)`.
    ///
    /// # Errors
    ///
    /// `TokenInvalid` when either is missing, unparsable or nil.
    pub fn authorization(&self) -> CredentialResult<(Uuid, Uuid)> {
        let session = self
            .guid_value(claim_ids::SESSION)
            .ok_or_else(|| CredentialError::invalid_token("session claim missing or not a GUID"))?;
        let authorization = self.guid_value(claim_ids::AUTHORIZATION).ok_or_else(|| {
            CredentialError::invalid_token("authorization claim missing or not a GUID")
        })?;
        if session.is_nil() || authorization.is_nil() {
            return Err(CredentialError::invalid_token("empty session or authorization id"));
        }
        Ok((session, authorization))
    }

    /// Claims regrouped so every type's values are adjacent, types in order of
    /// first appearance. This is the order a payload round trip yields.
    pub fn normalized(&self) -> Self {
        let mut types: Vec<&str> = Vec::new();
        for claim in &self.claims {
            if !types.contains(&claim.claim_type.as_str()) {
                types.push(&claim.claim_type);
            }
        }
        let claims = types
            .into_iter()
            .flat_map(|t| self.claims.iter().filter(move |c| c.claim_type == t).cloned())
            .collect();
        Self { claims }
    }

    /// Payload members for these claims. A repeated type becomes an array.
    ///
    /// # Errors
    ///
    /// `TokenInvalid` when a claim type collides with a registered member.
    pub fn to_payload(&self) -> CredentialResult<Map<String, Value>> {
        let mut payload = Map::new();
        for claim in &self.claims {
            if REGISTERED_CLAIMS.contains(&claim.claim_type.as_str()) {
                return Err(CredentialError::invalid_token(format!(
                    "claim type '{}' is reserved",
                    claim.claim_type
                )));
            }
            let value = Value::String(claim.value.clone());
            match payload.get_mut(&claim.claim_type) {
                None => {
                    payload.insert(claim.claim_type.clone(), value);
                }
                Some(Value::Array(items)) => items.push(value),
                Some(existing) => {
                    let first = existing.take();
                    *existing = Value::Array(vec![first, value]);
                }
            }
        }
        Ok(payload)
    }

    /// Claims from a decoded payload, skipping registered members. Arrays
    /// expand to one claim per element; non-string values keep their JSON
    /// text.
    pub fn from_payload(payload: &Map<String, Value>) -> Self {
        let mut claims = Self::new();
        for (claim_type, value) in payload {
            if REGISTERED_CLAIMS.contains(&claim_type.as_str()) {
                continue;
            }
            match value {
                Value::Array(items) => {
                    for item in items {
                        claims.push(claim_type.clone(), value_text(item));
                    }
                }
                other => claims.push(claim_type.clone(), value_text(other)),
            }
        }
        claims
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

impl FromIterator<(String, String)> for ClaimSet {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            claims: iter.into_iter().map(|(t, v)| Claim::new(t, v)).collect(),
        }
    }
}

impl<'a> IntoIterator for &'a ClaimSet {
    type Item = &'a Claim;
    type IntoIter = std::slice::Iter<'a, Claim>;

    fn into_iter(self) -> Self::IntoIter {
        self.claims.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_payload_groups_duplicates() {
        let claims = ClaimSet::new()
            .with("role", "admin")
            .with("scope", "read")
            .with("role", "auditor");
        let payload = claims.to_payload().unwrap();
        assert_eq!(payload["role"], json!(["admin", "auditor"]));
        assert_eq!(payload["scope"], json!("read"));

        let back = ClaimSet::from_payload(&payload);
        assert_eq!(back, claims.normalized());
        assert_eq!(
            back.values("role").collect::<Vec<_>>(),
            vec!["admin", "auditor"]
        );
    }

    #[test]
    fn test_reserved_claim_rejected() {
        let claims = ClaimSet::new().with("exp", "0");
        assert!(matches!(
            claims.to_payload(),
            Err(CredentialError::TokenInvalid(_))
        ));
    }

    #[test]
    fn test_from_payload_skips_registered_and_stringifies() {
        let payload = json!({
            "iss": "x", "aud": "y", "iat": 1, "nbf": 1, "exp": 2,
            "role": 3, "admin": true, "tags": ["a", 1],
        });
        let claims = ClaimSet::from_payload(payload.as_object().unwrap());
        assert_eq!(claims.len(), 4);
        assert_eq!(claims.first("role"), Some("3"));
        assert_eq!(claims.first("admin"), Some("true"));
        assert!(claims.contains("tags", "a"));
        assert!(claims.contains("tags", "1"));
        assert!(claims.first("iss").is_none());
    }

    #[test]
    fn test_session_claims() {
        let session = Uuid::new_v4();
        let auth = Uuid::new_v4();
        let claims = ClaimSet::for_session(session, auth, Some(2));
        assert_eq!(claims.authorization().unwrap(), (session, auth));
        assert_eq!(claims.first(claim_ids::ROLE), Some("2"));
    }

    #[test]
    fn test_authorization_rejects_nil_and_garbage() {
        let nil = ClaimSet::for_session(Uuid::nil(), Uuid::new_v4(), None);
        assert!(nil.authorization().is_err());

        let garbage = ClaimSet::new()
            .with(claim_ids::SESSION, "not-a-guid")
            .with(claim_ids::AUTHORIZATION, Uuid::new_v4().to_string());
        assert!(garbage.authorization().is_err());
        assert!(garbage.guid_value(claim_ids::SESSION).is_none());
    }

    #[test]
    fn test_push_preserves_insertion_order() {
        let mut claims = ClaimSet::new();
        assert!(claims.is_empty());
        claims.push("scope", "read");
        claims.push("role", "admin");
        claims.push("scope", "write");

        assert_eq!(claims.len(), 3);
        assert!(claims.contains("scope", "write"));
        assert!(!claims.contains("role", "write"));
        let order: Vec<_> = claims.iter().map(|c| c.value.as_str()).collect();
        assert_eq!(order, vec!["read", "admin", "write"]);
        assert_eq!(claims.iter().next(), Some(&Claim::new("scope", "read")));
    }

    #[test]
    fn test_normalized_keeps_adjacent_order() {
        let claims = ClaimSet::new().with("a", "1").with("a", "2").with("b", "3");
        assert_eq!(claims.normalized(), claims);
    }
}
