//! Shared fixtures for credential integration tests.

#![allow(dead_code)]

use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::{DateTime, TimeZone, Utc};
use credential_service::ConfigurationSnapshot;
use credential_service::config::token;
use credential_service::keys::RsaKey;
use once_cell::sync::Lazy;
use std::sync::Arc;

/// Signing key used by most tests, PKCS#1 DER in base64.
pub static RSA_KEY: Lazy<String> = Lazy::new(generate_rsa_b64);

/// A second, unrelated key.
pub static OTHER_RSA_KEY: Lazy<String> = Lazy::new(generate_rsa_b64);

pub const ISSUER: &str = "https://example.test";
pub const SCOPE: &str = "https://example.test/api";

pub fn generate_rsa_b64() -> String {
    let key = RsaKey::generate(2048).expect("RSA key generation");
    STANDARD.encode(key.to_pkcs1_der().expect("PKCS#1 encoding"))
}

pub fn snapshot(pairs: &[(&str, &str)]) -> Arc<ConfigurationSnapshot> {
    Arc::new(ConfigurationSnapshot::from_pairs(pairs.iter().copied()))
}

/// Token settings with `key` as the signing key, plus `extra`.
pub fn token_settings(key: &str, extra: &[(&str, &str)]) -> Arc<ConfigurationSnapshot> {
    let mut pairs = vec![(token::KEY, key), (token::ISSUER, ISSUER), (token::SCOPE, SCOPE)];
    pairs.extend_from_slice(extra);
    snapshot(&pairs)
}

pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}
