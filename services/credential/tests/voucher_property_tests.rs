//! Property-based tests for vouchers.
//!
//! Property 1: Generated vouchers validate to their subject and expiry
//! Property 2: Any altered byte is rejected
//! Property 3: URL-safe vouchers round trip and contain no unsafe characters

mod common;

use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::Duration;
use common::{OTHER_RSA_KEY, RSA_KEY, fixed_now, snapshot};
use credential_service::config::voucher;
use credential_service::voucher::{from_ticks, to_ticks};
use credential_service::{CredentialError, FixedTimeService, VoucherCodec};
use proptest::prelude::*;
use std::sync::Arc;
use uuid::Uuid;

fn codec_with(key: &str, clock: Arc<FixedTimeService>) -> VoucherCodec {
    VoucherCodec::new(snapshot(&[(voucher::KEY, key)])).with_clock(clock)
}

fn codec() -> VoucherCodec {
    codec_with(&RSA_KEY, Arc::new(FixedTimeService::new(fixed_now())))
}

fn arb_subject() -> impl Strategy<Value = Uuid> {
    any::<[u8; 16]>().prop_map(Uuid::from_bytes)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// Property 1: Generated vouchers validate to their subject and expiry
    #[test]
    fn prop_voucher_round_trip(subject in arb_subject(), millis in 0i64..(30 * 86_400_000)) {
        let until = fixed_now() + Duration::milliseconds(millis);
        let codec = codec();
        let voucher = codec.validate(&codec.generate(subject, until).unwrap()).unwrap();
        prop_assert_eq!(voucher.subject_id, subject);
        prop_assert_eq!(voucher.valid_until, until);
    }

    /// Property 2: Any altered byte is rejected
    #[test]
    fn prop_voucher_tamper_rejected(subject in arb_subject(), index in 0usize..1024, flip in 1u8..=255) {
        let codec = codec();
        let mut bytes = codec
            .generate_bytes(subject, fixed_now() + Duration::days(365))
            .unwrap();
        let index = index % bytes.len();
        bytes[index] ^= flip;

        let result = codec.validate(&STANDARD.encode(&bytes));
        prop_assert!(result.is_err());
        // an edited expiry may land in the past or out of range; everything else is a bad signature
        if index < 16 || index >= 24 {
            prop_assert!(
                matches!(result, Err(CredentialError::SignatureInvalid(_))),
                "unexpected {:?}",
                result
            );
        }
    }

    /// Property 3: URL-safe vouchers round trip and contain no unsafe characters
    #[test]
    fn prop_url_safe_round_trip(subject in arb_subject(), seconds in 0i64..86_400) {
        let codec = codec();
        let token = codec
            .generate_url_safe(subject, fixed_now() + Duration::seconds(seconds))
            .unwrap();
        prop_assert!(token.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        prop_assert_eq!(codec.validate_url_safe(&token).unwrap().subject_id, subject);
    }

    #[test]
    fn prop_ticks_round_trip(millis in -62_135_596_800_000i64..253_402_300_799_000) {
        let instant = chrono::DateTime::from_timestamp_millis(millis).unwrap();
        prop_assert_eq!(from_ticks(to_ticks(instant)), Some(instant));
    }
}

#[test]
fn test_voucher_expires_after_sixty_seconds() {
    let subject = Uuid::parse_str("11111111-1111-1111-1111-111111111111").unwrap();
    let clock = Arc::new(FixedTimeService::new(fixed_now()));
    let codec = codec_with(&RSA_KEY, Arc::clone(&clock));

    let token = codec
        .generate(subject, fixed_now() + Duration::seconds(60))
        .unwrap();
    assert_eq!(codec.validate(&token).unwrap().subject_id, subject);

    clock.advance(Duration::seconds(61));
    assert_eq!(
        codec.validate(&token).unwrap_err(),
        CredentialError::expired("Token has expired")
    );
}

#[test]
fn test_voucher_from_other_key_rejected() {
    let token = codec()
        .generate(Uuid::new_v4(), fixed_now() + Duration::hours(1))
        .unwrap();
    let other = codec_with(&OTHER_RSA_KEY, Arc::new(FixedTimeService::new(fixed_now())));
    assert!(matches!(
        other.validate(&token),
        Err(CredentialError::SignatureInvalid(_))
    ));
}

#[test]
fn test_url_safe_from_other_key_rejected() {
    let token = codec()
        .generate_url_safe(Uuid::new_v4(), fixed_now() + Duration::hours(1))
        .unwrap();
    let other = codec_with(&OTHER_RSA_KEY, Arc::new(FixedTimeService::new(fixed_now())));
    assert!(matches!(
        other.validate_url_safe(&token),
        Err(CredentialError::SignatureInvalid(_))
    ));
    assert!(matches!(
        other.validate_url_safe("short"),
        Err(CredentialError::TokenInvalid(_))
    ));
}

#[test]
fn test_missing_and_invalid_key() {
    let clock = Arc::new(FixedTimeService::new(fixed_now()));
    let missing = VoucherCodec::new(snapshot(&[])).with_clock(Arc::<FixedTimeService>::clone(&clock));
    assert_eq!(
        missing.generate(Uuid::new_v4(), fixed_now()).unwrap_err(),
        CredentialError::missing(voucher::KEY)
    );

    let invalid = codec_with("bm90IGEga2V5", clock);
    assert!(matches!(
        invalid.generate(Uuid::new_v4(), fixed_now()),
        Err(CredentialError::ConfigInvalid { .. })
    ));
}
