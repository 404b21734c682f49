//! Compact RSA-signed vouchers.
//!
//! A voucher is `subject (16 bytes, GUID little-endian layout)`,
//! `valid-until (i64 LE ticks of 100 ns since 0001-01-01 UTC)` and a
//! PKCS#1 v1.5 SHA-256 signature over those 24 bytes.
//!
//! The URL-safe form replaces the signature with its SHA-256 digest. It can
//! only be checked by signing the prefix again, so validating it needs the
//! private key.

use crate::clock::{SystemTimeService, TimeService};
use crate::config::voucher;
use crate::error::{CredentialError, CredentialResult};
use crate::keys::{KeyMaterialProvider, RsaKey};
use crate::metrics;
use crate::settings::ConfigurationSnapshot;
use base64::{
    Engine,
    engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD},
};
use chrono::{DateTime, Utc};
use rsa::Pkcs1v15Sign;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::{debug, instrument};
use uuid::Uuid;

/// Ticks at the Unix epoch.
pub const EPOCH_TICKS: i64 = 621_355_968_000_000_000;
/// Largest representable tick count (9999-12-31T23:59:59.9999999).
pub const MAX_TICKS: i64 = 3_155_378_975_999_999_999;
const TICKS_PER_SECOND: i64 = 10_000_000;
const NANOS_PER_TICK: i64 = 100;

const SUBJECT_LEN: usize = 16;
const PREFIX_LEN: usize = SUBJECT_LEN + 8;
const DIGEST_LEN: usize = 32;

/// Tick count for an instant.
#[must_use]
pub fn to_ticks(instant: DateTime<Utc>) -> i64 {
    let seconds = instant.timestamp().saturating_mul(TICKS_PER_SECOND);
    let fraction = i64::from(instant.timestamp_subsec_nanos()) / NANOS_PER_TICK;
    EPOCH_TICKS.saturating_add(seconds).saturating_add(fraction)
}

/// Instant for a tick count; `None` outside the representable range.
#[must_use]
pub fn from_ticks(ticks: i64) -> Option<DateTime<Utc>> {
    if !(0..=MAX_TICKS).contains(&ticks) {
        return None;
    }
    let since_epoch = ticks - EPOCH_TICKS;
    let seconds = since_epoch.div_euclid(TICKS_PER_SECOND);
    let nanos = since_epoch.rem_euclid(TICKS_PER_SECOND) * NANOS_PER_TICK;
    DateTime::from_timestamp(seconds, u32::try_from(nanos).ok()?)
}

/// A voucher that passed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Voucher {
    /// Subject the voucher was issued for.
    pub subject_id: Uuid,
    /// Instant after which the voucher is refused.
    pub valid_until: DateTime<Utc>,
}

struct Parsed<'a> {
    prefix: &'a [u8],
    voucher: Voucher,
    ticks: i64,
    tail: &'a [u8],
}

/// Generates and validates vouchers with the configured RSA key.
#[derive(Clone)]
pub struct VoucherCodec {
    keys: KeyMaterialProvider,
    clock: Arc<dyn TimeService>,
    key_setting: String,
}

impl VoucherCodec {
    /// Codec reading `EastFive.Security.CredentialProvider.Voucher.Key`.
    #[must_use]
    pub fn new(settings: Arc<ConfigurationSnapshot>) -> Self {
        Self {
            keys: KeyMaterialProvider::new(settings),
            clock: Arc::new(SystemTimeService),
            key_setting: voucher::KEY.to_string(),
        }
    }

    /// Use `clock` for expiry checks.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn TimeService>) -> Self {
        self.clock = clock;
        self
    }

    /// Read the key from another setting.
    #[must_use]
    pub fn with_key_setting(mut self, key: impl Into<String>) -> Self {
        self.key_setting = key.into();
        self
    }

    /// Provider id registered for voucher credentials.
    ///
    /// # Errors
    ///
    /// `ConfigMissing` when unset, `ConfigInvalid` when not a GUID.
    pub fn provider_id(&self) -> CredentialResult<Uuid> {
        self.keys.settings().guid(voucher::PROVIDER)
    }

    /// Raw voucher bytes.
    ///
    /// # Errors
    ///
    /// Configuration errors for the key setting, including a key without its
    /// private half; `Crypto` when signing fails.
    pub fn generate_bytes(
        &self,
        subject_id: Uuid,
        valid_until: DateTime<Utc>,
    ) -> CredentialResult<Vec<u8>> {
        let prefix = prefix(subject_id, to_ticks(valid_until));
        let signature = self.sign(&self.key()?, &prefix)?;
        let mut bytes = prefix.to_vec();
        bytes.extend_from_slice(&signature);
        Ok(bytes)
    }

    /// Standard base64 voucher.
    ///
    /// # Errors
    ///
    /// As [`generate_bytes`](Self::generate_bytes).
    #[instrument(skip(self), fields(subject = %subject_id))]
    pub fn generate(&self, subject_id: Uuid, valid_until: DateTime<Utc>) -> CredentialResult<String> {
        let result = self
            .generate_bytes(subject_id, valid_until)
            .map(|bytes| STANDARD.encode(bytes));
        record("generate", &result);
        result
    }

    /// URL-safe voucher: base64url of the prefix and the signature digest.
    ///
    /// # Errors
    ///
    /// As [`generate_bytes`](Self::generate_bytes).
    #[instrument(skip(self), fields(subject = %subject_id))]
    pub fn generate_url_safe(
        &self,
        subject_id: Uuid,
        valid_until: DateTime<Utc>,
    ) -> CredentialResult<String> {
        let result = self
            .private_key()
            .and_then(|key| self.url_safe_bytes(&key, subject_id, to_ticks(valid_until)))
            .map(|bytes| URL_SAFE_NO_PAD.encode(bytes));
        record("generate_url_safe", &result);
        result
    }

    /// Validate raw voucher bytes.
    ///
    /// # Errors
    ///
    /// `TokenInvalid` for short input, `TokenExpired` past the valid-until
    /// instant (checked before the key is read), configuration errors for
    /// the key setting, `SignatureInvalid` when the signature does not verify.
    pub fn validate_bytes(&self, bytes: &[u8]) -> CredentialResult<Voucher> {
        let parsed = parse(bytes)?;
        if parsed.tail.is_empty() {
            return Err(CredentialError::invalid_token("voucher has no signature"));
        }
        self.check_expiry(&parsed)?;

        let key = self.key()?;
        let digest = Sha256::digest(parsed.prefix);
        key.public()
            .verify(Pkcs1v15Sign::new::<Sha256>(), &digest, parsed.tail)
            .map_err(|_| {
                CredentialError::bad_signature(format!(
                    "voucher signature does not verify for subject {} valid until {}",
                    parsed.voucher.subject_id, parsed.voucher.valid_until
                ))
            })?;
        Ok(parsed.voucher)
    }

    /// Validate a standard base64 voucher.
    ///
    /// # Errors
    ///
    /// `TokenInvalid` for bad base64, otherwise as
    /// [`validate_bytes`](Self::validate_bytes).
    #[instrument(skip_all)]
    pub fn validate(&self, token: &str) -> CredentialResult<Voucher> {
        let result = STANDARD
            .decode(token.trim())
            .map_err(|e| CredentialError::invalid_token(format!("voucher is not base64: {e}")))
            .and_then(|bytes| self.validate_bytes(&bytes));
        record("validate", &result);
        result
    }

    /// Validate a URL-safe voucher by generating it again and comparing.
    ///
    /// # Errors
    ///
    /// `TokenInvalid` for bad encoding or length, `TokenExpired` past the
    /// valid-until instant, configuration errors when the private key is not
    /// available, `SignatureInvalid` when the vouchers differ.
    #[instrument(skip_all)]
    pub fn validate_url_safe(&self, token: &str) -> CredentialResult<Voucher> {
        let result = self.validate_url_safe_inner(token);
        record("validate_url_safe", &result);
        result
    }

    fn validate_url_safe_inner(&self, token: &str) -> CredentialResult<Voucher> {
        let bytes = URL_SAFE_NO_PAD
            .decode(token.trim())
            .map_err(|e| CredentialError::invalid_token(format!("voucher is not base64url: {e}")))?;
        let parsed = parse(&bytes)?;
        if parsed.tail.len() != DIGEST_LEN {
            return Err(CredentialError::invalid_token(format!(
                "URL-safe voucher must carry a {DIGEST_LEN}-byte digest"
            )));
        }
        self.check_expiry(&parsed)?;

        let expected =
            self.url_safe_bytes(&self.private_key()?, parsed.voucher.subject_id, parsed.ticks)?;
        if bool::from(expected.as_slice().ct_eq(bytes.as_slice())) {
            Ok(parsed.voucher)
        } else {
            Err(CredentialError::bad_signature(format!(
                "URL-safe voucher does not match for subject {}",
                parsed.voucher.subject_id
            )))
        }
    }

    fn check_expiry(&self, parsed: &Parsed<'_>) -> CredentialResult<()> {
        let now = to_ticks(self.clock.utc_now());
        if parsed.ticks < now {
            debug!(subject = %parsed.voucher.subject_id, "Voucher expired");
            return Err(CredentialError::expired("Token has expired"));
        }
        Ok(())
    }

    fn key(&self) -> CredentialResult<RsaKey> {
        self.keys.rsa(&self.key_setting)
    }

    fn private_key(&self) -> CredentialResult<RsaKey> {
        let key = self.key()?;
        if key.has_private() {
            Ok(key)
        } else {
            Err(CredentialError::invalid_config(
                &self.key_setting,
                "private key required",
            ))
        }
    }

    fn sign(&self, key: &RsaKey, prefix: &[u8]) -> CredentialResult<Vec<u8>> {
        let private = key.private().ok_or_else(|| {
            CredentialError::invalid_config(&self.key_setting, "private key required")
        })?;
        let digest = Sha256::digest(prefix);
        private
            .sign(Pkcs1v15Sign::new::<Sha256>(), &digest)
            .map_err(CredentialError::crypto)
    }

    fn url_safe_bytes(&self, key: &RsaKey, subject_id: Uuid, ticks: i64) -> CredentialResult<Vec<u8>> {
        let prefix = prefix(subject_id, ticks);
        let signature = self.sign(key, &prefix)?;
        let mut bytes = prefix.to_vec();
        bytes.extend_from_slice(&Sha256::digest(&signature));
        Ok(bytes)
    }
}

impl std::fmt::Debug for VoucherCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoucherCodec")
            .field("key_setting", &self.key_setting)
            .finish_non_exhaustive()
    }
}

fn prefix(subject_id: Uuid, ticks: i64) -> [u8; PREFIX_LEN] {
    let mut prefix = [0u8; PREFIX_LEN];
    prefix[..SUBJECT_LEN].copy_from_slice(&subject_id.to_bytes_le());
    prefix[SUBJECT_LEN..].copy_from_slice(&ticks.to_le_bytes());
    prefix
}

fn parse(bytes: &[u8]) -> CredentialResult<Parsed<'_>> {
    if bytes.len() < PREFIX_LEN {
        return Err(CredentialError::invalid_token(format!(
            "voucher is {} bytes, at least {PREFIX_LEN} required",
            bytes.len()
        )));
    }
    let (prefix, tail) = bytes.split_at(PREFIX_LEN);
    let mut subject = [0u8; SUBJECT_LEN];
    subject.copy_from_slice(&prefix[..SUBJECT_LEN]);
    let mut ticks = [0u8; 8];
    ticks.copy_from_slice(&prefix[SUBJECT_LEN..]);
    let ticks = i64::from_le_bytes(ticks);

    let valid_until = from_ticks(ticks).ok_or_else(|| {
        CredentialError::invalid_token(format!("voucher expiry {ticks} is out of range"))
    })?;
    Ok(Parsed {
        prefix,
        voucher: Voucher {
            subject_id: Uuid::from_bytes_le(subject),
            valid_until,
        },
        ticks,
        tail,
    })
}

fn record<T>(operation: &str, result: &CredentialResult<T>) {
    let outcome = match result {
        Ok(_) => "ok",
        Err(e) => e.kind(),
    };
    metrics::record_voucher_operation(operation, outcome);
}
