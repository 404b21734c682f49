//! Key material derived from configuration.
//!
//! [`KeyMaterialProvider`] reads base64 settings from a snapshot and turns
//! them into RSA, ECDSA or AES keys. Keys are built per call and owned by the
//! caller; nothing is cached here.

pub mod aes;
pub mod ecdsa;
pub mod rsa;

pub use self::aes::{AesKey, generate_aes_key, generate_guid_key};
pub use self::ecdsa::{EcCurve, EcdsaKey, generate_ecdsa_key};
pub use self::rsa::{GeneratedRsaKey, RsaKey, RsaKeyEncoding, generate_rsa_key, hash_data};

use crate::config::{KeyFamily, SigningAlgorithm};
use crate::error::{CredentialError, CredentialResult};
use crate::settings::ConfigurationSnapshot;
use base64::{Engine, engine::general_purpose::STANDARD};
use jsonwebtoken::{DecodingKey, EncodingKey};
use std::sync::Arc;

/// A decoded key of any supported family.
#[derive(Debug, Clone)]
pub enum KeyMaterial {
    /// RSA key pair or public key
    Rsa(RsaKey),
    /// ECDSA private key
    Ecdsa(EcdsaKey),
    /// AES key
    Aes(AesKey),
}

impl KeyMaterial {
    /// Family of the key.
    #[must_use]
    pub const fn family(&self) -> KeyFamily {
        match self {
            Self::Rsa(_) => KeyFamily::Rsa,
            Self::Ecdsa(_) => KeyFamily::Ecdsa,
            Self::Aes(_) => KeyFamily::Aes,
        }
    }

    /// Algorithm identifier: `RS256`, `ES256`..`ES512`, or `A128`..`A256`.
    #[must_use]
    pub fn algorithm(&self) -> String {
        match self {
            Self::Rsa(_) => SigningAlgorithm::RS256.as_str().to_string(),
            Self::Ecdsa(k) => k.algorithm_name().to_string(),
            Self::Aes(k) => k.algorithm(),
        }
    }
}

/// A key checked against the algorithm it will sign or verify with.
#[derive(Debug, Clone)]
pub struct SigningKey {
    algorithm: SigningAlgorithm,
    material: KeyMaterial,
}

impl SigningKey {
    /// Pair `material` with `algorithm`.
    ///
    /// # Errors
    ///
    /// `ConfigInvalid` under `setting` when the key family or curve does not
    /// fit the algorithm.
    pub fn new(
        setting: &str,
        algorithm: SigningAlgorithm,
        material: KeyMaterial,
    ) -> CredentialResult<Self> {
        let fits = match (&material, algorithm) {
            (KeyMaterial::Rsa(_), alg) => alg.family() == KeyFamily::Rsa,
            (KeyMaterial::Ecdsa(k), alg) => k.algorithm() == Some(alg),
            (KeyMaterial::Aes(_), _) => false,
        };
        if !fits {
            return Err(CredentialError::invalid_config(
                setting,
                format!("{} key cannot be used with {algorithm}", material_label(&material)),
            ));
        }
        Ok(Self {
            algorithm,
            material,
        })
    }

    /// Signing algorithm.
    #[must_use]
    pub const fn algorithm(&self) -> SigningAlgorithm {
        self.algorithm
    }

    /// Underlying key.
    #[must_use]
    pub const fn material(&self) -> &KeyMaterial {
        &self.material
    }

    /// `jsonwebtoken` signing key.
    ///
    /// # Errors
    ///
    /// `ConfigInvalid` under `setting` when the key cannot sign.
    pub fn encoding_key(&self, setting: &str) -> CredentialResult<EncodingKey> {
        match &self.material {
            KeyMaterial::Rsa(k) => k.encoding_key(),
            KeyMaterial::Ecdsa(k) => k.encoding_key(),
            KeyMaterial::Aes(_) => Err("AES keys cannot sign tokens".to_string()),
        }
        .map_err(|reason| CredentialError::invalid_config(setting, reason))
    }

    /// `jsonwebtoken` verification key.
    ///
    /// # Errors
    ///
    /// `ConfigInvalid` under `setting` when the key cannot verify.
    pub fn decoding_key(&self, setting: &str) -> CredentialResult<DecodingKey> {
        match &self.material {
            KeyMaterial::Rsa(k) => k.decoding_key(),
            KeyMaterial::Ecdsa(k) => k.decoding_key(),
            KeyMaterial::Aes(_) => Err("AES keys cannot verify tokens".to_string()),
        }
        .map_err(|reason| CredentialError::invalid_config(setting, reason))
    }
}

const fn material_label(material: &KeyMaterial) -> &'static str {
    match material {
        KeyMaterial::Rsa(_) => "RSA",
        KeyMaterial::Ecdsa(k) => match k.curve() {
            EcCurve::P256 => "P-256",
            EcCurve::P384 => "P-384",
            EcCurve::P521 => "P-521",
        },
        KeyMaterial::Aes(_) => "AES",
    }
}

/// Builds keys from configuration settings.
#[derive(Debug, Clone)]
pub struct KeyMaterialProvider {
    settings: Arc<ConfigurationSnapshot>,
}

impl KeyMaterialProvider {
    /// Provider over a resolved snapshot.
    #[must_use]
    pub const fn new(settings: Arc<ConfigurationSnapshot>) -> Self {
        Self { settings }
    }

    /// Snapshot the provider reads from.
    #[must_use]
    pub fn settings(&self) -> &ConfigurationSnapshot {
        &self.settings
    }

    /// RSA key from a base64 XML or PKCS#1 DER setting.
    ///
    /// # Errors
    ///
    /// `ConfigMissing` when unset, `ConfigInvalid` when undecodable.
    pub fn rsa(&self, key: &str) -> CredentialResult<RsaKey> {
        let bytes = self.settings.base64_bytes(key)?;
        RsaKey::import(&bytes).map_err(|reason| CredentialError::invalid_config(key, reason))
    }

    /// ECDSA key from a base64 SEC1 setting.
    ///
    /// # Errors
    ///
    /// `ConfigMissing` when unset, `ConfigInvalid` when undecodable.
    pub fn ecdsa(&self, key: &str) -> CredentialResult<EcdsaKey> {
        let bytes = self.settings.base64_bytes(key)?;
        EcdsaKey::from_sec1_der(&bytes).map_err(|reason| CredentialError::invalid_config(key, reason))
    }

    /// AES key from a base64 key setting and a key-size setting in bits.
    ///
    /// # Errors
    ///
    /// `ConfigMissing` when either is unset, `ConfigInvalid` when the size is
    /// unsupported or does not match the key.
    pub fn aes(&self, key: &str, key_size_key: &str) -> CredentialResult<AesKey> {
        let bytes = self.settings.base64_bytes(key)?;
        let bits = self.settings.integer(key_size_key)?;
        let bits = u32::try_from(bits)
            .map_err(|_| CredentialError::invalid_config(key_size_key, format!("{bits} is out of range")))?;
        AesKey::new(bytes, bits).map_err(|reason| CredentialError::invalid_config(key, reason))
    }

    /// AES key plus fixed IV from two base64 settings.
    ///
    /// # Errors
    ///
    /// As [`aes`](Self::aes), and `ConfigInvalid` under `iv_key` for a bad IV.
    pub fn aes_with_iv(
        &self,
        key: &str,
        key_size_key: &str,
        iv_key: &str,
    ) -> CredentialResult<AesKey> {
        let iv = self.settings.base64_bytes(iv_key)?;
        self.aes(key, key_size_key)?
            .with_iv(&iv)
            .map_err(|reason| CredentialError::invalid_config(iv_key, reason))
    }

    /// Key of the requested family.
    ///
    /// AES keys resolved this way take their size from the key length.
    ///
    /// # Errors
    ///
    /// `ConfigMissing` when unset, `ConfigInvalid` when undecodable.
    pub fn resolve(&self, key: &str, family: KeyFamily) -> CredentialResult<KeyMaterial> {
        match family {
            KeyFamily::Rsa => self.rsa(key).map(KeyMaterial::Rsa),
            KeyFamily::Ecdsa => self.ecdsa(key).map(KeyMaterial::Ecdsa),
            KeyFamily::Aes => {
                let bytes = self.settings.base64_bytes(key)?;
                let bits = u32::try_from(bytes.len() * 8).unwrap_or(0);
                AesKey::new(bytes, bits)
                    .map(KeyMaterial::Aes)
                    .map_err(|reason| CredentialError::invalid_config(key, reason))
            }
        }
    }

    /// Key for signing or verifying with `algorithm`.
    ///
    /// # Errors
    ///
    /// As [`resolve`](Self::resolve), plus `ConfigInvalid` when the key does
    /// not fit the algorithm.
    pub fn signing_key(&self, key: &str, algorithm: SigningAlgorithm) -> CredentialResult<SigningKey> {
        let material = self.resolve(key, algorithm.family())?;
        SigningKey::new(key, algorithm, material)
    }

    /// Signing key from an inline base64 RSA secret instead of a setting.
    ///
    /// # Errors
    ///
    /// `ConfigInvalid` under `label` when the secret is not a usable RSA key.
    pub fn inline_rsa(label: &str, secret_base64: &str) -> CredentialResult<RsaKey> {
        let bytes = STANDARD
            .decode(secret_base64.trim())
            .map_err(|e| CredentialError::invalid_config(label, format!("not valid base64: {e}")))?;
        RsaKey::import(&bytes).map_err(|reason| CredentialError::invalid_config(label, reason))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use once_cell::sync::Lazy;

    static RSA_B64: Lazy<String> = Lazy::new(|| {
        let key = RsaKey::generate(1024).unwrap();
        STANDARD.encode(key.to_pkcs1_der().unwrap())
    });

    fn provider(pairs: &[(&str, &str)]) -> KeyMaterialProvider {
        KeyMaterialProvider::new(Arc::new(ConfigurationSnapshot::from_pairs(
            pairs.iter().copied(),
        )))
    }

    #[test]
    fn test_missing_vs_invalid() {
        let p = provider(&[("Bad", "AAAA"), ("NotB64", "%%%")]);
        assert!(matches!(p.rsa("Nope"), Err(CredentialError::ConfigMissing { .. })));
        assert!(matches!(p.rsa("Bad"), Err(CredentialError::ConfigInvalid { .. })));
        assert!(matches!(p.rsa("NotB64"), Err(CredentialError::ConfigInvalid { .. })));
        assert!(matches!(p.ecdsa("Bad"), Err(CredentialError::ConfigInvalid { .. })));
    }

    #[test]
    fn test_rsa_from_setting() {
        let p = provider(&[("Key", RSA_B64.as_str())]);
        let key = p.rsa("Key").unwrap();
        assert!(key.has_private());
        let material = p.resolve("Key", KeyFamily::Rsa).unwrap();
        assert_eq!(material.family(), KeyFamily::Rsa);
        assert_eq!(material.algorithm(), "RS256");
    }

    #[test]
    fn test_ecdsa_from_setting() {
        let (der, alg) = generate_ecdsa_key(EcCurve::P256).unwrap();
        let p = provider(&[("Ec", der.as_str())]);
        let key = p.ecdsa("Ec").unwrap();
        assert_eq!(key.algorithm_name(), alg);
        assert_eq!(key.algorithm(), Some(SigningAlgorithm::ES256));
    }

    #[test]
    fn test_aes_from_settings() {
        let (key, iv) = generate_aes_key(256).unwrap();
        let p = provider(&[
            ("Aes.Key", key.as_str()),
            ("Aes.Size", "256"),
            ("Aes.SmallSize", "128"),
            ("Aes.Iv", iv.as_str()),
        ]);
        assert_eq!(p.aes("Aes.Key", "Aes.Size").unwrap().bits(), 256);
        assert!(matches!(
            p.aes("Aes.Key", "Aes.SmallSize"),
            Err(CredentialError::ConfigInvalid { .. })
        ));
        assert!(matches!(
            p.aes("Aes.Key", "Aes.Missing"),
            Err(CredentialError::ConfigMissing { .. })
        ));
        let with_iv = p.aes_with_iv("Aes.Key", "Aes.Size", "Aes.Iv").unwrap();
        assert!(with_iv.iv().is_some());
        assert_eq!(
            p.resolve("Aes.Key", KeyFamily::Aes).unwrap().algorithm(),
            "A256"
        );
    }

    #[test]
    fn test_signing_key_family_mismatch() {
        let (der, _) = generate_ecdsa_key(EcCurve::P384).unwrap();
        let p = provider(&[("Ec", der.as_str()), ("Rsa", RSA_B64.as_str())]);

        assert!(p.signing_key("Ec", SigningAlgorithm::ES384).is_ok());
        assert!(matches!(
            p.signing_key("Ec", SigningAlgorithm::ES256),
            Err(CredentialError::ConfigInvalid { .. })
        ));
        assert!(p.signing_key("Rsa", SigningAlgorithm::RS512).is_ok());
        assert!(matches!(
            p.signing_key("Rsa", SigningAlgorithm::ES256),
            Err(CredentialError::ConfigInvalid { .. })
        ));
    }

    #[test]
    fn test_p521_imports_but_cannot_sign() {
        let (der, alg) = generate_ecdsa_key(EcCurve::P521).unwrap();
        assert_eq!(alg, "ES512");
        let p = provider(&[("Ec", der.as_str())]);

        let key = p.ecdsa("Ec").unwrap();
        assert_eq!(key.curve(), EcCurve::P521);
        assert_eq!(p.resolve("Ec", KeyFamily::Ecdsa).unwrap().algorithm(), "ES512");

        for alg in [SigningAlgorithm::ES256, SigningAlgorithm::ES384] {
            let err = p.signing_key("Ec", alg).unwrap_err();
            assert!(err.to_string().contains("P-521"), "{err}");
            assert!(matches!(err, CredentialError::ConfigInvalid { .. }));
        }
    }

    #[test]
    fn test_inline_rsa() {
        assert!(KeyMaterialProvider::inline_rsa("inline", RSA_B64.as_str()).is_ok());
        assert!(matches!(
            KeyMaterialProvider::inline_rsa("inline", "!!"),
            Err(CredentialError::ConfigInvalid { .. })
        ));
    }
}
