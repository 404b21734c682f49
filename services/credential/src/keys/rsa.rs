//! RSA key import, export and generation.
//!
//! Two stored encodings exist side by side. Older deployments keep the XML
//! `<RSAKeyValue>` document; newer ones keep PKCS#1 DER. Both are base64 in
//! configuration and are told apart by their first decoded byte.

use crate::error::{CredentialError, CredentialResult};
use base64::{
    Engine,
    engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD},
};
use jsonwebtoken::{DecodingKey, EncodingKey};
use once_cell::sync::Lazy;
use rand::rngs::OsRng;
use regex::Regex;
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey, EncodeRsaPrivateKey, EncodeRsaPublicKey};
use rsa::traits::{PrivateKeyParts, PublicKeyParts};
use rsa::{BigUint, Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// Size of generated RSA keys.
pub const DEFAULT_RSA_BITS: usize = 2048;

static XML_ELEMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"<\s*(\w+)\s*>\s*([A-Za-z0-9+/=\s]*?)\s*<\s*/\s*(\w+)\s*>")
        .expect("RSA XML element pattern is valid")
});

/// Stored RSA key encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RsaKeyEncoding {
    /// `<RSAKeyValue>` XML with base64 big-endian components.
    LegacyXml,
    /// PKCS#1 `RSAPrivateKey` or `RSAPublicKey` DER.
    Pkcs1Der,
}

impl RsaKeyEncoding {
    /// Detect the encoding of decoded key bytes.
    #[must_use]
    pub fn detect(bytes: &[u8]) -> Option<Self> {
        let first = bytes
            .strip_prefix(b"\xEF\xBB\xBF")
            .unwrap_or(bytes)
            .iter()
            .find(|b| !b.is_ascii_whitespace())?;
        match first {
            b'<' => Some(Self::LegacyXml),
            0x30 => Some(Self::Pkcs1Der),
            _ => None,
        }
    }
}

/// RSA public key with its private half when available.
#[derive(Clone)]
pub struct RsaKey {
    public: RsaPublicKey,
    private: Option<RsaPrivateKey>,
}

impl RsaKey {
    /// Import decoded key bytes in either stored encoding.
    ///
    /// # Errors
    ///
    /// A diagnostic string when the bytes are neither encoding or the key is
    /// inconsistent.
    pub fn import(bytes: &[u8]) -> Result<Self, String> {
        match RsaKeyEncoding::detect(bytes) {
            Some(RsaKeyEncoding::LegacyXml) => {
                let xml = std::str::from_utf8(bytes)
                    .map_err(|e| format!("RSA XML is not UTF-8: {e}"))?;
                Self::from_xml(xml)
            }
            Some(RsaKeyEncoding::Pkcs1Der) => Self::from_pkcs1_der(bytes),
            None => Err("not an RSA XML document or PKCS#1 DER structure".to_string()),
        }
    }

    /// Parse an `<RSAKeyValue>` document. Private components are optional.
    ///
    /// # Errors
    ///
    /// A diagnostic string for missing or malformed components.
    pub fn from_xml(xml: &str) -> Result<Self, String> {
        let mut parts: HashMap<String, BigUint> = HashMap::new();
        for caps in XML_ELEMENT.captures_iter(xml) {
            let (open, value, close) = (&caps[1], &caps[2], &caps[3]);
            if open != close {
                return Err(format!("mismatched XML element <{open}> closed by </{close}>"));
            }
            let compact: String = value.split_whitespace().collect();
            let bytes = STANDARD
                .decode(compact)
                .map_err(|e| format!("RSA XML <{open}> is not base64: {e}"))?;
            parts.insert(open.to_string(), BigUint::from_bytes_be(&bytes));
        }

        let take = |name: &str| {
            parts
                .get(name)
                .cloned()
                .ok_or_else(|| format!("RSA XML is missing <{name}>"))
        };
        let n = take("Modulus")?;
        let e = take("Exponent")?;
        let public = RsaPublicKey::new(n.clone(), e.clone()).map_err(|e| e.to_string())?;

        if !parts.contains_key("D") {
            return Ok(Self {
                public,
                private: None,
            });
        }

        let d = take("D")?;
        let p = take("P")?;
        let q = take("Q")?;
        let mut private =
            RsaPrivateKey::from_components(n, e, d, vec![p, q]).map_err(|e| e.to_string())?;
        private.validate().map_err(|e| e.to_string())?;
        private.precompute().map_err(|e| e.to_string())?;

        Ok(Self {
            public,
            private: Some(private),
        })
    }

    /// Parse PKCS#1 DER, private or public.
    ///
    /// # Errors
    ///
    /// A diagnostic string when the structure does not decode.
    pub fn from_pkcs1_der(der: &[u8]) -> Result<Self, String> {
        if is_pkcs1_private(der) {
            let private = RsaPrivateKey::from_pkcs1_der(der)
                .map_err(|e| format!("PKCS#1 private key: {e}"))?;
            private.validate().map_err(|e| e.to_string())?;
            Ok(Self::from_private(private))
        } else {
            let public = RsaPublicKey::from_pkcs1_der(der)
                .map_err(|e| format!("PKCS#1 public key: {e}"))?;
            Ok(Self {
                public,
                private: None,
            })
        }
    }

    /// Wrap a private key.
    #[must_use]
    pub fn from_private(private: RsaPrivateKey) -> Self {
        Self {
            public: private.to_public_key(),
            private: Some(private),
        }
    }

    /// Generate a fresh key pair.
    ///
    /// # Errors
    ///
    /// A diagnostic string when the random source fails.
    pub fn generate(bits: usize) -> Result<Self, String> {
        RsaPrivateKey::new(&mut OsRng, bits)
            .map(Self::from_private)
            .map_err(|e| e.to_string())
    }

    /// Public half.
    #[must_use]
    pub const fn public(&self) -> &RsaPublicKey {
        &self.public
    }

    /// Private half, if present.
    #[must_use]
    pub const fn private(&self) -> Option<&RsaPrivateKey> {
        self.private.as_ref()
    }

    /// True when the private half is present.
    #[must_use]
    pub const fn has_private(&self) -> bool {
        self.private.is_some()
    }

    /// Modulus size in bits.
    #[must_use]
    pub fn bits(&self) -> usize {
        self.public.size() * 8
    }

    /// Signing key for `jsonwebtoken`.
    ///
    /// # Errors
    ///
    /// A diagnostic string when only the public half is present.
    pub fn encoding_key(&self) -> Result<EncodingKey, String> {
        let private = self
            .private
            .as_ref()
            .ok_or_else(|| "RSA key has no private component".to_string())?;
        let der = private.to_pkcs1_der().map_err(|e| e.to_string())?;
        Ok(EncodingKey::from_rsa_der(der.as_bytes()))
    }

    /// Verification key for `jsonwebtoken`.
    ///
    /// # Errors
    ///
    /// A diagnostic string when the components do not form a key.
    pub fn decoding_key(&self) -> Result<DecodingKey, String> {
        let n = URL_SAFE_NO_PAD.encode(self.public.n().to_bytes_be());
        let e = URL_SAFE_NO_PAD.encode(self.public.e().to_bytes_be());
        DecodingKey::from_rsa_components(&n, &e).map_err(|e| e.to_string())
    }

    /// `<RSAKeyValue>` document, with private components when asked and
    /// available. Components are padded to the widths legacy readers expect.
    #[must_use]
    pub fn to_xml(&self, include_private: bool) -> String {
        let modulus_len = self.public.size();
        let half = modulus_len.div_ceil(2);
        let mut xml = String::from("<RSAKeyValue>");
        push_element(&mut xml, "Modulus", &self.public.n().to_bytes_be(), modulus_len);
        push_element(&mut xml, "Exponent", &self.public.e().to_bytes_be(), 0);

        if let Some(private) = self.private.as_ref().filter(|_| include_private) {
            let primes = private.primes();
            if let [p, q, ..] = primes {
                let one = BigUint::from(1u8);
                let d = private.d();
                let dp = private.dp().cloned().unwrap_or_else(|| d % (p - &one));
                let dq = private.dq().cloned().unwrap_or_else(|| d % (q - &one));
                let qinv = private
                    .qinv()
                    .map(|v| v.to_bytes_be().1)
                    .unwrap_or_default();

                push_element(&mut xml, "P", &p.to_bytes_be(), half);
                push_element(&mut xml, "Q", &q.to_bytes_be(), half);
                push_element(&mut xml, "DP", &dp.to_bytes_be(), half);
                push_element(&mut xml, "DQ", &dq.to_bytes_be(), half);
                push_element(&mut xml, "InverseQ", &qinv, half);
                push_element(&mut xml, "D", &d.to_bytes_be(), modulus_len);
            }
        }
        xml.push_str("</RSAKeyValue>");
        xml
    }

    /// PKCS#1 DER of the private key, or of the public key when no private
    /// half is present.
    ///
    /// # Errors
    ///
    /// A diagnostic string when encoding fails.
    pub fn to_pkcs1_der(&self) -> Result<Vec<u8>, String> {
        match &self.private {
            Some(private) => private
                .to_pkcs1_der()
                .map(|doc| doc.as_bytes().to_vec())
                .map_err(|e| e.to_string()),
            None => self
                .public
                .to_pkcs1_der()
                .map(|doc| doc.as_bytes().to_vec())
                .map_err(|e| e.to_string()),
        }
    }

    /// Public JWK (`kty`, `n`, `e`).
    #[must_use]
    pub fn public_jwk(&self) -> serde_json::Value {
        serde_json::json!({
            "kty": "RSA",
            "n": URL_SAFE_NO_PAD.encode(self.public.n().to_bytes_be()),
            "e": URL_SAFE_NO_PAD.encode(self.public.e().to_bytes_be()),
        })
    }

    /// Encrypt with PKCS#1 v1.5 padding under the public half.
    ///
    /// # Errors
    ///
    /// `Crypto` when `data` is too long for the modulus.
    pub fn encrypt(&self, data: &[u8]) -> CredentialResult<Vec<u8>> {
        self.public
            .encrypt(&mut OsRng, Pkcs1v15Encrypt, data)
            .map_err(|e| CredentialError::crypto(format!("RSA encrypt: {e}")))
    }

    /// Decrypt PKCS#1 v1.5 ciphertext with the private half.
    ///
    /// # Errors
    ///
    /// `Crypto` when the private half is absent or the padding does not check.
    pub fn decrypt(&self, data: &[u8]) -> CredentialResult<Vec<u8>> {
        let private = self
            .private
            .as_ref()
            .ok_or_else(|| CredentialError::crypto("RSA decrypt: key has no private component"))?;
        private
            .decrypt(Pkcs1v15Encrypt, data)
            .map_err(|e| CredentialError::crypto(format!("RSA decrypt: {e}")))
    }
}

/// ASCII bytes of `data` (`?` for anything else) and their SHA-256 digest.
#[must_use]
pub fn hash_data(data: &str) -> (Vec<u8>, [u8; 32]) {
    let bytes: Vec<u8> = data
        .chars()
        .map(|c| u8::try_from(c).ok().filter(u8::is_ascii).unwrap_or(b'?'))
        .collect();
    let digest = Sha256::digest(&bytes).into();
    (bytes, digest)
}

impl std::fmt::Debug for RsaKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RsaKey")
            .field("bits", &self.bits())
            .field("has_private", &self.has_private())
            .finish()
    }
}

fn push_element(xml: &mut String, name: &str, value: &[u8], width: usize) {
    let padded = left_pad(value, width);
    xml.push('<');
    xml.push_str(name);
    xml.push('>');
    xml.push_str(&STANDARD.encode(padded));
    xml.push_str("</");
    xml.push_str(name);
    xml.push('>');
}

fn left_pad(value: &[u8], width: usize) -> Vec<u8> {
    if value.len() >= width {
        return value.to_vec();
    }
    let mut out = vec![0u8; width - value.len()];
    out.extend_from_slice(value);
    out
}

/// PKCS#1 private keys open with `SEQUENCE { INTEGER 0, ... }`; public keys
/// open with the modulus, which is never a one-byte zero.
fn is_pkcs1_private(der: &[u8]) -> bool {
    let Some(&len_byte) = der.get(1) else {
        return false;
    };
    let header = if len_byte & 0x80 == 0 {
        2
    } else {
        2 + usize::from(len_byte & 0x7F)
    };
    der.get(header..header + 3) == Some(&[0x02, 0x01, 0x00])
}

/// Freshly generated key pair in every stored form, base64 encoded.
#[derive(Clone)]
pub struct GeneratedRsaKey {
    /// Legacy XML with public components only.
    pub public_xml: String,
    /// Legacy XML with every component.
    pub private_xml: String,
    /// PKCS#1 DER public key.
    pub public_pkcs1: String,
    /// PKCS#1 DER private key.
    pub private_pkcs1: String,
}

impl std::fmt::Debug for GeneratedRsaKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeneratedRsaKey")
            .field("public_xml", &self.public_xml)
            .field("public_pkcs1", &self.public_pkcs1)
            .finish_non_exhaustive()
    }
}

/// Generate a key pair and render it in every stored form.
///
/// # Errors
///
/// A diagnostic string when generation or encoding fails.
pub fn generate_rsa_key(bits: usize) -> Result<GeneratedRsaKey, String> {
    let key = RsaKey::generate(bits)?;
    let public_der = key
        .public
        .to_pkcs1_der()
        .map_err(|e| e.to_string())?
        .as_bytes()
        .to_vec();
    Ok(GeneratedRsaKey {
        public_xml: STANDARD.encode(key.to_xml(false)),
        private_xml: STANDARD.encode(key.to_xml(true)),
        public_pkcs1: STANDARD.encode(public_der),
        private_pkcs1: STANDARD.encode(key.to_pkcs1_der()?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    static KEY: Lazy<RsaKey> = Lazy::new(|| RsaKey::generate(1024).unwrap());

    #[test]
    fn test_detect_encoding() {
        assert_eq!(
            RsaKeyEncoding::detect(b"  <RSAKeyValue>"),
            Some(RsaKeyEncoding::LegacyXml)
        );
        assert_eq!(
            RsaKeyEncoding::detect(b"\xEF\xBB\xBF<RSAKeyValue>"),
            Some(RsaKeyEncoding::LegacyXml)
        );
        assert_eq!(
            RsaKeyEncoding::detect(&[0x30, 0x82, 0x01]),
            Some(RsaKeyEncoding::Pkcs1Der)
        );
        assert_eq!(RsaKeyEncoding::detect(b"hello"), None);
        assert_eq!(RsaKeyEncoding::detect(b""), None);
    }

    #[test]
    fn test_xml_round_trip_private() {
        let xml = KEY.to_xml(true);
        assert!(xml.starts_with("<RSAKeyValue><Modulus>"));
        assert!(xml.contains("<InverseQ>"));

        let parsed = RsaKey::import(xml.as_bytes()).unwrap();
        assert!(parsed.has_private());
        assert_eq!(parsed.public(), KEY.public());
    }

    #[test]
    fn test_xml_public_only() {
        let xml = KEY.to_xml(false);
        assert!(!xml.contains("<D>"));
        let parsed = RsaKey::from_xml(&xml).unwrap();
        assert!(!parsed.has_private());
        assert!(parsed.encoding_key().is_err());
        assert!(parsed.decoding_key().is_ok());
    }

    #[test]
    fn test_xml_accepts_whitespace() {
        let xml = KEY.to_xml(false).replace("><", ">\n  <");
        let parsed = RsaKey::from_xml(&xml).unwrap();
        assert_eq!(parsed.public(), KEY.public());
    }

    #[test]
    fn test_xml_missing_modulus() {
        let err = RsaKey::from_xml("<RSAKeyValue><Exponent>AQAB</Exponent></RSAKeyValue>")
            .unwrap_err();
        assert!(err.contains("Modulus"));
    }

    #[test]
    fn test_pkcs1_round_trip() {
        let der = KEY.to_pkcs1_der().unwrap();
        assert!(is_pkcs1_private(&der));
        let parsed = RsaKey::import(&der).unwrap();
        assert!(parsed.has_private());
        assert_eq!(parsed.public(), KEY.public());

        let public_der = KEY.public().to_pkcs1_der().unwrap();
        assert!(!is_pkcs1_private(public_der.as_bytes()));
        let parsed = RsaKey::import(public_der.as_bytes()).unwrap();
        assert!(!parsed.has_private());
    }

    #[test]
    fn test_pkcs1v15_encrypt_round_trip() {
        let message = b"voucher secret";
        let ciphertext = KEY.encrypt(message).unwrap();
        assert_eq!(ciphertext.len(), KEY.bits() / 8);
        assert_ne!(KEY.encrypt(message).unwrap(), ciphertext);
        assert_eq!(KEY.decrypt(&ciphertext).unwrap(), message);

        let public_only = RsaKey::from_xml(&KEY.to_xml(false)).unwrap();
        let from_public = public_only.encrypt(message).unwrap();
        assert_eq!(KEY.decrypt(&from_public).unwrap(), message);
        assert!(matches!(
            public_only.decrypt(&from_public),
            Err(CredentialError::Crypto(_))
        ));
    }

    #[test]
    fn test_decrypt_rejects_bad_padding() {
        let ciphertext = vec![0xFF; KEY.bits() / 8];
        assert!(matches!(KEY.decrypt(&ciphertext), Err(CredentialError::Crypto(_))));
        assert!(matches!(KEY.decrypt(&[1, 2, 3]), Err(CredentialError::Crypto(_))));
        assert!(matches!(
            KEY.encrypt(&[0u8; 128]),
            Err(CredentialError::Crypto(_))
        ));
    }

    #[test]
    fn test_hash_data_uses_ascii() {
        let (bytes, digest) = hash_data("abc");
        assert_eq!(bytes, b"abc");
        assert_eq!(digest.to_vec(), Sha256::digest(b"abc").to_vec());

        let (bytes, _) = hash_data("a\u{e9}b");
        assert_eq!(bytes, b"a?b");
    }

    #[test]
    fn test_import_garbage() {
        assert!(RsaKey::import(b"not a key").is_err());
        assert!(RsaKey::import(&[0x30, 0x03, 0x02, 0x01]).is_err());
    }

    #[test]
    fn test_generated_forms_import() {
        let generated = generate_rsa_key(1024).unwrap();
        for encoded in [
            &generated.public_xml,
            &generated.private_xml,
            &generated.public_pkcs1,
            &generated.private_pkcs1,
        ] {
            let bytes = STANDARD.decode(encoded).unwrap();
            assert!(RsaKey::import(&bytes).is_ok());
        }
        let debug = format!("{generated:?}");
        assert!(!debug.contains(&generated.private_pkcs1));
    }
}
