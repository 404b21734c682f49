//! ECDSA key import and generation over P-256, P-384 and P-521.
//!
//! Tokens can be signed on P-256 and P-384 only. P-521 keys import, generate
//! and export as JWKs, but have no signing algorithm here.

use crate::config::SigningAlgorithm;
use base64::{
    Engine,
    engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD},
};
use jsonwebtoken::{DecodingKey, EncodingKey};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::pkcs8::EncodePrivateKey;
use rand::rngs::OsRng;
use sec1::der::Decode;
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Supported curves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EcCurve {
    /// NIST P-256 (secp256r1)
    P256,
    /// NIST P-384 (secp384r1)
    #[default]
    P384,
    /// NIST P-521 (secp521r1)
    P521,
}

impl EcCurve {
    const ALL: [Self; 3] = [Self::P256, Self::P384, Self::P521];

    /// JWK curve name.
    #[must_use]
    pub const fn jwk_name(self) -> &'static str {
        match self {
            Self::P256 => "P-256",
            Self::P384 => "P-384",
            Self::P521 => "P-521",
        }
    }

    /// Curve size in bits.
    #[must_use]
    pub const fn bits(self) -> usize {
        match self {
            Self::P256 => 256,
            Self::P384 => 384,
            Self::P521 => 521,
        }
    }

    /// `ES{bits}` name implied by the curve, e.g. `ES512` for P-521.
    #[must_use]
    pub const fn algorithm_name(self) -> &'static str {
        match self {
            Self::P256 => "ES256",
            Self::P384 => "ES384",
            Self::P521 => "ES512",
        }
    }

    /// Token signing algorithm for the curve; `None` for P-521.
    #[must_use]
    pub const fn algorithm(self) -> Option<SigningAlgorithm> {
        match self {
            Self::P256 => Some(SigningAlgorithm::ES256),
            Self::P384 => Some(SigningAlgorithm::ES384),
            Self::P521 => None,
        }
    }

    /// Scalar and coordinate length in bytes.
    #[must_use]
    pub const fn scalar_len(self) -> usize {
        self.bits().div_ceil(8)
    }
}

impl FromStr for EcCurve {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "p-256" | "p256" | "secp256r1" | "prime256v1" | "nistp256" => Ok(Self::P256),
            "p-384" | "p384" | "secp384r1" | "nistp384" => Ok(Self::P384),
            "p-521" | "p521" | "secp521r1" | "nistp521" => Ok(Self::P521),
            other => Err(format!("unsupported curve '{other}'")),
        }
    }
}

impl fmt::Display for EcCurve {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.jwk_name())
    }
}

/// ECDSA private key.
#[derive(Clone)]
pub enum EcdsaKey {
    /// P-256 key
    P256(p256::SecretKey),
    /// P-384 key
    P384(p384::SecretKey),
    /// P-521 key
    P521(p521::SecretKey),
}

impl EcdsaKey {
    /// Parse a SEC1 `ECPrivateKey` DER structure. The curve follows from the
    /// private scalar length.
    ///
    /// # Errors
    ///
    /// A diagnostic string for malformed DER or an unsupported curve.
    pub fn from_sec1_der(der: &[u8]) -> Result<Self, String> {
        let parsed = sec1::EcPrivateKey::from_der(der)
            .map_err(|e| format!("not a SEC1 EC private key: {e}"))?;
        let curve = EcCurve::ALL
            .into_iter()
            .find(|c| c.scalar_len() == parsed.private_key.len())
            .ok_or_else(|| unsupported_key(&parsed))?;

        match curve {
            EcCurve::P256 => p256::SecretKey::from_sec1_der(der).map(Self::P256),
            EcCurve::P384 => p384::SecretKey::from_sec1_der(der).map(Self::P384),
            EcCurve::P521 => p521::SecretKey::from_sec1_der(der).map(Self::P521),
        }
        .map_err(|e| format!("{curve} key: {e}"))
    }

    /// Generate a fresh key on `curve`.
    #[must_use]
    pub fn generate(curve: EcCurve) -> Self {
        match curve {
            EcCurve::P256 => Self::P256(p256::SecretKey::random(&mut OsRng)),
            EcCurve::P384 => Self::P384(p384::SecretKey::random(&mut OsRng)),
            EcCurve::P521 => Self::P521(p521::SecretKey::random(&mut OsRng)),
        }
    }

    /// Curve of this key.
    #[must_use]
    pub const fn curve(&self) -> EcCurve {
        match self {
            Self::P256(_) => EcCurve::P256,
            Self::P384(_) => EcCurve::P384,
            Self::P521(_) => EcCurve::P521,
        }
    }

    /// Token signing algorithm implied by the key size, if any.
    #[must_use]
    pub const fn algorithm(&self) -> Option<SigningAlgorithm> {
        self.curve().algorithm()
    }

    /// `ES{bits}` name implied by the key size.
    #[must_use]
    pub const fn algorithm_name(&self) -> &'static str {
        self.curve().algorithm_name()
    }

    /// SEC1 DER encoding of the private key.
    ///
    /// # Errors
    ///
    /// A diagnostic string when encoding fails.
    pub fn to_sec1_der(&self) -> Result<Vec<u8>, String> {
        let der = match self {
            Self::P256(k) => k.to_sec1_der(),
            Self::P384(k) => k.to_sec1_der(),
            Self::P521(k) => k.to_sec1_der(),
        }
        .map_err(|e| e.to_string())?;
        Ok(der.to_vec())
    }

    /// Uncompressed public point coordinates `(x, y)`.
    #[must_use]
    pub fn public_coordinates(&self) -> (Vec<u8>, Vec<u8>) {
        let point = match self {
            Self::P256(k) => k.public_key().to_encoded_point(false).as_bytes().to_vec(),
            Self::P384(k) => k.public_key().to_encoded_point(false).as_bytes().to_vec(),
            Self::P521(k) => k.public_key().to_encoded_point(false).as_bytes().to_vec(),
        };
        // 0x04 || x || y
        let len = self.curve().scalar_len();
        match point.get(1..) {
            Some(xy) if xy.len() == 2 * len => (xy[..len].to_vec(), xy[len..].to_vec()),
            _ => (Vec::new(), Vec::new()),
        }
    }

    /// Signing key for `jsonwebtoken` (PKCS#8 DER under the hood).
    ///
    /// # Errors
    ///
    /// A diagnostic string when re-encoding fails or the curve has no token
    /// algorithm.
    pub fn encoding_key(&self) -> Result<EncodingKey, String> {
        let der = match self {
            Self::P256(k) => k.to_pkcs8_der(),
            Self::P384(k) => k.to_pkcs8_der(),
            Self::P521(_) => return Err(no_token_algorithm(self.curve())),
        }
        .map_err(|e| e.to_string())?;
        Ok(EncodingKey::from_ec_der(der.as_bytes()))
    }

    /// Verification key for `jsonwebtoken`.
    ///
    /// # Errors
    ///
    /// A diagnostic string when the point does not form a key or the curve
    /// has no token algorithm.
    pub fn decoding_key(&self) -> Result<DecodingKey, String> {
        if self.algorithm().is_none() {
            return Err(no_token_algorithm(self.curve()));
        }
        let (x, y) = self.public_coordinates();
        DecodingKey::from_ec_components(&URL_SAFE_NO_PAD.encode(x), &URL_SAFE_NO_PAD.encode(y))
            .map_err(|e| e.to_string())
    }

    /// RFC 7638 thumbprint of the public key, standard base64.
    #[must_use]
    pub fn thumbprint(&self) -> String {
        let (x, y) = self.public_coordinates();
        // members in lexicographic order, no whitespace
        let canonical = format!(
            r#"{{"crv":"{}","kty":"EC","x":"{}","y":"{}"}}"#,
            self.curve().jwk_name(),
            URL_SAFE_NO_PAD.encode(x),
            URL_SAFE_NO_PAD.encode(y)
        );
        STANDARD.encode(Sha256::digest(canonical.as_bytes()))
    }

    /// Public JWK. `kid` defaults to the thumbprint.
    #[must_use]
    pub fn public_jwk(&self, kid: Option<&str>) -> serde_json::Value {
        let (x, y) = self.public_coordinates();
        let kid = kid.map_or_else(|| self.thumbprint(), str::to_string);
        serde_json::json!({
            "kty": "EC",
            "crv": self.curve().jwk_name(),
            "x": URL_SAFE_NO_PAD.encode(x),
            "y": URL_SAFE_NO_PAD.encode(y),
            "use": "sig",
            "kid": kid,
        })
    }
}

impl fmt::Debug for EcdsaKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EcdsaKey")
            .field("curve", &self.curve())
            .finish_non_exhaustive()
    }
}

fn unsupported_key(key: &sec1::EcPrivateKey<'_>) -> String {
    match key.parameters.and_then(|p| p.named_curve()) {
        Some(oid) => format!("unsupported EC curve {oid}"),
        None => format!(
            "unsupported EC private key of {} bytes",
            key.private_key.len()
        ),
    }
}

fn no_token_algorithm(curve: EcCurve) -> String {
    format!("{curve} keys cannot sign or verify tokens")
}

/// Generate a key on `curve` and return its SEC1 DER in base64 alongside the
/// implied `ES{bits}` algorithm name.
///
/// # Errors
///
/// A diagnostic string when encoding fails.
pub fn generate_ecdsa_key(curve: EcCurve) -> Result<(String, &'static str), String> {
    let key = EcdsaKey::generate(curve);
    Ok((STANDARD.encode(key.to_sec1_der()?), key.algorithm_name()))
}
