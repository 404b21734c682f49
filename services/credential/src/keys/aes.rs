//! AES key material: CBC with ISO 10126 padding, and single-block GUID
//! obfuscation.

use crate::error::{CredentialError, CredentialResult};
use aes::cipher::{
    BlockDecrypt, BlockDecryptMut, BlockEncrypt, BlockEncryptMut, KeyInit, KeyIvInit,
    block_padding::Iso10126,
};
use aes::{Aes128, Aes192, Aes256, Block};
use base64::{Engine, engine::general_purpose::STANDARD};
use rand::RngCore;
use rand::rngs::OsRng;
use uuid::Uuid;
use zeroize::Zeroizing;

/// AES block and IV length in bytes.
pub const BLOCK_LEN: usize = 16;

/// AES key with an optional fixed IV.
#[derive(Clone)]
pub struct AesKey {
    key: Zeroizing<Vec<u8>>,
    iv: Option<[u8; BLOCK_LEN]>,
}

impl AesKey {
    /// Key of `bits` length. The byte length must match.
    ///
    /// # Errors
    ///
    /// A diagnostic string for unsupported sizes or a length mismatch.
    pub fn new(key: Vec<u8>, bits: u32) -> Result<Self, String> {
        let key = Zeroizing::new(key);
        if !matches!(bits, 128 | 192 | 256) {
            return Err(format!("unsupported AES key size {bits}"));
        }
        if key.len() * 8 != bits as usize {
            return Err(format!(
                "key is {} bits but key size is {bits}",
                key.len() * 8
            ));
        }
        Ok(Self { key, iv: None })
    }

    /// 128-bit key carried in a GUID.
    #[must_use]
    pub fn from_guid(key: Uuid) -> Self {
        Self {
            key: Zeroizing::new(key.to_bytes_le().to_vec()),
            iv: None,
        }
    }

    /// Fix the IV used by [`encrypt`](Self::encrypt).
    ///
    /// # Errors
    ///
    /// A diagnostic string when the IV is not one block long.
    pub fn with_iv(mut self, iv: &[u8]) -> Result<Self, String> {
        let iv: [u8; BLOCK_LEN] = iv
            .try_into()
            .map_err(|_| format!("IV must be {BLOCK_LEN} bytes, got {}", iv.len()))?;
        self.iv = Some(iv);
        Ok(self)
    }

    /// Key size in bits.
    #[must_use]
    pub fn bits(&self) -> usize {
        self.key.len() * 8
    }

    /// Algorithm label, e.g. `A256`.
    #[must_use]
    pub fn algorithm(&self) -> String {
        format!("A{}", self.bits())
    }

    /// Configured IV.
    #[must_use]
    pub const fn iv(&self) -> Option<&[u8; BLOCK_LEN]> {
        self.iv.as_ref()
    }

    /// CBC encrypt with ISO 10126 padding. The output starts with the IV.
    ///
    /// # Errors
    ///
    /// [`CredentialError::Crypto`] when the key is rejected by the cipher.
    pub fn encrypt(&self, plaintext: &[u8]) -> CredentialResult<Vec<u8>> {
        let iv = self.iv.unwrap_or_else(|| {
            let mut iv = [0u8; BLOCK_LEN];
            OsRng.fill_bytes(&mut iv);
            iv
        });
        let key = self.key.as_slice();
        let ciphertext = match key.len() {
            16 => cbc::Encryptor::<Aes128>::new_from_slices(key, &iv)
                .map(|c| c.encrypt_padded_vec_mut::<Iso10126>(plaintext)),
            24 => cbc::Encryptor::<Aes192>::new_from_slices(key, &iv)
                .map(|c| c.encrypt_padded_vec_mut::<Iso10126>(plaintext)),
            _ => cbc::Encryptor::<Aes256>::new_from_slices(key, &iv)
                .map(|c| c.encrypt_padded_vec_mut::<Iso10126>(plaintext)),
        }
        .map_err(CredentialError::crypto)?;

        let mut out = Vec::with_capacity(BLOCK_LEN + ciphertext.len());
        out.extend_from_slice(&iv);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    /// Reverse [`encrypt`](Self::encrypt).
    ///
    /// # Errors
    ///
    /// [`CredentialError::Crypto`] for short input, a length that is not a
    /// block multiple, or bad padding.
    pub fn decrypt(&self, data: &[u8]) -> CredentialResult<Vec<u8>> {
        if data.len() < BLOCK_LEN * 2 || data.len() % BLOCK_LEN != 0 {
            return Err(CredentialError::crypto(format!(
                "ciphertext length {} is not an IV plus whole blocks",
                data.len()
            )));
        }
        let (iv, ciphertext) = data.split_at(BLOCK_LEN);
        let key = self.key.as_slice();
        match key.len() {
            16 => cbc::Decryptor::<Aes128>::new_from_slices(key, iv)
                .map_err(CredentialError::crypto)?
                .decrypt_padded_vec_mut::<Iso10126>(ciphertext),
            24 => cbc::Decryptor::<Aes192>::new_from_slices(key, iv)
                .map_err(CredentialError::crypto)?
                .decrypt_padded_vec_mut::<Iso10126>(ciphertext),
            _ => cbc::Decryptor::<Aes256>::new_from_slices(key, iv)
                .map_err(CredentialError::crypto)?
                .decrypt_padded_vec_mut::<Iso10126>(ciphertext),
        }
        .map_err(CredentialError::crypto)
    }

    /// Obfuscate a GUID: one block, no chaining, no padding.
    ///
    /// # Errors
    ///
    /// [`CredentialError::Crypto`] when the key is rejected by the cipher.
    pub fn encrypt_guid(&self, id: Uuid) -> CredentialResult<Uuid> {
        let mut block = Block::from(id.to_bytes_le());
        self.with_block_cipher(&mut block, true)?;
        Ok(Uuid::from_bytes_le(block.into()))
    }

    /// Reverse [`encrypt_guid`](Self::encrypt_guid).
    ///
    /// # Errors
    ///
    /// [`CredentialError::Crypto`] when the key is rejected by the cipher.
    pub fn decrypt_guid(&self, id: Uuid) -> CredentialResult<Uuid> {
        let mut block = Block::from(id.to_bytes_le());
        self.with_block_cipher(&mut block, false)?;
        Ok(Uuid::from_bytes_le(block.into()))
    }

    fn with_block_cipher(&self, block: &mut Block, encrypt: bool) -> CredentialResult<()> {
        let key = self.key.as_slice();
        match key.len() {
            16 => {
                let cipher = Aes128::new_from_slice(key).map_err(CredentialError::crypto)?;
                if encrypt {
                    cipher.encrypt_block(block);
                } else {
                    cipher.decrypt_block(block);
                }
            }
            24 => {
                let cipher = Aes192::new_from_slice(key).map_err(CredentialError::crypto)?;
                if encrypt {
                    cipher.encrypt_block(block);
                } else {
                    cipher.decrypt_block(block);
                }
            }
            _ => {
                let cipher = Aes256::new_from_slice(key).map_err(CredentialError::crypto)?;
                if encrypt {
                    cipher.encrypt_block(block);
                } else {
                    cipher.decrypt_block(block);
                }
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for AesKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AesKey")
            .field("bits", &self.bits())
            .field("fixed_iv", &self.iv.is_some())
            .finish()
    }
}

/// Generate a key of `bits` and a random IV, both base64.
///
/// # Errors
///
/// A diagnostic string for unsupported sizes.
pub fn generate_aes_key(bits: u32) -> Result<(String, String), String> {
    if !matches!(bits, 128 | 192 | 256) {
        return Err(format!("unsupported AES key size {bits}"));
    }
    let mut key = Zeroizing::new(vec![0u8; bits as usize / 8]);
    let mut iv = [0u8; BLOCK_LEN];
    OsRng.fill_bytes(&mut key);
    OsRng.fill_bytes(&mut iv);
    Ok((STANDARD.encode(key.as_slice()), STANDARD.encode(iv)))
}

/// Generate a random 128-bit key in GUID form.
#[must_use]
pub fn generate_guid_key() -> Uuid {
    let mut bytes = [0u8; 16];
    OsRng.fill_bytes(&mut bytes);
    Uuid::from_bytes_le(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(bits: u32) -> AesKey {
        let (k, _) = generate_aes_key(bits).unwrap();
        AesKey::new(STANDARD.decode(k).unwrap(), bits).unwrap()
    }

    #[test]
    fn test_cbc_round_trip_all_sizes() {
        for bits in [128, 192, 256] {
            let key = key(bits);
            for plaintext in [&b""[..], b"x", b"exactly sixteen!", b"a longer message spanning blocks"] {
                let ct = key.encrypt(plaintext).unwrap();
                assert_eq!(ct.len() % BLOCK_LEN, 0);
                assert!(ct.len() > plaintext.len() + BLOCK_LEN - 1);
                assert_eq!(key.decrypt(&ct).unwrap(), plaintext);
            }
        }
    }

    #[test]
    fn test_fixed_iv_is_prefixed() {
        let iv = [7u8; BLOCK_LEN];
        let key = key(256).with_iv(&iv).unwrap();
        let ct = key.encrypt(b"payload").unwrap();
        assert_eq!(&ct[..BLOCK_LEN], &iv);
        assert_eq!(key.decrypt(&ct).unwrap(), b"payload");
    }

    #[test]
    fn test_random_iv_differs() {
        let key = key(128);
        assert_ne!(key.encrypt(b"same").unwrap(), key.encrypt(b"same").unwrap());
    }

    #[test]
    fn test_decrypt_rejects_bad_lengths() {
        let key = key(128);
        assert!(matches!(key.decrypt(&[0u8; 16]), Err(CredentialError::Crypto(_))));
        assert!(matches!(key.decrypt(&[0u8; 33]), Err(CredentialError::Crypto(_))));
    }

    #[test]
    fn test_key_size_mismatch() {
        assert!(AesKey::new(vec![0u8; 16], 256).is_err());
        assert!(AesKey::new(vec![0u8; 8], 64).is_err());
        assert!(AesKey::new(vec![0u8; 32], 256).is_ok());
        assert!(key(128).with_iv(&[0u8; 8]).is_err());
    }

    #[test]
    fn test_guid_round_trip() {
        let key = AesKey::from_guid(generate_guid_key());
        assert_eq!(key.bits(), 128);
        let id = Uuid::new_v4();
        let hidden = key.encrypt_guid(id).unwrap();
        assert_ne!(hidden, id);
        assert_eq!(key.decrypt_guid(hidden).unwrap(), id);
    }

    #[test]
    fn test_generate_rejects_bad_size() {
        assert!(generate_aes_key(100).is_err());
        let (k, iv) = generate_aes_key(192).unwrap();
        assert_eq!(STANDARD.decode(k).unwrap().len(), 24);
        assert_eq!(STANDARD.decode(iv).unwrap().len(), 16);
    }

    #[test]
    fn test_algorithm_label() {
        assert_eq!(key(256).algorithm(), "A256");
    }
}
