//! AES-256-GCM encryption and Argon2id key derivation for .flk archives.
//!
//! Key derivation: Argon2id(password, salt=archive_salt) → 32-byte key
//! Encryption:     AES-256-GCM, random nonce prepended to ciphertext
//!
//! Encrypted payload layout: [ nonce (12 B) | ciphertext | GCM tag (16 B) ]
//!
//! One salt and one key serve a whole pack run.  Every payload carries its
//! own nonce, so the archive's single stored salt decrypts every entry.

use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::aead::{AeadCore, AeadInPlace, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key};
use argon2::{Algorithm, Argon2, Params, Version};
use thiserror::Error;

/// Byte length of the AES-GCM nonce prepended to every encrypted payload.
pub const NONCE_LEN: usize = 12;
/// Byte length of the GCM authentication tag appended by the cipher.
pub const TAG_LEN: usize = 16;
/// Smallest payload that can hold a nonce and a tag.
pub const MIN_PAYLOAD_LEN: usize = NONCE_LEN + TAG_LEN;
/// Byte length of the key-derivation salt stored after the header.
pub const SALT_LEN: usize = 16;
pub const KEY_LEN: usize = 32;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Encryption failed")]
    EncryptionFailed,
    #[error("Decryption failed: wrong password or corrupted data")]
    DecryptionFailed,
    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),
    #[error("Encrypted payload too short ({len} bytes, minimum {min})")]
    TooShort { len: usize, min: usize },
}

const KDF_MEMORY_KIB: u32 = 64 * 1024;
const KDF_PASSES: u32 = 3;
const KDF_LANES: u32 = 1;

/// Run Argon2id over `password` and `salt` and key an AES-256-GCM cipher with
/// the result.
pub fn derive_cipher(password: &str, salt: &[u8]) -> Result<Aes256Gcm, CryptoError> {
    let kdf_error = |e: argon2::Error| CryptoError::KeyDerivation(e.to_string());
    let params = Params::new(KDF_MEMORY_KIB, KDF_PASSES, KDF_LANES, Some(KEY_LEN)).map_err(kdf_error)?;
    let mut key = Key::<Aes256Gcm>::default();
    Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
        .hash_password_into(password.as_bytes(), salt, &mut key)
        .map_err(kdf_error)?;
    Ok(Aes256Gcm::new(&key))
}

/// Fresh random key-derivation salt.
pub fn generate_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    salt
}

/// Seal `plaintext` under a fresh random nonce: `nonce ‖ ciphertext ‖ tag`.
pub fn seal(cipher: &Aes256Gcm, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let mut payload = Vec::with_capacity(plaintext.len() + MIN_PAYLOAD_LEN);
    payload.extend_from_slice(&nonce);
    payload.extend_from_slice(plaintext);
    let tag = cipher
        .encrypt_in_place_detached(&nonce, b"", &mut payload[NONCE_LEN..])
        .map_err(|_| CryptoError::EncryptionFailed)?;
    payload.extend_from_slice(&tag);
    Ok(payload)
}

/// Inverse of [`seal`].  Payloads that cannot hold a nonce and a tag are
/// [`CryptoError::TooShort`]; anything else that fails is an authentication
/// failure.
pub fn open(cipher: &Aes256Gcm, payload: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if payload.len() < MIN_PAYLOAD_LEN {
        return Err(CryptoError::TooShort { len: payload.len(), min: MIN_PAYLOAD_LEN });
    }
    let (nonce, rest) = payload.split_at(NONCE_LEN);
    let (ciphertext, tag) = rest.split_at(rest.len() - TAG_LEN);
    let mut plaintext = ciphertext.to_vec();
    cipher
        .decrypt_in_place_detached(
            GenericArray::from_slice(nonce),
            b"",
            &mut plaintext,
            GenericArray::from_slice(tag),
        )
        .map_err(|_| CryptoError::DecryptionFailed)?;
    Ok(plaintext)
}

// ── Encryptor ─────────────────────────────────────────────────────────────────

/// Per-run encryption state: one random salt and the cipher keyed from it.
pub struct Encryptor {
    salt:   [u8; SALT_LEN],
    cipher: Aes256Gcm,
}

impl Encryptor {
    /// Generate a fresh salt and derive the run key from `password`.
    pub fn new(password: &str) -> Result<Self, CryptoError> {
        Self::with_salt(password, generate_salt())
    }

    pub fn with_salt(password: &str, salt: [u8; SALT_LEN]) -> Result<Self, CryptoError> {
        Ok(Self { cipher: derive_cipher(password, &salt)?, salt })
    }

    pub fn salt(&self) -> &[u8; SALT_LEN] { &self.salt }

    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        seal(&self.cipher, plaintext)
    }
}

// ── Decryptor ─────────────────────────────────────────────────────────────────

/// Cipher keyed from an archive's stored salt.
pub struct Decryptor {
    cipher: Aes256Gcm,
}

impl Decryptor {
    pub fn new(password: &str, salt: &[u8]) -> Result<Self, CryptoError> {
        Ok(Self { cipher: derive_cipher(password, salt)? })
    }

    pub fn decrypt(&self, payload: &[u8]) -> Result<Vec<u8>, CryptoError> {
        open(&self.cipher, payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher(byte: u8) -> Aes256Gcm {
        Aes256Gcm::new_from_slice(&[byte; KEY_LEN]).unwrap()
    }

    #[test]
    fn payload_carries_nonce_and_tag() {
        let key = cipher(7);
        let out = seal(&key, b"abc").unwrap();
        assert_eq!(out.len(), 3 + MIN_PAYLOAD_LEN);
        assert_eq!(open(&key, &out).unwrap(), b"abc");
    }

    #[test]
    fn nonces_differ_between_calls() {
        let key = cipher(1);
        let a = seal(&key, b"same").unwrap();
        let b = seal(&key, b"same").unwrap();
        assert_ne!(a[..NONCE_LEN], b[..NONCE_LEN]);
    }

    #[test]
    fn short_payload_is_distinct_from_auth_failure() {
        let key = cipher(2);
        match open(&key, &[0u8; MIN_PAYLOAD_LEN - 1]) {
            Err(CryptoError::TooShort { len, min }) => {
                assert_eq!(len, MIN_PAYLOAD_LEN - 1);
                assert_eq!(min, MIN_PAYLOAD_LEN);
            }
            other => panic!("expected TooShort, got {other:?}"),
        }
        assert!(matches!(
            open(&key, &[0u8; MIN_PAYLOAD_LEN]),
            Err(CryptoError::DecryptionFailed)
        ));
    }

    #[test]
    fn tampered_payload_fails_authentication() {
        let key = cipher(3);
        let mut out = seal(&key, b"payload").unwrap();
        let last = out.len() - 1;
        out[last] ^= 0x01;
        assert!(matches!(open(&key, &out), Err(CryptoError::DecryptionFailed)));
    }

    #[test]
    fn encryptor_and_decryptor_share_salt() {
        let enc = Encryptor::new("hunter2").unwrap();
        let blob = enc.encrypt(b"secret bytes").unwrap();

        let dec = Decryptor::new("hunter2", enc.salt()).unwrap();
        assert_eq!(dec.decrypt(&blob).unwrap(), b"secret bytes");

        let wrong = Decryptor::new("hunter3", enc.salt()).unwrap();
        assert!(matches!(wrong.decrypt(&blob), Err(CryptoError::DecryptionFailed)));
    }
}
